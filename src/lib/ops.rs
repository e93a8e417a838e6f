//! Keypad operations. Each one opens its own connection, runs a strictly
//! sequential request/response exchange and closes the connection again.
//!
//! Writes are not transactional: when a write fails halfway, the switches
//! written so far keep their new keys.

use std::fmt::Display;

use anyhow::{Context, Result};
use itertools::Itertools;
use log::{debug, info, warn};

use crate::frame;
use crate::keys::{self, KeySymbol};
use crate::port::{self, DeviceEntry};
use crate::session::{Session, SessionConfig};

/// Source of serial ports and connections.
pub trait PortProvider: Send + Sync {
    fn list(&self) -> Result<Vec<DeviceEntry>>;
    fn connect(&self, handle: &str) -> Result<Session>;
}

/// Ports of the host operating system.
pub struct SystemPorts {
    config: SessionConfig,
}

impl SystemPorts {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }
}

impl PortProvider for SystemPorts {
    fn list(&self) -> Result<Vec<DeviceEntry>> {
        port::available_ports()
    }

    fn connect(&self, handle: &str) -> Result<Session> {
        let port = port::open_port(handle, &self.config.port)?;
        Ok(Session::new(Box::new(port), self.config))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceProfile {
    pub switch_count: u8,
    pub max_keys: u8,
}

impl Display for DeviceProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Connected ({} switches, {} keys per switch)",
            self.switch_count, self.max_keys
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceList(Vec<DeviceEntry>);

impl DeviceList {
    pub fn entries(&self) -> &[DeviceEntry] {
        &self.0
    }

    pub fn path_for(&self, label: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|entry| entry.label == label)
            .map(|entry| entry.path.as_str())
    }
}

/// Keys fired by one switch, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SwitchAssignment(pub Vec<KeySymbol>);

impl SwitchAssignment {
    /// Bytes that are neither printable nor a named key are dropped.
    pub fn from_codes(codes: &[u8]) -> Self {
        SwitchAssignment(codes.iter().filter_map(|&c| keys::code_to_symbol(c)).collect())
    }

    /// An empty assignment renders as a single space so the line survives.
    pub fn to_line(&self) -> String {
        if self.0.is_empty() {
            " ".to_string()
        } else {
            self.0.iter().join(" ")
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SwitchTable(pub Vec<SwitchAssignment>);

impl SwitchTable {
    pub fn lines(&self) -> Vec<String> {
        self.0.iter().map(SwitchAssignment::to_line).collect()
    }

    pub fn to_text(&self) -> String {
        self.lines().join("\n")
    }
}

impl Display for SwitchTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.to_text().fmt(f)
    }
}

/// Key codes for one editor line. Only the first `max_keys` tokens are
/// considered; tokens that resolve to nothing still use up a slot.
pub fn encode_line(line: &str, max_keys: u8) -> Vec<u8> {
    line.split_whitespace()
        .take(max_keys.into())
        .filter_map(|token| {
            let code = keys::token_to_code(token);
            if code.is_none() {
                debug!("dropping token {:?}", token);
            }
            code
        })
        .collect()
}

/// One line per switch; missing lines are empty, extra lines are ignored.
/// Lines end at `\n`, `\r\n` or a lone `\r`.
pub fn switch_lines(text: &str, switch_count: u8) -> Vec<&str> {
    let mut lines: Vec<&str> = text
        .split_terminator('\n')
        .flat_map(|line| line.strip_suffix('\r').unwrap_or(line).split('\r'))
        .collect();
    if lines.len() > switch_count.into() {
        warn!(
            "ignoring {} lines beyond switch count {}",
            lines.len() - usize::from(switch_count),
            switch_count
        );
    }
    lines.resize(switch_count.into(), "");
    lines
}

fn query_profile(session: &mut Session) -> Result<DeviceProfile> {
    let response = session.transact(&frame::query_request())?;
    Ok(frame::decode_profile(&response)?)
}

fn read_table(session: &mut Session, switch_count: u8) -> Result<SwitchTable> {
    let assignments = (0..switch_count)
        .map(|switch| -> Result<SwitchAssignment> {
            let response = session
                .transact(&frame::read_request(switch))
                .with_context(|| format!("Failed to read switch {}", switch))?;
            let payload = frame::switch_payload(&response)
                .with_context(|| format!("Bad response for switch {}", switch))?;
            Ok(SwitchAssignment::from_codes(payload))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(SwitchTable(assignments))
}

fn write_table(session: &mut Session, text: &str, switch_count: u8, max_keys: u8) -> Result<()> {
    for (switch, line) in (0..switch_count).zip(switch_lines(text, switch_count)) {
        let request = frame::write_request(switch, &encode_line(line, max_keys));
        session
            .send_frame(&request)
            .with_context(|| format!("Failed to write switch {}", switch))?;
        session.settle()?;
    }
    Ok(())
}

pub fn enumerate(provider: &dyn PortProvider) -> Result<DeviceList> {
    let entries = provider.list()?;
    debug!("found {} ports", entries.len());
    Ok(DeviceList(entries))
}

pub fn query(provider: &dyn PortProvider, handle: &str) -> Result<DeviceProfile> {
    let mut session = provider.connect(handle)?;
    let profile = query_profile(&mut session)
        .with_context(|| format!("Failed to query device on {}", handle))?;
    session.close();

    info!("{}: {}", handle, profile);
    Ok(profile)
}

pub fn read_switch_table(
    provider: &dyn PortProvider,
    handle: &str,
    switch_count: u8,
) -> Result<SwitchTable> {
    let mut session = provider.connect(handle)?;
    let table = read_table(&mut session, switch_count)?;
    session.close();

    info!("read {} switches from {}", switch_count, handle);
    Ok(table)
}

/// Writes every switch, then reads the whole table back on the same
/// connection and returns what the keypad now holds.
///
/// Exactly `switch_count` write frames are sent. Lines past the last switch
/// are logged and dropped rather than sent with out-of-range switch indices.
pub fn write_switch_table(
    provider: &dyn PortProvider,
    handle: &str,
    text: &str,
    switch_count: u8,
    max_keys: u8,
) -> Result<SwitchTable> {
    let mut session = provider.connect(handle)?;
    write_table(&mut session, text, switch_count, max_keys)?;
    info!("wrote {} switches to {}", switch_count, handle);

    let table = read_table(&mut session, switch_count)
        .with_context(|| format!("Failed to confirm write on {}", handle))?;
    session.close();
    Ok(table)
}

/// Query followed by a full table read over a single connection.
pub fn inspect(provider: &dyn PortProvider, handle: &str) -> Result<(DeviceProfile, SwitchTable)> {
    let mut session = provider.connect(handle)?;
    let profile = query_profile(&mut session)
        .with_context(|| format!("Failed to query device on {}", handle))?;
    let table = read_table(&mut session, profile.switch_count)?;
    session.close();

    info!("{}: {}", handle, profile);
    Ok((profile, table))
}
