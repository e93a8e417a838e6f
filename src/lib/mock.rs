//! Simulated keypads for tests.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use num_traits::FromPrimitive;

use crate::frame::{Opcode, ETX, STX};
use crate::ops::PortProvider;
use crate::port::{DeviceEntry, OpenPortError};
use crate::session::{Link, Session, SessionConfig};

pub const MOCK_PORT: &str = "/dev/ttyMOCK0";

fn timed_out() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "no data")
}

pub fn test_config() -> SessionConfig {
    SessionConfig {
        frame_timeout: Some(Duration::from_millis(200)),
        settle_delay: Duration::from_millis(1),
        ..SessionConfig::default()
    }
}

/// Plays back a fixed byte sequence and records what is written.
pub struct ScriptedLink {
    incoming: VecDeque<u8>,
    sent: Arc<Mutex<Vec<u8>>>,
}

impl ScriptedLink {
    pub fn new(incoming: &[u8]) -> Self {
        Self {
            incoming: incoming.iter().copied().collect(),
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn sent(&self) -> Arc<Mutex<Vec<u8>>> {
        self.sent.clone()
    }
}

impl Read for ScriptedLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.incoming.pop_front() {
            Some(byte) if !buf.is_empty() => {
                buf[0] = byte;
                Ok(1)
            }
            _ => Err(timed_out()),
        }
    }
}

impl Write for ScriptedLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.sent.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Link for ScriptedLink {
    fn clear_input(&mut self) -> io::Result<()> {
        self.incoming.clear();
        Ok(())
    }
}

struct KeypadState {
    max_keys: u8,
    switches: Vec<Vec<u8>>,
    received: Vec<Vec<u8>>,
    busy: bool,
    truncate: bool,
}

impl KeypadState {
    fn respond(&mut self, request: &[u8]) -> Vec<u8> {
        self.received.push(request.to_vec());

        if request.len() < 3 || request[0] != STX {
            return vec![];
        }

        match Opcode::from_u8(request[1]) {
            Some(Opcode::Query) => {
                vec![STX, request[1], self.switches.len() as u8, self.max_keys, ETX]
            }
            Some(Opcode::Read) if self.truncate => vec![ETX],
            Some(Opcode::Read) if request.len() >= 4 => {
                let switch = request[2];
                let mut response = vec![STX, request[1], switch];
                if let Some(codes) = self.switches.get(usize::from(switch)) {
                    response.extend_from_slice(codes);
                }
                response.push(ETX);
                response
            }
            Some(Opcode::Write) if request.len() >= 4 => {
                let switch = request[2];
                let codes = &request[3..request.len() - 1];
                let keep = codes.len().min(self.max_keys.into());
                if let Some(slot) = self.switches.get_mut(usize::from(switch)) {
                    *slot = codes[..keep].to_vec();
                }
                vec![STX, request[1], switch, ETX]
            }
            _ => vec![],
        }
    }
}

/// A keypad with in-memory switch storage, reachable as [`MOCK_PORT`].
#[derive(Clone)]
pub struct MockKeypad {
    state: Arc<Mutex<KeypadState>>,
}

impl MockKeypad {
    pub fn new(switch_count: u8, max_keys: u8) -> Self {
        Self {
            state: Arc::new(Mutex::new(KeypadState {
                max_keys,
                switches: vec![Vec::new(); switch_count.into()],
                received: Vec::new(),
                busy: false,
                truncate: false,
            })),
        }
    }

    pub fn set_switch(&self, switch: usize, codes: &[u8]) {
        self.state.lock().unwrap().switches[switch] = codes.to_vec();
    }

    pub fn set_busy(&self, busy: bool) {
        self.state.lock().unwrap().busy = busy;
    }

    pub fn truncate_responses(&self, truncate: bool) {
        self.state.lock().unwrap().truncate = truncate;
    }

    /// Every complete request frame seen so far.
    pub fn received(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().received.clone()
    }
}

impl PortProvider for MockKeypad {
    fn list(&self) -> Result<Vec<DeviceEntry>> {
        Ok(vec![DeviceEntry::new(MOCK_PORT, "ManyKey")])
    }

    fn connect(&self, handle: &str) -> Result<Session> {
        let busy = self.state.lock().unwrap().busy;
        if busy || handle != MOCK_PORT {
            return Err(OpenPortError::PortBusy {
                port_name: handle.to_string(),
            }
            .into());
        }

        let link = MockLink {
            state: self.state.clone(),
            request: Vec::new(),
            incoming: VecDeque::new(),
        };
        Ok(Session::new(Box::new(link), test_config()))
    }
}

struct MockLink {
    state: Arc<Mutex<KeypadState>>,
    request: Vec<u8>,
    incoming: VecDeque<u8>,
}

impl Read for MockLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.incoming.pop_front() {
            Some(byte) if !buf.is_empty() => {
                buf[0] = byte;
                Ok(1)
            }
            _ => Err(timed_out()),
        }
    }
}

impl Write for MockLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for &byte in buf {
            self.request.push(byte);
            if byte == ETX {
                let response = self.state.lock().unwrap().respond(&self.request);
                self.incoming.extend(response);
                self.request.clear();
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Link for MockLink {
    fn clear_input(&mut self) -> io::Result<()> {
        self.incoming.clear();
        Ok(())
    }
}
