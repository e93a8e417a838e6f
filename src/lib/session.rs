//! One open connection to a keypad for the duration of one operation.

use std::io::{self, Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use log::debug;
use serialport::{ClearBuffer, SerialPort};
use thiserror::Error;

use crate::frame::ETX;
use crate::port::PortSettings;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("timed out after {0:?} waiting for response frame")]
    Timeout(Duration),
    #[error("response frame exceeds {0} bytes")]
    FrameTooLong(usize),
    #[error("connection closed by device")]
    Closed,
}

/// Byte stream to a keypad. Reads are expected to time out periodically
/// with `io::ErrorKind::TimedOut` when no data is pending.
pub trait Link: Read + Write + Send {
    fn clear_input(&mut self) -> io::Result<()>;
}

impl Link for Box<dyn SerialPort> {
    fn clear_input(&mut self) -> io::Result<()> {
        self.clear(ClearBuffer::Input).map_err(io::Error::from)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub port: PortSettings,
    /// `None` waits for the terminator forever.
    pub frame_timeout: Option<Duration>,
    pub max_frame_len: usize,
    /// Pause after each write frame before the input is flushed.
    pub settle_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            port: PortSettings::default(),
            frame_timeout: Some(Duration::from_secs(2)),
            max_frame_len: 1024,
            settle_delay: Duration::from_millis(100),
        }
    }
}

pub struct Session {
    link: Box<dyn Link>,
    config: SessionConfig,
}

impl Session {
    pub fn new(link: Box<dyn Link>, config: SessionConfig) -> Self {
        Self { link, config }
    }

    pub fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
        debug!("send {:02X?}", frame);
        self.link.write_all(frame)?;
        self.link.flush()?;
        Ok(())
    }

    /// Reads one byte at a time until the terminator, which is kept as the
    /// last byte of the returned frame.
    pub fn read_frame(&mut self) -> Result<Vec<u8>> {
        let started = Instant::now();
        let mut frame = Vec::new();
        let mut byte = [0u8; 1];

        loop {
            match self.link.read(&mut byte) {
                Ok(0) => return Err(SessionError::Closed.into()),
                Ok(_) => {
                    frame.push(byte[0]);
                    if byte[0] == ETX {
                        debug!("recv {:02X?}", frame);
                        return Ok(frame);
                    }
                    if frame.len() >= self.config.max_frame_len {
                        return Err(SessionError::FrameTooLong(self.config.max_frame_len).into());
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }

            if let Some(limit) = self.config.frame_timeout {
                if started.elapsed() >= limit {
                    debug!("partial frame {:02X?}", frame);
                    return Err(SessionError::Timeout(limit).into());
                }
            }
        }
    }

    pub fn transact(&mut self, frame: &[u8]) -> Result<Vec<u8>> {
        self.send_frame(frame)?;
        self.read_frame()
    }

    /// Gives the keypad time to commit a write, then drops whatever it sent.
    pub fn settle(&mut self) -> Result<()> {
        thread::sleep(self.config.settle_delay);
        self.link.clear_input()?;
        Ok(())
    }

    pub fn close(self) {
        debug!("close session");
    }
}
