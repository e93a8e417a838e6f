#[cfg(target_os = "linux")]
mod linux;
#[cfg(not(target_os = "linux"))]
mod other;

#[cfg(target_os = "linux")]
use linux::is_port_open;
#[cfg(not(target_os = "linux"))]
use other::is_port_open;

pub use serialport::SerialPort;

use anyhow::Result;
use core::time::Duration;
use log::debug;
use serialport::{self, DataBits, Parity, SerialPortInfo, SerialPortType, StopBits};
use thiserror::Error;

pub const DEFAULT_BAUDRATE: u32 = 9600;

#[derive(Error, Debug)]
pub enum OpenPortError {
    #[error("no usb serial ports found")]
    NoCompatiblePort,
    #[error("{port_name:?} busy")]
    PortBusy { port_name: String },
    #[error("{port_name:?} not ready: {reason}")]
    NotReady { port_name: String, reason: String },
    #[error("port enumeration failed: {0}")]
    Enumeration(String),
}

/// A serial port as offered to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEntry {
    pub label: String,
    pub path: String,
}

impl DeviceEntry {
    pub fn new(path: &str, description: &str) -> Self {
        DeviceEntry {
            label: format!("{} - {}", path, description),
            path: path.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PortSettings {
    pub baudrate: u32,
    /// Timeout of a single read call on the port, not of a whole frame.
    pub poll_interval: Duration,
    /// Open the port even when another process holds it.
    pub force: bool,
}

impl Default for PortSettings {
    fn default() -> Self {
        PortSettings {
            baudrate: DEFAULT_BAUDRATE,
            poll_interval: Duration::from_millis(10),
            force: false,
        }
    }
}

fn describe(info: &SerialPortInfo) -> String {
    match &info.port_type {
        SerialPortType::UsbPort(usb_info) => usb_info
            .product
            .clone()
            .or_else(|| usb_info.manufacturer.clone())
            .unwrap_or_else(|| format!("USB {:04x}:{:04x}", usb_info.vid, usb_info.pid)),
        SerialPortType::PciPort => "PCI".to_string(),
        SerialPortType::BluetoothPort => "Bluetooth".to_string(),
        SerialPortType::Unknown => "n/a".to_string(),
    }
}

pub fn available_ports() -> Result<Vec<DeviceEntry>> {
    let ports = serialport::available_ports()
        .map_err(|e| OpenPortError::Enumeration(e.to_string()))?;

    Ok(ports
        .iter()
        .map(|info| DeviceEntry::new(&info.port_name, &describe(info)))
        .collect())
}

fn guess_port() -> Result<String> {
    serialport::available_ports()
        .map_err(|e| OpenPortError::Enumeration(e.to_string()))?
        .into_iter()
        .filter(|info| matches!(info.port_type, SerialPortType::UsbPort(_)))
        .map(|info| info.port_name)
        .find(|name| !is_port_open(name))
        .ok_or_else(|| OpenPortError::NoCompatiblePort.into())
}

pub fn resolve_port_name(port_name: &str) -> Result<String> {
    if port_name == "auto" {
        guess_port()
    } else {
        Ok(port_name.to_string())
    }
}

/// Opens `port_name` at 8N1. Any failure to get a usable port is reported as
/// an [`OpenPortError`].
pub fn open_port(port_name: &str, settings: &PortSettings) -> Result<Box<dyn SerialPort>> {
    let true_name = resolve_port_name(port_name)?;

    if !settings.force && is_port_open(&true_name) {
        return Err(OpenPortError::PortBusy {
            port_name: true_name,
        }
        .into());
    }

    let port = serialport::new(&true_name, settings.baudrate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .timeout(settings.poll_interval)
        .open()
        .map_err(|e| OpenPortError::NotReady {
            port_name: true_name.clone(),
            reason: e.to_string(),
        })?;

    debug!("open_port OK: {} @ {} baud", &true_name, settings.baudrate);
    Ok(port)
}
