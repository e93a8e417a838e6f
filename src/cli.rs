use clap::{Parser, Subcommand};
use core::time::Duration;

use manykey::port::{PortSettings, DEFAULT_BAUDRATE};
use manykey::SessionConfig;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    /// Open the port even if another process holds it
    #[clap(long, short)]
    pub force: bool,

    /// enable debug output
    #[clap(long, short)]
    pub debug: bool,

    /// Serial device or 'auto'
    #[clap(long, short, default_value = "auto")]
    pub port: String,

    /// UART baud rate
    #[clap(long, short, default_value_t = DEFAULT_BAUDRATE)]
    pub baudrate: u32,

    /// Response timeout in milliseconds, 0 waits forever
    #[clap(long, short, default_value_t = 2000)]
    pub timeout: u64,

    /// Use json-formatted output
    #[clap(long, short)]
    pub json: bool,

    #[clap(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            port: PortSettings {
                baudrate: self.baudrate,
                force: self.force,
                ..PortSettings::default()
            },
            frame_timeout: match self.timeout {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            },
            ..SessionConfig::default()
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List serial ports
    #[clap(visible_alias = "ls")]
    List,

    /// List key names understood by the keypad
    Keys,

    /// Query switch count and keys per switch
    Query,

    /// Read the key table, one line per switch
    Read {
        /// Switch count; queried from the device when omitted
        #[clap(long, short = 'n')]
        switches: Option<u8>,
    },

    /// Write the key table from a file ('-' for stdin) and print the result
    Write { input: String },

    /// Query the device and read its key table
    Show,
}
