pub mod dispatch;
pub mod frame;
pub mod keys;
pub mod ops;
pub mod port;
pub mod session;

#[cfg(test)]
mod mock;

pub use dispatch::{Dispatcher, FailureKind, Operation, Outcome};
pub use ops::{DeviceProfile, PortProvider, SwitchAssignment, SwitchTable, SystemPorts};
pub use session::{Session, SessionConfig};
