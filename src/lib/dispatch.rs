//! Runs keypad operations off the caller's thread and reports each one with
//! exactly one [`Outcome`] on a channel.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::{fmt::Display, sync::Arc};

use anyhow::{anyhow, Result};
use log::{debug, error};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::ops::{self, DeviceList, DeviceProfile, PortProvider, SwitchTable};
use crate::port::OpenPortError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Enumerate,
    Query,
    Read,
    Write,
    Inspect,
}

impl Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Enumerate => "enumerate".fmt(f),
            Operation::Query => "query".fmt(f),
            Operation::Read => "read".fmt(f),
            Operation::Write => "write".fmt(f),
            Operation::Inspect => "inspect".fmt(f),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The port could not be opened or was not ready.
    ConnectionFailed,
    /// Anything else that went wrong while talking to the port.
    ConnectionError,
}

/// Open errors mean the connection failed; a failed port listing does not.
pub fn classify(err: &anyhow::Error) -> FailureKind {
    let open_failed = err
        .chain()
        .filter_map(|e| e.downcast_ref::<OpenPortError>())
        .any(|e| !matches!(e, OpenPortError::Enumeration(_)));

    if open_failed {
        FailureKind::ConnectionFailed
    } else {
        FailureKind::ConnectionError
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Devices(DeviceList),
    Profile {
        handle: String,
        profile: DeviceProfile,
    },
    Table {
        handle: String,
        table: SwitchTable,
    },
    Written {
        handle: String,
        table: SwitchTable,
    },
    Inspected {
        handle: String,
        profile: DeviceProfile,
        table: SwitchTable,
    },
    Failed {
        operation: Operation,
        kind: FailureKind,
        message: String,
    },
}

impl Outcome {
    pub fn operation(&self) -> Operation {
        match self {
            Outcome::Devices(_) => Operation::Enumerate,
            Outcome::Profile { .. } => Operation::Query,
            Outcome::Table { .. } => Operation::Read,
            Outcome::Written { .. } => Operation::Write,
            Outcome::Inspected { .. } => Operation::Inspect,
            Outcome::Failed { operation, .. } => *operation,
        }
    }

    /// One-line status text for the user.
    pub fn status_message(&self) -> String {
        match self {
            Outcome::Devices(devices) => format!("Found {} devices", devices.entries().len()),
            Outcome::Profile { profile, .. } | Outcome::Inspected { profile, .. } => {
                profile.to_string()
            }
            Outcome::Table { table, .. } => format!("Read {} switches", table.0.len()),
            Outcome::Written { table, .. } => format!("Wrote {} switches", table.0.len()),
            Outcome::Failed {
                kind: FailureKind::ConnectionFailed,
                ..
            } => "Connection failed".to_string(),
            Outcome::Failed {
                kind: FailureKind::ConnectionError,
                ..
            } => "Connection error".to_string(),
        }
    }
}

pub struct Dispatcher {
    provider: Arc<dyn PortProvider>,
    outcomes: mpsc::UnboundedSender<Outcome>,
    runtime: Handle,
}

impl Dispatcher {
    pub fn new(
        provider: Arc<dyn PortProvider>,
        runtime: Handle,
    ) -> (Self, mpsc::UnboundedReceiver<Outcome>) {
        let (outcomes, receiver) = mpsc::unbounded_channel();
        (
            Self {
                provider,
                outcomes,
                runtime,
            },
            receiver,
        )
    }

    fn spawn<F>(&self, operation: Operation, job: F) -> JoinHandle<()>
    where
        F: FnOnce(&dyn PortProvider) -> Result<Outcome> + Send + 'static,
    {
        let provider = self.provider.clone();
        let outcomes = self.outcomes.clone();

        self.runtime.spawn_blocking(move || {
            debug!("{} started", operation);
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| job(&*provider)))
                .unwrap_or_else(|payload| {
                    Err(anyhow!("{} panicked: {}", operation, panic_message(&*payload)))
                })
                .unwrap_or_else(|e| {
                    error!("{} failed: {:#}", operation, e);
                    Outcome::Failed {
                        operation,
                        kind: classify(&e),
                        message: format!("{:#}", e),
                    }
                });

            if outcomes.send(outcome).is_err() {
                debug!("{} finished after receiver was dropped", operation);
            }
        })
    }

    pub fn enumerate_devices(&self) -> JoinHandle<()> {
        self.spawn(Operation::Enumerate, |provider| {
            ops::enumerate(provider).map(Outcome::Devices)
        })
    }

    pub fn query_device(&self, handle: &str) -> JoinHandle<()> {
        let handle = handle.to_string();
        self.spawn(Operation::Query, move |provider| {
            let profile = ops::query(provider, &handle)?;
            Ok(Outcome::Profile { handle, profile })
        })
    }

    pub fn read_switch_table(&self, handle: &str, switch_count: u8) -> JoinHandle<()> {
        let handle = handle.to_string();
        self.spawn(Operation::Read, move |provider| {
            let table = ops::read_switch_table(provider, &handle, switch_count)?;
            Ok(Outcome::Table { handle, table })
        })
    }

    pub fn write_switch_table(
        &self,
        handle: &str,
        text: &str,
        switch_count: u8,
        max_keys: u8,
    ) -> JoinHandle<()> {
        let handle = handle.to_string();
        let text = text.to_string();
        self.spawn(Operation::Write, move |provider| {
            let table = ops::write_switch_table(provider, &handle, &text, switch_count, max_keys)?;
            Ok(Outcome::Written { handle, table })
        })
    }

    pub fn inspect_device(&self, handle: &str) -> JoinHandle<()> {
        let handle = handle.to_string();
        self.spawn(Operation::Inspect, move |provider| {
            let (profile, table) = ops::inspect(provider, &handle)?;
            Ok(Outcome::Inspected {
                handle,
                profile,
                table,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockKeypad, MOCK_PORT};
    use crate::session::SessionError;

    fn start(keypad: &MockKeypad) -> (Dispatcher, mpsc::UnboundedReceiver<Outcome>) {
        Dispatcher::new(Arc::new(keypad.clone()), Handle::current())
    }

    struct BrokenPorts;

    impl PortProvider for BrokenPorts {
        fn list(&self) -> Result<Vec<crate::port::DeviceEntry>> {
            panic!("port listing blew up");
        }

        fn connect(&self, handle: &str) -> Result<crate::session::Session> {
            panic!("driver blew up on {}", handle);
        }
    }

    #[tokio::test]
    async fn enumerate_reports_devices() {
        let keypad = MockKeypad::new(2, 2);
        let (dispatcher, mut outcomes) = start(&keypad);

        dispatcher.enumerate_devices().await.unwrap();
        let outcome = outcomes.recv().await.unwrap();

        assert_eq!(outcome.operation(), Operation::Enumerate);
        assert_eq!(outcome.status_message(), "Found 1 devices");
        assert!(outcomes.try_recv().is_err());
    }

    #[tokio::test]
    async fn query_reports_profile() {
        let keypad = MockKeypad::new(5, 3);
        let (dispatcher, mut outcomes) = start(&keypad);

        dispatcher.query_device(MOCK_PORT).await.unwrap();

        assert_eq!(
            outcomes.recv().await.unwrap(),
            Outcome::Profile {
                handle: MOCK_PORT.to_string(),
                profile: DeviceProfile {
                    switch_count: 5,
                    max_keys: 3
                }
            }
        );
    }

    #[tokio::test]
    async fn busy_port_reports_connection_failed() {
        let keypad = MockKeypad::new(5, 3);
        keypad.set_busy(true);
        let (dispatcher, mut outcomes) = start(&keypad);

        dispatcher.read_switch_table(MOCK_PORT, 5).await.unwrap();
        let outcome = outcomes.recv().await.unwrap();

        assert!(matches!(
            outcome,
            Outcome::Failed {
                operation: Operation::Read,
                kind: FailureKind::ConnectionFailed,
                ..
            }
        ));
        assert_eq!(outcome.status_message(), "Connection failed");
        assert!(outcomes.try_recv().is_err());
    }

    #[tokio::test]
    async fn bad_response_reports_connection_error() {
        let keypad = MockKeypad::new(1, 3);
        keypad.truncate_responses(true);
        let (dispatcher, mut outcomes) = start(&keypad);

        dispatcher.read_switch_table(MOCK_PORT, 1).await.unwrap();
        let outcome = outcomes.recv().await.unwrap();

        assert!(matches!(
            outcome,
            Outcome::Failed {
                kind: FailureKind::ConnectionError,
                ..
            }
        ));
        assert_eq!(outcome.status_message(), "Connection error");
    }

    #[tokio::test]
    async fn write_reports_confirmed_table() {
        let keypad = MockKeypad::new(2, 3);
        let (dispatcher, mut outcomes) = start(&keypad);

        dispatcher
            .write_switch_table(MOCK_PORT, "A LEFT_CTRL B", 2, 3)
            .await
            .unwrap();

        match outcomes.recv().await.unwrap() {
            Outcome::Written { table, .. } => assert_eq!(table.to_text(), "A LEFT_CTRL B\n "),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn inspect_reports_profile_and_table() {
        let keypad = MockKeypad::new(2, 3);
        keypad.set_switch(1, &[0xB3]);
        let (dispatcher, mut outcomes) = start(&keypad);

        dispatcher.inspect_device(MOCK_PORT).await.unwrap();

        match outcomes.recv().await.unwrap() {
            Outcome::Inspected { profile, table, .. } => {
                assert_eq!(profile.switch_count, 2);
                assert_eq!(table.to_text(), " \nTAB");
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn panicking_job_still_reports_once() {
        let (dispatcher, mut outcomes) = Dispatcher::new(Arc::new(BrokenPorts), Handle::current());

        dispatcher.enumerate_devices().await.unwrap();
        dispatcher.query_device(MOCK_PORT).await.unwrap();

        match outcomes.recv().await.unwrap() {
            Outcome::Failed {
                operation,
                kind,
                message,
            } => {
                assert_eq!(operation, Operation::Enumerate);
                assert_eq!(kind, FailureKind::ConnectionError);
                assert_eq!(message, "enumerate panicked: port listing blew up");
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        match outcomes.recv().await.unwrap() {
            Outcome::Failed {
                operation, message, ..
            } => {
                assert_eq!(operation, Operation::Query);
                assert_eq!(message, format!("query panicked: driver blew up on {}", MOCK_PORT));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(outcomes.try_recv().is_err());
    }

    #[test]
    fn classify_errors() {
        let failed: anyhow::Error = OpenPortError::NoCompatiblePort.into();
        assert_eq!(classify(&failed), FailureKind::ConnectionFailed);

        let listing: anyhow::Error = OpenPortError::Enumeration("no udev".to_string()).into();
        assert_eq!(classify(&listing), FailureKind::ConnectionError);

        let timeout: anyhow::Error =
            SessionError::Timeout(std::time::Duration::from_millis(5)).into();
        assert_eq!(
            classify(&timeout.context("Failed to read switch 0")),
            FailureKind::ConnectionError
        );
    }
}
