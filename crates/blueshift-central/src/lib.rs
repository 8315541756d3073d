//! BLE central connectivity core.
//!
//! ```text
//!                 ┌──────────────┐   ScanningState   ┌────────────┐
//!  AdapterDriver ─┤ Scanner task ├──────────────────►│ subscribers│
//!                 └──────┬───────┘                   └────────────┘
//!                        │ creates
//!                        ▼
//!                 ┌──────────────┐  ConnectionEvent  ┌────────────┐
//! PeripheralDriver┤ Device       ├──────────────────►│ subscribers│
//!                 │  └ manager   │                   └────────────┘
//!                 │  └ supervisor│
//!                 └──────────────┘
//! ```
//!
//! - [`Scanner`] owns an adapter driver and the [`ScanningState`] machine.
//! - [`Device`] is a shared handle to one peripheral: its advertisement
//!   snapshot, its connection manager task and its reconnection supervisor.
//! - [`connection`] serializes GATT actions over a single peripheral and
//!   publishes [`ConnectionEvent`]s.
//! - [`channel::EventChannel`] fans events out to any number of subscribers
//!   with a bounded replay window.
//!
//! # Examples
//!
//! ```
//! use blueshift_central::{Device, Scanner, ScannerConfig};
//! use blueshift_core::{AdvertisementData, Identifier, ScanFilter};
//! use blueshift_driver::mock::MockAdapter;
//!
//! #[tokio::main]
//! async fn main() -> blueshift_central::Result<()> {
//!     let (adapter, mock) = MockAdapter::new();
//!     let scanner = Scanner::new(adapter, ScannerConfig::default());
//!     scanner.initialize();
//!     scanner.start_scanning(ScanFilter::new());
//!
//!     let id = Identifier::new("AA:BB:CC:DD:EE:01")?;
//!     mock.discover(id.clone(), -52, AdvertisementData::new().with_name("Thermo"));
//!
//!     let state = scanner.snapshot().await;
//!     let device: &Device = &state.discovered()[0];
//!     assert_eq!(device.name().as_deref(), Some("Thermo"));
//!     assert!(device.connect().await);
//!
//!     scanner.shutdown().await
//! }
//! ```

pub mod channel;
pub mod config;
pub mod connection;
pub mod device;
pub mod error;
pub mod logging;
pub mod reconnect;
pub mod scanner;
pub mod scanning;

pub use channel::{EventChannel, EventStream, EventSubscriber};
pub use config::ScannerConfig;
pub use connection::{
    CompletedAction, ConnectedState, ConnectionEvent, ConnectionHandle, ConnectionState,
    DisconnectCause,
};
pub use device::{AdvertisementSnapshot, Device};
pub use error::{CentralError, Result};
pub use reconnect::{ReconnectDecision, ReconnectionPolicy};
pub use scanner::Scanner;
pub use scanning::{Discoverable, ScanningEvent, ScanningKind, ScanningState};

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
