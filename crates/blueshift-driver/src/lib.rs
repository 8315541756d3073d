//! Native Bluetooth driver seam for the Blueshift BLE central.
//!
//! The platform Bluetooth stack is callback driven: every request returns at
//! once, and its completion arrives later as a callback on an arbitrary OS
//! thread. This crate models that contract with two traits and a sink:
//!
//! - [`PeripheralDriver`](traits::PeripheralDriver): per-peripheral GATT
//!   requests (connect, discovery, reads, writes, notifications, RSSI, MTU,
//!   bonding). Completions are [`PeripheralCallback`](traits::PeripheralCallback)
//!   values.
//! - [`AdapterDriver`](traits::AdapterDriver): scanning, adapter power and
//!   permission state, bonded-device retrieval. Signals are
//!   [`AdapterCallback`](traits::AdapterCallback) values.
//! - [`CallbackSink`](sink::CallbackSink): the thread-safe funnel a driver
//!   pushes callbacks into. The owning task drains it in order.
//!
//! The [`mock`] module provides programmable drivers used by tests and the
//! command-line simulator.
//!
//! # Examples
//!
//! ```
//! use blueshift_core::Identifier;
//! use blueshift_driver::mock::MockPeripheral;
//! use blueshift_driver::sink::CallbackSink;
//! use blueshift_driver::traits::{PeripheralCallback, PeripheralDriver};
//!
//! #[tokio::main]
//! async fn main() -> blueshift_driver::Result<()> {
//!     let id: Identifier = "AA:BB:CC:DD:EE:FF".parse().unwrap();
//!     let (mut peripheral, _handle) = MockPeripheral::new(id);
//!
//!     let (sink, mut callbacks) = CallbackSink::channel();
//!     peripheral.attach(sink);
//!
//!     peripheral.connect()?;
//!     assert_eq!(callbacks.recv().await, Some(PeripheralCallback::Connected));
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod mock;
pub mod sink;
pub mod traits;

pub use error::{DriverError, Result};
pub use sink::CallbackSink;
pub use traits::{AdapterCallback, AdapterDriver, PeripheralCallback, PeripheralDriver};
