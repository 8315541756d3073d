//! Mock driver implementations for testing and development.
//!
//! This module provides simulated adapter and peripheral drivers that can be
//! controlled programmatically without Bluetooth hardware.

pub mod adapter;
pub mod peripheral;

pub use adapter::{MockAdapter, MockAdapterHandle};
pub use peripheral::{DriverRequest, MockPeripheral, MockPeripheralHandle};
