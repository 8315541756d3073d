//! Data model shared by the Blueshift BLE central crates.
//!
//! Everything here is a plain value: peripheral identifiers, advertisement
//! snapshots, scan filters, the GATT service tree, queued device actions and
//! per-device connection settings. The driver seam lives in
//! `blueshift-driver`; the connection and scanning state machines live in
//! `blueshift-central`.

pub mod advertisement;
pub mod constants;
pub mod error;
pub mod gatt;
pub mod settings;
pub mod types;

pub use advertisement::{AdvertisementData, ManufacturerData, PeripheralRecord, ScanFilter};
pub use error::{Error, Result};
pub use gatt::{
    ActionTarget, Characteristic, CharacteristicProperties, Descriptor, DeviceAction, Service,
    WriteType,
};
pub use settings::{ConnectionSettings, LogLevel, ReconnectionSettings};
pub use types::{Identifier, parse_uuid, uuid_from_u16};

pub use uuid::Uuid;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
