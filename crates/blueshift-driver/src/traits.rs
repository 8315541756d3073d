//! Native driver trait definitions.
//!
//! These traits establish the contract between the BLE central core and the
//! platform Bluetooth bindings. Every request method is non-blocking: it
//! either hands the request to the stack and returns `Ok(())`, or reports a
//! synchronous refusal. The outcome of an accepted request arrives later as a
//! callback pushed into the [`CallbackSink`] given to [`attach`].
//!
//! Drivers make no promise about callback ordering relative to requests
//! beyond what the platform gives. Consumers must tolerate callbacks that
//! arrive late, twice, or for operations they never asked for.
//!
//! [`attach`]: PeripheralDriver::attach

use crate::error::Result;
use crate::sink::CallbackSink;
use blueshift_core::{Identifier, PeripheralRecord, ScanFilter, Service, Uuid, WriteType};

/// Completion callbacks raised by a peripheral driver.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PeripheralCallback {
    /// The link is up.
    Connected,

    /// The link is down.
    ///
    /// `error` is `None` for a disconnect the central asked for and carries
    /// the reason when the link was lost or never came up.
    Disconnected { error: Option<crate::DriverError> },

    /// Service discovery finished. The list may be empty.
    ServicesDiscovered { services: Vec<Service> },

    /// A characteristic read or write completed, or a notification arrived.
    CharacteristicUpdated {
        characteristic: Uuid,
        value: Vec<u8>,
        error: Option<crate::DriverError>,
    },

    /// A descriptor read or write completed.
    DescriptorUpdated {
        characteristic: Uuid,
        descriptor: Uuid,
        value: Vec<u8>,
        error: Option<crate::DriverError>,
    },

    /// A notification subscription change completed.
    NotificationStateUpdated {
        characteristic: Uuid,
        enabled: bool,
        error: Option<crate::DriverError>,
    },

    /// An RSSI read completed.
    RssiRead { rssi: i16 },

    /// The ATT MTU changed, either on request or by peripheral negotiation.
    MtuChanged { mtu: u16 },

    /// The bond with the peripheral was created or removed.
    BondStateChanged { bonded: bool },
}

/// Signals raised by an adapter driver.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AdapterCallback {
    /// A peripheral advertisement was received while scanning.
    DeviceDiscovered(PeripheralRecord),

    /// The adapter was powered on or off.
    AdapterStateChanged { enabled: bool },

    /// Bluetooth permission was granted or revoked.
    PermissionChanged { granted: bool },
}

/// Native handle to one peripheral.
///
/// # Examples
///
/// ```no_run
/// use blueshift_core::uuid_from_u16;
/// use blueshift_driver::sink::CallbackSink;
/// use blueshift_driver::traits::{PeripheralCallback, PeripheralDriver};
///
/// # async fn example<P: PeripheralDriver>(mut peripheral: P) -> blueshift_driver::Result<()> {
/// let (sink, mut callbacks) = CallbackSink::channel();
/// peripheral.attach(sink);
///
/// peripheral.connect()?;
/// while let Some(callback) = callbacks.recv().await {
///     if callback == PeripheralCallback::Connected {
///         peripheral.read_characteristic(uuid_from_u16(0x2A19))?;
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub trait PeripheralDriver: Send + 'static {
    /// Identifier of the peripheral this handle drives.
    fn identifier(&self) -> &Identifier;

    /// Register the sink completion callbacks are delivered to.
    ///
    /// Called once, before any request.
    fn attach(&mut self, sink: CallbackSink<PeripheralCallback>);

    /// Request a connection. Completes with `Connected` or `Disconnected`.
    fn connect(&mut self) -> Result<()>;

    /// Request a disconnect, or cancel a pending connect.
    /// Completes with `Disconnected`.
    fn disconnect(&mut self) -> Result<()>;

    /// Request service discovery. Completes with `ServicesDiscovered`.
    fn discover_services(&mut self) -> Result<()>;

    /// Request a characteristic read. Completes with `CharacteristicUpdated`.
    fn read_characteristic(&mut self, characteristic: Uuid) -> Result<()>;

    /// Request a characteristic write. Completes with `CharacteristicUpdated`.
    fn write_characteristic(
        &mut self,
        characteristic: Uuid,
        value: &[u8],
        write_type: WriteType,
    ) -> Result<()>;

    /// Request a notification subscription change.
    /// Completes with `NotificationStateUpdated`.
    fn set_notify(&mut self, characteristic: Uuid, enabled: bool) -> Result<()>;

    /// Request a descriptor read. Completes with `DescriptorUpdated`.
    fn read_descriptor(&mut self, characteristic: Uuid, descriptor: Uuid) -> Result<()>;

    /// Request a descriptor write. Completes with `DescriptorUpdated`.
    fn write_descriptor(&mut self, characteristic: Uuid, descriptor: Uuid, value: &[u8])
    -> Result<()>;

    /// Request an RSSI read. Completes with `RssiRead`.
    fn read_rssi(&mut self) -> Result<()>;

    /// Request an MTU exchange. Completes with `MtuChanged`.
    fn request_mtu(&mut self, mtu: u16) -> Result<()>;

    /// Request bonding. Completes with `BondStateChanged`.
    fn pair(&mut self) -> Result<()>;

    /// Request bond removal. Completes with `BondStateChanged`.
    fn unpair(&mut self) -> Result<()>;
}

/// Native handle to the local Bluetooth adapter.
///
/// The adapter also acts as the factory for per-peripheral handles, so the
/// core never names a platform type.
pub trait AdapterDriver: Send + 'static {
    /// Per-peripheral handle type produced by this adapter.
    type Peripheral: PeripheralDriver;

    /// Register the sink adapter signals are delivered to.
    fn attach(&mut self, sink: CallbackSink<AdapterCallback>);

    /// Whether the platform has BLE hardware at all.
    fn is_supported(&self) -> bool;

    /// Whether the adapter is currently powered on.
    fn is_enabled(&self) -> bool;

    /// Whether the application currently holds Bluetooth permission.
    fn has_permission(&self) -> bool;

    /// Start scanning. Results arrive as `DeviceDiscovered`.
    fn start_scan(&mut self, filter: &ScanFilter) -> Result<()>;

    /// Stop scanning.
    fn stop_scan(&mut self) -> Result<()>;

    /// Bonded peripherals matching the filter.
    fn paired_peripherals(&self, filter: &ScanFilter) -> Result<Vec<PeripheralRecord>>;

    /// Create the native handle for a peripheral.
    fn peripheral(&mut self, identifier: &Identifier) -> Self::Peripheral;
}
