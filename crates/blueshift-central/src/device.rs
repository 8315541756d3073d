//! A discovered or bonded peripheral.
//!
//! A [`Device`] pairs the latest advertisement snapshot with the handle to
//! its connection manager task. Clones share identity; the connection task
//! stops, disconnecting if needed, when the last clone is dropped.
//!
//! # Examples
//!
//! ```
//! use blueshift_central::Device;
//! use blueshift_core::{AdvertisementData, ConnectionSettings, Identifier, PeripheralRecord};
//! use blueshift_driver::mock::MockPeripheral;
//!
//! #[tokio::main]
//! async fn main() {
//!     let id = Identifier::new("AA:BB:CC:DD:EE:FF").unwrap();
//!     let (peripheral, _mock) = MockPeripheral::new(id.clone());
//!     let record = PeripheralRecord::discovered(id, -52, AdvertisementData::new().with_name("Thermo"));
//!
//!     let device = Device::new(peripheral, &record, ConnectionSettings::default());
//!     assert_eq!(device.rssi(), Some(-52));
//!
//!     assert!(device.connect().await);
//!     device.disconnect().await;
//! }
//! ```

use crate::connection::{
    self, CompletedAction, ConnectionEvent, ConnectionHandle, ConnectionState, DisconnectCause,
};
use crate::channel::EventStream;
use crate::error::Result;
use crate::logging::device_log;
use crate::reconnect::{ReconnectDecision, ReconnectionPolicy};
use crate::scanning::Discoverable;
use blueshift_core::{
    AdvertisementData, ConnectionSettings, DeviceAction, Identifier, LogLevel, PeripheralRecord,
    Service,
};
use blueshift_driver::PeripheralDriver;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::Level;

/// Latest advertisement data seen for a device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdvertisementSnapshot {
    pub advertisement: Option<AdvertisementData>,
    pub rssi: Option<i16>,
    /// When the peripheral was last reported by the adapter.
    pub last_seen: Option<DateTime<Utc>>,
}

impl AdvertisementSnapshot {
    fn apply(&mut self, record: &PeripheralRecord) {
        if let Some(rssi) = record.rssi {
            self.rssi = Some(rssi);
        }
        if let Some(advertisement) = &record.advertisement {
            self.advertisement = Some(advertisement.clone());
        }
        if record.rssi.is_some() || record.advertisement.is_some() {
            self.last_seen = Some(Utc::now());
        }
    }
}

struct DeviceInner {
    identifier: Identifier,
    settings: ConnectionSettings,
    connection: ConnectionHandle,
    snapshot: watch::Sender<AdvertisementSnapshot>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl DeviceInner {
    fn replace_supervisor(&self, next: Option<JoinHandle<()>>) {
        let mut slot = self.supervisor.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = std::mem::replace(&mut *slot, next) {
            previous.abort();
        }
    }
}

impl Drop for DeviceInner {
    fn drop(&mut self) {
        self.replace_supervisor(None);
    }
}

/// A peripheral known to the central.
#[derive(Clone)]
pub struct Device {
    inner: Arc<DeviceInner>,
}

impl Device {
    /// Create a device and start its connection task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new<P: PeripheralDriver>(driver: P, record: &PeripheralRecord, settings: ConnectionSettings) -> Self {
        let connection = connection::spawn(driver, &settings);

        let mut snapshot = AdvertisementSnapshot::default();
        snapshot.apply(record);
        let (snapshot, _) = watch::channel(snapshot);

        Self {
            inner: Arc::new(DeviceInner {
                identifier: record.identifier.clone(),
                settings,
                connection,
                snapshot,
                supervisor: Mutex::new(None),
            }),
        }
    }

    pub fn identifier(&self) -> &Identifier {
        &self.inner.identifier
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.inner.settings
    }

    /// Whether both handles refer to the same device.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // --- advertisement snapshot ---

    pub fn snapshot(&self) -> AdvertisementSnapshot {
        self.inner.snapshot.borrow().clone()
    }

    pub fn watch_snapshot(&self) -> watch::Receiver<AdvertisementSnapshot> {
        self.inner.snapshot.subscribe()
    }

    pub fn advertisement(&self) -> Option<AdvertisementData> {
        self.inner.snapshot.borrow().advertisement.clone()
    }

    pub fn name(&self) -> Option<String> {
        self.inner
            .snapshot
            .borrow()
            .advertisement
            .as_ref()
            .and_then(|adv| adv.name.clone())
    }

    pub fn rssi(&self) -> Option<i16> {
        self.inner.snapshot.borrow().rssi
    }

    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.inner.snapshot.borrow().last_seen
    }

    /// Replace the snapshot with the fields present in `record`.
    pub fn refresh(&self, record: &PeripheralRecord) {
        self.inner.snapshot.send_modify(|snapshot| snapshot.apply(record));
    }

    // --- connection ---

    pub fn state(&self) -> ConnectionState {
        self.inner.connection.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection.watch_state()
    }

    /// Subscribe to this device's connection events.
    pub fn events(&self) -> EventStream<ConnectionEvent> {
        self.inner.connection.events()
    }

    /// Connect and keep the connection up according to the reconnection
    /// settings.
    ///
    /// Returns whether the connection came up. Unexpected disconnects after
    /// that are retried by a background supervisor until `disconnect` is
    /// called or the policy gives up.
    pub async fn connect(&self) -> bool {
        let listener = self.inner.connection.on_disconnect();
        let connected = self.inner.connection.connect().await;

        if connected {
            let supervisor = tokio::spawn(supervise(
                self.inner.connection.clone(),
                listener,
                ReconnectionPolicy::new(self.inner.settings.reconnection),
                self.inner.settings.reconnect_delay(),
                self.inner.settings.log_level,
            ));
            self.inner.replace_supervisor(Some(supervisor));
        }
        connected
    }

    /// Stop reconnecting and disconnect.
    pub async fn disconnect(&self) {
        self.inner.replace_supervisor(None);
        self.inner.connection.disconnect().await;
    }

    pub async fn discover_services(&self) -> Result<Vec<Service>> {
        self.inner.connection.discover_services().await
    }

    pub async fn services(&self) -> Vec<Service> {
        self.inner.connection.services().await
    }

    /// Queue an action and wait for its outcome.
    pub async fn perform_action(&self, action: DeviceAction) -> CompletedAction {
        self.inner.connection.perform_action(action).await
    }

    /// Read the RSSI of the live connection and record it in the snapshot.
    pub async fn read_rssi(&self) -> Option<i16> {
        let rssi = self.inner.connection.read_rssi().await?;
        self.inner.snapshot.send_modify(|snapshot| snapshot.rssi = Some(rssi));
        Some(rssi)
    }

    pub async fn request_mtu(&self, mtu: u16) -> Option<u16> {
        self.inner.connection.request_mtu(mtu).await
    }

    pub async fn pair(&self) -> bool {
        self.inner.connection.pair().await
    }

    pub async fn unpair(&self) -> bool {
        self.inner.connection.unpair().await
    }

    /// Resolve on the next disconnect with its cause.
    pub fn on_disconnect(&self) -> oneshot::Receiver<DisconnectCause> {
        self.inner.connection.on_disconnect()
    }
}

/// Reconnect after unexpected disconnects until the policy gives up.
///
/// Every attempt waits `delay` first.
async fn supervise(
    connection: ConnectionHandle,
    mut listener: oneshot::Receiver<DisconnectCause>,
    mut policy: ReconnectionPolicy,
    delay: Duration,
    log_level: LogLevel,
) {
    let identifier = connection.identifier().clone();
    loop {
        let Ok(cause) = listener.await else {
            return;
        };
        if !cause.is_unexpected() {
            return;
        }

        match policy.next() {
            ReconnectDecision::GiveUp => {
                device_log!(log_level, Level::INFO, device = %identifier, policy = %policy.settings(), "giving up reconnecting");
                return;
            }
            ReconnectDecision::Retry { attempt } => {
                device_log!(log_level, Level::INFO, device = %identifier, attempt, delay_ms = delay.as_millis() as u64, "reconnecting");
                tokio::time::sleep(delay).await;
                listener = connection.on_disconnect();
                if connection.connect().await {
                    policy.reset();
                }
            }
        }
    }
}

impl Discoverable for Device {
    fn identifier(&self) -> &Identifier {
        Device::identifier(self)
    }

    fn advertisement(&self) -> Option<AdvertisementData> {
        Device::advertisement(self)
    }

    fn refresh(&self, record: &PeripheralRecord) {
        Device::refresh(self, record);
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("identifier", &self.inner.identifier)
            .field("state", &self.state())
            .field("rssi", &self.rssi())
            .finish()
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name} ({})", self.inner.identifier),
            None => write!(f, "{}", self.inner.identifier),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blueshift_core::ReconnectionSettings;
    use blueshift_driver::mock::{MockPeripheral, MockPeripheralHandle};

    fn device(settings: ConnectionSettings) -> (Device, MockPeripheralHandle) {
        let id = Identifier::new("11:22:33:44:55:66").unwrap();
        let (peripheral, mock) = MockPeripheral::new(id.clone());
        let record = PeripheralRecord::discovered(id, -60, AdvertisementData::new().with_name("Scale"));
        (Device::new(peripheral, &record, settings), mock)
    }

    #[tokio::test]
    async fn test_snapshot_from_record() {
        let (device, _mock) = device(ConnectionSettings::default());

        assert_eq!(device.rssi(), Some(-60));
        assert_eq!(device.name().as_deref(), Some("Scale"));
        assert!(device.last_seen().is_some());
        assert_eq!(device.to_string(), "Scale (11:22:33:44:55:66)");
    }

    #[tokio::test]
    async fn test_refresh_keeps_absent_fields() {
        let (device, _mock) = device(ConnectionSettings::default());
        let mut watcher = device.watch_snapshot();

        device.refresh(&PeripheralRecord::bonded(device.identifier().clone()));
        assert_eq!(device.rssi(), Some(-60));
        assert_eq!(device.name().as_deref(), Some("Scale"));

        device.refresh(&PeripheralRecord::discovered(
            device.identifier().clone(),
            -30,
            AdvertisementData::new(),
        ));
        assert!(watcher.has_changed().unwrap());
        let snapshot = watcher.borrow_and_update().clone();
        assert_eq!(snapshot.rssi, Some(-30));
        assert_eq!(snapshot.advertisement, Some(AdvertisementData::new()));
    }

    #[tokio::test]
    async fn test_clones_share_identity() {
        let (device, _mock) = device(ConnectionSettings::default());
        let (other, _other_mock) = self::device(ConnectionSettings::default());

        assert!(device.ptr_eq(&device.clone()));
        assert!(!device.ptr_eq(&other));
    }

    #[tokio::test]
    async fn test_read_rssi_updates_snapshot() {
        let (device, mock) = device(ConnectionSettings::default());
        mock.set_rssi(-25);

        assert!(device.connect().await);
        assert_eq!(device.read_rssi().await, Some(-25));
        assert_eq!(device.rssi(), Some(-25));
    }

    #[tokio::test]
    async fn test_requested_disconnect_does_not_reconnect() {
        let settings = ConnectionSettings::default().with_reconnection(ReconnectionSettings::Always);
        let (device, mock) = device(settings);

        assert!(device.connect().await);
        device.disconnect().await;
        tokio::task::yield_now().await;

        assert_eq!(device.state(), ConnectionState::Disconnected);
        assert_eq!(mock.connect_count(), 1);
    }
}
