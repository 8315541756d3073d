//! Mock adapter driver for testing and development.

use super::peripheral::{MockPeripheral, MockPeripheralHandle};
use crate::{
    DriverError, Result,
    sink::CallbackSink,
    traits::{AdapterCallback, AdapterDriver},
};
use blueshift_core::{AdvertisementData, Identifier, PeripheralRecord, ScanFilter};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
struct AdapterState {
    sink: Option<CallbackSink<AdapterCallback>>,
    supported: bool,
    enabled: bool,
    permission: bool,
    scan_refused: bool,
    scanning: Option<ScanFilter>,
    scan_starts: usize,
    bonded: Vec<PeripheralRecord>,
    pending: HashMap<Identifier, MockPeripheral>,
    handles: HashMap<Identifier, MockPeripheralHandle>,
}

impl AdapterState {
    fn emit(&self, callback: AdapterCallback) -> bool {
        match &self.sink {
            Some(sink) => sink.deliver(callback),
            None => false,
        }
    }
}

fn lock(state: &Mutex<AdapterState>) -> MutexGuard<'_, AdapterState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mock Bluetooth adapter.
///
/// Starts supported, enabled and permitted. Peripheral handles are created
/// on demand and remembered, so the test side can reach every peripheral the
/// core asked for through [`MockAdapterHandle::peripheral`].
///
/// # Examples
///
/// ```
/// use blueshift_core::{AdvertisementData, Identifier, ScanFilter};
/// use blueshift_driver::mock::MockAdapter;
/// use blueshift_driver::sink::CallbackSink;
/// use blueshift_driver::traits::{AdapterCallback, AdapterDriver};
///
/// #[tokio::main]
/// async fn main() -> blueshift_driver::Result<()> {
///     let (mut adapter, handle) = MockAdapter::new();
///     let (sink, mut signals) = CallbackSink::channel();
///     adapter.attach(sink);
///
///     adapter.start_scan(&ScanFilter::new())?;
///     let id = Identifier::new("AA:BB:CC:DD:EE:01").unwrap();
///     assert!(handle.discover(id.clone(), -48, AdvertisementData::new()));
///
///     match signals.recv().await {
///         Some(AdapterCallback::DeviceDiscovered(record)) => assert_eq!(record.identifier, id),
///         other => panic!("unexpected signal: {other:?}"),
///     }
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockAdapter {
    state: Arc<Mutex<AdapterState>>,
}

impl MockAdapter {
    /// Create a mock adapter and the handle that controls it.
    pub fn new() -> (Self, MockAdapterHandle) {
        let state = Arc::new(Mutex::new(AdapterState {
            sink: None,
            supported: true,
            enabled: true,
            permission: true,
            scan_refused: false,
            scanning: None,
            scan_starts: 0,
            bonded: Vec::new(),
            pending: HashMap::new(),
            handles: HashMap::new(),
        }));

        (
            Self {
                state: Arc::clone(&state),
            },
            MockAdapterHandle { state },
        )
    }
}

impl AdapterDriver for MockAdapter {
    type Peripheral = MockPeripheral;

    fn attach(&mut self, sink: CallbackSink<AdapterCallback>) {
        lock(&self.state).sink = Some(sink);
    }

    fn is_supported(&self) -> bool {
        lock(&self.state).supported
    }

    fn is_enabled(&self) -> bool {
        lock(&self.state).enabled
    }

    fn has_permission(&self) -> bool {
        lock(&self.state).permission
    }

    fn start_scan(&mut self, filter: &ScanFilter) -> Result<()> {
        let mut state = lock(&self.state);
        if !state.enabled {
            return Err(DriverError::AdapterUnavailable);
        }
        if !state.permission {
            return Err(DriverError::permission_denied("scan"));
        }
        if state.scan_refused {
            return Err(DriverError::rejected("start_scan"));
        }

        tracing::trace!(?filter, "mock adapter scan started");
        state.scanning = Some(filter.clone());
        state.scan_starts += 1;
        Ok(())
    }

    fn stop_scan(&mut self) -> Result<()> {
        tracing::trace!("mock adapter scan stopped");
        lock(&self.state).scanning = None;
        Ok(())
    }

    fn paired_peripherals(&self, filter: &ScanFilter) -> Result<Vec<PeripheralRecord>> {
        let state = lock(&self.state);
        if !state.enabled {
            return Err(DriverError::AdapterUnavailable);
        }
        Ok(state
            .bonded
            .iter()
            .filter(|record| filter.matches_record(record))
            .cloned()
            .collect())
    }

    fn peripheral(&mut self, identifier: &Identifier) -> MockPeripheral {
        let mut state = lock(&self.state);
        if let Some(peripheral) = state.pending.remove(identifier) {
            return peripheral;
        }

        let (peripheral, handle) = MockPeripheral::new(identifier.clone());
        state.handles.insert(identifier.clone(), handle);
        peripheral
    }
}

/// Handle for controlling a mock adapter.
#[derive(Debug, Clone)]
pub struct MockAdapterHandle {
    state: Arc<Mutex<AdapterState>>,
}

impl MockAdapterHandle {
    /// Report an advertisement.
    ///
    /// Only delivered while a scan is running; returns whether it was.
    pub fn discover(&self, identifier: Identifier, rssi: i16, advertisement: AdvertisementData) -> bool {
        let state = lock(&self.state);
        if state.scanning.is_none() {
            return false;
        }
        state.emit(AdapterCallback::DeviceDiscovered(PeripheralRecord::discovered(
            identifier,
            rssi,
            advertisement,
        )))
    }

    /// Power the adapter on or off.
    pub fn set_enabled(&self, enabled: bool) -> bool {
        let mut state = lock(&self.state);
        state.enabled = enabled;
        if !enabled {
            state.scanning = None;
        }
        state.emit(AdapterCallback::AdapterStateChanged { enabled })
    }

    /// Grant or revoke Bluetooth permission.
    pub fn set_permission(&self, granted: bool) -> bool {
        let mut state = lock(&self.state);
        state.permission = granted;
        if !granted {
            state.scanning = None;
        }
        state.emit(AdapterCallback::PermissionChanged { granted })
    }

    /// Mark BLE hardware as present or absent.
    pub fn set_supported(&self, supported: bool) {
        lock(&self.state).supported = supported;
    }

    /// Make `start_scan` fail synchronously.
    pub fn set_scan_refused(&self, refused: bool) {
        lock(&self.state).scan_refused = refused;
    }

    /// Add a bonded peripheral.
    pub fn add_bonded(&self, record: PeripheralRecord) {
        lock(&self.state).bonded.push(record);
    }

    /// Create the peripheral for `identifier` ahead of time so it can be
    /// configured before the core asks for it.
    pub fn prepare(&self, identifier: &Identifier) -> MockPeripheralHandle {
        let mut state = lock(&self.state);
        if let Some(handle) = state.handles.get(identifier) {
            return handle.clone();
        }

        let (peripheral, handle) = MockPeripheral::new(identifier.clone());
        state.pending.insert(identifier.clone(), peripheral);
        state.handles.insert(identifier.clone(), handle.clone());
        handle
    }

    /// Handle to a peripheral the adapter has created or prepared.
    pub fn peripheral(&self, identifier: &Identifier) -> Option<MockPeripheralHandle> {
        lock(&self.state).handles.get(identifier).cloned()
    }

    /// Whether a scan is running.
    pub fn is_scanning(&self) -> bool {
        lock(&self.state).scanning.is_some()
    }

    /// Filter of the running scan.
    pub fn scan_filter(&self) -> Option<ScanFilter> {
        lock(&self.state).scanning.clone()
    }

    /// Number of successful `start_scan` calls.
    pub fn scan_starts(&self) -> usize {
        lock(&self.state).scan_starts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blueshift_core::uuid_from_u16;

    fn id(s: &str) -> Identifier {
        Identifier::new(s).unwrap()
    }

    #[test]
    fn test_discover_requires_scan() {
        let (mut adapter, handle) = MockAdapter::new();
        let (sink, mut rx) = CallbackSink::channel();
        adapter.attach(sink);

        assert!(!handle.discover(id("a"), -50, AdvertisementData::new()));

        adapter.start_scan(&ScanFilter::new()).unwrap();
        assert!(handle.is_scanning());
        assert!(handle.discover(id("a"), -50, AdvertisementData::new()));
        assert!(matches!(rx.try_recv(), Ok(AdapterCallback::DeviceDiscovered(_))));

        adapter.stop_scan().unwrap();
        assert!(!handle.is_scanning());
    }

    #[test]
    fn test_scan_refused_when_disabled() {
        let (mut adapter, handle) = MockAdapter::new();
        let (sink, mut rx) = CallbackSink::channel();
        adapter.attach(sink);

        assert!(handle.set_enabled(false));
        assert_eq!(
            rx.try_recv().unwrap(),
            AdapterCallback::AdapterStateChanged { enabled: false }
        );
        assert_eq!(
            adapter.start_scan(&ScanFilter::new()),
            Err(DriverError::AdapterUnavailable)
        );
        assert_eq!(handle.scan_starts(), 0);
    }

    #[test]
    fn test_paired_peripherals_filtered() {
        let (adapter, handle) = MockAdapter::new();
        let heart_rate = uuid_from_u16(0x180D);

        handle.add_bonded(PeripheralRecord::bonded(id("bonded-1")));
        handle.add_bonded(PeripheralRecord::discovered(
            id("bonded-2"),
            -70,
            AdvertisementData::new().with_service(heart_rate),
        ));

        assert_eq!(adapter.paired_peripherals(&ScanFilter::new()).unwrap().len(), 2);

        let filtered = adapter
            .paired_peripherals(&ScanFilter::new().with_service(heart_rate))
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].identifier, id("bonded-2"));
    }

    #[test]
    fn test_prepared_peripheral_is_reused() {
        let (mut adapter, handle) = MockAdapter::new();
        let prepared = handle.prepare(&id("p"));
        prepared.set_rssi(-33);

        let _peripheral = adapter.peripheral(&id("p"));
        assert!(handle.peripheral(&id("p")).is_some());
        assert!(handle.peripheral(&id("unknown")).is_none());

        let _fresh = adapter.peripheral(&id("q"));
        assert!(handle.peripheral(&id("q")).is_some());
    }
}
