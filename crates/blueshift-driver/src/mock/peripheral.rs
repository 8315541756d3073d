//! Mock peripheral driver for testing and development.
//!
//! [`MockPeripheral`] simulates one GATT server. By default it answers every
//! accepted request immediately with the matching completion callback, which
//! is enough for straight-line flows. Tests that need to control timing turn
//! auto-response off and drive callbacks through [`MockPeripheralHandle`].

use crate::{
    DriverError, Result,
    sink::CallbackSink,
    traits::{PeripheralCallback, PeripheralDriver},
};
use blueshift_core::{Identifier, Service, Uuid, WriteType, constants::MAX_MTU};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

/// A request received by a mock driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverRequest {
    Connect,
    Disconnect,
    DiscoverServices,
    ReadCharacteristic(Uuid),
    WriteCharacteristic {
        characteristic: Uuid,
        value: Vec<u8>,
        write_type: WriteType,
    },
    SetNotify {
        characteristic: Uuid,
        enabled: bool,
    },
    ReadDescriptor {
        characteristic: Uuid,
        descriptor: Uuid,
    },
    WriteDescriptor {
        characteristic: Uuid,
        descriptor: Uuid,
        value: Vec<u8>,
    },
    ReadRssi,
    RequestMtu(u16),
    Pair,
    Unpair,
}

#[derive(Debug)]
struct PeripheralState {
    sink: Option<CallbackSink<PeripheralCallback>>,
    auto_respond: bool,
    services: Vec<Service>,
    values: HashMap<Uuid, Vec<u8>>,
    descriptors: HashMap<(Uuid, Uuid), Vec<u8>>,
    failing: HashSet<Uuid>,
    connect_error: Option<DriverError>,
    rejected: bool,
    rssi: i16,
    bonded: bool,
    history: Vec<DriverRequest>,
}

impl PeripheralState {
    fn emit(&self, callback: PeripheralCallback) -> bool {
        match &self.sink {
            Some(sink) => sink.deliver(callback),
            None => false,
        }
    }

    fn gatt_error(&self, characteristic: &Uuid) -> Option<DriverError> {
        // 0x0E: ATT "unlikely error"
        self.failing
            .contains(characteristic)
            .then(|| DriverError::gatt(0x0E))
    }

    /// Completion callback for a request, computed against the current state.
    fn respond(&mut self, request: &DriverRequest) -> PeripheralCallback {
        match request {
            DriverRequest::Connect => match self.connect_error.clone() {
                Some(error) => PeripheralCallback::Disconnected { error: Some(error) },
                None => PeripheralCallback::Connected,
            },
            DriverRequest::Disconnect => PeripheralCallback::Disconnected { error: None },
            DriverRequest::DiscoverServices => PeripheralCallback::ServicesDiscovered {
                services: self.services.clone(),
            },
            DriverRequest::ReadCharacteristic(characteristic) => {
                let error = self.gatt_error(characteristic);
                PeripheralCallback::CharacteristicUpdated {
                    characteristic: *characteristic,
                    value: self.values.get(characteristic).cloned().unwrap_or_default(),
                    error,
                }
            }
            DriverRequest::WriteCharacteristic {
                characteristic,
                value,
                ..
            } => {
                let error = self.gatt_error(characteristic);
                if error.is_none() {
                    self.values.insert(*characteristic, value.clone());
                }
                PeripheralCallback::CharacteristicUpdated {
                    characteristic: *characteristic,
                    value: value.clone(),
                    error,
                }
            }
            DriverRequest::SetNotify {
                characteristic,
                enabled,
            } => PeripheralCallback::NotificationStateUpdated {
                characteristic: *characteristic,
                enabled: *enabled,
                error: self.gatt_error(characteristic),
            },
            DriverRequest::ReadDescriptor {
                characteristic,
                descriptor,
            } => PeripheralCallback::DescriptorUpdated {
                characteristic: *characteristic,
                descriptor: *descriptor,
                value: self
                    .descriptors
                    .get(&(*characteristic, *descriptor))
                    .cloned()
                    .unwrap_or_default(),
                error: self.gatt_error(characteristic),
            },
            DriverRequest::WriteDescriptor {
                characteristic,
                descriptor,
                value,
            } => {
                let error = self.gatt_error(characteristic);
                if error.is_none() {
                    self.descriptors
                        .insert((*characteristic, *descriptor), value.clone());
                }
                PeripheralCallback::DescriptorUpdated {
                    characteristic: *characteristic,
                    descriptor: *descriptor,
                    value: value.clone(),
                    error,
                }
            }
            DriverRequest::ReadRssi => PeripheralCallback::RssiRead { rssi: self.rssi },
            DriverRequest::RequestMtu(mtu) => PeripheralCallback::MtuChanged {
                mtu: (*mtu).min(MAX_MTU),
            },
            DriverRequest::Pair => {
                self.bonded = true;
                PeripheralCallback::BondStateChanged { bonded: true }
            }
            DriverRequest::Unpair => {
                self.bonded = false;
                PeripheralCallback::BondStateChanged { bonded: false }
            }
        }
    }
}

fn lock(state: &Mutex<PeripheralState>) -> MutexGuard<'_, PeripheralState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mock peripheral driver.
///
/// # Examples
///
/// ```
/// use blueshift_core::{Identifier, uuid_from_u16};
/// use blueshift_driver::mock::MockPeripheral;
/// use blueshift_driver::sink::CallbackSink;
/// use blueshift_driver::traits::{PeripheralCallback, PeripheralDriver};
///
/// #[tokio::main]
/// async fn main() -> blueshift_driver::Result<()> {
///     let battery = uuid_from_u16(0x2A19);
///     let (mut peripheral, handle) = MockPeripheral::new(Identifier::new("battery-01").unwrap());
///     handle.set_value(battery, vec![87]);
///
///     let (sink, mut callbacks) = CallbackSink::channel();
///     peripheral.attach(sink);
///     peripheral.read_characteristic(battery)?;
///
///     assert_eq!(
///         callbacks.recv().await,
///         Some(PeripheralCallback::CharacteristicUpdated {
///             characteristic: battery,
///             value: vec![87],
///             error: None,
///         })
///     );
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockPeripheral {
    identifier: Identifier,
    state: Arc<Mutex<PeripheralState>>,
    request_tx: mpsc::UnboundedSender<DriverRequest>,
}

impl MockPeripheral {
    /// Create a mock peripheral and the handle that controls it.
    pub fn new(identifier: Identifier) -> (Self, MockPeripheralHandle) {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let state = Arc::new(Mutex::new(PeripheralState {
            sink: None,
            auto_respond: true,
            services: Vec::new(),
            values: HashMap::new(),
            descriptors: HashMap::new(),
            failing: HashSet::new(),
            connect_error: None,
            rejected: false,
            rssi: -60,
            bonded: false,
            history: Vec::new(),
        }));

        let peripheral = Self {
            identifier: identifier.clone(),
            state: Arc::clone(&state),
            request_tx,
        };

        let handle = MockPeripheralHandle {
            identifier,
            state,
            request_rx: Arc::new(tokio::sync::Mutex::new(request_rx)),
        };

        (peripheral, handle)
    }

    fn submit(&mut self, request: DriverRequest) -> Result<()> {
        let mut state = lock(&self.state);
        if state.rejected {
            return Err(DriverError::rejected(format!("{request:?}")));
        }

        tracing::trace!(identifier = %self.identifier, ?request, "mock peripheral request");
        state.history.push(request.clone());
        let _ = self.request_tx.send(request.clone());

        if state.auto_respond {
            let callback = state.respond(&request);
            state.emit(callback);
        }
        Ok(())
    }
}

impl PeripheralDriver for MockPeripheral {
    fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    fn attach(&mut self, sink: CallbackSink<PeripheralCallback>) {
        lock(&self.state).sink = Some(sink);
    }

    fn connect(&mut self) -> Result<()> {
        self.submit(DriverRequest::Connect)
    }

    fn disconnect(&mut self) -> Result<()> {
        self.submit(DriverRequest::Disconnect)
    }

    fn discover_services(&mut self) -> Result<()> {
        self.submit(DriverRequest::DiscoverServices)
    }

    fn read_characteristic(&mut self, characteristic: Uuid) -> Result<()> {
        self.submit(DriverRequest::ReadCharacteristic(characteristic))
    }

    fn write_characteristic(
        &mut self,
        characteristic: Uuid,
        value: &[u8],
        write_type: WriteType,
    ) -> Result<()> {
        self.submit(DriverRequest::WriteCharacteristic {
            characteristic,
            value: value.to_vec(),
            write_type,
        })
    }

    fn set_notify(&mut self, characteristic: Uuid, enabled: bool) -> Result<()> {
        self.submit(DriverRequest::SetNotify {
            characteristic,
            enabled,
        })
    }

    fn read_descriptor(&mut self, characteristic: Uuid, descriptor: Uuid) -> Result<()> {
        self.submit(DriverRequest::ReadDescriptor {
            characteristic,
            descriptor,
        })
    }

    fn write_descriptor(&mut self, characteristic: Uuid, descriptor: Uuid, value: &[u8])
    -> Result<()> {
        self.submit(DriverRequest::WriteDescriptor {
            characteristic,
            descriptor,
            value: value.to_vec(),
        })
    }

    fn read_rssi(&mut self) -> Result<()> {
        self.submit(DriverRequest::ReadRssi)
    }

    fn request_mtu(&mut self, mtu: u16) -> Result<()> {
        self.submit(DriverRequest::RequestMtu(mtu))
    }

    fn pair(&mut self) -> Result<()> {
        self.submit(DriverRequest::Pair)
    }

    fn unpair(&mut self) -> Result<()> {
        self.submit(DriverRequest::Unpair)
    }
}

/// Handle for controlling a mock peripheral.
///
/// Clones share the same peripheral.
#[derive(Debug, Clone)]
pub struct MockPeripheralHandle {
    identifier: Identifier,
    state: Arc<Mutex<PeripheralState>>,
    request_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<DriverRequest>>>,
}

impl MockPeripheralHandle {
    /// Identifier of the controlled peripheral.
    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    /// Wait for the next request the driver receives.
    ///
    /// Returns `None` once the driver has been dropped and every request
    /// has been taken.
    pub async fn next_request(&self) -> Option<DriverRequest> {
        self.request_rx.lock().await.recv().await
    }

    /// All requests received so far, oldest first.
    pub fn requests(&self) -> Vec<DriverRequest> {
        lock(&self.state).history.clone()
    }

    /// Number of connect requests received so far.
    pub fn connect_count(&self) -> usize {
        lock(&self.state)
            .history
            .iter()
            .filter(|r| **r == DriverRequest::Connect)
            .count()
    }

    /// Push a callback to the attached sink.
    ///
    /// Returns `false` if no sink is attached or its owner has gone away.
    pub fn emit(&self, callback: PeripheralCallback) -> bool {
        lock(&self.state).emit(callback)
    }

    /// Simulate the link dropping.
    pub fn drop_connection(&self) -> bool {
        self.emit(PeripheralCallback::Disconnected {
            error: Some(DriverError::connection_lost("supervision timeout")),
        })
    }

    /// Simulate a notification from the peripheral.
    pub fn notify(&self, characteristic: Uuid, value: impl Into<Vec<u8>>) -> bool {
        let value = value.into();
        let mut state = lock(&self.state);
        state.values.insert(characteristic, value.clone());
        state.emit(PeripheralCallback::CharacteristicUpdated {
            characteristic,
            value,
            error: None,
        })
    }

    /// Answer requests automatically, or leave them for the test to answer.
    pub fn set_auto_respond(&self, enabled: bool) {
        lock(&self.state).auto_respond = enabled;
    }

    /// Make every subsequent request fail synchronously.
    pub fn set_rejecting(&self, rejected: bool) {
        lock(&self.state).rejected = rejected;
    }

    /// Set the service tree reported by discovery.
    pub fn set_services(&self, services: Vec<Service>) {
        lock(&self.state).services = services;
    }

    /// Set the value a characteristic read returns.
    pub fn set_value(&self, characteristic: Uuid, value: impl Into<Vec<u8>>) {
        lock(&self.state).values.insert(characteristic, value.into());
    }

    /// Current stored value of a characteristic.
    pub fn value(&self, characteristic: &Uuid) -> Option<Vec<u8>> {
        lock(&self.state).values.get(characteristic).cloned()
    }

    /// Make every operation on this characteristic complete with a GATT error.
    pub fn fail_uuid(&self, characteristic: Uuid) {
        lock(&self.state).failing.insert(characteristic);
    }

    /// Make connect attempts fail with this error, or succeed with `None`.
    pub fn set_connect_fails(&self, error: Option<DriverError>) {
        lock(&self.state).connect_error = error;
    }

    /// Set the RSSI reported by `read_rssi`.
    pub fn set_rssi(&self, rssi: i16) {
        lock(&self.state).rssi = rssi;
    }

    /// Whether the peripheral considers itself bonded.
    pub fn is_bonded(&self) -> bool {
        lock(&self.state).bonded
    }

    /// Answer a request the way auto mode would.
    ///
    /// Used in manual mode to release a request taken with
    /// [`next_request`](Self::next_request) at a chosen moment.
    pub fn respond(&self, request: &DriverRequest) -> bool {
        let mut state = lock(&self.state);
        let callback = state.respond(request);
        state.emit(callback)
    }
}
