//! Per-device connection manager task.
//!
//! One task owns the native peripheral handle, the GATT service cache and the
//! action queue. Driver callbacks and handle commands reach it over two
//! unbounded channels; callbacks are always drained first, so a command never
//! observes a state that a pending callback has already invalidated.
//!
//! ```text
//! ┌──────────────────┐  commands  ┌─────────────────────┐  requests  ┌────────┐
//! │ ConnectionHandle │ ─────────► │  ConnectionManager  │ ─────────► │ Driver │
//! └──────────────────┘            │  (one task/device)  │            └────────┘
//!         ▲                       │                     │  callbacks     │
//!         │ replies               │                     │ ◄──────────────┘
//!         └────────────────────── │                     │
//!                                 └─────────────────────┘
//!                                    │ ConnectionEvent
//!                                    ▼
//!                                 EventChannel
//! ```
//!
//! At most one action is in flight at the native layer; it lives inside the
//! `HandlingAction` phase, and later actions wait in FIFO order.

use super::event::{CompletedAction, ConnectionEvent, DisconnectCause};
use super::state::{ConnectedState, ConnectionState};
use crate::channel::{EventChannel, EventStream, EventSubscriber};
use crate::error::{CentralError, Result};
use crate::logging::device_log;
use blueshift_core::{
    ActionTarget, ConnectionSettings, DeviceAction, Identifier, LogLevel, Service, Uuid,
    constants::{MAX_MTU, MIN_MTU},
};
use blueshift_driver::{CallbackSink, DriverError, PeripheralCallback, PeripheralDriver};
use std::collections::{HashSet, VecDeque};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::Level;

/// Requests sent from handles to the manager task.
#[derive(Debug)]
enum Command {
    Connect(oneshot::Sender<bool>),
    Disconnect(oneshot::Sender<()>),
    DiscoverServices(oneshot::Sender<Result<Vec<Service>>>),
    PerformAction(DeviceAction, oneshot::Sender<CompletedAction>),
    ReadRssi(oneshot::Sender<Option<i16>>),
    RequestMtu(u16, oneshot::Sender<Option<u16>>),
    Pair(oneshot::Sender<bool>),
    Unpair(oneshot::Sender<bool>),
    Services(oneshot::Sender<Vec<Service>>),
    OnDisconnect(oneshot::Sender<DisconnectCause>),
}

#[derive(Debug)]
struct QueuedAction {
    action: DeviceAction,
    reply: oneshot::Sender<CompletedAction>,
}

#[derive(Debug)]
enum Activity {
    Idle,
    Discovering,
    HandlingAction(QueuedAction),
}

#[derive(Debug)]
enum Phase {
    Disconnected,
    Connecting,
    Connected(Activity),
    Disconnecting,
}

impl Phase {
    fn public(&self) -> ConnectionState {
        match self {
            Self::Disconnected => ConnectionState::Disconnected,
            Self::Connecting => ConnectionState::Connecting,
            Self::Connected(Activity::Idle) => ConnectionState::Connected(ConnectedState::Idle),
            Self::Connected(Activity::Discovering) => {
                ConnectionState::Connected(ConnectedState::Discovering)
            }
            Self::Connected(Activity::HandlingAction(queued)) => ConnectionState::Connected(
                ConnectedState::HandlingAction(queued.action.clone()),
            ),
            Self::Disconnecting => ConnectionState::Disconnecting,
        }
    }
}

/// State owned by the manager task.
struct ConnectionManager<P> {
    identifier: Identifier,
    log_level: LogLevel,
    driver: P,
    phase: Phase,
    queue: VecDeque<QueuedAction>,
    services: Vec<Service>,
    notifying: HashSet<Uuid>,
    connect_waiters: Vec<oneshot::Sender<bool>>,
    disconnect_waiters: Vec<oneshot::Sender<()>>,
    discover_waiters: Vec<oneshot::Sender<Result<Vec<Service>>>>,
    rssi_waiters: Vec<oneshot::Sender<Option<i16>>>,
    mtu_waiters: Vec<oneshot::Sender<Option<u16>>>,
    disconnect_listeners: Vec<oneshot::Sender<DisconnectCause>>,
    state: watch::Sender<ConnectionState>,
    events: EventChannel<ConnectionEvent>,
}

/// Start the manager task for one peripheral and return its handle.
///
/// Must be called from within a Tokio runtime. The task stops once every
/// handle is dropped, disconnecting the peripheral if needed.
pub fn spawn<P: PeripheralDriver>(mut driver: P, settings: &ConnectionSettings) -> ConnectionHandle {
    let identifier = driver.identifier().clone();
    let (callback_sink, callbacks) = CallbackSink::channel();
    driver.attach(callback_sink);

    let (commands_tx, commands) = mpsc::unbounded_channel();
    let (state, state_rx) = watch::channel(ConnectionState::Disconnected);
    let events = EventChannel::new(settings.event_buffer_size);
    let subscriber = events.subscriber();

    let manager = ConnectionManager {
        identifier: identifier.clone(),
        log_level: settings.log_level,
        driver,
        phase: Phase::Disconnected,
        queue: VecDeque::new(),
        services: Vec::new(),
        notifying: HashSet::new(),
        connect_waiters: Vec::new(),
        disconnect_waiters: Vec::new(),
        discover_waiters: Vec::new(),
        rssi_waiters: Vec::new(),
        mtu_waiters: Vec::new(),
        disconnect_listeners: Vec::new(),
        state,
        events,
    };
    tokio::spawn(manager.run(commands, callbacks));

    ConnectionHandle {
        identifier,
        commands: commands_tx,
        state: state_rx,
        events: subscriber,
    }
}

impl<P: PeripheralDriver> ConnectionManager<P> {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut callbacks: mpsc::UnboundedReceiver<PeripheralCallback>,
    ) {
        device_log!(self.log_level, Level::DEBUG, device = %self.identifier, "connection task started");

        loop {
            tokio::select! {
                biased;

                Some(callback) = callbacks.recv() => self.handle_callback(callback),

                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
            }
        }

        if !matches!(self.phase, Phase::Disconnected) {
            if let Err(error) = self.driver.disconnect() {
                device_log!(self.log_level, Level::WARN, device = %self.identifier, %error, "disconnect on shutdown refused");
            }
            self.finish_disconnect(DisconnectCause::Requested);
        }
        device_log!(self.log_level, Level::DEBUG, device = %self.identifier, "connection task stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect(reply) => self.connect(reply),
            Command::Disconnect(reply) => self.disconnect(reply),
            Command::DiscoverServices(reply) => self.discover_services(reply),
            Command::PerformAction(action, reply) => self.perform_action(action, reply),
            Command::ReadRssi(reply) => self.read_rssi(reply),
            Command::RequestMtu(mtu, reply) => self.request_mtu(mtu, reply),
            Command::Pair(reply) => {
                let _ = reply.send(self.driver.pair().is_ok());
            }
            Command::Unpair(reply) => {
                let _ = reply.send(self.driver.unpair().is_ok());
            }
            Command::Services(reply) => {
                let _ = reply.send(self.services.clone());
            }
            Command::OnDisconnect(listener) => self.disconnect_listeners.push(listener),
        }
    }

    fn handle_callback(&mut self, callback: PeripheralCallback) {
        device_log!(self.log_level, Level::TRACE, device = %self.identifier, ?callback, "driver callback");

        match callback {
            PeripheralCallback::Connected => self.on_connected(),
            PeripheralCallback::Disconnected { error } => self.on_disconnected(error),
            PeripheralCallback::ServicesDiscovered { services } => self.on_services(services),
            PeripheralCallback::CharacteristicUpdated {
                characteristic,
                value,
                error,
            } => self.on_characteristic(characteristic, value, error),
            PeripheralCallback::DescriptorUpdated {
                characteristic,
                descriptor,
                value,
                error,
            } => self.on_descriptor(characteristic, descriptor, value, error),
            PeripheralCallback::NotificationStateUpdated {
                characteristic,
                enabled,
                error,
            } => self.on_notification_state(characteristic, enabled, error),
            PeripheralCallback::RssiRead { rssi } => {
                self.emit(ConnectionEvent::RssiRead(rssi));
                for waiter in self.rssi_waiters.drain(..) {
                    let _ = waiter.send(Some(rssi));
                }
            }
            PeripheralCallback::MtuChanged { mtu } => {
                self.emit(ConnectionEvent::MtuChanged(mtu));
                for waiter in self.mtu_waiters.drain(..) {
                    let _ = waiter.send(Some(mtu));
                }
            }
            PeripheralCallback::BondStateChanged { bonded } => {
                self.emit(ConnectionEvent::BondStateChanged(bonded));
            }
            other => {
                device_log!(self.log_level, Level::DEBUG, device = %self.identifier, callback = ?other, "unhandled driver callback");
            }
        }
    }

    // --- state bookkeeping ---

    /// Move to `next`, publish it, and return the phase left behind.
    fn transition(&mut self, next: Phase) -> Phase {
        let from = self.phase.public();
        let to = next.public();
        if !from.can_transition_to(&to) {
            device_log!(self.log_level, Level::WARN, device = %self.identifier, %from, %to, "unexpected state transition");
        }

        device_log!(self.log_level, Level::DEBUG, device = %self.identifier, %from, %to, "state changed");
        self.state.send_replace(to);
        std::mem::replace(&mut self.phase, next)
    }

    fn emit(&self, event: ConnectionEvent) {
        device_log!(self.log_level, Level::TRACE, device = %self.identifier, %event, "event");
        self.events.send(event);
    }

    fn violation(&self, what: &str) {
        device_log!(self.log_level, Level::WARN, device = %self.identifier, state = %self.phase.public(), "protocol violation: {what}");
    }

    fn current_action(&self) -> Option<&DeviceAction> {
        match &self.phase {
            Phase::Connected(Activity::HandlingAction(queued)) => Some(&queued.action),
            _ => None,
        }
    }

    fn complete(&self, queued: QueuedAction, completed: CompletedAction) {
        if completed.succeeded {
            device_log!(self.log_level, Level::DEBUG, device = %self.identifier, action = %completed.action, "action completed");
        } else {
            device_log!(self.log_level, Level::INFO, device = %self.identifier, action = %completed.action, "action failed");
        }
        self.emit(ConnectionEvent::CompletedAction(completed.clone()));
        let _ = queued.reply.send(completed);
    }

    /// Complete the in-flight action and move on to the next one.
    fn finish_current(&mut self, completed: impl FnOnce(&DeviceAction) -> CompletedAction) {
        if let Phase::Connected(Activity::HandlingAction(queued)) =
            self.transition(Phase::Connected(Activity::Idle))
        {
            let completed = completed(&queued.action);
            self.complete(queued, completed);
        }
        self.pump();
    }

    /// Issue queued actions while the device is idle.
    fn pump(&mut self) {
        while matches!(self.phase, Phase::Connected(Activity::Idle)) {
            let Some(queued) = self.queue.pop_front() else {
                return;
            };

            match self.issue(&queued.action) {
                Ok(()) => {
                    self.transition(Phase::Connected(Activity::HandlingAction(queued)));
                }
                Err(error) => {
                    device_log!(self.log_level, Level::WARN, device = %self.identifier, action = %queued.action, %error, "driver refused action");
                    let completed = CompletedAction::failed(queued.action.clone());
                    self.complete(queued, completed);
                }
            }
        }
    }

    fn issue(&mut self, action: &DeviceAction) -> blueshift_driver::Result<()> {
        match action {
            DeviceAction::ReadCharacteristic { characteristic } => {
                self.driver.read_characteristic(*characteristic)
            }
            DeviceAction::ReadDescriptor {
                characteristic,
                descriptor,
            } => self.driver.read_descriptor(*characteristic, *descriptor),
            DeviceAction::WriteCharacteristic {
                characteristic,
                value,
                write_type,
            } => self
                .driver
                .write_characteristic(*characteristic, value, *write_type),
            DeviceAction::WriteDescriptor {
                characteristic,
                descriptor,
                value,
            } => self
                .driver
                .write_descriptor(*characteristic, *descriptor, value),
            DeviceAction::EnableNotification { characteristic } => {
                self.driver.set_notify(*characteristic, true)
            }
            DeviceAction::DisableNotification { characteristic } => {
                self.driver.set_notify(*characteristic, false)
            }
        }
    }

    fn cache_value(&mut self, characteristic: Uuid, value: &[u8]) {
        if let Some(cached) = Service::find_characteristic_mut(&mut self.services, &characteristic) {
            cached.value = value.to_vec();
        }
    }

    /// Tear down everything tied to the link and settle every waiter.
    fn finish_disconnect(&mut self, cause: DisconnectCause) {
        if let Phase::Connected(Activity::HandlingAction(queued)) =
            self.transition(Phase::Disconnected)
        {
            let completed = CompletedAction::failed(queued.action.clone());
            self.complete(queued, completed);
        }
        let queued: Vec<_> = self.queue.drain(..).collect();
        for queued in queued {
            let completed = CompletedAction::failed(queued.action.clone());
            self.complete(queued, completed);
        }

        self.notifying.clear();
        for service in &mut self.services {
            for characteristic in &mut service.characteristics {
                characteristic.is_notifying = false;
            }
        }

        for waiter in self.discover_waiters.drain(..) {
            let _ = waiter.send(Err(CentralError::disconnected(&self.identifier)));
        }
        for waiter in self.rssi_waiters.drain(..) {
            let _ = waiter.send(None);
        }
        for waiter in self.mtu_waiters.drain(..) {
            let _ = waiter.send(None);
        }
        for waiter in self.connect_waiters.drain(..) {
            let _ = waiter.send(false);
        }

        self.emit(ConnectionEvent::Disconnected);
        match &cause {
            DisconnectCause::Requested => {
                device_log!(self.log_level, Level::INFO, device = %self.identifier, "disconnected");
            }
            DisconnectCause::Unexpected(error) => {
                device_log!(self.log_level, Level::WARN, device = %self.identifier, ?error, "connection lost");
            }
        }

        for waiter in self.disconnect_waiters.drain(..) {
            let _ = waiter.send(());
        }
        for listener in self.disconnect_listeners.drain(..) {
            let _ = listener.send(cause.clone());
        }
    }

    // --- commands ---

    fn connect(&mut self, reply: oneshot::Sender<bool>) {
        match self.phase {
            Phase::Disconnected => {
                device_log!(self.log_level, Level::INFO, device = %self.identifier, "connecting");
                self.transition(Phase::Connecting);
                self.emit(ConnectionEvent::Connecting);
                self.connect_waiters.push(reply);

                if let Err(error) = self.driver.connect() {
                    device_log!(self.log_level, Level::WARN, device = %self.identifier, %error, "driver refused connect");
                    self.finish_disconnect(DisconnectCause::Unexpected(Some(error)));
                }
            }
            Phase::Connecting => self.connect_waiters.push(reply),
            Phase::Connected(_) => {
                let _ = reply.send(true);
            }
            Phase::Disconnecting => {
                let _ = reply.send(false);
            }
        }
    }

    fn disconnect(&mut self, reply: oneshot::Sender<()>) {
        match self.phase {
            Phase::Disconnected => {
                let _ = reply.send(());
            }
            Phase::Connecting => {
                device_log!(self.log_level, Level::INFO, device = %self.identifier, "cancelling connect");
                if let Err(error) = self.driver.disconnect() {
                    device_log!(self.log_level, Level::WARN, device = %self.identifier, %error, "driver refused connect cancellation");
                }
                self.emit(ConnectionEvent::CancelledConnecting);
                self.finish_disconnect(DisconnectCause::Requested);
                let _ = reply.send(());
            }
            Phase::Connected(_) => {
                device_log!(self.log_level, Level::INFO, device = %self.identifier, "disconnecting");
                self.disconnect_waiters.push(reply);
                // The in-flight action fails with the queue on teardown.
                let left = self.transition(Phase::Disconnecting);
                if let Phase::Connected(Activity::HandlingAction(queued)) = left {
                    self.queue.push_front(queued);
                }
                self.emit(ConnectionEvent::Disconnecting);

                if let Err(error) = self.driver.disconnect() {
                    device_log!(self.log_level, Level::WARN, device = %self.identifier, %error, "driver refused disconnect");
                    self.finish_disconnect(DisconnectCause::Requested);
                }
            }
            Phase::Disconnecting => self.disconnect_waiters.push(reply),
        }
    }

    fn discover_services(&mut self, reply: oneshot::Sender<Result<Vec<Service>>>) {
        match self.phase {
            Phase::Connected(Activity::Idle) => match self.driver.discover_services() {
                Ok(()) => {
                    self.transition(Phase::Connected(Activity::Discovering));
                    self.emit(ConnectionEvent::Discovering);
                    self.discover_waiters.push(reply);
                }
                Err(error) => {
                    let _ = reply.send(Err(error.into()));
                }
            },
            Phase::Connected(Activity::Discovering) => self.discover_waiters.push(reply),
            Phase::Connected(Activity::HandlingAction(_)) => {
                let _ = reply.send(Err(CentralError::invalid_state(
                    "discover services",
                    self.phase.public(),
                )));
            }
            _ => {
                let _ = reply.send(Err(CentralError::not_connected(&self.identifier)));
            }
        }
    }

    fn perform_action(&mut self, action: DeviceAction, reply: oneshot::Sender<CompletedAction>) {
        let queued = QueuedAction { action, reply };
        if !matches!(self.phase, Phase::Connected(_)) {
            device_log!(self.log_level, Level::DEBUG, device = %self.identifier, action = %queued.action, "action while not connected");
            let completed = CompletedAction::failed(queued.action.clone());
            self.complete(queued, completed);
            return;
        }

        self.queue.push_back(queued);
        self.pump();
    }

    fn read_rssi(&mut self, reply: oneshot::Sender<Option<i16>>) {
        if !matches!(self.phase, Phase::Connected(_)) {
            let _ = reply.send(None);
            return;
        }

        self.rssi_waiters.push(reply);
        if self.rssi_waiters.len() == 1
            && let Err(error) = self.driver.read_rssi()
        {
            device_log!(self.log_level, Level::WARN, device = %self.identifier, %error, "driver refused RSSI read");
            for waiter in self.rssi_waiters.drain(..) {
                let _ = waiter.send(None);
            }
        }
    }

    fn request_mtu(&mut self, mtu: u16, reply: oneshot::Sender<Option<u16>>) {
        if !(MIN_MTU..=MAX_MTU).contains(&mtu) {
            device_log!(self.log_level, Level::WARN, device = %self.identifier, mtu, "MTU out of range");
            let _ = reply.send(None);
            return;
        }
        if !matches!(self.phase, Phase::Connected(_)) {
            let _ = reply.send(None);
            return;
        }

        match self.driver.request_mtu(mtu) {
            Ok(()) => self.mtu_waiters.push(reply),
            Err(error) => {
                device_log!(self.log_level, Level::WARN, device = %self.identifier, %error, "driver refused MTU request");
                let _ = reply.send(None);
            }
        }
    }

    // --- callbacks ---

    fn on_connected(&mut self) {
        match self.phase {
            Phase::Connecting => {
                device_log!(self.log_level, Level::INFO, device = %self.identifier, "connected");
                self.transition(Phase::Connected(Activity::Idle));
                self.emit(ConnectionEvent::Connected);
                for waiter in self.connect_waiters.drain(..) {
                    let _ = waiter.send(true);
                }
                self.pump();
            }
            Phase::Disconnected => {
                // A connect that was cancelled completed anyway.
                self.violation("connected while disconnected");
                if let Err(error) = self.driver.disconnect() {
                    device_log!(self.log_level, Level::WARN, device = %self.identifier, %error, "driver refused disconnect");
                }
            }
            _ => self.violation("duplicate connected callback"),
        }
    }

    fn on_disconnected(&mut self, error: Option<DriverError>) {
        match self.phase {
            Phase::Disconnected => {
                device_log!(self.log_level, Level::TRACE, device = %self.identifier, "already disconnected");
            }
            Phase::Disconnecting => self.finish_disconnect(DisconnectCause::Requested),
            Phase::Connecting | Phase::Connected(_) => {
                self.finish_disconnect(DisconnectCause::Unexpected(error));
            }
        }
    }

    fn on_services(&mut self, mut services: Vec<Service>) {
        if !matches!(self.phase, Phase::Connected(Activity::Discovering)) {
            self.violation("services discovered without a discovery in flight");
            return;
        }

        for service in &mut services {
            for characteristic in &mut service.characteristics {
                characteristic.is_notifying = self.notifying.contains(&characteristic.uuid);
            }
        }
        device_log!(self.log_level, Level::INFO, device = %self.identifier, count = services.len(), "services discovered");
        self.services = services;

        self.transition(Phase::Connected(Activity::Idle));
        self.emit(ConnectionEvent::DiscoveredServices(self.services.clone()));
        for waiter in self.discover_waiters.drain(..) {
            let _ = waiter.send(Ok(self.services.clone()));
        }
        self.pump();
    }

    fn on_characteristic(&mut self, characteristic: Uuid, value: Vec<u8>, error: Option<DriverError>) {
        let mut handled = false;

        if error.is_none() && self.notifying.contains(&characteristic) {
            self.cache_value(characteristic, &value);
            self.emit(ConnectionEvent::CharacteristicChanged {
                characteristic,
                value: value.clone(),
            });
            handled = true;
        }

        let targets_current = matches!(
            self.current_action(),
            Some(
                DeviceAction::ReadCharacteristic { characteristic: c }
                | DeviceAction::WriteCharacteristic { characteristic: c, .. }
            ) if *c == characteristic
        );
        if targets_current {
            if error.is_none() {
                if let Some(DeviceAction::WriteCharacteristic { value: written, .. }) =
                    self.current_action().cloned()
                {
                    self.cache_value(characteristic, &written);
                } else {
                    self.cache_value(characteristic, &value);
                }
            }

            self.finish_current(|action| match (&error, action) {
                (Some(_), _) => CompletedAction::failed(action.clone()),
                (None, DeviceAction::ReadCharacteristic { .. }) => {
                    CompletedAction::succeeded(action.clone(), Some(value))
                }
                (None, _) => CompletedAction::succeeded(action.clone(), None),
            });
            handled = true;
        }

        if !handled {
            self.violation("characteristic update matches no action or subscription");
        }
    }

    fn on_descriptor(
        &mut self,
        characteristic: Uuid,
        descriptor: Uuid,
        value: Vec<u8>,
        error: Option<DriverError>,
    ) {
        let target = ActionTarget::Descriptor {
            characteristic,
            descriptor,
        };
        if self.current_action().map(DeviceAction::target) != Some(target) {
            self.violation("descriptor update matches no action");
            return;
        }

        if error.is_none()
            && let Some(cached) = Service::find_characteristic_mut(&mut self.services, &characteristic)
                .and_then(|c| c.descriptor_mut(&descriptor))
        {
            cached.value = value.clone();
        }

        self.finish_current(|action| match (&error, action) {
            (Some(_), _) => CompletedAction::failed(action.clone()),
            (None, DeviceAction::ReadDescriptor { .. }) => {
                CompletedAction::succeeded(action.clone(), Some(value))
            }
            (None, _) => CompletedAction::succeeded(action.clone(), None),
        });
    }

    fn on_notification_state(&mut self, characteristic: Uuid, enabled: bool, error: Option<DriverError>) {
        // Stacks report a failed change with the characteristic's actual
        // state, so only the UUID identifies the action.
        let targets_current = matches!(
            self.current_action(),
            Some(
                DeviceAction::EnableNotification { characteristic: c }
                | DeviceAction::DisableNotification { characteristic: c }
            ) if *c == characteristic
        );
        if !targets_current {
            self.violation("notification state update matches no action");
            return;
        }

        if error.is_none() {
            if enabled {
                self.notifying.insert(characteristic);
            } else {
                self.notifying.remove(&characteristic);
            }
            if let Some(cached) = Service::find_characteristic_mut(&mut self.services, &characteristic) {
                cached.is_notifying = enabled;
            }
        }

        self.finish_current(|action| match error {
            Some(_) => CompletedAction::failed(action.clone()),
            None => CompletedAction::succeeded(action.clone(), None),
        });
    }
}

/// Clonable handle to a running connection manager.
///
/// Every method is answered by the manager task in command order. Once the
/// task has stopped, methods resolve with their failure value.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    identifier: Identifier,
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    events: EventSubscriber<ConnectionEvent>,
}

impl ConnectionHandle {
    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Option<T> {
        let (tx, rx) = oneshot::channel();
        self.commands.send(command(tx)).ok()?;
        rx.await.ok()
    }

    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    /// Connect and wait for the outcome.
    ///
    /// Returns `true` once connected and `false` if the attempt ended
    /// disconnected. Joins an attempt already in progress.
    pub async fn connect(&self) -> bool {
        self.request(Command::Connect).await.unwrap_or(false)
    }

    /// Disconnect, or cancel a pending connect, and wait until disconnected.
    pub async fn disconnect(&self) {
        let _ = self.request(Command::Disconnect).await;
    }

    /// Discover the peripheral's services.
    ///
    /// # Errors
    /// Returns `CentralError::NotConnected` when not connected,
    /// `CentralError::InvalidState` while an action is in flight and
    /// `CentralError::Disconnected` if the link drops first.
    pub async fn discover_services(&self) -> Result<Vec<Service>> {
        self.request(Command::DiscoverServices)
            .await
            .unwrap_or_else(|| Err(CentralError::task_stopped("connection")))
    }

    /// Queue an action and wait for it to complete.
    ///
    /// Dropping the returned future does not cancel the action.
    pub async fn perform_action(&self, action: DeviceAction) -> CompletedAction {
        let fallback = CompletedAction::failed(action.clone());
        self.request(|reply| Command::PerformAction(action, reply))
            .await
            .unwrap_or(fallback)
    }

    /// Read the current RSSI. `None` if not connected or the read failed.
    pub async fn read_rssi(&self) -> Option<i16> {
        self.request(Command::ReadRssi).await.flatten()
    }

    /// Request an ATT MTU and return the negotiated value.
    ///
    /// Values outside 23..=517 are refused.
    pub async fn request_mtu(&self, mtu: u16) -> Option<u16> {
        self.request(|reply| Command::RequestMtu(mtu, reply))
            .await
            .flatten()
    }

    /// Ask the driver to bond. Returns whether the request was accepted.
    pub async fn pair(&self) -> bool {
        self.request(Command::Pair).await.unwrap_or(false)
    }

    /// Ask the driver to remove the bond. Returns whether the request was accepted.
    pub async fn unpair(&self) -> bool {
        self.request(Command::Unpair).await.unwrap_or(false)
    }

    /// Snapshot of the discovered service tree.
    pub async fn services(&self) -> Vec<Service> {
        self.request(Command::Services).await.unwrap_or_default()
    }

    /// Resolve once, on the next disconnect, with its cause.
    pub fn on_disconnect(&self) -> oneshot::Receiver<DisconnectCause> {
        let (tx, rx) = oneshot::channel();
        let _ = self.commands.send(Command::OnDisconnect(tx));
        rx
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    /// Watch the connection state.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Subscribe to connection events.
    pub fn events(&self) -> EventStream<ConnectionEvent> {
        self.events.subscribe()
    }

    /// Whether the manager task is still running.
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }
}
