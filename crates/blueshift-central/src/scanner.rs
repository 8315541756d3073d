//! Scanner task.
//!
//! One task owns the adapter driver and the current [`ScanningState`]. It
//! merges adapter signals (discoveries, power, permission) and handle
//! commands through a single loop, so every state is derived from the one
//! before it in a fixed order. Adapter signals are drained first.
//!
//! Driver side effects follow from each (previous, next) pair:
//!
//! | previous  | next           | effect                     |
//! |-----------|----------------|----------------------------|
//! | not scanning | Scanning(f) | `start_scan(f)`            |
//! | Scanning(f)  | Scanning(g) | `stop_scan`, `start_scan(g)` when `f != g` |
//! | Scanning(f)  | not scanning | `stop_scan`               |
//!
//! A refused `start_scan` leaves the scanner in `Enabled.Idle`.
//!
//! # Examples
//!
//! ```
//! use blueshift_central::{Scanner, ScannerConfig};
//! use blueshift_central::scanning::ScanningKind;
//! use blueshift_core::{AdvertisementData, Identifier, ScanFilter};
//! use blueshift_driver::mock::MockAdapter;
//!
//! #[tokio::main]
//! async fn main() -> blueshift_central::Result<()> {
//!     let (adapter, mock) = MockAdapter::new();
//!     let scanner = Scanner::new(adapter, ScannerConfig::default());
//!
//!     scanner.initialize();
//!     scanner.start_scanning(ScanFilter::new());
//!     assert_eq!(scanner.snapshot().await.kind(), ScanningKind::Scanning);
//!
//!     mock.discover(Identifier::new("AA:BB:CC:DD:EE:01")?, -40, AdvertisementData::new());
//!     assert_eq!(scanner.snapshot().await.discovered().len(), 1);
//!
//!     scanner.shutdown().await
//! }
//! ```

use crate::channel::{EventChannel, EventStream, EventSubscriber};
use crate::config::ScannerConfig;
use crate::device::Device;
use crate::error::{CentralError, Result};
use crate::scanning::{ScanningEvent, ScanningKind, ScanningState};
use blueshift_core::{PeripheralRecord, ScanFilter};
use blueshift_driver::{AdapterCallback, AdapterDriver, CallbackSink};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

/// Requests sent from the handle to the scanner task.
#[derive(Debug)]
enum Command {
    Initialize,
    StartScanning(ScanFilter),
    StopScanning,
    Refresh(ScanFilter),
    RetrievePaired(ScanFilter, oneshot::Sender<Vec<Device>>),
    Deinitialize,
    Reinitialize,
    Snapshot(oneshot::Sender<ScanningState<Device>>),
    Shutdown,
}

/// Task termination classification for shutdown handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskTermination {
    /// Task returned.
    Completed,
    /// Task was cancelled.
    Cancelled,
    /// Task panicked.
    Panic,
}

fn classify_task_result(result: std::result::Result<(), tokio::task::JoinError>) -> TaskTermination {
    match result {
        Ok(()) => TaskTermination::Completed,
        Err(e) if e.is_cancelled() => TaskTermination::Cancelled,
        Err(_) => TaskTermination::Panic,
    }
}

struct ScannerTask<A> {
    adapter: A,
    config: ScannerConfig,
    state: ScanningState<Device>,
    watch: watch::Sender<ScanningState<Device>>,
    states: EventChannel<ScanningState<Device>>,
}

impl<A: AdapterDriver> ScannerTask<A> {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut signals: mpsc::UnboundedReceiver<AdapterCallback>,
    ) {
        tracing::debug!("scanner task started");

        loop {
            tokio::select! {
                biased;

                Some(signal) = signals.recv() => self.handle_signal(signal),

                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
            }
        }

        if self.state.is_scanning()
            && let Err(error) = self.adapter.stop_scan()
        {
            tracing::warn!(%error, "failed to stop scan on shutdown");
        }
        tracing::debug!("scanner task stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Initialize => {
                let supported = self.adapter.is_supported();
                self.apply(ScanningEvent::StartInitializing { supported });
                self.finish_initializing();
            }
            Command::StartScanning(filter) => self.apply(ScanningEvent::StartScanning(filter)),
            Command::StopScanning => self.apply(ScanningEvent::StopScanning),
            Command::Refresh(filter) => self.apply(ScanningEvent::Refresh(filter)),
            Command::RetrievePaired(filter, reply) => {
                let devices = self.retrieve_paired(&filter);
                let _ = reply.send(devices);
            }
            Command::Deinitialize => self.apply(ScanningEvent::Deinitialize),
            Command::Reinitialize => {
                self.apply(ScanningEvent::Reinitialize);
                self.finish_initializing();
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.state.clone());
            }
            Command::Shutdown => {}
        }
    }

    fn handle_signal(&mut self, signal: AdapterCallback) {
        match signal {
            AdapterCallback::DeviceDiscovered(record) => {
                tracing::trace!(device = %record.identifier, rssi = ?record.rssi, "advertisement");
                self.apply(ScanningEvent::DiscoverDevice(record));
            }
            AdapterCallback::AdapterStateChanged { enabled } => {
                tracing::info!(enabled, "adapter state changed");
                self.apply(if enabled {
                    ScanningEvent::Enable
                } else {
                    ScanningEvent::Disable
                });
            }
            AdapterCallback::PermissionChanged { granted } => {
                tracing::info!(granted, "permission changed");
                let event = if granted {
                    ScanningEvent::Permit {
                        enabled: self.adapter.is_enabled(),
                    }
                } else {
                    ScanningEvent::RevokePermission
                };
                self.apply(event);
            }
            other => tracing::debug!(signal = ?other, "unhandled adapter signal"),
        }
    }

    fn finish_initializing(&mut self) {
        if matches!(self.state, ScanningState::Initializing(_)) {
            let event = ScanningEvent::Initialized {
                has_permission: self.adapter.has_permission(),
                enabled: self.adapter.is_enabled(),
            };
            self.apply(event);
        }
    }

    fn retrieve_paired(&mut self, filter: &ScanFilter) -> Vec<Device> {
        if !matches!(self.state.kind(), ScanningKind::Idle | ScanningKind::Scanning) {
            tracing::debug!(state = %self.state, "paired device retrieval dropped while not enabled");
            return Vec::new();
        }

        let records = match self.adapter.paired_peripherals(filter) {
            Ok(records) => records,
            Err(error) => {
                tracing::warn!(%error, "paired device retrieval failed");
                return Vec::new();
            }
        };

        let identifiers: Vec<_> = records.iter().map(|r| r.identifier.clone()).collect();
        self.apply(ScanningEvent::PairedRetrieved(records));
        identifiers
            .iter()
            .filter_map(|identifier| self.state.find(identifier).cloned())
            .collect()
    }

    fn apply(&mut self, event: ScanningEvent) {
        let adapter = &mut self.adapter;
        let settings = &self.config.connection;
        let mut create = |record: &PeripheralRecord| {
            tracing::debug!(device = %record.identifier, "new device");
            Device::new(adapter.peripheral(&record.identifier), record, settings.clone())
        };

        let Some(next) = self.state.apply(&event, &mut create) else {
            tracing::debug!(state = %self.state, %event, "event not applicable");
            return;
        };

        let next = self.scan_effects(next);
        self.publish(next);
    }

    /// Start or stop the driver scan for the move to `next`.
    fn scan_effects(&mut self, next: ScanningState<Device>) -> ScanningState<Device> {
        let previous = self.state.filter().cloned();
        let wanted = next.filter().cloned();

        match (previous, wanted) {
            (Some(old), Some(new)) if old == new => next,
            (previous, Some(new)) => {
                if previous.is_some()
                    && let Err(error) = self.adapter.stop_scan()
                {
                    tracing::warn!(%error, "failed to stop scan before restart");
                }
                match self.adapter.start_scan(&new) {
                    Ok(()) => {
                        tracing::info!(filter = ?new, "scan started");
                        next
                    }
                    Err(error) => {
                        tracing::warn!(%error, "scan refused");
                        next.without_scan()
                    }
                }
            }
            (Some(_), None) => {
                match self.adapter.stop_scan() {
                    Ok(()) => tracing::info!("scan stopped"),
                    Err(error) => tracing::warn!(%error, "failed to stop scan"),
                }
                next
            }
            (None, None) => next,
        }
    }

    fn publish(&mut self, next: ScanningState<Device>) {
        if next.kind() != self.state.kind() {
            tracing::info!(from = %self.state.kind(), to = %next.kind(), "scanning state changed");
        }
        self.state = next.clone();
        self.watch.send_replace(next.clone());
        self.states.send(next);
    }
}

/// Handle to a running scanner task.
///
/// Dropping the handle stops the task, ending any scan in progress.
#[derive(Debug)]
pub struct Scanner {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ScanningState<Device>>,
    states: EventSubscriber<ScanningState<Device>>,
    task: JoinHandle<()>,
}

impl Scanner {
    /// Start a scanner task over `adapter`.
    ///
    /// Must be called from within a Tokio runtime. The scanner starts
    /// `NotInitialized`; call [`initialize`](Self::initialize) to probe the
    /// adapter.
    pub fn new<A: AdapterDriver>(mut adapter: A, config: ScannerConfig) -> Self {
        let (sink, signals) = CallbackSink::channel();
        adapter.attach(sink);

        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (watch, state) = watch::channel(ScanningState::NotInitialized);
        let states = EventChannel::new(config.state_buffer_size);
        let subscriber = states.subscriber();

        let task = ScannerTask {
            adapter,
            config,
            state: ScanningState::NotInitialized,
            watch,
            states,
        };
        let task = tokio::spawn(task.run(commands, signals));

        Self {
            commands: commands_tx,
            state,
            states: subscriber,
            task,
        }
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::warn!("scanner task is not running");
        }
    }

    /// Probe the adapter and settle into a ready or unavailable state.
    pub fn initialize(&self) {
        self.send(Command::Initialize);
    }

    /// Start scanning, or re-scope a running scan. Does not wait.
    pub fn start_scanning(&self, filter: ScanFilter) {
        self.send(Command::StartScanning(filter));
    }

    pub fn stop_scanning(&self) {
        self.send(Command::StopScanning);
    }

    /// Re-scope the discovered set without scanning.
    pub fn refresh(&self, filter: ScanFilter) {
        self.send(Command::Refresh(filter));
    }

    /// Fetch bonded peripherals matching `filter` and merge them into the
    /// paired set.
    ///
    /// Returns the matching devices. The list is empty unless the scanner
    /// is enabled (idle or scanning); outside that state nothing is fetched
    /// or merged.
    pub async fn retrieve_paired_devices(&self, filter: ScanFilter) -> Vec<Device> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::RetrievePaired(filter, tx));
        rx.await.unwrap_or_default()
    }

    /// Park the scanner, keeping its device snapshots.
    pub fn deinitialize(&self) {
        self.send(Command::Deinitialize);
    }

    /// Resume a parked scanner.
    pub fn reinitialize(&self) {
        self.send(Command::Reinitialize);
    }

    /// State after every previously sent command has been handled.
    pub async fn snapshot(&self) -> ScanningState<Device> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot(tx));
        match rx.await {
            Ok(state) => state,
            Err(_) => self.state(),
        }
    }

    /// Most recently published state.
    pub fn state(&self) -> ScanningState<Device> {
        self.state.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<ScanningState<Device>> {
        self.state.clone()
    }

    /// Every state change, in order.
    pub fn states(&self) -> EventStream<ScanningState<Device>> {
        self.states.subscribe()
    }

    /// Stop the task and wait for it to finish.
    ///
    /// # Errors
    /// Returns `CentralError::TaskStopped` if the task panicked.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.commands.send(Command::Shutdown);

        match classify_task_result(self.task.await) {
            TaskTermination::Completed | TaskTermination::Cancelled => Ok(()),
            TaskTermination::Panic => {
                tracing::error!("scanner task panicked");
                Err(CentralError::task_stopped("scanner task panicked"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanning::ScanningKind;
    use blueshift_core::{AdvertisementData, Identifier};
    use blueshift_driver::mock::MockAdapter;

    fn id(n: u8) -> Identifier {
        Identifier::new(format!("00:00:00:00:00:{n:02X}")).unwrap()
    }

    #[tokio::test]
    async fn test_not_initialized_until_asked() {
        let (adapter, _mock) = MockAdapter::new();
        let scanner = Scanner::new(adapter, ScannerConfig::default());

        assert_eq!(scanner.snapshot().await.kind(), ScanningKind::NotInitialized);
        scanner.start_scanning(ScanFilter::new());
        assert_eq!(scanner.snapshot().await.kind(), ScanningKind::NotInitialized);
    }

    #[tokio::test]
    async fn test_no_hardware() {
        let (adapter, mock) = MockAdapter::new();
        mock.set_supported(false);
        let scanner = Scanner::new(adapter, ScannerConfig::default());

        scanner.initialize();
        assert_eq!(scanner.snapshot().await.kind(), ScanningKind::NoHardware);
    }

    #[tokio::test]
    async fn test_scan_drives_adapter() {
        let (adapter, mock) = MockAdapter::new();
        let scanner = Scanner::new(adapter, ScannerConfig::default());

        scanner.initialize();
        scanner.start_scanning(ScanFilter::new());
        assert_eq!(scanner.snapshot().await.kind(), ScanningKind::Scanning);
        assert!(mock.is_scanning());

        scanner.stop_scanning();
        assert_eq!(scanner.snapshot().await.kind(), ScanningKind::Idle);
        assert!(!mock.is_scanning());
    }

    #[tokio::test]
    async fn test_refused_scan_falls_back_to_idle() {
        let (adapter, mock) = MockAdapter::new();
        mock.set_scan_refused(true);
        let scanner = Scanner::new(adapter, ScannerConfig::default());

        scanner.initialize();
        scanner.start_scanning(ScanFilter::new());
        assert_eq!(scanner.snapshot().await.kind(), ScanningKind::Idle);
    }

    #[tokio::test]
    async fn test_filter_change_restarts_scan() {
        let (adapter, mock) = MockAdapter::new();
        let scanner = Scanner::new(adapter, ScannerConfig::default());
        let filter = ScanFilter::new().with_name_prefix("Thermo");

        scanner.initialize();
        scanner.start_scanning(ScanFilter::new());
        scanner.start_scanning(ScanFilter::new());
        let _ = scanner.snapshot().await;
        assert_eq!(mock.scan_starts(), 1);

        scanner.start_scanning(filter.clone());
        let _ = scanner.snapshot().await;
        assert_eq!(mock.scan_starts(), 2);
        assert_eq!(mock.scan_filter(), Some(filter));
    }

    #[tokio::test]
    async fn test_states_stream_reports_each_change() {
        let (adapter, mock) = MockAdapter::new();
        let scanner = Scanner::new(adapter, ScannerConfig::default());
        let mut states = scanner.states();

        scanner.initialize();
        scanner.start_scanning(ScanFilter::new());
        let _ = scanner.snapshot().await;
        mock.discover(id(1), -50, AdvertisementData::new());
        let _ = scanner.snapshot().await;

        let kinds: Vec<_> = std::iter::from_fn(|| states.try_recv())
            .map(|state| state.kind())
            .collect();
        assert_eq!(
            kinds,
            vec![
                ScanningKind::Initializing,
                ScanningKind::Idle,
                ScanningKind::Scanning,
                ScanningKind::Scanning,
            ]
        );
    }

    #[tokio::test]
    async fn test_shutdown_stops_scan() {
        let (adapter, mock) = MockAdapter::new();
        let scanner = Scanner::new(adapter, ScannerConfig::default());

        scanner.initialize();
        scanner.start_scanning(ScanFilter::new());
        let _ = scanner.snapshot().await;

        scanner.shutdown().await.unwrap();
        assert!(!mock.is_scanning());
    }

    #[test]
    fn test_classify_task_result() {
        assert_eq!(classify_task_result(Ok(())), TaskTermination::Completed);
    }
}
