//! Integration tests for the scanner task.
//!
//! Drives a [`Scanner`] over the mock adapter through discovery, scoping,
//! paired retrieval and adapter power/permission changes.

mod common;

use blueshift_central::{
    ConnectionState, Device, Scanner, ScannerConfig, ScanningKind, ScanningState,
};
use blueshift_core::{
    AdvertisementData, ConnectionSettings, DeviceAction, PeripheralRecord, ReconnectionSettings,
    ScanFilter,
};
use blueshift_driver::mock::{MockAdapter, MockAdapterHandle};
use common::{id, test_data, uuid};

async fn scanning() -> (Scanner, MockAdapterHandle) {
    let (adapter, mock) = MockAdapter::new();
    let scanner = Scanner::new(adapter, ScannerConfig::default());
    scanner.initialize();
    scanner.start_scanning(ScanFilter::new());
    assert_eq!(scanner.snapshot().await.kind(), ScanningKind::Scanning);
    (scanner, mock)
}

fn named(name: &str) -> AdvertisementData {
    AdvertisementData::new().with_name(name)
}

fn identifiers(devices: &[Device]) -> Vec<String> {
    devices.iter().map(|d| d.identifier().to_string()).collect()
}

fn same_devices(a: &[Device], b: &[Device]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.ptr_eq(y))
}

// ============================================================================
// Discovery
// ============================================================================

#[tokio::test]
async fn test_rediscovery_updates_in_place() {
    let (scanner, mock) = scanning().await;

    mock.discover(id(1), -80, named("Thermo"));
    let first = scanner.snapshot().await.discovered()[0].clone();

    mock.discover(id(1), -42, named("Thermo v2"));
    let state = scanner.snapshot().await;

    assert_eq!(state.discovered().len(), 1);
    let device = &state.discovered()[0];
    assert!(device.ptr_eq(&first));
    assert_eq!(device.rssi(), Some(-42));
    assert_eq!(device.name().as_deref(), Some("Thermo v2"));
    assert!(device.last_seen().is_some());
}

#[tokio::test]
async fn test_new_devices_append_in_observation_order() {
    let (scanner, mock) = scanning().await;

    for n in [3, 1, 2, 1, 3] {
        mock.discover(id(n), -60, AdvertisementData::new());
    }
    let state = scanner.snapshot().await;

    assert_eq!(
        identifiers(state.discovered()),
        vec![id(3).to_string(), id(1).to_string(), id(2).to_string()]
    );
}

#[tokio::test]
async fn test_scoped_scan_leaves_paired_untouched() {
    let (adapter, mock) = MockAdapter::new();
    mock.add_bonded(PeripheralRecord::bonded(id(9)));
    let scanner = Scanner::new(adapter, ScannerConfig::default());
    scanner.initialize();

    let paired = scanner.retrieve_paired_devices(ScanFilter::new()).await;
    assert_eq!(identifiers(&paired), vec![id(9).to_string()]);

    scanner.start_scanning(ScanFilter::new());
    mock.discover(id(1), -60, named("Scale"));
    mock.discover(id(2), -60, named("Thermo-A"));
    let before = scanner.snapshot().await;
    assert_eq!(before.discovered().len(), 2);

    let filter = ScanFilter::new().with_name_prefix("Thermo");
    scanner.start_scanning(filter.clone());
    mock.discover(id(3), -60, named("Scale"));
    mock.discover(id(4), -60, named("Thermo-B"));
    scanner.stop_scanning();

    let after = scanner.snapshot().await;
    assert_eq!(after.kind(), ScanningKind::Idle);
    assert_eq!(
        identifiers(after.discovered()),
        vec![id(2).to_string(), id(4).to_string()]
    );
    assert!(same_devices(after.paired(), before.paired()));
    assert!(same_devices(after.paired(), &paired));
    assert!(!mock.is_scanning());
}

#[tokio::test]
async fn test_refresh_rescopes_without_scanning() {
    let (scanner, mock) = scanning().await;
    mock.discover(id(1), -60, named("Scale"));
    mock.discover(id(2), -60, named("Thermo"));
    scanner.stop_scanning();

    scanner.refresh(ScanFilter::new().with_identifier(id(1)));
    let state = scanner.snapshot().await;

    assert_eq!(state.kind(), ScanningKind::Idle);
    assert_eq!(identifiers(state.discovered()), vec![id(1).to_string()]);
    assert_eq!(mock.scan_starts(), 1);
}

// ============================================================================
// Paired devices
// ============================================================================

#[tokio::test]
async fn test_discovery_reuses_paired_device() {
    let (adapter, mock) = MockAdapter::new();
    mock.add_bonded(PeripheralRecord::bonded(id(5)));
    let scanner = Scanner::new(adapter, ScannerConfig::default());
    scanner.initialize();

    let paired = scanner.retrieve_paired_devices(ScanFilter::new()).await;
    scanner.start_scanning(ScanFilter::new());
    mock.discover(id(5), -50, named("Bonded"));

    let state = scanner.snapshot().await;
    assert!(state.discovered()[0].ptr_eq(&paired[0]));
    assert_eq!(paired[0].rssi(), Some(-50));
}

#[tokio::test]
async fn test_retrieve_paired_before_initialize() {
    let (adapter, mock) = MockAdapter::new();
    mock.add_bonded(PeripheralRecord::bonded(id(5)));
    let scanner = Scanner::new(adapter, ScannerConfig::default());

    assert!(scanner.retrieve_paired_devices(ScanFilter::new()).await.is_empty());
}

#[tokio::test]
async fn test_retrieve_paired_while_disabled() {
    let (adapter, mock) = MockAdapter::new();
    mock.add_bonded(PeripheralRecord::bonded(id(5)));
    let scanner = Scanner::new(adapter, ScannerConfig::default());
    scanner.initialize();
    assert_eq!(scanner.retrieve_paired_devices(ScanFilter::new()).await.len(), 1);

    mock.set_enabled(false);
    assert!(scanner.retrieve_paired_devices(ScanFilter::new()).await.is_empty());

    let state = scanner.snapshot().await;
    assert_eq!(state.kind(), ScanningKind::Disabled);
    assert_eq!(identifiers(state.paired()), vec![id(5).to_string()]);
}

// ============================================================================
// Adapter availability
// ============================================================================

#[tokio::test]
async fn test_permission_and_power_changes_keep_snapshots() {
    let (scanner, mock) = scanning().await;
    mock.discover(id(1), -60, AdvertisementData::new());
    let before = scanner.snapshot().await;

    mock.set_permission(false);
    assert_eq!(scanner.snapshot().await.kind(), ScanningKind::MissingPermissions);
    mock.set_permission(true);
    let state = scanner.snapshot().await;
    assert_eq!(state.kind(), ScanningKind::Idle);
    assert!(same_devices(state.discovered(), before.discovered()));

    mock.set_enabled(false);
    assert_eq!(scanner.snapshot().await.kind(), ScanningKind::Disabled);
    mock.set_enabled(true);
    let state = scanner.snapshot().await;
    assert_eq!(state.kind(), ScanningKind::Idle);
    assert!(same_devices(state.discovered(), before.discovered()));
}

#[tokio::test]
async fn test_permission_granted_while_powered_off() {
    let (adapter, mock) = MockAdapter::new();
    mock.set_permission(false);
    mock.set_enabled(false);
    let scanner = Scanner::new(adapter, ScannerConfig::default());

    scanner.initialize();
    assert_eq!(scanner.snapshot().await.kind(), ScanningKind::MissingPermissions);

    mock.set_permission(true);
    assert_eq!(scanner.snapshot().await.kind(), ScanningKind::Disabled);
    mock.set_enabled(true);
    assert_eq!(scanner.snapshot().await.kind(), ScanningKind::Idle);
}

#[tokio::test]
async fn test_deinitialize_preserves_snapshot() {
    let (scanner, mock) = scanning().await;
    mock.discover(id(1), -60, AdvertisementData::new());
    let before = scanner.snapshot().await;

    scanner.deinitialize();
    let parked = scanner.snapshot().await;
    assert_eq!(parked.kind(), ScanningKind::Deinitialized);
    assert!(same_devices(parked.discovered(), before.discovered()));
    assert!(!mock.is_scanning());

    scanner.start_scanning(ScanFilter::new());
    assert_eq!(scanner.snapshot().await.kind(), ScanningKind::Deinitialized);

    scanner.reinitialize();
    let state = scanner.snapshot().await;
    assert_eq!(state.kind(), ScanningKind::Idle);
    assert!(same_devices(state.discovered(), before.discovered()));
}

#[tokio::test]
async fn test_watch_follows_published_state() {
    let (scanner, mock) = scanning().await;
    let mut watch = scanner.watch_state();
    watch.borrow_and_update();

    mock.set_enabled(false);
    watch.changed().await.unwrap();
    assert!(matches!(*watch.borrow(), ScanningState::NoBluetooth(_)));
    assert_eq!(scanner.state().kind(), ScanningKind::Disabled);
}

// ============================================================================
// End to end
// ============================================================================

#[tokio::test]
async fn test_connect_scanned_device() {
    let (adapter, mock) = MockAdapter::new();
    let peripheral = mock.prepare(&id(1));
    peripheral.set_services(common::sensor_services());
    peripheral.set_value(uuid(test_data::TEMPERATURE), vec![19]);

    let config = ScannerConfig::default().with_connection(
        ConnectionSettings::default().with_reconnection(ReconnectionSettings::Limited(3)),
    );
    let scanner = Scanner::new(adapter, config);
    scanner.initialize();
    scanner.start_scanning(ScanFilter::new());
    mock.discover(id(1), -48, named(test_data::DEVICE_NAME));

    let device = scanner.snapshot().await.discovered()[0].clone();
    assert_eq!(device.settings().reconnection, ReconnectionSettings::Limited(3));

    assert!(device.connect().await);
    assert_eq!(device.discover_services().await.unwrap().len(), 1);
    let read = device
        .perform_action(DeviceAction::read_characteristic(uuid(test_data::TEMPERATURE)))
        .await;
    assert_eq!(read.value, Some(vec![19]));

    device.disconnect().await;
    assert_eq!(device.state(), ConnectionState::Disconnected);
    scanner.shutdown().await.unwrap();
}
