//! Common test utilities for integration tests.
//!
//! Devices are built over [`MockPeripheral`] and scanners over
//! [`MockAdapter`]. Tests run on a paused clock, so [`settle`] returns only
//! after every other task has gone idle.

#![allow(dead_code)]

use blueshift_central::{ConnectionEvent, Device, EventStream};
use blueshift_core::{
    AdvertisementData, Characteristic, CharacteristicProperties, ConnectionSettings, Descriptor,
    Identifier, PeripheralRecord, Service, Uuid, constants::DEFAULT_RECONNECT_DELAY_MS,
    uuid_from_u16,
};
use blueshift_driver::mock::{DriverRequest, MockPeripheral, MockPeripheralHandle};
use std::time::Duration;

// ============================================================================
// Test Data Constants
// ============================================================================

pub mod test_data {
    /// Environmental sensing service.
    pub const SENSOR_SERVICE: u16 = 0x181A;
    /// Temperature characteristic (readable, notifying).
    pub const TEMPERATURE: u16 = 0x2A6E;
    /// Humidity characteristic (readable, notifying).
    pub const HUMIDITY: u16 = 0x2A6F;
    /// Control point (writable).
    pub const CONTROL: u16 = 0x2A9F;
    /// Characteristic user description, attached to temperature.
    pub const USER_DESCRIPTION: u16 = 0x2901;

    pub const DEVICE_NAME: &str = "Thermo-01";
}

pub fn uuid(short: u16) -> Uuid {
    uuid_from_u16(short)
}

pub fn id(n: u8) -> Identifier {
    Identifier::new(format!("AA:BB:CC:DD:EE:{n:02X}")).unwrap()
}

/// Service tree exposed by the sensor fixture.
pub fn sensor_services() -> Vec<Service> {
    let notifying = CharacteristicProperties::READ | CharacteristicProperties::NOTIFY;
    vec![
        Service::new(uuid(test_data::SENSOR_SERVICE))
            .with_characteristic(
                Characteristic::new(uuid(test_data::TEMPERATURE), notifying)
                    .with_descriptor(Descriptor::new(uuid(test_data::USER_DESCRIPTION))),
            )
            .with_characteristic(Characteristic::new(uuid(test_data::HUMIDITY), notifying))
            .with_characteristic(Characteristic::new(
                uuid(test_data::CONTROL),
                CharacteristicProperties::WRITE,
            )),
    ]
}

// ============================================================================
// Fixtures
// ============================================================================

/// A disconnected sensor device and its mock.
pub fn sensor(settings: ConnectionSettings) -> (Device, MockPeripheralHandle) {
    let (peripheral, mock) = MockPeripheral::new(id(1));
    mock.set_services(sensor_services());
    mock.set_value(uuid(test_data::TEMPERATURE), vec![21]);
    mock.set_value(uuid(test_data::HUMIDITY), vec![40]);

    let advertisement = AdvertisementData::new().with_name(test_data::DEVICE_NAME);
    let record = PeripheralRecord::discovered(id(1), -55, advertisement);
    (Device::new(peripheral, &record, settings), mock)
}

/// A connected sensor with its services discovered.
///
/// The mock's request log is drained, so the next request a test takes is
/// the first one it causes.
pub async fn connected_sensor(settings: ConnectionSettings) -> (Device, MockPeripheralHandle) {
    let (device, mock) = sensor(settings);
    assert!(device.connect().await);
    device.discover_services().await.unwrap();

    assert_eq!(mock.next_request().await, Some(DriverRequest::Connect));
    assert_eq!(mock.next_request().await, Some(DriverRequest::DiscoverServices));
    (device, mock)
}

// ============================================================================
// Helpers
// ============================================================================

/// Let every spawned task run until it blocks.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

/// Let `attempts` paced reconnection attempts run, then settle.
pub async fn ride_out_reconnects(attempts: u32) {
    tokio::time::sleep(Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS) * attempts).await;
    settle().await;
}

/// Events already published to `stream`.
pub fn drain(stream: &mut EventStream<ConnectionEvent>) -> Vec<ConnectionEvent> {
    std::iter::from_fn(|| stream.try_recv()).collect()
}

pub fn count_disconnects(events: &[ConnectionEvent]) -> usize {
    events
        .iter()
        .filter(|event| matches!(event, ConnectionEvent::Disconnected))
        .count()
}
