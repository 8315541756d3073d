// blueshift: simulated BLE central session
//
// Runs the scanner and connection core against the mock drivers: scan,
// connect to every discovered sensor, read it, ride out a dropped link and
// shut down.

use anyhow::{Context, Result, bail};
use blueshift_central::{ConnectionEvent, Device, Scanner, ScannerConfig, ScanningKind};
use blueshift_core::{
    AdvertisementData, Characteristic, CharacteristicProperties, ConnectionSettings, DeviceAction,
    Identifier, LogLevel, ReconnectionSettings, ScanFilter, Service, uuid_from_u16,
};
use blueshift_driver::mock::{MockAdapter, MockAdapterHandle};
use clap::Parser;
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const SENSOR_SERVICE: u16 = 0x181A;
const TEMPERATURE: u16 = 0x2A6E;

#[derive(Parser)]
#[command(name = "blueshift")]
#[command(about = "Simulated BLE central session over mock drivers", long_about = None)]
#[command(version)]
struct Cli {
    /// Scanner configuration (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level when RUST_LOG is unset
    #[arg(short, long, default_value = "info")]
    log_level: LogLevel,

    /// Number of simulated peripherals
    #[arg(short, long, default_value_t = 3)]
    devices: u8,

    /// Reconnection policy: always, never or limited:<attempts>
    #[arg(short, long)]
    reconnect: Option<ReconnectionSettings>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_level.to_string())),
        )
        .init();

    let config = load_config(&cli)?;
    run(config, cli.devices).await
}

fn load_config(cli: &Cli) -> Result<ScannerConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            ScannerConfig::from_json(&json).with_context(|| format!("parsing {}", path.display()))?
        }
        None => ScannerConfig::default(),
    };

    if let Some(reconnection) = cli.reconnect {
        config.connection.reconnection = reconnection;
    }
    config.connection.log_level = cli.log_level;
    config.validate()?;
    Ok(config)
}

fn peripheral_id(n: u8) -> Result<Identifier> {
    Ok(Identifier::new(format!("C0:FF:EE:00:00:{n:02X}"))?)
}

/// Register `count` sensors with the mock adapter.
fn populate(mock: &MockAdapterHandle, count: u8) -> Result<()> {
    let temperature = uuid_from_u16(TEMPERATURE);
    let services = vec![Service::new(uuid_from_u16(SENSOR_SERVICE)).with_characteristic(
        Characteristic::new(
            temperature,
            CharacteristicProperties::READ | CharacteristicProperties::NOTIFY,
        ),
    )];

    for n in 0..count {
        let peripheral = mock.prepare(&peripheral_id(n)?);
        peripheral.set_services(services.clone());
        peripheral.set_value(temperature, vec![18 + n % 20]);
        peripheral.set_rssi(-40 - i16::from(n) * 5);
    }
    Ok(())
}

fn advertise(mock: &MockAdapterHandle, count: u8) -> Result<()> {
    let service = uuid_from_u16(SENSOR_SERVICE);
    for n in 0..count {
        let advertisement = AdvertisementData::new()
            .with_name(format!("Sensor-{n}"))
            .with_service(service);
        mock.discover(peripheral_id(n)?, -40 - i16::from(n) * 5, advertisement);
    }
    Ok(())
}

async fn run(config: ScannerConfig, count: u8) -> Result<()> {
    let (adapter, mock) = MockAdapter::new();
    populate(&mock, count)?;

    let connection = config.connection.clone();
    let scanner = Scanner::new(adapter, config);
    let mut states = scanner.states();
    let watcher = tokio::spawn(async move {
        while let Some(state) = states.next().await {
            tracing::debug!(%state, "scanner state");
        }
    });

    scanner.initialize();
    scanner.start_scanning(ScanFilter::new().with_service(uuid_from_u16(SENSOR_SERVICE)));
    advertise(&mock, count)?;

    let state = scanner.snapshot().await;
    if state.kind() != ScanningKind::Scanning {
        bail!("scanner did not start scanning: {state}");
    }
    scanner.stop_scanning();
    println!("discovered {} device(s)", state.discovered().len());

    for device in state.discovered() {
        session(device).await?;
    }

    if let Some(device) = state.discovered().first() {
        link_drop(device, &mock, &connection).await?;
    }

    for device in state.discovered() {
        device.disconnect().await;
    }

    scanner.shutdown().await?;
    watcher.await?;
    Ok(())
}

/// Connect, discover and read one device.
async fn session(device: &Device) -> Result<()> {
    if !device.connect().await {
        bail!("failed to connect to {device}");
    }

    let services = device.discover_services().await?;
    let characteristics: usize = services.iter().map(|s| s.characteristics.len()).sum();

    let read = device
        .perform_action(DeviceAction::read_characteristic(uuid_from_u16(TEMPERATURE)))
        .await;
    let rssi = device.read_rssi().await;

    match read.value {
        Some(value) if read.succeeded => println!(
            "{device}: {} service(s), {characteristics} characteristic(s), temperature {:?}, rssi {:?}",
            services.len(),
            value,
            rssi
        ),
        _ => println!("{device}: temperature read failed"),
    }
    Ok(())
}

/// Drop the link under `device` and report what the reconnection policy did.
async fn link_drop(device: &Device, mock: &MockAdapterHandle, settings: &ConnectionSettings) -> Result<()> {
    let reconnection = settings.reconnection;
    let peripheral = mock
        .peripheral(device.identifier())
        .context("device has no mock peripheral")?;
    let mut events = device.events();
    while events.try_recv().is_some() {}

    println!("{device}: dropping link (reconnection {reconnection})");
    peripheral.drop_connection();

    let patience = settings.reconnect_delay() + Duration::from_secs(1);
    let settled = tokio::time::timeout(patience, async {
        while let Some(event) = events.next().await {
            match event {
                ConnectionEvent::Connected => return true,
                ConnectionEvent::Disconnected if reconnection == ReconnectionSettings::Never => {
                    return false;
                }
                _ => {}
            }
        }
        false
    })
    .await
    .unwrap_or(false);

    println!(
        "{device}: {} after link drop",
        if settled { "reconnected" } else { "stayed disconnected" }
    );
    Ok(())
}
