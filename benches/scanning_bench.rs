//! Performance benchmarks for the scanning state machine.
//!
//! Measures discovery throughput: how fast `ScanningState::apply` folds a
//! stream of advertisements into the discovered set, for streams dominated by
//! new peripherals and for streams dominated by repeat sightings.
//!
//! # Run Benchmarks
//!
//! ```sh
//! cargo bench --bench scanning_bench
//!
//! # Only the repeat-sighting group
//! cargo bench --bench scanning_bench -- rediscovery
//! ```

use blueshift_central::{Discoverable, ScanningEvent, ScanningState};
use blueshift_core::{AdvertisementData, Identifier, PeripheralRecord, ScanFilter, uuid_from_u16};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::{Arc, Mutex};

/// Minimal device: identity plus the latest advertisement.
#[derive(Clone)]
struct BenchDevice {
    identifier: Identifier,
    advertisement: Arc<Mutex<Option<AdvertisementData>>>,
}

impl BenchDevice {
    fn new(record: &PeripheralRecord) -> Self {
        Self {
            identifier: record.identifier.clone(),
            advertisement: Arc::new(Mutex::new(record.advertisement.clone())),
        }
    }
}

impl Discoverable for BenchDevice {
    fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    fn advertisement(&self) -> Option<AdvertisementData> {
        self.advertisement.lock().ok().and_then(|adv| adv.clone())
    }

    fn refresh(&self, record: &PeripheralRecord) {
        if let Some(advertisement) = &record.advertisement
            && let Ok(mut slot) = self.advertisement.lock()
        {
            *slot = Some(advertisement.clone());
        }
    }
}

fn scanning(filter: ScanFilter) -> ScanningState<BenchDevice> {
    let mut create = |record: &PeripheralRecord| BenchDevice::new(record);
    [
        ScanningEvent::StartInitializing { supported: true },
        ScanningEvent::Initialized {
            has_permission: true,
            enabled: true,
        },
        ScanningEvent::StartScanning(filter),
    ]
    .iter()
    .fold(ScanningState::NotInitialized, |state, event| {
        state.apply(event, &mut create).unwrap_or(state)
    })
}

fn records(distinct: usize, total: usize) -> Vec<PeripheralRecord> {
    let heart_rate = uuid_from_u16(0x180D);
    (0..total)
        .map(|i| {
            let n = i % distinct;
            let identifier = Identifier::new(format!("00:00:00:00:{:02X}:{:02X}", n / 256, n % 256))
                .unwrap();
            let advertisement = AdvertisementData::new()
                .with_name(format!("Sensor-{n}"))
                .with_service(heart_rate);
            PeripheralRecord::discovered(identifier, -40 - (i % 50) as i16, advertisement)
        })
        .collect()
}

fn run(state: ScanningState<BenchDevice>, records: &[PeripheralRecord]) -> ScanningState<BenchDevice> {
    let mut create = |record: &PeripheralRecord| BenchDevice::new(record);
    records.iter().fold(state, |state, record| {
        state
            .apply(&ScanningEvent::DiscoverDevice(record.clone()), &mut create)
            .unwrap_or(state)
    })
}

/// Every advertisement comes from a new peripheral.
fn bench_new_devices(c: &mut Criterion) {
    let mut group = c.benchmark_group("new_devices");

    for count in [16usize, 128, 512] {
        let stream = records(count, count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &stream, |b, stream| {
            b.iter(|| black_box(run(scanning(ScanFilter::new()), black_box(stream))));
        });
    }

    group.finish();
}

/// A few peripherals advertising repeatedly.
fn bench_rediscovery(c: &mut Criterion) {
    let mut group = c.benchmark_group("rediscovery");
    let total = 1024;

    for distinct in [4usize, 32, 128] {
        let stream = records(distinct, total);
        group.throughput(Throughput::Elements(total as u64));
        group.bench_with_input(BenchmarkId::from_parameter(distinct), &stream, |b, stream| {
            b.iter(|| black_box(run(scanning(ScanFilter::new()), black_box(stream))));
        });
    }

    group.finish();
}

/// Filtered scan where most advertisements are rejected.
fn bench_filtered(c: &mut Criterion) {
    let mut group = c.benchmark_group("filtered");
    let stream = records(256, 1024);
    group.throughput(Throughput::Elements(stream.len() as u64));

    group.bench_function("name_prefix", |b| {
        let filter = ScanFilter::new().with_name_prefix("Sensor-1");
        b.iter(|| black_box(run(scanning(filter.clone()), black_box(&stream))));
    });

    group.finish();
}

criterion_group!(benches, bench_new_devices, bench_rediscovery, bench_filtered);
criterion_main!(benches);
