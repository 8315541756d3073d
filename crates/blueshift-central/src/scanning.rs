//! Scanning state machine.
//!
//! [`ScanningState::apply`] is a pure transition function: it never touches
//! a driver. The [`Scanner`](crate::scanner::Scanner) task feeds it events and
//! performs the side effects implied by each (previous, next) pair.
//!
//! ```text
//! NotInitialized ─► Initializing ─► Enabled.Idle ⇄ Enabled.Scanning
//!       │                ▲   │            ▲ │
//!       ▼                │   └──► NoBluetooth.{Disabled, MissingPermissions}
//!   NoHardware           │
//!                  Deinitialized ◄── any active state
//! ```
//!
//! Device collections are copy-on-write shared slices. A state that did not
//! change a set hands the same allocation to the next state.

use blueshift_core::{AdvertisementData, Identifier, PeripheralRecord, ScanFilter};
use std::fmt;
use std::sync::Arc;

/// A device the scanning state machine can track.
///
/// Clones must share identity: refreshing one clone is visible through all.
pub trait Discoverable: Clone {
    fn identifier(&self) -> &Identifier;

    /// Latest advertisement, if any has been seen.
    fn advertisement(&self) -> Option<AdvertisementData>;

    /// Take the fields present in a new record.
    fn refresh(&self, record: &PeripheralRecord);
}

/// Discovered and paired device snapshots.
#[derive(Debug)]
pub struct DeviceSets<D> {
    discovered: Arc<[D]>,
    paired: Arc<[D]>,
}

impl<D> Clone for DeviceSets<D> {
    fn clone(&self) -> Self {
        Self {
            discovered: Arc::clone(&self.discovered),
            paired: Arc::clone(&self.paired),
        }
    }
}

impl<D> Default for DeviceSets<D> {
    fn default() -> Self {
        Self {
            discovered: Arc::from(Vec::new()),
            paired: Arc::from(Vec::new()),
        }
    }
}

impl<D: Discoverable> DeviceSets<D> {
    /// Devices seen while scanning, in observation order.
    pub fn discovered(&self) -> &[D] {
        &self.discovered
    }

    /// Bonded devices, in retrieval order.
    pub fn paired(&self) -> &[D] {
        &self.paired
    }

    /// Whether both snapshots share storage with `other`.
    pub fn shares_storage(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.discovered, &other.discovered) && Arc::ptr_eq(&self.paired, &other.paired)
    }

    fn find<'a>(set: &'a [D], identifier: &Identifier) -> Option<&'a D> {
        set.iter().find(|device| device.identifier() == identifier)
    }

    /// Record a discovery: refresh a known device or append a new one.
    fn discover(&self, record: &PeripheralRecord, create: &mut impl FnMut(&PeripheralRecord) -> D) -> Self {
        if let Some(existing) = Self::find(&self.discovered, &record.identifier) {
            existing.refresh(record);
            return self.clone();
        }

        let device = match Self::find(&self.paired, &record.identifier) {
            Some(paired) => {
                paired.refresh(record);
                paired.clone()
            }
            None => create(record),
        };

        let mut discovered = self.discovered.to_vec();
        discovered.push(device);
        Self {
            discovered: discovered.into(),
            paired: Arc::clone(&self.paired),
        }
    }

    /// Merge bonded records into the paired set, reusing discovered devices.
    fn merge_paired(
        &self,
        records: &[PeripheralRecord],
        create: &mut impl FnMut(&PeripheralRecord) -> D,
    ) -> Self {
        let mut added = Vec::new();
        for record in records {
            if let Some(existing) = Self::find(&self.paired, &record.identifier)
                .or_else(|| Self::find(&added, &record.identifier))
            {
                existing.refresh(record);
                continue;
            }

            let device = match Self::find(&self.discovered, &record.identifier) {
                Some(discovered) => {
                    discovered.refresh(record);
                    discovered.clone()
                }
                None => create(record),
            };
            added.push(device);
        }

        if added.is_empty() {
            return self.clone();
        }

        let mut paired = self.paired.to_vec();
        paired.extend(added);
        Self {
            discovered: Arc::clone(&self.discovered),
            paired: paired.into(),
        }
    }

    /// Keep only discovered devices matching `filter`.
    fn scoped(&self, filter: &ScanFilter) -> Self {
        let kept: Vec<D> = self
            .discovered
            .iter()
            .filter(|device| filter.matches(device.identifier(), device.advertisement().as_ref()))
            .cloned()
            .collect();

        if kept.len() == self.discovered.len() {
            return self.clone();
        }
        Self {
            discovered: kept.into(),
            paired: Arc::clone(&self.paired),
        }
    }
}

/// Bluetooth present but unusable.
#[derive(Debug, Clone)]
pub enum NoBluetooth<D> {
    /// The adapter is powered off.
    Disabled(DeviceSets<D>),

    /// Bluetooth permission is not granted.
    MissingPermissions(DeviceSets<D>),
}

/// Bluetooth usable.
#[derive(Debug, Clone)]
pub enum Enabled<D> {
    Idle(DeviceSets<D>),
    Scanning {
        devices: DeviceSets<D>,
        filter: ScanFilter,
    },
}

impl<D> Enabled<D> {
    fn devices(&self) -> &DeviceSets<D> {
        match self {
            Self::Idle(devices) | Self::Scanning { devices, .. } => devices,
        }
    }
}

/// Scanner state.
#[derive(Debug, Clone)]
pub enum ScanningState<D> {
    NotInitialized,
    Initializing(DeviceSets<D>),
    NoHardware,
    Deinitialized(DeviceSets<D>),
    NoBluetooth(NoBluetooth<D>),
    Enabled(Enabled<D>),
}

impl<D> Default for ScanningState<D> {
    fn default() -> Self {
        Self::NotInitialized
    }
}

/// Input to the scanning state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanningEvent {
    StartInitializing { supported: bool },
    Initialized { has_permission: bool, enabled: bool },
    StartScanning(ScanFilter),
    /// Re-scope the discovered set without scanning.
    Refresh(ScanFilter),
    DiscoverDevice(PeripheralRecord),
    StopScanning,
    PairedRetrieved(Vec<PeripheralRecord>),
    RevokePermission,
    Permit { enabled: bool },
    Disable,
    Enable,
    Deinitialize,
    Reinitialize,
}

impl fmt::Display for ScanningEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StartInitializing { supported } => write!(f, "StartInitializing(supported={supported})"),
            Self::Initialized {
                has_permission,
                enabled,
            } => write!(f, "Initialized(permission={has_permission}, enabled={enabled})"),
            Self::StartScanning(_) => write!(f, "StartScanning"),
            Self::Refresh(_) => write!(f, "Refresh"),
            Self::DiscoverDevice(record) => write!(f, "DiscoverDevice({})", record.identifier),
            Self::StopScanning => write!(f, "StopScanning"),
            Self::PairedRetrieved(records) => write!(f, "PairedRetrieved({})", records.len()),
            Self::RevokePermission => write!(f, "RevokePermission"),
            Self::Permit { enabled } => write!(f, "Permit(enabled={enabled})"),
            Self::Disable => write!(f, "Disable"),
            Self::Enable => write!(f, "Enable"),
            Self::Deinitialize => write!(f, "Deinitialize"),
            Self::Reinitialize => write!(f, "Reinitialize"),
        }
    }
}

/// Fieldless name of a [`ScanningState`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanningKind {
    NotInitialized,
    Initializing,
    NoHardware,
    Deinitialized,
    Disabled,
    MissingPermissions,
    Idle,
    Scanning,
}

impl fmt::Display for ScanningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInitialized => write!(f, "NotInitialized"),
            Self::Initializing => write!(f, "Initializing"),
            Self::NoHardware => write!(f, "NoHardware"),
            Self::Deinitialized => write!(f, "Deinitialized"),
            Self::Disabled => write!(f, "NoBluetooth.Disabled"),
            Self::MissingPermissions => write!(f, "NoBluetooth.MissingPermissions"),
            Self::Idle => write!(f, "Enabled.Idle"),
            Self::Scanning => write!(f, "Enabled.Scanning"),
        }
    }
}

impl<D: Discoverable> ScanningState<D> {
    /// Compute the state following `event`.
    ///
    /// Returns `None` when the event does not apply to the current state.
    /// `create` builds a device for an identifier seen for the first time.
    pub fn apply(
        &self,
        event: &ScanningEvent,
        create: &mut impl FnMut(&PeripheralRecord) -> D,
    ) -> Option<Self> {
        use ScanningEvent as E;
        use ScanningState as S;

        let next = match (self, event) {
            (S::NotInitialized, E::StartInitializing { supported }) => {
                if *supported {
                    S::Initializing(DeviceSets::default())
                } else {
                    S::NoHardware
                }
            }

            (
                S::Initializing(devices),
                E::Initialized {
                    has_permission,
                    enabled,
                },
            ) => {
                let devices = devices.clone();
                if !has_permission {
                    S::NoBluetooth(NoBluetooth::MissingPermissions(devices))
                } else if !enabled {
                    S::NoBluetooth(NoBluetooth::Disabled(devices))
                } else {
                    S::Enabled(Enabled::Idle(devices))
                }
            }

            (S::Enabled(Enabled::Idle(devices)), E::StartScanning(filter))
            | (S::Enabled(Enabled::Scanning { devices, .. }), E::StartScanning(filter)) => {
                S::Enabled(Enabled::Scanning {
                    devices: devices.scoped(filter),
                    filter: filter.clone(),
                })
            }

            (S::Enabled(Enabled::Idle(devices)), E::Refresh(filter)) => {
                S::Enabled(Enabled::Idle(devices.scoped(filter)))
            }

            (S::Enabled(Enabled::Scanning { devices, filter }), E::DiscoverDevice(record)) => {
                if !filter.matches_record(record) {
                    return None;
                }
                S::Enabled(Enabled::Scanning {
                    devices: devices.discover(record, create),
                    filter: filter.clone(),
                })
            }

            (S::Enabled(Enabled::Scanning { devices, .. }), E::StopScanning) => {
                S::Enabled(Enabled::Idle(devices.clone()))
            }

            (S::Enabled(enabled), E::PairedRetrieved(records)) => match enabled {
                Enabled::Idle(devices) => S::Enabled(Enabled::Idle(devices.merge_paired(records, create))),
                Enabled::Scanning { devices, filter } => S::Enabled(Enabled::Scanning {
                    devices: devices.merge_paired(records, create),
                    filter: filter.clone(),
                }),
            },

            (S::Enabled(enabled), E::RevokePermission) => {
                S::NoBluetooth(NoBluetooth::MissingPermissions(enabled.devices().clone()))
            }
            (S::Enabled(enabled), E::Disable) => {
                S::NoBluetooth(NoBluetooth::Disabled(enabled.devices().clone()))
            }

            (S::NoBluetooth(NoBluetooth::Disabled(devices)), E::Enable) => {
                S::Enabled(Enabled::Idle(devices.clone()))
            }
            (S::NoBluetooth(NoBluetooth::Disabled(devices)), E::RevokePermission) => {
                S::NoBluetooth(NoBluetooth::MissingPermissions(devices.clone()))
            }

            (S::NoBluetooth(NoBluetooth::MissingPermissions(devices)), E::Permit { enabled }) => {
                if *enabled {
                    S::Enabled(Enabled::Idle(devices.clone()))
                } else {
                    S::NoBluetooth(NoBluetooth::Disabled(devices.clone()))
                }
            }

            (state, E::Deinitialize) if state.is_active() => {
                S::Deinitialized(state.devices()?.clone())
            }
            (S::Deinitialized(devices), E::Reinitialize) => S::Initializing(devices.clone()),

            _ => return None,
        };

        Some(next)
    }

    pub fn kind(&self) -> ScanningKind {
        match self {
            Self::NotInitialized => ScanningKind::NotInitialized,
            Self::Initializing(_) => ScanningKind::Initializing,
            Self::NoHardware => ScanningKind::NoHardware,
            Self::Deinitialized(_) => ScanningKind::Deinitialized,
            Self::NoBluetooth(NoBluetooth::Disabled(_)) => ScanningKind::Disabled,
            Self::NoBluetooth(NoBluetooth::MissingPermissions(_)) => ScanningKind::MissingPermissions,
            Self::Enabled(Enabled::Idle(_)) => ScanningKind::Idle,
            Self::Enabled(Enabled::Scanning { .. }) => ScanningKind::Scanning,
        }
    }

    /// Device snapshots, for states that carry them.
    pub fn devices(&self) -> Option<&DeviceSets<D>> {
        match self {
            Self::NotInitialized | Self::NoHardware => None,
            Self::Initializing(devices)
            | Self::Deinitialized(devices)
            | Self::NoBluetooth(NoBluetooth::Disabled(devices))
            | Self::NoBluetooth(NoBluetooth::MissingPermissions(devices)) => Some(devices),
            Self::Enabled(enabled) => Some(enabled.devices()),
        }
    }

    /// Discovered devices, empty for states without snapshots.
    pub fn discovered(&self) -> &[D] {
        self.devices().map(DeviceSets::discovered).unwrap_or_default()
    }

    /// Paired devices, empty for states without snapshots.
    pub fn paired(&self) -> &[D] {
        self.devices().map(DeviceSets::paired).unwrap_or_default()
    }

    /// Active filter while scanning.
    pub fn filter(&self) -> Option<&ScanFilter> {
        match self {
            Self::Enabled(Enabled::Scanning { filter, .. }) => Some(filter),
            _ => None,
        }
    }

    /// The same state with any running scan stopped.
    pub fn without_scan(self) -> Self {
        match self {
            Self::Enabled(Enabled::Scanning { devices, .. }) => Self::Enabled(Enabled::Idle(devices)),
            other => other,
        }
    }

    pub fn is_scanning(&self) -> bool {
        matches!(self, Self::Enabled(Enabled::Scanning { .. }))
    }

    /// Initializing, without Bluetooth, or enabled.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Initializing(_) | Self::NoBluetooth(_) | Self::Enabled(_))
    }

    /// Find a device in either snapshot.
    pub fn find(&self, identifier: &Identifier) -> Option<&D> {
        self.discovered()
            .iter()
            .chain(self.paired())
            .find(|device| device.identifier() == identifier)
    }
}

impl<D> fmt::Display for ScanningState<D>
where
    D: Discoverable,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.devices() {
            Some(devices) => write!(
                f,
                "{} (discovered={}, paired={})",
                self.kind(),
                devices.discovered().len(),
                devices.paired().len()
            ),
            None => write!(f, "{}", self.kind()),
        }
    }
}
