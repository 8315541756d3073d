//! Advertisement snapshots, discovery records and scan filters.
//!
//! The native driver parses the raw advertising payload; what reaches the
//! core is an [`AdvertisementData`] value that is replaced wholesale each time
//! the peripheral is seen again.

use crate::types::Identifier;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Manufacturer-specific advertisement payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManufacturerData {
    /// Bluetooth SIG company identifier.
    pub company_id: u16,

    /// Payload following the company identifier.
    pub data: Vec<u8>,
}

impl ManufacturerData {
    /// Create manufacturer data for a company identifier.
    pub fn new(company_id: u16, data: impl Into<Vec<u8>>) -> Self {
        Self {
            company_id,
            data: data.into(),
        }
    }
}

/// Immutable snapshot of one advertisement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvertisementData {
    /// Complete or shortened local name.
    pub name: Option<String>,

    /// Manufacturer-specific data, if advertised.
    pub manufacturer_data: Option<ManufacturerData>,

    /// Advertised service UUIDs, in advertisement order.
    pub service_uuids: Vec<Uuid>,

    /// Service data keyed by service UUID.
    pub service_data: HashMap<Uuid, Vec<u8>>,

    /// Advertised TX power level in dBm.
    pub tx_power_level: Option<i16>,

    /// Whether the peripheral accepts connections.
    pub is_connectable: bool,
}

impl AdvertisementData {
    /// Create an empty, connectable advertisement.
    pub fn new() -> Self {
        Self {
            is_connectable: true,
            ..Self::default()
        }
    }

    /// Set the local name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add an advertised service UUID.
    pub fn with_service(mut self, uuid: Uuid) -> Self {
        self.service_uuids.push(uuid);
        self
    }

    /// Add service data for a service UUID.
    pub fn with_service_data(mut self, uuid: Uuid, data: impl Into<Vec<u8>>) -> Self {
        self.service_data.insert(uuid, data.into());
        self
    }

    /// Set manufacturer-specific data.
    pub fn with_manufacturer_data(mut self, data: ManufacturerData) -> Self {
        self.manufacturer_data = Some(data);
        self
    }

    /// Set the advertised TX power level.
    pub fn with_tx_power_level(mut self, level: i16) -> Self {
        self.tx_power_level = Some(level);
        self
    }

    /// Check whether a service UUID is advertised, either in the service list
    /// or as a service-data key.
    pub fn advertises(&self, uuid: &Uuid) -> bool {
        self.service_uuids.contains(uuid) || self.service_data.contains_key(uuid)
    }
}

/// A peripheral as reported by the adapter driver.
///
/// Discovery callbacks carry both RSSI and advertisement. Bonded-device
/// retrieval usually carries neither; absent fields leave an existing
/// device's cached values untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeripheralRecord {
    /// Peripheral identifier.
    pub identifier: Identifier,

    /// Received signal strength in dBm.
    pub rssi: Option<i16>,

    /// Advertisement snapshot.
    pub advertisement: Option<AdvertisementData>,
}

impl PeripheralRecord {
    /// Record produced by a discovery callback.
    pub fn discovered(identifier: Identifier, rssi: i16, advertisement: AdvertisementData) -> Self {
        Self {
            identifier,
            rssi: Some(rssi),
            advertisement: Some(advertisement),
        }
    }

    /// Record produced by bonded-device retrieval.
    pub fn bonded(identifier: Identifier) -> Self {
        Self {
            identifier,
            rssi: None,
            advertisement: None,
        }
    }
}

/// Criteria restricting which peripherals a scan reports.
///
/// Empty criteria match everything. Every non-empty criterion must match.
///
/// # Examples
///
/// ```
/// use blueshift_core::{AdvertisementData, Identifier, ScanFilter, uuid_from_u16};
///
/// let heart_rate = uuid_from_u16(0x180D);
/// let filter = ScanFilter::new().with_service(heart_rate);
///
/// let id: Identifier = "AA:BB:CC:DD:EE:FF".parse().unwrap();
/// let adv = AdvertisementData::new().with_service(heart_rate);
/// assert!(filter.matches(&id, Some(&adv)));
/// assert!(!filter.matches(&id, Some(&AdvertisementData::new())));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanFilter {
    /// Any of these service UUIDs must be advertised.
    pub services: Vec<Uuid>,

    /// The advertised name must start with this prefix.
    pub name_prefix: Option<String>,

    /// The peripheral must be one of these identifiers.
    pub identifiers: Vec<Identifier>,
}

impl ScanFilter {
    /// Filter matching every peripheral.
    pub fn new() -> Self {
        Self::default()
    }

    /// Require one of the given services (cumulative).
    pub fn with_service(mut self, uuid: Uuid) -> Self {
        self.services.push(uuid);
        self
    }

    /// Require a name prefix.
    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = Some(prefix.into());
        self
    }

    /// Require one of the given identifiers (cumulative).
    pub fn with_identifier(mut self, identifier: Identifier) -> Self {
        self.identifiers.push(identifier);
        self
    }

    /// Whether this filter matches every peripheral.
    pub fn is_empty(&self) -> bool {
        self.services.is_empty() && self.name_prefix.is_none() && self.identifiers.is_empty()
    }

    /// Check a peripheral against the filter.
    ///
    /// A peripheral with no known advertisement fails any service or name
    /// criterion.
    pub fn matches(&self, identifier: &Identifier, advertisement: Option<&AdvertisementData>) -> bool {
        if !self.identifiers.is_empty() && !self.identifiers.contains(identifier) {
            return false;
        }

        if !self.services.is_empty() {
            let Some(adv) = advertisement else {
                return false;
            };
            if !self.services.iter().any(|uuid| adv.advertises(uuid)) {
                return false;
            }
        }

        if let Some(prefix) = &self.name_prefix {
            let name = advertisement.and_then(|adv| adv.name.as_deref());
            if !name.is_some_and(|name| name.starts_with(prefix.as_str())) {
                return false;
            }
        }

        true
    }

    /// Check a driver record against the filter.
    pub fn matches_record(&self, record: &PeripheralRecord) -> bool {
        self.matches(&record.identifier, record.advertisement.as_ref())
    }
}
