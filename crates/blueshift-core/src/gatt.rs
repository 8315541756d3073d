//! GATT service tree and queued device actions.
//!
//! The tree is rebuilt wholesale every time service discovery completes;
//! values cached on characteristics and descriptors are refreshed in place
//! when a matching update callback arrives.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Characteristic property bits as defined by the GATT declaration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CharacteristicProperties(u8);

impl CharacteristicProperties {
    pub const BROADCAST: Self = Self(0x01);
    pub const READ: Self = Self(0x02);
    pub const WRITE_WITHOUT_RESPONSE: Self = Self(0x04);
    pub const WRITE: Self = Self(0x08);
    pub const NOTIFY: Self = Self(0x10);
    pub const INDICATE: Self = Self(0x20);

    /// Wrap raw property bits.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Raw property bits.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Check whether all bits of `other` are set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether the characteristic can push values (notify or indicate).
    #[must_use]
    pub const fn can_notify(self) -> bool {
        self.0 & (Self::NOTIFY.0 | Self::INDICATE.0) != 0
    }
}

impl std::ops::BitOr for CharacteristicProperties {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// GATT descriptor with its last known value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor {
    pub uuid: Uuid,
    pub value: Vec<u8>,
}

impl Descriptor {
    pub fn new(uuid: Uuid) -> Self {
        Self {
            uuid,
            value: Vec::new(),
        }
    }
}

/// GATT characteristic with its last known value and notification state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Characteristic {
    pub uuid: Uuid,
    pub properties: CharacteristicProperties,
    pub value: Vec<u8>,
    pub is_notifying: bool,
    pub descriptors: Vec<Descriptor>,
}

impl Characteristic {
    pub fn new(uuid: Uuid, properties: CharacteristicProperties) -> Self {
        Self {
            uuid,
            properties,
            value: Vec::new(),
            is_notifying: false,
            descriptors: Vec::new(),
        }
    }

    /// Add a descriptor.
    pub fn with_descriptor(mut self, descriptor: Descriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Set the initial cached value.
    pub fn with_value(mut self, value: impl Into<Vec<u8>>) -> Self {
        self.value = value.into();
        self
    }

    pub fn descriptor_mut(&mut self, uuid: &Uuid) -> Option<&mut Descriptor> {
        self.descriptors.iter_mut().find(|d| &d.uuid == uuid)
    }
}

/// GATT primary service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub uuid: Uuid,
    pub characteristics: Vec<Characteristic>,
}

impl Service {
    pub fn new(uuid: Uuid) -> Self {
        Self {
            uuid,
            characteristics: Vec::new(),
        }
    }

    /// Add a characteristic.
    pub fn with_characteristic(mut self, characteristic: Characteristic) -> Self {
        self.characteristics.push(characteristic);
        self
    }

    /// Find a characteristic within a service tree.
    pub fn find_characteristic<'a>(services: &'a [Service], uuid: &Uuid) -> Option<&'a Characteristic> {
        services
            .iter()
            .flat_map(|s| s.characteristics.iter())
            .find(|c| &c.uuid == uuid)
    }

    /// Find a characteristic within a service tree for in-place refresh.
    pub fn find_characteristic_mut<'a>(
        services: &'a mut [Service],
        uuid: &Uuid,
    ) -> Option<&'a mut Characteristic> {
        services
            .iter_mut()
            .flat_map(|s| s.characteristics.iter_mut())
            .find(|c| &c.uuid == uuid)
    }
}

/// How a characteristic write is acknowledged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteType {
    /// Write request, acknowledged by the peripheral.
    #[default]
    WithResponse,

    /// Write command, completed once the stack has queued it.
    WithoutResponse,
}

/// One GATT operation queued on a device.
///
/// Actions are values: once queued they are never mutated, and each one
/// resolves exactly once with a success flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DeviceAction {
    /// Read a characteristic value.
    ReadCharacteristic { characteristic: Uuid },

    /// Read a descriptor value.
    ReadDescriptor { characteristic: Uuid, descriptor: Uuid },

    /// Write a characteristic value.
    WriteCharacteristic {
        characteristic: Uuid,
        value: Vec<u8>,
        write_type: WriteType,
    },

    /// Write a descriptor value.
    WriteDescriptor {
        characteristic: Uuid,
        descriptor: Uuid,
        value: Vec<u8>,
    },

    /// Subscribe to notifications/indications of a characteristic.
    EnableNotification { characteristic: Uuid },

    /// Unsubscribe from notifications/indications of a characteristic.
    DisableNotification { characteristic: Uuid },
}

/// The attribute a [`DeviceAction`] operates on.
///
/// Completion callbacks are correlated with the in-flight action by target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionTarget {
    Characteristic(Uuid),
    Descriptor { characteristic: Uuid, descriptor: Uuid },
}

impl DeviceAction {
    pub fn read_characteristic(characteristic: Uuid) -> Self {
        Self::ReadCharacteristic { characteristic }
    }

    pub fn read_descriptor(characteristic: Uuid, descriptor: Uuid) -> Self {
        Self::ReadDescriptor {
            characteristic,
            descriptor,
        }
    }

    pub fn write_characteristic(characteristic: Uuid, value: impl Into<Vec<u8>>) -> Self {
        Self::WriteCharacteristic {
            characteristic,
            value: value.into(),
            write_type: WriteType::WithResponse,
        }
    }

    pub fn write_characteristic_without_response(
        characteristic: Uuid,
        value: impl Into<Vec<u8>>,
    ) -> Self {
        Self::WriteCharacteristic {
            characteristic,
            value: value.into(),
            write_type: WriteType::WithoutResponse,
        }
    }

    pub fn write_descriptor(characteristic: Uuid, descriptor: Uuid, value: impl Into<Vec<u8>>) -> Self {
        Self::WriteDescriptor {
            characteristic,
            descriptor,
            value: value.into(),
        }
    }

    pub fn enable_notification(characteristic: Uuid) -> Self {
        Self::EnableNotification { characteristic }
    }

    pub fn disable_notification(characteristic: Uuid) -> Self {
        Self::DisableNotification { characteristic }
    }

    /// The attribute this action operates on.
    pub fn target(&self) -> ActionTarget {
        match self {
            Self::ReadCharacteristic { characteristic }
            | Self::WriteCharacteristic { characteristic, .. }
            | Self::EnableNotification { characteristic }
            | Self::DisableNotification { characteristic } => {
                ActionTarget::Characteristic(*characteristic)
            }
            Self::ReadDescriptor {
                characteristic,
                descriptor,
            }
            | Self::WriteDescriptor {
                characteristic,
                descriptor,
                ..
            } => ActionTarget::Descriptor {
                characteristic: *characteristic,
                descriptor: *descriptor,
            },
        }
    }

    /// The characteristic this action operates on, or whose descriptor it touches.
    pub fn characteristic(&self) -> Uuid {
        match self.target() {
            ActionTarget::Characteristic(uuid) => uuid,
            ActionTarget::Descriptor { characteristic, .. } => characteristic,
        }
    }

    /// Whether this is a notification subscription change.
    pub fn is_notification(&self) -> bool {
        matches!(
            self,
            Self::EnableNotification { .. } | Self::DisableNotification { .. }
        )
    }
}

impl fmt::Display for DeviceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadCharacteristic { characteristic } => {
                write!(f, "Read.Characteristic({characteristic})")
            }
            Self::ReadDescriptor { descriptor, .. } => write!(f, "Read.Descriptor({descriptor})"),
            Self::WriteCharacteristic {
                characteristic,
                value,
                ..
            } => write!(
                f,
                "Write.Characteristic({characteristic}, {} bytes)",
                value.len()
            ),
            Self::WriteDescriptor {
                descriptor, value, ..
            } => write!(f, "Write.Descriptor({descriptor}, {} bytes)", value.len()),
            Self::EnableNotification { characteristic } => {
                write!(f, "Notification.Enable({characteristic})")
            }
            Self::DisableNotification { characteristic } => {
                write!(f, "Notification.Disable({characteristic})")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{constants::CCCD_UUID16, uuid_from_u16};

    fn battery_tree() -> Vec<Service> {
        vec![
            Service::new(uuid_from_u16(0x180F)).with_characteristic(
                Characteristic::new(
                    uuid_from_u16(0x2A19),
                    CharacteristicProperties::READ | CharacteristicProperties::NOTIFY,
                )
                .with_descriptor(Descriptor::new(uuid_from_u16(CCCD_UUID16))),
            ),
        ]
    }

    #[test]
    fn test_properties() {
        let props = CharacteristicProperties::READ | CharacteristicProperties::NOTIFY;
        assert!(props.contains(CharacteristicProperties::READ));
        assert!(!props.contains(CharacteristicProperties::WRITE));
        assert!(props.can_notify());
        assert!(!CharacteristicProperties::WRITE.can_notify());
        assert_eq!(props.bits(), 0x12);
        assert_eq!(CharacteristicProperties::from_bits(0x12), props);
    }

    #[test]
    fn test_find_characteristic() {
        let mut tree = battery_tree();
        assert!(Service::find_characteristic(&tree, &uuid_from_u16(0x2A19)).is_some());
        assert!(Service::find_characteristic(&tree, &uuid_from_u16(0x2A37)).is_none());

        let level = Service::find_characteristic_mut(&mut tree, &uuid_from_u16(0x2A19)).unwrap();
        level.value = vec![87];
        let cccd = level.descriptor_mut(&uuid_from_u16(CCCD_UUID16)).unwrap();
        cccd.value = vec![0x01, 0x00];

        let level = Service::find_characteristic(&tree, &uuid_from_u16(0x2A19)).unwrap();
        assert_eq!(level.value, vec![87]);
        assert_eq!(level.descriptors[0].value, vec![0x01, 0x00]);
    }

    #[test]
    fn test_action_target() {
        let level = uuid_from_u16(0x2A19);
        let cccd = uuid_from_u16(CCCD_UUID16);

        assert_eq!(
            DeviceAction::read_characteristic(level).target(),
            ActionTarget::Characteristic(level)
        );
        assert_eq!(
            DeviceAction::write_descriptor(level, cccd, vec![1, 0]).target(),
            ActionTarget::Descriptor {
                characteristic: level,
                descriptor: cccd
            }
        );
        assert_eq!(DeviceAction::read_descriptor(level, cccd).characteristic(), level);
        assert!(DeviceAction::enable_notification(level).is_notification());
        assert!(!DeviceAction::read_characteristic(level).is_notification());
    }

    #[test]
    fn test_action_display() {
        let level = uuid_from_u16(0x2A19);
        assert_eq!(
            DeviceAction::write_characteristic(level, vec![1, 2, 3]).to_string(),
            format!("Write.Characteristic({level}, 3 bytes)")
        );
        assert_eq!(
            DeviceAction::enable_notification(level).to_string(),
            format!("Notification.Enable({level})")
        );
    }

    #[test]
    fn test_action_serialization() {
        let action = DeviceAction::write_characteristic_without_response(uuid_from_u16(0x2A06), vec![2]);
        let json = serde_json::to_string(&action).unwrap();
        assert!(json.contains("\"action\":\"write_characteristic\""));
        assert!(json.contains("\"write_type\":\"without_response\""));
        let back: DeviceAction = serde_json::from_str(&json).unwrap();
        assert_eq!(back, action);
    }
}
