//! Events published by a connection manager.

use blueshift_core::{DeviceAction, Service, Uuid};
use blueshift_driver::DriverError;
use std::fmt;

/// Outcome of one queued action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedAction {
    /// The action as it was queued.
    pub action: DeviceAction,

    /// Whether the peripheral accepted it.
    pub succeeded: bool,

    /// Value read, for successful reads.
    pub value: Option<Vec<u8>>,
}

impl CompletedAction {
    pub fn succeeded(action: DeviceAction, value: Option<Vec<u8>>) -> Self {
        Self {
            action,
            succeeded: true,
            value,
        }
    }

    pub fn failed(action: DeviceAction) -> Self {
        Self {
            action,
            succeeded: false,
            value: None,
        }
    }
}

/// One entry in a device's ordered event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectionEvent {
    Connecting,
    Connected,
    /// A pending connect was abandoned before the link came up.
    CancelledConnecting,
    Disconnecting,
    Disconnected,
    Discovering,
    DiscoveredServices(Vec<Service>),
    CompletedAction(CompletedAction),
    /// A notifying characteristic changed value.
    CharacteristicChanged {
        characteristic: Uuid,
        value: Vec<u8>,
    },
    RssiRead(i16),
    MtuChanged(u16),
    BondStateChanged(bool),
}

impl fmt::Display for ConnectionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::CancelledConnecting => write!(f, "CancelledConnecting"),
            Self::Disconnecting => write!(f, "Disconnecting"),
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Discovering => write!(f, "Discovering"),
            Self::DiscoveredServices(services) => {
                write!(f, "DiscoveredServices({} services)", services.len())
            }
            Self::CompletedAction(completed) => write!(
                f,
                "CompletedAction({}, {})",
                completed.action,
                if completed.succeeded { "ok" } else { "failed" }
            ),
            Self::CharacteristicChanged { characteristic, .. } => {
                write!(f, "CharacteristicChanged({characteristic})")
            }
            Self::RssiRead(rssi) => write!(f, "RssiRead({rssi})"),
            Self::MtuChanged(mtu) => write!(f, "MtuChanged({mtu})"),
            Self::BondStateChanged(bonded) => write!(f, "BondStateChanged({bonded})"),
        }
    }
}

/// Why a connection ended, as reported to `on_disconnect` listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectCause {
    /// `disconnect()` was called.
    Requested,

    /// The link dropped or never came up.
    Unexpected(Option<DriverError>),
}

impl DisconnectCause {
    pub fn is_unexpected(&self) -> bool {
        matches!(self, Self::Unexpected(_))
    }
}
