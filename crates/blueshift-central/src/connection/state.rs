//! Connection lifecycle states.
//!
//! ```text
//!                   connect()                    driver: Connected
//! ┌──────────────┐ ─────────► ┌────────────┐ ──────────────────► ┌───────────┐
//! │ Disconnected │            │ Connecting │                     │ Connected │
//! └──────────────┘ ◄───────── └────────────┘                     └───────────┘
//!        ▲        cancelled / refused                                  │
//!        │                                                 disconnect()│
//!        │  driver: Disconnected     ┌───────────────┐                 │
//!        └────────────────────────── │ Disconnecting │ ◄───────────────┘
//!                                    └───────────────┘
//! ```
//!
//! While connected the manager is idle, discovering services or handling
//! exactly one action. A dropped link goes straight from any connected
//! sub-state to `Disconnected`.

use blueshift_core::DeviceAction;
use std::fmt;

/// Activity of a connected device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectedState {
    /// Ready for the next action.
    Idle,

    /// Service discovery is in flight.
    Discovering,

    /// This action is in flight at the native layer.
    HandlingAction(DeviceAction),
}

/// Connection state of one device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected(ConnectedState),
    Disconnecting,
}

impl ConnectionState {
    /// Check if a transition to the target state is valid.
    ///
    /// # Examples
    ///
    /// ```
    /// use blueshift_central::connection::{ConnectedState, ConnectionState};
    ///
    /// let idle = ConnectionState::Connected(ConnectedState::Idle);
    /// assert!(ConnectionState::Connecting.can_transition_to(&idle));
    /// assert!(!ConnectionState::Disconnected.can_transition_to(&idle));
    /// ```
    pub fn can_transition_to(&self, target: &ConnectionState) -> bool {
        use ConnectedState::{Discovering, HandlingAction, Idle};
        use ConnectionState::{Connected, Connecting, Disconnected, Disconnecting};

        matches!(
            (self, target),
            // From Disconnected
            (Disconnected, Connecting)
            // From Connecting
            | (Connecting, Connected(Idle) | Disconnecting | Disconnected)
            // Within Connected
            | (Connected(Idle), Connected(Discovering | HandlingAction(_)))
            | (Connected(Discovering | HandlingAction(_)), Connected(Idle))
            | (Connected(HandlingAction(_)), Connected(HandlingAction(_)))
            // Leaving Connected
            | (Connected(_), Disconnecting | Disconnected)
            // From Disconnecting
            | (Disconnecting, Disconnected)
        )
    }

    /// Whether the link is up.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected(_))
    }

    /// Whether the device is connected and has nothing in flight.
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Connected(ConnectedState::Idle))
    }

    /// The action in flight, if any.
    pub fn current_action(&self) -> Option<&DeviceAction> {
        match self {
            Self::Connected(ConnectedState::HandlingAction(action)) => Some(action),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Discovering => write!(f, "Discovering"),
            Self::HandlingAction(action) => write!(f, "HandlingAction({action})"),
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected(inner) => write!(f, "Connected.{inner}"),
            Self::Disconnecting => write!(f, "Disconnecting"),
        }
    }
}
