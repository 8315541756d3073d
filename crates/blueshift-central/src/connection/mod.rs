//! Connection lifecycle of a single peripheral.

pub mod event;
pub mod manager;
pub mod state;

pub use event::{CompletedAction, ConnectionEvent, DisconnectCause};
pub use manager::{ConnectionHandle, spawn};
pub use state::{ConnectedState, ConnectionState};
