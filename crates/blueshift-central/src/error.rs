//! Error types for the connection and scanning layer.

use blueshift_core::Identifier;
use blueshift_driver::DriverError;

/// Result type alias for central operations.
pub type Result<T> = std::result::Result<T, CentralError>;

/// Errors surfaced by devices and scanners.
///
/// Errors are `Clone` so one failure can be handed to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CentralError {
    /// Data model error.
    #[error(transparent)]
    Core(#[from] blueshift_core::Error),

    /// Native driver error.
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// The operation requires a connection.
    #[error("Device {identifier} is not connected")]
    NotConnected { identifier: Identifier },

    /// The operation is not valid in the current state.
    #[error("Cannot {operation} while {state}")]
    InvalidState { operation: String, state: String },

    /// The connection dropped before the operation completed.
    #[error("Device {identifier} disconnected")]
    Disconnected { identifier: Identifier },

    /// The owning task is no longer running.
    #[error("Task stopped: {0}")]
    TaskStopped(String),
}

impl CentralError {
    /// Create a new not-connected error.
    pub fn not_connected(identifier: &Identifier) -> Self {
        Self::NotConnected {
            identifier: identifier.clone(),
        }
    }

    /// Create a new invalid-state error.
    pub fn invalid_state(operation: impl Into<String>, state: impl ToString) -> Self {
        Self::InvalidState {
            operation: operation.into(),
            state: state.to_string(),
        }
    }

    /// Create a new disconnected error.
    pub fn disconnected(identifier: &Identifier) -> Self {
        Self::Disconnected {
            identifier: identifier.clone(),
        }
    }

    /// Create a new task-stopped error.
    pub fn task_stopped(task: impl Into<String>) -> Self {
        Self::TaskStopped(task.into())
    }
}
