//! Error types for native driver operations.
//!
//! A driver reports failures two ways: synchronously, when the stack refuses
//! a request outright, and asynchronously, as the `error` field of a
//! completion callback. Both use [`DriverError`].

/// Result type alias for driver requests.
pub type Result<T> = std::result::Result<T, DriverError>;

/// Errors reported by the native Bluetooth stack.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DriverError {
    /// The stack refused to start the request (busy, invalid handle, ...).
    #[error("Request rejected: {operation}")]
    Rejected { operation: String },

    /// A GATT operation completed with a non-success ATT status.
    #[error("GATT operation failed with status 0x{status:02X}")]
    Gatt { status: u8 },

    /// The link could not be established or dropped.
    #[error("Connection lost: {reason}")]
    ConnectionLost { reason: String },

    /// No peripheral with this identifier is known to the stack.
    #[error("Peripheral unreachable: {identifier}")]
    Unreachable { identifier: String },

    /// The adapter is powered off or missing.
    #[error("Adapter unavailable")]
    AdapterUnavailable,

    /// The platform denied Bluetooth access.
    #[error("Permission denied: {permission}")]
    PermissionDenied { permission: String },

    /// Operation is not supported by this driver.
    #[error("Unsupported operation: {operation}")]
    Unsupported { operation: String },

    /// Generic error with custom message.
    #[error("{0}")]
    Other(String),
}

impl DriverError {
    /// Create a new rejected-request error.
    pub fn rejected(operation: impl Into<String>) -> Self {
        Self::Rejected {
            operation: operation.into(),
        }
    }

    /// Create a new GATT status error.
    pub fn gatt(status: u8) -> Self {
        Self::Gatt { status }
    }

    /// Create a new connection-lost error.
    pub fn connection_lost(reason: impl Into<String>) -> Self {
        Self::ConnectionLost {
            reason: reason.into(),
        }
    }

    /// Create a new unreachable-peripheral error.
    pub fn unreachable(identifier: impl Into<String>) -> Self {
        Self::Unreachable {
            identifier: identifier.into(),
        }
    }

    /// Create a new permission-denied error.
    pub fn permission_denied(permission: impl Into<String>) -> Self {
        Self::PermissionDenied {
            permission: permission.into(),
        }
    }

    /// Create a new unsupported operation error.
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    /// Create a generic error with custom message.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}
