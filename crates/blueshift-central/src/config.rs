//! Scanner configuration.
//!
//! # Examples
//!
//! ```
//! use blueshift_central::ScannerConfig;
//! use blueshift_core::ReconnectionSettings;
//!
//! let config = ScannerConfig::from_json(
//!     r#"{ "connection": { "reconnection": { "mode": "always" } }, "state_buffer_size": 4 }"#,
//! ).unwrap();
//!
//! assert_eq!(config.connection.reconnection, ReconnectionSettings::Always);
//! assert_eq!(config.state_buffer_size, 4);
//! ```

use crate::error::Result;
use blueshift_core::{
    ConnectionSettings, Error,
    constants::{DEFAULT_EVENT_BUFFER_SIZE, MAX_EVENT_BUFFER_SIZE},
};
use serde::{Deserialize, Serialize};

/// Configuration for a [`Scanner`](crate::Scanner).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Settings given to every device the scanner creates.
    pub connection: ConnectionSettings,

    /// Number of recent states replayed to a late `states()` subscriber.
    pub state_buffer_size: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionSettings::default(),
            state_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
        }
    }
}

impl ScannerConfig {
    /// Parse and validate a JSON configuration.
    ///
    /// Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("invalid scanner config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_connection(mut self, connection: ConnectionSettings) -> Self {
        self.connection = connection;
        self
    }

    pub fn with_state_buffer_size(mut self, size: usize) -> Self {
        self.state_buffer_size = size;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        self.connection.validate()?;
        if self.state_buffer_size > MAX_EVENT_BUFFER_SIZE {
            return Err(Error::Config(format!(
                "state_buffer_size must be at most {MAX_EVENT_BUFFER_SIZE}, got {}",
                self.state_buffer_size
            ))
            .into());
        }
        Ok(())
    }
}
