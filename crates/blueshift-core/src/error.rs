use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // Identity errors
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Invalid UUID: {0}")]
    InvalidUuid(String),

    // GATT errors
    #[error("Invalid MTU {mtu}: must be {min}-{max}")]
    InvalidMtu { mtu: u16, min: u16, max: u16 },

    #[error("Characteristic not found: {0}")]
    CharacteristicNotFound(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
