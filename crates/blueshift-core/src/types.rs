use crate::{Result, constants::BLUETOOTH_BASE_UUID, error::Error};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Platform-stable peripheral handle.
///
/// On one platform this is the peripheral's MAC address, on another an
/// OS-assigned UUID string. The core never interprets it; it is only the
/// equality key for every per-peripheral map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    /// Create a new identifier.
    ///
    /// Surrounding whitespace is trimmed.
    ///
    /// # Errors
    /// Returns `Error::InvalidIdentifier` if the identifier is empty.
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidIdentifier(value));
        }
        Ok(Identifier(trimmed.to_string()))
    }

    /// Get the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Identifier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Identifier::new(s)
    }
}

impl TryFrom<String> for Identifier {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Identifier::new(value)
    }
}

impl From<Identifier> for String {
    fn from(value: Identifier) -> Self {
        value.0
    }
}

/// Expand a 16-bit Bluetooth assigned number into a full 128-bit UUID.
///
/// # Examples
///
/// ```
/// use blueshift_core::uuid_from_u16;
///
/// let battery_level = uuid_from_u16(0x2A19);
/// assert_eq!(
///     battery_level.to_string(),
///     "00002a19-0000-1000-8000-00805f9b34fb"
/// );
/// ```
#[must_use]
pub const fn uuid_from_u16(short: u16) -> Uuid {
    Uuid::from_u128(BLUETOOTH_BASE_UUID | ((short as u128) << 96))
}

/// Parse a UUID given either in full 128-bit form or as a 16-bit hex short form.
///
/// # Errors
/// Returns `Error::InvalidUuid` if the input is neither.
pub fn parse_uuid(input: &str) -> Result<Uuid> {
    let input = input.trim();
    if input.len() == 4
        && let Ok(short) = u16::from_str_radix(input, 16)
    {
        return Ok(uuid_from_u16(short));
    }
    Uuid::parse_str(input).map_err(|_| Error::InvalidUuid(input.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("AA:BB:CC:DD:EE:FF", "AA:BB:CC:DD:EE:FF")]
    #[case("  AA:BB:CC:DD:EE:FF ", "AA:BB:CC:DD:EE:FF")]
    #[case(
        "5D2A0C2E-3C5B-4E39-9C2B-2B8F2C5E9A10",
        "5D2A0C2E-3C5B-4E39-9C2B-2B8F2C5E9A10"
    )]
    fn test_identifier_valid(#[case] input: &str, #[case] expected: &str) {
        let id: Identifier = input.parse().unwrap();
        assert_eq!(id.as_str(), expected);
        assert_eq!(id.to_string(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    fn test_identifier_invalid(#[case] input: &str) {
        let result: Result<Identifier> = input.parse();
        assert!(matches!(result, Err(Error::InvalidIdentifier(_))));
    }

    #[test]
    fn test_identifier_serde_rejects_empty() {
        let id: Identifier = serde_json::from_str("\"peripheral-1\"").unwrap();
        assert_eq!(id.as_str(), "peripheral-1");
        assert!(serde_json::from_str::<Identifier>("\"\"").is_err());
    }

    #[rstest]
    #[case(0x180F, "0000180f-0000-1000-8000-00805f9b34fb")]
    #[case(0x2902, "00002902-0000-1000-8000-00805f9b34fb")]
    fn test_uuid_from_u16(#[case] short: u16, #[case] expected: &str) {
        assert_eq!(uuid_from_u16(short).to_string(), expected);
    }

    #[rstest]
    #[case("180F", uuid_from_u16(0x180F))]
    #[case("2a19", uuid_from_u16(0x2A19))]
    #[case("00002a19-0000-1000-8000-00805f9b34fb", uuid_from_u16(0x2A19))]
    fn test_parse_uuid(#[case] input: &str, #[case] expected: Uuid) {
        assert_eq!(parse_uuid(input).unwrap(), expected);
    }

    #[test]
    fn test_parse_uuid_invalid() {
        assert!(matches!(parse_uuid("xyz"), Err(Error::InvalidUuid(_))));
    }
}
