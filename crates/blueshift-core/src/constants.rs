//! Core constants for the BLE central implementation.
//!
//! Defaults for connection settings and the numeric limits imposed by the
//! Bluetooth Core specification that the connection manager enforces before
//! handing a request to the native driver.
//!
//! # Usage
//!
//! ```
//! use blueshift_core::constants::*;
//!
//! fn mtu_in_range(mtu: u16) -> bool {
//!     (MIN_MTU..=MAX_MTU).contains(&mtu)
//! }
//!
//! assert!(mtu_in_range(DEFAULT_MTU));
//! assert!(!mtu_in_range(1024));
//! ```

// ============================================================================
// ATT / GATT Limits
// ============================================================================

/// Smallest ATT MTU every LE link supports.
pub const MIN_MTU: u16 = 23;

/// Largest ATT MTU a central may request.
///
/// Attribute values are capped at 512 bytes; 517 leaves room for the
/// opcode and handle of a write request.
pub const MAX_MTU: u16 = 517;

/// MTU a link starts with before any exchange.
pub const DEFAULT_MTU: u16 = MIN_MTU;

/// Bluetooth Base UUID used to expand 16- and 32-bit assigned numbers.
///
/// ```text
/// 0000xxxx-0000-1000-8000-00805F9B34FB
///     ^^^^
///     16-bit assigned number
/// ```
pub const BLUETOOTH_BASE_UUID: u128 = 0x0000_0000_0000_1000_8000_0080_5f9b_34fb;

/// Client Characteristic Configuration Descriptor (CCCD) assigned number.
///
/// Writing this descriptor is how a peripheral is told to start or stop
/// sending notifications/indications.
pub const CCCD_UUID16: u16 = 0x2902;

// ============================================================================
// RSSI
// ============================================================================

/// Weakest RSSI a controller reports (dBm).
pub const MIN_RSSI: i16 = -127;

/// Strongest RSSI a controller reports (dBm).
pub const MAX_RSSI: i16 = 20;

// ============================================================================
// Connection Settings Defaults
// ============================================================================

/// Default number of recent events replayed to late subscribers.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 64;

/// Upper bound accepted for the event replay window.
///
/// The window is retained per device, so a large value multiplied by many
/// discovered devices adds up quickly.
pub const MAX_EVENT_BUFFER_SIZE: usize = 4096;

/// Default pause before each reconnection attempt (milliseconds).
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 500;

/// Upper bound accepted for the reconnection pause (milliseconds).
pub const MAX_RECONNECT_DELAY_MS: u64 = 60_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mtu_bounds() {
        assert!(MIN_MTU < MAX_MTU);
        assert_eq!(DEFAULT_MTU, 23);
    }

    #[test]
    fn test_base_uuid_layout() {
        // 16-bit value sits in bits 96..112
        let cccd = BLUETOOTH_BASE_UUID | ((CCCD_UUID16 as u128) << 96);
        assert_eq!(cccd >> 96, 0x2902);
    }

    #[test]
    fn test_buffer_defaults() {
        assert!(DEFAULT_EVENT_BUFFER_SIZE <= MAX_EVENT_BUFFER_SIZE);
        assert!(DEFAULT_RECONNECT_DELAY_MS > 0);
        assert!(DEFAULT_RECONNECT_DELAY_MS <= MAX_RECONNECT_DELAY_MS);
    }
}
