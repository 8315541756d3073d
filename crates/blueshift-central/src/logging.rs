//! Per-device log gating.
//!
//! Every device carries its own [`LogLevel`]. Events are still emitted
//! through `tracing`, so the subscriber's filter applies on top.

use blueshift_core::LogLevel;
use tracing::Level;

/// Whether a device configured at `configured` emits an event at `event`.
pub fn allows(configured: LogLevel, event: Level) -> bool {
    let threshold = match configured {
        LogLevel::Off => return false,
        LogLevel::Error => Level::ERROR,
        LogLevel::Warn => Level::WARN,
        LogLevel::Info => Level::INFO,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Trace => Level::TRACE,
    };
    event <= threshold
}

/// Emit a `tracing` event if the device's log level allows it.
///
/// `$level` must be a `tracing::Level` constant.
macro_rules! device_log {
    ($configured:expr, $level:expr, $($arg:tt)+) => {
        if $crate::logging::allows($configured, $level) {
            ::tracing::event!($level, $($arg)+);
        }
    };
}

pub(crate) use device_log;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(LogLevel::Off, Level::ERROR, false)]
    #[case(LogLevel::Error, Level::ERROR, true)]
    #[case(LogLevel::Error, Level::WARN, false)]
    #[case(LogLevel::Info, Level::WARN, true)]
    #[case(LogLevel::Info, Level::DEBUG, false)]
    #[case(LogLevel::Trace, Level::TRACE, true)]
    fn test_allows(#[case] configured: LogLevel, #[case] event: Level, #[case] expected: bool) {
        assert_eq!(allows(configured, event), expected);
    }
}
