//! Reconnection policy.
//!
//! The policy only decides; the device's supervisor task does the
//! reconnecting. Attempts count consecutive failures and reset whenever a
//! connection is established.

use blueshift_core::ReconnectionSettings;

/// What to do after an unexpected disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Try again; `attempt` starts at 1.
    Retry { attempt: u32 },

    /// Stay disconnected.
    GiveUp,
}

/// Attempt counter bound to a [`ReconnectionSettings`].
///
/// # Examples
///
/// ```
/// use blueshift_central::reconnect::{ReconnectDecision, ReconnectionPolicy};
/// use blueshift_core::ReconnectionSettings;
///
/// let mut policy = ReconnectionPolicy::new(ReconnectionSettings::Limited(1));
/// assert_eq!(policy.next(), ReconnectDecision::Retry { attempt: 1 });
/// assert_eq!(policy.next(), ReconnectDecision::GiveUp);
///
/// policy.reset();
/// assert_eq!(policy.next(), ReconnectDecision::Retry { attempt: 1 });
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectionPolicy {
    settings: ReconnectionSettings,
    attempts: u32,
}

impl ReconnectionPolicy {
    pub fn new(settings: ReconnectionSettings) -> Self {
        Self {
            settings,
            attempts: 0,
        }
    }

    /// Decide on the next attempt and count it.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> ReconnectDecision {
        let allowed = match self.settings {
            ReconnectionSettings::Always => true,
            ReconnectionSettings::Never => false,
            ReconnectionSettings::Limited(max) => self.attempts < max,
        };

        if allowed {
            self.attempts = self.attempts.saturating_add(1);
            ReconnectDecision::Retry {
                attempt: self.attempts,
            }
        } else {
            ReconnectDecision::GiveUp
        }
    }

    /// Forget previous attempts after a successful connect.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Consecutive attempts made so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn settings(&self) -> ReconnectionSettings {
        self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_never_gives_up_immediately() {
        let mut policy = ReconnectionPolicy::new(ReconnectionSettings::Never);
        assert_eq!(policy.next(), ReconnectDecision::GiveUp);
        assert_eq!(policy.attempts(), 0);
    }

    #[test]
    fn test_always_keeps_retrying() {
        let mut policy = ReconnectionPolicy::new(ReconnectionSettings::Always);
        for attempt in 1..=100 {
            assert_eq!(policy.next(), ReconnectDecision::Retry { attempt });
        }
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(2)]
    #[case(5)]
    fn test_limited_retries_exactly_n(#[case] limit: u32) {
        let mut policy = ReconnectionPolicy::new(ReconnectionSettings::Limited(limit));
        for attempt in 1..=limit {
            assert_eq!(policy.next(), ReconnectDecision::Retry { attempt });
        }
        assert_eq!(policy.next(), ReconnectDecision::GiveUp);
        assert_eq!(policy.next(), ReconnectDecision::GiveUp);
    }

    #[test]
    fn test_reset_restarts_count() {
        let mut policy = ReconnectionPolicy::new(ReconnectionSettings::Limited(2));
        policy.next();
        policy.next();
        assert_eq!(policy.next(), ReconnectDecision::GiveUp);

        policy.reset();
        assert_eq!(policy.attempts(), 0);
        assert_eq!(policy.next(), ReconnectDecision::Retry { attempt: 1 });
    }
}
