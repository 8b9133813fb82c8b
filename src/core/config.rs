//! Protocol configuration
//!
//! Timeouts and retry limits shared by every flow on a network.

use std::time::Duration;
use tracing::warn;

/// Tunables for agreement flows
#[derive(Clone, Debug, PartialEq)]
pub struct ProtocolConfig {
    /// How long a suspended flow waits for a peer message
    pub response_timeout: Duration,

    /// Attempts to record a committed transaction at one participant
    pub record_attempts: u32,

    /// Pause between record attempts
    pub record_backoff: Duration,

    /// Largest obligation value an acceptor is willing to sign, if limited
    pub acceptor_max_value: Option<i64>,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            response_timeout: Duration::from_millis(5000),
            record_attempts: 3,
            record_backoff: Duration::from_millis(50),
            acceptor_max_value: None,
        }
    }
}

impl ProtocolConfig {
    /// Create a config, replacing zero timeouts and attempt counts with defaults
    pub fn new(
        response_timeout: Duration,
        record_attempts: u32,
        acceptor_max_value: Option<i64>,
    ) -> Self {
        let default = Self::default();

        let response_timeout = if response_timeout.is_zero() {
            warn!(
                default_ms = default.response_timeout.as_millis() as u64,
                "Invalid response timeout (0), using default"
            );
            default.response_timeout
        } else {
            response_timeout
        };

        let record_attempts = if record_attempts == 0 {
            warn!(
                default = default.record_attempts,
                "Invalid record attempts (0), using default"
            );
            default.record_attempts
        } else {
            record_attempts
        };

        Self {
            response_timeout,
            record_attempts,
            record_backoff: default.record_backoff,
            acceptor_max_value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::custom(Duration::from_millis(250), 5, Duration::from_millis(250), 5)]
    #[case::zero_timeout(Duration::ZERO, 2, Duration::from_millis(5000), 2)]
    #[case::zero_attempts(Duration::from_millis(10), 0, Duration::from_millis(10), 3)]
    fn test_new_clamps_zero_values(
        #[case] timeout: Duration,
        #[case] attempts: u32,
        #[case] expected_timeout: Duration,
        #[case] expected_attempts: u32,
    ) {
        let config = ProtocolConfig::new(timeout, attempts, None);
        assert_eq!(config.response_timeout, expected_timeout);
        assert_eq!(config.record_attempts, expected_attempts);
    }

    #[test]
    fn test_acceptor_limit_is_kept() {
        let config = ProtocolConfig::new(Duration::from_secs(1), 1, Some(100));
        assert_eq!(config.acceptor_max_value, Some(100));
    }
}
