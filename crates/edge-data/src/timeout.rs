//! Timeout configuration for prerender fetches.

use std::time::Duration;

/// Default per-request bound.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout configuration for a fetch operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Connection timeout (used by network pipelines).
    pub connect: Duration,
    /// Total time allowed for one attempt, render included.
    pub total: Duration,
}

impl TimeoutConfig {
    /// Create a new timeout configuration.
    pub fn new(connect: Duration, total: Duration) -> Self {
        Self { connect, total }
    }

    /// Create from a single total timeout.
    pub fn from_total(total: Duration) -> Self {
        Self {
            connect: std::cmp::min(total / 4, Duration::from_secs(10)),
            total,
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self::from_total(DEFAULT_FETCH_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_total_caps_connect() {
        let config = TimeoutConfig::from_total(Duration::from_secs(8));
        assert_eq!(config.connect, Duration::from_secs(2));

        let config = TimeoutConfig::from_total(Duration::from_secs(120));
        assert_eq!(config.connect, Duration::from_secs(10));
    }

    #[test]
    fn test_default() {
        assert_eq!(TimeoutConfig::default().total, Duration::from_secs(30));
    }
}
