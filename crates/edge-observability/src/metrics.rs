//! Fetch latency metrics for a prerender run.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Aggregated fetch timings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingSummary {
    /// Number of fetches measured.
    pub count: usize,
    /// Median fetch duration (milliseconds).
    pub p50_ms: u64,
    /// 95th percentile fetch duration (milliseconds).
    pub p95_ms: u64,
    /// Slowest fetch (milliseconds).
    pub max_ms: u64,
    /// Total response bytes received.
    pub total_bytes: u64,
}

impl TimingSummary {
    /// Format as human-readable summary.
    pub fn to_summary(&self) -> String {
        if self.count == 0 {
            return "no fetches measured".to_string();
        }
        format!(
            "{} fetches, p50 {}ms, p95 {}ms, max {}ms, {} bytes",
            self.count, self.p50_ms, self.p95_ms, self.max_ms, self.total_bytes
        )
    }
}

/// Collector for per-fetch durations.
#[derive(Debug, Clone, Default)]
pub struct FetchTimings {
    durations_us: Vec<u64>,
    total_bytes: u64,
}

impl FetchTimings {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one settled fetch.
    pub fn record(&mut self, duration: Duration, bytes: Option<usize>) {
        self.durations_us.push(duration.as_micros() as u64);
        self.total_bytes += bytes.unwrap_or(0) as u64;
    }

    /// Number of recorded fetches.
    pub fn len(&self) -> usize {
        self.durations_us.len()
    }

    /// Check if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.durations_us.is_empty()
    }

    /// Compute percentiles over everything recorded so far.
    pub fn summary(&self) -> TimingSummary {
        if self.durations_us.is_empty() {
            return TimingSummary::default();
        }

        let mut sorted = self.durations_us.clone();
        sorted.sort_unstable();

        TimingSummary {
            count: sorted.len(),
            p50_ms: percentile(&sorted, 50) / 1000,
            p95_ms: percentile(&sorted, 95) / 1000,
            max_ms: sorted[sorted.len() - 1] / 1000,
            total_bytes: self.total_bytes,
        }
    }
}

// Nearest-rank percentile over a sorted, non-empty slice
fn percentile(sorted: &[u64], pct: usize) -> u64 {
    let rank = (pct * sorted.len()).div_ceil(100).max(1);
    sorted[rank - 1]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_summary() {
        let timings = FetchTimings::new();
        assert_eq!(timings.summary(), TimingSummary::default());
        assert_eq!(timings.summary().to_summary(), "no fetches measured");
    }

    #[test]
    fn test_percentiles() {
        let mut timings = FetchTimings::new();
        for ms in 1..=100 {
            timings.record(Duration::from_millis(ms), Some(10));
        }

        let summary = timings.summary();
        assert_eq!(summary.count, 100);
        assert_eq!(summary.p50_ms, 50);
        assert_eq!(summary.p95_ms, 95);
        assert_eq!(summary.max_ms, 100);
        assert_eq!(summary.total_bytes, 1000);
    }

    #[test]
    fn test_single_sample() {
        let mut timings = FetchTimings::new();
        timings.record(Duration::from_millis(42), None);

        let summary = timings.summary();
        assert_eq!(summary.p50_ms, 42);
        assert_eq!(summary.p95_ms, 42);
        assert_eq!(summary.total_bytes, 0);
    }
}
