//! Run lifecycle tracking.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle phases for a prerender run.
///
/// `Enumerating -> Running -> {Completed, Aborted}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunPhase {
    /// Resolving path sources.
    #[default]
    Enumerating,
    /// Dispatching fetches.
    Running,
    /// Every enumerated request has a terminal outcome.
    Completed,
    /// Enumeration failed; no fetch was issued.
    Aborted,
}

impl RunPhase {
    /// Check if the run can make no further progress.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }

    /// Check whether moving to `next` is a legal transition.
    pub fn can_transition_to(&self, next: RunPhase) -> bool {
        matches!(
            (self, next),
            (Self::Enumerating, Self::Running)
                | (Self::Enumerating, Self::Aborted)
                | (Self::Running, Self::Completed)
        )
    }
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Enumerating => write!(f, "enumerating"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// Wall-clock and monotonic timing for a run.
#[derive(Debug, Clone)]
pub struct TimingContext {
    start: Instant,
    started_at: DateTime<Utc>,
}

impl TimingContext {
    /// Create a new timing context starting now.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            started_at: Utc::now(),
        }
    }

    /// Get elapsed time since start.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Elapsed milliseconds since start.
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed().as_millis() as u64
    }

    /// Wall-clock start time.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

impl Default for TimingContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer trait for run phase changes.
pub trait LifecycleObserver: Send + Sync {
    /// Called when the run enters a new phase.
    fn on_phase(&self, phase: RunPhase, elapsed: Duration);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_transitions() {
        assert!(RunPhase::Enumerating.can_transition_to(RunPhase::Running));
        assert!(RunPhase::Enumerating.can_transition_to(RunPhase::Aborted));
        assert!(RunPhase::Running.can_transition_to(RunPhase::Completed));

        assert!(!RunPhase::Running.can_transition_to(RunPhase::Aborted));
        assert!(!RunPhase::Completed.can_transition_to(RunPhase::Running));
        assert!(!RunPhase::Aborted.can_transition_to(RunPhase::Running));
    }

    #[test]
    fn test_terminal_phases() {
        assert!(!RunPhase::Enumerating.is_terminal());
        assert!(!RunPhase::Running.is_terminal());
        assert!(RunPhase::Completed.is_terminal());
        assert!(RunPhase::Aborted.is_terminal());
    }
}
