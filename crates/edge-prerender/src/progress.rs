//! Live progress reporting for the developer console.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use edge_core::{LifecycleObserver, RunId, RunPhase, TimingContext};
use edge_observability::{FetchTimings, TimingSummary};

use crate::run::RequestOutcome;

/// Default number of buffered events per subscriber.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Status carried by a push event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// The fetch was dispatched.
    InProgress,
    Succeeded,
    Failed,
}

/// Push-style event for the console: `{path, status, timestamp, error?}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub run_id: RunId,
    pub path: String,
    pub status: EventStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Pull-style view of the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub phase: RunPhase,
    pub total: usize,
    /// Not yet settled (includes in-flight).
    pub pending: usize,
    pub in_flight: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Final run summary: `{succeeded, failed, total, durationMs}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: Option<RunId>,
    pub phase: RunPhase,
    pub succeeded: usize,
    pub failed: usize,
    pub total: usize,
    pub duration_ms: u64,
    pub timings: TimingSummary,
}

/// One settled request, as seen by the reporter.
#[derive(Debug, Clone)]
pub struct OutcomeTransition {
    pub path: String,
    pub outcome: RequestOutcome,
    /// Whether a fetch was dispatched (and so held an in-flight slot).
    pub dispatched: bool,
    /// Fetch duration and response size, when a response was received.
    pub fetch: Option<(Duration, usize)>,
}

#[derive(Debug, Default)]
struct ReporterState {
    run_id: Option<RunId>,
    snapshot: ProgressSnapshot,
    timings: FetchTimings,
    timing: Option<TimingContext>,
    duration_ms: Option<u64>,
}

/// Aggregates outcome transitions.
///
/// Updates take a short lock and never await; events go out on a broadcast
/// channel, so a slow console loses events instead of stalling the run.
#[derive(Debug)]
pub struct ProgressReporter {
    state: Mutex<ReporterState>,
    events: broadcast::Sender<ProgressEvent>,
}

impl ProgressReporter {
    /// Create a reporter with the default event buffer.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Create a reporter buffering up to `capacity` events per subscriber.
    pub fn with_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            state: Mutex::new(ReporterState::default()),
            events,
        }
    }

    fn state(&self) -> MutexGuard<'_, ReporterState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Subscribe to live events.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.events.subscribe()
    }

    /// Reset for a new run.
    pub fn begin_run(&self, run_id: RunId) {
        let mut state = self.state();
        *state = ReporterState {
            run_id: Some(run_id),
            timing: Some(TimingContext::new()),
            ..Default::default()
        };
    }

    /// Record how many requests were enumerated.
    pub fn set_total(&self, total: usize) {
        let mut state = self.state();
        state.snapshot.total = total;
        state.snapshot.pending = total;
    }

    /// A fetch was dispatched for `path`.
    pub fn dispatched(&self, path: &str) {
        let run_id = {
            let mut state = self.state();
            state.snapshot.in_flight += 1;
            state.run_id.clone()
        };
        self.emit(run_id, path, EventStatus::InProgress, None, None);
    }

    /// Record a settled request.
    pub fn observe(&self, transition: &OutcomeTransition) {
        let run_id = {
            let mut state = self.state();
            let snapshot = &mut state.snapshot;
            if transition.outcome.is_success() {
                snapshot.succeeded += 1;
            } else {
                snapshot.failed += 1;
            }
            snapshot.pending = snapshot.pending.saturating_sub(1);
            if transition.dispatched {
                snapshot.in_flight = snapshot.in_flight.saturating_sub(1);
            }
            if let Some((duration, bytes)) = transition.fetch {
                state.timings.record(duration, Some(bytes));
            }
            state.run_id.clone()
        };

        let (status, error) = match &transition.outcome {
            RequestOutcome::Succeeded { .. } => (EventStatus::Succeeded, None),
            RequestOutcome::Failed { kind, message } => {
                (EventStatus::Failed, Some(format!("{}: {}", kind, message)))
            }
            RequestOutcome::Pending => return,
        };
        self.emit(
            run_id,
            &transition.path,
            status,
            transition.outcome.status(),
            error,
        );
    }

    fn emit(
        &self,
        run_id: Option<RunId>,
        path: &str,
        status: EventStatus,
        status_code: Option<u16>,
        error: Option<String>,
    ) {
        let event = ProgressEvent {
            run_id: run_id.unwrap_or_else(|| RunId::from_string("unknown")),
            path: path.to_string(),
            status,
            status_code,
            timestamp: Utc::now(),
            error,
        };
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Current counts.
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.state().snapshot
    }

    /// Current run phase.
    pub fn phase(&self) -> RunPhase {
        self.state().snapshot.phase
    }

    /// Summary of the current (or last) run.
    pub fn summary(&self) -> RunSummary {
        let state = self.state();
        let duration_ms = state.duration_ms.unwrap_or_else(|| {
            state
                .timing
                .as_ref()
                .map(|t| t.elapsed_ms())
                .unwrap_or(0)
        });
        RunSummary {
            run_id: state.run_id.clone(),
            phase: state.snapshot.phase,
            succeeded: state.snapshot.succeeded,
            failed: state.snapshot.failed,
            total: state.snapshot.total,
            duration_ms,
            timings: state.timings.summary(),
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleObserver for ProgressReporter {
    fn on_phase(&self, phase: RunPhase, elapsed: Duration) {
        let mut state = self.state();
        state.snapshot.phase = phase;
        if phase.is_terminal() {
            state.duration_ms = Some(elapsed.as_millis() as u64);
        }
    }
}
