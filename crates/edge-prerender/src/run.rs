//! Deployment run ledger: one outcome per enumerated request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use edge_cache::CacheKey;
use edge_core::{PrerenderRequest, RunId, RunPhase};

/// Why a request failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The tier's total request cap was already used up.
    QuotaExceeded,
    /// Network or application failure, or a non-cacheable status.
    Fetch,
    /// The fetch exceeded its time bound.
    Timeout,
    /// The run was cancelled before this request finished.
    Cancelled,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::QuotaExceeded => write!(f, "quota_exceeded"),
            Self::Fetch => write!(f, "fetch"),
            Self::Timeout => write!(f, "timeout"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Outcome of one prerender request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RequestOutcome {
    /// Not yet settled.
    #[default]
    Pending,
    /// Fetched with an accepted status.
    Succeeded {
        status: u16,
        /// Key the response was cached under, if it was written.
        #[serde(skip_serializing_if = "Option::is_none")]
        cache_key: Option<CacheKey>,
        /// Cache write failure, reported as a warning.
        #[serde(skip_serializing_if = "Option::is_none")]
        cache_warning: Option<String>,
    },
    /// Terminal failure.
    Failed { kind: FailureKind, message: String },
}

impl RequestOutcome {
    /// Create a failed outcome.
    pub fn failed(kind: FailureKind, message: impl Into<String>) -> Self {
        Self::Failed {
            kind,
            message: message.into(),
        }
    }

    /// Check if this outcome is final.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Check if this outcome is a success.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    /// Failure kind, if failed.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Failed { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Error message, if failed.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Failed { message, .. } => Some(message),
            _ => None,
        }
    }

    /// HTTP status, if succeeded.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Succeeded { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Cache key, if the response was cached.
    pub fn cache_key(&self) -> Option<&CacheKey> {
        match self {
            Self::Succeeded { cache_key, .. } => cache_key.as_ref(),
            _ => None,
        }
    }
}

/// One enumerated request and its outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeEntry {
    /// Route pattern the request came from.
    pub route: String,
    /// The request.
    pub request: PrerenderRequest,
    /// Current outcome.
    pub outcome: RequestOutcome,
    /// When the outcome was finalized.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Aggregate counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    pub succeeded: usize,
    pub failed: usize,
    pub remaining: usize,
}

impl RunCounters {
    /// Total enumerated requests.
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.remaining
    }
}

/// Ledger misuse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("no request at index {0}")]
    UnknownIndex(usize),

    #[error("request at index {0} is already finalized")]
    AlreadyFinalized(usize),

    #[error("cannot finalize request {0} as pending")]
    NotTerminal(usize),

    #[error("invalid run transition from {from} to {to}")]
    InvalidTransition { from: RunPhase, to: RunPhase },

    #[error("{0} requests still pending")]
    Incomplete(usize),
}

/// The full record of one deployment's prerender phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRun {
    id: RunId,
    phase: RunPhase,
    entries: Vec<OutcomeEntry>,
    counters: RunCounters,
    started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    finished_at: Option<DateTime<Utc>>,
}

impl DeploymentRun {
    /// Create a run in the `Enumerating` phase.
    pub fn new(id: RunId) -> Self {
        Self {
            id,
            phase: RunPhase::Enumerating,
            entries: Vec::new(),
            counters: RunCounters::default(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    fn transition(&mut self, to: RunPhase) -> Result<(), LedgerError> {
        if !self.phase.can_transition_to(to) {
            return Err(LedgerError::InvalidTransition {
                from: self.phase,
                to,
            });
        }
        self.phase = to;
        if to.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Record the enumerated requests and enter `Running`.
    pub fn begin<I>(&mut self, requests: I) -> Result<(), LedgerError>
    where
        I: IntoIterator<Item = (String, PrerenderRequest)>,
    {
        self.transition(RunPhase::Running)?;
        self.entries = requests
            .into_iter()
            .map(|(route, request)| OutcomeEntry {
                route,
                request,
                outcome: RequestOutcome::Pending,
                finished_at: None,
            })
            .collect();
        self.counters = RunCounters {
            remaining: self.entries.len(),
            ..Default::default()
        };
        Ok(())
    }

    /// Enumeration failed.
    pub fn abort(&mut self) -> Result<(), LedgerError> {
        self.transition(RunPhase::Aborted)
    }

    /// Settle one request. Each request can be settled exactly once.
    pub fn finalize(
        &mut self,
        index: usize,
        outcome: RequestOutcome,
    ) -> Result<&OutcomeEntry, LedgerError> {
        if !outcome.is_terminal() {
            return Err(LedgerError::NotTerminal(index));
        }
        let entry = self
            .entries
            .get_mut(index)
            .ok_or(LedgerError::UnknownIndex(index))?;
        if entry.outcome.is_terminal() {
            return Err(LedgerError::AlreadyFinalized(index));
        }

        if outcome.is_success() {
            self.counters.succeeded += 1;
        } else {
            self.counters.failed += 1;
        }
        self.counters.remaining -= 1;

        entry.outcome = outcome;
        entry.finished_at = Some(Utc::now());
        Ok(entry)
    }

    /// Enter `Completed`. Every request must be settled.
    pub fn complete(&mut self) -> Result<(), LedgerError> {
        if self.counters.remaining > 0 {
            return Err(LedgerError::Incomplete(self.counters.remaining));
        }
        self.transition(RunPhase::Completed)
    }

    /// Indexes of requests not yet settled.
    pub fn pending_indices(&self) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.outcome.is_terminal())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn id(&self) -> &RunId {
        &self.id
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn entries(&self) -> &[OutcomeEntry] {
        &self.entries
    }

    pub fn counters(&self) -> RunCounters {
        self.counters
    }

    pub fn total(&self) -> usize {
        self.entries.len()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Entries that failed, in enumeration order.
    pub fn failures(&self) -> impl Iterator<Item = &OutcomeEntry> {
        self.entries.iter().filter(|e| e.outcome.failure_kind().is_some())
    }

    /// Number of failures of one kind.
    pub fn count_failed(&self, kind: FailureKind) -> usize {
        self.entries
            .iter()
            .filter(|e| e.outcome.failure_kind() == Some(kind))
            .count()
    }
}
