//! Error types for prerender runs.

use crate::run::LedgerError;

/// A path source failed to resolve. Fatal for the whole run.
#[derive(Debug, thiserror::Error)]
#[error("failed to resolve paths for route '{route}'")]
pub struct SourceResolutionError {
    /// Pattern of the route whose source failed.
    pub route: String,
    #[source]
    pub source: anyhow::Error,
}

/// Error type for a prerender run.
///
/// Per-path failures never surface here; they are recorded as outcomes.
#[derive(Debug, thiserror::Error)]
pub enum PrerenderError {
    #[error(transparent)]
    SourceResolution(#[from] SourceResolutionError),

    #[error("run ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

/// Result type for prerender runs.
pub type PrerenderResult<T> = Result<T, PrerenderError>;
