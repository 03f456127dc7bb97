//! Observability infrastructure for edge prerendering.
//!
//! This crate provides:
//! - `init_tracing` - Global `tracing` subscriber with JSON or human output
//! - `FetchTimings` - Per-fetch latency collection and percentiles

mod logging;
mod metrics;

pub use logging::*;
pub use metrics::*;
