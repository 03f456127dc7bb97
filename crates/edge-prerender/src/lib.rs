//! Deploy-time prerendering for edge deployments.
//!
//! This crate provides:
//! - `PathSource` / `PrerenderPlan` - Which paths to render, per route
//! - `QuotaGate` - Tier concurrency and total-request ceilings
//! - `Orchestrator` - Enumerate, admit, fetch, cache and settle every path
//! - `ProgressReporter` - Live events and snapshots for the developer console
//! - `DeploymentRun` - The per-path outcome ledger
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use edge_cache::{CacheWriter, InMemoryBackend};
//! use edge_core::{PrerenderSettings, Tier};
//! use edge_data::{FetchExecutor, HttpPipeline, TimeoutConfig};
//! use edge_prerender::{Orchestrator, PathSource, PrerenderPlan, PrerenderRoute};
//!
//! let pipeline = HttpPipeline::new("http://localhost:3000", TimeoutConfig::default())?;
//! let orchestrator = Orchestrator::new(
//!     PrerenderSettings::for_tier(Tier::Free),
//!     FetchExecutor::new(Arc::new(pipeline)),
//!     CacheWriter::new(Arc::new(InMemoryBackend::new())),
//! );
//!
//! let plan = PrerenderPlan::new()
//!     .with_route(PrerenderRoute::new("/", PathSource::from_paths(["/", "/about"])?));
//! let report = orchestrator.run_to_completion(&plan).await?;
//! ```

mod error;
mod orchestrator;
mod plan;
mod progress;
mod quota;
mod run;
mod source;

pub use error::*;
pub use orchestrator::*;
pub use plan::*;
pub use progress::*;
pub use quota::*;
pub use run::*;
pub use source::*;
