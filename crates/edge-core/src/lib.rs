//! Core abstractions for edge prerendering.
//!
//! This crate provides the fundamental types shared by every stage:
//! - `PrerenderRequest` - A path (plus headers) to render at deploy time
//! - `RenderedResponse` - What the application's render pipeline returned
//! - `TierLimits` - Concurrency and total-request ceilings per tier
//! - `RunPhase` - Deployment run lifecycle tracking

mod config;
mod context;
mod lifecycle;
mod request;
mod response;

pub use config::*;
pub use context::*;
pub use lifecycle::*;
pub use request::*;
pub use response::*;
