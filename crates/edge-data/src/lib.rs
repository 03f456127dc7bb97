//! Fetch layer for prerendering.
//!
//! This crate provides:
//! - `RenderPipeline` - The application's request pipeline, as a trait
//! - `FetchExecutor` - Per-request timeout and opt-in retry around a pipeline
//! - `HttpPipeline` - A pipeline that requests paths from a running origin
//! - `TimeoutConfig` / `RetryPolicy` - Fetch policy knobs

mod client;
mod http;
mod retry;
mod timeout;

pub use client::*;
pub use http::*;
pub use retry::*;
pub use timeout::*;
