//! Edge cache infrastructure for prerendering.
//!
//! This crate provides:
//! - `CacheKeySpec` - Custom cache key composition from path, headers and cookies
//! - `RouteCachePolicy` - Route-level `{ key, edge }` cache configuration
//! - `EdgeCacheBackend` - Storage abstraction with in-memory and file implementations
//! - `CacheWriter` - Stores successful prerenders under their cache key
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use edge_cache::{CacheKeySpec, RouteCachePolicy};
//!
//! // Cache German and English variants of a page independently
//! let policy = RouteCachePolicy::new(Duration::from_secs(3600))
//!     .with_swr(Duration::from_secs(60))
//!     .with_key(CacheKeySpec::new().cookie("language"));
//! ```

mod file;
mod key;
mod policy;
mod store;
mod writer;

pub use file::*;
pub use key::*;
pub use policy::*;
pub use store::*;
pub use writer::*;
