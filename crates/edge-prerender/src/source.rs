//! Path sources: where prerender targets come from.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use edge_core::{InvalidPath, PrerenderRequest};

/// Future returned by an asynchronous path resolver.
pub type ResolveFuture = BoxFuture<'static, anyhow::Result<Vec<PrerenderRequest>>>;

type SyncResolver = dyn Fn() -> anyhow::Result<Vec<PrerenderRequest>> + Send + Sync;
type AsyncResolver = dyn Fn() -> ResolveFuture + Send + Sync;

/// Produces the finite, ordered list of requests for one route.
///
/// Every variant resolves to the same thing in a single step; there is no
/// streaming enumeration.
#[derive(Clone)]
pub enum PathSource {
    /// A fixed list of requests.
    Static(Vec<PrerenderRequest>),
    /// Newline-separated paths, e.g. the value of an environment variable.
    PathList(String),
    /// A synchronous resolver.
    Deferred(Arc<SyncResolver>),
    /// An asynchronous resolver that may hit the network.
    DeferredAsync(Arc<AsyncResolver>),
}

impl PathSource {
    /// Build a static source from plain paths.
    pub fn from_paths<I, S>(paths: I) -> Result<Self, InvalidPath>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let requests = paths
            .into_iter()
            .map(PrerenderRequest::new)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::Static(requests))
    }

    /// Build a source from newline-separated text.
    pub fn from_path_list(text: impl Into<String>) -> Self {
        Self::PathList(text.into())
    }

    /// Build a source from a synchronous resolver.
    pub fn from_fn<F>(resolver: F) -> Self
    where
        F: Fn() -> anyhow::Result<Vec<PrerenderRequest>> + Send + Sync + 'static,
    {
        Self::Deferred(Arc::new(resolver))
    }

    /// Build a source from an asynchronous resolver.
    pub fn from_async<F, Fut>(resolver: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Vec<PrerenderRequest>>> + Send + 'static,
    {
        Self::DeferredAsync(Arc::new(move || resolver().boxed()))
    }

    /// Resolve the full list of requests.
    pub async fn resolve(&self) -> anyhow::Result<Vec<PrerenderRequest>> {
        match self {
            Self::Static(requests) => Ok(requests.clone()),
            Self::PathList(text) => Ok(parse_path_list(text)?),
            Self::Deferred(resolver) => resolver(),
            Self::DeferredAsync(resolver) => resolver().await,
        }
    }

    /// Short description for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Static(_) => "static",
            Self::PathList(_) => "path-list",
            Self::Deferred(_) => "deferred",
            Self::DeferredAsync(_) => "deferred-async",
        }
    }
}

impl std::fmt::Debug for PathSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static(requests) => f.debug_tuple("Static").field(&requests.len()).finish(),
            Self::PathList(text) => f.debug_tuple("PathList").field(&text.lines().count()).finish(),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
            Self::DeferredAsync(_) => f.write_str("DeferredAsync(..)"),
        }
    }
}

/// Parse newline-separated paths.
///
/// Surrounding whitespace is trimmed; blank lines and `#` comments are
/// skipped. Any other line must be a valid path.
pub fn parse_path_list(text: &str) -> Result<Vec<PrerenderRequest>, InvalidPath> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(PrerenderRequest::new)
        .collect()
}
