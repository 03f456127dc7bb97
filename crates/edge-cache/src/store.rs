//! Edge cache storage abstraction.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use edge_core::{Headers, RenderedResponse};

use crate::policy::EdgeCachePolicy;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache operation errors.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Failed to serialize or parse a cache entry.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend storage error.
    #[error("storage error: {0}")]
    Storage(String),
}

/// A prerendered response as stored in the edge cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers, including the derived `cache-control`.
    pub headers: Headers,
    /// Response body.
    pub body: Vec<u8>,
    /// When the entry was written.
    pub stored_at: DateTime<Utc>,
    /// Time-to-live in seconds.
    pub max_age_secs: u64,
    /// Stale-while-revalidate window in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stale_while_revalidate_secs: Option<u64>,
}

impl CachedResponse {
    /// Build an entry from a rendered response and the route's edge policy.
    pub fn from_response(response: &RenderedResponse, policy: &EdgeCachePolicy) -> Self {
        let mut headers = response.headers.clone();
        headers.insert("cache-control".to_string(), policy.cache_control_header());

        Self {
            status: response.status,
            headers,
            body: response.body.clone(),
            stored_at: Utc::now(),
            max_age_secs: policy.max_age_seconds,
            stale_while_revalidate_secs: policy.stale_while_revalidate,
        }
    }
}

/// Edge cache backend.
///
/// Writes are upserts: storing under an existing key replaces the entry.
#[async_trait]
pub trait EdgeCacheBackend: Send + Sync {
    /// Store an entry.
    async fn put(&self, key: &str, entry: CachedResponse) -> CacheResult<()>;

    /// Get an entry.
    async fn get(&self, key: &str) -> CacheResult<Option<CachedResponse>>;
}

/// In-memory edge cache backend (for local runs and testing).
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    entries: RwLock<HashMap<String, CachedResponse>>,
}

impl InMemoryBackend {
    /// Create a new in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Check if the backend holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .read()
            .map(|e| e.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }
}

#[async_trait]
impl EdgeCacheBackend for InMemoryBackend {
    async fn put(&self, key: &str, entry: CachedResponse) -> CacheResult<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| CacheError::Storage(e.to_string()))?;
        entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn get(&self, key: &str) -> CacheResult<Option<CachedResponse>> {
        let entries = self
            .entries
            .read()
            .map_err(|e| CacheError::Storage(e.to_string()))?;
        Ok(entries.get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_put_is_upsert() {
        let backend = InMemoryBackend::new();
        let policy = EdgeCachePolicy::default();

        backend
            .put("/", CachedResponse::from_response(&RenderedResponse::ok("one"), &policy))
            .await
            .unwrap();
        backend
            .put("/", CachedResponse::from_response(&RenderedResponse::ok("two"), &policy))
            .await
            .unwrap();

        assert_eq!(backend.len(), 1);
        let entry = backend.get("/").await.unwrap().unwrap();
        assert_eq!(entry.body, b"two".to_vec());
    }

    #[tokio::test]
    async fn test_get_missing() {
        let backend = InMemoryBackend::new();
        assert!(backend.get("/nope").await.unwrap().is_none());
        assert!(backend.is_empty());
    }

    #[test]
    fn test_entry_carries_policy() {
        let policy = EdgeCachePolicy::new(Duration::from_secs(120))
            .with_swr(Duration::from_secs(30));
        let response = RenderedResponse::ok("<html></html>").with_header("Content-Type", "text/html");

        let entry = CachedResponse::from_response(&response, &policy);

        assert_eq!(entry.max_age_secs, 120);
        assert_eq!(entry.stale_while_revalidate_secs, Some(30));
        assert_eq!(
            entry.headers.get("cache-control").map(String::as_str),
            Some("public, s-maxage=120, stale-while-revalidate=30")
        );
        assert_eq!(
            entry.headers.get("content-type").map(String::as_str),
            Some("text/html")
        );
    }
}
