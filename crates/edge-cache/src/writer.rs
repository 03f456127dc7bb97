//! Writes prerendered responses into the edge cache.

use std::sync::Arc;

use edge_core::{PrerenderRequest, RenderedResponse};

use crate::key::CacheKey;
use crate::policy::RouteCachePolicy;
use crate::store::{CacheResult, CachedResponse, EdgeCacheBackend};

/// Stores successful prerenders under their deterministic cache key.
///
/// No read-modify-write: every store is an upsert, so writing the same
/// variant twice collapses into one entry.
#[derive(Clone)]
pub struct CacheWriter {
    backend: Arc<dyn EdgeCacheBackend>,
}

impl CacheWriter {
    /// Create a writer over a backend.
    pub fn new(backend: Arc<dyn EdgeCacheBackend>) -> Self {
        Self { backend }
    }

    /// Store a response and return the key it was written under.
    pub async fn store(
        &self,
        request: &PrerenderRequest,
        response: &RenderedResponse,
        policy: &RouteCachePolicy,
    ) -> CacheResult<CacheKey> {
        let key = policy.key.build(request);
        let entry = CachedResponse::from_response(response, &policy.edge);

        self.backend.put(key.as_str(), entry).await?;

        tracing::debug!(
            path = request.path(),
            cache_key = %key,
            max_age = policy.edge.max_age_seconds,
            "stored prerendered response"
        );

        Ok(key)
    }
}

impl std::fmt::Debug for CacheWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheWriter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::key::CacheKeySpec;
    use crate::store::{CacheError, InMemoryBackend};

    fn language_policy() -> RouteCachePolicy {
        RouteCachePolicy::default().with_key(CacheKeySpec::new().cookie("language"))
    }

    fn mens(language: &str) -> PrerenderRequest {
        PrerenderRequest::new("/categories/mens")
            .unwrap()
            .with_cookie("language", language)
    }

    #[tokio::test]
    async fn test_language_variants_stored_separately() {
        let backend = Arc::new(InMemoryBackend::new());
        let writer = CacheWriter::new(backend.clone());
        let policy = language_policy();

        let de = writer
            .store(&mens("de"), &RenderedResponse::ok("Herren"), &policy)
            .await
            .unwrap();
        let en = writer
            .store(&mens("en"), &RenderedResponse::ok("Men"), &policy)
            .await
            .unwrap();

        assert_ne!(de, en);
        assert_eq!(backend.len(), 2);
        assert_eq!(
            backend.get(de.as_str()).await.unwrap().unwrap().body,
            b"Herren".to_vec()
        );
        assert_eq!(
            backend.get(en.as_str()).await.unwrap().unwrap().body,
            b"Men".to_vec()
        );
    }

    #[tokio::test]
    async fn test_identical_variants_collapse() {
        let backend = Arc::new(InMemoryBackend::new());
        let writer = CacheWriter::new(backend.clone());
        let policy = language_policy();

        let first = writer
            .store(&mens("de"), &RenderedResponse::ok("v1"), &policy)
            .await
            .unwrap();
        let second = writer
            .store(&mens("de"), &RenderedResponse::ok("v2"), &policy)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(backend.len(), 1);
    }

    struct FailingBackend;

    #[async_trait]
    impl EdgeCacheBackend for FailingBackend {
        async fn put(&self, _key: &str, _entry: CachedResponse) -> CacheResult<()> {
            Err(CacheError::Storage("disk full".to_string()))
        }

        async fn get(&self, _key: &str) -> CacheResult<Option<CachedResponse>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_backend_error_propagates() {
        let writer = CacheWriter::new(Arc::new(FailingBackend));
        let err = writer
            .store(&mens("de"), &RenderedResponse::ok("x"), &language_policy())
            .await
            .unwrap_err();

        assert!(matches!(err, CacheError::Storage(_)));
    }
}
