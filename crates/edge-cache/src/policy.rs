//! Route-level cache policies.

use std::time::Duration;

use http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::key::CacheKeySpec;

/// Default edge TTL when a route does not configure one.
pub const DEFAULT_MAX_AGE_SECS: u64 = 3600;

/// Edge TTL and staleness window.
///
/// These values are opaque to prerendering; they are forwarded to the edge
/// cache with every write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeCachePolicy {
    /// Time-to-live in seconds (`edge.maxAgeSeconds`).
    #[serde(default = "default_max_age")]
    pub max_age_seconds: u64,
    /// Stale-while-revalidate window in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stale_while_revalidate: Option<u64>,
}

fn default_max_age() -> u64 {
    DEFAULT_MAX_AGE_SECS
}

impl Default for EdgeCachePolicy {
    fn default() -> Self {
        Self {
            max_age_seconds: DEFAULT_MAX_AGE_SECS,
            stale_while_revalidate: None,
        }
    }
}

impl EdgeCachePolicy {
    /// Create a policy with the given TTL.
    pub fn new(max_age: Duration) -> Self {
        Self {
            max_age_seconds: max_age.as_secs(),
            stale_while_revalidate: None,
        }
    }

    /// Set stale-while-revalidate window.
    pub fn with_swr(mut self, duration: Duration) -> Self {
        self.stale_while_revalidate = Some(duration.as_secs());
        self
    }

    /// TTL as a duration.
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_seconds)
    }

    /// Staleness window as a duration.
    pub fn swr(&self) -> Option<Duration> {
        self.stale_while_revalidate.map(Duration::from_secs)
    }

    /// Generate Cache-Control header value.
    pub fn cache_control_header(&self) -> String {
        let mut parts = vec![
            "public".to_string(),
            format!("s-maxage={}", self.max_age_seconds),
        ];

        if let Some(swr) = self.stale_while_revalidate {
            parts.push(format!("stale-while-revalidate={}", swr));
        }

        parts.join(", ")
    }
}

/// Per-route cache configuration: `{ key, edge }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteCachePolicy {
    /// Whether successful prerenders of this route are written to the cache.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Attributes extending the cache key beyond the path.
    #[serde(default)]
    pub key: CacheKeySpec,
    /// TTL and staleness window.
    #[serde(default)]
    pub edge: EdgeCachePolicy,
    /// Non-2xx statuses that are still cached (e.g. permanent redirects).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_cacheable_statuses: Vec<u16>,
}

fn default_true() -> bool {
    true
}

impl Default for RouteCachePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            key: CacheKeySpec::new(),
            edge: EdgeCachePolicy::default(),
            extra_cacheable_statuses: Vec::new(),
        }
    }
}

impl RouteCachePolicy {
    /// Create a cache policy with the given TTL.
    pub fn new(max_age: Duration) -> Self {
        Self {
            edge: EdgeCachePolicy::new(max_age),
            ..Default::default()
        }
    }

    /// Create a policy that never writes to the cache.
    pub fn none() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Set the cache key spec.
    pub fn with_key(mut self, key: CacheKeySpec) -> Self {
        self.key = key;
        self
    }

    /// Set stale-while-revalidate window.
    pub fn with_swr(mut self, duration: Duration) -> Self {
        self.edge = self.edge.with_swr(duration);
        self
    }

    /// Also cache responses with this status.
    pub fn cache_status(mut self, status: u16) -> Self {
        if !self.extra_cacheable_statuses.contains(&status) {
            self.extra_cacheable_statuses.push(status);
        }
        self
    }

    /// Whether a response with `status` counts as a successful prerender.
    pub fn accepts_status(&self, status: u16) -> bool {
        StatusCode::from_u16(status).is_ok_and(|s| s.is_success())
            || self.extra_cacheable_statuses.contains(&status)
    }

    /// Whether a response with `status` should be written to the cache.
    pub fn should_cache(&self, status: u16) -> bool {
        self.enabled && self.accepts_status(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_only_by_default() {
        let policy = RouteCachePolicy::default();

        assert!(policy.should_cache(200));
        assert!(policy.should_cache(204));
        assert!(!policy.should_cache(301));
        assert!(!policy.should_cache(404));
        assert!(!policy.should_cache(500));
        assert!(!policy.should_cache(1000));
    }

    #[test]
    fn test_extra_statuses() {
        let policy = RouteCachePolicy::default().cache_status(301).cache_status(301);

        assert!(policy.should_cache(301));
        assert_eq!(policy.extra_cacheable_statuses, vec![301]);
    }

    #[test]
    fn test_disabled_policy_accepts_but_does_not_cache() {
        let policy = RouteCachePolicy::none();

        assert!(policy.accepts_status(200));
        assert!(!policy.should_cache(200));
    }

    #[test]
    fn test_cache_control_header() {
        let policy = EdgeCachePolicy::new(Duration::from_secs(300))
            .with_swr(Duration::from_secs(60));

        assert_eq!(
            policy.cache_control_header(),
            "public, s-maxage=300, stale-while-revalidate=60"
        );
        assert_eq!(
            EdgeCachePolicy::default().cache_control_header(),
            "public, s-maxage=3600"
        );
    }

    #[test]
    fn test_route_policy_config_shape() {
        let policy: RouteCachePolicy = serde_json::from_str(
            r#"{
                "key": {"cookies": ["language"]},
                "edge": {"maxAgeSeconds": 60, "staleWhileRevalidate": 30}
            }"#,
        )
        .unwrap();

        assert!(policy.enabled);
        assert_eq!(policy.edge.max_age(), Duration::from_secs(60));
        assert_eq!(policy.edge.swr(), Some(Duration::from_secs(30)));
        assert_eq!(policy.key, CacheKeySpec::new().cookie("language"));
    }
}
