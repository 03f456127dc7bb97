//! Prerender plans: routes, their path sources and cache policies.

use std::sync::Arc;

use edge_cache::RouteCachePolicy;
use edge_core::PrerenderRequest;

use crate::error::SourceResolutionError;
use crate::source::PathSource;

/// One route to prerender.
#[derive(Debug, Clone)]
pub struct PrerenderRoute {
    /// Route pattern, e.g. `/categories/:slug`.
    pub pattern: String,
    /// Where the route's paths come from.
    pub source: PathSource,
    /// How successful renders are cached.
    pub cache: RouteCachePolicy,
}

impl PrerenderRoute {
    /// Create a route with the default cache policy.
    pub fn new(pattern: impl Into<String>, source: PathSource) -> Self {
        Self {
            pattern: pattern.into(),
            source,
            cache: RouteCachePolicy::default(),
        }
    }

    /// Set the cache policy.
    pub fn with_cache(mut self, cache: RouteCachePolicy) -> Self {
        self.cache = cache;
        self
    }
}

/// A resolved request paired with its route's cache policy.
#[derive(Debug, Clone)]
pub struct PrerenderTarget {
    pub route: String,
    pub request: PrerenderRequest,
    pub cache: Arc<RouteCachePolicy>,
}

/// Ordered list of routes for a deployment.
#[derive(Debug, Clone, Default)]
pub struct PrerenderPlan {
    routes: Vec<PrerenderRoute>,
}

impl PrerenderPlan {
    /// Create an empty plan.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route.
    pub fn with_route(mut self, route: PrerenderRoute) -> Self {
        self.routes.push(route);
        self
    }

    /// Add a route in place.
    pub fn push(&mut self, route: PrerenderRoute) {
        self.routes.push(route);
    }

    pub fn routes(&self) -> &[PrerenderRoute] {
        &self.routes
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Resolve every route, in order.
    ///
    /// Stops at the first failing source; nothing is returned for a plan that
    /// did not fully resolve.
    pub async fn resolve(&self) -> Result<Vec<PrerenderTarget>, SourceResolutionError> {
        let mut targets = Vec::new();

        for route in &self.routes {
            let requests =
                route
                    .source
                    .resolve()
                    .await
                    .map_err(|source| SourceResolutionError {
                        route: route.pattern.clone(),
                        source,
                    })?;

            tracing::debug!(
                route = %route.pattern,
                source = route.source.kind(),
                count = requests.len(),
                "resolved route paths"
            );

            let cache = Arc::new(route.cache.clone());
            targets.extend(requests.into_iter().map(|request| PrerenderTarget {
                route: route.pattern.clone(),
                request,
                cache: cache.clone(),
            }));
        }

        Ok(targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_keeps_route_order() {
        let plan = PrerenderPlan::new()
            .with_route(PrerenderRoute::new(
                "/",
                PathSource::from_paths(["/"]).unwrap(),
            ))
            .with_route(
                PrerenderRoute::new(
                    "/categories/:slug",
                    PathSource::from_path_list("/categories/mens\n/categories/womens"),
                )
                .with_cache(RouteCachePolicy::none()),
            );

        let targets = plan.resolve().await.unwrap();
        let paths: Vec<_> = targets.iter().map(|t| t.request.path()).collect();

        assert_eq!(paths, vec!["/", "/categories/mens", "/categories/womens"]);
        assert!(targets[0].cache.enabled);
        assert!(!targets[2].cache.enabled);
        assert_eq!(targets[1].route, "/categories/:slug");
    }

    #[tokio::test]
    async fn test_resolve_names_failing_route() {
        let plan = PrerenderPlan::new()
            .with_route(PrerenderRoute::new(
                "/",
                PathSource::from_paths(["/"]).unwrap(),
            ))
            .with_route(PrerenderRoute::new(
                "/products/:id",
                PathSource::from_fn(|| Err(anyhow::anyhow!("catalog offline"))),
            ));

        let err = plan.resolve().await.unwrap_err();
        assert_eq!(err.route, "/products/:id");
        assert_eq!(err.source.to_string(), "catalog offline");
    }
}
