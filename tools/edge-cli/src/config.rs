//! CLI configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use edge_cache::RouteCachePolicy;
use edge_core::{CancelPolicy, InvalidPath, PrerenderRequest, PrerenderSettings, Tier};
use edge_data::{BackoffStrategy, FetchPolicy, RetryCondition, RetryPolicy, TimeoutConfig};
use edge_prerender::{PathSource, PrerenderPlan, PrerenderRoute};

/// CLI configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    /// Run-wide prerender settings.
    #[serde(default)]
    pub prerender: PrerenderConfig,

    /// Routes to prerender.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<RouteConfig>,
}

impl CliConfig {
    /// Load config from a file.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        if path.ends_with(".json") {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path))
        } else {
            Self::from_toml(&content)
                .with_context(|| format!("Failed to parse TOML config: {}", path))
        }
    }

    /// Parse TOML config text.
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Build the prerender plan.
    ///
    /// `env_paths` is the already-read value of the `paths_env` variable; it
    /// becomes one extra route with the default cache policy.
    pub fn plan(&self, env_paths: Option<String>) -> Result<PrerenderPlan> {
        let mut plan = PrerenderPlan::new();

        for route in &self.routes {
            let requests = route
                .requests()
                .with_context(|| format!("Invalid path in route '{}'", route.pattern))?;
            plan.push(
                PrerenderRoute::new(&route.pattern, PathSource::Static(requests))
                    .with_cache(route.cache.clone()),
            );
        }

        if let Some(text) = env_paths {
            let name = self.prerender.paths_env.as_deref().unwrap_or("paths");
            plan.push(PrerenderRoute::new(
                format!("${}", name),
                PathSource::from_path_list(text),
            ));
        }

        Ok(plan)
    }

    /// Check the config for problems. Returns `(errors, warnings)`.
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let limits = self.prerender.tier.limits();

        if self.prerender.concurrency == Some(0) {
            errors.push("prerender.concurrency must be at least 1".to_string());
        }
        if let Some(concurrency) = self.prerender.concurrency {
            if concurrency > limits.concurrency {
                warnings.push(format!(
                    "prerender.concurrency {} exceeds the {} tier maximum of {}; it will be clamped",
                    concurrency, self.prerender.tier, limits.concurrency
                ));
            }
        }
        if self.prerender.timeout_secs == 0 {
            errors.push("prerender.timeout_secs must be at least 1".to_string());
        }

        let mut total = 0;
        for (i, route) in self.routes.iter().enumerate() {
            if !route.pattern.starts_with('/') {
                errors.push(format!("routes[{}].pattern must start with '/'", i));
            }
            if route.paths.is_empty() {
                warnings.push(format!("routes[{}] ('{}') has no paths", i, route.pattern));
            }
            for (j, entry) in route.paths.iter().enumerate() {
                if let Err(err) = entry.to_request() {
                    errors.push(format!("routes[{}].paths[{}]: {}", i, j, err));
                }
            }
            total += route.paths.len();
        }

        if total > limits.total_request_cap {
            warnings.push(format!(
                "{} configured paths exceed the {} tier cap of {}; the rest will fail with quota_exceeded",
                total, self.prerender.tier, limits.total_request_cap
            ));
        }

        (errors, warnings)
    }
}

/// `[prerender]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrerenderConfig {
    /// Plan tier (`free` or `enterprise`).
    #[serde(default)]
    pub tier: Tier,

    /// Concurrency override; can only lower the tier's ceiling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Environment variable holding newline-separated paths.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paths_env: Option<String>,

    /// What to do with in-flight fetches on Ctrl-C.
    #[serde(default)]
    pub cancel_policy: CancelPolicy,

    /// Retries for timeouts, connection errors and 5xx responses.
    #[serde(default)]
    pub max_retries: u32,

    /// Base URL of the running application.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,

    /// Where cache entries are written (default `.edge/cache`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<String>,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for PrerenderConfig {
    fn default() -> Self {
        Self {
            tier: Tier::default(),
            concurrency: None,
            timeout_secs: default_timeout_secs(),
            paths_env: None,
            cancel_policy: CancelPolicy::default(),
            max_retries: 0,
            origin: None,
            cache_dir: None,
        }
    }
}

impl PrerenderConfig {
    /// Effective run settings.
    pub fn settings(&self) -> PrerenderSettings {
        PrerenderSettings::for_tier(self.tier)
            .with_concurrency(self.concurrency)
            .with_cancel_policy(self.cancel_policy)
    }

    /// Effective fetch policy.
    pub fn fetch_policy(&self) -> FetchPolicy {
        let retry = if self.max_retries == 0 {
            RetryPolicy::none()
        } else {
            RetryPolicy::new(self.max_retries)
                .with_backoff(BackoffStrategy::Exponential {
                    base: Duration::from_millis(200),
                    max: Duration::from_secs(5),
                })
                .with_conditions(vec![
                    RetryCondition::ServerError,
                    RetryCondition::Timeout,
                    RetryCondition::ConnectionError,
                ])
        };
        FetchPolicy::new(self.timeouts(), retry)
    }

    /// Effective timeouts.
    pub fn timeouts(&self) -> TimeoutConfig {
        TimeoutConfig::from_total(Duration::from_secs(self.timeout_secs.max(1)))
    }
}

/// `[[routes]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    /// Route pattern, e.g. `/categories/:slug`.
    pub pattern: String,

    /// Concrete paths to render for this route.
    #[serde(default)]
    pub paths: Vec<PathEntry>,

    /// Cache policy: `{ key, edge }`.
    #[serde(default)]
    pub cache: RouteCachePolicy,
}

impl RouteConfig {
    /// Validate and convert every path entry.
    pub fn requests(&self) -> Result<Vec<PrerenderRequest>, InvalidPath> {
        self.paths.iter().map(PathEntry::to_request).collect()
    }
}

/// A path, either bare or with request headers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathEntry {
    Path(String),
    Request {
        path: String,
        #[serde(default)]
        headers: BTreeMap<String, String>,
    },
}

impl PathEntry {
    /// Convert to a validated request.
    pub fn to_request(&self) -> Result<PrerenderRequest, InvalidPath> {
        match self {
            Self::Path(path) => PrerenderRequest::new(path.as_str()),
            Self::Request { path, headers } => {
                let mut request = PrerenderRequest::new(path.as_str())?;
                for (name, value) in headers {
                    request = request.with_header(name.as_str(), value.as_str());
                }
                Ok(request)
            }
        }
    }
}

/// Example `edge.toml`.
pub fn generate_default_config() -> String {
    r#"# Edge prerender configuration

[prerender]
tier = "free"
timeout_secs = 30
paths_env = "PRERENDER_PATHS"
cancel_policy = "drain"
max_retries = 0
# origin = "http://localhost:3000"
# cache_dir = ".edge/cache"

[[routes]]
pattern = "/"
paths = ["/"]

[[routes]]
pattern = "/categories/:slug"
paths = [
  { path = "/categories/mens", headers = { cookie = "language=de" } },
  { path = "/categories/mens", headers = { cookie = "language=en" } },
]

[routes.cache]
key = { cookies = ["language"], headers = [] }
edge = { maxAgeSeconds = 3600, staleWhileRevalidate = 60 }
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_config() {
        let config = CliConfig::from_toml(&generate_default_config()).unwrap();

        assert_eq!(config.prerender.tier, Tier::Free);
        assert_eq!(config.prerender.paths_env.as_deref(), Some("PRERENDER_PATHS"));
        assert_eq!(config.routes.len(), 2);
        assert_eq!(config.prerender.cache_dir, None);

        let categories = &config.routes[1];
        assert_eq!(categories.cache.edge.max_age_seconds, 3600);
        assert_eq!(categories.cache.edge.stale_while_revalidate, Some(60));
        assert!(!categories.cache.key.is_path_only());

        let requests = categories.requests().unwrap();
        assert_eq!(requests[0].cookie("language").as_deref(), Some("de"));
    }

    #[test]
    fn test_settings_clamp_concurrency() {
        let config = CliConfig::from_toml("[prerender]\ntier = \"free\"\nconcurrency = 50\n").unwrap();
        assert_eq!(config.prerender.settings().limits.concurrency, 10);

        let (errors, warnings) = config.validate();
        assert!(errors.is_empty());
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_validate_reports_bad_paths() {
        let config = CliConfig::from_toml(
            "[[routes]]\npattern = \"/blog/:slug\"\npaths = [\"/blog/a\", \"blog/b\"]\n",
        )
        .unwrap();

        let (errors, _) = config.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("routes[0].paths[1]"));
        assert!(config.plan(None).is_err());
    }

    #[tokio::test]
    async fn test_plan_appends_env_route() {
        let config = CliConfig::from_toml(&generate_default_config()).unwrap();
        let plan = config.plan(Some("/about\n/contact\n".to_string())).unwrap();

        assert_eq!(plan.routes().len(), 3);
        assert_eq!(plan.routes()[2].pattern, "$PRERENDER_PATHS");

        let targets = plan.resolve().await.unwrap();
        assert_eq!(targets.len(), 5);
        assert_eq!(targets[4].request.path(), "/contact");
    }

    #[test]
    fn test_retry_policy_opt_in() {
        let mut prerender = PrerenderConfig::default();
        assert_eq!(prerender.fetch_policy().retry, RetryPolicy::none());

        prerender.max_retries = 2;
        assert_eq!(prerender.fetch_policy().retry.max_attempts, 2);
        assert_eq!(prerender.timeouts().total, Duration::from_secs(30));
    }

    #[test]
    fn test_validate_rejects_host_paths() {
        let config = CliConfig::from_toml(
            "[prerender]\ncache_dir = \"dist/cache\"\n\n[[routes]]\npattern = \"/\"\npaths = [\"//evil.example/x\"]\n",
        )
        .unwrap();

        assert_eq!(config.prerender.cache_dir.as_deref(), Some("dist/cache"));
        let (errors, _) = config.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("names a host"));
    }
}
