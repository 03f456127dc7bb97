//! Tier limits and run-wide prerender settings.

use serde::{Deserialize, Serialize};

/// A named bundle of prerender limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// 10 concurrent fetches, 100 requests per deployment.
    #[default]
    Free,
    /// 200 concurrent fetches, 25 000 requests per deployment.
    Enterprise,
}

impl Tier {
    /// Built-in limits for this tier.
    pub fn limits(&self) -> TierLimits {
        match self {
            Self::Free => TierLimits {
                concurrency: 10,
                total_request_cap: 100,
            },
            Self::Enterprise => TierLimits {
                concurrency: 200,
                total_request_cap: 25_000,
            },
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Free => write!(f, "free"),
            Self::Enterprise => write!(f, "enterprise"),
        }
    }
}

impl std::str::FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "enterprise" => Ok(Self::Enterprise),
            other => Err(format!("unknown tier '{}'", other)),
        }
    }
}

/// Concurrency and lifetime request ceilings for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierLimits {
    /// Maximum fetches in flight at once.
    pub concurrency: usize,
    /// Maximum fetches dispatched over the whole run.
    pub total_request_cap: usize,
}

impl Default for TierLimits {
    fn default() -> Self {
        Tier::default().limits()
    }
}

impl TierLimits {
    /// Create explicit limits. Both values are raised to at least 1.
    pub fn new(concurrency: usize, total_request_cap: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            total_request_cap: total_request_cap.max(1),
        }
    }

    /// Apply a concurrency override.
    ///
    /// Overrides may only lower concurrency; values above the current ceiling
    /// are clamped to it and zero is raised to 1.
    pub fn with_concurrency_override(mut self, concurrency: Option<usize>) -> Self {
        if let Some(requested) = concurrency {
            self.concurrency = requested.clamp(1, self.concurrency);
        }
        self
    }
}

impl From<Tier> for TierLimits {
    fn from(tier: Tier) -> Self {
        tier.limits()
    }
}

/// What happens to in-flight fetches when a run is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CancelPolicy {
    /// Let in-flight fetches finish and record their real outcome.
    #[default]
    Drain,
    /// Abort in-flight fetches and mark them cancelled.
    Abandon,
}

impl std::fmt::Display for CancelPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Drain => write!(f, "drain"),
            Self::Abandon => write!(f, "abandon"),
        }
    }
}

impl std::str::FromStr for CancelPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "drain" => Ok(Self::Drain),
            "abandon" => Ok(Self::Abandon),
            other => Err(format!("unknown cancel policy '{}'", other)),
        }
    }
}

/// Run-wide prerender settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrerenderSettings {
    /// Tier the limits were derived from.
    pub tier: Tier,
    /// Effective limits after overrides.
    pub limits: TierLimits,
    /// Cancellation behavior.
    pub cancel_policy: CancelPolicy,
}

impl PrerenderSettings {
    /// Settings with the tier's built-in limits.
    pub fn for_tier(tier: Tier) -> Self {
        Self {
            tier,
            limits: tier.limits(),
            cancel_policy: CancelPolicy::default(),
        }
    }

    /// Lower the concurrency ceiling.
    pub fn with_concurrency(mut self, concurrency: Option<usize>) -> Self {
        self.limits = self.limits.with_concurrency_override(concurrency);
        self
    }

    /// Replace the limits outright.
    pub fn with_limits(mut self, limits: TierLimits) -> Self {
        self.limits = TierLimits::new(limits.concurrency, limits.total_request_cap);
        self
    }

    /// Set the cancel policy.
    pub fn with_cancel_policy(mut self, policy: CancelPolicy) -> Self {
        self.cancel_policy = policy;
        self
    }
}
