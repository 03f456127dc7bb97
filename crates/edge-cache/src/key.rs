//! Cache key composition.

use serde::{Deserialize, Serialize};

use edge_core::PrerenderRequest;

/// A cache key uniquely identifying a cached response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    /// The computed key string.
    key: String,
    /// Components that make up the key (for debugging).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    components: Vec<String>,
}

impl CacheKey {
    /// Create a cache key from a string.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            components: Vec::new(),
        }
    }

    /// Get the key string.
    pub fn as_str(&self) -> &str {
        &self.key
    }

    /// Get the key components (for debugging).
    pub fn components(&self) -> &[String] {
        &self.components
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key)
    }
}

/// Request attribute participating in a cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "name", rename_all = "lowercase")]
pub enum KeyComponent {
    /// Specific header (matched case-insensitively).
    Header(String),
    /// Specific cookie (matched case-sensitively).
    Cookie(String),
}

impl std::fmt::Display for KeyComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Header(name) => write!(f, "header:{}", name),
            Self::Cookie(name) => write!(f, "cookie:{}", name),
        }
    }
}

/// Ordered set of header and cookie names that extend a route's cache key.
///
/// The path is always part of the key. Declared attributes are appended in
/// declaration order; declaring the same attribute twice has no effect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "KeySpecConfig", into = "KeySpecConfig")]
pub struct CacheKeySpec {
    components: Vec<KeyComponent>,
}

/// Config-file shape: `key = { headers = [..], cookies = [..] }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct KeySpecConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    headers: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    cookies: Vec<String>,
}

impl From<KeySpecConfig> for CacheKeySpec {
    fn from(config: KeySpecConfig) -> Self {
        let spec = config
            .headers
            .into_iter()
            .fold(Self::new(), |spec, h| spec.header(h));
        config
            .cookies
            .into_iter()
            .fold(spec, |spec, c| spec.cookie(c))
    }
}

impl From<CacheKeySpec> for KeySpecConfig {
    fn from(spec: CacheKeySpec) -> Self {
        let mut config = Self::default();
        for component in spec.components {
            match component {
                KeyComponent::Header(h) => config.headers.push(h),
                KeyComponent::Cookie(c) => config.cookies.push(c),
            }
        }
        config
    }
}

impl CacheKeySpec {
    /// Create a spec keyed on the path alone.
    pub fn new() -> Self {
        Self::default()
    }

    /// Include a header value.
    pub fn header(self, name: impl Into<String>) -> Self {
        self.push(KeyComponent::Header(name.into().to_ascii_lowercase()))
    }

    /// Include a cookie value.
    pub fn cookie(self, name: impl Into<String>) -> Self {
        self.push(KeyComponent::Cookie(name.into()))
    }

    fn push(mut self, component: KeyComponent) -> Self {
        if !self.components.contains(&component) {
            self.components.push(component);
        }
        self
    }

    /// Declared components in order.
    pub fn components(&self) -> &[KeyComponent] {
        &self.components
    }

    /// Check if only the path participates in the key.
    pub fn is_path_only(&self) -> bool {
        self.components.is_empty()
    }

    /// Build the cache key for a request.
    ///
    /// Attributes the request does not carry are left out of the key.
    pub fn build(&self, request: &PrerenderRequest) -> CacheKey {
        let mut parts = vec![escape(request.path())];
        let mut component_descs = vec![format!("route:{}", request.path())];

        let cookies = request.cookies();

        for component in &self.components {
            match component {
                KeyComponent::Header(name) => {
                    if let Some(value) = request.header(name) {
                        parts.push(format!("h:{}={}", name, escape(value)));
                        component_descs.push(component.to_string());
                    }
                }
                KeyComponent::Cookie(name) => {
                    if let Some(value) = cookies.get(name) {
                        parts.push(format!("c:{}={}", name, escape(value)));
                        component_descs.push(component.to_string());
                    }
                }
            }
        }

        CacheKey {
            key: parts.join("|"),
            components: component_descs,
        }
    }
}

// Keep the separator unambiguous inside values
fn escape(s: &str) -> String {
    s.replace('%', "%25").replace('|', "%7C")
}
