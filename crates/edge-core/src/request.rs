//! Prerender request definition.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::context::Headers;

/// Error returned when a prerender path is malformed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidPath {
    #[error("prerender path is empty")]
    Empty,

    #[error("prerender path '{0}' must begin with '/'")]
    NotAbsolute(String),

    #[error("prerender path '{0}' names a host; paths must stay on the origin")]
    SchemeRelative(String),
}

/// A single path to fetch through the application at deploy time.
///
/// Headers carry the cookie/header values needed to exercise a specific
/// cache-key variant (e.g. `cookie: language=de`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRequest")]
pub struct PrerenderRequest {
    path: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    headers: Headers,
}

#[derive(Deserialize)]
struct RawRequest {
    path: String,
    #[serde(default)]
    headers: BTreeMap<String, String>,
}

impl TryFrom<RawRequest> for PrerenderRequest {
    type Error = InvalidPath;

    fn try_from(raw: RawRequest) -> Result<Self, Self::Error> {
        let mut request = Self::new(raw.path)?;
        for (name, value) in raw.headers {
            request = request.with_header(name, value);
        }
        Ok(request)
    }
}

impl PrerenderRequest {
    /// Create a request for a path.
    pub fn new(path: impl Into<String>) -> Result<Self, InvalidPath> {
        let path = path.into();
        if path.is_empty() {
            return Err(InvalidPath::Empty);
        }
        if !path.starts_with('/') {
            return Err(InvalidPath::NotAbsolute(path));
        }
        if path.starts_with("//") {
            return Err(InvalidPath::SchemeRelative(path));
        }
        Ok(Self {
            path,
            headers: Headers::new(),
        })
    }

    /// Add a header. Names are stored lowercase.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    /// Add a cookie, appending to any existing `cookie` header.
    pub fn with_cookie(mut self, name: &str, value: &str) -> Self {
        let pair = format!("{}={}", name, value);
        self.headers
            .entry("cookie".to_string())
            .and_modify(|existing| {
                existing.push_str("; ");
                existing.push_str(&pair);
            })
            .or_insert(pair);
        self
    }

    /// The request path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// All headers, keyed by lowercase name.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Get a header value by name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|s| s.as_str())
    }

    /// Parse the `cookie` header into name/value pairs.
    ///
    /// A repeated name keeps its first value, as servers read it.
    pub fn cookies(&self) -> BTreeMap<String, String> {
        let mut cookies = BTreeMap::new();
        let Some(raw) = self.header("cookie") else {
            return cookies;
        };

        for pair in raw.split(';') {
            let Some((name, value)) = pair.split_once('=') else {
                continue;
            };
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            cookies
                .entry(name.to_string())
                .or_insert_with(|| value.trim().to_string());
        }
        cookies
    }

    /// Get a cookie value by name (case-sensitive).
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.cookies().remove(name)
    }
}

impl std::fmt::Display for PrerenderRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path)
    }
}
