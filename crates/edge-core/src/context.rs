//! Run identity and shared header types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Unique identifier for a deployment's prerender run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    /// Generate a new run ID.
    pub fn generate() -> Self {
        Self(format!("run_{}", uuid::Uuid::new_v4().simple()))
    }

    /// Create from an existing ID string.
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// HTTP headers keyed by lowercase name.
///
/// Ordered so that anything derived from headers (cache keys, logs) is
/// deterministic.
pub type Headers = BTreeMap<String, String>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_id_generate_format() {
        let id = RunId::generate();
        assert!(id.as_str().starts_with("run_"));
        assert_eq!(id.as_str().len(), 4 + 32);
    }

    #[test]
    fn test_run_id_generate_uniqueness() {
        assert_ne!(RunId::generate(), RunId::generate());
    }

    #[test]
    fn test_run_id_serialization() {
        let id = RunId::from_string("run_abc");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, r#""run_abc""#);
    }
}
