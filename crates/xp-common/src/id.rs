//! Experiment and document identity types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Experiment ID, stable for the experiment's whole life.
///
/// Format: `exp-<YYYYMMDDHHMMSS>-<8 hex>`
/// Example: `exp-20260115143022-3fa85f64`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExperimentId(pub String);

impl ExperimentId {
    /// Generate a new, globally unique experiment ID.
    pub fn new() -> Self {
        let now = chrono::Utc::now();
        let random: String = uuid::Uuid::new_v4()
            .simple()
            .to_string()
            .chars()
            .take(8)
            .collect();
        ExperimentId(format!("exp-{}-{}", now.format("%Y%m%d%H%M%S"), random))
    }

    /// Parse an existing experiment ID string.
    pub fn parse(s: &str) -> Option<Self> {
        if s.starts_with("exp-") && s.len() > 4 {
            Some(ExperimentId(s.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ExperimentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExperimentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identifier of one extraction attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub String);

impl DocumentId {
    /// Generate a fresh document ID.
    pub fn new() -> Self {
        DocumentId(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        DocumentId(s.to_string())
    }
}
