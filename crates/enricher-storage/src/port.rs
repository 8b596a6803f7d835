//! Storage port consumed by the pipeline.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use enricher_models::{StoredVideo, VideoUpdate};

use crate::error::StorageResult;

/// Upper bound for a health check.
pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(2);

/// Result of a storage health check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Up,
    Down { error: String },
}

impl HealthStatus {
    pub fn down(error: impl Into<String>) -> Self {
        Self::Down {
            error: error.into(),
        }
    }

    pub fn is_up(&self) -> bool {
        matches!(self, HealthStatus::Up)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Up => "UP",
            HealthStatus::Down { .. } => "DOWN",
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            HealthStatus::Up => None,
            HealthStatus::Down { error } => Some(error),
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Persisted video metadata, keyed by hash id.
///
/// Implementations must be safe for concurrent calls; workers share one
/// instance.
#[async_trait]
pub trait VideoStore: Send + Sync {
    /// Fetch the row for `hash_id`. Fails with `NotFound` when absent.
    async fn fetch_record_by_id(&self, hash_id: &str) -> StorageResult<StoredVideo>;

    /// Write downloaded metadata onto the row named by `update.hash_id`.
    async fn apply_update(&self, update: &VideoUpdate) -> StorageResult<()>;

    /// Check reachability within `HEALTH_CHECK_TIMEOUT`.
    async fn health_check(&self) -> HealthStatus;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_status_json() {
        let up = serde_json::to_value(HealthStatus::Up).unwrap();
        let down = serde_json::to_value(HealthStatus::down("refused")).unwrap();

        assert_eq!(up["status"], "UP");
        assert_eq!(down["status"], "DOWN");
        assert_eq!(down["error"], "refused");
    }

    #[test]
    fn test_health_status_accessors() {
        assert!(HealthStatus::Up.is_up());
        assert_eq!(HealthStatus::Up.error(), None);
        assert_eq!(HealthStatus::down("x").error(), Some("x"));
        assert_eq!(HealthStatus::down("x").to_string(), "DOWN");
    }
}
