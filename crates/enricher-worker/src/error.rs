//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Invalid stored record: {0}")]
    InvalidRecord(String),

    #[error("Adapter failed: {0}")]
    AdapterFailed(String),

    #[error("Telemetry error: {0}")]
    Telemetry(String),

    #[error("Workers did not drain within {0} seconds")]
    DrainTimeout(u64),

    #[error("Storage error: {0}")]
    Storage(#[from] enricher_storage::StorageError),

    #[error("Queue error: {0}")]
    Queue(#[from] enricher_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn invalid_record(msg: impl Into<String>) -> Self {
        Self::InvalidRecord(msg.into())
    }

    pub fn adapter_failed(msg: impl Into<String>) -> Self {
        Self::AdapterFailed(msg.into())
    }

    pub fn telemetry(msg: impl Into<String>) -> Self {
        Self::Telemetry(msg.into())
    }

    /// True when the stored record for the item does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, WorkerError::Storage(e) if e.is_not_found())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enricher_storage::StorageError;

    #[test]
    fn test_not_found_classification() {
        assert!(WorkerError::from(StorageError::not_found("abc-1")).is_not_found());
        assert!(!WorkerError::from(StorageError::unavailable("down")).is_not_found());
        assert!(!WorkerError::invalid_record("negative user id").is_not_found());
    }
}
