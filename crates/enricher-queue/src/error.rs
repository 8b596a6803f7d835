//! Queue error types.

use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Publish failed: {0}")]
    PublishFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueueError {
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed(msg.into())
    }

    pub fn publish_failed(msg: impl Into<String>) -> Self {
        Self::PublishFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// True for failures of the broker connection itself.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, QueueError::ConnectionFailed(_))
            || matches!(
                self,
                QueueError::Amqp(lapin::Error::InvalidConnectionState(_))
                    | QueueError::Amqp(lapin::Error::InvalidChannelState(_))
                    | QueueError::Amqp(lapin::Error::IOError(_))
            )
    }
}
