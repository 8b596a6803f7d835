//! Pipeline envelopes.
//!
//! An envelope pairs a decoded broker message with the correlation id and the
//! remote trace context it arrived with. Both are carried unchanged from the
//! inbound delivery to the outbound publication.

use std::fmt;

use opentelemetry::Context;
use serde::{Deserialize, Serialize};

use crate::messages::{TgSendMessage, VideoDownloadedMessage};

/// Identifies one inbound event through its whole trip.
///
/// Also the key of the persisted video row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for CorrelationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CorrelationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A decoded "video downloaded" delivery waiting for enrichment.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub message: VideoDownloadedMessage,
    pub correlation_id: CorrelationId,
    /// Remote parent extracted from the delivery headers
    pub trace_context: Context,
}

impl InboundEvent {
    pub fn new(
        message: VideoDownloadedMessage,
        correlation_id: impl Into<CorrelationId>,
        trace_context: Context,
    ) -> Self {
        Self {
            message,
            correlation_id: correlation_id.into(),
            trace_context,
        }
    }
}

/// An enriched "send to user" notification waiting for publication.
#[derive(Debug, Clone)]
pub struct OutboundEvent {
    pub message: TgSendMessage,
    pub correlation_id: CorrelationId,
    /// Routing key; empty means the publisher's default route
    pub destination: String,
    pub trace_context: Context,
}

impl OutboundEvent {
    pub fn new(
        message: TgSendMessage,
        correlation_id: CorrelationId,
        destination: impl Into<String>,
        trace_context: Context,
    ) -> Self {
        Self {
            message,
            correlation_id,
            destination: destination.into(),
            trace_context,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correlation_id_conversions() {
        let id = CorrelationId::from("abc-1");
        assert_eq!(id.as_str(), "abc-1");
        assert_eq!(id.to_string(), "abc-1");
        assert_eq!(CorrelationId::from("abc-1".to_string()), id);
        assert!(CorrelationId::default().is_empty());
    }

    #[test]
    fn test_correlation_id_is_transparent_in_json() {
        let json = serde_json::to_string(&CorrelationId::from("abc-1")).unwrap();
        assert_eq!(json, "\"abc-1\"");
    }
}
