//! Structured per-message logging.
//!
//! A `MessageLogger` owns the `process_message` span of one message. The span
//! is parented on the remote trace context the message arrived with, and
//! every lifecycle line is emitted inside it carrying the correlation id and
//! the worker that handled it.

use opentelemetry::Context;
use tracing::{error, field, info, info_span, warn, Span};
use tracing_opentelemetry::OpenTelemetrySpanExt;

use enricher_models::CorrelationId;

/// Logger and span bound to one message on one worker.
#[derive(Debug, Clone)]
pub struct MessageLogger {
    correlation_id: String,
    worker: usize,
    span: Span,
}

impl MessageLogger {
    pub fn new(correlation_id: &CorrelationId, worker: usize, parent: &Context) -> Self {
        let span = info_span!(
            "process_message",
            correlation_id = %correlation_id,
            worker = worker,
            otel.status_code = field::Empty
        );
        span.set_parent(parent.clone());

        Self {
            correlation_id: correlation_id.to_string(),
            worker,
            span,
        }
    }

    /// Span to run the message's work in.
    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn log_start(&self, message: &str) {
        self.span.in_scope(|| {
            info!(
                correlation_id = %self.correlation_id,
                worker = self.worker,
                "Message started: {}", message
            )
        });
    }

    pub fn log_progress(&self, message: &str) {
        self.span.in_scope(|| {
            info!(
                correlation_id = %self.correlation_id,
                worker = self.worker,
                "Message progress: {}", message
            )
        });
    }

    /// Log a non-fatal problem and mark the span as errored.
    pub fn log_warning(&self, message: &str) {
        self.span.record("otel.status_code", "ERROR");
        self.span.in_scope(|| {
            warn!(
                correlation_id = %self.correlation_id,
                worker = self.worker,
                "Message warning: {}", message
            )
        });
    }

    /// Log a terminal failure and mark the span as errored.
    pub fn log_error(&self, message: &str) {
        self.span.record("otel.status_code", "ERROR");
        self.span.in_scope(|| {
            error!(
                correlation_id = %self.correlation_id,
                worker = self.worker,
                "Message error: {}", message
            )
        });
    }

    pub fn log_completion(&self, message: &str) {
        self.span.in_scope(|| {
            info!(
                correlation_id = %self.correlation_id,
                worker = self.worker,
                "Message completed: {}", message
            )
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logger_opens_process_message_span() {
        let subscriber = tracing_subscriber::registry();

        tracing::subscriber::with_default(subscriber, || {
            let logger = MessageLogger::new(&CorrelationId::from("abc-1"), 3, &Context::new());

            let metadata = logger.span().metadata().expect("span is enabled");
            assert_eq!(metadata.name(), "process_message");
            assert!(metadata.fields().field("correlation_id").is_some());
            assert!(metadata.fields().field("otel.status_code").is_some());

            logger.log_error("write failed");
        });
    }
}
