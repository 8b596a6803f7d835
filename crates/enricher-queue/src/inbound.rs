//! Inbound adapter.
//!
//! Turns raw broker deliveries into `InboundEvent`s on the inbound queue.
//! The transport (`InboundListener`) owns the subscription and the ack; this
//! module owns decoding and the enqueue, so both stay testable without a
//! broker.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use opentelemetry::Context;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, field, info_span, warn, Instrument};
use tracing_opentelemetry::OpenTelemetrySpanExt;

use enricher_models::{
    parse_message, CorrelationId, DecodeError, DecodeResult, InboundEvent, PayloadFormat,
    VideoDownloadedMessage,
};

use crate::codec::TraceContextCodec;
use crate::error::QueueResult;
use crate::headers::CORRELATION_ID_HEADER;
use crate::stats::PipelineStats;

/// A delivery stripped of transport details.
#[derive(Debug, Clone, Default)]
pub struct RawDelivery {
    /// Lowercased header keys
    pub headers: HashMap<String, String>,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl RawDelivery {
    pub fn new(headers: HashMap<String, String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            headers,
            content_type: None,
            body: body.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// What happened to one delivery. The transport acks on `Enqueued` and
/// `Rejected`, and hands the delivery back to the broker on `Closed`.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// Decoded and placed on the inbound queue
    Enqueued(CorrelationId),
    /// Undecodable; dropped
    Rejected(DecodeError),
    /// The inbound queue no longer accepts items
    Closed,
}

impl DispatchOutcome {
    /// True when the broker delivery should be acknowledged.
    pub fn should_ack(&self) -> bool {
        !matches!(self, DispatchOutcome::Closed)
    }
}

/// Decodes deliveries and feeds the inbound queue.
pub struct InboundAdapter {
    codec: TraceContextCodec,
    format: PayloadFormat,
    stats: Arc<PipelineStats>,
}

impl InboundAdapter {
    pub fn new(codec: TraceContextCodec, format: PayloadFormat, stats: Arc<PipelineStats>) -> Self {
        Self {
            codec,
            format,
            stats,
        }
    }

    /// Remote parent carried in the delivery headers.
    pub fn trace_context(&self, delivery: &RawDelivery) -> Context {
        self.codec.decode(&delivery.headers)
    }

    /// Decode one delivery into an event parented on `trace_context`.
    pub fn decode(
        &self,
        delivery: &RawDelivery,
        trace_context: Context,
    ) -> DecodeResult<InboundEvent> {
        let correlation_id = delivery
            .headers
            .get(CORRELATION_ID_HEADER)
            .filter(|id| !id.is_empty())
            .cloned()
            .ok_or_else(|| DecodeError::MissingHeader(CORRELATION_ID_HEADER.to_string()))?;

        let format = self
            .format
            .resolve(delivery.content_type.as_deref(), &delivery.body);
        let message: VideoDownloadedMessage = parse_message(&delivery.body, format)?;

        Ok(InboundEvent::new(message, correlation_id, trace_context))
    }

    /// Decode `delivery` and enqueue it, waiting while the queue is full.
    pub async fn dispatch(
        &self,
        delivery: RawDelivery,
        inbound: &mpsc::Sender<InboundEvent>,
    ) -> DispatchOutcome {
        let span = info_span!(
            "consume_message",
            correlation_id = field::Empty,
            otel.status_code = field::Empty
        );
        let trace_context = self.trace_context(&delivery);
        span.set_parent(trace_context.clone());

        async {
            let event = match self.decode(&delivery, trace_context) {
                Ok(event) => event,
                Err(e) => {
                    tracing::Span::current().record("otel.status_code", "ERROR");
                    warn!(error = %e, bytes = delivery.body.len(), "Dropping undecodable message");
                    self.stats.record_decode_failed();
                    return DispatchOutcome::Rejected(e);
                }
            };

            let correlation_id = event.correlation_id.clone();
            tracing::Span::current().record("correlation_id", field::display(&correlation_id));

            if inbound.send(event).await.is_err() {
                warn!(correlation_id = %correlation_id, "Inbound queue closed, returning message to broker");
                return DispatchOutcome::Closed;
            }

            self.stats.record_consumed();
            debug!(correlation_id = %correlation_id, "Message enqueued");
            DispatchOutcome::Enqueued(correlation_id)
        }
        .instrument(span)
        .await
    }
}

/// Source of inbound deliveries.
///
/// Implementations run until `cancel` fires or the subscription fails. They
/// own the only sender of the inbound queue, so returning closes the queue.
#[async_trait]
pub trait InboundListener: Send + Sync {
    async fn start_listening(
        &self,
        adapter: Arc<InboundAdapter>,
        inbound: mpsc::Sender<InboundEvent>,
        cancel: CancellationToken,
    ) -> QueueResult<()>;

    /// Whether the underlying subscription is alive.
    fn is_connected(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enricher_models::encode_message;
    use opentelemetry::trace::TraceContextExt;

    use crate::channel::bounded;

    fn adapter() -> (InboundAdapter, Arc<PipelineStats>) {
        let stats = Arc::new(PipelineStats::new());
        let adapter = InboundAdapter::new(
            TraceContextCodec::new(),
            PayloadFormat::Auto,
            Arc::clone(&stats),
        );
        (adapter, stats)
    }

    fn headers(correlation_id: &str) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert(CORRELATION_ID_HEADER.to_string(), correlation_id.to_string());
        headers.insert(
            "traceparent".to_string(),
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01".to_string(),
        );
        headers
    }

    fn message() -> VideoDownloadedMessage {
        VideoDownloadedMessage {
            path: "/v/1.mp4".to_string(),
            title: "T".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_decode_json_delivery() {
        let (adapter, _) = adapter();
        let body = encode_message(&message(), PayloadFormat::Json).unwrap();

        let delivery =
            RawDelivery::new(headers("abc-1"), body).with_content_type("application/json");
        let event = adapter
            .decode(&delivery, adapter.trace_context(&delivery))
            .unwrap();

        assert_eq!(event.correlation_id.as_str(), "abc-1");
        assert_eq!(event.message, message());
        assert_eq!(
            event.trace_context.span().span_context().trace_id().to_string(),
            "4bf92f3577b34da6a3ce929d0e0e4736"
        );
    }

    #[test]
    fn test_decode_protobuf_delivery() {
        let (adapter, _) = adapter();
        let body = encode_message(&message(), PayloadFormat::Protobuf).unwrap();

        let event = adapter
            .decode(&RawDelivery::new(headers("abc-1"), body), Context::new())
            .unwrap();
        assert_eq!(event.message, message());
    }

    #[test]
    fn test_decode_requires_correlation_id() {
        let (adapter, _) = adapter();
        let body = encode_message(&message(), PayloadFormat::Json).unwrap();

        let err = adapter
            .decode(&RawDelivery::new(HashMap::new(), body), Context::new())
            .unwrap_err();
        assert!(matches!(err, DecodeError::MissingHeader(_)));
    }

    #[tokio::test]
    async fn test_malformed_payload_is_rejected_without_enqueue() {
        let (adapter, stats) = adapter();
        let (tx, rx) = bounded::<InboundEvent>(4);

        let outcome = adapter
            .dispatch(RawDelivery::new(headers("bad"), b"{not json".to_vec()), &tx)
            .await;
        assert!(matches!(outcome, DispatchOutcome::Rejected(DecodeError::Json(_))));
        assert!(outcome.should_ack());

        let body = encode_message(&message(), PayloadFormat::Json).unwrap();
        let outcome = adapter.dispatch(RawDelivery::new(headers("good"), body), &tx).await;
        assert!(matches!(outcome, DispatchOutcome::Enqueued(_)));

        drop(tx);
        let first = rx.recv().await.unwrap();
        assert_eq!(first.correlation_id.as_str(), "good");
        assert!(rx.recv().await.is_none());

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.decode_failed, 1);
        assert_eq!(snapshot.consumed, 1);
    }

    #[tokio::test]
    async fn test_dispatched_event_keeps_remote_parent() {
        let (adapter, _) = adapter();
        let (tx, rx) = bounded::<InboundEvent>(1);
        let body = encode_message(&message(), PayloadFormat::Json).unwrap();

        let outcome = adapter.dispatch(RawDelivery::new(headers("abc-1"), body), &tx).await;
        assert!(matches!(outcome, DispatchOutcome::Enqueued(_)));

        let event = rx.recv().await.unwrap();
        let span = event.trace_context.span();
        assert_eq!(
            span.span_context().trace_id().to_string(),
            "4bf92f3577b34da6a3ce929d0e0e4736"
        );
        assert_eq!(span.span_context().span_id().to_string(), "00f067aa0ba902b7");
    }

    #[tokio::test]
    async fn test_closed_queue_is_reported() {
        let (adapter, stats) = adapter();
        let (tx, rx) = bounded::<InboundEvent>(1);
        drop(rx);

        let body = encode_message(&message(), PayloadFormat::Json).unwrap();
        let outcome = adapter.dispatch(RawDelivery::new(headers("abc-1"), body), &tx).await;

        assert!(matches!(outcome, DispatchOutcome::Closed));
        assert!(!outcome.should_ack());
        assert_eq!(stats.snapshot().consumed, 0);
    }
}
