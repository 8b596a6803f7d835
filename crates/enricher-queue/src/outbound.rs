//! Outbound adapter.
//!
//! Drains the outbound queue and hands each event to a `MessagePublisher`.
//! Failed publications are logged and dropped; there is no retry here.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, field, info, info_span, Instrument};
use tracing_opentelemetry::OpenTelemetrySpanExt;

use enricher_models::{encode_message, OutboundEvent, PayloadFormat};

use crate::channel::SharedReceiver;
use crate::codec::TraceContextCodec;
use crate::error::QueueResult;
use crate::headers::CORRELATION_ID_HEADER;
use crate::stats::PipelineStats;

/// A fully encoded message ready for the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// Empty means the publisher's default route
    pub routing_key: String,
    pub content_type: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

/// Broker publication.
///
/// Implementations must tolerate being called from one task at a time; the
/// outbound adapter never publishes concurrently.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    async fn publish(&self, message: OutgoingMessage) -> QueueResult<()>;
}

/// Encodes outbound events and publishes them.
pub struct OutboundAdapter {
    publisher: Arc<dyn MessagePublisher>,
    codec: TraceContextCodec,
    format: PayloadFormat,
    stats: Arc<PipelineStats>,
}

impl OutboundAdapter {
    pub fn new(
        publisher: Arc<dyn MessagePublisher>,
        codec: TraceContextCodec,
        format: PayloadFormat,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            publisher,
            codec,
            format,
            stats,
        }
    }

    /// Encode body and headers for `event`.
    pub fn encode(&self, event: &OutboundEvent) -> QueueResult<OutgoingMessage> {
        let body = encode_message(&event.message, self.format)?;

        let mut headers = self.codec.encode(&event.trace_context);
        headers.insert(
            CORRELATION_ID_HEADER.to_string(),
            event.correlation_id.as_str().to_string(),
        );

        Ok(OutgoingMessage {
            routing_key: event.destination.clone(),
            content_type: self.format.content_type().to_string(),
            headers,
            body,
        })
    }

    /// Publish until the outbound queue is closed and empty.
    pub async fn start_publishing(&self, outbound: SharedReceiver<OutboundEvent>) {
        info!("Outbound adapter started");

        while let Some(event) = outbound.recv().await {
            self.publish_event(event).await;
        }

        info!("Outbound queue closed, outbound adapter stopped");
    }

    /// Publish one event. Failures are logged and the event is dropped.
    pub async fn publish_event(&self, event: OutboundEvent) {
        let span = info_span!(
            "publish_message",
            correlation_id = %event.correlation_id,
            routing_key = %event.destination,
            otel.status_code = field::Empty
        );
        span.set_parent(event.trace_context.clone());

        async {
            let result = match self.encode(&event) {
                Ok(message) => self.publisher.publish(message).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => {
                    self.stats.record_published();
                    debug!(correlation_id = %event.correlation_id, "Message published");
                }
                Err(e) => {
                    tracing::Span::current().record("otel.status_code", "ERROR");
                    error!(
                        correlation_id = %event.correlation_id,
                        error = %e,
                        "Publish failed, dropping message"
                    );
                    self.stats.record_publish_failed();
                }
            }
        }
        .instrument(span)
        .await
    }
}
