//! Broker side of the enrichment pipeline.
//!
//! This crate provides:
//! - W3C trace context propagation through message headers
//! - The inbound adapter (decode, enqueue, ack) and its AMQP consumer
//! - The outbound adapter (encode, publish) and its AMQP producer
//! - Bounded multi-consumer queues between pipeline stages
//! - Pipeline counters exported as metrics

pub mod channel;
pub mod codec;
pub mod config;
pub mod consumer;
pub mod error;
pub mod headers;
pub mod inbound;
pub mod outbound;
pub mod producer;
pub mod stats;
pub mod topology;

pub use channel::{bounded, SharedReceiver};
pub use codec::TraceContextCodec;
pub use config::AmqpConfig;
pub use consumer::AmqpConsumer;
pub use error::{QueueError, QueueResult};
pub use headers::CORRELATION_ID_HEADER;
pub use inbound::{DispatchOutcome, InboundAdapter, InboundListener, RawDelivery};
pub use outbound::{MessagePublisher, OutboundAdapter, OutgoingMessage};
pub use producer::AmqpProducer;
pub use stats::{PipelineStats, StatsSnapshot};
