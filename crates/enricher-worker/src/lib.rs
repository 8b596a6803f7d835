//! Enrichment worker for the tg-enricher service.
//!
//! This crate provides:
//! - The per-message processor (fetch, update, build the outbound event)
//! - A fixed-size worker pool draining the inbound queue
//! - The pipeline lifecycle coordinator
//! - Telemetry bootstrap and the health/metrics HTTP endpoint

pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod pipeline;
pub mod pool;
pub mod processor;
pub mod telemetry;

pub use config::{Environment, WorkerConfig};
pub use error::{WorkerError, WorkerResult};
pub use health::{health_router, HealthState};
pub use logging::MessageLogger;
pub use pipeline::{Pipeline, PipelineConfig, PipelineState};
pub use pool::WorkerPool;
pub use processor::{MessageProcessor, ProcessOutcome};
pub use telemetry::{init_metrics, init_telemetry, TelemetryConfig, TelemetryGuard};
