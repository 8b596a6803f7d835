//! Logging, tracing and metrics bootstrap.
//!
//! Installs the `tracing` subscriber (JSON or ANSI text), an optional
//! OpenTelemetry layer exporting spans over OTLP, and the Prometheus
//! recorder behind `/metrics`.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{runtime, trace as sdktrace, Resource};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};

/// Span export settings.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// OTLP collector endpoint; `None` disables export
    pub otlp_endpoint: Option<String>,
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: None,
            service_name: "tg-enricher".to_string(),
        }
    }
}

impl TelemetryConfig {
    pub fn from_env() -> Self {
        Self {
            otlp_endpoint: std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            service_name: std::env::var("OTEL_SERVICE_NAME")
                .unwrap_or_else(|_| "tg-enricher".to_string()),
        }
    }
}

/// Keeps span export alive. Call `shutdown` before exit to flush.
pub struct TelemetryGuard {
    provider: Option<sdktrace::TracerProvider>,
}

impl TelemetryGuard {
    /// Flush pending spans and stop the exporter.
    pub async fn shutdown(self) {
        if self.provider.is_none() {
            return;
        }
        // the batch processor blocks while flushing
        if let Err(e) = tokio::task::spawn_blocking(opentelemetry::global::shutdown_tracer_provider).await {
            warn!("Tracer provider shutdown task failed: {}", e);
        }
    }
}

/// Filter from `RUST_LOG`, falling back to the environment's level.
fn env_filter(config: &WorkerConfig) -> WorkerResult<EnvFilter> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.environment.default_log_level()));

    ["lapin=warn", "sqlx=warn", "h2=warn", "tower=warn", "hyper=warn"]
        .into_iter()
        .try_fold(filter, |filter, directive| {
            directive
                .parse()
                .map(|d| filter.add_directive(d))
                .map_err(|e| WorkerError::telemetry(format!("bad log directive {directive}: {e}")))
        })
}

fn tracer_provider(telemetry: &TelemetryConfig) -> WorkerResult<Option<sdktrace::TracerProvider>> {
    let Some(endpoint) = telemetry.otlp_endpoint.as_deref() else {
        return Ok(None);
    };

    let provider = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint),
        )
        .with_trace_config(sdktrace::Config::default().with_resource(Resource::new(vec![
            KeyValue::new("service.name", telemetry.service_name.clone()),
        ])))
        .install_batch(runtime::Tokio)
        .map_err(|e| WorkerError::telemetry(format!("OTLP exporter: {e}")))?;

    opentelemetry::global::set_tracer_provider(provider.clone());
    Ok(Some(provider))
}

/// Install the global subscriber. Call once, inside the Tokio runtime.
pub fn init_telemetry(config: &WorkerConfig, telemetry: &TelemetryConfig) -> WorkerResult<TelemetryGuard> {
    let provider = tracer_provider(telemetry)?;
    let tracer = provider
        .as_ref()
        .map(|p| p.tracer(telemetry.service_name.clone()));
    let filter = env_filter(config)?;

    if config.use_json_logs() {
        tracing_subscriber::registry()
            .with(tracer.map(|t| tracing_opentelemetry::layer().with_tracer(t)))
            .with(fmt::layer().json())
            .with(filter)
            .try_init()
            .map_err(|e| WorkerError::telemetry(e.to_string()))?;
    } else {
        tracing_subscriber::registry()
            .with(tracer.map(|t| tracing_opentelemetry::layer().with_tracer(t)))
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(filter)
            .try_init()
            .map_err(|e| WorkerError::telemetry(e.to_string()))?;
    }

    info!(
        environment = %config.environment,
        otlp = provider.is_some(),
        "Telemetry initialized"
    );

    Ok(TelemetryGuard { provider })
}

/// Install the Prometheus recorder.
pub fn init_metrics() -> WorkerResult<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| WorkerError::telemetry(format!("Prometheus recorder: {e}")))
}
