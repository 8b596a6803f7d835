//! Health and metrics HTTP endpoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use enricher_queue::InboundListener;
use enricher_storage::{HealthStatus, VideoStore, HEALTH_CHECK_TIMEOUT};

use crate::error::WorkerResult;
use crate::pipeline::PipelineState;

/// Shared state of the health handlers.
#[derive(Clone)]
pub struct HealthState {
    store: Arc<dyn VideoStore>,
    listener: Arc<dyn InboundListener>,
    pipeline: watch::Receiver<PipelineState>,
}

impl HealthState {
    pub fn new(
        store: Arc<dyn VideoStore>,
        listener: Arc<dyn InboundListener>,
        pipeline: watch::Receiver<PipelineState>,
    ) -> Self {
        Self {
            store,
            listener,
            pipeline,
        }
    }
}

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

/// Readiness check response.
#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub pipeline: String,
    pub checks: ReadinessChecks,
}

#[derive(Serialize)]
pub struct ReadinessChecks {
    pub storage: CheckStatus,
    pub broker: CheckStatus,
}

#[derive(Serialize)]
pub struct CheckStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl CheckStatus {
    fn ok(latency_ms: Option<u64>) -> Self {
        Self {
            status: "ok".to_string(),
            error: None,
            latency_ms,
        }
    }

    fn error(msg: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            error: Some(msg.into()),
            latency_ms: None,
        }
    }

    fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Liveness check.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Readiness check: storage reachable, broker subscription alive, pipeline
/// running.
pub async fn ready(
    State(state): State<HealthState>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    let storage_check = {
        let start = Instant::now();
        match tokio::time::timeout(HEALTH_CHECK_TIMEOUT, state.store.health_check()).await {
            Ok(HealthStatus::Up) => CheckStatus::ok(Some(start.elapsed().as_millis() as u64)),
            Ok(HealthStatus::Down { error }) => CheckStatus::error(error),
            Err(_) => CheckStatus::error(format!(
                "no answer within {}s",
                HEALTH_CHECK_TIMEOUT.as_secs()
            )),
        }
    };

    let broker_check = if state.listener.is_connected() {
        CheckStatus::ok(None)
    } else {
        CheckStatus::error("consumer connection lost")
    };

    let pipeline = *state.pipeline.borrow();
    let all_ok = storage_check.is_ok() && broker_check.is_ok() && pipeline == PipelineState::Running;

    let response = ReadinessResponse {
        status: if all_ok { "ready" } else { "degraded" }.to_string(),
        pipeline: pipeline.to_string(),
        checks: ReadinessChecks {
            storage: storage_check,
            broker: broker_check,
        },
    };

    if all_ok {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}

/// Build the router. `/metrics` is only mounted with a recorder handle.
pub fn health_router(state: HealthState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/ready", get(ready))
        .with_state(state)
        .merge(metrics_routes)
        .layer(TraceLayer::new_for_http())
}

/// Bind the health server's listening socket.
pub async fn bind(addr: SocketAddr) -> WorkerResult<TcpListener> {
    let listener = TcpListener::bind(addr).await?;
    info!("Health server listening on {}", listener.local_addr()?);
    Ok(listener)
}

/// Serve `router` on a bound `listener` until `shutdown` fires.
pub async fn serve(listener: TcpListener, router: Router, shutdown: CancellationToken) -> WorkerResult<()> {
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("Health server stopped");
    Ok(())
}
