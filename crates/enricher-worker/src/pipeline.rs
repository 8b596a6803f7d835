//! Pipeline lifecycle.
//!
//! Wires the inbound listener, the worker pool and the outbound adapter
//! together through two bounded queues and runs them until shutdown:
//!
//! ```text
//! listener -> [inbound queue] -> workers -> [outbound queue] -> publisher
//! ```
//!
//! Draining is ordered by queue ownership. The listener task owns the only
//! inbound sender, the workers own every outbound sender, so each queue
//! closes exactly when its producers have finished.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use enricher_models::PayloadFormat;
use enricher_queue::{
    bounded, InboundAdapter, InboundListener, MessagePublisher, OutboundAdapter, PipelineStats,
    StatsSnapshot, TraceContextCodec,
};
use enricher_storage::VideoStore;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::pool::WorkerPool;
use crate::processor::MessageProcessor;

/// Lifecycle state of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Starting,
    Running,
    Draining,
    Stopped,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Starting => "starting",
            PipelineState::Running => "running",
            PipelineState::Draining => "draining",
            PipelineState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sizing and routing for one pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub worker_count: usize,
    pub queue_capacity: usize,
    pub shutdown_timeout: Duration,
    pub payload_format: PayloadFormat,
    pub destination: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_count: 5,
            queue_capacity: 100,
            shutdown_timeout: Duration::from_secs(30),
            payload_format: PayloadFormat::Auto,
            destination: String::new(),
        }
    }
}

impl PipelineConfig {
    pub fn from_worker_config(config: &WorkerConfig, payload_format: PayloadFormat) -> Self {
        Self {
            worker_count: config.worker_count,
            queue_capacity: config.queue_capacity,
            shutdown_timeout: config.shutdown_timeout,
            payload_format,
            destination: config.destination.clone(),
        }
    }
}

/// The enrichment pipeline.
pub struct Pipeline {
    config: PipelineConfig,
    listener: Arc<dyn InboundListener>,
    publisher: Arc<dyn MessagePublisher>,
    store: Arc<dyn VideoStore>,
    codec: TraceContextCodec,
    stats: Arc<PipelineStats>,
    state: watch::Sender<PipelineState>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        listener: Arc<dyn InboundListener>,
        publisher: Arc<dyn MessagePublisher>,
        store: Arc<dyn VideoStore>,
    ) -> Self {
        let (state, _) = watch::channel(PipelineState::Starting);

        Self {
            config,
            listener,
            publisher,
            store,
            codec: TraceContextCodec::new(),
            stats: Arc::new(PipelineStats::new()),
            state,
        }
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    /// Follow state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    fn transition(&self, next: PipelineState) {
        info!("Pipeline {} -> {}", *self.state.borrow(), next);
        self.state.send_replace(next);
    }

    /// Run until `shutdown` fires or the listener exits, then drain.
    ///
    /// Returns the final counters. The pipeline is drained either way, but
    /// the run fails with the listener's error when it stopped on its own
    /// with a failure, or with `DrainTimeout` when the workers had to
    /// abandon queued messages.
    pub async fn run(&self, shutdown: CancellationToken) -> WorkerResult<StatsSnapshot> {
        self.transition(PipelineState::Starting);

        let (inbound_tx, inbound_rx) = bounded(self.config.queue_capacity);
        let (outbound_tx, outbound_rx) = bounded(self.config.queue_capacity);

        let outbound = OutboundAdapter::new(
            Arc::clone(&self.publisher),
            self.codec.clone(),
            self.config.payload_format,
            Arc::clone(&self.stats),
        );
        let outbound_task = tokio::spawn(async move { outbound.start_publishing(outbound_rx).await });

        let processor = Arc::new(MessageProcessor::new(
            Arc::clone(&self.store),
            self.config.destination.clone(),
            Arc::clone(&self.stats),
        ));
        // the pool takes the last outbound sender
        let pool = WorkerPool::start(self.config.worker_count, processor, inbound_rx, outbound_tx);

        let inbound = Arc::new(InboundAdapter::new(
            self.codec.clone(),
            self.config.payload_format,
            Arc::clone(&self.stats),
        ));
        let listener = Arc::clone(&self.listener);
        let listener_cancel = shutdown.child_token();
        let cancel = listener_cancel.clone();
        let mut listener_task =
            tokio::spawn(async move { listener.start_listening(inbound, inbound_tx, cancel).await });

        self.transition(PipelineState::Running);

        let finished = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Shutdown requested");
                None
            }
            result = &mut listener_task => Some(result),
        };

        self.transition(PipelineState::Draining);
        listener_cancel.cancel();

        let listener_result = match finished {
            Some(result) => result,
            None => listener_task.await,
        };
        let listener_error = match listener_result {
            Ok(Ok(())) => {
                info!("Inbound listener stopped");
                None
            }
            Ok(Err(e)) => {
                error!("Inbound listener failed: {}", e);
                Some(WorkerError::from(e))
            }
            Err(e) => {
                error!("Inbound listener task failed: {}", e);
                Some(WorkerError::adapter_failed(e.to_string()))
            }
        };

        let drain_error = match pool.stop_processing(self.config.shutdown_timeout).await {
            Ok(()) => None,
            Err(e) => {
                warn!("Worker pool did not drain cleanly: {}", e);
                Some(e)
            }
        };

        if let Err(e) = outbound_task.await {
            error!("Outbound adapter task failed: {}", e);
        }

        self.transition(PipelineState::Stopped);

        let snapshot = self.stats.snapshot();
        info!(stats = %snapshot.to_json(), "Pipeline stopped");

        match listener_error.or(drain_error) {
            Some(e) => Err(e),
            None => Ok(snapshot),
        }
    }
}
