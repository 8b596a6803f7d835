//! tg-enricher binary.

use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use enricher_queue::{AmqpConfig, AmqpConsumer, AmqpProducer};
use enricher_storage::{PgVideoStore, PostgresConfig};
use enricher_worker::{
    health, health_router, init_metrics, init_telemetry, HealthState, Pipeline, PipelineConfig,
    TelemetryConfig, WorkerConfig,
};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS connections)
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("Failed to install rustls crypto provider");
        std::process::exit(1);
    }

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = WorkerConfig::from_env();

    let telemetry = match init_telemetry(&config, &TelemetryConfig::from_env()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize telemetry: {e}");
            std::process::exit(1);
        }
    };

    info!("Starting tg-enricher");
    info!("Worker config: {:?}", config);

    let result = run(config).await;

    telemetry.shutdown().await;

    if let Err(e) = result {
        error!("tg-enricher stopped with error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(config: WorkerConfig) -> anyhow::Result<()> {
    let amqp = AmqpConfig::from_env().context("invalid AMQP configuration")?;
    let postgres = PostgresConfig::from_env().context("invalid PostgreSQL configuration")?;

    let store = Arc::new(
        PgVideoStore::connect(&postgres)
            .await
            .context("failed to connect to PostgreSQL")?,
    );
    let consumer = Arc::new(
        AmqpConsumer::connect(&amqp)
            .await
            .context("failed to connect inbound AMQP consumer")?,
    );
    let producer = Arc::new(
        AmqpProducer::connect(&amqp)
            .await
            .context("failed to connect outbound AMQP producer")?,
    );

    let metrics_handle = if config.metrics_enabled {
        info!("Prometheus metrics enabled at /metrics");
        Some(init_metrics()?)
    } else {
        None
    };

    let health_listener = health::bind(config.health_addr())
        .await
        .context("failed to bind health server")?;

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));

    let pipeline = Pipeline::new(
        PipelineConfig::from_worker_config(&config, amqp.payload_format),
        consumer.clone(),
        producer.clone(),
        store.clone(),
    );

    let health_state = HealthState::new(store.clone(), consumer.clone(), pipeline.subscribe_state());
    let health_task = tokio::spawn(health::serve(
        health_listener,
        health_router(health_state, metrics_handle),
        shutdown.clone(),
    ));

    let result = pipeline.run(shutdown.clone()).await;

    // Stop the health server too when the pipeline ended on its own.
    shutdown.cancel();
    match health_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Health server error: {}", e),
        Err(e) => warn!("Health server task failed: {}", e),
    }

    consumer.close().await;
    producer.close().await;
    store.close().await;

    let stats = result?;
    info!(
        consumed = stats.consumed,
        published = stats.published,
        failed = stats.failed(),
        "tg-enricher shutdown complete"
    );
    Ok(())
}

/// Cancel `shutdown` on Ctrl-C or SIGTERM.
async fn wait_for_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received shutdown signal");
    shutdown.cancel();
}
