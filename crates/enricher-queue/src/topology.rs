//! Broker connection and topology declaration.

use lapin::options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{Channel, Connection, ConnectionProperties, ExchangeKind};
use tracing::info;

use crate::config::AmqpConfig;
use crate::error::{QueueError, QueueResult};

/// Open a connection and one channel on it.
pub async fn open_channel(config: &AmqpConfig) -> QueueResult<(Connection, Channel)> {
    let connection = Connection::connect(&config.uri(), ConnectionProperties::default())
        .await
        .map_err(|e| {
            QueueError::connection_failed(format!(
                "Failed to connect to RabbitMQ at {}:{}: {e}",
                config.host, config.port
            ))
        })?;

    let channel = connection
        .create_channel()
        .await
        .map_err(|e| QueueError::connection_failed(format!("Failed to create channel: {e}")))?;

    Ok((connection, channel))
}

/// Declare a durable, non-auto-deleted direct exchange.
pub async fn declare_exchange(channel: &Channel, exchange: &str) -> QueueResult<()> {
    channel
        .exchange_declare(
            exchange,
            ExchangeKind::Direct,
            ExchangeDeclareOptions {
                durable: true,
                auto_delete: false,
                internal: false,
                nowait: false,
                passive: false,
            },
            FieldTable::default(),
        )
        .await?;

    info!("Declared exchange '{}'", exchange);
    Ok(())
}

/// Declare the inbound queue, binding it when an inbound exchange is set.
pub async fn declare_inbound_queue(channel: &Channel, config: &AmqpConfig) -> QueueResult<()> {
    channel
        .queue_declare(
            &config.queue,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;

    if let Some(exchange) = &config.inbound_exchange {
        declare_exchange(channel, exchange).await?;
        channel
            .queue_bind(
                &config.queue,
                exchange,
                &config.inbound_routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;
        info!(
            "Bound queue '{}' to exchange '{}' with key '{}'",
            config.queue, exchange, config.inbound_routing_key
        );
    }

    info!("Declared queue '{}'", config.queue);
    Ok(())
}
