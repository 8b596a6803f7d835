//! AMQP producer behind the outbound adapter.

use async_trait::async_trait;
use lapin::options::{BasicPublishOptions, ConfirmSelectOptions};
use lapin::publisher_confirm::Confirmation;
use lapin::types::ShortString;
use lapin::{BasicProperties, Channel, Connection};
use tracing::{debug, info};

use crate::config::AmqpConfig;
use crate::error::{QueueError, QueueResult};
use crate::headers::map_to_field_table;
use crate::outbound::{MessagePublisher, OutgoingMessage};
use crate::topology;

/// Persistent delivery mode.
const DELIVERY_MODE_PERSISTENT: u8 = 2;

/// Publisher to the "send to user" exchange.
pub struct AmqpProducer {
    connection: Connection,
    channel: Channel,
    exchange: String,
    routing_key: String,
}

impl AmqpProducer {
    /// Connect, declare the outbound exchange and enable publisher confirms.
    pub async fn connect(config: &AmqpConfig) -> QueueResult<Self> {
        let (connection, channel) = topology::open_channel(config).await?;
        topology::declare_exchange(&channel, &config.exchange).await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;

        info!(
            "Producer connected to exchange '{}' (default routing key '{}')",
            config.exchange, config.routing_key
        );

        Ok(Self {
            connection,
            channel,
            exchange: config.exchange.clone(),
            routing_key: config.routing_key.clone(),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }

    /// Close the channel and the connection.
    pub async fn close(&self) {
        if let Err(e) = self.channel.close(200, "Bye").await {
            debug!("Producer channel close: {}", e);
        }
        if let Err(e) = self.connection.close(200, "Bye").await {
            debug!("Producer connection close: {}", e);
        }
        info!("Producer for exchange '{}' closed", self.exchange);
    }

    fn route<'a>(&'a self, message: &'a OutgoingMessage) -> &'a str {
        if message.routing_key.is_empty() {
            &self.routing_key
        } else {
            &message.routing_key
        }
    }
}

/// Fail on a broker nack.
fn check_confirmation(confirmation: Confirmation) -> QueueResult<()> {
    match confirmation {
        Confirmation::Nack(_) => Err(QueueError::publish_failed("broker nacked the message")),
        Confirmation::Ack(_) | Confirmation::NotRequested => Ok(()),
    }
}

#[async_trait]
impl MessagePublisher for AmqpProducer {
    async fn publish(&self, message: OutgoingMessage) -> QueueResult<()> {
        let routing_key = self.route(&message);
        let properties = BasicProperties::default()
            .with_content_type(ShortString::from(message.content_type.clone()))
            .with_delivery_mode(DELIVERY_MODE_PERSISTENT)
            .with_headers(map_to_field_table(&message.headers));

        self.channel
            .basic_publish(
                &self.exchange,
                routing_key,
                BasicPublishOptions::default(),
                &message.body,
                properties,
            )
            .await
            .map_err(|e| QueueError::publish_failed(format!("basic_publish: {e}")))?
            .await
            .map_err(|e| QueueError::publish_failed(format!("publisher confirm: {e}")))
            .and_then(check_confirmation)?;

        debug!(
            "Published {} bytes to exchange '{}' with key '{}'",
            message.body.len(),
            self.exchange,
            routing_key
        );
        Ok(())
    }
}
