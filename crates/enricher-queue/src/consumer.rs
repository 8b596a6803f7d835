//! AMQP consumer feeding the inbound adapter.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use lapin::message::Delivery;
use lapin::options::{
    BasicAckOptions, BasicCancelOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions,
};
use lapin::types::FieldTable;
use lapin::{Channel, Connection};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use enricher_models::InboundEvent;

use crate::config::AmqpConfig;
use crate::error::{QueueError, QueueResult};
use crate::headers::field_table_to_map;
use crate::inbound::{DispatchOutcome, InboundAdapter, InboundListener, RawDelivery};
use crate::topology;

/// Subscription to the "video downloaded" queue.
pub struct AmqpConsumer {
    connection: Connection,
    channel: Channel,
    queue: String,
    consumer_tag: String,
}

impl AmqpConsumer {
    /// Connect, declare the inbound queue and set the prefetch window.
    pub async fn connect(config: &AmqpConfig) -> QueueResult<Self> {
        let (connection, channel) = topology::open_channel(config).await?;
        topology::declare_inbound_queue(&channel, config).await?;

        // Backpressure: at most `prefetch` unacked deliveries in flight.
        channel
            .basic_qos(config.prefetch, BasicQosOptions::default())
            .await?;

        let consumer_tag = format!("tg-enricher-{}", Uuid::new_v4());
        info!(
            "Consumer '{}' connected to queue '{}' (prefetch {})",
            consumer_tag, config.queue, config.prefetch
        );

        Ok(Self {
            connection,
            channel,
            queue: config.queue.clone(),
            consumer_tag,
        })
    }

    /// Close the channel and the connection.
    pub async fn close(&self) {
        if let Err(e) = self.channel.close(200, "Bye").await {
            debug!("Consumer channel close: {}", e);
        }
        if let Err(e) = self.connection.close(200, "Bye").await {
            debug!("Consumer connection close: {}", e);
        }
        info!("Consumer '{}' closed", self.consumer_tag);
    }

    async fn settle(delivery: &Delivery, outcome: &DispatchOutcome) -> QueueResult<()> {
        if outcome.should_ack() {
            delivery.acker.ack(BasicAckOptions::default()).await?;
        } else {
            delivery
                .acker
                .nack(BasicNackOptions {
                    requeue: true,
                    ..Default::default()
                })
                .await?;
        }
        Ok(())
    }

    async fn return_to_broker(delivery: &Delivery) {
        let requeue = BasicNackOptions {
            requeue: true,
            ..Default::default()
        };
        if let Err(e) = delivery.acker.nack(requeue).await {
            warn!("Failed to return delivery to broker: {}", e);
        }
    }
}

#[async_trait]
impl InboundListener for AmqpConsumer {
    async fn start_listening(
        &self,
        adapter: Arc<InboundAdapter>,
        inbound: mpsc::Sender<InboundEvent>,
        cancel: CancellationToken,
    ) -> QueueResult<()> {
        let mut consumer = self
            .channel
            .basic_consume(
                &self.queue,
                &self.consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        info!("Listening on queue '{}'", self.queue);

        let result = loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => break Ok(()),
                next = consumer.next() => next,
            };

            let delivery = match next {
                Some(Ok(delivery)) => delivery,
                Some(Err(e)) => {
                    break Err(QueueError::connection_failed(format!("Consumer stream failed: {e}")))
                }
                None => break Err(QueueError::connection_failed("Consumer stream ended")),
            };

            let raw = RawDelivery {
                headers: field_table_to_map(delivery.properties.headers().as_ref()),
                content_type: delivery
                    .properties
                    .content_type()
                    .as_ref()
                    .map(|ct| ct.as_str().to_string()),
                body: delivery.data.clone(),
            };

            // A full inbound queue parks us here; cancelling hands the
            // delivery back instead of waiting for space.
            let outcome = tokio::select! {
                outcome = adapter.dispatch(raw, &inbound) => outcome,
                _ = cancel.cancelled() => {
                    Self::return_to_broker(&delivery).await;
                    break Ok(());
                }
            };

            if let Err(e) = Self::settle(&delivery, &outcome).await {
                break Err(QueueError::connection_failed(format!("Failed to settle delivery: {e}")));
            }

            if matches!(outcome, DispatchOutcome::Closed) {
                break Ok(());
            }
        };

        if let Err(e) = self
            .channel
            .basic_cancel(&self.consumer_tag, BasicCancelOptions::default())
            .await
        {
            debug!("basic_cancel for '{}' failed: {}", self.consumer_tag, e);
        }

        info!("Stopped listening on queue '{}'", self.queue);
        result
    }

    fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::bounded;
    use crate::codec::TraceContextCodec;
    use crate::stats::PipelineStats;
    use enricher_models::PayloadFormat;

    #[tokio::test]
    #[ignore = "requires RabbitMQ"]
    async fn test_consumer_stops_on_cancel() {
        dotenvy::dotenv().ok();

        let config = AmqpConfig::from_env().expect("Failed to read config");
        let consumer = AmqpConsumer::connect(&config).await.expect("Failed to connect");
        assert!(consumer.is_connected());

        let adapter = Arc::new(InboundAdapter::new(
            TraceContextCodec::new(),
            PayloadFormat::Auto,
            Arc::new(PipelineStats::new()),
        ));
        let (tx, _rx) = bounded(10);
        let cancel = CancellationToken::new();
        cancel.cancel();

        consumer
            .start_listening(adapter, tx, cancel)
            .await
            .expect("Listener failed");
        consumer.close().await;
    }
}
