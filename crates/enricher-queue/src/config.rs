//! Broker configuration.

use enricher_models::PayloadFormat;

use crate::error::{QueueError, QueueResult};

/// AMQP connection and routing settings.
#[derive(Debug, Clone)]
pub struct AmqpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Virtual host, "/" for the default one
    pub vhost: String,
    /// Queue carrying "video downloaded" events
    pub queue: String,
    /// Exchange bound to `queue`, declared when set
    pub inbound_exchange: Option<String>,
    /// Binding key between `inbound_exchange` and `queue`
    pub inbound_routing_key: String,
    /// Exchange receiving "send to user" events
    pub exchange: String,
    /// Routing key used when an outbound event names no destination
    pub routing_key: String,
    /// Unacked deliveries the broker may push ahead
    pub prefetch: u16,
    /// Payload encoding, both directions
    pub payload_format: PayloadFormat,
}

impl Default for AmqpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5672,
            user: "guest".to_string(),
            password: "guest".to_string(),
            vhost: "/".to_string(),
            queue: "video-downloaded".to_string(),
            inbound_exchange: None,
            inbound_routing_key: String::new(),
            exchange: "tg-send".to_string(),
            routing_key: "tg-send".to_string(),
            prefetch: 100,
            payload_format: PayloadFormat::Auto,
        }
    }
}

impl AmqpConfig {
    /// Create config from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            host: std::env::var("AMQP_HOST").unwrap_or(defaults.host),
            port: std::env::var("AMQP_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            user: std::env::var("AMQP_USER").unwrap_or(defaults.user),
            password: std::env::var("AMQP_PASSWORD").unwrap_or(defaults.password),
            vhost: std::env::var("AMQP_VHOST").unwrap_or(defaults.vhost),
            queue: std::env::var("AMQP_QUEUE").unwrap_or(defaults.queue),
            inbound_exchange: std::env::var("AMQP_INBOUND_EXCHANGE")
                .ok()
                .filter(|s| !s.is_empty()),
            inbound_routing_key: std::env::var("AMQP_INBOUND_ROUTING_KEY")
                .unwrap_or(defaults.inbound_routing_key),
            exchange: std::env::var("AMQP_EXCHANGE").unwrap_or(defaults.exchange),
            routing_key: std::env::var("AMQP_ROUTING_KEY").unwrap_or(defaults.routing_key),
            prefetch: std::env::var("AMQP_PREFETCH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.prefetch),
            payload_format: match std::env::var("AMQP_PAYLOAD_FORMAT") {
                Ok(value) => value
                    .parse()
                    .map_err(|e| QueueError::config_error(format!("AMQP_PAYLOAD_FORMAT: {e}")))?,
                Err(_) => defaults.payload_format,
            },
        })
    }

    /// Connection URI.
    pub fn uri(&self) -> String {
        let vhost = if self.vhost == "/" {
            "%2f"
        } else {
            self.vhost.trim_start_matches('/')
        };
        format!(
            "amqp://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, vhost
        )
    }
}
