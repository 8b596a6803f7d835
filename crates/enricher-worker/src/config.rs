//! Worker configuration.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Local,
    Dev,
    Prod,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Dev => "dev",
            Environment::Prod => "prod",
        }
    }

    /// Default log level for this environment.
    pub fn default_log_level(&self) -> &'static str {
        match self {
            Environment::Local | Environment::Dev => "debug",
            Environment::Prod => "info",
        }
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(Environment::Local),
            "dev" | "development" => Ok(Environment::Dev),
            "prod" | "production" => Ok(Environment::Prod),
            other => Err(format!("unknown environment: {other}")),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub environment: Environment,
    /// Concurrent enrichment workers
    pub worker_count: usize,
    /// Capacity of each bounded queue
    pub queue_capacity: usize,
    /// How long draining workers may take before they are told to stop
    pub shutdown_timeout: Duration,
    /// Routing key for outbound events; empty means the producer default
    pub destination: String,
    pub health_host: String,
    pub health_port: u16,
    pub metrics_enabled: bool,
    /// Force JSON log lines regardless of environment
    pub log_json: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Local,
            worker_count: 5,
            queue_capacity: 100,
            shutdown_timeout: Duration::from_secs(30),
            destination: String::new(),
            health_host: "0.0.0.0".to_string(),
            health_port: 8080,
            metrics_enabled: true,
            log_json: false,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            environment: std::env::var("ENVIRONMENT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.environment),
            worker_count: std::env::var("WORKER_COUNT")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.worker_count),
            queue_capacity: std::env::var("WORKER_QUEUE_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.queue_capacity),
            shutdown_timeout: Duration::from_secs(
                std::env::var("WORKER_SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            destination: std::env::var("WORKER_DESTINATION").unwrap_or_default(),
            health_host: std::env::var("HEALTH_HOST").unwrap_or(defaults.health_host),
            health_port: std::env::var("HEALTH_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.health_port),
            metrics_enabled: std::env::var("METRICS_ENABLED")
                .map(|v| v.to_lowercase() != "false")
                .unwrap_or(true),
            log_json: std::env::var("LOG_FORMAT")
                .map(|v| v.to_lowercase() == "json")
                .unwrap_or(false),
        }
    }

    /// JSON logs outside local runs, or when asked for explicitly.
    pub fn use_json_logs(&self) -> bool {
        self.log_json || self.environment != Environment::Local
    }

    /// Address for the health server. Falls back to all interfaces when the
    /// host does not parse.
    pub fn health_addr(&self) -> SocketAddr {
        format!("{}:{}", self.health_host, self.health_port)
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], self.health_port)))
    }
}
