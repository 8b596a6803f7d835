//! Video metadata storage.
//!
//! This crate provides:
//! - The `VideoStore` port consumed by the enrichment workers
//! - A PostgreSQL implementation backed by a `sqlx` pool
//! - An in-memory implementation for tests and local runs

pub mod error;
pub mod memory;
pub mod port;
pub mod postgres;

pub use error::{StorageError, StorageResult};
pub use memory::InMemoryVideoStore;
pub use port::{HealthStatus, VideoStore, HEALTH_CHECK_TIMEOUT};
pub use postgres::{PgVideoStore, PostgresConfig};
