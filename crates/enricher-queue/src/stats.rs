//! Pipeline counters.
//!
//! Every event is counted twice: in process, for the shutdown report and
//! tests, and through the `metrics` facade for Prometheus.

use std::sync::atomic::{AtomicU64, Ordering};

use metrics::counter;
use serde_json::json;

/// Metric names as constants for consistency.
pub mod names {
    pub const MESSAGES_CONSUMED_TOTAL: &str = "enricher_messages_consumed_total";
    pub const MESSAGES_DECODE_FAILED_TOTAL: &str = "enricher_messages_decode_failed_total";
    pub const MESSAGES_PROCESSED_TOTAL: &str = "enricher_messages_processed_total";
    pub const MESSAGES_FAILED_TOTAL: &str = "enricher_messages_failed_total";
    pub const MESSAGES_PUBLISHED_TOTAL: &str = "enricher_messages_published_total";
    pub const MESSAGES_PUBLISH_FAILED_TOTAL: &str = "enricher_messages_publish_failed_total";
}

/// Shared counters for one pipeline run.
#[derive(Debug, Default)]
pub struct PipelineStats {
    consumed: AtomicU64,
    decode_failed: AtomicU64,
    processed: AtomicU64,
    not_found: AtomicU64,
    storage_failed: AtomicU64,
    abandoned: AtomicU64,
    published: AtomicU64,
    publish_failed: AtomicU64,
}

/// Point-in-time copy of `PipelineStats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub consumed: u64,
    pub decode_failed: u64,
    pub processed: u64,
    pub not_found: u64,
    pub storage_failed: u64,
    /// Acked but never processed because the drain deadline passed
    pub abandoned: u64,
    pub published: u64,
    pub publish_failed: u64,
}

impl StatsSnapshot {
    /// Items dropped by the worker pool.
    pub fn failed(&self) -> u64 {
        self.not_found + self.storage_failed + self.abandoned
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "consumed": self.consumed,
            "decode_failed": self.decode_failed,
            "processed": self.processed,
            "not_found": self.not_found,
            "storage_failed": self.storage_failed,
            "abandoned": self.abandoned,
            "published": self.published,
            "publish_failed": self.publish_failed,
        })
    }
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// A delivery was decoded and enqueued.
    pub fn record_consumed(&self) {
        self.consumed.fetch_add(1, Ordering::Relaxed);
        counter!(names::MESSAGES_CONSUMED_TOTAL).increment(1);
    }

    pub fn record_decode_failed(&self) {
        self.decode_failed.fetch_add(1, Ordering::Relaxed);
        counter!(names::MESSAGES_DECODE_FAILED_TOTAL).increment(1);
    }

    /// A worker produced an outbound event.
    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        counter!(names::MESSAGES_PROCESSED_TOTAL).increment(1);
    }

    pub fn record_not_found(&self) {
        self.not_found.fetch_add(1, Ordering::Relaxed);
        counter!(names::MESSAGES_FAILED_TOTAL, "reason" => "not_found").increment(1);
    }

    pub fn record_storage_failed(&self) {
        self.storage_failed.fetch_add(1, Ordering::Relaxed);
        counter!(names::MESSAGES_FAILED_TOTAL, "reason" => "storage").increment(1);
    }

    pub fn record_abandoned(&self) {
        self.abandoned.fetch_add(1, Ordering::Relaxed);
        counter!(names::MESSAGES_FAILED_TOTAL, "reason" => "abandoned").increment(1);
    }

    pub fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
        counter!(names::MESSAGES_PUBLISHED_TOTAL).increment(1);
    }

    pub fn record_publish_failed(&self) {
        self.publish_failed.fetch_add(1, Ordering::Relaxed);
        counter!(names::MESSAGES_PUBLISH_FAILED_TOTAL).increment(1);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            consumed: self.consumed.load(Ordering::Relaxed),
            decode_failed: self.decode_failed.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            not_found: self.not_found.load(Ordering::Relaxed),
            storage_failed: self.storage_failed.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            publish_failed: self.publish_failed.load(Ordering::Relaxed),
        }
    }
}
