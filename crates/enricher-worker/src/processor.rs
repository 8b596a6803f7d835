//! Per-message enrichment.
//!
//! For one inbound event: fetch the stored row, write the downloaded
//! metadata onto it, and build the notification for the owning user.
//! Failures are terminal for that message only.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, Instrument};

use enricher_models::{InboundEvent, OutboundEvent, TgSendMessage, VideoUpdate};
use enricher_queue::PipelineStats;
use enricher_storage::VideoStore;

use crate::error::{WorkerError, WorkerResult};
use crate::logging::MessageLogger;

/// What happened to one inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// An outbound event was enqueued
    Forwarded,
    /// No stored row for the correlation id
    NotFound,
    /// Read or write failed, or the row was unusable
    Failed,
    /// The outbound queue no longer accepts items
    Closed,
}

/// Enriches inbound events. Shared by all workers of a pool.
pub struct MessageProcessor {
    store: Arc<dyn VideoStore>,
    destination: String,
    stats: Arc<PipelineStats>,
}

impl MessageProcessor {
    pub fn new(
        store: Arc<dyn VideoStore>,
        destination: impl Into<String>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            store,
            destination: destination.into(),
            stats,
        }
    }

    /// Fetch, update, and build the outbound event for `event`.
    pub async fn enrich(&self, event: &InboundEvent) -> WorkerResult<OutboundEvent> {
        let video = self
            .store
            .fetch_record_by_id(event.correlation_id.as_str())
            .await?;

        let user_id = u64::try_from(video.user_id).map_err(|_| {
            WorkerError::invalid_record(format!(
                "user id {} of {} is negative",
                video.user_id, video.hash_id
            ))
        })?;

        let update = VideoUpdate::from_message(&event.message, &event.correlation_id);
        self.store.apply_update(&update).await?;

        let message = TgSendMessage::image(
            &event.message.title,
            user_id,
            &event.message.path,
            &event.message.thumbnail,
        );

        Ok(OutboundEvent::new(
            message,
            event.correlation_id.clone(),
            &self.destination,
            event.trace_context.clone(),
        ))
    }

    /// Enrich `event` and enqueue the result, waiting while the outbound
    /// queue is full.
    pub async fn process(
        &self,
        worker: usize,
        event: InboundEvent,
        outbound: &mpsc::Sender<OutboundEvent>,
    ) -> ProcessOutcome {
        let logger = MessageLogger::new(&event.correlation_id, worker, &event.trace_context);
        let span = logger.span().clone();

        async {
            logger.log_start(&event.message.title);

            let outbound_event = match self.enrich(&event).await {
                Ok(outbound_event) => outbound_event,
                Err(e) => {
                    logger.log_error(&e.to_string());
                    if e.is_not_found() {
                        self.stats.record_not_found();
                        return ProcessOutcome::NotFound;
                    }
                    self.stats.record_storage_failed();
                    return ProcessOutcome::Failed;
                }
            };

            logger.log_progress("record updated");

            if outbound.send(outbound_event).await.is_err() {
                logger.log_warning("outbound queue closed, dropping result");
                return ProcessOutcome::Closed;
            }

            self.stats.record_processed();
            logger.log_completion("notification enqueued");
            ProcessOutcome::Forwarded
        }
        .instrument(span)
        .await
    }

    /// Account for an acked event that will never be processed.
    pub fn abandon(&self, event: &InboundEvent) {
        error!(
            correlation_id = %event.correlation_id,
            "Message abandoned at drain deadline"
        );
        self.stats.record_abandoned();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enricher_models::{MessageType, StoredVideo, VideoDownloadedMessage, PARAM_FILE_URL, PARAM_PHOTO_URL};
    use enricher_storage::InMemoryVideoStore;
    use opentelemetry::Context;

    fn inbound(id: &str) -> InboundEvent {
        InboundEvent::new(
            VideoDownloadedMessage {
                path: "/v/1.mp4".to_string(),
                title: "T".to_string(),
                duration: 10.0,
                timestamp: 1000,
                filesize: 2048,
                thumbnail: "/t/1.jpg".to_string(),
                channel_url: "c1".to_string(),
                channel_id: "ch1".to_string(),
                channel: "Chan".to_string(),
                id: "vid1".to_string(),
            },
            id,
            Context::new(),
        )
    }

    async fn store_with(id: &str, user_id: i64) -> Arc<InMemoryVideoStore> {
        let store = Arc::new(InMemoryVideoStore::new());
        store
            .insert(StoredVideo {
                hash_id: id.to_string(),
                user_id,
                ..Default::default()
            })
            .await;
        store
    }

    #[tokio::test]
    async fn test_enrich_builds_image_notification() {
        let store = store_with("abc-1", 42).await;
        let processor = MessageProcessor::new(store.clone(), "", Arc::new(PipelineStats::new()));

        let out = processor.enrich(&inbound("abc-1")).await.unwrap();

        assert_eq!(out.correlation_id.as_str(), "abc-1");
        assert_eq!(out.destination, "");
        assert_eq!(out.message.text, "T");
        assert_eq!(out.message.user_id, 42);
        assert_eq!(out.message.message_type(), Some(MessageType::Image));
        assert_eq!(out.message.params[PARAM_FILE_URL], "/v/1.mp4");
        assert_eq!(out.message.params[PARAM_PHOTO_URL], "/t/1.jpg");

        let stored = store.get("abc-1").await.unwrap();
        assert_eq!(stored.path, "/v/1.mp4");
        assert_eq!(stored.duration, 10);
        assert_eq!(stored.video_id, "vid1");
    }

    #[tokio::test]
    async fn test_missing_record_is_not_found() {
        let store = Arc::new(InMemoryVideoStore::new());
        let stats = Arc::new(PipelineStats::new());
        let processor = MessageProcessor::new(store.clone(), "", Arc::clone(&stats));
        let (tx, mut rx) = mpsc::channel(1);

        let outcome = processor.process(0, inbound("missing"), &tx).await;

        assert_eq!(outcome, ProcessOutcome::NotFound);
        assert!(rx.try_recv().is_err());
        assert!(store.updates().await.is_empty());
        assert_eq!(stats.snapshot().not_found, 1);
    }

    #[tokio::test]
    async fn test_write_failure_produces_nothing() {
        let store = store_with("abc-1", 42).await;
        store.fail_writes_for("abc-1").await;
        let stats = Arc::new(PipelineStats::new());
        let processor = MessageProcessor::new(store.clone(), "", Arc::clone(&stats));
        let (tx, mut rx) = mpsc::channel(1);

        let outcome = processor.process(0, inbound("abc-1"), &tx).await;

        assert_eq!(outcome, ProcessOutcome::Failed);
        assert!(rx.try_recv().is_err());
        assert_eq!(stats.snapshot().storage_failed, 1);
    }

    #[tokio::test]
    async fn test_read_failure_produces_nothing() {
        let store = store_with("abc-1", 42).await;
        store.fail_reads_for("abc-1").await;
        let stats = Arc::new(PipelineStats::new());
        let processor = MessageProcessor::new(store.clone(), "", Arc::clone(&stats));
        let (tx, mut rx) = mpsc::channel(1);

        let outcome = processor.process(0, inbound("abc-1"), &tx).await;

        assert_eq!(outcome, ProcessOutcome::Failed);
        assert!(rx.try_recv().is_err());
        assert!(store.updates().await.is_empty());
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.storage_failed, 1);
        assert_eq!(snapshot.not_found, 0);
    }

    #[test]
    fn test_abandoned_event_counts_as_failed() {
        let stats = Arc::new(PipelineStats::new());
        let processor = MessageProcessor::new(
            Arc::new(InMemoryVideoStore::new()),
            "",
            Arc::clone(&stats),
        );

        processor.abandon(&inbound("abc-1"));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.abandoned, 1);
        assert_eq!(snapshot.failed(), 1);
    }

    #[tokio::test]
    async fn test_negative_user_id_is_rejected_before_write() {
        let store = store_with("abc-1", -1).await;
        let processor = MessageProcessor::new(store.clone(), "", Arc::new(PipelineStats::new()));

        let err = processor.enrich(&inbound("abc-1")).await.unwrap_err();

        assert!(matches!(err, WorkerError::InvalidRecord(_)));
        assert!(store.updates().await.is_empty());
    }

    #[tokio::test]
    async fn test_closed_outbound_queue() {
        let store = store_with("abc-1", 42).await;
        let processor = MessageProcessor::new(store, "", Arc::new(PipelineStats::new()));
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let outcome = processor.process(0, inbound("abc-1"), &tx).await;
        assert_eq!(outcome, ProcessOutcome::Closed);
    }
}
