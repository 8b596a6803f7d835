//! Fixed-size enrichment worker pool.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use enricher_models::{InboundEvent, OutboundEvent};
use enricher_queue::SharedReceiver;

use crate::error::{WorkerError, WorkerResult};
use crate::processor::MessageProcessor;

/// Workers pulling from one shared inbound queue.
///
/// Each worker holds a clone of the outbound sender, so the outbound queue
/// closes once every worker has exited.
pub struct WorkerPool {
    workers: JoinSet<()>,
    worker_count: usize,
    stop: watch::Sender<bool>,
    processor: Arc<MessageProcessor>,
    inbound: SharedReceiver<InboundEvent>,
}

impl WorkerPool {
    /// Launch `worker_count` workers.
    pub fn start(
        worker_count: usize,
        processor: Arc<MessageProcessor>,
        inbound: SharedReceiver<InboundEvent>,
        outbound: mpsc::Sender<OutboundEvent>,
    ) -> Self {
        let worker_count = worker_count.max(1);
        let (stop, _) = watch::channel(false);
        let mut workers = JoinSet::new();

        for worker in 0..worker_count {
            workers.spawn(Self::run_worker(
                worker,
                Arc::clone(&processor),
                inbound.clone(),
                outbound.clone(),
                stop.subscribe(),
            ));
        }

        info!("Started {} enrichment workers", worker_count);

        Self {
            workers,
            worker_count,
            stop,
            processor,
            inbound,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    async fn run_worker(
        worker: usize,
        processor: Arc<MessageProcessor>,
        inbound: SharedReceiver<InboundEvent>,
        outbound: mpsc::Sender<OutboundEvent>,
        mut stop: watch::Receiver<bool>,
    ) {
        debug!(worker, "Worker started");

        loop {
            if *stop.borrow() {
                debug!(worker, "Stop requested");
                break;
            }

            let event = tokio::select! {
                biased;
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                event = inbound.recv() => event,
            };

            let Some(event) = event else {
                debug!(worker, "Inbound queue drained");
                break;
            };

            processor.process(worker, event, &outbound).await;
        }

        debug!(worker, "Worker stopped");
    }

    /// Wait for the workers to drain the inbound queue and exit.
    ///
    /// Call after the inbound queue has been closed. Workers that are still
    /// busy after `timeout` are told to stop once their current message is
    /// done. Every event still queued after that is abandoned: logged by
    /// correlation id and counted as failed. `DrainTimeout` is then returned.
    pub async fn stop_processing(mut self, timeout: Duration) -> WorkerResult<()> {
        info!("Waiting for {} workers to drain", self.worker_count);

        let drained = tokio::time::timeout(timeout, Self::join_all(&mut self.workers))
            .await
            .is_ok();

        if drained {
            info!("All workers exited");
            return Ok(());
        }

        warn!(
            "Workers still busy after {}s, stopping after current messages",
            timeout.as_secs()
        );
        // send only fails once every receiver is gone, i.e. all workers exited
        let _ = self.stop.send(true);
        Self::join_all(&mut self.workers).await;

        let mut abandoned = 0;
        while let Some(event) = self.inbound.try_recv().await {
            self.processor.abandon(&event);
            abandoned += 1;
        }
        if abandoned > 0 {
            error!("Abandoned {} queued messages at drain deadline", abandoned);
        }

        Err(WorkerError::DrainTimeout(timeout.as_secs()))
    }

    async fn join_all(workers: &mut JoinSet<()>) {
        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                error!("Worker task failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enricher_models::{StoredVideo, VideoDownloadedMessage};
    use enricher_queue::{bounded, PipelineStats};
    use enricher_storage::InMemoryVideoStore;
    use opentelemetry::Context;

    fn event(id: &str) -> InboundEvent {
        InboundEvent::new(
            VideoDownloadedMessage {
                title: id.to_string(),
                ..Default::default()
            },
            id,
            Context::new(),
        )
    }

    async fn processor(
        ids: &[&str],
        latency: Option<Duration>,
        stats: Arc<PipelineStats>,
    ) -> Arc<MessageProcessor> {
        let mut store = InMemoryVideoStore::new();
        if let Some(latency) = latency {
            store = store.with_latency(latency);
        }
        for id in ids {
            store
                .insert(StoredVideo {
                    hash_id: id.to_string(),
                    user_id: 7,
                    ..Default::default()
                })
                .await;
        }
        Arc::new(MessageProcessor::new(Arc::new(store), "", stats))
    }

    #[tokio::test]
    async fn test_workers_drain_and_close_outbound() {
        let ids = ["a", "b", "c", "d", "e", "f"];
        let (inbound_tx, inbound_rx) = bounded(16);
        let (outbound_tx, outbound_rx) = bounded(16);

        let pool = WorkerPool::start(
            3,
            processor(&ids, None, Arc::new(PipelineStats::new())).await,
            inbound_rx,
            outbound_tx,
        );
        assert_eq!(pool.worker_count(), 3);

        for id in ids {
            inbound_tx.send(event(id)).await.unwrap();
        }
        drop(inbound_tx);

        pool.stop_processing(Duration::from_secs(5)).await.unwrap();

        let mut received = Vec::new();
        while let Some(out) = outbound_rx.recv().await {
            received.push(out.correlation_id.to_string());
        }
        received.sort();
        assert_eq!(received, ids);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_timeout_abandons_queued_messages() {
        let ids: Vec<String> = (0..10).map(|i| format!("id-{i}")).collect();
        let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let (inbound_tx, inbound_rx) = bounded(16);
        let (outbound_tx, outbound_rx) = bounded(16);

        let stats = Arc::new(PipelineStats::new());
        let processor = processor(&id_refs, Some(Duration::from_secs(1)), Arc::clone(&stats)).await;
        let pool = WorkerPool::start(1, processor, inbound_rx, outbound_tx);

        for id in &id_refs {
            inbound_tx.send(event(id)).await.unwrap();
        }
        drop(inbound_tx);

        let err = pool
            .stop_processing(Duration::from_millis(2500))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::DrainTimeout(_)));

        let mut forwarded = 0;
        while outbound_rx.recv().await.is_some() {
            forwarded += 1;
        }
        assert!(forwarded > 0 && forwarded < ids.len());

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.processed, forwarded as u64);
        assert_eq!(snapshot.abandoned, (ids.len() - forwarded) as u64);
    }
}
