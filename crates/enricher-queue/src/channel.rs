//! Bounded queues between pipeline stages.
//!
//! A queue is a `tokio::sync::mpsc` channel whose receiving half can be
//! shared by several consumers. Senders block while the queue is full; the
//! queue closes once every sender is dropped, and consumers see `None` only
//! after the remaining items are drained.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

/// Create a queue holding at most `capacity` items (minimum 1).
pub fn bounded<T>(capacity: usize) -> (mpsc::Sender<T>, SharedReceiver<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (tx, SharedReceiver::new(rx))
}

/// Receiving half that several tasks can pull from.
pub struct SharedReceiver<T> {
    inner: Arc<Mutex<mpsc::Receiver<T>>>,
}

impl<T> Clone for SharedReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> SharedReceiver<T> {
    pub fn new(rx: mpsc::Receiver<T>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(rx)),
        }
    }

    /// Next item, or `None` once the queue is closed and empty.
    pub async fn recv(&self) -> Option<T> {
        self.inner.lock().await.recv().await
    }

    /// Next item if one is queued right now.
    ///
    /// Waits for the receive lock, so it returns once no consumer is
    /// parked in `recv`.
    pub async fn try_recv(&self) -> Option<T> {
        self.inner.lock().await.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready_ok, task};

    #[tokio::test]
    async fn test_full_queue_blocks_sender_until_space() {
        let (tx, rx) = bounded::<u32>(1);
        tx.send(1).await.unwrap();

        let mut blocked = task::spawn(tx.send(2));
        assert_pending!(blocked.poll());

        assert_eq!(rx.recv().await, Some(1));
        assert!(blocked.is_woken());
        assert_ready_ok!(blocked.poll());

        assert_eq!(rx.recv().await, Some(2));
    }

    #[tokio::test]
    async fn test_drains_before_reporting_closed() {
        let (tx, rx) = bounded::<u32>(4);
        tx.send(1).await.unwrap();
        tx.send(2).await.unwrap();
        drop(tx);

        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, Some(2));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_consumers_share_items() {
        let (tx, rx) = bounded::<u32>(8);
        let other = rx.clone();
        for i in 0..4 {
            tx.send(i).await.unwrap();
        }
        drop(tx);

        let mut seen = Vec::new();
        while let Some(item) = rx.recv().await {
            seen.push(item);
            if let Some(item) = other.recv().await {
                seen.push(item);
            }
        }
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_zero_capacity_is_raised_to_one() {
        let (tx, rx) = bounded::<u32>(0);
        tx.send(7).await.unwrap();
        assert_eq!(rx.recv().await, Some(7));
    }

    #[tokio::test]
    async fn test_try_recv_takes_leftovers_without_waiting() {
        let (tx, rx) = bounded::<u32>(4);
        tx.send(1).await.unwrap();
        tx.send(2).await.unwrap();

        assert_eq!(rx.try_recv().await, Some(1));
        assert_eq!(rx.try_recv().await, Some(2));
        // senders are still alive, yet nothing is queued
        assert_eq!(rx.try_recv().await, None);
    }
}
