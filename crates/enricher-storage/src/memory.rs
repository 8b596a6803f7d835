//! In-memory implementation of the storage port.
//!
//! Used by the pipeline tests and for running the service without a
//! database. Failures can be injected per hash id.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use enricher_models::{StoredVideo, VideoUpdate};

use crate::error::{StorageError, StorageResult};
use crate::port::{HealthStatus, VideoStore};

#[derive(Default)]
struct State {
    videos: HashMap<String, StoredVideo>,
    updates: Vec<VideoUpdate>,
    failing_reads: HashSet<String>,
    failing_writes: HashSet<String>,
    down: bool,
}

/// Video store held in a map.
#[derive(Default)]
pub struct InMemoryVideoStore {
    state: RwLock<State>,
    latency: Option<Duration>,
}

impl InMemoryVideoStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every read and write by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Insert or replace a row.
    pub async fn insert(&self, video: StoredVideo) {
        let mut state = self.state.write().await;
        state.videos.insert(video.hash_id.clone(), video);
    }

    /// Make reads of `hash_id` fail with a storage error.
    pub async fn fail_reads_for(&self, hash_id: impl Into<String>) {
        self.state.write().await.failing_reads.insert(hash_id.into());
    }

    /// Make writes of `hash_id` fail with a storage error.
    pub async fn fail_writes_for(&self, hash_id: impl Into<String>) {
        self.state.write().await.failing_writes.insert(hash_id.into());
    }

    /// Toggle the health check result.
    pub async fn set_down(&self, down: bool) {
        self.state.write().await.down = down;
    }

    pub async fn get(&self, hash_id: &str) -> Option<StoredVideo> {
        self.state.read().await.videos.get(hash_id).cloned()
    }

    /// Every update applied so far, in call order.
    pub async fn updates(&self) -> Vec<VideoUpdate> {
        self.state.read().await.updates.clone()
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl VideoStore for InMemoryVideoStore {
    async fn fetch_record_by_id(&self, hash_id: &str) -> StorageResult<StoredVideo> {
        self.simulate_latency().await;

        let state = self.state.read().await;
        if state.down || state.failing_reads.contains(hash_id) {
            return Err(StorageError::unavailable(format!("read of {hash_id} failed")));
        }

        state
            .videos
            .get(hash_id)
            .cloned()
            .ok_or_else(|| StorageError::not_found(hash_id))
    }

    async fn apply_update(&self, update: &VideoUpdate) -> StorageResult<()> {
        self.simulate_latency().await;

        let mut state = self.state.write().await;
        if state.down || state.failing_writes.contains(&update.hash_id) {
            return Err(StorageError::unavailable(format!(
                "write of {} failed",
                update.hash_id
            )));
        }

        let video = state
            .videos
            .get_mut(&update.hash_id)
            .ok_or_else(|| StorageError::not_found(&update.hash_id))?;
        update.apply_to(video);
        state.updates.push(update.clone());
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        if self.state.read().await.down {
            HealthStatus::down("in-memory store marked down")
        } else {
            HealthStatus::Up
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(hash_id: &str, user_id: i64) -> StoredVideo {
        StoredVideo {
            hash_id: hash_id.to_string(),
            user_id,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_fetch_missing_is_not_found() {
        let store = InMemoryVideoStore::new();
        let err = store.fetch_record_by_id("nope").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_update_is_visible_and_recorded() {
        let store = InMemoryVideoStore::new();
        store.insert(video("abc-1", 42)).await;

        let update = VideoUpdate {
            hash_id: "abc-1".to_string(),
            title: "T".to_string(),
            ..Default::default()
        };
        store.apply_update(&update).await.unwrap();

        let stored = store.get("abc-1").await.unwrap();
        assert_eq!(stored.title, "T");
        assert_eq!(stored.user_id, 42);
        assert_eq!(store.updates().await, vec![update]);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = InMemoryVideoStore::new();
        store.insert(video("r", 1)).await;
        store.insert(video("w", 2)).await;
        store.fail_reads_for("r").await;
        store.fail_writes_for("w").await;

        let read = store.fetch_record_by_id("r").await.unwrap_err();
        assert!(matches!(read, StorageError::Unavailable(_)));

        let write = store
            .apply_update(&VideoUpdate {
                hash_id: "w".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(write, StorageError::Unavailable(_)));
        assert!(store.updates().await.is_empty());
    }

    #[tokio::test]
    async fn test_health_follows_down_flag() {
        let store = InMemoryVideoStore::new();
        assert!(store.health_check().await.is_up());

        store.set_down(true).await;
        assert!(!store.health_check().await.is_up());
    }
}
