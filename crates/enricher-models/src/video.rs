//! Persisted video metadata.

use serde::{Deserialize, Serialize};

use crate::event::CorrelationId;
use crate::messages::VideoDownloadedMessage;

/// A row of the `video` table.
///
/// Nullable columns are already folded to zero or empty here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredVideo {
    /// Primary key, equal to the request correlation id
    pub hash_id: String,
    pub original_id: i64,
    /// Source URL requested by the user
    pub url: String,
    pub video_id: String,
    pub load_timestamp: i64,
    pub path: String,
    pub title: String,
    pub duration: i64,
    pub timestamp: i64,
    pub filesize: i64,
    pub thumbnail: String,
    pub channel_url: String,
    pub channel_id: String,
    /// Owning Telegram user
    pub user_id: i64,
    pub channel: String,
    pub loaded_times: i64,
}

/// Fields written back after a download completes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoUpdate {
    pub hash_id: String,
    pub path: String,
    pub title: String,
    pub duration: i64,
    pub timestamp: i64,
    pub filesize: i64,
    pub thumbnail: String,
    pub channel_url: String,
    pub channel_id: String,
    pub channel: String,
    pub video_id: String,
}

impl VideoUpdate {
    /// Collect the update set for the row keyed by `correlation_id`.
    ///
    /// Fractional durations are truncated to whole seconds.
    pub fn from_message(message: &VideoDownloadedMessage, correlation_id: &CorrelationId) -> Self {
        Self {
            hash_id: correlation_id.as_str().to_string(),
            path: message.path.clone(),
            title: message.title.clone(),
            duration: message.duration as i64,
            timestamp: message.timestamp,
            filesize: message.filesize,
            thumbnail: message.thumbnail.clone(),
            channel_url: message.channel_url.clone(),
            channel_id: message.channel_id.clone(),
            channel: message.channel.clone(),
            video_id: message.id.clone(),
        }
    }

    /// Apply this update to a stored row.
    pub fn apply_to(&self, video: &mut StoredVideo) {
        video.path = self.path.clone();
        video.title = self.title.clone();
        video.duration = self.duration;
        video.timestamp = self.timestamp;
        video.filesize = self.filesize;
        video.thumbnail = self.thumbnail.clone();
        video.channel_url = self.channel_url.clone();
        video.channel_id = self.channel_id.clone();
        video.channel = self.channel.clone();
        video.video_id = self.video_id.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_from_message() {
        let message = VideoDownloadedMessage {
            path: "/v/1.mp4".to_string(),
            title: "T".to_string(),
            duration: 10.9,
            timestamp: 1000,
            filesize: 2048,
            thumbnail: "/t/1.jpg".to_string(),
            channel_url: "c1".to_string(),
            channel_id: "ch1".to_string(),
            channel: "Chan".to_string(),
            id: "vid1".to_string(),
        };

        let update = VideoUpdate::from_message(&message, &CorrelationId::from("abc-1"));

        assert_eq!(update.hash_id, "abc-1");
        assert_eq!(update.duration, 10);
        assert_eq!(update.video_id, "vid1");
        assert_eq!(update.channel, "Chan");
    }

    #[test]
    fn test_apply_keeps_ownership_fields() {
        let mut video = StoredVideo {
            hash_id: "abc-1".to_string(),
            user_id: 42,
            loaded_times: 3,
            ..Default::default()
        };
        let update = VideoUpdate {
            hash_id: "abc-1".to_string(),
            title: "New".to_string(),
            ..Default::default()
        };

        update.apply_to(&mut video);

        assert_eq!(video.title, "New");
        assert_eq!(video.user_id, 42);
        assert_eq!(video.loaded_times, 3);
    }
}
