//! Shared data models for the TG enricher.
//!
//! This crate provides:
//! - Wire schemas for the inbound `VideoDownloadedMessage` and the outbound
//!   `TgSendMessage`, encodable as protobuf or JSON
//! - Pipeline envelopes carrying correlation id and trace context
//! - The persisted video record and its update set

pub mod error;
pub mod event;
pub mod messages;
pub mod utils;
pub mod video;

// Re-export common types
pub use error::{DecodeError, DecodeResult};
pub use event::{CorrelationId, InboundEvent, OutboundEvent};
pub use messages::{
    encode_message, parse_message, MessageType, PayloadFormat, TgSendMessage,
    VideoDownloadedMessage, PARAM_FILE_URL, PARAM_PHOTO_URL,
};
pub use video::{StoredVideo, VideoUpdate};
