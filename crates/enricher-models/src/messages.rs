//! Broker message schemas.
//!
//! Both messages are protobuf messages with a serde mapping that follows the
//! protobuf JSON conventions (lowerCamelCase names, 64-bit integers as
//! strings), so a message can travel either as canonical binary or as JSON.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use prost::Message;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, DecodeResult};
use crate::utils::looks_like_json;

/// Parameter key carrying the downloaded file location.
pub const PARAM_FILE_URL: &str = "file_url";
/// Parameter key carrying the thumbnail location.
pub const PARAM_PHOTO_URL: &str = "photo_url";

/// Content type for JSON payloads.
pub const CONTENT_TYPE_JSON: &str = "application/json";
/// Content type for protobuf payloads.
pub const CONTENT_TYPE_PROTOBUF: &str = "application/x-protobuf";

/// Emitted by the downloader once a video file is on disk.
#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VideoDownloadedMessage {
    #[prost(string, tag = "1")]
    pub path: String,

    #[prost(string, tag = "2")]
    pub title: String,

    /// Duration in seconds
    #[prost(double, tag = "3")]
    pub duration: f64,

    /// Upload timestamp (unix seconds)
    #[prost(int64, tag = "4")]
    #[serde(with = "crate::utils::proto_int")]
    pub timestamp: i64,

    /// File size in bytes
    #[prost(int64, tag = "5")]
    #[serde(with = "crate::utils::proto_int")]
    pub filesize: i64,

    #[prost(string, tag = "6")]
    pub thumbnail: String,

    #[prost(string, tag = "7")]
    #[serde(alias = "channel_url")]
    pub channel_url: String,

    #[prost(string, tag = "8")]
    #[serde(alias = "channel_id")]
    pub channel_id: String,

    #[prost(string, tag = "9")]
    pub channel: String,

    /// Source platform video id
    #[prost(string, tag = "10")]
    pub id: String,
}

/// Kind of Telegram message to send.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum MessageType {
    Text = 0,
    Image = 1,
    Video = 2,
}

impl MessageType {
    /// Name used by the JSON mapping.
    pub fn as_str_name(&self) -> &'static str {
        match self {
            MessageType::Text => "TEXT",
            MessageType::Image => "IMAGE",
            MessageType::Video => "VIDEO",
        }
    }

    pub fn from_str_name(name: &str) -> Option<Self> {
        match name {
            "TEXT" => Some(MessageType::Text),
            "IMAGE" => Some(MessageType::Image),
            "VIDEO" => Some(MessageType::Video),
            _ => None,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str_name())
    }
}

/// Request for the Telegram dispatcher to notify a user.
#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TgSendMessage {
    #[prost(string, tag = "1")]
    pub text: String,

    #[prost(uint64, tag = "2")]
    #[serde(with = "crate::utils::proto_int", alias = "user_id")]
    pub user_id: u64,

    #[prost(enumeration = "MessageType", tag = "3")]
    #[serde(with = "message_type_name")]
    pub r#type: i32,

    #[prost(map = "string, string", tag = "4")]
    pub params: HashMap<String, String>,
}

impl TgSendMessage {
    /// Build an image message pointing at a downloaded file and its thumbnail.
    pub fn image(
        text: impl Into<String>,
        user_id: u64,
        file_url: impl Into<String>,
        photo_url: impl Into<String>,
    ) -> Self {
        let mut params = HashMap::with_capacity(2);
        params.insert(PARAM_FILE_URL.to_string(), file_url.into());
        params.insert(PARAM_PHOTO_URL.to_string(), photo_url.into());

        Self {
            text: text.into(),
            user_id,
            r#type: MessageType::Image as i32,
            params,
        }
    }

    /// Decoded message kind, `None` for values this build does not know.
    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::try_from(self.r#type).ok()
    }
}

/// Enum values as names in JSON, names or numbers accepted on input.
mod message_type_name {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::MessageType;

    pub fn serialize<S: Serializer>(value: &i32, serializer: S) -> Result<S::Ok, S::Error> {
        match MessageType::try_from(*value) {
            Ok(kind) => serializer.serialize_str(kind.as_str_name()),
            Err(_) => serializer.serialize_i32(*value),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i32, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(i32),
            Name(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Number(value) => Ok(value),
            Repr::Name(name) => MessageType::from_str_name(&name)
                .map(|kind| kind as i32)
                .ok_or_else(|| serde::de::Error::custom(format!("unknown message type: {name}"))),
        }
    }
}

/// Payload encoding on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayloadFormat {
    /// Decide per message from content type, then body shape
    #[default]
    Auto,
    Json,
    Protobuf,
}

impl PayloadFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadFormat::Auto => "auto",
            PayloadFormat::Json => "json",
            PayloadFormat::Protobuf => "protobuf",
        }
    }

    /// Resolve `Auto` against a concrete delivery.
    pub fn resolve(self, content_type: Option<&str>, body: &[u8]) -> PayloadFormat {
        match self {
            PayloadFormat::Auto => match content_type {
                Some(ct) if ct.contains("json") => PayloadFormat::Json,
                Some(ct) if ct.contains("protobuf") || ct.contains("proto") => {
                    PayloadFormat::Protobuf
                }
                _ if looks_like_json(body) => PayloadFormat::Json,
                _ => PayloadFormat::Protobuf,
            },
            other => other,
        }
    }

    /// Content type written on outgoing messages. `Auto` publishes JSON.
    pub fn content_type(&self) -> &'static str {
        match self {
            PayloadFormat::Protobuf => CONTENT_TYPE_PROTOBUF,
            PayloadFormat::Auto | PayloadFormat::Json => CONTENT_TYPE_JSON,
        }
    }
}

impl FromStr for PayloadFormat {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" | "" => Ok(PayloadFormat::Auto),
            "json" => Ok(PayloadFormat::Json),
            "protobuf" | "proto" | "binary" => Ok(PayloadFormat::Protobuf),
            other => Err(DecodeError::UnknownFormat(other.to_string())),
        }
    }
}

impl fmt::Display for PayloadFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Decode a message body. `format` must already be resolved or `Auto`.
pub fn parse_message<M>(body: &[u8], format: PayloadFormat) -> DecodeResult<M>
where
    M: Message + Default + DeserializeOwned,
{
    if body.is_empty() {
        return Err(DecodeError::Empty);
    }

    match format.resolve(None, body) {
        PayloadFormat::Json => Ok(serde_json::from_slice(body)?),
        _ => Ok(M::decode(body)?),
    }
}

/// Encode a message body. `Auto` encodes JSON.
pub fn encode_message<M>(message: &M, format: PayloadFormat) -> serde_json::Result<Vec<u8>>
where
    M: Message + Serialize,
{
    match format {
        PayloadFormat::Protobuf => Ok(message.encode_to_vec()),
        PayloadFormat::Auto | PayloadFormat::Json => serde_json::to_vec(message),
    }
}
