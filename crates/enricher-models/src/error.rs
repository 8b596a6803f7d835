//! Payload decoding errors.

use thiserror::Error;

pub type DecodeResult<T> = Result<T, DecodeError>;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid protobuf payload: {0}")]
    Protobuf(#[from] prost::DecodeError),

    #[error("Empty payload")]
    Empty,

    #[error("Missing header: {0}")]
    MissingHeader(String),

    #[error("Unknown payload format: {0}")]
    UnknownFormat(String),
}
