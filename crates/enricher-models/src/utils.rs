//! Serde helpers for the protobuf JSON mapping.
//!
//! The canonical JSON mapping writes 64-bit integers as strings and accepts
//! either strings or numbers when reading.

use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serializer};

/// 64-bit integers: string on output, string or number on input.
pub mod proto_int {
    use super::*;

    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Display,
        S: Serializer,
    {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        T: FromStr + Deserialize<'de>,
        T::Err: Display,
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr<T> {
            Number(T),
            Text(String),
        }

        match Repr::<T>::deserialize(deserializer)? {
            Repr::Number(value) => Ok(value),
            Repr::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Checks whether a body looks like a JSON object.
pub fn looks_like_json(body: &[u8]) -> bool {
    body.iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|b| *b == b'{')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        #[serde(with = "proto_int")]
        value: i64,
    }

    #[test]
    fn test_proto_int_accepts_number_and_string() {
        let from_number: Sample = serde_json::from_str(r#"{"value": 42}"#).unwrap();
        let from_string: Sample = serde_json::from_str(r#"{"value": "42"}"#).unwrap();

        assert_eq!(from_number, Sample { value: 42 });
        assert_eq!(from_string, Sample { value: 42 });
    }

    #[test]
    fn test_proto_int_writes_string() {
        let json = serde_json::to_string(&Sample { value: -7 }).unwrap();
        assert_eq!(json, r#"{"value":"-7"}"#);
    }

    #[test]
    fn test_proto_int_rejects_garbage() {
        assert!(serde_json::from_str::<Sample>(r#"{"value": "abc"}"#).is_err());
    }

    #[test]
    fn test_looks_like_json() {
        assert!(looks_like_json(b"  {\"a\":1}"));
        assert!(!looks_like_json(&[0x0a, 0x03, b'a', b'b', b'c']));
        assert!(!looks_like_json(b""));
    }
}
