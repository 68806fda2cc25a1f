//! Opaque message payloads
//!
//! The broker never interprets a payload. The helpers here only exist so
//! applications can move text, raw bytes, JSON or an error through a message.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Value carried by a [`Message`](crate::Message)
#[derive(Clone, Default)]
pub enum Payload {
    /// Nothing attached
    #[default]
    Empty,
    /// Raw bytes (text is stored as UTF-8 bytes)
    Bytes(Bytes),
    /// Structured JSON value
    Json(serde_json::Value),
    /// An error travelling in place of a result
    Error(Arc<dyn std::error::Error + Send + Sync>),
}

impl Payload {
    /// Wrap an error as a payload
    pub fn error(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Payload::Error(Arc::new(err))
    }

    /// Serialize `data` into a JSON payload
    pub fn json<T: Serialize>(data: &T) -> Result<Self, serde_json::Error> {
        Ok(Payload::Json(serde_json::to_value(data)?))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Payload::Empty)
    }

    /// Get the payload as a string (if it is valid UTF-8 bytes)
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Payload::Bytes(bytes) => std::str::from_utf8(bytes).ok(),
            _ => None,
        }
    }

    /// Deserialize the payload as JSON, from either a JSON value or raw bytes
    pub fn as_json<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        match self {
            Payload::Json(value) => T::deserialize(value),
            Payload::Bytes(bytes) => serde_json::from_slice(bytes),
            _ => T::deserialize(serde_json::Value::Null),
        }
    }

    /// The carried error, if this payload is one
    pub fn as_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Payload::Error(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl PartialEq for Payload {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Payload::Empty, Payload::Empty) => true,
            (Payload::Bytes(a), Payload::Bytes(b)) => a == b,
            (Payload::Json(a), Payload::Json(b)) => a == b,
            (Payload::Error(a), Payload::Error(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Empty => f.write_str("Empty"),
            Payload::Bytes(bytes) => match std::str::from_utf8(bytes) {
                Ok(text) => f.debug_tuple("Bytes").field(&text).finish(),
                Err(_) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            },
            Payload::Json(value) => f.debug_tuple("Json").field(value).finish(),
            Payload::Error(err) => f.debug_tuple("Error").field(&err.to_string()).finish(),
        }
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Empty => f.write_str("<empty>"),
            Payload::Bytes(bytes) => match std::str::from_utf8(bytes) {
                Ok(text) => f.write_str(text),
                Err(_) => write!(f, "<{} bytes>", bytes.len()),
            },
            Payload::Json(value) => write!(f, "{}", value),
            Payload::Error(err) => write!(f, "error: {}", err),
        }
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Bytes(Bytes::copy_from_slice(text.as_bytes()))
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Bytes(Bytes::from(text))
    }
}

impl From<Bytes> for Payload {
    fn from(bytes: Bytes) -> Self {
        Payload::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Bytes(Bytes::from(bytes))
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Payload::Json(value)
    }
}
