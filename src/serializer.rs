//! Body serialization.
//!
//! The pipeline moves bodies as [`serde_json::Value`] and lets a [`Serializer`]
//! decide the wire form. [`JsonSerializer`] is used unless another one is
//! configured on the client.

use crate::error::SerializationError;
use bytes::Bytes;

/// An opaque serialized payload and its media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Content {
    bytes: Bytes,
    content_type: String,
}

impl Content {
    /// Wraps serialized bytes.
    pub fn new(bytes: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type.into(),
        }
    }

    /// The serialized bytes.
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// The media type, sent as `content-type`.
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// The payload length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Converts bodies to and from their wire form.
pub trait Serializer: Send + Sync {
    /// The media type this serializer produces.
    fn content_type(&self) -> &str;

    /// Serializes a request body.
    fn serialize(&self, value: &serde_json::Value) -> Result<Content, SerializationError>;

    /// Parses a response body.
    fn deserialize(&self, content: &[u8]) -> Result<serde_json::Value, SerializationError>;
}

/// JSON via `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn content_type(&self) -> &str {
        "application/json"
    }

    fn serialize(&self, value: &serde_json::Value) -> Result<Content, SerializationError> {
        let bytes =
            serde_json::to_vec(value).map_err(|e| SerializationError::Serialize(e.to_string()))?;
        Ok(Content::new(bytes, self.content_type()))
    }

    fn deserialize(&self, content: &[u8]) -> Result<serde_json::Value, SerializationError> {
        serde_json::from_slice(content).map_err(|e| SerializationError::Deserialize {
            message: e.to_string(),
            raw_response: String::from_utf8_lossy(content).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_serializer_writes_compact_json() {
        let content = JsonSerializer.serialize(&json!({ "id": 1 })).unwrap();
        assert_eq!(content.bytes().as_ref(), br#"{"id":1}"#);
        assert_eq!(content.content_type(), "application/json");
    }

    #[test]
    fn json_serializer_keeps_raw_body_on_failure() {
        let err = JsonSerializer.deserialize(b"not json").unwrap_err();
        match err {
            SerializationError::Deserialize { raw_response, .. } => {
                assert_eq!(raw_response, "not json")
            }
            other => panic!("Expected Deserialize, got {:?}", other),
        }
    }
}
