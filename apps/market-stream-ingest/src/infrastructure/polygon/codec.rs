//! Stream Codec
//!
//! JSON encoding and decoding for the vendor WebSocket.
//!
//! Inbound frames are a single object or an array of objects. Each element is
//! decoded independently: an element that fails to decode is logged and
//! skipped without discarding its siblings.

use crate::domain::streaming::FrequencyKind;
use crate::infrastructure::metrics;
use crate::infrastructure::polygon::messages::{ControlRequest, PolygonMessage};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame is neither an object nor an array.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),
}

/// JSON codec for one channel.
#[derive(Debug, Clone, Copy)]
pub struct JsonCodec {
    frequency: FrequencyKind,
}

impl JsonCodec {
    /// Create a codec for a channel; the frequency only labels diagnostics.
    #[must_use]
    pub const fn new(frequency: FrequencyKind) -> Self {
        Self { frequency }
    }

    /// Decode a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not valid JSON or not an object/array.
    /// Individual array elements that fail to decode are skipped.
    pub fn decode(&self, text: &str) -> Result<Vec<PolygonMessage>, CodecError> {
        let value: serde_json::Value = serde_json::from_str(text.trim())?;
        match value {
            serde_json::Value::Array(elements) => Ok(elements
                .into_iter()
                .filter_map(|element| self.decode_element(element))
                .collect()),
            element @ serde_json::Value::Object(_) => {
                Ok(self.decode_element(element).into_iter().collect())
            }
            other => Err(CodecError::InvalidFormat(format!(
                "expected JSON array or object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Encode an outbound control request.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self, request: &ControlRequest) -> Result<String, CodecError> {
        Ok(serde_json::to_string(request)?)
    }

    fn decode_element(&self, element: serde_json::Value) -> Option<PolygonMessage> {
        let event = element
            .get("ev")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("<missing>")
            .to_string();
        match serde_json::from_value::<PolygonMessage>(element) {
            Ok(message) => Some(message),
            Err(e) => {
                tracing::warn!(
                    frequency = %self.frequency,
                    event = %event,
                    error = %e,
                    "Skipping undecodable message"
                );
                metrics::record_parse_error(self.frequency);
                None
            }
        }
    }
}

const fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
