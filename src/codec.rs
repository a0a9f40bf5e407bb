//! Payload encoding for storage backends.

use serde_json::Value;

use crate::error::Result;

/// Encodes command payloads into the bytes a backend persists.
pub trait PayloadCodec: Send + Sync {
    fn name(&self) -> &'static str;

    fn encode(&self, value: &Value) -> Result<Vec<u8>>;

    fn decode(&self, bytes: &[u8]) -> Result<Value>;

    /// True when encoded payloads are UTF-8 JSON text, which lets backends
    /// evaluate event-data predicates natively.
    fn is_json_text(&self) -> bool {
        false
    }
}

/// JSON text codec, the default.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl PayloadCodec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn is_json_text(&self) -> bool {
        true
    }
}
