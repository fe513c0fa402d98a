//! Opaque blob serialization capability.
//!
//! Job-data maps and calendars are persisted as opaque strings. The
//! encoding is supplied by the host so its notion of "serializable"
//! travels with it; the store only moves the strings around. The
//! default codec is JSON wrapped in base64.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde_json::Value;
use sprocket_core::Calendar;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum BlobError {
    /// A map value the codec cannot represent. `key` names the
    /// offending entry when known.
    #[error("value of property '{key}' is not serializable: {reason}")]
    Unserializable { key: String, reason: String },

    #[error("malformed blob: {0}")]
    Malformed(String),
}

/// Encodes and decodes the store's opaque payloads.
pub trait BlobCodec: Send + Sync {
    fn encode_map(&self, map: &BTreeMap<String, Value>) -> Result<String, BlobError>;

    fn decode_map(&self, blob: &str) -> Result<BTreeMap<String, Value>, BlobError>;

    fn encode_calendar(&self, calendar: &Calendar) -> Result<String, BlobError>;

    fn decode_calendar(&self, name: &str, blob: &str) -> Result<Calendar, BlobError>;
}

/// JSON-in-base64 codec.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonBlobCodec;

impl BlobCodec for JsonBlobCodec {
    fn encode_map(&self, map: &BTreeMap<String, Value>) -> Result<String, BlobError> {
        let bytes = serde_json::to_vec(map).map_err(|e| {
            let key = map
                .iter()
                .find(|(_, v)| serde_json::to_vec(v).is_err())
                .map(|(k, _)| k.clone())
                .unwrap_or_default();
            BlobError::Unserializable {
                key,
                reason: e.to_string(),
            }
        })?;
        Ok(BASE64.encode(bytes))
    }

    fn decode_map(&self, blob: &str) -> Result<BTreeMap<String, Value>, BlobError> {
        let bytes = BASE64
            .decode(blob)
            .map_err(|e| BlobError::Malformed(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| BlobError::Malformed(e.to_string()))
    }

    fn encode_calendar(&self, calendar: &Calendar) -> Result<String, BlobError> {
        Ok(BASE64.encode(calendar.data()))
    }

    fn decode_calendar(&self, name: &str, blob: &str) -> Result<Calendar, BlobError> {
        let data = BASE64
            .decode(blob)
            .map_err(|e| BlobError::Malformed(e.to_string()))?;
        Ok(Calendar::new(name, data))
    }
}
