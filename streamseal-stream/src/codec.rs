//! Wire encoding for envelope-encrypted records.
//!
//! A record body is a JSON object carrying the wrapped data key next to the
//! ciphertext, both standard base64:
//!
//! ```text
//! { "key": "<base64 wrapped data key>", "data": "<base64 ciphertext>" }
//! ```
//!
//! Unknown fields are ignored so newer producers can add metadata without
//! breaking older consumers.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::error::{StreamError, StreamResult};

/// Wrapped data key plus the payload sealed under it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireRecord {
    #[serde(rename = "key", with = "base64_field")]
    pub wrapped_key: Vec<u8>,
    #[serde(rename = "data", with = "base64_field")]
    pub ciphertext: Vec<u8>,
}

impl WireRecord {
    pub fn new(wrapped_key: Vec<u8>, ciphertext: Vec<u8>) -> Self {
        Self {
            wrapped_key,
            ciphertext,
        }
    }

    /// Encodes this record as a transport body.
    pub fn to_bytes(&self) -> StreamResult<Vec<u8>> {
        encode(&self.wrapped_key, &self.ciphertext)
    }
}

/// Encodes a wrapped key and ciphertext into a self-contained record body.
pub fn encode(wrapped_key: &[u8], ciphertext: &[u8]) -> StreamResult<Vec<u8>> {
    #[derive(Serialize)]
    struct Borrowed<'a> {
        #[serde(serialize_with = "base64_field::serialize")]
        key: &'a [u8],
        #[serde(serialize_with = "base64_field::serialize")]
        data: &'a [u8],
    }

    Ok(serde_json::to_vec(&Borrowed {
        key: wrapped_key,
        data: ciphertext,
    })?)
}

/// Decodes a record body produced by [`encode`].
///
/// Fails with [`StreamError::MalformedRecord`] for empty input, invalid
/// JSON, missing or non-string fields, and invalid base64.
pub fn decode(bytes: &[u8]) -> StreamResult<WireRecord> {
    if bytes.is_empty() {
        return Err(StreamError::MalformedRecord("empty record body".into()));
    }

    serde_json::from_slice(bytes).map_err(|e| StreamError::MalformedRecord(e.to_string()))
}

mod base64_field {
    use super::{Engine, STANDARD};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| serde::de::Error::custom(format!("invalid base64: {e}")))
    }
}
