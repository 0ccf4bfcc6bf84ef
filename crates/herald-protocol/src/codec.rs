//! Payload codec.
//!
//! Message bodies are the UTF-8 JSON encoding of the event payload, with no
//! framing and no envelope. Encoding is strict: a payload that cannot be
//! represented as JSON is an error, never a partial or lossy body.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Codec errors.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The payload could not be encoded.
    #[error("Encoding error: {0}")]
    Encode(#[source] serde_json::Error),

    /// The body is not valid JSON for the requested type.
    #[error("Decoding error: {0}")]
    Decode(#[source] serde_json::Error),
}

/// A value that can be sent as a message body.
///
/// Implemented for every `Serialize` type, so it can be used behind
/// `&dyn Payload` where generic methods are not available.
pub trait Payload: Send + Sync {
    /// Encode the payload to a JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be represented as JSON.
    fn encode(&self) -> Result<Bytes, CodecError>;
}

impl<T> Payload for T
where
    T: Serialize + Send + Sync + ?Sized,
{
    fn encode(&self) -> Result<Bytes, CodecError> {
        encode_payload(self)
    }
}

/// Encode a payload to a JSON body.
///
/// # Errors
///
/// Returns an error if the value's `Serialize` impl fails, or if it produces
/// a map with non-string keys.
pub fn encode_payload<T>(payload: &T) -> Result<Bytes, CodecError>
where
    T: Serialize + ?Sized,
{
    serde_json::to_vec(payload)
        .map(Bytes::from)
        .map_err(CodecError::Encode)
}

/// Decode a JSON body.
///
/// # Errors
///
/// Returns an error if the body is not valid JSON for `T`.
pub fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, CodecError> {
    serde_json::from_slice(body).map_err(CodecError::Decode)
}
