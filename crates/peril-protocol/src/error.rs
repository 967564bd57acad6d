//! Error types for the protocol layer.
//!
//! Each Peril crate defines its own error enum. A `ProtocolError` always
//! means the problem is in (de)serialization or message validation, never
//! in the broker or the game rules.

/// The underlying serializer error, whichever codec produced it.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Produced by the JSON codec.
    #[cfg(feature = "json")]
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Produced by the binary codec.
    #[cfg(feature = "binary")]
    #[error(transparent)]
    Binary(#[from] bincode::Error),
}

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust value into bytes).
    #[error("encode failed: {0}")]
    Encode(#[source] CodecError),

    /// Deserialization failed (turning bytes into a Rust value).
    ///
    /// A message that fails here is a poison message: no amount of
    /// redelivery will make it parse.
    #[error("decode failed: {0}")]
    Decode(#[source] CodecError),

    /// The value is well-formed but violates protocol rules, e.g. a
    /// username containing routing-key metacharacters.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

impl ProtocolError {
    /// Returns `true` if this error came from decoding bytes.
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode(_))
    }
}
