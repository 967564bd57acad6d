//! Codec trait and implementations for serializing/deserializing events.
//!
//! A "codec" converts between Rust types and raw bytes. Publishers and
//! subscribers don't care HOW an event is serialized: they only need
//! something that implements [`Codec`]. Two profiles ship:
//!
//! - [`JsonCodec`]: self-describing text, easy to inspect in a broker's
//!   management UI. Used for gameplay events.
//! - [`BincodeCodec`]: compact binary. Used for high-volume log records.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` lets a codec live inside long-running
/// consumption tasks on any runtime thread.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize + ?Sized>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// truncated, or don't match the expected type.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;

    /// The content type stamped on published messages.
    fn content_type(&self) -> &'static str;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ## Example
///
/// ```rust
/// use peril_protocol::{Codec, JsonCodec, PlayingState};
///
/// let codec = JsonCodec;
/// let bytes = codec.encode(&PlayingState { is_paused: true }).unwrap();
/// assert_eq!(bytes, br#"{"is_paused":true}"#);
///
/// let decoded: PlayingState = codec.decode(&bytes).unwrap();
/// assert!(decoded.is_paused);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize + ?Sized>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value)
            .map_err(|e| ProtocolError::Encode(e.into()))
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data)
            .map_err(|e| ProtocolError::Decode(e.into()))
    }

    fn content_type(&self) -> &'static str {
        "application/json"
    }
}

// ---------------------------------------------------------------------------
// BincodeCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses `bincode`'s compact binary encoding.
///
/// Not self-describing: both sides must agree on the exact type.
#[cfg(feature = "binary")]
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

#[cfg(feature = "binary")]
impl Codec for BincodeCodec {
    fn encode<T: Serialize + ?Sized>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError> {
        bincode::serialize(value)
            .map_err(|e| ProtocolError::Encode(e.into()))
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        bincode::deserialize(data)
            .map_err(|e| ProtocolError::Decode(e.into()))
    }

    fn content_type(&self) -> &'static str {
        "application/octet-stream"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Location, Player, PlayingState};

    #[cfg(feature = "json")]
    #[test]
    fn test_json_codec_is_human_readable() {
        let mut player = Player::new("alice");
        player.add_units(Location::Americas, 2);
        let bytes = JsonCodec.encode(&player).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains(r#""username":"alice""#));
        assert!(text.contains(r#""americas":2"#));
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_json_decode_garbage_is_decode_error() {
        let result: Result<PlayingState, _> =
            JsonCodec.decode(b"not json at all");
        assert!(result.unwrap_err().is_decode());
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_json_decode_wrong_shape_is_decode_error() {
        let result: Result<PlayingState, _> =
            JsonCodec.decode(br#"{"paused": "yes"}"#);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[cfg(feature = "binary")]
    #[test]
    fn test_bincode_is_smaller_than_json() {
        let mut player = Player::new("alice");
        player.add_units(Location::Europe, 12);
        player.add_units(Location::Asia, 3);
        let binary = BincodeCodec.encode(&player).unwrap();
        let json = JsonCodec.encode(&player).unwrap();
        assert!(binary.len() < json.len());
        let decoded: Player = BincodeCodec.decode(&binary).unwrap();
        assert_eq!(decoded, player);
    }

    #[cfg(feature = "binary")]
    #[test]
    fn test_bincode_truncated_input_is_decode_error() {
        let bytes = BincodeCodec.encode(&String::from("a long message")).unwrap();
        let result: Result<String, _> =
            BincodeCodec.decode(&bytes[..bytes.len() - 3]);
        assert!(result.unwrap_err().is_decode());
    }
}
