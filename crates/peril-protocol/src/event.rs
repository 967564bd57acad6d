//! The [`Event`] trait: one payload type, one routing tag, one codec.
//!
//! Subscribers resolve the decoder for a queue from the event type at
//! setup time, so the consumption loop never inspects types at runtime.

use serde::{de::DeserializeOwned, Serialize};

use crate::codec::Codec;
#[cfg(feature = "binary")]
use crate::BincodeCodec;
#[cfg(feature = "json")]
use crate::JsonCodec;
use crate::routing;
use crate::types::{ArmyMove, GameLog, PlayingState, RecognitionOfWar};

/// A payload that travels through the broker.
///
/// - `KIND` is the event-type tag: the first segment of every routing key
///   and queue name for this event.
/// - `Codec` is the wire format for this kind of message.
pub trait Event: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Event-type tag (`army_moves`, `war`, ...).
    const KIND: &'static str;

    /// The codec this event is encoded with.
    type Codec: Codec + Default;

    /// Encodes the event with its codec.
    fn encode(&self) -> Result<Vec<u8>, crate::ProtocolError> {
        Self::Codec::default().encode(self)
    }

    /// Decodes an event with its codec.
    fn decode(data: &[u8]) -> Result<Self, crate::ProtocolError> {
        Self::Codec::default().decode(data)
    }

    /// The MIME type published alongside the encoded bytes.
    fn content_type() -> &'static str {
        Self::Codec::default().content_type()
    }
}

#[cfg(feature = "json")]
impl Event for ArmyMove {
    const KIND: &'static str = routing::ARMY_MOVES_PREFIX;
    type Codec = JsonCodec;
}

#[cfg(feature = "json")]
impl Event for RecognitionOfWar {
    const KIND: &'static str = routing::WAR_RECOGNITIONS_PREFIX;
    type Codec = JsonCodec;
}

#[cfg(feature = "json")]
impl Event for PlayingState {
    const KIND: &'static str = routing::PAUSE_KEY;
    type Codec = JsonCodec;
}

#[cfg(feature = "binary")]
impl Event for GameLog {
    const KIND: &'static str = routing::GAME_LOG_SLUG;
    type Codec = BincodeCodec;
}
