//! Wire protocol for Peril.
//!
//! This crate defines everything that travels through the broker:
//!
//! - **Types** ([`ArmyMove`], [`RecognitionOfWar`], [`PlayingState`],
//!   [`GameLog`], [`Player`]): the payloads players exchange.
//! - **Routing** ([`routing`]): exchange names, routing-key prefixes and
//!   the helpers that build addressed and wildcard keys.
//! - **Codecs** ([`Codec`], [`JsonCodec`], [`BincodeCodec`]): how payloads
//!   become bytes and back.
//! - **Events** ([`Event`]): ties each payload to its routing tag and the
//!   codec it travels with.
//!
//! # Architecture
//!
//! The protocol layer knows nothing about brokers, queues or game rules.
//!
//! ```text
//! Broker (bytes) → Protocol (typed events) → Game (state transitions)
//! ```

mod codec;
mod error;
mod event;
pub mod routing;
mod types;

pub use codec::Codec;
#[cfg(feature = "binary")]
pub use codec::BincodeCodec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::{CodecError, ProtocolError};
pub use event::Event;
pub use types::{
    ArmyMove, GameLog, Location, Player, PlayingState, RecognitionOfWar,
};
