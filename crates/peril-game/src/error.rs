//! Error types for the game layer.

use peril_protocol::Location;
use peril_pubsub::PubSubError;

/// Errors returned by local commands and intent execution.
///
/// Event handlers never return these to the subscriber; they map them to
/// an [`AckDecision`](peril_pubsub::AckDecision).
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    /// Commands that change the board are refused while paused.
    #[error("the game is paused")]
    Paused,

    /// A command asked for zero units.
    #[error("unit count must be positive")]
    ZeroUnits,

    /// A move names the same location twice.
    #[error("cannot move from {0} to itself")]
    SameLocation(Location),

    /// The player does not hold enough units at the source location.
    #[error("not enough units in {location}: have {have}, need {need}")]
    InsufficientUnits {
        location: Location,
        have: u32,
        need: u32,
    },

    /// Publishing an intent failed.
    #[error(transparent)]
    Publish(#[from] PubSubError),

    /// Appending to the game log file failed.
    #[error("failed to write game log: {0}")]
    LogWrite(#[from] std::io::Error),
}
