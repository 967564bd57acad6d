//! Exchange names, routing-key prefixes and key builders.
//!
//! Routing-key grammar:
//!
//! ```text
//! <event-type>             broadcast            pause
//! <event-type>.<username>  addressed            army_moves.alice
//! <event-type>.*           subscription match   army_moves.*
//! ```

use crate::ProtocolError;

/// Topic exchange for moves, war recognitions and game logs.
pub const EXCHANGE_TOPIC: &str = "peril_topic";
/// Direct exchange reserved for pause/resume.
pub const EXCHANGE_DIRECT: &str = "peril_direct";
/// Fanout exchange every queue dead-letters into.
pub const EXCHANGE_DEAD_LETTER: &str = "peril_dlx";
/// Durable queue bound to the dead-letter exchange.
pub const DEAD_LETTER_QUEUE: &str = "peril_dlq";

pub const ARMY_MOVES_PREFIX: &str = "army_moves";
pub const WAR_RECOGNITIONS_PREFIX: &str = "war";
pub const PAUSE_KEY: &str = "pause";
pub const GAME_LOG_SLUG: &str = "game_logs";

/// Builds `<prefix>.<username>`.
pub fn addressed(prefix: &str, username: &str) -> String {
    format!("{prefix}.{username}")
}

/// Builds `<prefix>.*`.
pub fn wildcard(prefix: &str) -> String {
    format!("{prefix}.*")
}

/// Checks that a username can be used as a single routing-key word.
///
/// # Errors
/// Returns `ProtocolError::InvalidMessage` for empty names and names
/// containing `.`, `*`, `#` or whitespace.
pub fn validate_username(username: &str) -> Result<(), ProtocolError> {
    if username.is_empty() {
        return Err(ProtocolError::InvalidMessage(
            "username must not be empty".into(),
        ));
    }
    if let Some(c) = username
        .chars()
        .find(|c| matches!(c, '.' | '*' | '#') || c.is_whitespace())
    {
        return Err(ProtocolError::InvalidMessage(format!(
            "username {username:?} contains reserved character {c:?}"
        )));
    }
    Ok(())
}
