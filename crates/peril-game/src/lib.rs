//! Game layer for Peril.
//!
//! - [`GameState`]: one process's view of the world (its own player, its
//!   opponents as last seen, the pause flag). Local commands (`spawn`,
//!   `move`, `status`) live here.
//! - [`coordinator`]: pure transitions from (event, state) to
//!   (outcome, intents). No I/O.
//! - [`handlers`]: subscriber handlers that run a transition, execute its
//!   intents through a [`Publish`](peril_pubsub::Publish) implementation,
//!   and turn the result into an [`AckDecision`](peril_pubsub::AckDecision).
//! - [`LogWriter`]: the server side sink for game logs.

pub mod coordinator;
mod error;
pub mod handlers;
mod log_writer;
mod state;

pub use coordinator::{Intent, MoveOutcome, Transition, WarOutcome};
pub use error::GameError;
pub use handlers::{LogHandler, MoveHandler, PauseHandler, SharedState, WarHandler};
pub use log_writer::{LogWriter, format_entry};
pub use state::GameState;
