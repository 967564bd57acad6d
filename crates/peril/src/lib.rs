//! # Peril
//!
//! A multiplayer conquest game played entirely over a message broker.
//! Players broadcast army moves; each process resolves what those moves
//! mean for it, declares wars, and reports outcomes to a central log.
//!
//! This crate wires the layers together:
//!
//! - [`PerilClient`]: one player. Subscribes to moves, wars and pauses,
//!   and publishes the player's own moves.
//! - [`PerilServer`]: broadcasts pause/resume and collects game logs.
//! - [`PerilConfig`]: broker URL, log path and subscriber settings.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use peril::prelude::*;
//!
//! # async fn run() -> Result<(), PerilError> {
//! let broker = Arc::new(MemoryBroker::new().connect());
//! let config = PerilConfig::default();
//! let client = PerilClient::start(broker, "alice", &config).await?;
//! client.spawn(Location::Europe, 3).await?;
//! # Ok(())
//! # }
//! ```

mod client;
pub mod command;
mod config;
mod error;
mod server;
pub mod spam;

pub use client::PerilClient;
pub use config::PerilConfig;
pub use error::PerilError;
pub use server::PerilServer;

pub mod prelude {
    pub use crate::command::{ClientCommand, ServerCommand};
    pub use crate::{PerilClient, PerilConfig, PerilError, PerilServer};
    pub use peril_broker::{Broker, MemoryBroker};
    #[cfg(feature = "amqp")]
    pub use peril_broker::AmqpBroker;
    pub use peril_game::{GameState, MoveOutcome, WarOutcome};
    pub use peril_protocol::{ArmyMove, GameLog, Location, Player, PlayingState, RecognitionOfWar};
    pub use peril_pubsub::{AckDecision, SubscriberConfig};
}
