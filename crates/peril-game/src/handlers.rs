//! Subscriber handlers for each event kind.
//!
//! A handler locks the shared state only for the pure transition, then
//! executes the returned intents and maps the result to an
//! [`AckDecision`]. A resolved war is committed under a second lock, and
//! only after its log went out.

use std::sync::Arc;

use peril_protocol::routing::{
    self, EXCHANGE_TOPIC, GAME_LOG_SLUG, WAR_RECOGNITIONS_PREFIX,
};
use peril_protocol::{ArmyMove, GameLog, PlayingState, RecognitionOfWar};
use peril_pubsub::{AckDecision, Handler, Publish};
use tokio::sync::Mutex;

use crate::coordinator::{self, Intent, MoveOutcome, WarOutcome};
use crate::{GameError, GameState, LogWriter};

/// Game state shared by the move, war and pause loops.
pub type SharedState = Arc<Mutex<GameState>>;

/// Publishes every intent in order, stopping at the first failure.
async fn execute<P: Publish>(
    publisher: &P,
    username: &str,
    intents: Vec<Intent>,
) -> Result<(), GameError> {
    for intent in intents {
        match intent {
            Intent::PublishWar(war) => {
                let key = routing::addressed(WAR_RECOGNITIONS_PREFIX, &war.attacker.username);
                publisher.publish(EXCHANGE_TOPIC, &key, &war).await?;
                tracing::info!(routing_key = %key, location = %war.location, "war declared");
            }
            Intent::PublishLog { message } => {
                let key = routing::addressed(GAME_LOG_SLUG, username);
                publisher
                    .publish(EXCHANGE_TOPIC, &key, &GameLog::now(username, message))
                    .await?;
            }
        }
    }
    Ok(())
}

/// Handles `army_moves.*`.
pub struct MoveHandler<P> {
    state: SharedState,
    publisher: P,
}

impl<P: Publish> MoveHandler<P> {
    pub fn new(state: SharedState, publisher: P) -> Self {
        Self { state, publisher }
    }
}

impl<P: Publish> Handler<ArmyMove> for MoveHandler<P> {
    async fn handle(&self, mv: ArmyMove) -> AckDecision {
        let (transition, username) = {
            let mut state = self.state.lock().await;
            let t = coordinator::handle_move(&mut state, &mv);
            (t, state.username().to_string())
        };
        tracing::debug!(
            mover = %mv.player.username,
            from = %mv.from,
            to = %mv.to,
            units = mv.units,
            outcome = ?transition.outcome,
            "army move handled"
        );

        match transition.outcome {
            MoveOutcome::Safe => AckDecision::Accept,
            MoveOutcome::Invalid => {
                tracing::warn!(mover = %mv.player.username, "invalid move discarded");
                AckDecision::RejectDiscard
            }
            MoveOutcome::MakeWar => {
                match execute(&self.publisher, &username, transition.intents).await {
                    Ok(()) => AckDecision::Accept,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to publish war recognition");
                        AckDecision::RejectRequeue
                    }
                }
            }
        }
    }
}

/// Handles the shared `war` queue.
pub struct WarHandler<P> {
    state: SharedState,
    publisher: P,
}

impl<P: Publish> WarHandler<P> {
    pub fn new(state: SharedState, publisher: P) -> Self {
        Self { state, publisher }
    }
}

impl<P: Publish> Handler<RecognitionOfWar> for WarHandler<P> {
    async fn handle(&self, war: RecognitionOfWar) -> AckDecision {
        let (transition, username) = {
            let mut state = self.state.lock().await;
            let t = coordinator::handle_war(&state, &war);
            if t.intents.is_empty() {
                coordinator::apply_war(&mut state, &war, &t.outcome);
            }
            (t, state.username().to_string())
        };

        match transition.outcome {
            WarOutcome::NotInvolved => AckDecision::RejectRequeue,
            WarOutcome::NoUnits => {
                tracing::info!(location = %war.location, "no units left to defend, war dropped");
                AckDecision::RejectDiscard
            }
            WarOutcome::AttackerWon { .. }
            | WarOutcome::DefenderWon { .. }
            | WarOutcome::Draw { .. } => {
                match execute(&self.publisher, &username, transition.intents).await {
                    Ok(()) => {
                        let mut state = self.state.lock().await;
                        coordinator::apply_war(&mut state, &war, &transition.outcome);
                        tracing::info!(outcome = ?transition.outcome, location = %war.location, "war resolved");
                        AckDecision::Accept
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to publish war log, state left unchanged");
                        AckDecision::RejectRequeue
                    }
                }
            }
        }
    }
}

/// Handles `pause.<username>`.
pub struct PauseHandler {
    state: SharedState,
}

impl PauseHandler {
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }
}

impl Handler<PlayingState> for PauseHandler {
    async fn handle(&self, playing: PlayingState) -> AckDecision {
        let mut state = self.state.lock().await;
        coordinator::handle_pause(&mut state, &playing);
        tracing::info!(paused = playing.is_paused, "playing state changed");
        AckDecision::Accept
    }
}

/// Handles the server's `game_logs` queue.
pub struct LogHandler {
    writer: LogWriter,
}

impl LogHandler {
    pub fn new(writer: LogWriter) -> Self {
        Self { writer }
    }
}

impl Handler<GameLog> for LogHandler {
    async fn handle(&self, log: GameLog) -> AckDecision {
        match self.writer.write(&log).await {
            Ok(()) => {
                tracing::debug!(username = %log.username, "game log written");
                AckDecision::Accept
            }
            Err(e) => {
                tracing::warn!(error = %e, path = %self.writer.path().display(), "game log write failed");
                AckDecision::RejectRequeue
            }
        }
    }
}
