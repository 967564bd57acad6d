//! Pure event transitions.
//!
//! Each function takes the local state and one event and returns the
//! outcome together with the side effects the caller must carry out.
//! Nothing here touches the network or the clock, so the same state and
//! event always give the same result.
//!
//! War resolution is split in two: [`handle_war`] only decides, and
//! [`apply_war`] commits the decision once its log has been published. A
//! war whose log could not be sent leaves the state untouched, so the
//! redelivered recognition resolves the same way.

use peril_protocol::{ArmyMove, PlayingState, RecognitionOfWar};

use crate::GameState;

/// A side effect requested by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Publish a war recognition to the mover's war inbox.
    PublishWar(RecognitionOfWar),
    /// Publish a game log line under the local player's name.
    PublishLog { message: String },
}

/// Result of a transition: what happened and what must be done about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition<O> {
    pub outcome: O,
    pub intents: Vec<Intent>,
}

impl<O> Transition<O> {
    fn quiet(outcome: O) -> Self {
        Self {
            outcome,
            intents: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Applied; nobody was in the way.
    Safe,
    /// Applied; the local player holds the destination, so war is declared.
    MakeWar,
    /// The mover does not hold the units it claims to move.
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarOutcome {
    /// The local player is not the defender. Someone else must resolve it.
    NotInvolved,
    /// The defender no longer holds the contested location.
    NoUnits,
    AttackerWon { winner: String, loser: String },
    DefenderWon { winner: String, loser: String },
    Draw { attacker: String, defender: String },
}

impl WarOutcome {
    /// The log line for a resolved war.
    pub fn log_message(&self) -> Option<String> {
        match self {
            Self::AttackerWon { winner, loser } | Self::DefenderWon { winner, loser } => {
                Some(format!("{winner} won a war against {loser}"))
            }
            Self::Draw { attacker, defender } => Some(format!(
                "A war between {attacker} and {defender} resulted in a draw"
            )),
            Self::NotInvolved | Self::NoUnits => None,
        }
    }
}

/// Applies an army move seen on the moves queue.
///
/// Our own echo updates `me`; anyone else's move refreshes our view of
/// them from the snapshot and replays the transfer on it.
pub fn handle_move(state: &mut GameState, mv: &ArmyMove) -> Transition<MoveOutcome> {
    let mover = mv.player.username.as_str();

    if mover == state.username() {
        if !state.me_mut().transfer(mv.from, mv.to, mv.units) {
            return Transition::quiet(MoveOutcome::Invalid);
        }
        return Transition::quiet(MoveOutcome::Safe);
    }

    if mv.player.units_at(mv.from) < mv.units {
        return Transition::quiet(MoveOutcome::Invalid);
    }
    let attacker = {
        let view = state.refresh_opponent(&mv.player);
        view.transfer(mv.from, mv.to, mv.units);
        view.clone()
    };

    if state.me().units_at(mv.to) == 0 {
        return Transition::quiet(MoveOutcome::Safe);
    }

    state.me_mut().join_war(mv.to, mover);
    Transition {
        outcome: MoveOutcome::MakeWar,
        intents: vec![Intent::PublishWar(RecognitionOfWar {
            attacker,
            defender: state.me().clone(),
            location: mv.to,
        })],
    }
}

/// Decides a war recognition if the local player is the defender.
///
/// Higher unit count at the location wins; equal counts draw. The state is
/// only read; pass the outcome to [`apply_war`] to commit it.
pub fn handle_war(state: &GameState, war: &RecognitionOfWar) -> Transition<WarOutcome> {
    if war.defender.username != state.username() {
        return Transition::quiet(WarOutcome::NotInvolved);
    }

    let location = war.location;
    let defending = state.me().units_at(location);
    if defending == 0 {
        return Transition::quiet(WarOutcome::NoUnits);
    }
    let attacking = war.attacker.units_at(location);

    let attacker = war.attacker.username.clone();
    let defender = state.username().to_string();
    let outcome = if attacking > defending {
        WarOutcome::AttackerWon {
            winner: attacker,
            loser: defender,
        }
    } else if defending > attacking {
        WarOutcome::DefenderWon {
            winner: defender,
            loser: attacker,
        }
    } else {
        WarOutcome::Draw { attacker, defender }
    };

    let intents = outcome
        .log_message()
        .map(|message| Intent::PublishLog { message })
        .into_iter()
        .collect();
    Transition { outcome, intents }
}

/// Commits a decided war: the loser's units at the location are wiped
/// (both sides on a draw) and the war participation is closed.
pub fn apply_war(state: &mut GameState, war: &RecognitionOfWar, outcome: &WarOutcome) {
    let location = war.location;
    match outcome {
        WarOutcome::NotInvolved => return,
        WarOutcome::NoUnits => {}
        WarOutcome::AttackerWon { .. } => {
            state.refresh_opponent(&war.attacker);
            state.me_mut().clear_location(location);
        }
        WarOutcome::DefenderWon { .. } => {
            state.refresh_opponent(&war.attacker).clear_location(location);
        }
        WarOutcome::Draw { .. } => {
            state.refresh_opponent(&war.attacker).clear_location(location);
            state.me_mut().clear_location(location);
        }
    }
    state.me_mut().leave_war(location);
}

/// Records a pause or resume. Most recent wins.
pub fn handle_pause(state: &mut GameState, playing: &PlayingState) -> Transition<()> {
    state.set_paused(playing.is_paused);
    Transition::quiet(())
}
