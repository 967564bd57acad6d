//! One process's view of the game.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use peril_protocol::{ArmyMove, Location, Player};

use crate::GameError;

/// The local player, the opponents as last seen, and the pause flag.
///
/// Opponent entries are refreshed from the snapshots carried by incoming
/// events. Only coordinator transitions and local commands mutate this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameState {
    me: Player,
    opponents: BTreeMap<String, Player>,
    paused: bool,
}

impl GameState {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            me: Player::new(username),
            opponents: BTreeMap::new(),
            paused: false,
        }
    }

    pub fn username(&self) -> &str {
        &self.me.username
    }

    pub fn me(&self) -> &Player {
        &self.me
    }

    pub fn opponent(&self, username: &str) -> Option<&Player> {
        self.opponents.get(username)
    }

    pub fn opponents(&self) -> impl Iterator<Item = &Player> {
        self.opponents.values()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub(crate) fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub(crate) fn me_mut(&mut self) -> &mut Player {
        &mut self.me
    }

    /// Replaces the stored view of an opponent and returns it for editing.
    pub(crate) fn refresh_opponent(&mut self, snapshot: &Player) -> &mut Player {
        let entry = self
            .opponents
            .entry(snapshot.username.clone())
            .or_default();
        entry.clone_from(snapshot);
        entry
    }

    /// `spawn <location> <units>`: places new units for the local player.
    ///
    /// # Errors
    /// Refused while paused or for a zero count.
    pub fn spawn(&mut self, location: Location, units: u32) -> Result<(), GameError> {
        if self.paused {
            return Err(GameError::Paused);
        }
        if units == 0 {
            return Err(GameError::ZeroUnits);
        }
        self.me.add_units(location, units);
        tracing::info!(%location, units, "units spawned");
        Ok(())
    }

    /// `move <from> <to> <units>`: validates a move and builds the event.
    ///
    /// The state is not changed here. The move takes effect when its own
    /// echo comes back through the army-moves queue.
    ///
    /// # Errors
    /// Refused while paused, for a zero count, for `from == to`, or when
    /// fewer than `units` units are at `from`.
    pub fn plan_move(
        &self,
        from: Location,
        to: Location,
        units: u32,
    ) -> Result<ArmyMove, GameError> {
        if self.paused {
            return Err(GameError::Paused);
        }
        if units == 0 {
            return Err(GameError::ZeroUnits);
        }
        if from == to {
            return Err(GameError::SameLocation(from));
        }
        let have = self.me.units_at(from);
        if have < units {
            return Err(GameError::InsufficientUnits {
                location: from,
                have,
                need: units,
            });
        }
        Ok(ArmyMove {
            player: self.me.clone(),
            from,
            to,
            units,
        })
    }

    /// `status`: a human-readable summary of the board.
    pub fn status(&self) -> String {
        let mut out = String::new();
        let suffix = if self.paused { " (paused)" } else { "" };
        let _ = writeln!(out, "Player {}{suffix}", self.me.username);
        render_units(&mut out, &self.me);
        for opponent in self.opponents.values() {
            let _ = writeln!(out, "Opponent {}", opponent.username);
            render_units(&mut out, opponent);
        }
        out
    }
}

fn render_units(out: &mut String, player: &Player) {
    if player.units.is_empty() {
        let _ = writeln!(out, "  no units");
    }
    for (location, count) in &player.units {
        let _ = writeln!(out, "  {location}: {count}");
    }
    for (location, opponent) in &player.wars {
        let _ = writeln!(out, "  at war in {location} with {opponent}");
    }
}
