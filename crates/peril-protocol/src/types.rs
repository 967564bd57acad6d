//! Core payload types for Peril's wire format.
//!
//! Every type here is serialized by one of the codecs and published
//! through the broker. They derive `PartialEq` so tests can assert
//! round trips, and `Clone` because snapshots of a player are embedded
//! in several events.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Location
// ---------------------------------------------------------------------------

/// A territory on the board.
///
/// Serialized lowercase (`"europe"`), which is also how players type it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Location {
    Americas,
    Europe,
    Africa,
    Asia,
    Antarctica,
    Australia,
}

impl Location {
    /// Every location, in board order.
    pub const ALL: [Location; 6] = [
        Self::Americas,
        Self::Europe,
        Self::Africa,
        Self::Asia,
        Self::Antarctica,
        Self::Australia,
    ];

    /// The lowercase name used on the wire and in commands.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Americas => "americas",
            Self::Europe => "europe",
            Self::Africa => "africa",
            Self::Asia => "asia",
            Self::Antarctica => "antarctica",
            Self::Australia => "australia",
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Location {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|loc| loc.as_str() == lower)
            .ok_or_else(|| {
                ProtocolError::InvalidMessage(format!("unknown location: {s}"))
            })
    }
}

// ---------------------------------------------------------------------------
// Player
// ---------------------------------------------------------------------------

/// A player's identity, army and open wars.
///
/// `units` maps a location to how many units the player holds there.
/// Only positive counts are stored, so an absent key means "no units".
/// `wars` maps a contested location to the opponent fighting there, from
/// the moment the war is declared until it is resolved.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Player {
    pub username: String,
    #[serde(default)]
    pub units: BTreeMap<Location, u32>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub wars: BTreeMap<Location, String>,
}

impl Player {
    /// Creates a player with no units.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            units: BTreeMap::new(),
            wars: BTreeMap::new(),
        }
    }

    /// Number of units this player holds at `location`.
    pub fn units_at(&self, location: Location) -> u32 {
        self.units.get(&location).copied().unwrap_or(0)
    }

    /// Total units across every location.
    pub fn total_units(&self) -> u32 {
        self.units
            .values()
            .fold(0u32, |total, &n| total.saturating_add(n))
    }

    /// Adds `count` units at `location`. Saturates instead of overflowing.
    pub fn add_units(&mut self, location: Location, count: u32) {
        if count == 0 {
            return;
        }
        let slot = self.units.entry(location).or_insert(0);
        *slot = slot.saturating_add(count);
    }

    /// Removes `count` units from `location`.
    ///
    /// Returns `false` (and changes nothing) if fewer than `count` units
    /// are there.
    pub fn remove_units(&mut self, location: Location, count: u32) -> bool {
        let held = self.units_at(location);
        if held < count {
            return false;
        }
        if held == count {
            self.units.remove(&location);
        } else {
            self.units.insert(location, held - count);
        }
        true
    }

    /// Removes every unit at `location`, returning how many there were.
    pub fn clear_location(&mut self, location: Location) -> u32 {
        self.units.remove(&location).unwrap_or(0)
    }

    /// Moves `count` units from one location to another.
    ///
    /// Returns `false` (and changes nothing) if the source lacks the units.
    pub fn transfer(&mut self, from: Location, to: Location, count: u32) -> bool {
        if !self.remove_units(from, count) {
            return false;
        }
        self.add_units(to, count);
        true
    }

    /// Records an open war against `opponent` at `location`.
    pub fn join_war(&mut self, location: Location, opponent: impl Into<String>) {
        self.wars.insert(location, opponent.into());
    }

    /// Closes the war at `location`, returning the opponent if one was open.
    pub fn leave_war(&mut self, location: Location) -> Option<String> {
        self.wars.remove(&location)
    }

    pub fn at_war(&self, location: Location) -> bool {
        self.wars.contains_key(&location)
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// A player moving units between two locations.
///
/// `player` is the mover's snapshot taken *before* the move, so a
/// receiver can replay the transfer on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmyMove {
    pub player: Player,
    pub from: Location,
    pub to: Location,
    pub units: u32,
}

/// A declared conflict waiting to be resolved by the defender's process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognitionOfWar {
    pub attacker: Player,
    pub defender: Player,
    pub location: Location,
}

/// Pause/resume broadcast from the server. Most recent wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayingState {
    pub is_paused: bool,
}

/// One entry for the central game log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameLog {
    pub current_time: DateTime<Utc>,
    pub username: String,
    pub message: String,
}

impl GameLog {
    /// Creates a log entry stamped with the current wall-clock time.
    pub fn now(username: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            current_time: Utc::now(),
            username: username.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_parses_case_insensitively() {
        assert_eq!("Europe".parse::<Location>().unwrap(), Location::Europe);
        assert_eq!(" asia ".parse::<Location>().unwrap(), Location::Asia);
        assert!("atlantis".parse::<Location>().is_err());
    }

    #[test]
    fn test_location_display_matches_wire_name() {
        for loc in Location::ALL {
            let json = serde_json::to_string(&loc).unwrap();
            assert_eq!(json, format!("\"{loc}\""));
        }
    }

    #[test]
    fn test_player_add_and_remove_units() {
        let mut p = Player::new("alice");
        p.add_units(Location::Africa, 5);
        p.add_units(Location::Africa, 2);
        assert_eq!(p.units_at(Location::Africa), 7);

        assert!(!p.remove_units(Location::Africa, 8));
        assert_eq!(p.units_at(Location::Africa), 7);

        assert!(p.remove_units(Location::Africa, 7));
        assert!(p.units.is_empty(), "zero counts are not stored");
    }

    #[test]
    fn test_player_add_zero_units_stores_nothing() {
        let mut p = Player::new("alice");
        p.add_units(Location::Asia, 0);
        assert!(p.units.is_empty());
    }

    #[test]
    fn test_player_transfer() {
        let mut p = Player::new("alice");
        p.add_units(Location::Europe, 5);
        assert!(p.transfer(Location::Europe, Location::Asia, 3));
        assert_eq!(p.units_at(Location::Europe), 2);
        assert_eq!(p.units_at(Location::Asia), 3);
        assert!(!p.transfer(Location::Europe, Location::Asia, 3));
        assert_eq!(p.total_units(), 5);
    }

    #[test]
    fn test_player_total_units_saturates() {
        let mut p = Player::new("alice");
        p.add_units(Location::Europe, u32::MAX);
        p.add_units(Location::Asia, 7);
        assert_eq!(p.total_units(), u32::MAX);
    }

    #[test]
    fn test_player_war_participations() {
        let mut p = Player::new("alice");
        p.join_war(Location::Asia, "bob");
        assert!(p.at_war(Location::Asia));
        assert!(!p.at_war(Location::Europe));
        assert_eq!(p.leave_war(Location::Asia).as_deref(), Some("bob"));
        assert_eq!(p.leave_war(Location::Asia), None);
    }

    #[test]
    fn test_player_without_wars_omits_field() {
        let json = serde_json::to_value(Player::new("bob")).unwrap();
        assert!(json.get("wars").is_none());
    }

    #[test]
    fn test_player_clear_location() {
        let mut p = Player::new("alice");
        p.add_units(Location::Australia, 4);
        assert_eq!(p.clear_location(Location::Australia), 4);
        assert_eq!(p.clear_location(Location::Australia), 0);
    }

    #[test]
    fn test_player_missing_units_field_defaults_empty() {
        let p: Player = serde_json::from_str(r#"{"username":"bob"}"#).unwrap();
        assert_eq!(p, Player::new("bob"));
    }

    #[test]
    fn test_army_move_json_format() {
        let mut alice = Player::new("alice");
        alice.add_units(Location::Europe, 5);
        let mv = ArmyMove {
            player: alice,
            from: Location::Europe,
            to: Location::Africa,
            units: 3,
        };
        let json: serde_json::Value = serde_json::to_value(&mv).unwrap();
        assert_eq!(json["player"]["username"], "alice");
        assert_eq!(json["player"]["units"]["europe"], 5);
        assert_eq!(json["from"], "europe");
        assert_eq!(json["to"], "africa");
        assert_eq!(json["units"], 3);
    }
}
