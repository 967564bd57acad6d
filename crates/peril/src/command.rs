//! REPL command parsing for the client and server binaries.

use std::str::FromStr;

use peril_protocol::Location;

use crate::PerilError;

pub const CLIENT_HELP: &str = "\
Possible commands:
* spawn <location> <units>
    example: spawn europe 3
* move <from> <to> <units>
    example: move europe asia 2
* status
* spam <n>
* help
* quit
Locations: americas, europe, africa, asia, antarctica, australia";

pub const SERVER_HELP: &str = "\
Possible commands:
* pause
* resume
* help
* quit";

/// One line typed at the player prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCommand {
    Spawn { location: Location, units: u32 },
    Move { from: Location, to: Location, units: u32 },
    Status,
    Spam(u32),
    Help,
    Quit,
}

/// One line typed at the server prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerCommand {
    Pause,
    Resume,
    Help,
    Quit,
}

fn usage(text: &str) -> PerilError {
    PerilError::Command(format!("usage: {text}"))
}

fn location(word: &str) -> Result<Location, PerilError> {
    word.parse()
        .map_err(|_| PerilError::Command(format!("unknown location: {word}")))
}

fn count(word: &str) -> Result<u32, PerilError> {
    word.parse()
        .map_err(|_| PerilError::Command(format!("not a number: {word}")))
}

impl FromStr for ClientCommand {
    type Err = PerilError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((first, args)) = words.split_first() else {
            return Err(PerilError::Command("empty command".into()));
        };
        match (first.to_ascii_lowercase().as_str(), args) {
            ("spawn", [loc, units]) => Ok(Self::Spawn {
                location: location(loc)?,
                units: count(units)?,
            }),
            ("spawn", _) => Err(usage("spawn <location> <units>")),
            ("move", [from, to, units]) => Ok(Self::Move {
                from: location(from)?,
                to: location(to)?,
                units: count(units)?,
            }),
            ("move", _) => Err(usage("move <from> <to> <units>")),
            ("status", []) => Ok(Self::Status),
            ("spam", [n]) => Ok(Self::Spam(count(n)?)),
            ("spam", _) => Err(usage("spam <n>")),
            ("help", _) => Ok(Self::Help),
            ("quit", _) => Ok(Self::Quit),
            (other, _) => Err(PerilError::Command(format!("unknown command: {other}"))),
        }
    }
}

impl FromStr for ServerCommand {
    type Err = PerilError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        match line.trim().to_ascii_lowercase().as_str() {
            "pause" => Ok(Self::Pause),
            "resume" => Ok(Self::Resume),
            "help" => Ok(Self::Help),
            "quit" => Ok(Self::Quit),
            "" => Err(PerilError::Command("empty command".into())),
            other => Err(PerilError::Command(format!("unknown command: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_client_commands() {
        assert_eq!(
            "spawn Europe 3".parse::<ClientCommand>().unwrap(),
            ClientCommand::Spawn {
                location: Location::Europe,
                units: 3
            }
        );
        assert_eq!(
            "move europe asia 2".parse::<ClientCommand>().unwrap(),
            ClientCommand::Move {
                from: Location::Europe,
                to: Location::Asia,
                units: 2
            }
        );
        assert_eq!("  status ".parse::<ClientCommand>().unwrap(), ClientCommand::Status);
        assert_eq!("spam 5".parse::<ClientCommand>().unwrap(), ClientCommand::Spam(5));
        assert_eq!("quit".parse::<ClientCommand>().unwrap(), ClientCommand::Quit);
    }

    #[test]
    fn test_client_command_errors() {
        let err = "move europe".parse::<ClientCommand>().unwrap_err();
        assert_eq!(err.to_string(), "usage: move <from> <to> <units>");

        let err = "spawn mars 1".parse::<ClientCommand>().unwrap_err();
        assert_eq!(err.to_string(), "unknown location: mars");

        let err = "spawn asia many".parse::<ClientCommand>().unwrap_err();
        assert_eq!(err.to_string(), "not a number: many");

        assert!("dance".parse::<ClientCommand>().is_err());
        assert!("".parse::<ClientCommand>().is_err());
    }

    #[test]
    fn test_parse_server_commands() {
        assert_eq!("pause".parse::<ServerCommand>().unwrap(), ServerCommand::Pause);
        assert_eq!("RESUME".parse::<ServerCommand>().unwrap(), ServerCommand::Resume);
        assert!("restart".parse::<ServerCommand>().is_err());
    }
}
