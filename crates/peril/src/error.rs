//! Unified error type for Peril.

use peril_broker::BrokerError;
use peril_game::GameError;
use peril_protocol::ProtocolError;
use peril_pubsub::PubSubError;

/// Top-level error that wraps every layer's error.
///
/// The `#[from]` conversions let `?` lift a layer error into this one.
#[derive(Debug, thiserror::Error)]
pub enum PerilError {
    /// Connection or channel failure.
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// Encoding, decoding or validation failure.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Topology, publish or subscription failure.
    #[error(transparent)]
    PubSub(#[from] PubSubError),

    /// A game rule refused a command.
    #[error(transparent)]
    Game(#[from] GameError),

    /// A configuration value could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Reading the terminal or a file failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A REPL line could not be parsed.
    #[error("{0}")]
    Command(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_broker_error() {
        let err: PerilError = BrokerError::ConnectionFailed("refused".into()).into();
        assert!(matches!(err, PerilError::Broker(_)));
        assert!(err.to_string().contains("refused"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err: PerilError = ProtocolError::InvalidMessage("bad".into()).into();
        assert!(matches!(err, PerilError::Protocol(_)));
    }

    #[test]
    fn test_from_pubsub_error() {
        let err: PerilError = PubSubError::DuplicateSubscription("war".into()).into();
        assert!(matches!(err, PerilError::PubSub(_)));
        assert!(err.to_string().contains("war"));
    }

    #[test]
    fn test_from_game_error() {
        let err: PerilError = GameError::Paused.into();
        assert!(matches!(err, PerilError::Game(_)));
        assert_eq!(err.to_string(), "the game is paused");
    }
}
