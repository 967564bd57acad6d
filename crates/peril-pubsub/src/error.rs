//! Error types for the pub/sub layer.

use peril_broker::BrokerError;
use peril_protocol::ProtocolError;

/// Errors that can occur while publishing or setting up subscriptions.
///
/// Per-message failures inside a consumption loop never surface here:
/// they resolve to an [`AckDecision`](crate::AckDecision) instead.
#[derive(Debug, thiserror::Error)]
pub enum PubSubError {
    /// The broker rejected an operation (e.g. a publish).
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// Encoding an outgoing event failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Declaring or binding a queue failed. Fatal to the subscription.
    #[error("topology setup failed for queue {queue}: {source}")]
    Topology {
        queue: String,
        #[source]
        source: BrokerError,
    },

    /// This subscriber already runs a loop on the queue.
    #[error("queue {0} already has a consumption loop")]
    DuplicateSubscription(String),

    /// The new binding would deliver the same events as an existing one.
    #[error("binding {new} overlaps existing binding {existing}")]
    OverlappingBinding { existing: String, new: String },

    /// The consumption loop task panicked or was aborted.
    #[error("consumption loop for {queue} failed: {reason}")]
    LoopFailed { queue: String, reason: String },
}
