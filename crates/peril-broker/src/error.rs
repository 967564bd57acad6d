/// Errors that can occur in the broker layer.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// Connecting to the broker failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The channel or its connection has been closed.
    #[error("channel closed")]
    ChannelClosed,

    /// A referenced exchange or queue does not exist.
    #[error("{kind} not found: {name}")]
    NotFound {
        /// `"exchange"` or `"queue"`.
        kind: &'static str,
        /// The missing entity's name.
        name: String,
    },

    /// An entity was redeclared with parameters that differ from the
    /// existing declaration.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// An exclusive queue is owned by another connection.
    #[error("resource locked: {0}")]
    ResourceLocked(String),

    /// The delivery was already settled, or its consumer is gone.
    #[error("unknown delivery tag {0}")]
    UnknownDelivery(u64),

    /// An error reported by the AMQP client.
    #[cfg(feature = "amqp")]
    #[error(transparent)]
    Amqp(#[from] lapin::Error),
}
