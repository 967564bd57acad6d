//! Subscriber configuration.

use std::time::Duration;

/// Settings applied to every consumption loop a
/// [`Subscriber`](crate::Subscriber) starts.
#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    /// Maximum unacknowledged deliveries per loop. Keeps one slow handler
    /// from pulling the whole queue into memory.
    pub prefetch: u16,

    /// How many times one message may be requeued before a further
    /// `RejectRequeue` is turned into `RejectDiscard`.
    pub max_redeliveries: u32,

    /// Minimum time between a message's first requeue and its dead-lettering
    /// by the ceiling. A burst of requeues inside this window never discards.
    pub redelivery_window: Duration,

    /// Pause before handing a requeued message back to the broker. Doubles
    /// with each requeue of the same message.
    pub requeue_delay: Duration,

    /// Upper bound on the doubled requeue pause.
    pub max_requeue_delay: Duration,
}

impl SubscriberConfig {
    /// Pause before the `attempt`-th requeue (1-based) of one message.
    pub fn requeue_backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.requeue_delay
            .saturating_mul(factor)
            .min(self.max_requeue_delay)
    }
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            prefetch: 10,
            max_redeliveries: 5,
            redelivery_window: Duration::from_secs(30),
            requeue_delay: Duration::from_millis(50),
            max_requeue_delay: Duration::from_secs(2),
        }
    }
}
