//! Queue topology: declaring exchanges, queues and bindings.
//!
//! All declarations are idempotent. Every queue is wired to the shared
//! dead-letter exchange so discarded messages stay inspectable.

use std::fmt;

use peril_broker::{Broker, BrokerError, Channel, Durability, ExchangeKind, QueueOptions};
use peril_protocol::routing::{
    DEAD_LETTER_QUEUE, EXCHANGE_DEAD_LETTER, EXCHANGE_DIRECT, EXCHANGE_TOPIC,
};

use crate::PubSubError;

/// A queue, the exchange it listens on, and the pattern it is bound with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueBinding {
    pub exchange: String,
    pub queue: String,
    pub routing_key: String,
    pub durability: Durability,
}

impl QueueBinding {
    pub fn new(
        exchange: impl Into<String>,
        queue: impl Into<String>,
        routing_key: impl Into<String>,
        durability: Durability,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            queue: queue.into(),
            routing_key: routing_key.into(),
            durability,
        }
    }

    /// Declaration options: the binding's durability plus the shared DLX.
    pub fn options(&self) -> QueueOptions {
        QueueOptions::new(self.durability).dead_letter(EXCHANGE_DEAD_LETTER)
    }

    /// Returns `true` if some routing key published to this binding's
    /// exchange would be matched by both bindings.
    ///
    /// Two consumption loops with overlapping bindings on different queues
    /// would each receive a copy of the same event.
    pub fn overlaps(&self, other: &QueueBinding) -> bool {
        if self.exchange != other.exchange {
            return false;
        }
        let a: Vec<&str> = self.routing_key.split('.').collect();
        let b: Vec<&str> = other.routing_key.split('.').collect();
        patterns_intersect(&a, &b)
    }
}

impl fmt::Display for QueueBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} <- {} [{}] ({})",
            self.queue, self.exchange, self.routing_key, self.durability
        )
    }
}

/// Topic-pattern intersection, word by word.
fn patterns_intersect(a: &[&str], b: &[&str]) -> bool {
    match (a.first(), b.first()) {
        (None, None) => true,
        (Some(&"#"), _) => {
            patterns_intersect(&a[1..], b) || (!b.is_empty() && patterns_intersect(a, &b[1..]))
        }
        (_, Some(&"#")) => {
            patterns_intersect(a, &b[1..]) || (!a.is_empty() && patterns_intersect(&a[1..], b))
        }
        (Some(x), Some(y)) => {
            (*x == "*" || *y == "*" || x == y) && patterns_intersect(&a[1..], &b[1..])
        }
        _ => false,
    }
}

/// Declares the exchanges every participant relies on and the durable
/// dead-letter queue behind them.
///
/// # Errors
/// Fails if the broker refuses a declaration, e.g. because an exchange
/// already exists with a different kind.
pub async fn declare_exchanges<C: Channel>(channel: &C) -> Result<(), PubSubError> {
    channel.declare_exchange(EXCHANGE_TOPIC, ExchangeKind::Topic).await?;
    channel.declare_exchange(EXCHANGE_DIRECT, ExchangeKind::Direct).await?;
    channel
        .declare_exchange(EXCHANGE_DEAD_LETTER, ExchangeKind::Fanout)
        .await?;

    let topology = |source: BrokerError| PubSubError::Topology {
        queue: DEAD_LETTER_QUEUE.to_string(),
        source,
    };
    channel
        .declare_queue(DEAD_LETTER_QUEUE, &QueueOptions::new(Durability::Durable))
        .await
        .map_err(topology)?;
    channel
        .bind_queue(DEAD_LETTER_QUEUE, EXCHANGE_DEAD_LETTER, "")
        .await
        .map_err(topology)?;

    tracing::debug!("exchanges declared");
    Ok(())
}

/// Opens a channel, declares the binding's queue and binds it.
///
/// Returns the channel so the caller can consume from the queue on it.
///
/// # Errors
/// Returns [`PubSubError::Topology`] if any step fails. A conflicting
/// redeclaration (same queue, different durability) is one such failure.
pub async fn declare_and_bind<B: Broker>(
    broker: &B,
    binding: &QueueBinding,
) -> Result<B::Channel, PubSubError> {
    let topology = |source: BrokerError| PubSubError::Topology {
        queue: binding.queue.clone(),
        source,
    };

    let channel = broker.open_channel().await.map_err(topology)?;
    channel
        .declare_queue(&binding.queue, &binding.options())
        .await
        .map_err(topology)?;
    channel
        .bind_queue(&binding.queue, &binding.exchange, &binding.routing_key)
        .await
        .map_err(topology)?;

    tracing::debug!(binding = %binding, "queue declared and bound");
    Ok(channel)
}
