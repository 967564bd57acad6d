//! Broker abstraction layer for Peril.
//!
//! Provides the [`Broker`], [`Channel`] and [`Delivery`] traits that
//! abstract over a message broker with AMQP 0-9-1 semantics: exchanges,
//! queues, bindings, prefetch, and explicit acknowledgment.
//!
//! # Implementations
//!
//! - [`MemoryBroker`]: in-process broker with the same routing,
//!   durability and dead-letter rules. Used by tests and single-process
//!   games.
//! - `AmqpBroker` (feature `amqp`, default): RabbitMQ via `lapin`.

mod error;
mod memory;
#[cfg(feature = "amqp")]
mod amqp;

#[cfg(feature = "amqp")]
pub use amqp::{AmqpBroker, AmqpChannel, AmqpDelivery};
pub use error::BrokerError;
pub use memory::{
    MemoryBroker, MemoryChannel, MemoryConnection, MemoryConsumer,
    MemoryDelivery,
};

use std::fmt;
use std::future::Future;

use futures_util::Stream;

/// How an exchange routes messages to bound queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExchangeKind {
    /// Routing key must equal the binding key.
    Direct,
    /// Binding key is a pattern: `*` matches one word, `#` zero or more.
    Topic,
    /// Every bound queue receives every message.
    Fanout,
}

impl fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::Topic => write!(f, "topic"),
            Self::Fanout => write!(f, "fanout"),
        }
    }
}

/// Queue lifecycle policy.
///
/// | profile   | survives restart | auto-delete | exclusive |
/// |-----------|------------------|-------------|-----------|
/// | Durable   | yes              | no          | no        |
/// | Transient | no               | yes         | yes       |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Durability {
    Durable,
    Transient,
}

impl Durability {
    /// Whether the queue survives a broker restart.
    pub fn is_durable(self) -> bool {
        matches!(self, Self::Durable)
    }

    /// Whether the queue is deleted when its last consumer goes away.
    pub fn is_auto_delete(self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Whether the queue is private to the declaring connection.
    pub fn is_exclusive(self) -> bool {
        matches!(self, Self::Transient)
    }
}

impl fmt::Display for Durability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Durable => write!(f, "durable"),
            Self::Transient => write!(f, "transient"),
        }
    }
}

/// Parameters for declaring a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueOptions {
    pub durability: Durability,
    /// Exchange that receives messages rejected without requeue.
    pub dead_letter_exchange: Option<String>,
}

impl QueueOptions {
    /// Options with the given durability and no dead-letter exchange.
    pub fn new(durability: Durability) -> Self {
        Self {
            durability,
            dead_letter_exchange: None,
        }
    }

    /// Sets the dead-letter exchange.
    pub fn dead_letter(mut self, exchange: impl Into<String>) -> Self {
        self.dead_letter_exchange = Some(exchange.into());
        self
    }
}

/// A connection to a broker. Hands out channels.
pub trait Broker: Send + Sync + 'static {
    /// The channel type produced by this broker.
    type Channel: Channel;

    /// Opens a new channel on this connection.
    fn open_channel(
        &self,
    ) -> impl Future<Output = Result<Self::Channel, BrokerError>> + Send;

    /// Closes the connection and every channel opened on it.
    fn close(&self) -> impl Future<Output = Result<(), BrokerError>> + Send;
}

/// A session on a broker connection.
///
/// Topology is declared through a channel, messages are published on it,
/// and consumers are started on it. Closing the channel cancels its
/// consumers and returns their unacknowledged messages to the queue.
pub trait Channel: Send + Sync + 'static {
    /// A message handed to a consumer.
    type Delivery: Delivery;
    /// The stream of deliveries produced by [`consume`](Self::consume).
    type Consumer: Stream<Item = Result<Self::Delivery, BrokerError>>
        + Send
        + Unpin
        + 'static;

    /// Declares an exchange. Idempotent for identical parameters.
    fn declare_exchange(
        &self,
        name: &str,
        kind: ExchangeKind,
    ) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Declares a queue. Idempotent for identical parameters; fails with
    /// [`BrokerError::PreconditionFailed`] on conflicting parameters.
    fn declare_queue(
        &self,
        name: &str,
        options: &QueueOptions,
    ) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Binds a queue to an exchange under a routing-key pattern.
    fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Limits unacknowledged deliveries per consumer started afterwards.
    /// Zero means unlimited.
    fn set_prefetch(
        &self,
        count: u16,
    ) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Publishes a message. Does not wait for a broker confirmation.
    fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Starts consuming a queue with manual acknowledgment.
    fn consume(
        &self,
        queue: &str,
        consumer_tag: &str,
    ) -> impl Future<Output = Result<Self::Consumer, BrokerError>> + Send;

    /// Closes the channel.
    fn close(&self) -> impl Future<Output = Result<(), BrokerError>> + Send;
}

/// A single message delivered to a consumer, pending acknowledgment.
pub trait Delivery: Send + 'static {
    /// The raw message body.
    fn body(&self) -> &[u8];

    /// The routing key the message was published with.
    fn routing_key(&self) -> &str;

    /// `true` if the broker delivered this message before.
    fn redelivered(&self) -> bool;

    /// Acknowledges the message: the broker forgets it.
    fn ack(self) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Negatively acknowledges the message. With `requeue` the broker
    /// delivers it again; without, it is dead-lettered (or dropped if the
    /// queue has no dead-letter exchange).
    fn nack(
        self,
        requeue: bool,
    ) -> impl Future<Output = Result<(), BrokerError>> + Send;
}

/// Returns `true` if `routing_key` matches the topic `pattern`.
///
/// Both are dot-separated words. In the pattern, `*` matches exactly one
/// word and `#` matches zero or more words.
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = if routing_key.is_empty() {
        Vec::new()
    } else {
        routing_key.split('.').collect()
    };
    match_words(&pattern, &key)
}

fn match_words(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => {
            (0..=key.len()).any(|skip| match_words(rest, &key[skip..]))
        }
        Some((&word, rest)) => match key.split_first() {
            Some((&k, key_rest)) if word == "*" || word == k => {
                match_words(rest, key_rest)
            }
            _ => false,
        },
    }
}
