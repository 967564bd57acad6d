//! Typed publish/subscribe for Peril.
//!
//! This crate turns a raw [`Broker`](peril_broker::Broker) into typed event
//! plumbing:
//!
//! 1. **Topology** ([`QueueBinding`], [`declare_and_bind`],
//!    [`declare_exchanges`]): queues with a durability profile, bound to an
//!    exchange and wired to the shared dead-letter exchange.
//! 2. **Publishing** ([`Publish`], [`Publisher`]): encode with the event's
//!    codec and hand the bytes to the broker.
//! 3. **Subscribing** ([`Subscriber`], [`Handler`], [`SubscriptionHandle`]):
//!    one sequential consumption loop per queue that decodes, calls the
//!    handler, and acknowledges according to its [`AckDecision`].
//!
//! # How it fits in the stack
//!
//! ```text
//! Game layer (above)   ← handlers return AckDecision, publish intents
//!     ↕
//! Pub/sub layer (this crate)
//!     ↕
//! Broker layer (below) ← channels, deliveries, ack/nack
//! ```

mod ack;
mod config;
mod error;
mod publisher;
mod subscriber;
mod topology;

pub use ack::{AckDecision, RedeliveryTracker};
pub use config::SubscriberConfig;
pub use error::PubSubError;
pub use publisher::{Publish, Publisher, publish};
pub use subscriber::{
    Handler, LoopStats, Subscriber, SubscriptionHandle, subscribe,
};
pub use topology::{QueueBinding, declare_and_bind, declare_exchanges};
