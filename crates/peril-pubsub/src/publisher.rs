//! Typed publishing.

use std::future::Future;
use std::sync::Arc;

use peril_broker::{Broker, Channel};
use peril_protocol::Event;

use crate::PubSubError;

/// Something events can be published through.
///
/// Game handlers depend on this trait rather than on a concrete channel,
/// so they can be driven by a fake in tests.
pub trait Publish: Send + Sync + 'static {
    /// Encodes `event` with its codec and publishes it.
    fn publish<E: Event>(
        &self,
        exchange: &str,
        routing_key: &str,
        event: &E,
    ) -> impl Future<Output = Result<(), PubSubError>> + Send;
}

impl<P: Publish> Publish for Arc<P> {
    fn publish<E: Event>(
        &self,
        exchange: &str,
        routing_key: &str,
        event: &E,
    ) -> impl Future<Output = Result<(), PubSubError>> + Send {
        (**self).publish(exchange, routing_key, event)
    }
}

/// Encodes `event` and publishes it on `channel`.
///
/// # Errors
/// Returns [`PubSubError::Protocol`] if encoding fails and
/// [`PubSubError::Broker`] if the broker refuses the message (closed
/// channel, unknown exchange).
pub async fn publish<C: Channel, E: Event>(
    channel: &C,
    exchange: &str,
    routing_key: &str,
    event: &E,
) -> Result<(), PubSubError> {
    let body = event.encode()?;
    channel
        .publish(exchange, routing_key, E::content_type(), body)
        .await?;
    tracing::debug!(exchange, routing_key, kind = E::KIND, "event published");
    Ok(())
}

/// Publishes events over a dedicated channel.
pub struct Publisher<C: Channel> {
    channel: C,
}

impl<C: Channel> Publisher<C> {
    pub fn new(channel: C) -> Self {
        Self { channel }
    }

    /// Opens a fresh channel on `broker` for publishing.
    ///
    /// # Errors
    /// Fails if the connection is closed.
    pub async fn open<B>(broker: &B) -> Result<Self, PubSubError>
    where
        B: Broker<Channel = C>,
    {
        let channel = broker.open_channel().await?;
        Ok(Self::new(channel))
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Closes the underlying channel.
    pub async fn close(&self) -> Result<(), PubSubError> {
        self.channel.close().await?;
        Ok(())
    }
}

impl<C: Channel> Publish for Publisher<C> {
    async fn publish<E: Event>(
        &self,
        exchange: &str,
        routing_key: &str,
        event: &E,
    ) -> Result<(), PubSubError> {
        publish(&self.channel, exchange, routing_key, event).await
    }
}
