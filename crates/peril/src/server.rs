//! The server process: pause control and the game log collector.

use std::sync::Arc;

use peril_broker::{Broker, Durability};
use peril_game::{LogHandler, LogWriter};
use peril_protocol::routing::{self, EXCHANGE_DIRECT, EXCHANGE_TOPIC, GAME_LOG_SLUG, PAUSE_KEY};
use peril_protocol::{GameLog, PlayingState};
use peril_pubsub::{
    Publish, Publisher, QueueBinding, Subscriber, SubscriptionHandle, declare_exchanges,
};

use crate::{PerilConfig, PerilError};

/// The durable queue that collects every player's game logs.
pub(crate) fn logs_binding() -> QueueBinding {
    QueueBinding::new(
        EXCHANGE_TOPIC,
        GAME_LOG_SLUG,
        routing::wildcard(GAME_LOG_SLUG),
        Durability::Durable,
    )
}

/// Broadcasts pause/resume and appends game logs to a file.
pub struct PerilServer<B: Broker> {
    publisher: Publisher<B::Channel>,
    subscriber: Subscriber<B>,
    logs: SubscriptionHandle,
}

impl<B: Broker> PerilServer<B> {
    /// Declares the topology and starts the log collector.
    ///
    /// # Errors
    /// Fails on a closed connection or a topology conflict.
    pub async fn start(broker: Arc<B>, config: &PerilConfig) -> Result<Self, PerilError> {
        let publisher = Publisher::open(&*broker).await?;
        declare_exchanges(publisher.channel()).await?;

        let subscriber = Subscriber::new(broker, config.subscriber.clone());
        let handler = LogHandler::new(LogWriter::new(&config.log_path));
        let logs = subscriber
            .subscribe::<GameLog, _>(logs_binding(), handler)
            .await?;

        tracing::info!(log_path = %config.log_path.display(), "server started");
        Ok(Self {
            publisher,
            subscriber,
            logs,
        })
    }

    /// Tells every player to pause.
    pub async fn pause(&self) -> Result<(), PerilError> {
        self.broadcast(true).await
    }

    /// Tells every player to resume.
    pub async fn resume(&self) -> Result<(), PerilError> {
        self.broadcast(false).await
    }

    async fn broadcast(&self, is_paused: bool) -> Result<(), PerilError> {
        self.publisher
            .publish(EXCHANGE_DIRECT, PAUSE_KEY, &PlayingState { is_paused })
            .await?;
        tracing::info!(is_paused, "playing state broadcast");
        Ok(())
    }

    /// Stops the log collector and closes the publishing channel.
    pub async fn shutdown(self) -> Result<(), PerilError> {
        let stats = self.logs.stop().await?;
        tracing::info!(?stats, "server stopped");
        self.publisher.close().await?;
        drop(self.subscriber);
        Ok(())
    }
}
