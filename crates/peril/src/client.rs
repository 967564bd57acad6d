//! A player process.

use std::sync::Arc;

use peril_broker::{Broker, Durability};
use peril_game::{GameState, MoveHandler, PauseHandler, SharedState, WarHandler};
use peril_protocol::routing::{
    self, ARMY_MOVES_PREFIX, EXCHANGE_DIRECT, EXCHANGE_TOPIC, GAME_LOG_SLUG, PAUSE_KEY,
    WAR_RECOGNITIONS_PREFIX,
};
use peril_protocol::{ArmyMove, GameLog, Location, PlayingState, RecognitionOfWar};
use peril_pubsub::{
    Publish, Publisher, QueueBinding, Subscriber, SubscriptionHandle, declare_exchanges,
};
use tokio::sync::Mutex;

use crate::{PerilConfig, PerilError, spam};

/// The per-player queue for pause/resume broadcasts.
pub(crate) fn pause_binding(username: &str) -> QueueBinding {
    QueueBinding::new(
        EXCHANGE_DIRECT,
        routing::addressed(PAUSE_KEY, username),
        PAUSE_KEY,
        Durability::Transient,
    )
}

/// The per-player queue that sees every army move, our own included.
pub(crate) fn moves_binding(username: &str) -> QueueBinding {
    QueueBinding::new(
        EXCHANGE_TOPIC,
        routing::addressed(ARMY_MOVES_PREFIX, username),
        routing::wildcard(ARMY_MOVES_PREFIX),
        Durability::Transient,
    )
}

/// The queue shared by all players for war recognitions.
pub(crate) fn war_binding() -> QueueBinding {
    QueueBinding::new(
        EXCHANGE_TOPIC,
        WAR_RECOGNITIONS_PREFIX,
        routing::wildcard(WAR_RECOGNITIONS_PREFIX),
        Durability::Durable,
    )
}

/// One connected player: local state, three consumption loops and a
/// publisher for the player's own moves.
pub struct PerilClient<B: Broker> {
    username: String,
    state: SharedState,
    publisher: Arc<Publisher<B::Channel>>,
    // Owns the connection; the loops end when it is dropped.
    subscriber: Subscriber<B>,
    handles: Vec<SubscriptionHandle>,
}

impl<B: Broker> PerilClient<B> {
    /// Declares the topology and starts the pause, move and war loops.
    ///
    /// # Errors
    /// Fails on an invalid username, a closed connection, or a topology
    /// conflict (e.g. the username's queues are owned by another
    /// connection).
    pub async fn start(
        broker: Arc<B>,
        username: &str,
        config: &PerilConfig,
    ) -> Result<Self, PerilError> {
        routing::validate_username(username)?;

        let publisher = Arc::new(Publisher::open(&*broker).await?);
        declare_exchanges(publisher.channel()).await?;

        let state: SharedState = Arc::new(Mutex::new(GameState::new(username)));
        let subscriber = Subscriber::new(broker, config.subscriber.clone());

        let handles = vec![
            subscriber
                .subscribe::<PlayingState, _>(
                    pause_binding(username),
                    PauseHandler::new(Arc::clone(&state)),
                )
                .await?,
            subscriber
                .subscribe::<ArmyMove, _>(
                    moves_binding(username),
                    MoveHandler::new(Arc::clone(&state), Arc::clone(&publisher)),
                )
                .await?,
            subscriber
                .subscribe::<RecognitionOfWar, _>(
                    war_binding(),
                    WarHandler::new(Arc::clone(&state), Arc::clone(&publisher)),
                )
                .await?,
        ];

        tracing::info!(username, "client started");
        Ok(Self {
            username: username.to_string(),
            state,
            publisher,
            subscriber,
            handles,
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    /// Places new units at `location`.
    pub async fn spawn(&self, location: Location, units: u32) -> Result<(), PerilError> {
        self.state.lock().await.spawn(location, units)?;
        Ok(())
    }

    /// Validates and publishes a move. It takes effect on our own state
    /// once the echo comes back.
    pub async fn move_units(
        &self,
        from: Location,
        to: Location,
        units: u32,
    ) -> Result<ArmyMove, PerilError> {
        let mv = self.state.lock().await.plan_move(from, to, units)?;
        let key = routing::addressed(ARMY_MOVES_PREFIX, &self.username);
        self.publisher.publish(EXCHANGE_TOPIC, &key, &mv).await?;
        tracing::info!(%from, %to, units, "move published");
        Ok(mv)
    }

    pub async fn status(&self) -> String {
        self.state.lock().await.status()
    }

    /// Publishes `count` random log lines under this player's name.
    pub async fn spam(&self, count: u32) -> Result<(), PerilError> {
        let key = routing::addressed(GAME_LOG_SLUG, &self.username);
        for _ in 0..count {
            // The rng is not Send; keep it out of the await.
            let line = spam::line(&mut rand::rng());
            let log = GameLog::now(&self.username, line);
            self.publisher.publish(EXCHANGE_TOPIC, &key, &log).await?;
        }
        tracing::info!(count, "spam published");
        Ok(())
    }

    /// Stops every loop, letting in-flight messages settle.
    pub async fn shutdown(self) -> Result<(), PerilError> {
        for handle in self.handles {
            let queue = handle.queue().to_string();
            let stats = handle.stop().await?;
            tracing::debug!(queue = %queue, ?stats, "subscription stopped");
        }
        self.publisher.close().await?;
        drop(self.subscriber);
        tracing::info!(username = %self.username, "client stopped");
        Ok(())
    }
}
