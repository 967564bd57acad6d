//! Consumption loops: decode, handle, acknowledge.
//!
//! Each subscription owns one channel and one task. The task pulls
//! deliveries one at a time, so a handler never sees two messages from the
//! same queue at once and sees them in delivery order.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::StreamExt;
use peril_broker::{Broker, BrokerError, Channel, Delivery};
use peril_protocol::Event;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::ack::{AckDecision, RedeliveryTracker};
use crate::topology::declare_and_bind;
use crate::{PubSubError, QueueBinding, SubscriberConfig};

/// Processes one decoded event and decides its fate.
///
/// Implemented for any `Fn(E) -> impl Future<Output = AckDecision>`.
pub trait Handler<E>: Send + Sync + 'static {
    fn handle(&self, event: E) -> impl Future<Output = AckDecision> + Send;
}

impl<E, F, Fut> Handler<E> for F
where
    E: Send + 'static,
    F: Fn(E) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AckDecision> + Send,
{
    fn handle(&self, event: E) -> impl Future<Output = AckDecision> + Send {
        self(event)
    }
}

/// Counters reported when a consumption loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub delivered: u64,
    pub accepted: u64,
    pub requeued: u64,
    pub discarded: u64,
    /// Deliveries that failed to decode. Counted in `discarded` too.
    pub undecodable: u64,
}

impl LoopStats {
    fn record(&mut self, decision: AckDecision) {
        match decision {
            AckDecision::Accept => self.accepted += 1,
            AckDecision::RejectRequeue => self.requeued += 1,
            AckDecision::RejectDiscard => self.discarded += 1,
        }
    }
}

/// Controls a running consumption loop.
///
/// Dropping the handle detaches the loop: it keeps running until its
/// connection closes.
#[derive(Debug)]
pub struct SubscriptionHandle {
    queue: String,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<LoopStats>,
}

impl SubscriptionHandle {
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Returns `true` once the loop has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Asks the loop to stop and waits for it.
    ///
    /// The message being handled, if any, is settled first. Deliveries
    /// prefetched but not yet handled go back to the queue.
    ///
    /// # Errors
    /// Returns [`PubSubError::LoopFailed`] if the loop task panicked.
    pub async fn stop(mut self) -> Result<LoopStats, PubSubError> {
        if let Some(stop) = self.stop.take() {
            // The loop may already be gone; that is fine.
            let _ = stop.send(());
        }
        self.join().await
    }

    /// Waits for the loop to end on its own (consumer cancelled or
    /// connection closed).
    ///
    /// # Errors
    /// Returns [`PubSubError::LoopFailed`] if the loop task panicked.
    pub async fn join(self) -> Result<LoopStats, PubSubError> {
        // Holding the stop sender keeps the loop attached while waiting.
        let Self { queue, stop: _stop, task } = self;
        task.await.map_err(|e| PubSubError::LoopFailed {
            queue,
            reason: e.to_string(),
        })
    }
}

/// Declares `binding`, then starts a consumption loop on it.
///
/// Setup errors are returned before any message is consumed. Once the loop
/// runs, per-message failures resolve to an [`AckDecision`] and never stop
/// it.
///
/// # Errors
/// Returns [`PubSubError::Topology`] if the queue cannot be declared,
/// bound, or consumed from.
pub async fn subscribe<B, E, H>(
    broker: &B,
    binding: &QueueBinding,
    config: &SubscriberConfig,
    handler: H,
) -> Result<SubscriptionHandle, PubSubError>
where
    B: Broker,
    E: Event,
    H: Handler<E>,
{
    let (channel, consumer) = open_consumer(broker, binding, config).await?;
    let (stop_tx, stop_rx) = oneshot::channel();
    let task = tokio::spawn(consume_loop::<B::Channel, E, H>(
        channel,
        consumer,
        handler,
        config.clone(),
        binding.queue.clone(),
        stop_rx,
    ));

    tracing::info!(binding = %binding, kind = E::KIND, "subscribed");
    Ok(SubscriptionHandle {
        queue: binding.queue.clone(),
        stop: Some(stop_tx),
        task,
    })
}

async fn open_consumer<B: Broker>(
    broker: &B,
    binding: &QueueBinding,
    config: &SubscriberConfig,
) -> Result<(B::Channel, <B::Channel as Channel>::Consumer), PubSubError> {
    let topology = |source: BrokerError| PubSubError::Topology {
        queue: binding.queue.clone(),
        source,
    };

    let channel = declare_and_bind(broker, binding).await?;
    channel
        .set_prefetch(config.prefetch)
        .await
        .map_err(topology)?;
    let tag = format!("{}-consumer", binding.queue);
    let consumer = channel
        .consume(&binding.queue, &tag)
        .await
        .map_err(topology)?;
    Ok((channel, consumer))
}

enum Wake<D> {
    Stop,
    Detached,
    Next(Option<Result<D, BrokerError>>),
}

async fn consume_loop<C, E, H>(
    channel: C,
    mut consumer: C::Consumer,
    handler: H,
    config: SubscriberConfig,
    queue: String,
    stop: oneshot::Receiver<()>,
) -> LoopStats
where
    C: Channel,
    E: Event,
    H: Handler<E>,
{
    let mut stop = Some(stop);
    let mut tracker = RedeliveryTracker::new(config.max_redeliveries, config.redelivery_window);
    let mut stats = LoopStats::default();

    loop {
        let wake = match stop.as_mut() {
            Some(signal) => tokio::select! {
                biased;
                res = signal => {
                    if res.is_ok() { Wake::Stop } else { Wake::Detached }
                }
                next = consumer.next() => Wake::Next(next),
            },
            None => Wake::Next(consumer.next().await),
        };

        let delivery = match wake {
            Wake::Stop => {
                tracing::info!(queue = %queue, "stop requested");
                break;
            }
            Wake::Detached => {
                stop = None;
                continue;
            }
            Wake::Next(Some(Ok(delivery))) => delivery,
            Wake::Next(Some(Err(e))) => {
                tracing::warn!(queue = %queue, error = %e, "consumer error");
                continue;
            }
            Wake::Next(None) => {
                tracing::info!(queue = %queue, "consumer cancelled");
                break;
            }
        };

        stats.delivered += 1;
        process::<C::Delivery, E, H>(&handler, &mut tracker, &config, &queue, &mut stats, delivery)
            .await;
    }

    // Unhandled prefetched deliveries are requeued when the consumer goes.
    drop(consumer);
    if let Err(e) = channel.close().await {
        tracing::debug!(queue = %queue, error = %e, "channel close after loop exit");
    }
    tracing::info!(queue = %queue, ?stats, "consumption loop ended");
    stats
}

async fn process<D, E, H>(
    handler: &H,
    tracker: &mut RedeliveryTracker,
    config: &SubscriberConfig,
    queue: &str,
    stats: &mut LoopStats,
    delivery: D,
) where
    D: Delivery,
    E: Event,
    H: Handler<E>,
{
    let fingerprint = RedeliveryTracker::fingerprint(delivery.body());

    let decision = match E::decode(delivery.body()) {
        Ok(event) => {
            let requested = handler.handle(event).await;
            let decision = tracker.apply(fingerprint, requested, Instant::now());
            if requested != decision {
                tracing::warn!(
                    queue,
                    max_redeliveries = config.max_redeliveries,
                    "redelivery ceiling reached, dead-lettering message"
                );
            }
            decision
        }
        Err(e) => {
            tracing::warn!(queue, kind = E::KIND, error = %e, "undecodable message, dead-lettering");
            stats.undecodable += 1;
            AckDecision::RejectDiscard
        }
    };

    if decision == AckDecision::RejectRequeue {
        let pause = config.requeue_backoff(tracker.requeues(fingerprint));
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }

    stats.record(decision);
    tracing::debug!(queue, routing_key = delivery.routing_key(), %decision, "settling");
    let settled = match decision {
        AckDecision::Accept => delivery.ack().await,
        AckDecision::RejectRequeue => delivery.nack(true).await,
        AckDecision::RejectDiscard => delivery.nack(false).await,
    };
    if let Err(e) = settled {
        tracing::warn!(queue, error = %e, "failed to settle delivery");
    }
}

fn lock(active: &Mutex<Vec<QueueBinding>>) -> MutexGuard<'_, Vec<QueueBinding>> {
    active.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Starts consumption loops for one participant and refuses to start two
/// loops that would receive the same events.
pub struct Subscriber<B: Broker> {
    broker: Arc<B>,
    config: SubscriberConfig,
    active: Arc<Mutex<Vec<QueueBinding>>>,
}

impl<B: Broker> Subscriber<B> {
    pub fn new(broker: Arc<B>, config: SubscriberConfig) -> Self {
        Self {
            broker,
            config,
            active: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn config(&self) -> &SubscriberConfig {
        &self.config
    }

    /// Bindings with a running loop.
    pub fn active(&self) -> Vec<QueueBinding> {
        lock(&self.active).clone()
    }

    /// Declares `binding` and starts a loop delivering `E` events to
    /// `handler`.
    ///
    /// A queue may be subscribed again once its previous loop has ended.
    ///
    /// # Errors
    /// - [`PubSubError::DuplicateSubscription`] if a loop already runs on
    ///   the queue.
    /// - [`PubSubError::OverlappingBinding`] if another loop's binding
    ///   matches some of the same routing keys.
    /// - [`PubSubError::Topology`] if setup fails.
    pub async fn subscribe<E, H>(
        &self,
        binding: QueueBinding,
        handler: H,
    ) -> Result<SubscriptionHandle, PubSubError>
    where
        E: Event,
        H: Handler<E>,
    {
        self.reserve(&binding)?;
        let release = Release {
            active: Arc::clone(&self.active),
            queue: binding.queue.clone(),
        };

        // On error `release` drops here and frees the slot again.
        let (channel, consumer) = open_consumer(&*self.broker, &binding, &self.config).await?;

        let (stop_tx, stop_rx) = oneshot::channel();
        let config = self.config.clone();
        let queue = binding.queue.clone();
        let task = tokio::spawn(async move {
            let _release = release;
            consume_loop::<B::Channel, E, H>(channel, consumer, handler, config, queue, stop_rx)
                .await
        });

        tracing::info!(binding = %binding, kind = E::KIND, "subscribed");
        Ok(SubscriptionHandle {
            queue: binding.queue,
            stop: Some(stop_tx),
            task,
        })
    }

    fn reserve(&self, binding: &QueueBinding) -> Result<(), PubSubError> {
        let mut active = lock(&self.active);
        if active.iter().any(|b| b.queue == binding.queue) {
            return Err(PubSubError::DuplicateSubscription(binding.queue.clone()));
        }
        if let Some(existing) = active.iter().find(|b| b.overlaps(binding)) {
            return Err(PubSubError::OverlappingBinding {
                existing: existing.to_string(),
                new: binding.to_string(),
            });
        }
        active.push(binding.clone());
        Ok(())
    }
}

/// Frees a queue's slot in the active set when its loop ends.
struct Release {
    active: Arc<Mutex<Vec<QueueBinding>>>,
    queue: String,
}

impl Drop for Release {
    fn drop(&mut self) {
        lock(&self.active).retain(|b| b.queue != self.queue);
    }
}
