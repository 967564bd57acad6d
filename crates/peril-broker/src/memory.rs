//! In-process broker with AMQP 0-9-1 routing semantics.
//!
//! Everything lives behind one `std::sync::Mutex` that is never held
//! across an `.await`. Consumers receive deliveries over unbounded mpsc
//! channels; the prefetch limit is enforced at dispatch time, so a
//! consumer never holds more than `prefetch` unacknowledged messages.
//!
//! What is modelled:
//!
//! - direct, topic and fanout exchanges
//! - durable/transient queues, exclusive ownership, auto-delete
//! - round-robin dispatch with prefetch
//! - ack, nack with requeue (front of the queue, `redelivered` set) and
//!   nack without requeue (dead-lettered with the original routing key)
//! - [`MemoryBroker::restart`], which drops every connection and every
//!   non-durable queue

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::mpsc;

use crate::{
    Broker, BrokerError, Channel, Delivery, ExchangeKind, QueueOptions,
    topic_matches,
};

type Shared = Arc<Mutex<State>>;

fn lock(shared: &Mutex<State>) -> MutexGuard<'_, State> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Broker state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Message {
    routing_key: String,
    content_type: String,
    body: Vec<u8>,
    redelivered: bool,
}

#[derive(Debug, PartialEq, Eq)]
struct Binding {
    exchange: String,
    routing_key: String,
}

struct ConsumerSlot {
    id: u64,
    channel: u64,
    connection: u64,
    prefetch: u16,
    in_flight: usize,
    sender: mpsc::UnboundedSender<MemoryDelivery>,
}

impl ConsumerSlot {
    fn has_capacity(&self) -> bool {
        self.prefetch == 0 || self.in_flight < usize::from(self.prefetch)
    }
}

struct Queue {
    options: QueueOptions,
    /// Connection that owns an exclusive queue.
    owner: Option<u64>,
    bindings: Vec<Binding>,
    ready: VecDeque<Message>,
    /// Delivery tag → (consumer id, message).
    unacked: HashMap<u64, (u64, Message)>,
    consumers: Vec<ConsumerSlot>,
    cursor: usize,
    ever_consumed: bool,
}

impl Queue {
    fn new(options: QueueOptions, owner: Option<u64>) -> Self {
        Self {
            options,
            owner,
            bindings: Vec::new(),
            ready: VecDeque::new(),
            unacked: HashMap::new(),
            consumers: Vec::new(),
            cursor: 0,
            ever_consumed: false,
        }
    }

    /// Returns every unacked message of `consumer` to the front of the
    /// queue, preserving delivery order.
    fn requeue_consumer(&mut self, consumer: u64) {
        let mut tags: Vec<u64> = self
            .unacked
            .iter()
            .filter(|(_, (owner, _))| *owner == consumer)
            .map(|(tag, _)| *tag)
            .collect();
        tags.sort_unstable();
        for tag in tags.into_iter().rev() {
            if let Some((_, mut msg)) = self.unacked.remove(&tag) {
                msg.redelivered = true;
                self.ready.push_front(msg);
            }
        }
    }
}

enum Settle {
    Ack,
    Requeue,
    Discard,
}

#[derive(Default)]
struct State {
    exchanges: HashMap<String, ExchangeKind>,
    queues: HashMap<String, Queue>,
    closed_channels: HashSet<u64>,
    closed_connections: HashSet<u64>,
    /// Connections with a smaller id were dropped by a restart.
    first_live_connection: u64,
    next_connection: u64,
    next_channel: u64,
    next_consumer: u64,
    next_tag: u64,
}

impl State {
    fn ensure_open(&self, connection: u64, channel: Option<u64>) -> Result<(), BrokerError> {
        let conn_closed = connection < self.first_live_connection
            || self.closed_connections.contains(&connection);
        let chan_closed =
            channel.is_some_and(|c| self.closed_channels.contains(&c));
        if conn_closed || chan_closed {
            return Err(BrokerError::ChannelClosed);
        }
        Ok(())
    }

    fn queue_for(&mut self, connection: u64, name: &str) -> Result<&mut Queue, BrokerError> {
        let queue = self.queues.get_mut(name).ok_or_else(|| BrokerError::NotFound {
            kind: "queue",
            name: name.to_string(),
        })?;
        if queue.owner.is_some_and(|owner| owner != connection) {
            return Err(BrokerError::ResourceLocked(format!(
                "queue {name} is exclusive to another connection"
            )));
        }
        Ok(queue)
    }

    fn declare_exchange(&mut self, name: &str, kind: ExchangeKind) -> Result<(), BrokerError> {
        match self.exchanges.get(name) {
            Some(existing) if *existing != kind => {
                Err(BrokerError::PreconditionFailed(format!(
                    "exchange {name} already declared as {existing}, not {kind}"
                )))
            }
            Some(_) => Ok(()),
            None => {
                self.exchanges.insert(name.to_string(), kind);
                tracing::debug!(exchange = name, %kind, "exchange declared");
                Ok(())
            }
        }
    }

    fn declare_queue(
        &mut self,
        connection: u64,
        name: &str,
        options: &QueueOptions,
    ) -> Result<(), BrokerError> {
        if self.queues.contains_key(name) {
            let queue = self.queue_for(connection, name)?;
            if queue.options != *options {
                return Err(BrokerError::PreconditionFailed(format!(
                    "queue {name} already declared with {:?}, not {:?}",
                    queue.options, options
                )));
            }
            return Ok(());
        }
        let owner = options.durability.is_exclusive().then_some(connection);
        self.queues
            .insert(name.to_string(), Queue::new(options.clone(), owner));
        tracing::debug!(
            queue = name,
            durability = %options.durability,
            "queue declared"
        );
        Ok(())
    }

    fn bind_queue(
        &mut self,
        connection: u64,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), BrokerError> {
        if !self.exchanges.contains_key(exchange) {
            return Err(BrokerError::NotFound {
                kind: "exchange",
                name: exchange.to_string(),
            });
        }
        let q = self.queue_for(connection, queue)?;
        let binding = Binding {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
        };
        if !q.bindings.contains(&binding) {
            q.bindings.push(binding);
        }
        Ok(())
    }

    /// Routes a message to every matching queue, at most once per queue.
    fn route(&mut self, shared: &Shared, exchange: &str, msg: Message) -> Result<(), BrokerError> {
        let kind = *self.exchanges.get(exchange).ok_or_else(|| {
            BrokerError::NotFound {
                kind: "exchange",
                name: exchange.to_string(),
            }
        })?;

        let targets: Vec<String> = self
            .queues
            .iter()
            .filter(|(_, q)| {
                q.bindings.iter().any(|b| {
                    b.exchange == exchange
                        && match kind {
                            ExchangeKind::Direct => b.routing_key == msg.routing_key,
                            ExchangeKind::Topic => {
                                topic_matches(&b.routing_key, &msg.routing_key)
                            }
                            ExchangeKind::Fanout => true,
                        }
                })
            })
            .map(|(name, _)| name.clone())
            .collect();

        if targets.is_empty() {
            tracing::trace!(exchange, routing_key = %msg.routing_key, "message unroutable, dropped");
        }

        for name in targets {
            if let Some(q) = self.queues.get_mut(&name) {
                q.ready.push_back(msg.clone());
            }
            self.dispatch(shared, &name);
        }
        Ok(())
    }

    /// Hands ready messages to consumers with spare prefetch capacity.
    fn dispatch(&mut self, shared: &Shared, queue: &str) {
        let Some(q) = self.queues.get_mut(queue) else {
            return;
        };
        while !q.ready.is_empty() && !q.consumers.is_empty() {
            let n = q.consumers.len();
            let Some(offset) =
                (0..n).find(|i| q.consumers[(q.cursor + i) % n].has_capacity())
            else {
                break;
            };
            let idx = (q.cursor + offset) % n;
            let Some(msg) = q.ready.pop_front() else {
                break;
            };

            let tag = self.next_tag;
            self.next_tag += 1;

            let delivery = MemoryDelivery {
                shared: Arc::clone(shared),
                queue: queue.to_string(),
                tag,
                message: msg.clone(),
            };
            if q.consumers[idx].sender.send(delivery).is_err() {
                // Consumer stream dropped without cancelling.
                let gone = q.consumers.remove(idx);
                q.ready.push_front(msg);
                q.requeue_consumer(gone.id);
                q.cursor = 0;
                continue;
            }
            let slot = &mut q.consumers[idx];
            slot.in_flight += 1;
            q.unacked.insert(tag, (slot.id, msg));
            q.cursor = (idx + 1) % n;
        }
    }

    fn settle(
        &mut self,
        shared: &Shared,
        queue: &str,
        tag: u64,
        settle: Settle,
    ) -> Result<(), BrokerError> {
        let q = self
            .queues
            .get_mut(queue)
            .ok_or(BrokerError::UnknownDelivery(tag))?;
        let (consumer, mut msg) = q
            .unacked
            .remove(&tag)
            .ok_or(BrokerError::UnknownDelivery(tag))?;
        if let Some(slot) = q.consumers.iter_mut().find(|s| s.id == consumer) {
            slot.in_flight = slot.in_flight.saturating_sub(1);
        }

        match settle {
            Settle::Ack => {}
            Settle::Requeue => {
                msg.redelivered = true;
                q.ready.push_front(msg);
            }
            Settle::Discard => {
                if let Some(dlx) = q.options.dead_letter_exchange.clone() {
                    msg.redelivered = false;
                    if let Err(e) = self.route(shared, &dlx, msg) {
                        tracing::warn!(queue, dead_letter_exchange = %dlx, error = %e, "dead-lettering failed, message dropped");
                    }
                } else {
                    tracing::debug!(queue, tag, "message discarded, no dead-letter exchange");
                }
            }
        }

        self.dispatch(shared, queue);
        Ok(())
    }

    fn cancel_consumer(&mut self, shared: &Shared, queue: &str, consumer: u64) {
        let Some(q) = self.queues.get_mut(queue) else {
            return;
        };
        let Some(pos) = q.consumers.iter().position(|s| s.id == consumer) else {
            return;
        };
        q.consumers.remove(pos);
        q.cursor = 0;
        q.requeue_consumer(consumer);

        if q.consumers.is_empty()
            && q.ever_consumed
            && q.options.durability.is_auto_delete()
        {
            self.queues.remove(queue);
            tracing::debug!(queue, "auto-delete queue removed");
            return;
        }
        self.dispatch(shared, queue);
    }

    fn consumers_where(&self, pred: impl Fn(&ConsumerSlot) -> bool) -> Vec<(String, u64)> {
        self.queues
            .iter()
            .flat_map(|(name, q)| {
                q.consumers
                    .iter()
                    .filter(|s| pred(s))
                    .map(move |s| (name.clone(), s.id))
            })
            .collect()
    }

    fn close_channel(&mut self, shared: &Shared, channel: u64) {
        if !self.closed_channels.insert(channel) {
            return;
        }
        for (queue, consumer) in self.consumers_where(|s| s.channel == channel) {
            self.cancel_consumer(shared, &queue, consumer);
        }
    }

    fn close_connection(&mut self, shared: &Shared, connection: u64) {
        if !self.closed_connections.insert(connection) {
            return;
        }
        for (queue, consumer) in
            self.consumers_where(|s| s.connection == connection)
        {
            self.cancel_consumer(shared, &queue, consumer);
        }
        self.queues.retain(|name, q| {
            let keep = q.owner != Some(connection);
            if !keep {
                tracing::debug!(queue = %name, "exclusive queue removed with its connection");
            }
            keep
        });
    }
}

// ---------------------------------------------------------------------------
// MemoryBroker
// ---------------------------------------------------------------------------

/// An in-process broker. Cheap to clone; clones share the same state.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    shared: Shared,
}

impl MemoryBroker {
    /// Creates an empty broker with no exchanges or queues.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new connection.
    pub fn connect(&self) -> MemoryConnection {
        let mut state = lock(&self.shared);
        let id = state.next_connection;
        state.next_connection += 1;
        MemoryConnection {
            id,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Simulates a broker restart.
    ///
    /// Every open connection is dropped, non-durable queues disappear, and
    /// unacknowledged messages on durable queues become ready again.
    pub fn restart(&self) {
        let mut state = lock(&self.shared);
        state.first_live_connection = state.next_connection;
        state.queues.retain(|_, q| q.options.durability.is_durable());
        for q in state.queues.values_mut() {
            let ids: Vec<u64> = q.consumers.iter().map(|s| s.id).collect();
            q.consumers.clear();
            q.cursor = 0;
            for id in ids {
                q.requeue_consumer(id);
            }
        }
        tracing::info!(queues = state.queues.len(), "memory broker restarted");
    }

    /// Returns `true` if a queue with this name exists.
    pub fn has_queue(&self, name: &str) -> bool {
        lock(&self.shared).queues.contains_key(name)
    }

    /// Returns `true` if an exchange with this name exists.
    pub fn has_exchange(&self, name: &str) -> bool {
        lock(&self.shared).exchanges.contains_key(name)
    }

    /// Number of messages waiting for delivery in a queue.
    pub fn ready_count(&self, name: &str) -> Option<usize> {
        lock(&self.shared).queues.get(name).map(|q| q.ready.len())
    }

    /// Number of delivered but unacknowledged messages in a queue.
    pub fn unacked_count(&self, name: &str) -> Option<usize> {
        lock(&self.shared).queues.get(name).map(|q| q.unacked.len())
    }

    /// Number of active consumers on a queue.
    pub fn consumer_count(&self, name: &str) -> Option<usize> {
        lock(&self.shared).queues.get(name).map(|q| q.consumers.len())
    }
}

impl fmt::Debug for MemoryBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.shared);
        f.debug_struct("MemoryBroker")
            .field("exchanges", &state.exchanges.len())
            .field("queues", &state.queues.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// A connection to a [`MemoryBroker`]. Closes itself on drop.
pub struct MemoryConnection {
    id: u64,
    shared: Shared,
}

impl MemoryConnection {
    /// The connection's id, unique within its broker.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Broker for MemoryConnection {
    type Channel = MemoryChannel;

    async fn open_channel(&self) -> Result<MemoryChannel, BrokerError> {
        let mut state = lock(&self.shared);
        state.ensure_open(self.id, None)?;
        let id = state.next_channel;
        state.next_channel += 1;
        Ok(MemoryChannel {
            id,
            connection: self.id,
            prefetch: AtomicU16::new(0),
            shared: Arc::clone(&self.shared),
        })
    }

    async fn close(&self) -> Result<(), BrokerError> {
        lock(&self.shared).close_connection(&self.shared, self.id);
        Ok(())
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        lock(&self.shared).close_connection(&self.shared, self.id);
    }
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

/// A channel on a [`MemoryConnection`]. Closes itself on drop.
pub struct MemoryChannel {
    id: u64,
    connection: u64,
    prefetch: AtomicU16,
    shared: Shared,
}

impl fmt::Debug for MemoryChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryChannel")
            .field("id", &self.id)
            .field("connection", &self.connection)
            .finish()
    }
}

impl Channel for MemoryChannel {
    type Delivery = MemoryDelivery;
    type Consumer = MemoryConsumer;

    async fn declare_exchange(&self, name: &str, kind: ExchangeKind) -> Result<(), BrokerError> {
        let mut state = lock(&self.shared);
        state.ensure_open(self.connection, Some(self.id))?;
        state.declare_exchange(name, kind)
    }

    async fn declare_queue(&self, name: &str, options: &QueueOptions) -> Result<(), BrokerError> {
        let mut state = lock(&self.shared);
        state.ensure_open(self.connection, Some(self.id))?;
        state.declare_queue(self.connection, name, options)
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), BrokerError> {
        let mut state = lock(&self.shared);
        state.ensure_open(self.connection, Some(self.id))?;
        state.bind_queue(self.connection, queue, exchange, routing_key)
    }

    async fn set_prefetch(&self, count: u16) -> Result<(), BrokerError> {
        lock(&self.shared).ensure_open(self.connection, Some(self.id))?;
        self.prefetch.store(count, Ordering::Relaxed);
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<(), BrokerError> {
        let mut state = lock(&self.shared);
        state.ensure_open(self.connection, Some(self.id))?;
        let msg = Message {
            routing_key: routing_key.to_string(),
            content_type: content_type.to_string(),
            body,
            redelivered: false,
        };
        state.route(&self.shared, exchange, msg)
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<MemoryConsumer, BrokerError> {
        let mut state = lock(&self.shared);
        state.ensure_open(self.connection, Some(self.id))?;
        let id = state.next_consumer;
        state.next_consumer += 1;

        let (tx, rx) = mpsc::unbounded_channel();
        let q = state.queue_for(self.connection, queue)?;
        q.consumers.push(ConsumerSlot {
            id,
            channel: self.id,
            connection: self.connection,
            prefetch: self.prefetch.load(Ordering::Relaxed),
            in_flight: 0,
            sender: tx,
        });
        q.ever_consumed = true;
        state.dispatch(&self.shared, queue);

        tracing::debug!(queue, consumer_tag, "consumer started");
        Ok(MemoryConsumer {
            rx,
            queue: queue.to_string(),
            id,
            shared: Arc::clone(&self.shared),
        })
    }

    async fn close(&self) -> Result<(), BrokerError> {
        lock(&self.shared).close_channel(&self.shared, self.id);
        Ok(())
    }
}

impl Drop for MemoryChannel {
    fn drop(&mut self) {
        lock(&self.shared).close_channel(&self.shared, self.id);
    }
}

// ---------------------------------------------------------------------------
// Consumer and delivery
// ---------------------------------------------------------------------------

/// Stream of deliveries for one consumer. Cancels the consumer on drop.
pub struct MemoryConsumer {
    rx: mpsc::UnboundedReceiver<MemoryDelivery>,
    queue: String,
    id: u64,
    shared: Shared,
}

impl Stream for MemoryConsumer {
    type Item = Result<MemoryDelivery, BrokerError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx).map(|d| d.map(Ok))
    }
}

impl Drop for MemoryConsumer {
    fn drop(&mut self) {
        lock(&self.shared).cancel_consumer(&self.shared, &self.queue, self.id);
    }
}

/// A message delivered by a [`MemoryBroker`].
pub struct MemoryDelivery {
    shared: Shared,
    queue: String,
    tag: u64,
    message: Message,
}

impl MemoryDelivery {
    /// The broker-assigned delivery tag.
    pub fn tag(&self) -> u64 {
        self.tag
    }

    /// The content type the message was published with.
    pub fn content_type(&self) -> &str {
        &self.message.content_type
    }
}

impl fmt::Debug for MemoryDelivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryDelivery")
            .field("queue", &self.queue)
            .field("tag", &self.tag)
            .field("message", &self.message)
            .finish()
    }
}

impl Delivery for MemoryDelivery {
    fn body(&self) -> &[u8] {
        &self.message.body
    }

    fn routing_key(&self) -> &str {
        &self.message.routing_key
    }

    fn redelivered(&self) -> bool {
        self.message.redelivered
    }

    async fn ack(self) -> Result<(), BrokerError> {
        lock(&self.shared).settle(&self.shared, &self.queue, self.tag, Settle::Ack)
    }

    async fn nack(self, requeue: bool) -> Result<(), BrokerError> {
        let settle = if requeue { Settle::Requeue } else { Settle::Discard };
        lock(&self.shared).settle(&self.shared, &self.queue, self.tag, settle)
    }
}
