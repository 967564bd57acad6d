//! Integration tests for the in-memory broker.

use std::time::Duration;

use futures_util::StreamExt;
use peril_broker::{
    Broker, BrokerError, Channel, Delivery, Durability, ExchangeKind,
    MemoryBroker, MemoryConsumer, MemoryDelivery, QueueOptions,
};

// =========================================================================
// Helpers
// =========================================================================

const TOPIC: &str = "test_topic";
const DLX: &str = "test_dlx";

async fn next(consumer: &mut MemoryConsumer) -> MemoryDelivery {
    tokio::time::timeout(Duration::from_secs(1), consumer.next())
        .await
        .expect("timed out waiting for delivery")
        .expect("consumer stream ended")
        .expect("delivery error")
}

async fn assert_idle(consumer: &mut MemoryConsumer) {
    let res =
        tokio::time::timeout(Duration::from_millis(50), consumer.next()).await;
    assert!(res.is_err(), "expected no delivery, got {res:?}");
}

fn durable() -> QueueOptions {
    QueueOptions::new(Durability::Durable).dead_letter(DLX)
}

fn transient() -> QueueOptions {
    QueueOptions::new(Durability::Transient).dead_letter(DLX)
}

// =========================================================================
// Declaration
// =========================================================================

#[tokio::test]
async fn test_redeclare_identical_queue_is_idempotent() {
    let broker = MemoryBroker::new();
    let conn = broker.connect();
    let ch = conn.open_channel().await.unwrap();

    ch.declare_exchange(TOPIC, ExchangeKind::Topic).await.unwrap();
    ch.declare_queue("war", &durable()).await.unwrap();
    ch.bind_queue("war", TOPIC, "war.*").await.unwrap();

    ch.declare_exchange(TOPIC, ExchangeKind::Topic).await.unwrap();
    ch.declare_queue("war", &durable()).await.unwrap();
    ch.bind_queue("war", TOPIC, "war.*").await.unwrap();

    assert!(broker.has_queue("war"));
}

#[tokio::test]
async fn test_redeclare_with_conflicting_durability_fails() {
    let broker = MemoryBroker::new();
    let conn = broker.connect();
    let ch = conn.open_channel().await.unwrap();

    ch.declare_queue("war", &durable()).await.unwrap();
    let err = ch
        .declare_queue("war", &QueueOptions::new(Durability::Durable))
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::PreconditionFailed(_)));
}

#[tokio::test]
async fn test_bind_to_missing_exchange_fails() {
    let broker = MemoryBroker::new();
    let conn = broker.connect();
    let ch = conn.open_channel().await.unwrap();
    ch.declare_queue("q", &durable()).await.unwrap();

    let err = ch.bind_queue("q", "nope", "k").await.unwrap_err();
    assert!(matches!(err, BrokerError::NotFound { kind: "exchange", .. }));
}

#[tokio::test]
async fn test_publish_to_missing_exchange_fails() {
    let broker = MemoryBroker::new();
    let conn = broker.connect();
    let ch = conn.open_channel().await.unwrap();

    let err = ch
        .publish("nope", "k", "text/plain", b"x".to_vec())
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::NotFound { .. }));
}

// =========================================================================
// Routing
// =========================================================================

#[tokio::test]
async fn test_topic_routing_reaches_only_matching_queues() {
    let broker = MemoryBroker::new();
    let conn = broker.connect();
    let ch = conn.open_channel().await.unwrap();
    ch.declare_exchange(TOPIC, ExchangeKind::Topic).await.unwrap();
    ch.declare_queue("moves", &durable()).await.unwrap();
    ch.bind_queue("moves", TOPIC, "army_moves.*").await.unwrap();
    ch.declare_queue("wars", &durable()).await.unwrap();
    ch.bind_queue("wars", TOPIC, "war.*").await.unwrap();

    ch.publish(TOPIC, "army_moves.alice", "text/plain", b"m".to_vec())
        .await
        .unwrap();

    assert_eq!(broker.ready_count("moves"), Some(1));
    assert_eq!(broker.ready_count("wars"), Some(0));
}

#[tokio::test]
async fn test_overlapping_bindings_deliver_once_per_queue() {
    let broker = MemoryBroker::new();
    let conn = broker.connect();
    let ch = conn.open_channel().await.unwrap();
    ch.declare_exchange(TOPIC, ExchangeKind::Topic).await.unwrap();
    ch.declare_queue("logs", &durable()).await.unwrap();
    ch.bind_queue("logs", TOPIC, "game_logs.*").await.unwrap();
    ch.bind_queue("logs", TOPIC, "game_logs.#").await.unwrap();

    ch.publish(TOPIC, "game_logs.alice", "text/plain", b"l".to_vec())
        .await
        .unwrap();

    assert_eq!(broker.ready_count("logs"), Some(1));
}

#[tokio::test]
async fn test_direct_exchange_requires_exact_key() {
    let broker = MemoryBroker::new();
    let conn = broker.connect();
    let ch = conn.open_channel().await.unwrap();
    ch.declare_exchange("direct", ExchangeKind::Direct).await.unwrap();
    ch.declare_queue("pause.alice", &transient()).await.unwrap();
    ch.bind_queue("pause.alice", "direct", "pause").await.unwrap();

    ch.publish("direct", "pause.x", "text/plain", b"p".to_vec()).await.unwrap();
    assert_eq!(broker.ready_count("pause.alice"), Some(0));

    ch.publish("direct", "pause", "text/plain", b"p".to_vec()).await.unwrap();
    assert_eq!(broker.ready_count("pause.alice"), Some(1));
}

// =========================================================================
// Acknowledgment
// =========================================================================

#[tokio::test]
async fn test_ack_removes_message() {
    let broker = MemoryBroker::new();
    let conn = broker.connect();
    let ch = conn.open_channel().await.unwrap();
    ch.declare_exchange(TOPIC, ExchangeKind::Topic).await.unwrap();
    ch.declare_queue("q", &durable()).await.unwrap();
    ch.bind_queue("q", TOPIC, "k").await.unwrap();
    let mut consumer = ch.consume("q", "c").await.unwrap();

    ch.publish(TOPIC, "k", "text/plain", b"hello".to_vec()).await.unwrap();
    let d = next(&mut consumer).await;
    assert_eq!(d.body(), b"hello");
    assert_eq!(d.routing_key(), "k");
    assert_eq!(d.content_type(), "text/plain");
    assert!(!d.redelivered());
    assert_eq!(broker.unacked_count("q"), Some(1));

    d.ack().await.unwrap();
    assert_eq!(broker.unacked_count("q"), Some(0));
    assert_eq!(broker.ready_count("q"), Some(0));
}

#[tokio::test]
async fn test_nack_requeue_redelivers_with_flag() {
    let broker = MemoryBroker::new();
    let conn = broker.connect();
    let ch = conn.open_channel().await.unwrap();
    ch.declare_exchange(TOPIC, ExchangeKind::Topic).await.unwrap();
    ch.declare_queue("q", &durable()).await.unwrap();
    ch.bind_queue("q", TOPIC, "k").await.unwrap();
    let mut consumer = ch.consume("q", "c").await.unwrap();

    ch.publish(TOPIC, "k", "text/plain", b"again".to_vec()).await.unwrap();
    next(&mut consumer).await.nack(true).await.unwrap();

    let d = next(&mut consumer).await;
    assert_eq!(d.body(), b"again");
    assert!(d.redelivered());
    d.ack().await.unwrap();
}

#[tokio::test]
async fn test_nack_discard_dead_letters_with_original_key() {
    let broker = MemoryBroker::new();
    let conn = broker.connect();
    let ch = conn.open_channel().await.unwrap();
    ch.declare_exchange(TOPIC, ExchangeKind::Topic).await.unwrap();
    ch.declare_exchange(DLX, ExchangeKind::Fanout).await.unwrap();
    ch.declare_queue("dlq", &QueueOptions::new(Durability::Durable))
        .await
        .unwrap();
    ch.bind_queue("dlq", DLX, "").await.unwrap();
    ch.declare_queue("q", &durable()).await.unwrap();
    ch.bind_queue("q", TOPIC, "k.*").await.unwrap();
    let mut consumer = ch.consume("q", "c").await.unwrap();
    let mut dead = ch.consume("dlq", "dead").await.unwrap();

    ch.publish(TOPIC, "k.alice", "text/plain", b"poison".to_vec())
        .await
        .unwrap();
    next(&mut consumer).await.nack(false).await.unwrap();

    let d = next(&mut dead).await;
    assert_eq!(d.body(), b"poison");
    assert_eq!(d.routing_key(), "k.alice");
    assert_eq!(broker.ready_count("q"), Some(0));
}

#[tokio::test]
async fn test_requeued_delivery_gets_fresh_tag() {
    let broker = MemoryBroker::new();
    let conn = broker.connect();
    let ch = conn.open_channel().await.unwrap();
    ch.declare_exchange(TOPIC, ExchangeKind::Topic).await.unwrap();
    ch.declare_queue("q", &durable()).await.unwrap();
    ch.bind_queue("q", TOPIC, "k").await.unwrap();

    let mut consumer = ch.consume("q", "c").await.unwrap();
    ch.publish(TOPIC, "k", "text/plain", b"x".to_vec()).await.unwrap();
    let d = next(&mut consumer).await;
    let tag = d.tag();
    d.nack(true).await.unwrap();
    let again = next(&mut consumer).await;
    assert_ne!(again.tag(), tag);
    again.ack().await.unwrap();
}

// =========================================================================
// Prefetch
// =========================================================================

#[tokio::test]
async fn test_prefetch_bounds_unacked_deliveries() {
    let broker = MemoryBroker::new();
    let conn = broker.connect();
    let ch = conn.open_channel().await.unwrap();
    ch.declare_exchange(TOPIC, ExchangeKind::Topic).await.unwrap();
    ch.declare_queue("q", &durable()).await.unwrap();
    ch.bind_queue("q", TOPIC, "k").await.unwrap();
    ch.set_prefetch(2).await.unwrap();
    let mut consumer = ch.consume("q", "c").await.unwrap();

    for i in 0..5u8 {
        ch.publish(TOPIC, "k", "text/plain", vec![i]).await.unwrap();
    }

    let first = next(&mut consumer).await;
    let second = next(&mut consumer).await;
    assert_idle(&mut consumer).await;
    assert_eq!(broker.unacked_count("q"), Some(2));
    assert_eq!(broker.ready_count("q"), Some(3));

    first.ack().await.unwrap();
    let third = next(&mut consumer).await;
    assert_eq!(third.body(), &[2u8]);
    second.ack().await.unwrap();
    third.ack().await.unwrap();
}

#[tokio::test]
async fn test_deliveries_arrive_in_publish_order() {
    let broker = MemoryBroker::new();
    let conn = broker.connect();
    let ch = conn.open_channel().await.unwrap();
    ch.declare_exchange(TOPIC, ExchangeKind::Topic).await.unwrap();
    ch.declare_queue("q", &durable()).await.unwrap();
    ch.bind_queue("q", TOPIC, "k").await.unwrap();
    let mut consumer = ch.consume("q", "c").await.unwrap();

    for i in 0..10u8 {
        ch.publish(TOPIC, "k", "text/plain", vec![i]).await.unwrap();
    }
    for i in 0..10u8 {
        let d = next(&mut consumer).await;
        assert_eq!(d.body(), &[i]);
        d.ack().await.unwrap();
    }
}

// =========================================================================
// Lifecycle
// =========================================================================

#[tokio::test]
async fn test_transient_queue_auto_deletes_when_consumer_drops() {
    let broker = MemoryBroker::new();
    let conn = broker.connect();
    let ch = conn.open_channel().await.unwrap();
    ch.declare_queue("army_moves.alice", &transient()).await.unwrap();
    let consumer = ch.consume("army_moves.alice", "c").await.unwrap();
    assert!(broker.has_queue("army_moves.alice"));

    drop(consumer);
    assert!(!broker.has_queue("army_moves.alice"));
}

#[tokio::test]
async fn test_durable_queue_survives_consumer_drop() {
    let broker = MemoryBroker::new();
    let conn = broker.connect();
    let ch = conn.open_channel().await.unwrap();
    ch.declare_queue("war", &durable()).await.unwrap();
    let consumer = ch.consume("war", "c").await.unwrap();
    drop(consumer);
    assert!(broker.has_queue("war"));
}

#[tokio::test]
async fn test_exclusive_queue_is_locked_to_its_connection() {
    let broker = MemoryBroker::new();
    let owner = broker.connect();
    let other = broker.connect();
    let owner_ch = owner.open_channel().await.unwrap();
    let other_ch = other.open_channel().await.unwrap();

    owner_ch.declare_queue("pause.alice", &transient()).await.unwrap();
    let err = other_ch
        .declare_queue("pause.alice", &transient())
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::ResourceLocked(_)));
    assert!(other_ch.consume("pause.alice", "c").await.is_err());

    drop(owner_ch);
    drop(owner);
    assert!(!broker.has_queue("pause.alice"));
}

#[tokio::test]
async fn test_closing_channel_requeues_unacked_and_ends_stream() {
    let broker = MemoryBroker::new();
    let conn = broker.connect();
    let setup = conn.open_channel().await.unwrap();
    setup.declare_exchange(TOPIC, ExchangeKind::Topic).await.unwrap();
    setup.declare_queue("war", &durable()).await.unwrap();
    setup.bind_queue("war", TOPIC, "war.*").await.unwrap();

    let ch = conn.open_channel().await.unwrap();
    let mut consumer = ch.consume("war", "c").await.unwrap();
    setup
        .publish(TOPIC, "war.alice", "text/plain", b"w".to_vec())
        .await
        .unwrap();
    let d = next(&mut consumer).await;

    ch.close().await.unwrap();
    assert_eq!(broker.ready_count("war"), Some(1));
    assert!(matches!(d.ack().await, Err(BrokerError::UnknownDelivery(_))));
    assert!(consumer.next().await.is_none());
    assert!(matches!(
        ch.publish(TOPIC, "war.alice", "text/plain", vec![]).await,
        Err(BrokerError::ChannelClosed)
    ));
}

#[tokio::test]
async fn test_restart_keeps_durable_and_drops_transient() {
    let broker = MemoryBroker::new();
    let conn = broker.connect();
    let ch = conn.open_channel().await.unwrap();
    ch.declare_exchange(TOPIC, ExchangeKind::Topic).await.unwrap();
    ch.declare_queue("war", &durable()).await.unwrap();
    ch.bind_queue("war", TOPIC, "war.*").await.unwrap();
    ch.declare_queue("army_moves.alice", &transient()).await.unwrap();
    ch.bind_queue("army_moves.alice", TOPIC, "army_moves.*")
        .await
        .unwrap();

    ch.publish(TOPIC, "war.alice", "text/plain", b"w".to_vec()).await.unwrap();
    broker.restart();

    assert!(broker.has_queue("war"));
    assert_eq!(broker.ready_count("war"), Some(1));
    assert!(!broker.has_queue("army_moves.alice"));
    assert!(matches!(conn.open_channel().await, Err(BrokerError::ChannelClosed)));

    let fresh = broker.connect();
    let ch = fresh.open_channel().await.unwrap();
    let mut consumer = ch.consume("war", "c").await.unwrap();
    let d = next(&mut consumer).await;
    assert_eq!(d.body(), b"w");
    d.ack().await.unwrap();
}
