//! Integration tests for synchronous request/reply round trips
//!
//! Drives producers, consumers and the endpoint adapter over in-memory
//! channels with tokio's paused clock, so timing assertions are exact.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use std::error::Error as _;
use std::sync::Arc;
use std::time::Duration;
use syncbridge_core::{
    BridgeError, Channel, ErrorKind, HeaderCorrelator, Message, MessageIdCorrelator, headers,
};
use syncbridge_runtime::{
    EndpointAdapter, EndpointConfig, InMemoryChannel, SyncConsumer, SyncProducer,
};
use syncbridge_testing::{FailingChannel, RecordingChannel, Responder, init_test_tracing};
use tokio::time::Instant;
use tokio_test::{assert_err, assert_ok};

// ============================================================================
// Test Fixtures
// ============================================================================

struct Wiring {
    requests: Arc<InMemoryChannel>,
    replies: Arc<InMemoryChannel>,
    producer: SyncProducer,
}

fn wiring() -> Wiring {
    init_test_tracing();

    let requests = InMemoryChannel::shared("requests");
    let replies = InMemoryChannel::shared("replies");
    let producer = SyncProducer::builder("client", requests.clone())
        .reply_channel(replies.clone())
        .build();

    Wiring {
        requests,
        replies,
        producer,
    }
}

fn correlated_consumer(requests: &Arc<InMemoryChannel>) -> Arc<SyncConsumer> {
    Arc::new(
        SyncConsumer::builder("server", requests.clone())
            .correlator(Arc::new(MessageIdCorrelator))
            .build(),
    )
}

// ============================================================================
// Round Trips
// ============================================================================

/// A reply arriving well before the timeout unblocks the caller immediately.
#[tokio::test(start_paused = true)]
async fn test_reply_within_timeout_returns_reply() {
    let Wiring {
        requests, producer, ..
    } = wiring();
    let consumer = correlated_consumer(&requests);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        let request = consumer.receive(Duration::from_millis(50)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        consumer
            .send(Message::reply_for(&request, "OK"))
            .await
            .unwrap();
    });

    let started = Instant::now();
    let reply = assert_ok!(
        producer
            .send(Message::new("<request/>"), Duration::from_millis(5000))
            .await
    );

    assert_eq!(reply.payload(), "OK");
    assert!(started.elapsed() < Duration::from_millis(500));
    assert!(producer.store().is_empty());
}

/// Without a reply the caller fails after exactly the configured timeout.
#[tokio::test(start_paused = true)]
async fn test_missing_reply_times_out() {
    let Wiring { producer, .. } = wiring();

    let started = Instant::now();
    let error = assert_err!(
        producer
            .send(Message::with_id("req-1", "<request/>"), Duration::from_millis(250))
            .await
    );
    let elapsed = started.elapsed();

    assert!(matches!(
        error,
        BridgeError::ReplyTimeout { ref channel, timeout, .. }
            if channel == "replies" && timeout == Duration::from_millis(250)
    ));
    assert!(error.to_string().contains("250ms"));
    assert_eq!(error.correlation_key(), Some("req-1"));
    assert!(elapsed >= Duration::from_millis(250));
    assert!(elapsed < Duration::from_millis(300));
    assert_eq!(producer.store().waiting_len(), 0);
}

/// Concurrent requests get their own replies even when replies arrive in
/// reverse order.
#[tokio::test(start_paused = true)]
async fn test_replies_in_reverse_order_are_correlated() {
    let Wiring {
        requests, producer, ..
    } = wiring();
    let consumer = correlated_consumer(&requests);

    tokio::spawn(async move {
        let first = consumer.receive(Duration::from_secs(1)).await.unwrap();
        let second = consumer.receive(Duration::from_secs(1)).await.unwrap();

        let (a, b) = if first.id() == "A" {
            (first, second)
        } else {
            (second, first)
        };
        consumer.send(Message::reply_for(&b, "reply-B")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        consumer.send(Message::reply_for(&a, "reply-A")).await.unwrap();
    });

    let (reply_a, reply_b) = tokio::join!(
        producer.send(Message::with_id("A", "request-A"), Duration::from_secs(5)),
        producer.send(Message::with_id("B", "request-B"), Duration::from_secs(5)),
    );

    assert_eq!(reply_a.unwrap().payload(), "reply-A");
    assert_eq!(reply_b.unwrap().payload(), "reply-B");
}

/// Many callers in flight at once each receive exactly their own reply.
#[tokio::test(start_paused = true)]
async fn test_many_concurrent_callers() {
    let Wiring {
        requests, producer, ..
    } = wiring();
    let responder = Responder::new(correlated_consumer(&requests))
        .with_delay(Duration::from_millis(5))
        .spawn(|request| Some(format!("re: {}", request.payload())));

    let calls = (0..20).map(|i| {
        let producer = &producer;
        async move {
            producer
                .send(Message::new(format!("call-{i}")), Duration::from_secs(5))
                .await
                .map(|reply| (i, reply))
        }
    });

    for result in futures::future::join_all(calls).await {
        let (i, reply) = result.unwrap();
        assert_eq!(reply.payload(), format!("re: call-{i}"));
    }
    assert_eq!(responder.replies_sent(), 20);
}

/// A reply stored before anyone waits is picked up without waiting.
#[tokio::test(start_paused = true)]
async fn test_dispatch_then_receive() {
    let Wiring {
        requests, producer, ..
    } = wiring();
    let consumer = correlated_consumer(&requests);

    let key = producer.dispatch(Message::new("ping")).await.unwrap();
    let request = consumer.receive(Duration::ZERO).await.unwrap();
    consumer
        .send(Message::reply_for(&request, "pong"))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(producer.store().buffered_len(), 1);

    let started = Instant::now();
    let reply = producer.receive(Duration::from_secs(5)).await.unwrap();
    assert_eq!(reply.payload(), "pong");
    assert_eq!(reply.header_text(headers::CORRELATION_KEY), Some(key.as_str()));
    assert_eq!(started.elapsed(), Duration::ZERO);
}

/// A reply arriving after the timeout is kept and can still be collected.
#[tokio::test(start_paused = true)]
async fn test_late_reply_is_buffered() {
    let Wiring {
        requests, producer, ..
    } = wiring();
    let consumer = correlated_consumer(&requests);

    let error = producer
        .send(Message::with_id("slow", "ping"), Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(error.is_timeout());

    let request = consumer.receive(Duration::ZERO).await.unwrap();
    consumer
        .send(Message::reply_for(&request, "finally"))
        .await
        .unwrap();

    let reply = producer
        .receive_for("slow", Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(reply.payload(), "finally");
}

/// Replies without a correlation key cannot be routed and are dropped.
#[tokio::test(start_paused = true)]
async fn test_reply_without_correlation_key_is_dropped() {
    let Wiring {
        replies, producer, ..
    } = wiring();

    replies.send(Message::new("stray")).await.unwrap();

    let error = producer
        .send(Message::new("ping"), Duration::from_millis(300))
        .await
        .unwrap_err();
    assert!(error.is_timeout());
    assert!(producer.store().is_empty());
}

// ============================================================================
// Failure Modes
// ============================================================================

/// Transport failures surface immediately with the cause preserved.
#[tokio::test(start_paused = true)]
async fn test_transport_failure_is_raised_immediately() {
    init_test_tracing();
    let channel = FailingChannel::new("broken", "Internal error!").shared();
    let producer = SyncProducer::builder("client", channel.clone()).build();

    let started = Instant::now();
    let error = producer
        .send(Message::with_id("req-1", "ping"), Duration::from_secs(5))
        .await
        .unwrap_err();

    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(error.kind(), ErrorKind::Transport);
    assert_eq!(error.channel(), "broken");
    assert!(error.to_string().starts_with("Failed to send message to channel 'broken'"));
    assert_eq!(
        error.source().map(ToString::to_string),
        Some("Transport error: Internal error!".to_string())
    );
    assert_eq!(channel.attempts(), 1);
    assert_eq!(producer.store().waiting_len(), 0);
}

/// A request without a derivable key is rejected before transmission.
#[tokio::test]
async fn test_key_derivation_failure_sends_nothing() {
    let channel = RecordingChannel::shared("requests");
    let producer = SyncProducer::builder("client", channel.clone())
        .correlator(Arc::new(HeaderCorrelator::new("order_id")))
        .build();

    let error = producer
        .send(Message::new("ping"), Duration::from_secs(5))
        .await
        .unwrap_err();

    assert!(matches!(error, BridgeError::CorrelationKey { .. }));
    assert!(error.to_string().starts_with("Failed to get correlation key"));
    assert_eq!(error.kind(), ErrorKind::Configuration);
    assert_eq!(channel.sent_count(), 0);
}

/// Custom correlation headers flow through to the reply.
#[tokio::test(start_paused = true)]
async fn test_header_correlator_round_trip() {
    let requests = InMemoryChannel::shared("requests");
    let replies = InMemoryChannel::shared("replies");
    let producer = SyncProducer::builder("client", requests.clone())
        .correlator(Arc::new(HeaderCorrelator::new("order_id")))
        .reply_channel(replies)
        .build();
    let consumer = correlated_consumer(&requests);

    tokio::spawn(async move {
        let request = consumer.receive(Duration::from_secs(1)).await.unwrap();
        consumer
            .send(Message::reply_for(&request, "accepted"))
            .await
            .unwrap();
    });

    let reply = producer
        .send(Message::new("order").with_header("order_id", "42"), None)
        .await
        .unwrap();

    assert_eq!(reply.payload(), "accepted");
    assert_eq!(reply.header_text(headers::CORRELATION_KEY), Some("42"));
}

/// A consumer without a correlator replies to its latest request.
#[tokio::test(start_paused = true)]
async fn test_uncorrelated_consumer_replies_to_latest_request() {
    let Wiring {
        requests,
        replies,
        producer,
    } = wiring();
    let consumer = SyncConsumer::builder("server", requests.clone()).build();

    producer.dispatch(Message::with_id("req-1", "ping")).await.unwrap();
    consumer.receive(None).await.unwrap();
    consumer.send(Message::new("pong")).await.unwrap();

    let reply = producer.receive(Duration::from_secs(1)).await.unwrap();
    assert_eq!(reply.payload(), "pong");
    assert_eq!(reply.header_text(headers::CORRELATION_KEY), Some("req-1"));
    assert!(replies.is_empty());
}

// ============================================================================
// Endpoint Adapter
// ============================================================================

/// The adapter answers requests through its handler.
#[tokio::test(start_paused = true)]
async fn test_adapter_round_trip() {
    init_test_tracing();
    let adapter = EndpointAdapter::new(
        EndpointConfig::new("greeter"),
        InMemoryChannel::shared("inbound"),
        InMemoryChannel::shared("outbound"),
    );
    let _responder = Responder::new(adapter.handler())
        .spawn(|request| Some(format!("Hello {}", request.payload())));

    let response = adapter
        .handle_message(Message::new("world"), None)
        .await
        .unwrap();

    assert_eq!(response.unwrap().payload(), "Hello world");
}

/// The adapter reports a missing response instead of failing.
#[tokio::test(start_paused = true)]
async fn test_adapter_no_response() {
    init_test_tracing();
    let adapter = EndpointAdapter::new(
        EndpointConfig::new("greeter").with_timeout_ms(400),
        InMemoryChannel::shared("inbound"),
        InMemoryChannel::shared("outbound"),
    );
    let _responder = Responder::new(adapter.handler()).spawn(|_| None);

    let started = Instant::now();
    let response = adapter
        .handle_message(Message::new("world"), None)
        .await
        .unwrap();

    assert!(response.is_none());
    assert!(started.elapsed() >= Duration::from_millis(400));
}

/// Transport errors on the inbound leg are still reported.
#[tokio::test]
async fn test_adapter_propagates_transport_errors() {
    let adapter = EndpointAdapter::new(
        EndpointConfig::new("greeter"),
        FailingChannel::new("inbound", "down").shared(),
        InMemoryChannel::shared("outbound"),
    );

    let error = adapter
        .handle_message(Message::new("world"), Some(Duration::from_secs(1)))
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Transport);
}

// ============================================================================
// Expiry
// ============================================================================

/// Unanswered requests leave nothing behind once the buffer TTL passes.
#[tokio::test(start_paused = true)]
async fn test_adapter_forgets_unanswered_requests() {
    init_test_tracing();
    let adapter = EndpointAdapter::new(
        EndpointConfig::new("greeter")
            .with_timeout_ms(100)
            .with_buffer_ttl_ms(50),
        InMemoryChannel::shared("inbound"),
        InMemoryChannel::shared("outbound"),
    );
    let handler = adapter.handler();

    for i in 0..10 {
        let response = adapter
            .handle_message(Message::new(format!("request-{i}")), None)
            .await
            .unwrap();
        assert!(response.is_none());
        handler.receive(Duration::ZERO).await.unwrap();
    }
    assert!(handler.pending_replies() > 0);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(handler.pending_replies(), 0);
}

/// Replies that arrive after their caller gave up expire without a lookup.
#[tokio::test(start_paused = true)]
async fn test_late_replies_expire_from_producer_store() {
    init_test_tracing();
    let requests = InMemoryChannel::shared("requests");
    let producer = SyncProducer::builder("client", requests.clone())
        .config(&EndpointConfig::new("client").with_buffer_ttl_ms(50))
        .reply_channel(InMemoryChannel::shared("replies"))
        .build();
    let consumer = correlated_consumer(&requests);

    for i in 0..10 {
        let error = producer
            .send(Message::with_id(format!("slow-{i}"), "ping"), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(error.is_timeout());

        let request = consumer.receive(Duration::ZERO).await.unwrap();
        consumer
            .send(Message::reply_for(&request, "too late"))
            .await
            .unwrap();
    }

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(producer.store().buffered_len(), 0);
    assert_eq!(producer.store().purge_expired(), 0);
    assert_eq!(consumer.pending_replies(), 0);
}
