//! # SyncBridge Testing
//!
//! Testing utilities and helpers for the SyncBridge request/reply engine.
//!
//! This crate provides:
//! - Channel test doubles (failing and recording channels)
//! - A scripted [`Responder`] playing the remote side of a round trip
//! - Tracing setup for test output
//!
//! ## Example
//!
//! ```ignore
//! use syncbridge_testing::{Responder, init_test_tracing};
//!
//! #[tokio::test]
//! async fn test_round_trip() {
//!     init_test_tracing();
//!
//!     let requests = InMemoryChannel::shared("requests");
//!     let replies = InMemoryChannel::shared("replies");
//!     let consumer = Arc::new(SyncConsumer::builder("server", requests.clone()).build());
//!     let _responder = Responder::new(consumer).echo();
//!
//!     let producer = SyncProducer::builder("client", requests)
//!         .reply_channel(replies)
//!         .build();
//!     let reply = producer.send(Message::new("ping"), None).await.unwrap();
//!     assert_eq!(reply.payload(), "ping");
//! }
//! ```

mod channel_mocks;
mod responder;

/// Test helpers and utilities
pub mod helpers {
    use tracing_subscriber::EnvFilter;

    /// Install a tracing subscriber writing to the test output.
    ///
    /// Filtering follows `RUST_LOG`, defaulting to debug for the bridge crates. Safe to
    /// call from every test; only the first call installs the subscriber.
    pub fn init_test_tracing() {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("syncbridge_core=debug,syncbridge_runtime=debug"));

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::prelude::*;

    /// Correlation keys as produced by real traffic: short, non-empty and
    /// free of whitespace.
    pub fn correlation_key() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9_-]{1,24}"
    }

    /// Between 1 and `max` distinct correlation keys.
    pub fn distinct_keys(max: usize) -> impl Strategy<Value = Vec<String>> {
        prop::collection::hash_set(correlation_key(), 1..=max)
            .prop_map(|keys| keys.into_iter().collect())
    }
}

// Re-export commonly used items
pub use channel_mocks::{FailingChannel, RecordingChannel};
pub use helpers::init_test_tracing;
pub use responder::Responder;
