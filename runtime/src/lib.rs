//! # SyncBridge Runtime
//!
//! Runtime implementation of the synchronous bridge.
//!
//! This crate turns fire-and-forget channels into blocking call/response
//! pairs. All waiting is timeout-bound and event driven: callers park on a
//! `tokio::sync::oneshot` and are woken by the matching reply.
//!
//! ## Core Components
//!
//! - **`CorrelationStore`**: rendezvous table pairing correlation keys with
//!   buffered values or parked waiters
//! - **`SyncProducer`**: sends a request and blocks until its reply arrives
//! - **`SyncConsumer`**: receives requests and routes each reply back to the
//!   destination its request named, exactly once
//! - **`EndpointAdapter`**: blocking request handler over two channel legs
//! - **`InMemoryChannel`** / **`ChannelRegistry`**: local transport and named
//!   reply destination lookup
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use syncbridge_core::Message;
//! use syncbridge_runtime::{InMemoryChannel, SyncConsumer, SyncProducer};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let requests = InMemoryChannel::shared("requests");
//! let replies = InMemoryChannel::shared("replies");
//!
//! let producer = SyncProducer::builder("client", requests.clone())
//!     .reply_channel(replies)
//!     .build();
//! let consumer = Arc::new(SyncConsumer::builder("server", requests).build());
//!
//! let responder = Arc::clone(&consumer);
//! tokio::spawn(async move {
//!     if let Ok(request) = responder.receive(None).await {
//!         let _ = responder.send(Message::reply_for(&request, "OK")).await;
//!     }
//! });
//!
//! let reply = producer.send(Message::new("ping"), Duration::from_secs(5)).await?;
//! assert_eq!(reply.payload(), "OK");
//! # Ok(())
//! # }
//! ```

/// Endpoint adapter facade
pub mod adapter;

/// In-memory channel implementation
pub mod channel;

/// Endpoint configuration
pub mod config;

/// Server side of the bridge
pub mod consumer;

/// Rendezvous table
pub mod correlation_store;

/// Prometheus metrics for observability
pub mod metrics;

/// Client side of the bridge
pub mod producer;

/// Named channel lookup
pub mod registry;

/// Error types for the correlation store
pub mod error {
    use std::time::Duration;
    use syncbridge_core::channel::ChannelError;
    use syncbridge_core::error::BridgeError;
    use thiserror::Error;

    /// Errors that can occur during correlation store operations
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum StoreError {
        /// Nothing was stored under the key before the timeout elapsed
        ///
        /// The waiter has been removed; a value stored later is buffered.
        #[error("Timed out after {}ms waiting for correlation key '{key}'", .timeout.as_millis())]
        Timeout {
            /// Awaited key
            key: String,
            /// Timeout that elapsed
            timeout: Duration,
        },

        /// Another caller is already waiting on the key
        #[error("Correlation key '{key}' is already awaited")]
        KeyInUse {
            /// Contended key
            key: String,
        },

        /// The store was cleared while waiting
        #[error("Waiter for correlation key '{key}' was discarded")]
        Discarded {
            /// Awaited key
            key: String,
        },

        /// No correlation key was saved under the alias
        #[error("No correlation key saved under alias '{alias}'")]
        UnknownAlias {
            /// Requested alias
            alias: String,
        },
    }

    impl StoreError {
        /// Convert into the bridge error surfaced on `channel`
        #[must_use]
        pub fn into_bridge_error(self, channel: &str) -> BridgeError {
            match self {
                Self::Timeout { key, timeout } => BridgeError::ReplyTimeout {
                    channel: channel.to_string(),
                    key: Some(key),
                    timeout,
                },
                Self::KeyInUse { key } => BridgeError::KeyInUse {
                    channel: channel.to_string(),
                    key,
                },
                Self::Discarded { key } => BridgeError::Receive {
                    channel: channel.to_string(),
                    source: ChannelError::Closed(format!("{channel} (correlation key: {key})")),
                },
                unknown @ Self::UnknownAlias { .. } => BridgeError::CorrelationKey {
                    channel: channel.to_string(),
                    reason: unknown.to_string(),
                },
            }
        }
    }
}

pub use adapter::EndpointAdapter;
pub use channel::InMemoryChannel;
pub use config::{ConfigError, EndpointConfig};
pub use consumer::{SyncConsumer, SyncConsumerBuilder};
pub use correlation_store::CorrelationStore;
pub use error::StoreError;
pub use producer::{SyncProducer, SyncProducerBuilder};
pub use registry::ChannelRegistry;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use syncbridge_core::ErrorKind;

    #[test]
    fn test_store_timeout_becomes_reply_timeout() {
        let error = StoreError::Timeout {
            key: "req-1".to_string(),
            timeout: Duration::from_millis(250),
        }
        .into_bridge_error("replies");

        assert_eq!(error.kind(), ErrorKind::Timeout);
        assert_eq!(error.channel(), "replies");
        assert!(error.to_string().starts_with("Reply timed out after 250ms"));
    }

    #[test]
    fn test_unknown_alias_is_configuration_error() {
        let error = StoreError::UnknownAlias {
            alias: "correlation_key_orders".to_string(),
        }
        .into_bridge_error("requests");

        assert_eq!(error.kind(), ErrorKind::Configuration);
        assert!(error.to_string().starts_with("Failed to get correlation key"));
    }
}
