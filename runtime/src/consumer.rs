//! Server side of the synchronous bridge.
//!
//! A [`SyncConsumer`] receives requests and remembers, per correlation key,
//! where the reply to each one must go. [`SyncConsumer::send`] later routes a
//! reply to that destination and forgets it, so every destination is used at
//! most once.
//!
//! Reply key selection:
//!
//! - With a correlator configured, the reply must carry the
//!   `correlation_key` header (as built by [`Message::reply_for`]).
//! - Without one, the key of the most recently received request is used.

use crate::config::{DEFAULT_TIMEOUT_MS, EndpointConfig};
use crate::correlation_store::CorrelationStore;
use crate::metrics::ConsumerMetrics;
use std::sync::Arc;
use std::time::Duration;
use syncbridge_core::channel::Channel;
use syncbridge_core::correlation::{CorrelationKeyExtractor, MessageIdCorrelator};
use syncbridge_core::destination::{ReplyDestination, ReplyDestinationResolver, ReplyHandle};
use syncbridge_core::error::BridgeError;
use syncbridge_core::message::{Message, headers};

/// Receives requests and routes replies back to their senders.
///
/// # Example
///
/// ```rust,ignore
/// let consumer = SyncConsumer::builder("orders", requests).build();
///
/// let request = consumer.receive(None).await?;
/// consumer.send(Message::reply_for(&request, "<ack/>")).await?;
/// ```
pub struct SyncConsumer {
    name: String,
    channel: Arc<dyn Channel>,
    correlator: Option<Arc<dyn CorrelationKeyExtractor>>,
    resolver: Option<Arc<dyn ReplyDestinationResolver>>,
    destinations: CorrelationStore<ReplyDestination>,
    timeout: Duration,
}

impl SyncConsumer {
    /// Start building a consumer named `name` receiving from `channel`
    #[must_use]
    pub fn builder(name: impl Into<String>, channel: Arc<dyn Channel>) -> SyncConsumerBuilder {
        SyncConsumerBuilder::new(name, channel)
    }

    /// Consumer name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Channel requests are received from
    #[must_use]
    pub fn channel(&self) -> &Arc<dyn Channel> {
        &self.channel
    }

    /// Number of requests still awaiting a reply.
    ///
    /// Destinations older than the buffer TTL are no longer counted.
    #[must_use]
    pub fn pending_replies(&self) -> usize {
        self.destinations.buffered_len()
    }

    /// Wait for the next request.
    ///
    /// Waits `timeout`, or the configured default when `None`. If the request
    /// names a reply destination, it is recorded under the request's
    /// correlation key.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::ReceiveTimeout`] if nothing arrives in time
    /// - [`BridgeError::Receive`] if the channel fails
    /// - [`BridgeError::UnresolvedDestination`] if a named reply destination
    ///   cannot be resolved
    /// - [`BridgeError::CorrelationKey`] if the request has no derivable key
    #[tracing::instrument(skip(self, timeout), fields(consumer = %self.name))]
    pub async fn receive(
        &self,
        timeout: impl Into<Option<Duration>> + Send,
    ) -> Result<Message, BridgeError> {
        let timeout = timeout.into().unwrap_or(self.timeout);

        let request = self
            .channel
            .receive(timeout)
            .await
            .map_err(|source| BridgeError::Receive {
                channel: self.channel.name().to_string(),
                source,
            })?
            .ok_or_else(|| BridgeError::ReceiveTimeout {
                channel: self.channel.name().to_string(),
                timeout,
            })?;

        ConsumerMetrics::record_receive();
        tracing::info!(
            channel = %self.channel.name(),
            message_id = %request.id(),
            "Received message from channel"
        );

        self.save_reply_destination(&request)?;
        Ok(request)
    }

    /// Route `reply` to the destination of its request.
    ///
    /// Accepts `Option<Message>` so a missing reply is reported instead of
    /// silently skipped. The destination is consumed whether or not the
    /// transmission succeeds.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::EmptyMessage`] if `reply` is `None`
    /// - [`BridgeError::MissingCorrelation`] if a correlator is configured and
    ///   the reply lacks the `correlation_key` header
    /// - [`BridgeError::NoReplyDestination`] if no destination is recorded
    /// - [`BridgeError::Send`] if the destination channel rejects the reply
    #[tracing::instrument(skip(self, reply), fields(consumer = %self.name))]
    pub async fn send(
        &self,
        reply: impl Into<Option<Message>> + Send,
    ) -> Result<(), BridgeError> {
        let Some(mut reply) = reply.into() else {
            ConsumerMetrics::record_reply_error();
            return Err(BridgeError::EmptyMessage {
                channel: self.channel.name().to_string(),
            });
        };

        let key = self.reply_key(&reply).inspect_err(|_| {
            ConsumerMetrics::record_reply_error();
        })?;

        let Some(destination) = self.destinations.take(&key) else {
            ConsumerMetrics::record_reply_error();
            return Err(BridgeError::NoReplyDestination {
                channel: self.channel.name().to_string(),
                key: Some(key),
            });
        };

        if reply.header_text(headers::CORRELATION_KEY).is_none() {
            reply.set_header(headers::CORRELATION_KEY, key.clone());
        }

        tracing::info!(
            channel = %destination.name(),
            correlation_key = %key,
            "Sending reply message"
        );

        destination
            .channel()
            .send(reply)
            .await
            .map_err(|source| {
                ConsumerMetrics::record_reply_error();
                BridgeError::Send {
                    channel: destination.name().to_string(),
                    key: Some(key.clone()),
                    source,
                }
            })?;

        ConsumerMetrics::record_reply();
        Ok(())
    }

    fn save_reply_destination(&self, request: &Message) -> Result<(), BridgeError> {
        let Some(handle) = request.reply_to() else {
            tracing::debug!(
                message_id = %request.id(),
                "Request names no reply destination, no reply expected"
            );
            return Ok(());
        };

        let destination = self.resolve(handle)?;
        let correlator = self.correlator();
        let key = correlator
            .key_of(request)
            .map_err(|e| BridgeError::CorrelationKey {
                channel: self.channel.name().to_string(),
                reason: e.to_string(),
            })?;

        tracing::debug!(
            correlation_key = %key,
            reply_to = %destination.name(),
            "Saving reply destination"
        );
        self.destinations
            .save_correlation_key(correlator.key_name(&self.name), key.clone());
        self.destinations.store(key, destination);
        Ok(())
    }

    fn resolve(&self, handle: &ReplyHandle) -> Result<ReplyDestination, BridgeError> {
        match handle {
            ReplyHandle::Destination(destination) => Ok(destination.clone()),
            ReplyHandle::Name(name) => match &self.resolver {
                Some(resolver) => resolver.resolve(name),
                None => Err(BridgeError::UnresolvedDestination {
                    name: name.clone(),
                    reason: "no reply destination resolver configured".to_string(),
                }),
            },
        }
    }

    fn reply_key(&self, reply: &Message) -> Result<String, BridgeError> {
        if self.correlator.is_some() {
            return reply
                .header_text(headers::CORRELATION_KEY)
                .map(str::to_string)
                .ok_or_else(|| BridgeError::MissingCorrelation {
                    channel: self.channel.name().to_string(),
                    header: headers::CORRELATION_KEY.to_string(),
                });
        }

        self.destinations
            .correlation_key(&MessageIdCorrelator.key_name(&self.name))
            .map_err(|_| BridgeError::NoReplyDestination {
                channel: self.channel.name().to_string(),
                key: None,
            })
    }

    fn correlator(&self) -> &dyn CorrelationKeyExtractor {
        self.correlator
            .as_deref()
            .unwrap_or(&MessageIdCorrelator)
    }
}

impl std::fmt::Debug for SyncConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncConsumer")
            .field("name", &self.name)
            .field("channel", &self.channel.name())
            .field("correlated", &self.correlator.is_some())
            .field("timeout", &self.timeout)
            .field("pending_replies", &self.pending_replies())
            .finish_non_exhaustive()
    }
}

/// Builder for [`SyncConsumer`].
pub struct SyncConsumerBuilder {
    name: String,
    channel: Arc<dyn Channel>,
    correlator: Option<Arc<dyn CorrelationKeyExtractor>>,
    resolver: Option<Arc<dyn ReplyDestinationResolver>>,
    timeout: Duration,
    buffer_ttl: Option<Duration>,
}

impl SyncConsumerBuilder {
    fn new(name: impl Into<String>, channel: Arc<dyn Channel>) -> Self {
        Self {
            name: name.into(),
            channel,
            correlator: None,
            resolver: None,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            buffer_ttl: None,
        }
    }

    /// Apply receive timeout and buffer TTL from `config`
    #[must_use]
    pub fn config(mut self, config: &EndpointConfig) -> Self {
        self.timeout = config.timeout();
        self.buffer_ttl = config.buffer_ttl();
        self
    }

    /// Correlate replies by their `correlation_key` header
    #[must_use]
    pub fn correlator(mut self, correlator: Arc<dyn CorrelationKeyExtractor>) -> Self {
        self.correlator = Some(correlator);
        self
    }

    /// Resolve named reply destinations through `resolver`
    #[must_use]
    pub fn resolver(mut self, resolver: Arc<dyn ReplyDestinationResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Default receive timeout
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Forget reply destinations left unanswered for `ttl`
    #[must_use]
    pub const fn buffer_ttl(mut self, ttl: Duration) -> Self {
        self.buffer_ttl = Some(ttl);
        self
    }

    /// Build the consumer
    #[must_use]
    pub fn build(self) -> SyncConsumer {
        let destinations = match self.buffer_ttl {
            Some(ttl) => CorrelationStore::new().with_buffer_ttl(ttl),
            None => CorrelationStore::new(),
        };

        SyncConsumer {
            name: self.name,
            channel: self.channel,
            correlator: self.correlator,
            resolver: self.resolver,
            destinations,
            timeout: self.timeout,
        }
    }
}
