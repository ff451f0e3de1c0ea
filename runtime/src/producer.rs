//! Client side of the synchronous bridge.
//!
//! A [`SyncProducer`] turns "send a message, later receive something" into a
//! single blocking call:
//!
//! ```text
//! Idle ──send──▶ Sent ──reply stored──▶ ReplyReceived
//!                  │
//!                  └──timeout elapsed──▶ TimedOut
//! ```
//!
//! 1. The correlation key is derived from the request (message id by default)
//!    and stamped on it, together with the reply channel if one is configured.
//! 2. The request is transmitted. A transport failure is raised right away.
//! 3. The caller parks on the [`CorrelationStore`] until the reply carrying
//!    the same key arrives or the timeout elapses.
//!
//! Replies reach the store either through the background reply dispatcher,
//! which drains the configured reply channel, or through
//! [`SyncProducer::on_reply`] for transports that push them.

use crate::config::{DEFAULT_POLL_INTERVAL_MS, DEFAULT_TIMEOUT_MS, EndpointConfig};
use crate::correlation_store::CorrelationStore;
use crate::error::StoreError;
use crate::metrics::ProducerMetrics;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use syncbridge_core::channel::{Channel, ChannelError};
use syncbridge_core::correlation::{CorrelationKeyExtractor, MessageIdCorrelator};
use syncbridge_core::destination::{ReplyDestination, ReplyHandle};
use syncbridge_core::error::BridgeError;
use syncbridge_core::message::{Message, headers};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Blocking request/reply client over an asynchronous channel.
///
/// # Example
///
/// ```rust,ignore
/// let producer = SyncProducer::builder("orders", requests)
///     .reply_channel(replies)
///     .timeout(Duration::from_secs(5))
///     .build();
///
/// let reply = producer.send(Message::new("<order/>"), None).await?;
/// ```
pub struct SyncProducer {
    name: String,
    channel: Arc<dyn Channel>,
    correlator: Arc<dyn CorrelationKeyExtractor>,
    reply_channel: Option<Arc<dyn Channel>>,
    store: Arc<CorrelationStore<Message>>,
    timeout: Duration,
    poll_interval: Duration,
    dispatcher: OnceLock<JoinHandle<()>>,
}

impl SyncProducer {
    /// Start building a producer named `name` sending on `channel`
    #[must_use]
    pub fn builder(name: impl Into<String>, channel: Arc<dyn Channel>) -> SyncProducerBuilder {
        SyncProducerBuilder::new(name, channel)
    }

    /// Producer name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Default reply timeout
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Store holding replies until they are picked up
    #[must_use]
    pub const fn store(&self) -> &Arc<CorrelationStore<Message>> {
        &self.store
    }

    /// Send `message` and wait for its reply.
    ///
    /// Waits `timeout`, or the configured default when `None`.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::CorrelationKey`] if no key can be derived
    /// - [`BridgeError::Send`] if the channel rejects the request
    /// - [`BridgeError::ReplyTimeout`] if no reply arrives in time
    /// - [`BridgeError::KeyInUse`] if another call already waits on the key
    #[tracing::instrument(skip(self, message, timeout), fields(producer = %self.name, message_id = %message.id()))]
    pub async fn send(
        &self,
        message: Message,
        timeout: impl Into<Option<Duration>> + Send,
    ) -> Result<Message, BridgeError> {
        let timeout = timeout.into().unwrap_or(self.timeout);
        let started = Instant::now();

        let key = self.dispatch(message).await?;
        let reply = self.receive_for(&key, timeout).await?;

        ProducerMetrics::record_reply(started.elapsed());
        Ok(reply)
    }

    /// Send `message` without waiting, returning its correlation key.
    ///
    /// The reply can be picked up later with [`receive`](Self::receive) or
    /// [`receive_for`](Self::receive_for).
    ///
    /// # Errors
    ///
    /// - [`BridgeError::CorrelationKey`] if no key can be derived
    /// - [`BridgeError::Send`] if the channel rejects the request
    pub async fn dispatch(&self, mut message: Message) -> Result<String, BridgeError> {
        self.ensure_dispatcher();

        let key = self
            .correlator
            .key_of(&message)
            .map_err(|e| BridgeError::CorrelationKey {
                channel: self.channel.name().to_string(),
                reason: e.to_string(),
            })?;

        self.store
            .save_correlation_key(self.correlator.key_name(&self.name), key.clone());

        message.set_header(headers::CORRELATION_KEY, key.clone());
        if let Some(reply_channel) = &self.reply_channel {
            message.set_header(
                headers::REPLY_TO,
                ReplyHandle::Destination(ReplyDestination::new(Arc::clone(reply_channel))),
            );
        }

        tracing::info!(
            channel = %self.channel.name(),
            correlation_key = %key,
            "Sending message to channel"
        );

        self.channel
            .send(message)
            .await
            .map_err(|source| BridgeError::Send {
                channel: self.channel.name().to_string(),
                key: Some(key.clone()),
                source,
            })?;

        ProducerMetrics::record_request();
        Ok(key)
    }

    /// Wait for the reply to the most recently dispatched request.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::CorrelationKey`] if nothing was dispatched yet
    /// - [`BridgeError::ReplyTimeout`] if no reply arrives in time
    pub async fn receive(&self, timeout: Duration) -> Result<Message, BridgeError> {
        let key = self
            .store
            .correlation_key(&self.correlator.key_name(&self.name))
            .map_err(|e| e.into_bridge_error(self.channel.name()))?;

        self.receive_for(&key, timeout).await
    }

    /// Wait for the reply correlated with `key`.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::ReplyTimeout`] if no reply arrives in time
    /// - [`BridgeError::KeyInUse`] if another call already waits on `key`
    pub async fn receive_for(&self, key: &str, timeout: Duration) -> Result<Message, BridgeError> {
        self.ensure_dispatcher();

        match self.store.find(key, timeout).await {
            Ok(reply) => {
                tracing::info!(
                    channel = %self.reply_channel_name(),
                    correlation_key = %key,
                    "Received reply message"
                );
                Ok(reply)
            }
            Err(error) => {
                if matches!(error, StoreError::Timeout { .. }) {
                    ProducerMetrics::record_timeout();
                    tracing::warn!(
                        channel = %self.reply_channel_name(),
                        correlation_key = %key,
                        timeout_ms = timeout.as_millis(),
                        "Reply timed out"
                    );
                }
                Err(error.into_bridge_error(self.reply_channel_name()))
            }
        }
    }

    /// Hand a reply to the producer.
    ///
    /// The reply is stored under its `correlation_key` header and wakes the
    /// matching caller. Replies without that header are dropped.
    pub fn on_reply(&self, reply: Message) {
        route_reply(&self.name, &self.store, reply);
    }

    fn reply_channel_name(&self) -> &str {
        self.reply_channel
            .as_deref()
            .map_or_else(|| self.channel.name(), Channel::name)
    }

    fn ensure_dispatcher(&self) {
        let Some(reply_channel) = &self.reply_channel else {
            return;
        };

        self.dispatcher.get_or_init(|| {
            tracing::debug!(
                producer = %self.name,
                channel = %reply_channel.name(),
                "Starting reply dispatcher"
            );
            tokio::spawn(dispatch_replies(
                self.name.clone(),
                Arc::clone(reply_channel),
                Arc::clone(&self.store),
                self.poll_interval,
            ))
        });
    }
}

impl Drop for SyncProducer {
    fn drop(&mut self) {
        if let Some(dispatcher) = self.dispatcher.get() {
            dispatcher.abort();
        }
    }
}

impl std::fmt::Debug for SyncProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncProducer")
            .field("name", &self.name)
            .field("channel", &self.channel.name())
            .field("reply_channel", &self.reply_channel.as_ref().map(|c| c.name()))
            .field("timeout", &self.timeout)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

/// Drains `channel` into `store` until the channel closes.
///
/// Expired replies are purged once per poll.
async fn dispatch_replies(
    producer: String,
    channel: Arc<dyn Channel>,
    store: Arc<CorrelationStore<Message>>,
    poll_interval: Duration,
) {
    loop {
        match channel.receive(poll_interval).await {
            Ok(Some(reply)) => route_reply(&producer, &store, reply),
            Ok(None) => {}
            Err(ChannelError::Closed(name)) => {
                tracing::info!(producer = %producer, channel = %name, "Reply channel closed, stopping dispatcher");
                return;
            }
            Err(error) => {
                tracing::warn!(
                    producer = %producer,
                    channel = %channel.name(),
                    error = %error,
                    "Failed to receive from reply channel"
                );
                tokio::time::sleep(poll_interval).await;
            }
        }
        store.purge_expired();
    }
}

fn route_reply(producer: &str, store: &CorrelationStore<Message>, reply: Message) {
    let Some(key) = reply.header_text(headers::CORRELATION_KEY).map(str::to_string) else {
        ProducerMetrics::record_unroutable();
        tracing::warn!(
            producer = %producer,
            message_id = %reply.id(),
            "Dropping reply without correlation key"
        );
        return;
    };

    tracing::debug!(producer = %producer, correlation_key = %key, "Storing reply");
    store.store(key, reply);
}

/// Builder for [`SyncProducer`].
pub struct SyncProducerBuilder {
    name: String,
    channel: Arc<dyn Channel>,
    correlator: Option<Arc<dyn CorrelationKeyExtractor>>,
    reply_channel: Option<Arc<dyn Channel>>,
    timeout: Duration,
    poll_interval: Duration,
    buffer_ttl: Option<Duration>,
    store: Option<Arc<CorrelationStore<Message>>>,
}

impl SyncProducerBuilder {
    fn new(name: impl Into<String>, channel: Arc<dyn Channel>) -> Self {
        Self {
            name: name.into(),
            channel,
            correlator: None,
            reply_channel: None,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            buffer_ttl: None,
            store: None,
        }
    }

    /// Apply timeout, poll interval and buffer TTL from `config`
    #[must_use]
    pub fn config(mut self, config: &EndpointConfig) -> Self {
        self.timeout = config.timeout();
        self.poll_interval = config.poll_interval();
        self.buffer_ttl = config.buffer_ttl();
        self
    }

    /// Derive correlation keys with `correlator` instead of the message id
    #[must_use]
    pub fn correlator(mut self, correlator: Arc<dyn CorrelationKeyExtractor>) -> Self {
        self.correlator = Some(correlator);
        self
    }

    /// Advertise `channel` as `reply_to` and drain replies from it
    #[must_use]
    pub fn reply_channel(mut self, channel: Arc<dyn Channel>) -> Self {
        self.reply_channel = Some(channel);
        self
    }

    /// Default reply timeout
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// How long each reply channel receive waits
    #[must_use]
    pub const fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Share an existing reply store
    #[must_use]
    pub fn store(mut self, store: Arc<CorrelationStore<Message>>) -> Self {
        self.store = Some(store);
        self
    }

    /// Build the producer.
    ///
    /// The reply dispatcher starts on first use, inside the caller's runtime.
    #[must_use]
    pub fn build(self) -> SyncProducer {
        let buffer_ttl = self.buffer_ttl;
        let store = self.store.unwrap_or_else(|| {
            let store = CorrelationStore::new();
            Arc::new(match buffer_ttl {
                Some(ttl) => store.with_buffer_ttl(ttl),
                None => store,
            })
        });

        SyncProducer {
            name: self.name,
            channel: self.channel,
            correlator: self
                .correlator
                .unwrap_or_else(|| Arc::new(MessageIdCorrelator)),
            reply_channel: self.reply_channel,
            store,
            timeout: self.timeout,
            poll_interval: self.poll_interval,
            dispatcher: OnceLock::new(),
        }
    }
}
