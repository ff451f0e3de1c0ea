//! Blocking request handler over two channel legs.
//!
//! An [`EndpointAdapter`] lets code that expects a plain request handler
//! (take a message, return a response) talk to a responder that only sees
//! asynchronous channels:
//!
//! ```text
//!                    inbound leg
//! handle_message ─────────────────▶ handler().receive()
//!       ▲                                   │
//!       │            outbound leg           ▼
//!       └───────────────────────────── handler().send(reply)
//! ```
//!
//! Both legs are independent channels; the responder runs on its own task.

use crate::config::EndpointConfig;
use crate::consumer::SyncConsumer;
use crate::metrics::AdapterMetrics;
use crate::producer::SyncProducer;
use std::sync::Arc;
use std::time::Duration;
use syncbridge_core::channel::Channel;
use syncbridge_core::error::BridgeError;
use syncbridge_core::message::Message;

/// Synchronous request handler facade.
///
/// # Example
///
/// ```rust,ignore
/// let adapter = EndpointAdapter::new(config, inbound, outbound);
///
/// let handler = adapter.handler();
/// tokio::spawn(async move {
///     let request = handler.receive(None).await?;
///     handler.send(Message::reply_for(&request, "OK")).await
/// });
///
/// let response = adapter.handle_message(Message::new("ping"), None).await?;
/// ```
#[derive(Debug)]
pub struct EndpointAdapter {
    config: EndpointConfig,
    producer: SyncProducer,
    handler: Arc<SyncConsumer>,
}

impl EndpointAdapter {
    /// Create an adapter pushing requests on `inbound` and collecting
    /// responses from `outbound`
    #[must_use]
    pub fn new(
        config: EndpointConfig,
        inbound: Arc<dyn Channel>,
        outbound: Arc<dyn Channel>,
    ) -> Self {
        let producer = SyncProducer::builder(config.name.clone(), Arc::clone(&inbound))
            .config(&config)
            .reply_channel(outbound)
            .build();
        let handler = SyncConsumer::builder(config.name.clone(), inbound)
            .config(&config)
            .build();

        Self {
            config,
            producer,
            handler: Arc::new(handler),
        }
    }

    /// Endpoint configuration
    #[must_use]
    pub const fn config(&self) -> &EndpointConfig {
        &self.config
    }

    /// Consumer for the responding side of the inbound leg
    #[must_use]
    pub fn handler(&self) -> Arc<SyncConsumer> {
        Arc::clone(&self.handler)
    }

    /// Push `request` onto the inbound leg and wait for the response.
    ///
    /// Waits `timeout`, or the configured timeout when `None`. Returns
    /// `Ok(None)` when no response arrives in time.
    ///
    /// # Errors
    ///
    /// Returns any [`BridgeError`] other than a reply timeout, such as a
    /// transport failure on the inbound leg.
    #[tracing::instrument(skip(self, request), fields(endpoint = %self.config.name))]
    pub async fn handle_message(
        &self,
        request: Message,
        timeout: Option<Duration>,
    ) -> Result<Option<Message>, BridgeError> {
        let timeout = timeout.unwrap_or_else(|| self.config.timeout());

        match self.producer.send(request, timeout).await {
            Ok(response) => Ok(Some(response)),
            Err(BridgeError::ReplyTimeout { .. }) => {
                AdapterMetrics::record_no_response();
                tracing::info!(
                    timeout_ms = timeout.as_millis(),
                    "Did not receive reply message - no response is simulated"
                );
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }
}
