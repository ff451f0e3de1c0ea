//! Channel abstraction: an opaque, fire-and-forget mailbox.
//!
//! The bridge never talks to a broker directly. Every transport (in-memory
//! queue, JMS destination, HTTP callback, ...) is exposed through the
//! [`Channel`] trait and the bridge layers synchronous call/response semantics
//! on top of it.
//!
//! # Dyn Compatibility
//!
//! Like the other collaborator traits in this crate, [`Channel`] returns
//! `Pin<Box<dyn Future>>` instead of using `async fn`, so channels can be
//! shared as `Arc<dyn Channel>` and embedded in message headers as reply
//! destinations.
//!
//! # Example
//!
//! ```rust,ignore
//! use syncbridge_core::channel::Channel;
//! use std::time::Duration;
//!
//! async fn echo(channel: &dyn Channel) -> Result<(), ChannelError> {
//!     if let Some(message) = channel.receive(Duration::from_secs(1)).await? {
//!         channel.send(message).await?;
//!     }
//!     Ok(())
//! }
//! ```

use crate::message::Message;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Errors reported by channel implementations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The channel is closed and accepts no more messages
    #[error("Channel '{0}' is closed")]
    Closed(String),

    /// The channel rejected the message
    #[error("Channel '{channel}' rejected message: {reason}")]
    Rejected {
        /// The rejecting channel
        channel: String,
        /// Why the message was rejected
        reason: String,
    },

    /// Network or broker failure
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Boxed future returned by [`Channel::send`].
pub type SendFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ChannelError>> + Send + 'a>>;

/// Boxed future returned by [`Channel::receive`].
pub type ReceiveFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Option<Message>, ChannelError>> + Send + 'a>>;

/// An asynchronous mailbox.
///
/// `send` hands a message over and returns as soon as the channel accepted
/// it; it never waits for a reply. `receive` waits at most `timeout` for the
/// next message and yields `Ok(None)` when nothing arrived in time.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`: producers, consumers and reply
/// dispatchers use the same channel from independent tasks.
pub trait Channel: Send + Sync {
    /// Channel identity, used in logs and error messages
    fn name(&self) -> &str;

    /// Transmit a message.
    ///
    /// # Errors
    ///
    /// Returns a [`ChannelError`] if the channel does not accept the message.
    fn send(&self, message: Message) -> SendFuture<'_>;

    /// Wait up to `timeout` for the next message.
    ///
    /// # Errors
    ///
    /// Returns a [`ChannelError`] if the channel failed while receiving.
    /// An elapsed timeout is not an error, it yields `Ok(None)`.
    fn receive(&self, timeout: Duration) -> ReceiveFuture<'_>;
}

impl std::fmt::Debug for dyn Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel").field("name", &self.name()).finish()
    }
}
