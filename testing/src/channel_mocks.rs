//! Channel test doubles
//!
//! - [`FailingChannel`]: rejects every message with a transport error
//! - [`RecordingChannel`]: delivers like an in-memory queue and keeps a copy
//!   of everything sent

#![allow(clippy::missing_panics_doc)] // Test utilities document panics where critical

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use syncbridge_core::channel::{Channel, ChannelError, ReceiveFuture, SendFuture};
use syncbridge_core::message::Message;
use syncbridge_runtime::channel::InMemoryChannel;

/// Channel whose transport is broken.
///
/// Every `send` fails with [`ChannelError::Transport`]. `receive` waits out
/// its timeout and yields nothing, unless receive failures are enabled.
///
/// # Example
///
/// ```
/// use syncbridge_core::{Channel, ChannelError, Message};
/// use syncbridge_testing::FailingChannel;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let channel = FailingChannel::new("broken", "Internal error!");
/// let result = channel.send(Message::new("ping")).await;
///
/// assert_eq!(result, Err(ChannelError::Transport("Internal error!".to_string())));
/// assert_eq!(channel.attempts(), 1);
/// # }
/// ```
#[derive(Debug)]
pub struct FailingChannel {
    name: String,
    reason: String,
    fail_receive: bool,
    attempts: Mutex<usize>,
}

impl FailingChannel {
    /// Channel named `name` failing with `reason`
    #[must_use]
    pub fn new(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
            fail_receive: false,
            attempts: Mutex::new(0),
        }
    }

    /// Make `receive` fail too
    #[must_use]
    pub const fn failing_receive(mut self) -> Self {
        self.fail_receive = true;
        self
    }

    /// Wrap for sharing as `Arc<dyn Channel>`
    #[must_use]
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Number of send attempts so far
    #[must_use]
    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Channel for FailingChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn send(&self, _message: Message) -> SendFuture<'_> {
        Box::pin(async move {
            *self.attempts.lock().unwrap_or_else(PoisonError::into_inner) += 1;
            Err(ChannelError::Transport(self.reason.clone()))
        })
    }

    fn receive(&self, timeout: Duration) -> ReceiveFuture<'_> {
        Box::pin(async move {
            if self.fail_receive {
                return Err(ChannelError::Transport(self.reason.clone()));
            }
            tokio::time::sleep(timeout).await;
            Ok(None)
        })
    }
}

/// In-memory channel that records every sent message.
///
/// Useful for asserting what was (or was not) transmitted.
#[derive(Debug)]
pub struct RecordingChannel {
    inner: InMemoryChannel,
    sent: Mutex<Vec<Message>>,
}

impl RecordingChannel {
    /// Create an empty recording channel
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: InMemoryChannel::new(name),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Create an empty recording channel ready to be shared
    #[must_use]
    pub fn shared(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::new(name))
    }

    /// Copies of all messages sent so far, oldest first
    #[must_use]
    pub fn sent(&self) -> Vec<Message> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of messages sent so far
    #[must_use]
    pub fn sent_count(&self) -> usize {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Channel for RecordingChannel {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn send(&self, message: Message) -> SendFuture<'_> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.clone());
        self.inner.send(message)
    }

    fn receive(&self, timeout: Duration) -> ReceiveFuture<'_> {
        self.inner.receive(timeout)
    }
}
