//! In-memory [`Channel`] implementation.
//!
//! Unbounded FIFO queue backed by `tokio::sync::mpsc`. Used for local
//! wiring, demos and tests; real transports implement [`Channel`] themselves.

use std::sync::Arc;
use std::time::Duration;
use syncbridge_core::channel::{Channel, ChannelError, ReceiveFuture, SendFuture};
use syncbridge_core::message::Message;
use tokio::sync::{Mutex, mpsc};

/// Unbounded in-process channel.
///
/// Any number of tasks may send. Receivers are served one at a time in the
/// order they started waiting.
///
/// # Example
///
/// ```
/// use syncbridge_core::{Channel, Message};
/// use syncbridge_runtime::channel::InMemoryChannel;
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let channel = InMemoryChannel::new("orders");
/// channel.send(Message::new("hello")).await?;
///
/// let message = channel.receive(Duration::from_millis(10)).await?;
/// assert_eq!(message.map(|m| m.payload().to_string()), Some("hello".to_string()));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct InMemoryChannel {
    name: String,
    sender: mpsc::UnboundedSender<Message>,
    receiver: Mutex<mpsc::UnboundedReceiver<Message>>,
}

impl InMemoryChannel {
    /// Create an empty channel
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            name: name.into(),
            sender,
            receiver: Mutex::new(receiver),
        }
    }

    /// Create an empty channel ready to be shared
    #[must_use]
    pub fn shared(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::new(name))
    }

    /// Number of queued messages.
    ///
    /// Reports 0 while a receiver is parked on the channel.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queued()
    }

    /// Whether no message is queued
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queued() == 0
    }

    fn queued(&self) -> usize {
        self.receiver
            .try_lock()
            .map_or(0, |receiver| receiver.len())
    }
}

impl Channel for InMemoryChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn send(&self, message: Message) -> SendFuture<'_> {
        Box::pin(async move {
            tracing::trace!(channel = %self.name, message_id = %message.id(), "Queueing message");
            self.sender
                .send(message)
                .map_err(|_| ChannelError::Closed(self.name.clone()))
        })
    }

    fn receive(&self, timeout: Duration) -> ReceiveFuture<'_> {
        Box::pin(async move {
            // The deadline also covers waiting for our turn at the receiver
            let received = tokio::time::timeout(timeout, async {
                let mut receiver = self.receiver.lock().await;
                receiver.recv().await
            })
            .await;

            match received {
                Ok(Some(message)) => Ok(Some(message)),
                Ok(None) => Err(ChannelError::Closed(self.name.clone())),
                Err(_) => Ok(None),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[tokio::test]
    async fn test_fifo_order() {
        let channel = InMemoryChannel::new("queue");
        channel.send(Message::with_id("1", "a")).await.unwrap();
        channel.send(Message::with_id("2", "b")).await.unwrap();
        assert_eq!(channel.len(), 2);

        let first = channel.receive(Duration::ZERO).await.unwrap().unwrap();
        let second = channel.receive(Duration::ZERO).await.unwrap().unwrap();

        assert_eq!(first.id(), "1");
        assert_eq!(second.id(), "2");
        assert!(channel.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_times_out_with_none() {
        let channel = InMemoryChannel::new("queue");

        let started = tokio::time::Instant::now();
        let received = channel.receive(Duration::from_millis(100)).await.unwrap();

        assert!(received.is_none());
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_wakes_on_send() {
        let channel = InMemoryChannel::shared("queue");

        let sender = Arc::clone(&channel);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            sender.send(Message::new("late")).await.unwrap();
        });

        let received = channel.receive(Duration::from_secs(1)).await.unwrap();
        assert_eq!(received.unwrap().payload(), "late");
    }
}
