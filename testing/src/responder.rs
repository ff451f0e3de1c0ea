//! Scripted responder for round-trip tests.
//!
//! A [`Responder`] plays the remote side of a request/reply exchange: it
//! receives requests through a [`SyncConsumer`], waits a configurable delay
//! and answers each one with [`Message::reply_for`].

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use syncbridge_core::message::Message;
use syncbridge_runtime::consumer::SyncConsumer;
use tokio::task::JoinHandle;

/// Background task answering requests.
///
/// The task stops when the responder is dropped.
///
/// # Example
///
/// ```rust,ignore
/// let responder = Responder::new(consumer)
///     .with_delay(Duration::from_millis(50))
///     .spawn(|request| Some(format!("re: {}", request.payload())));
/// ```
pub struct Responder {
    consumer: Arc<SyncConsumer>,
    delay: Duration,
    poll_interval: Duration,
    replies: Arc<AtomicUsize>,
    task: Option<JoinHandle<()>>,
}

impl Responder {
    /// Respond to requests received by `consumer`
    #[must_use]
    pub fn new(consumer: Arc<SyncConsumer>) -> Self {
        Self {
            consumer,
            delay: Duration::ZERO,
            poll_interval: Duration::from_millis(100),
            replies: Arc::new(AtomicUsize::new(0)),
            task: None,
        }
    }

    /// Wait `delay` before each reply
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Start answering with `respond`.
    ///
    /// `respond` returns the reply payload, or `None` to leave the request
    /// unanswered.
    #[must_use]
    pub fn spawn<F>(mut self, respond: F) -> Self
    where
        F: Fn(&Message) -> Option<String> + Send + 'static,
    {
        let consumer = Arc::clone(&self.consumer);
        let replies = Arc::clone(&self.replies);
        let delay = self.delay;
        let poll_interval = self.poll_interval;

        self.task = Some(tokio::spawn(async move {
            loop {
                let request = match consumer.receive(poll_interval).await {
                    Ok(request) => request,
                    Err(error) if error.is_timeout() => continue,
                    Err(error) => {
                        tracing::warn!(error = %error, "Responder failed to receive");
                        tokio::time::sleep(poll_interval).await;
                        continue;
                    }
                };
                let Some(payload) = respond(&request) else {
                    continue;
                };

                tokio::time::sleep(delay).await;
                match consumer.send(Message::reply_for(&request, payload)).await {
                    Ok(()) => {
                        replies.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(error) => {
                        tracing::warn!(error = %error, "Responder failed to reply");
                    }
                }
            }
        }));
        self
    }

    /// Start echoing request payloads
    #[must_use]
    pub fn echo(self) -> Self {
        self.spawn(|request| Some(request.payload().to_string()))
    }

    /// Number of replies sent so far
    #[must_use]
    pub fn replies_sent(&self) -> usize {
        self.replies.load(Ordering::SeqCst)
    }
}

impl Drop for Responder {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for Responder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Responder")
            .field("consumer", &self.consumer.name())
            .field("delay", &self.delay)
            .field("replies_sent", &self.replies_sent())
            .finish_non_exhaustive()
    }
}
