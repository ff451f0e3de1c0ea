//! Reply destinations and their resolution.
//!
//! A request that expects an answer carries a [`ReplyHandle`] in its
//! [`REPLY_TO`](crate::message::headers::REPLY_TO) header. The handle is
//! either a direct channel reference or a name that a
//! [`ReplyDestinationResolver`] turns into a [`ReplyDestination`].
//!
//! Resolution is always an injected dependency. There is no process-wide
//! registry of named channels.

use crate::channel::Channel;
use crate::error::BridgeError;
use std::fmt;
use std::sync::Arc;

/// Where a response must be delivered.
///
/// Cheap to clone; equality is identity of the underlying channel.
#[derive(Clone)]
pub struct ReplyDestination {
    channel: Arc<dyn Channel>,
}

impl ReplyDestination {
    /// Wrap a channel as a reply destination
    #[must_use]
    pub fn new(channel: Arc<dyn Channel>) -> Self {
        Self { channel }
    }

    /// Name of the underlying channel
    #[must_use]
    pub fn name(&self) -> &str {
        self.channel.name()
    }

    /// The underlying channel
    #[must_use]
    pub fn channel(&self) -> &Arc<dyn Channel> {
        &self.channel
    }
}

impl PartialEq for ReplyDestination {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.channel, &other.channel)
    }
}

impl Eq for ReplyDestination {}

impl fmt::Debug for ReplyDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplyDestination")
            .field("channel", &self.name())
            .finish()
    }
}

impl From<Arc<dyn Channel>> for ReplyDestination {
    fn from(channel: Arc<dyn Channel>) -> Self {
        Self::new(channel)
    }
}

/// Reply destination reference as it travels in message headers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReplyHandle {
    /// Direct reference to the destination
    Destination(ReplyDestination),

    /// Name to be resolved through a [`ReplyDestinationResolver`]
    Name(String),
}

impl ReplyHandle {
    /// Name of the referenced destination
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Destination(destination) => destination.name(),
            Self::Name(name) => name,
        }
    }
}

impl fmt::Display for ReplyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<ReplyDestination> for ReplyHandle {
    fn from(destination: ReplyDestination) -> Self {
        Self::Destination(destination)
    }
}

/// Resolves reply destination names.
pub trait ReplyDestinationResolver: Send + Sync {
    /// Resolve `name` into a destination.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UnresolvedDestination`] if `name` is unknown.
    fn resolve(&self, name: &str) -> Result<ReplyDestination, BridgeError>;
}
