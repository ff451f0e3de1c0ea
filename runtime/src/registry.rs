//! Named channel registry.
//!
//! [`ChannelRegistry`] maps names to channels and resolves reply handles that
//! travel by name. It is an ordinary value injected where needed; nothing is
//! registered globally.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use syncbridge_core::channel::Channel;
use syncbridge_core::destination::{ReplyDestination, ReplyDestinationResolver};
use syncbridge_core::error::BridgeError;

/// Channels addressable by name.
///
/// # Example
///
/// ```
/// use syncbridge_core::ReplyDestinationResolver;
/// use syncbridge_runtime::channel::InMemoryChannel;
/// use syncbridge_runtime::registry::ChannelRegistry;
///
/// let registry = ChannelRegistry::new();
/// registry.register(InMemoryChannel::shared("replies"));
///
/// assert!(registry.resolve("replies").is_ok());
/// assert!(registry.resolve("unknown").is_err());
/// ```
#[derive(Default)]
pub struct ChannelRegistry {
    channels: RwLock<HashMap<String, Arc<dyn Channel>>>,
}

impl ChannelRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `channel` under its own name, replacing any previous entry
    pub fn register(&self, channel: Arc<dyn Channel>) {
        let name = channel.name().to_string();
        tracing::debug!(channel = %name, "Registering channel");

        self.channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, channel);
    }

    /// Remove the channel registered as `name`
    pub fn unregister(&self, name: &str) -> Option<Arc<dyn Channel>> {
        self.channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
    }

    /// Channel registered as `name`
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Channel>> {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Number of registered channels
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no channel is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ReplyDestinationResolver for ChannelRegistry {
    fn resolve(&self, name: &str) -> Result<ReplyDestination, BridgeError> {
        self.get(name)
            .map(ReplyDestination::new)
            .ok_or_else(|| BridgeError::UnresolvedDestination {
                name: name.to_string(),
                reason: "no channel registered under this name".to_string(),
            })
    }
}

impl std::fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<&String> = channels.keys().collect();
        names.sort();
        f.debug_struct("ChannelRegistry")
            .field("channels", &names)
            .finish()
    }
}
