//! Error types surfaced by the synchronous bridge.
//!
//! Every variant names the channel it happened on, and carries the
//! correlation key and timeout whenever they are known, so a failure can be
//! diagnosed from the error alone.
//!
//! Errors fall into three families, see [`ErrorKind`]:
//!
//! - **Timeout**: nothing matching arrived in time. Recoverable; callers may
//!   assert on it or retry.
//! - **Configuration**: the call could not be set up (no key, no reply
//!   destination, empty message). Always raised immediately.
//! - **Transport**: the underlying channel failed. The channel's own error is
//!   kept as [`source`](std::error::Error::source).

use crate::channel::ChannelError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Placeholder rendered for an unknown correlation key.
const NO_KEY: &str = "<none>";

/// Classification of a [`BridgeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No matching message within the deadline
    Timeout,
    /// Missing key, destination or message
    Configuration,
    /// The channel failed
    Transport,
}

/// Errors raised by producers, consumers and endpoint adapters.
#[derive(Error, Debug, Clone)]
pub enum BridgeError {
    /// No reply arrived for a sent request
    #[error(
        "Reply timed out after {}ms. Did not receive reply message on reply channel '{channel}' (correlation key: {})",
        .timeout.as_millis(),
        .key.as_deref().unwrap_or(NO_KEY)
    )]
    ReplyTimeout {
        /// Channel the reply was expected on
        channel: String,
        /// Correlation key of the request
        key: Option<String>,
        /// Timeout that elapsed
        timeout: Duration,
    },

    /// No request arrived on a consumer channel
    #[error(
        "Action timeout after {}ms while receiving message from channel '{channel}'",
        .timeout.as_millis()
    )]
    ReceiveTimeout {
        /// Channel that was read from
        channel: String,
        /// Timeout that elapsed
        timeout: Duration,
    },

    /// Attempt to send a missing message
    #[error("Message is empty - cannot send empty message to channel '{channel}'")]
    EmptyMessage {
        /// Target channel
        channel: String,
    },

    /// A correlator is configured but the reply lacks the correlation header
    #[error(
        "Failed to send reply on channel '{channel}' - cannot correlate reply destination: missing '{header}' header"
    )]
    MissingCorrelation {
        /// Consumer channel
        channel: String,
        /// Header that was expected on the reply
        header: String,
    },

    /// No reply destination was recorded for the key
    #[error(
        "No reply destination found for correlation key '{}' on channel '{channel}' - unable to locate reply channel",
        .key.as_deref().unwrap_or(NO_KEY)
    )]
    NoReplyDestination {
        /// Consumer channel
        channel: String,
        /// Correlation key that was looked up, if one could be derived
        key: Option<String>,
    },

    /// The correlation key could not be derived
    #[error("Failed to get correlation key on channel '{channel}': {reason}")]
    CorrelationKey {
        /// Channel of the endpoint deriving the key
        channel: String,
        /// What went wrong
        reason: String,
    },

    /// A waiter is already parked on the key
    #[error("Correlation key '{key}' is already awaited on channel '{channel}'")]
    KeyInUse {
        /// Channel of the endpoint
        channel: String,
        /// The contended key
        key: String,
    },

    /// A reply destination name could not be resolved
    #[error("Failed to resolve reply destination '{name}': {reason}")]
    UnresolvedDestination {
        /// Destination name from the message header
        name: String,
        /// What went wrong
        reason: String,
    },

    /// The channel rejected an outbound message
    #[error(
        "Failed to send message to channel '{channel}' (correlation key: {})",
        .key.as_deref().unwrap_or(NO_KEY)
    )]
    Send {
        /// Target channel
        channel: String,
        /// Correlation key of the message, if known
        key: Option<String>,
        /// Underlying channel failure
        #[source]
        source: ChannelError,
    },

    /// The channel failed while receiving
    #[error("Failed to receive message from channel '{channel}'")]
    Receive {
        /// Source channel
        channel: String,
        /// Underlying channel failure
        #[source]
        source: ChannelError,
    },
}

impl BridgeError {
    /// Classify this error
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::ReplyTimeout { .. } | Self::ReceiveTimeout { .. } => ErrorKind::Timeout,
            Self::EmptyMessage { .. }
            | Self::MissingCorrelation { .. }
            | Self::NoReplyDestination { .. }
            | Self::CorrelationKey { .. }
            | Self::KeyInUse { .. }
            | Self::UnresolvedDestination { .. } => ErrorKind::Configuration,
            Self::Send { .. } | Self::Receive { .. } => ErrorKind::Transport,
        }
    }

    /// Whether this is a timeout
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self.kind(), ErrorKind::Timeout)
    }

    /// Channel the error happened on
    #[must_use]
    pub fn channel(&self) -> &str {
        match self {
            Self::ReplyTimeout { channel, .. }
            | Self::ReceiveTimeout { channel, .. }
            | Self::EmptyMessage { channel }
            | Self::MissingCorrelation { channel, .. }
            | Self::NoReplyDestination { channel, .. }
            | Self::CorrelationKey { channel, .. }
            | Self::KeyInUse { channel, .. }
            | Self::Send { channel, .. }
            | Self::Receive { channel, .. } => channel,
            Self::UnresolvedDestination { name, .. } => name,
        }
    }

    /// Correlation key involved, if known
    #[must_use]
    pub fn correlation_key(&self) -> Option<&str> {
        match self {
            Self::ReplyTimeout { key, .. }
            | Self::NoReplyDestination { key, .. }
            | Self::Send { key, .. } => key.as_deref(),
            Self::KeyInUse { key, .. } => Some(key),
            _ => None,
        }
    }

    /// Timeout that elapsed, for timeout errors
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        match self {
            Self::ReplyTimeout { timeout, .. } | Self::ReceiveTimeout { timeout, .. } => {
                Some(*timeout)
            }
            _ => None,
        }
    }
}
