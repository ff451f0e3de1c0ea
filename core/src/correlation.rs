//! Correlation key derivation.
//!
//! A correlation key pairs a request with its eventual reply. The key must be
//! unique among in-flight requests; reusing a key while its request is still
//! pending is the caller's responsibility to avoid.
//!
//! Two extractors are provided:
//!
//! - [`MessageIdCorrelator`] (default): the message id
//! - [`HeaderCorrelator`]: the value of a named text header, for protocols
//!   that carry their own correlation ids (order ids, conversation ids, ...)

use crate::message::{Message, headers};
use thiserror::Error;

/// Prefix of the alias under which an endpoint saves its most recent key.
pub const CORRELATION_KEY_NAME_PREFIX: &str = "correlation_key_";

/// Failure to derive a correlation key.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CorrelationKeyError {
    /// The header the key is read from is missing or not text
    #[error("missing correlation header '{header}' on message '{message_id}'")]
    MissingHeader {
        /// Expected header
        header: String,
        /// Message lacking it
        message_id: String,
    },

    /// The header is present but empty
    #[error("empty correlation header '{header}' on message '{message_id}'")]
    EmptyHeader {
        /// Offending header
        header: String,
        /// Message carrying it
        message_id: String,
    },
}

/// Derives correlation keys from messages.
pub trait CorrelationKeyExtractor: Send + Sync {
    /// Correlation key of `message`.
    ///
    /// # Errors
    ///
    /// Returns a [`CorrelationKeyError`] if no key can be derived.
    fn key_of(&self, message: &Message) -> Result<String, CorrelationKeyError>;

    /// Alias under which `endpoint` saves the key of its latest message
    fn key_name(&self, endpoint: &str) -> String {
        format!("{CORRELATION_KEY_NAME_PREFIX}{endpoint}")
    }
}

/// Uses the message id as correlation key.
///
/// A [`headers::CORRELATION_KEY`] header already present on the message wins,
/// so a forwarded request keeps the key its original sender stamped.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageIdCorrelator;

impl CorrelationKeyExtractor for MessageIdCorrelator {
    fn key_of(&self, message: &Message) -> Result<String, CorrelationKeyError> {
        Ok(message
            .header_text(headers::CORRELATION_KEY)
            .unwrap_or(message.id())
            .to_string())
    }
}

/// Reads the correlation key from a named text header.
#[derive(Debug, Clone)]
pub struct HeaderCorrelator {
    header: String,
}

impl HeaderCorrelator {
    /// Correlate on `header`
    #[must_use]
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
        }
    }

    /// Header the key is read from
    #[must_use]
    pub fn header(&self) -> &str {
        &self.header
    }
}

impl CorrelationKeyExtractor for HeaderCorrelator {
    fn key_of(&self, message: &Message) -> Result<String, CorrelationKeyError> {
        match message.header_text(&self.header) {
            Some("") => Err(CorrelationKeyError::EmptyHeader {
                header: self.header.clone(),
                message_id: message.id().to_string(),
            }),
            Some(value) => Ok(value.to_string()),
            None => Err(CorrelationKeyError::MissingHeader {
                header: self.header.clone(),
                message_id: message.id().to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_id_correlator_defaults_to_id() {
        let message = Message::with_id("abc", "payload");
        assert_eq!(MessageIdCorrelator.key_of(&message), Ok("abc".to_string()));
    }

    #[test]
    fn test_message_id_correlator_keeps_stamped_key() {
        let message = Message::with_id("abc", "payload").with_header(headers::CORRELATION_KEY, "xyz");
        assert_eq!(MessageIdCorrelator.key_of(&message), Ok("xyz".to_string()));
    }

    #[test]
    fn test_header_correlator() {
        let correlator = HeaderCorrelator::new("order_id");

        let tagged = Message::with_id("m-1", "").with_header("order_id", "42");
        assert_eq!(correlator.key_of(&tagged), Ok("42".to_string()));

        let untagged = Message::with_id("m-2", "");
        assert_eq!(
            correlator.key_of(&untagged),
            Err(CorrelationKeyError::MissingHeader {
                header: "order_id".to_string(),
                message_id: "m-2".to_string(),
            })
        );

        let blank = Message::with_id("m-3", "").with_header("order_id", "");
        assert!(matches!(
            correlator.key_of(&blank),
            Err(CorrelationKeyError::EmptyHeader { .. })
        ));
    }

    #[test]
    fn test_key_name() {
        assert_eq!(
            MessageIdCorrelator.key_name("orders"),
            "correlation_key_orders"
        );
    }
}
