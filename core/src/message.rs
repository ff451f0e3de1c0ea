//! Message envelope exchanged over channels.
//!
//! A [`Message`] is an opaque envelope: a unique id, a payload and a
//! string-keyed header map. Besides plain text values a header may carry a
//! [`ReplyHandle`], the reference to where a response for this message has to
//! be delivered.
//!
//! The bridge owns no wire format. Transports convert their native messages
//! into this envelope and back.
//!
//! # Example
//!
//! ```
//! use syncbridge_core::message::{Message, headers};
//!
//! let request = Message::new("<Ping/>").with_header("operation", "ping");
//! let reply = Message::reply_for(&request, "<Pong/>");
//!
//! assert_eq!(reply.header_text(headers::CORRELATION_KEY), Some(request.id()));
//! ```

use crate::destination::ReplyHandle;
use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Well-known header names understood by the bridge.
pub mod headers {
    /// Correlation key of the request a message belongs to.
    ///
    /// Producers stamp it on outbound requests, responders echo it on replies.
    pub const CORRELATION_KEY: &str = "correlation_key";

    /// Reply destination of a request.
    pub const REPLY_TO: &str = "reply_to";
}

/// A single header value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HeaderValue {
    /// Plain text value
    Text(String),

    /// Embedded reply destination reference
    ReplyTo(ReplyHandle),
}

impl HeaderValue {
    /// Text content, if this is a text header
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            Self::ReplyTo(_) => None,
        }
    }

    /// Reply handle, if this header carries one
    #[must_use]
    pub const fn as_reply_handle(&self) -> Option<&ReplyHandle> {
        match self {
            Self::ReplyTo(handle) => Some(handle),
            Self::Text(_) => None,
        }
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<ReplyHandle> for HeaderValue {
    fn from(handle: ReplyHandle) -> Self {
        Self::ReplyTo(handle)
    }
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(value) => write!(f, "{value}"),
            Self::ReplyTo(handle) => write!(f, "{handle}"),
        }
    }
}

impl Serialize for HeaderValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Text(value) => serializer.serialize_str(value),
            Self::ReplyTo(handle) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(headers::REPLY_TO, &handle.to_string())?;
                map.end()
            }
        }
    }
}

/// Message envelope.
///
/// Serializes for diagnostics only: an embedded reply destination is rendered
/// by name, so the output cannot be turned back into a routable message.
#[derive(Clone, Debug, Serialize)]
pub struct Message {
    id: String,
    payload: String,
    headers: BTreeMap<String, HeaderValue>,
    timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a message with a fresh unique id
    #[must_use]
    pub fn new(payload: impl Into<String>) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), payload)
    }

    /// Create a message with an explicit id
    #[must_use]
    pub fn with_id(id: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            payload: payload.into(),
            headers: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// Build a reply to `request`.
    ///
    /// The reply carries the request's correlation key: its
    /// [`headers::CORRELATION_KEY`] header when present, its id otherwise.
    #[must_use]
    pub fn reply_for(request: &Self, payload: impl Into<String>) -> Self {
        let key = request
            .header_text(headers::CORRELATION_KEY)
            .unwrap_or(request.id())
            .to_string();

        Self::new(payload).with_header(headers::CORRELATION_KEY, key)
    }

    /// Unique message id
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Message payload
    #[must_use]
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Creation time
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// All headers, ordered by name
    #[must_use]
    pub const fn headers(&self) -> &BTreeMap<String, HeaderValue> {
        &self.headers
    }

    /// Look up a header
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&HeaderValue> {
        self.headers.get(name)
    }

    /// Look up a text header
    #[must_use]
    pub fn header_text(&self, name: &str) -> Option<&str> {
        self.header(name).and_then(HeaderValue::as_text)
    }

    /// Reply destination reference carried in the [`headers::REPLY_TO`] header
    #[must_use]
    pub fn reply_to(&self) -> Option<&ReplyHandle> {
        self.header(headers::REPLY_TO)
            .and_then(HeaderValue::as_reply_handle)
    }

    /// Set a header, replacing any previous value
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<HeaderValue>) {
        self.headers.insert(name.into(), value.into());
    }

    /// Remove a header, returning its value
    pub fn remove_header(&mut self, name: &str) -> Option<HeaderValue> {
        self.headers.remove(name)
    }

    /// Builder-style [`set_header`](Self::set_header)
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<HeaderValue>) -> Self {
        self.set_header(name, value);
        self
    }

    /// Attach a reply destination reference
    #[must_use]
    pub fn with_reply_to(self, handle: ReplyHandle) -> Self {
        self.with_header(headers::REPLY_TO, handle)
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.payload == other.payload && self.headers == other.headers
    }
}

impl Eq for Message {}
