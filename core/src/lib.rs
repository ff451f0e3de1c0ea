//! # SyncBridge Core
//!
//! Core types for bridging fire-and-forget message channels into synchronous
//! call/response semantics.
//!
//! This crate defines the vocabulary shared by every part of the bridge. It
//! contains no blocking or correlation logic itself; that lives in
//! `syncbridge-runtime`.
//!
//! ## Core Concepts
//!
//! - **Message**: envelope with id, payload and headers
//! - **Channel**: asynchronous mailbox (`send` / `receive(timeout)`)
//! - **Correlation key**: string pairing a request with its reply
//! - **Reply destination**: where the reply to a given request must go
//!
//! ## Architecture
//!
//! ```text
//!   caller                                       responder
//!     │ send(request)                               ▲ receive()
//!     ▼                                             │
//! ┌──────────────┐  request + reply_to   ┌──────────────┐
//! │ SyncProducer │ ────── Channel ──────▶│ SyncConsumer │
//! └──────┬───────┘                       └──────┬───────┘
//!        │ find(key)                            │ send(reply)
//!        ▼                                      ▼
//! ┌──────────────────┐   reply + key    ┌──────────────────┐
//! │ CorrelationStore │◀──── Channel ────│ ReplyDestination │
//! └──────────────────┘                  └──────────────────┘
//! ```

pub mod channel;
pub mod correlation;
pub mod destination;
pub mod error;
pub mod message;

pub use channel::{Channel, ChannelError};
pub use correlation::{CorrelationKeyExtractor, HeaderCorrelator, MessageIdCorrelator};
pub use destination::{ReplyDestination, ReplyDestinationResolver, ReplyHandle};
pub use error::{BridgeError, ErrorKind};
pub use message::{HeaderValue, Message, headers};
