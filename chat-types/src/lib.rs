//! # chat-types
//!
//! Wire format types for the parlor conversation sync engine.
//!
//! This crate provides the foundational types used across all parlor crates:
//! - [`Identity`], [`MessageId`], [`Timestamp`] - Identity and ordering types
//! - [`Message`], [`OutgoingMessage`] - Chat messages as they travel on the wire
//! - [`ClientFrame`], [`ServerFrame`], [`Channel`] - Live feed framing
//! - [`WireError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod frame;
mod ids;
mod message;

pub use error::WireError;
pub use frame::{Channel, ClientFrame, ServerFrame, PUBLISH_DESTINATION};
pub use ids::{epoch, format_timestamp, parse_timestamp, Identity, MessageId, Timestamp};
pub use message::{Message, OutgoingMessage};
