//! Live feed framing.
//!
//! The live feed is a text channel carrying one JSON object per frame. The
//! client subscribes to its identity's private channel and publishes outgoing
//! messages; the server acknowledges subscriptions and pushes events.
//!
//! Event bodies are kept as raw JSON here. They are decoded into a
//! [`Message`](crate::Message) by the subscriber, so that one bad payload can
//! be dropped without failing the frame layer.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Identity, OutgoingMessage, WireError};

/// Destination that accepts outgoing one-to-one messages.
pub const PUBLISH_DESTINATION: &str = "/app/chat.sendPrivate";

/// A named feed channel, e.g. `/topic/user.alice`.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Channel(String);

impl Channel {
    /// The private channel that carries messages for `identity`.
    pub fn for_identity(identity: &Identity) -> Self {
        Self(format!("/topic/user.{}", identity))
    }

    /// The channel name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Channel({})", self.0)
    }
}

/// Frames sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Start receiving events on a channel
    Subscribe {
        /// Channel to subscribe to
        channel: Channel,
    },
    /// Stop receiving events on a channel
    Unsubscribe {
        /// Channel to leave
        channel: Channel,
    },
    /// Submit a message for delivery
    Publish {
        /// Server endpoint, normally [`PUBLISH_DESTINATION`]
        destination: String,
        /// The message to deliver
        body: OutgoingMessage,
    },
}

impl ClientFrame {
    /// Publish `message` to the one-to-one endpoint.
    pub fn publish(message: OutgoingMessage) -> Self {
        Self::Publish {
            destination: PUBLISH_DESTINATION.to_string(),
            body: message,
        }
    }

    /// Encode as JSON text.
    pub fn to_text(&self) -> Result<String, WireError> {
        serde_json::to_string(self).map_err(WireError::Serialization)
    }

    /// Decode from JSON text.
    pub fn from_text(text: &str) -> Result<Self, WireError> {
        serde_json::from_str(text).map_err(WireError::Deserialization)
    }
}

/// Frames sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Subscription acknowledged
    Subscribed {
        /// The channel now active
        channel: Channel,
    },
    /// A message pushed on a subscribed channel
    Event {
        /// Channel the event arrived on
        channel: Channel,
        /// Undecoded message payload
        body: serde_json::Value,
    },
    /// Server-side problem report
    Error {
        /// Human-readable reason
        reason: String,
    },
}

impl ServerFrame {
    /// Encode as JSON text.
    pub fn to_text(&self) -> Result<String, WireError> {
        serde_json::to_string(self).map_err(WireError::Serialization)
    }

    /// Decode from JSON text.
    pub fn from_text(text: &str) -> Result<Self, WireError> {
        serde_json::from_str(text).map_err(WireError::Deserialization)
    }
}
