//! Identity and ordering types for parlor.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::WireError;

/// A point in time, always UTC.
pub type Timestamp = DateTime<Utc>;

/// The Unix epoch, used wherever a timestamp is absent or unreadable.
pub fn epoch() -> Timestamp {
    DateTime::<Utc>::UNIX_EPOCH
}

/// Parse an ISO-8601 timestamp leniently.
///
/// Accepts RFC 3339 (`2024-05-01T10:00:00Z`, with or without fraction/offset)
/// and zone-less `2024-05-01T10:00:00.123` (read as UTC). Anything else
/// degrades to [`epoch`].
pub fn parse_timestamp(raw: &str) -> Timestamp {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return parsed.with_timezone(&Utc);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return naive.and_utc();
    }
    tracing::warn!("unreadable timestamp {:?}, treating as epoch", raw);
    epoch()
}

/// Format a timestamp the way it is written on the wire and in storage.
pub fn format_timestamp(ts: &Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// A signed-in user or a peer, identified by user name.
///
/// Identities are trimmed on construction and must be non-empty. They may not
/// contain `/` or control characters, since they are used as storage key
/// segments and channel names.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    /// Parse and normalize an identity.
    pub fn parse(raw: &str) -> Result<Self, WireError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.chars().any(|c| c == '/' || c.is_control()) {
            return Err(WireError::InvalidIdentity(raw.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// The identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Stable room name shared by both sides of a one-to-one conversation.
    ///
    /// Both names are lower-cased and ordered, so `alice.room_with(bob)` and
    /// `bob.room_with(alice)` agree.
    pub fn room_with(&self, other: &Identity) -> String {
        let a = self.0.to_lowercase();
        let b = other.0.to_lowercase();
        if a < b {
            format!("{}|{}", a, b)
        } else {
            format!("{}|{}", b, a)
        }
    }
}

impl TryFrom<String> for Identity {
    type Error = WireError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Identity> for String {
    fn from(id: Identity) -> Self {
        id.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self.0)
    }
}

/// Server-assigned message identifier.
///
/// Assigned by the history service when a message is persisted; used as the
/// deduplication key for redelivered messages.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(i64);

impl MessageId {
    /// Create a MessageId with the given value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Get the numeric value of this MessageId.
    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageId({})", self.0)
    }
}
