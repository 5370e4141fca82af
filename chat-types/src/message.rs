//! Chat messages as exchanged with the history service and the live feed.

use serde::{Deserialize, Serialize};

use crate::ids::{epoch, Identity, MessageId, Timestamp};
use crate::WireError;

/// A one-to-one chat message.
///
/// Messages are immutable once received. `id` and `sent_at` are assigned by
/// the server and may be missing on messages that never went through it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Server-assigned identifier (dedup key when present)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
    /// Server-side room name for the pair, informational only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    /// Who wrote the message
    pub sender: Identity,
    /// Who the message is addressed to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<Identity>,
    /// Message text
    pub content: String,
    /// When the server accepted the message
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "lenient_timestamp"
    )]
    pub sent_at: Option<Timestamp>,
}

impl Message {
    /// Decode a message from JSON text.
    pub fn from_json(text: &str) -> Result<Self, WireError> {
        serde_json::from_str(text).map_err(WireError::Deserialization)
    }

    /// Decode a message from an already-parsed JSON value.
    pub fn from_value(value: serde_json::Value) -> Result<Self, WireError> {
        serde_json::from_value(value).map_err(WireError::Deserialization)
    }

    /// Encode as JSON text.
    pub fn to_json(&self) -> Result<String, WireError> {
        serde_json::to_string(self).map_err(WireError::Serialization)
    }

    /// The other participant from `me`'s point of view.
    ///
    /// That is the recipient when `me` sent the message, the sender otherwise.
    /// Returns `None` for an outbound message with no recipient and for a
    /// note `me` addressed to itself.
    pub fn peer_of(&self, me: &Identity) -> Option<&Identity> {
        if &self.sender == me {
            self.recipient.as_ref().filter(|to| *to != me)
        } else {
            Some(&self.sender)
        }
    }

    /// Whether the server-assigned room, if any, is the pair's room.
    ///
    /// Messages without a room or a recipient are consistent by definition.
    pub fn room_matches_pair(&self) -> bool {
        match (&self.room, &self.recipient) {
            (Some(room), Some(recipient)) => *room == self.sender.room_with(recipient),
            _ => true,
        }
    }

    /// Whether the message is addressed to `me`.
    pub fn is_to(&self, me: &Identity) -> bool {
        self.recipient.as_ref() == Some(me)
    }

    /// Whether the message belongs to the conversation between `me` and `peer`.
    pub fn is_between(&self, me: &Identity, peer: &Identity) -> bool {
        let to = self.recipient.as_ref();
        (&self.sender == me && to == Some(peer)) || (&self.sender == peer && to == Some(me))
    }

    /// Send time, or the epoch when the server did not provide one.
    pub fn sent_at_or_epoch(&self) -> Timestamp {
        self.sent_at.unwrap_or_else(epoch)
    }

    /// Chronological sort key: `(sent_at ?? epoch, id ?? 0)`.
    pub fn order_key(&self) -> (Timestamp, i64) {
        (
            self.sent_at_or_epoch(),
            self.id.map(|id| id.value()).unwrap_or(0),
        )
    }
}

/// A message as submitted to the publish endpoint.
///
/// The server assigns `id`, `room` and `sentAt`, then fans the stored
/// message out to both parties' channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// The signed-in identity
    pub sender: Identity,
    /// The peer being written to
    pub recipient: Identity,
    /// Message text
    pub content: String,
}

impl OutgoingMessage {
    /// Create a new outgoing message.
    pub fn new(sender: Identity, recipient: Identity, content: impl Into<String>) -> Self {
        Self {
            sender,
            recipient,
            content: content.into(),
        }
    }
}

/// `sentAt` as the server writes it: ISO-8601 text, occasionally epoch
/// seconds. Unreadable values degrade to the epoch instead of failing the
/// whole message.
mod lenient_timestamp {
    use super::Timestamp;
    use crate::ids::{epoch, format_timestamp, parse_timestamp};
    use chrono::DateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTimestamp {
        Text(String),
        Seconds(f64),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Timestamp>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
        Ok(raw.and_then(|value| match serde_json::from_value::<RawTimestamp>(value) {
            Ok(RawTimestamp::Text(text)) => Some(parse_timestamp(&text)),
            Ok(RawTimestamp::Seconds(secs)) => {
                let millis = (secs * 1000.0) as i64;
                Some(DateTime::<chrono::Utc>::from_timestamp_millis(millis).unwrap_or_else(epoch))
            }
            Err(_) => Some(epoch()),
        }))
    }

    pub fn serialize<S>(value: &Option<Timestamp>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => serializer.serialize_some(&format_timestamp(ts)),
            None => serializer.serialize_none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn id(name: &str) -> Identity {
        Identity::parse(name).unwrap()
    }

    #[test]
    fn decodes_full_wire_shape() {
        let msg = Message::from_json(
            r#"{"id":12,"room":"alice|bob","sender":"bob","recipient":"alice",
                "content":"hi","sentAt":"2024-05-01T10:00:00Z"}"#,
        )
        .unwrap();

        assert_eq!(msg.id, Some(MessageId::new(12)));
        assert_eq!(msg.room.as_deref(), Some("alice|bob"));
        assert_eq!(msg.sender, id("bob"));
        assert_eq!(msg.recipient, Some(id("alice")));
        assert_eq!(
            msg.sent_at,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap())
        );
    }

    #[test]
    fn optional_fields_may_be_missing_or_null() {
        let msg =
            Message::from_json(r#"{"sender":"bob","recipient":null,"content":"x"}"#).unwrap();
        assert!(msg.id.is_none());
        assert!(msg.recipient.is_none());
        assert!(msg.sent_at.is_none());
        assert_eq!(msg.sent_at_or_epoch(), epoch());
    }

    #[test]
    fn malformed_sent_at_degrades_to_epoch() {
        let msg = Message::from_json(
            r#"{"sender":"bob","recipient":"alice","content":"x","sentAt":"not a time"}"#,
        )
        .unwrap();
        assert_eq!(msg.sent_at, Some(epoch()));

        let msg = Message::from_json(
            r#"{"sender":"bob","recipient":"alice","content":"x","sentAt":{"nested":true}}"#,
        )
        .unwrap();
        assert_eq!(msg.sent_at, Some(epoch()));
    }

    #[test]
    fn numeric_sent_at_is_epoch_seconds() {
        let msg = Message::from_json(
            r#"{"sender":"bob","recipient":"alice","content":"x","sentAt":1714557600.5}"#,
        )
        .unwrap();
        assert_eq!(msg.sent_at.unwrap().timestamp_millis(), 1_714_557_600_500);
    }

    #[test]
    fn missing_sender_is_rejected() {
        assert!(Message::from_json(r#"{"recipient":"alice","content":"x"}"#).is_err());
        assert!(Message::from_json(r#"{"sender":"","content":"x"}"#).is_err());
        assert!(Message::from_json("not json").is_err());
    }

    #[test]
    fn encodes_camel_case_and_skips_absent_fields() {
        let msg = Message {
            id: None,
            room: None,
            sender: id("alice"),
            recipient: Some(id("bob")),
            content: "yo".into(),
            sent_at: Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()),
        };
        let json = msg.to_json().unwrap();
        assert!(json.contains("\"sentAt\":\"2024-05-01T10:00:00.000Z\""));
        assert!(!json.contains("\"id\""));
        assert!(!json.contains("\"room\""));
    }

    #[test]
    fn peer_resolution() {
        let me = id("alice");
        let inbound = Message::from_json(r#"{"sender":"bob","recipient":"alice","content":"a"}"#)
            .unwrap();
        let outbound =
            Message::from_json(r#"{"sender":"alice","recipient":"carol","content":"b"}"#).unwrap();
        let dangling = Message::from_json(r#"{"sender":"alice","content":"c"}"#).unwrap();
        let note = Message::from_json(r#"{"sender":"alice","recipient":"alice","content":"d"}"#)
            .unwrap();

        assert_eq!(inbound.peer_of(&me), Some(&id("bob")));
        assert_eq!(outbound.peer_of(&me), Some(&id("carol")));
        assert_eq!(dangling.peer_of(&me), None);
        assert_eq!(note.peer_of(&me), None);
        assert_eq!(note.peer_of(&id("bob")), Some(&me));
        assert!(inbound.is_to(&me));
        assert!(!outbound.is_to(&me));
    }

    #[test]
    fn room_must_name_both_participants() {
        let matching = Message::from_json(
            r#"{"sender":"Bob","recipient":"alice","room":"alice|bob","content":"a"}"#,
        )
        .unwrap();
        let foreign = Message::from_json(
            r#"{"sender":"bob","recipient":"alice","room":"bob|carol","content":"b"}"#,
        )
        .unwrap();
        let roomless =
            Message::from_json(r#"{"sender":"bob","recipient":"alice","content":"c"}"#).unwrap();

        assert!(matching.room_matches_pair());
        assert!(!foreign.room_matches_pair());
        assert!(roomless.room_matches_pair());
    }

    #[test]
    fn is_between_requires_both_directions_to_match() {
        let me = id("alice");
        let bob = id("bob");
        let to_bob =
            Message::from_json(r#"{"sender":"alice","recipient":"bob","content":"a"}"#).unwrap();
        let from_bob =
            Message::from_json(r#"{"sender":"bob","recipient":"alice","content":"b"}"#).unwrap();
        let bob_to_carol =
            Message::from_json(r#"{"sender":"bob","recipient":"carol","content":"c"}"#).unwrap();

        assert!(to_bob.is_between(&me, &bob));
        assert!(from_bob.is_between(&me, &bob));
        assert!(!bob_to_carol.is_between(&me, &bob));
    }

    #[test]
    fn order_key_defaults() {
        let msg = Message::from_json(r#"{"sender":"bob","content":"a"}"#).unwrap();
        assert_eq!(msg.order_key(), (epoch(), 0));
    }

    #[test]
    fn outgoing_message_shape() {
        let out = OutgoingMessage::new(id("alice"), id("bob"), "hello");
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"sender": "alice", "recipient": "bob", "content": "hello"})
        );
    }
}
