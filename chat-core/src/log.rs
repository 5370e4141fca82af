//! Message log for a signed-in session.
//!
//! The log holds every message the session knows about:
//! - seeded once from the history service
//! - appended to by the live feed, in delivery order
//! - deduplicated by server id (messages without an id are always kept)
//!
//! Arrival order is preserved in storage; [`MessageLog::chronological`] is the
//! derived view sorted by `(sentAt ?? epoch, id ?? 0)`.

use std::collections::HashSet;

use chat_types::{Message, MessageId};

/// Ordered, deduplicating store of the session's messages.
#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    /// Messages in arrival order.
    messages: Vec<Message>,
    /// Ids already present.
    seen: HashSet<MessageId>,
    /// Bumped on every mutation.
    revision: u64,
}

impl MessageLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the history response.
    ///
    /// Only takes effect while the log is empty: a history response that
    /// lands after live events have arrived is discarded. Returns whether
    /// the history was installed. Duplicate ids inside `history` collapse to
    /// the first occurrence.
    pub fn seed(&mut self, history: Vec<Message>) -> bool {
        if !self.messages.is_empty() {
            return false;
        }
        for message in history {
            self.push_unique(message);
        }
        self.revision += 1;
        true
    }

    /// Append a live message.
    ///
    /// Returns `false` (and leaves the log untouched) when a message with the
    /// same id is already present.
    pub fn append(&mut self, message: Message) -> bool {
        let added = self.push_unique(message);
        if added {
            self.revision += 1;
        }
        added
    }

    fn push_unique(&mut self, message: Message) -> bool {
        if let Some(id) = message.id {
            if self.contains_id(id) {
                return false;
            }
            self.seen.insert(id);
        }
        self.messages.push(message);
        true
    }

    /// Messages sorted by `(sentAt ?? epoch, id ?? 0)`, ties in arrival order.
    pub fn chronological(&self) -> Vec<&Message> {
        let mut sorted: Vec<&Message> = self.messages.iter().collect();
        sorted.sort_by_key(|m| m.order_key());
        sorted
    }

    /// Messages in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Whether a message with `id` is present.
    pub fn contains_id(&self, id: MessageId) -> bool {
        self.seen.contains(&id)
    }

    /// Counter that changes whenever the contents change.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Drop everything (logout).
    pub fn clear(&mut self) {
        self.messages.clear();
        self.seen.clear();
        self.revision += 1;
    }
}
