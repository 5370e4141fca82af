//! Active conversation tracking.
//!
//! At most one peer is on screen at a time. Opening a conversation marks it
//! read at the moment it was opened, and sending into it does the same.

use chat_types::{Identity, Message, Timestamp};
use tracing::debug;

use crate::kv::{KeyValueStore, StoreError};
use crate::log::MessageLog;
use crate::read_cursor::ReadCursorStore;

/// Errors from [`ActiveConversation::select`].
#[derive(Debug, thiserror::Error)]
pub enum SelectError {
    /// A conversation with yourself was requested.
    #[error("cannot open a conversation with yourself")]
    SelfConversation,

    /// The conversation was opened but its read cursor could not be saved.
    #[error("failed to mark conversation read: {0}")]
    Store(#[from] StoreError),
}

/// Which peer the signed-in identity is looking at.
#[derive(Debug, Clone)]
pub struct ActiveConversation {
    /// The signed-in identity.
    me: Identity,
    /// The open conversation, if any.
    active: Option<Identity>,
}

impl ActiveConversation {
    /// No conversation open.
    pub fn new(me: Identity) -> Self {
        Self { me, active: None }
    }

    /// Open the conversation with `peer` and mark it read at `now`.
    ///
    /// Any peer other than the signed-in identity may be selected, including
    /// one with no messages yet. Selecting the already-open peer again just
    /// refreshes its read cursor. If the cursor write fails the conversation
    /// stays open and the store error is returned.
    pub fn select<S: KeyValueStore>(
        &mut self,
        peer: Identity,
        cursors: &mut ReadCursorStore<S>,
        now: Timestamp,
    ) -> Result<(), SelectError> {
        if peer == self.me {
            return Err(SelectError::SelfConversation);
        }
        debug!(peer = %peer, "conversation selected");
        let peer = self.active.insert(peer);
        cursors.set(peer, now)?;
        Ok(())
    }

    /// The open conversation.
    pub fn current(&self) -> Option<&Identity> {
        self.active.as_ref()
    }

    /// Messages exchanged with the open peer, oldest first.
    pub fn visible_messages<'a>(&self, log: &'a MessageLog) -> Vec<&'a Message> {
        let Some(peer) = &self.active else {
            return Vec::new();
        };
        log.chronological()
            .into_iter()
            .filter(|m| m.is_between(&self.me, peer))
            .collect()
    }

    /// Mark the open conversation read after sending into it.
    ///
    /// Does nothing when no conversation is open.
    pub fn mark_sent<S: KeyValueStore>(
        &self,
        cursors: &mut ReadCursorStore<S>,
        now: Timestamp,
    ) -> Result<(), StoreError> {
        if let Some(peer) = &self.active {
            cursors.set(peer, now)?;
        }
        Ok(())
    }

    /// Close the open conversation.
    pub fn clear(&mut self) {
        self.active = None;
    }
}
