//! Conversation summaries for the sidebar.
//!
//! A summary is derived from the message log, never stored. Messages are
//! grouped by peer (the other participant from the signed-in identity's
//! point of view); each group contributes its latest message and the number
//! of inbound messages newer than the peer's read cursor.

use chat_types::{Identity, Message, Timestamp};

use crate::read_cursor::ReadCursors;

/// One row of the conversation list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSummary {
    /// The other participant.
    pub peer: Identity,
    /// Text of the latest message in the conversation.
    pub last_message: String,
    /// When the latest message was sent (or `now` if it carries no time).
    pub last_time: Timestamp,
    /// Messages from `peer` sent after the read cursor.
    pub unread_count: usize,
}

/// Build the conversation list for `me`.
///
/// Messages with no resolvable peer are ignored. Rows are ordered newest
/// first; rows with the same `last_time` keep the order in which their peer
/// first appeared in `messages`.
pub fn summarize<'a, I>(
    messages: I,
    me: &Identity,
    cursors: &ReadCursors,
    now: Timestamp,
) -> Vec<ConversationSummary>
where
    I: IntoIterator<Item = &'a Message>,
{
    let mut groups: Vec<(Identity, Vec<&'a Message>)> = Vec::new();
    for message in messages {
        let Some(peer) = message.peer_of(me) else {
            continue;
        };
        match groups.iter_mut().find(|(p, _)| p == peer) {
            Some((_, group)) => group.push(message),
            None => groups.push((peer.clone(), vec![message])),
        }
    }

    let mut summaries: Vec<ConversationSummary> = groups
        .into_iter()
        .filter_map(|(peer, mut group)| {
            group.sort_by_key(|m| m.order_key());
            let last = *group.last()?;
            let watermark = cursors.watermark(&peer);
            let unread_count = group
                .iter()
                .filter(|m| m.is_to(me) && m.sent_at_or_epoch() > watermark)
                .count();
            Some(ConversationSummary {
                last_message: last.content.clone(),
                last_time: last.sent_at.unwrap_or(now),
                unread_count,
                peer,
            })
        })
        .collect();

    summaries.sort_by(|a, b| b.last_time.cmp(&a.last_time));
    summaries
}

/// Unread messages across all conversations.
pub fn total_unread(summaries: &[ConversationSummary]) -> usize {
    summaries.iter().map(|s| s.unread_count).sum()
}
