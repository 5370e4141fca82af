//! Read-cursor tracking for parlor.
//!
//! A read cursor is the point in time up to which the signed-in identity has
//! seen a peer's messages. Anything the peer sent after the cursor counts as
//! unread. Cursors are:
//! - monotonic per peer (moving one backwards is a no-op)
//! - durable before `set` returns, under `read_cursor/<identity>/<peer>`
//! - device-local; they are not synchronized between devices

use std::collections::BTreeMap;

use chat_types::{epoch, format_timestamp, Identity, Timestamp};
use chrono::{DateTime, Utc};
use tracing::{debug, error, warn};

use crate::kv::{KeyValueStore, StoreError};

const KEY_ROOT: &str = "read_cursor";

/// Storage key prefix for all of `identity`'s cursors.
pub fn key_prefix(identity: &Identity) -> String {
    format!("{}/{}/", KEY_ROOT, identity)
}

/// Storage key for `identity`'s cursor on `peer`.
pub fn cursor_key(identity: &Identity, peer: &Identity) -> String {
    format!("{}{}", key_prefix(identity), peer)
}

/// In-memory peer to watermark map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadCursors(BTreeMap<Identity, Timestamp>);

impl ReadCursors {
    /// An empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// The stored cursor for `peer`, if any.
    pub fn get(&self, peer: &Identity) -> Option<Timestamp> {
        self.0.get(peer).copied()
    }

    /// The cursor for `peer`, or the epoch when none is stored.
    pub fn watermark(&self, peer: &Identity) -> Timestamp {
        self.get(peer).unwrap_or_else(epoch)
    }

    /// Set a cursor unconditionally.
    pub fn insert(&mut self, peer: Identity, at: Timestamp) {
        self.0.insert(peer, at);
    }

    /// Number of peers with a cursor.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no cursors are stored.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Cursors in peer order.
    pub fn iter(&self) -> impl Iterator<Item = (&Identity, &Timestamp)> {
        self.0.iter()
    }
}

impl FromIterator<(Identity, Timestamp)> for ReadCursors {
    fn from_iter<I: IntoIterator<Item = (Identity, Timestamp)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Durable read cursors for one signed-in identity.
#[derive(Debug)]
pub struct ReadCursorStore<S> {
    store: S,
    identity: Identity,
    cursors: ReadCursors,
}

impl<S: KeyValueStore> ReadCursorStore<S> {
    /// Load every cursor stored for `identity`.
    ///
    /// Scans the identity's key prefix once. Entries whose peer or timestamp
    /// cannot be read are skipped with a warning.
    pub fn load_all(store: S, identity: &Identity) -> Result<Self, StoreError> {
        let prefix = key_prefix(identity);
        let mut cursors = ReadCursors::new();

        for (key, value) in store.scan_prefix(&prefix)? {
            let raw_peer = &key[prefix.len()..];
            let peer = match Identity::parse(raw_peer) {
                Ok(peer) => peer,
                Err(e) => {
                    warn!("skipping read cursor {:?}: {}", key, e);
                    continue;
                }
            };
            match DateTime::parse_from_rfc3339(value.trim()) {
                Ok(at) => cursors.insert(peer, at.with_timezone(&Utc)),
                Err(e) => warn!("skipping read cursor {:?} = {:?}: {}", key, value, e),
            }
        }

        debug!(identity = %identity, count = cursors.len(), "read cursors loaded");
        Ok(Self {
            store,
            identity: identity.clone(),
            cursors,
        })
    }

    /// The identity these cursors belong to.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// The cursor for `peer`, if one is stored.
    pub fn get(&self, peer: &Identity) -> Option<Timestamp> {
        self.cursors.get(peer)
    }

    /// Advance the cursor for `peer` to `at`.
    ///
    /// Returns `Ok(false)` without writing when `at` is not later than the
    /// current cursor. The in-memory cursor only moves once the durable
    /// write has succeeded.
    pub fn set(&mut self, peer: &Identity, at: Timestamp) -> Result<bool, StoreError> {
        if self.cursors.get(peer).is_some_and(|current| at <= current) {
            return Ok(false);
        }

        let key = cursor_key(&self.identity, peer);
        if let Err(e) = self.store.set(&key, &format_timestamp(&at)) {
            error!("failed to persist read cursor {:?}: {}", key, e);
            return Err(e);
        }

        self.cursors.insert(peer.clone(), at);
        debug!(peer = %peer, at = %format_timestamp(&at), "read cursor advanced");
        Ok(true)
    }

    /// Forget the in-memory cursors. Durable entries are kept.
    pub fn clear(&mut self) {
        self.cursors = ReadCursors::new();
    }

    /// Current cursors.
    pub fn snapshot(&self) -> &ReadCursors {
        &self.cursors
    }
}
