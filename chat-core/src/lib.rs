//! # chat-core
//!
//! Pure logic for parlor (no network I/O, instant tests).
//!
//! This crate implements the state machine and derivations behind the
//! conversation list without any network access, enabling fast unit tests.
//!
//! ## Design Philosophy
//!
//! Modules here take input and produce output:
//! - [`state`] turns connection events into a new state plus actions
//! - [`log`] and [`summary`] derive the sidebar from the session's messages
//! - [`conversation`] tracks which peer is on screen
//!
//! The one side effect allowed is the synchronous [`KeyValueStore`] write
//! behind the read cursors, which must be durable before `set` returns. The
//! network work (history fetch, live feed) is done by `chat-client`, which
//! interprets the actions produced here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod conversation;
pub mod kv;
pub mod log;
pub mod read_cursor;
pub mod state;
pub mod summary;

pub use conversation::{ActiveConversation, SelectError};
pub use kv::{KeyValueStore, MemoryStore, StoreError};
pub use log::MessageLog;
pub use read_cursor::{ReadCursorStore, ReadCursors};
pub use state::{Action, ConnectStage, ConnectionState, Event, FeedEvent, LOGOUT_REASON};
pub use summary::{summarize, total_unread, ConversationSummary};
