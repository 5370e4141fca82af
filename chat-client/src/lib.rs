//! # chat-client
//!
//! Session runtime for parlor one-to-one chat.
//!
//! This is the library front ends use: it signs an identity in, loads its
//! history, keeps the live feed subscribed and exposes the conversation list
//! as a [`SessionView`].
//!
//! ## Features
//!
//! - **Live Feed**: WebSocket subscription with fixed-delay reconnect
//! - **History**: One-shot fetch at login, abandoned on logout
//! - **Read Cursors**: Persisted per identity in a local JSON file
//! - **Pure State Machine**: Uses chat-core for side-effect-free logic
//!
//! ## Example
//!
//! ```ignore
//! use chat_client::{Session, SessionConfig};
//!
//! let session = Session::login(identity, &SessionConfig::default(), store, history, transport)?;
//!
//! session.select(peer).await?;
//! session.send("hello").await?;
//!
//! for row in session.view().summaries {
//!     println!("{} ({})", row.peer, row.unread_count);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod auth;
pub mod feed;
pub mod history;
pub mod session;
pub mod store;
pub mod transport;

pub use auth::{AuthError, Authenticator, Credentials, HttpAuthenticator, LocalAuthenticator};
pub use feed::{publish, FaultReporter, FeedDriver, FeedUpdate};
pub use history::{
    decode_history, load_history, FetchError, HistoryService, HttpHistoryService, MockHistory,
};
pub use session::{
    HistoryStatus, Session, SessionConfig, SessionError, SessionView, DEFAULT_FEED_URL,
    DEFAULT_HISTORY_URL, DEFAULT_RECONNECT_DELAY,
};
pub use store::JsonFileStore;
pub use transport::{FeedTransport, MockTransport, TransportError, WsTransport};
