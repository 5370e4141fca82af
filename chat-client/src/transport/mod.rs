//! Live feed transport abstraction for parlor.
//!
//! This module provides a pluggable transport layer for the live feed
//! (WebSocket, mock for testing). The feed carries JSON text frames; the
//! transport only moves text and knows nothing about their meaning.
//!
//! # Design
//!
//! The transport trait is async and connection-oriented:
//! - `connect()` opens (or re-opens) the connection
//! - `send()` transmits one text frame
//! - `recv()` waits for the next text frame
//! - `close()` gracefully terminates
//!
//! `send()` and `recv()` may be called concurrently: the feed driver waits in
//! `recv()` while the session publishes outgoing messages.
//!
//! # Example
//!
//! ```ignore
//! let transport = MockTransport::new();
//! transport.connect("ws://localhost:8080/ws-chat").await?;
//! transport.send(r#"{"type":"subscribe","channel":"/topic/user.alice"}"#).await?;
//! let frame = transport.recv().await?;
//! ```

mod mock;
mod ws;

pub use mock::MockTransport;
pub use ws::WsTransport;

use async_trait::async_trait;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Not connected.
    #[error("not connected")]
    NotConnected,

    /// Connection closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receive failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),
}

/// Transport trait for the live feed.
///
/// Implementations handle the underlying connection mechanism
/// (WebSocket, mock, etc).
#[async_trait]
pub trait FeedTransport: Send + Sync {
    /// Connect to the feed endpoint at `url`, replacing any previous
    /// connection.
    async fn connect(&self, url: &str) -> Result<(), TransportError>;

    /// Send one text frame.
    async fn send(&self, frame: &str) -> Result<(), TransportError>;

    /// Receive the next text frame.
    ///
    /// Waits until a frame is available or the connection breaks.
    async fn recv(&self) -> Result<String, TransportError>;

    /// Check if currently connected.
    fn is_connected(&self) -> bool;

    /// Close the connection gracefully.
    async fn close(&self) -> Result<(), TransportError>;
}
