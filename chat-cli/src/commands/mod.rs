//! CLI command implementations.

pub mod conversations;
pub mod login;
pub mod logout;
pub mod open;
pub mod send;
pub mod status;
pub mod watch;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use chat_client::{
    FeedTransport, HistoryService, HistoryStatus, HttpHistoryService, JsonFileStore, MockHistory,
    MockTransport, Session, SessionView, WsTransport,
};
use chat_core::ConversationSummary;
use chat_types::{Identity, Message, Timestamp};
use tracing::warn;

use crate::config::{Config, StoredIdentity};

/// Everything a command needs from the command line and config file.
#[derive(Debug, Clone)]
pub struct Context {
    /// Data directory (identity, config, read cursors).
    pub data_dir: PathBuf,
    /// Loaded configuration.
    pub config: Config,
    /// Use the in-memory transport and history instead of the server.
    pub mock: bool,
}

impl Context {
    /// The signed-in identity.
    pub async fn identity(&self) -> Result<Identity> {
        StoredIdentity::load(&self.data_dir).await?.identity()
    }

    /// Start a session for the signed-in identity.
    pub async fn open_session(&self) -> Result<Session> {
        let identity = self.identity().await?;
        let store = JsonFileStore::open(self.config.cursor_path(&self.data_dir))
            .context("Failed to open read cursor file")?;

        let (history, transport): (Arc<dyn HistoryService>, Arc<dyn FeedTransport>) = if self.mock
        {
            (
                Arc::new(MockHistory::default()),
                Arc::new(MockTransport::auto_ack()),
            )
        } else {
            (
                Arc::new(
                    HttpHistoryService::new(&self.config.server.history_url)
                        .context("Invalid history url")?,
                ),
                Arc::new(WsTransport::new()),
            )
        };

        Session::login(
            identity,
            &self.config.session_config(),
            Arc::new(store),
            history,
            transport,
        )
        .context("Failed to start session")
    }

    /// Wait for the history fetch to settle, giving up after the configured
    /// wait.
    pub async fn await_history(&self, session: &Session) -> SessionView {
        let settled = tokio::time::timeout(
            self.config.wait(),
            session.wait_for(|v| v.history != HistoryStatus::Pending),
        )
        .await;
        match settled {
            Ok(Ok(view)) => {
                if view.history == HistoryStatus::Failed {
                    warn!("history unavailable, showing live messages only");
                }
                view
            }
            _ => {
                warn!("history still loading after {:?}", self.config.wait());
                session.view()
            }
        }
    }

    /// Wait for the live feed to connect.
    pub async fn await_connection(&self, session: &Session) -> Result<SessionView> {
        tokio::time::timeout(self.config.wait(), session.wait_for(|v| v.connected))
            .await
            .with_context(|| format!("Could not connect to {}", self.config.server.feed_url))?
            .context("Session closed while connecting")
    }
}

/// `Connected` or `Connecting…`.
pub fn connectivity(view: &SessionView) -> &'static str {
    if view.connected {
        "Connected"
    } else {
        "Connecting…"
    }
}

/// Short display form of a timestamp.
pub fn format_time(ts: &Timestamp) -> String {
    ts.format("%Y-%m-%d %H:%M").to_string()
}

/// One conversation list row.
pub fn summary_line(summary: &ConversationSummary) -> String {
    let badge = if summary.unread_count > 0 {
        format!(" ({} unread)", summary.unread_count)
    } else {
        String::new()
    };
    format!(
        "{}  {}{}  {}",
        format_time(&summary.last_time),
        summary.peer,
        badge,
        summary.last_message
    )
}

/// One message line, as seen by `me`.
pub fn message_line(message: &Message, me: &Identity) -> String {
    let who = if &message.sender == me {
        "you".to_string()
    } else {
        message.sender.to_string()
    };
    let time = message
        .sent_at
        .as_ref()
        .map(format_time)
        .unwrap_or_else(|| "--".to_string());
    format!("{}  {}: {}", time, who, message.content)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use tempfile::TempDir;

    /// A mock-mode context in a fresh data directory.
    pub fn mock_context() -> (TempDir, Context) {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Context {
            data_dir: dir.path().to_path_buf(),
            config: Config::default(),
            mock: true,
        };
        (dir, ctx)
    }

    /// A mock-mode context with `name` signed in.
    pub async fn signed_in(name: &str) -> (TempDir, Context) {
        let (dir, ctx) = mock_context();
        let identity = Identity::parse(name).unwrap();
        StoredIdentity::new(&identity, None)
            .save(&ctx.data_dir)
            .await
            .unwrap();
        (dir, ctx)
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
    fn summary_line_shows_badge_only_when_unread() {
        let mut summary = ConversationSummary {
            peer: id("bob"),
            last_message: "hi".to_string(),
            last_time: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
            unread_count: 2,
        };
        assert_eq!(summary_line(&summary), "2024-05-01 10:00  bob (2 unread)  hi");

        summary.unread_count = 0;
        assert_eq!(summary_line(&summary), "2024-05-01 10:00  bob  hi");
    }

    #[test]
    fn message_line_names_own_messages_you() {
        let message = Message::from_json(
            r#"{"sender":"alice","recipient":"bob","content":"yo","sentAt":"2024-05-01T10:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(message_line(&message, &id("alice")), "2024-05-01 10:00  you: yo");
        assert_eq!(message_line(&message, &id("bob")), "2024-05-01 10:00  alice: yo");
    }

    #[tokio::test]
    async fn open_session_requires_sign_in() {
        let (_dir, ctx) = test_support::mock_context();
        assert!(ctx.open_session().await.is_err());
    }

    #[tokio::test]
    async fn mock_session_connects() {
        let (_dir, ctx) = test_support::signed_in("alice").await;
        let session = ctx.open_session().await.unwrap();
        let view = ctx.await_connection(&session).await.unwrap();
        assert_eq!(connectivity(&view), "Connected");
        assert_eq!(ctx.await_history(&session).await.history, HistoryStatus::Loaded);
        session.logout().await;
    }
}
