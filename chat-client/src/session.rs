//! Session - one signed-in identity's runtime.
//!
//! This module provides [`Session`], the primary API for applications: it is
//! built at login, owns everything the identity's conversations need, and is
//! torn down by [`Session::logout`].
//!
//! # Architecture
//!
//! A single worker task owns the message log, the read cursors, the active
//! conversation and the connectivity flag. Everything that can change them
//! (the history response, feed updates, user commands) goes through one
//! queue and is applied in arrival order, so no locks guard session state.
//!
//! ```text
//! HistoryService ──┐
//! FeedDriver ──────┼──► queue ──► worker ──► watch<SessionView>
//! Session::send ───┘                 │
//!                                    └──► KeyValueStore (read cursors)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use chat_client::{Session, SessionConfig, HttpHistoryService, WsTransport, JsonFileStore};
//!
//! let config = SessionConfig::default();
//! let session = Session::login(identity, &config, store, history, transport)?;
//!
//! session.select(peer).await?;
//! session.send("hello").await?;
//! let view = session.view();
//!
//! session.logout().await;
//! ```

use std::sync::Arc;
use std::time::Duration;

use chat_core::{
    summarize, total_unread, ActiveConversation, ConversationSummary, FeedEvent,
    KeyValueStore, MessageLog, ReadCursorStore, SelectError, StoreError,
};
use chat_types::{Identity, Message, OutgoingMessage};
use chrono::Utc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::feed::{publish, FaultReporter, FeedDriver, FeedUpdate};
use crate::history::{load_history, FetchError, HistoryService};
use crate::transport::{FeedTransport, TransportError};

/// Default live feed endpoint.
pub const DEFAULT_FEED_URL: &str = "ws://localhost:8080/ws-chat";
/// Default history endpoint.
pub const DEFAULT_HISTORY_URL: &str = "http://localhost:8080/api/messages/history";
/// Default wait between reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(5000);

/// Session errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The live feed is not connected.
    #[error("not connected")]
    NotConnected,

    /// No conversation is open.
    #[error("no conversation selected")]
    NoActiveConversation,

    /// The message is empty after trimming.
    #[error("message is empty")]
    EmptyMessage,

    /// A conversation with yourself was requested.
    #[error("cannot open a conversation with yourself")]
    SelfConversation,

    /// The session has shut down.
    #[error("session closed")]
    Closed,

    /// Read cursor storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl From<SelectError> for SessionError {
    fn from(err: SelectError) -> Self {
        match err {
            SelectError::SelfConversation => Self::SelfConversation,
            SelectError::Store(e) => Self::Store(e),
        }
    }
}

/// Configuration for a [`Session`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Live feed endpoint.
    pub feed_url: String,
    /// History service endpoint.
    pub history_url: String,
    /// Fixed wait between reconnect attempts.
    pub reconnect_delay: Duration,
    /// Capacity of the session's input queue.
    pub queue_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            feed_url: DEFAULT_FEED_URL.to_string(),
            history_url: DEFAULT_HISTORY_URL.to_string(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            queue_capacity: 256,
        }
    }
}

impl SessionConfig {
    /// Set the live feed endpoint.
    pub fn with_feed_url(mut self, url: &str) -> Self {
        self.feed_url = url.to_string();
        self
    }

    /// Set the history service endpoint.
    pub fn with_history_url(mut self, url: &str) -> Self {
        self.history_url = url.to_string();
        self
    }

    /// Set the reconnect delay.
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Set the input queue capacity (at least 1).
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }
}

/// Where the login-time history fetch stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryStatus {
    /// Still waiting for the history service.
    Pending,
    /// History was installed into the log.
    Loaded,
    /// History arrived after live messages and was thrown away.
    Discarded,
    /// The fetch failed; the session continues with live messages only.
    Failed,
}

/// Everything a front end needs to draw the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    /// The signed-in identity.
    pub identity: Identity,
    /// Whether the live feed is subscribed.
    pub connected: bool,
    /// State of the history fetch.
    pub history: HistoryStatus,
    /// Conversation list, newest first.
    pub summaries: Vec<ConversationSummary>,
    /// The open conversation.
    pub active: Option<Identity>,
    /// Messages of the open conversation, oldest first.
    pub visible: Vec<Message>,
    /// Unread messages across all conversations.
    pub total_unread: usize,
}

impl SessionView {
    fn empty(identity: Identity) -> Self {
        Self {
            identity,
            connected: false,
            history: HistoryStatus::Pending,
            summaries: Vec::new(),
            active: None,
            visible: Vec::new(),
            total_unread: 0,
        }
    }
}

type Reply = oneshot::Sender<Result<(), SessionError>>;

/// Inputs to the session worker.
enum Input {
    History(Result<Vec<Message>, FetchError>),
    Feed(FeedUpdate),
    Select { peer: Identity, reply: Reply },
    Send { content: String, reply: Reply },
}

impl From<FeedUpdate> for Input {
    fn from(update: FeedUpdate) -> Self {
        Self::Feed(update)
    }
}

/// A signed-in session.
///
/// Must be created inside a Tokio runtime. Dropping a session without
/// calling [`Session::logout`] still stops its tasks, but does not wait for
/// them.
pub struct Session {
    identity: Identity,
    inputs: mpsc::Sender<Input>,
    view: watch::Receiver<SessionView>,
    background: CancellationToken,
    worker_cancel: CancellationToken,
    background_tasks: Vec<JoinHandle<()>>,
    worker: Option<JoinHandle<()>>,
}

impl Session {
    /// Sign `identity` in: load its read cursors, start the history fetch
    /// and bring up the live feed.
    pub fn login(
        identity: Identity,
        config: &SessionConfig,
        store: Arc<dyn KeyValueStore>,
        history: Arc<dyn HistoryService>,
        transport: Arc<dyn FeedTransport>,
    ) -> Result<Self, SessionError> {
        let cursors = ReadCursorStore::load_all(store, &identity)?;
        info!(identity = %identity, "session starting");

        let (inputs, queue) = mpsc::channel(config.queue_capacity.max(1));
        let (view_tx, view) = watch::channel(SessionView::empty(identity.clone()));
        let background = CancellationToken::new();
        let worker_cancel = CancellationToken::new();

        let history_task = {
            let token = background.clone();
            let tx = inputs.clone();
            let who = identity.clone();
            tokio::spawn(async move {
                match load_history(history.as_ref(), &who, &token).await {
                    Err(FetchError::Cancelled) => debug!("history fetch abandoned"),
                    result => {
                        let _ = tx.send(Input::History(result)).await;
                    }
                }
            })
        };

        let driver = FeedDriver::new(
            &identity,
            Arc::clone(&transport),
            config.feed_url.clone(),
            config.reconnect_delay,
            background.clone(),
        );
        let faults = driver.fault_reporter();
        let feed_task = tokio::spawn(driver.run(inputs.clone()));

        let worker = Worker {
            identity: identity.clone(),
            log: MessageLog::new(),
            cursors,
            active: ActiveConversation::new(identity.clone()),
            connected: false,
            history: HistoryStatus::Pending,
            transport,
            faults,
            view: view_tx,
        };
        let worker_task = tokio::spawn(worker.run(queue, worker_cancel.clone()));

        Ok(Self {
            identity,
            inputs,
            view,
            background,
            worker_cancel,
            background_tasks: vec![history_task, feed_task],
            worker: Some(worker_task),
        })
    }

    /// The signed-in identity.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// The current view.
    pub fn view(&self) -> SessionView {
        self.view.borrow().clone()
    }

    /// A receiver that is notified whenever the view changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }

    /// Wait until the view satisfies `condition`.
    pub async fn wait_for(
        &self,
        condition: impl FnMut(&SessionView) -> bool,
    ) -> Result<SessionView, SessionError> {
        let mut view = self.view.clone();
        let found = view
            .wait_for(condition)
            .await
            .map_err(|_| SessionError::Closed)?;
        Ok(found.clone())
    }

    /// Open the conversation with `peer` and mark it read.
    pub async fn select(&self, peer: Identity) -> Result<(), SessionError> {
        self.request(|reply| Input::Select { peer, reply }).await
    }

    /// Send `content` to the open conversation.
    ///
    /// The text is trimmed; empty messages are refused. Requires a
    /// connected feed and an open conversation.
    pub async fn send(&self, content: impl Into<String>) -> Result<(), SessionError> {
        let content = content.into();
        self.request(|reply| Input::Send { content, reply }).await
    }

    async fn request(&self, make: impl FnOnce(Reply) -> Input) -> Result<(), SessionError> {
        let (reply, response) = oneshot::channel();
        self.inputs
            .send(make(reply))
            .await
            .map_err(|_| SessionError::Closed)?;
        response.await.map_err(|_| SessionError::Closed)?
    }

    /// Sign out.
    ///
    /// Abandons the history fetch, unsubscribes and closes the feed, waits
    /// for every task to stop and clears the in-memory read cursors.
    /// Durable cursors are kept for the next login.
    pub async fn logout(mut self) {
        info!(identity = %self.identity, "logging out");

        self.background.cancel();
        for task in self.background_tasks.drain(..) {
            if let Err(e) = task.await {
                warn!("session task ended abnormally: {}", e);
            }
        }

        self.worker_cancel.cancel();
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                warn!("session worker ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.background.cancel();
        self.worker_cancel.cancel();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

/// Owner of all mutable session state.
struct Worker {
    identity: Identity,
    log: MessageLog,
    cursors: ReadCursorStore<Arc<dyn KeyValueStore>>,
    active: ActiveConversation,
    connected: bool,
    history: HistoryStatus,
    transport: Arc<dyn FeedTransport>,
    faults: FaultReporter,
    view: watch::Sender<SessionView>,
}

impl Worker {
    async fn run(mut self, mut queue: mpsc::Receiver<Input>, cancel: CancellationToken) {
        self.publish();
        loop {
            let input = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                input = queue.recv() => match input {
                    Some(input) => input,
                    None => break,
                },
            };
            self.apply(input).await;
            self.publish();
        }

        self.log.clear();
        self.cursors.clear();
        self.active.clear();
        self.connected = false;
        self.publish();
        debug!(identity = %self.identity, "session worker stopped");
    }

    async fn apply(&mut self, input: Input) {
        match input {
            Input::History(Ok(messages)) => {
                let count = messages.len();
                if self.log.seed(messages) {
                    info!("history loaded ({} messages)", count);
                    self.history = HistoryStatus::Loaded;
                } else {
                    debug!("history arrived after live messages, discarded");
                    self.history = HistoryStatus::Discarded;
                }
            }
            Input::History(Err(e)) => {
                warn!("history unavailable: {}", e);
                self.history = HistoryStatus::Failed;
            }
            Input::Feed(FeedUpdate::Connectivity(event)) => {
                self.connected = matches!(event, FeedEvent::Connected);
            }
            Input::Feed(FeedUpdate::Message(message)) => self.receive(message),
            Input::Select { peer, reply } => {
                let result = self.active.select(peer, &mut self.cursors, Utc::now());
                let _ = reply.send(result.map_err(SessionError::from));
            }
            Input::Send { content, reply } => {
                let result = self.send(&content).await;
                let _ = reply.send(result);
            }
        }
    }

    fn receive(&mut self, message: Message) {
        let peer = message.peer_of(&self.identity).cloned();
        if !self.log.append(message) {
            debug!("duplicate message ignored");
            return;
        }

        // Nothing open yet: show the conversation that just received a message.
        if self.active.current().is_none() {
            if let Some(peer) = peer {
                if let Err(e) = self.active.select(peer, &mut self.cursors, Utc::now()) {
                    warn!("could not open conversation: {}", e);
                }
            }
        }
    }

    async fn send(&mut self, content: &str) -> Result<(), SessionError> {
        if !self.connected {
            return Err(SessionError::NotConnected);
        }
        let peer = self
            .active
            .current()
            .cloned()
            .ok_or(SessionError::NoActiveConversation)?;
        let content = content.trim();
        if content.is_empty() {
            return Err(SessionError::EmptyMessage);
        }

        let message = OutgoingMessage::new(self.identity.clone(), peer, content);
        if let Err(e) = publish(self.transport.as_ref(), message).await {
            warn!("publish failed, dropping feed connection: {}", e);
            self.faults.report(e.to_string());
            return Err(e.into());
        }

        if let Err(e) = self.active.mark_sent(&mut self.cursors, Utc::now()) {
            warn!("message sent but conversation not marked read: {}", e);
        }
        Ok(())
    }

    fn publish(&self) {
        let summaries = summarize(
            self.log.iter(),
            &self.identity,
            self.cursors.snapshot(),
            Utc::now(),
        );
        let view = SessionView {
            identity: self.identity.clone(),
            connected: self.connected,
            history: self.history,
            total_unread: total_unread(&summaries),
            summaries,
            active: self.active.current().cloned(),
            visible: self
                .active
                .visible_messages(&self.log)
                .into_iter()
                .cloned()
                .collect(),
        };
        self.view.send_if_modified(|current| {
            if *current == view {
                false
            } else {
                *current = view;
                true
            }
        });
    }
}
