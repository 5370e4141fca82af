//! History loading.
//!
//! At login the session asks the history service for every message the
//! identity has sent or received. The fetch runs once, is never retried, and
//! is abandoned if the session logs out first.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chat_types::{Identity, Message};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

/// History fetch errors.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The configured URL is not usable.
    #[error("invalid history url {0:?}")]
    InvalidUrl(String),

    /// The request could not be completed.
    #[error("history request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("history service returned status {0}")]
    Status(u16),

    /// The body was not a JSON array.
    #[error("history body could not be decoded: {0}")]
    Decode(String),

    /// The session ended before the response arrived.
    #[error("history fetch cancelled")]
    Cancelled,
}

/// Source of persisted messages.
#[async_trait]
pub trait HistoryService: Send + Sync {
    /// Every message sent or received by `identity`, in any order.
    async fn fetch(&self, identity: &Identity) -> Result<Vec<Message>, FetchError>;
}

/// History service over HTTP: `GET <url>?user=<identity>`.
#[derive(Debug, Clone)]
pub struct HttpHistoryService {
    client: reqwest::Client,
    url: Url,
}

impl HttpHistoryService {
    /// Create a client for the service at `url`.
    pub fn new(url: &str) -> Result<Self, FetchError> {
        let url = Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;
        Ok(Self {
            client: reqwest::Client::new(),
            url,
        })
    }

    /// Use a preconfigured HTTP client (timeouts, proxies).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// The request URL for `identity`.
    pub fn request_url(&self, identity: &Identity) -> Url {
        let mut url = self.url.clone();
        url.query_pairs_mut().append_pair("user", identity.as_str());
        url
    }
}

#[async_trait]
impl HistoryService for HttpHistoryService {
    async fn fetch(&self, identity: &Identity) -> Result<Vec<Message>, FetchError> {
        let url = self.request_url(identity);
        debug!("fetching history from {}", url);

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let items: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;
        Ok(decode_history(items))
    }
}

/// Decode history items one by one, skipping the ones that are not messages.
pub fn decode_history(items: Vec<serde_json::Value>) -> Vec<Message> {
    let total = items.len();
    let messages: Vec<Message> = items
        .into_iter()
        .filter_map(|item| match Message::from_value(item) {
            Ok(message) => Some(message),
            Err(e) => {
                warn!("dropping unreadable history entry: {}", e);
                None
            }
        })
        .collect();
    if messages.len() < total {
        warn!("{} of {} history entries dropped", total - messages.len(), total);
    }
    messages
}

/// Fetch history for `identity`, giving up as soon as `cancel` fires.
pub async fn load_history(
    service: &dyn HistoryService,
    identity: &Identity,
    cancel: &CancellationToken,
) -> Result<Vec<Message>, FetchError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(FetchError::Cancelled),
        result = service.fetch(identity) => result,
    }
}

/// In-memory history service for tests.
///
/// Each fetch takes the next scripted reply; once the script is exhausted it
/// answers with an empty history.
#[derive(Debug, Clone, Default)]
pub struct MockHistory {
    inner: Arc<Mutex<MockHistoryInner>>,
}

#[derive(Debug, Default)]
struct MockHistoryInner {
    replies: VecDeque<Result<Vec<Message>, u16>>,
    delay: Option<Duration>,
    fetches: Vec<Identity>,
}

impl MockHistory {
    /// A service that returns `messages` once.
    pub fn new(messages: Vec<Message>) -> Self {
        let history = Self::default();
        history.push_reply(Ok(messages));
        history
    }

    /// A service whose next fetch fails with HTTP `status`.
    pub fn failing(status: u16) -> Self {
        let history = Self::default();
        history.push_reply(Err(status));
        history
    }

    /// Delay every reply by `delay`.
    pub fn with_delay(self, delay: Duration) -> Self {
        self.lock().delay = Some(delay);
        self
    }

    /// Script another reply.
    pub fn push_reply(&self, reply: Result<Vec<Message>, u16>) {
        self.lock().replies.push_back(reply);
    }

    /// Identities that were fetched, in order.
    pub fn fetches(&self) -> Vec<Identity> {
        self.lock().fetches.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockHistoryInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl HistoryService for MockHistory {
    async fn fetch(&self, identity: &Identity) -> Result<Vec<Message>, FetchError> {
        let (reply, delay) = {
            let mut inner = self.lock();
            inner.fetches.push(identity.clone());
            (inner.replies.pop_front(), inner.delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match reply {
            Some(Ok(messages)) => Ok(messages),
            Some(Err(status)) => Err(FetchError::Status(status)),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn id(name: &str) -> Identity {
        Identity::parse(name).unwrap()
    }

    #[test]
    fn request_url_carries_user() {
        let service = HttpHistoryService::new("http://localhost:8080/api/messages/history").unwrap();
        assert_eq!(
            service.request_url(&id("alice")).as_str(),
            "http://localhost:8080/api/messages/history?user=alice"
        );
    }

    #[test]
    fn request_url_escapes_user() {
        let service = HttpHistoryService::new("http://h/history").unwrap();
        assert_eq!(
            service.request_url(&id("a b&c")).as_str(),
            "http://h/history?user=a+b%26c"
        );
    }

    #[test]
    fn invalid_url_is_rejected() {
        assert!(matches!(
            HttpHistoryService::new("not a url"),
            Err(FetchError::InvalidUrl(_))
        ));
    }

    #[test]
    fn decode_skips_bad_entries() {
        let messages = decode_history(vec![
            json!({"id": 1, "sender": "bob", "recipient": "alice", "content": "hi"}),
            json!({"nonsense": true}),
            json!("string"),
            json!({"sender": "alice", "recipient": "bob", "content": "yo", "sentAt": "garbage"}),
        ]);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "hi");
        assert_eq!(messages[1].sent_at, Some(chat_types::epoch()));
    }

    #[tokio::test]
    async fn load_returns_service_result() {
        let history = MockHistory::new(vec![]);
        let out = load_history(&history, &id("alice"), &CancellationToken::new()).await;
        assert!(out.unwrap().is_empty());
        assert_eq!(history.fetches(), vec![id("alice")]);
    }

    #[tokio::test]
    async fn load_reports_status_errors() {
        let history = MockHistory::failing(500);
        let out = load_history(&history, &id("alice"), &CancellationToken::new()).await;
        assert!(matches!(out, Err(FetchError::Status(500))));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_wins_over_slow_fetch() {
        let history = MockHistory::new(vec![]).with_delay(Duration::from_secs(30));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let out = load_history(&history, &id("alice"), &cancel).await;
        assert!(matches!(out, Err(FetchError::Cancelled)));
    }
}
