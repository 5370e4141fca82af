//! Live feed driver.
//!
//! Runs the [`ConnectionState`] machine from chat-core against a
//! [`FeedTransport`]: it performs the actions the machine asks for, turns
//! transport results and inbound frames back into events, and forwards
//! connectivity changes and decoded messages to the session.
//!
//! ```text
//! transport ──frames──► FeedDriver ──events──► ConnectionState
//!                          ▲                         │
//!                          └───────── actions ◄──────┘
//!                          │
//!                          └──FeedUpdate──► session queue
//! ```
//!
//! Frames are decoded here, at the boundary. A payload that is not a valid
//! message is logged and dropped; the subscription stays up.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chat_core::{Action, ConnectStage, ConnectionState, Event, FeedEvent, LOGOUT_REASON};
use chat_types::{Channel, ClientFrame, Identity, Message, OutgoingMessage, ServerFrame};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::transport::{FeedTransport, TransportError};

/// What the driver reports to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedUpdate {
    /// Connectivity changed or an attempt failed.
    Connectivity(FeedEvent),
    /// A message arrived on the private channel.
    Message(Message),
}

/// Lets other users of the transport tell the driver that the connection
/// broke under them.
#[derive(Debug, Clone)]
pub struct FaultReporter {
    tx: mpsc::Sender<String>,
}

impl FaultReporter {
    /// Report a failed write on the feed connection.
    pub fn report(&self, error: impl Into<String>) {
        // One pending fault is enough to force a reconnect.
        let _ = self.tx.try_send(error.into());
    }
}

/// Drives one identity's live feed until cancelled.
pub struct FeedDriver {
    channel: Channel,
    transport: Arc<dyn FeedTransport>,
    url: String,
    reconnect_delay: Duration,
    reconnect_at: Option<Instant>,
    cancel: CancellationToken,
    fault_tx: mpsc::Sender<String>,
    faults: mpsc::Receiver<String>,
}

impl FeedDriver {
    /// Create a driver for `identity`'s private channel.
    pub fn new(
        identity: &Identity,
        transport: Arc<dyn FeedTransport>,
        url: impl Into<String>,
        reconnect_delay: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let (fault_tx, faults) = mpsc::channel(1);
        Self {
            channel: Channel::for_identity(identity),
            transport,
            url: url.into(),
            reconnect_delay,
            reconnect_at: None,
            cancel,
            fault_tx,
            faults,
        }
    }

    /// A handle for reporting failed writes, such as a publish that could
    /// not be sent. A report while subscribed is handled like a broken
    /// connection.
    pub fn fault_reporter(&self) -> FaultReporter {
        FaultReporter {
            tx: self.fault_tx.clone(),
        }
    }

    /// Connect, then keep the subscription alive until the token is
    /// cancelled. Unsubscribes and closes the transport before returning.
    pub async fn run<T>(mut self, updates: mpsc::Sender<T>)
    where
        T: From<FeedUpdate> + Send,
    {
        let mut state = ConnectionState::new();
        let mut pending = VecDeque::from([Event::ConnectRequested]);

        loop {
            let event = match pending.pop_front() {
                Some(event) => event,
                None => self.next_event(&state).await,
            };
            let (next, actions) = state.on_event(event);
            debug!(state = ?next, "feed transition");
            state = next;

            for action in actions {
                if let Some(event) = self.execute(action, &updates).await {
                    pending.push_back(event);
                }
            }

            if matches!(state, ConnectionState::Disconnected) {
                break;
            }
        }
        debug!("feed driver for {} stopped", self.channel);
    }

    /// Wait for whatever the current state is waiting on.
    async fn next_event(&mut self, state: &ConnectionState) -> Event {
        if self.cancel.is_cancelled() {
            return Event::LogoutRequested;
        }

        match state {
            ConnectionState::Connecting {
                stage: ConnectStage::Backoff,
                ..
            } => {
                let deadline = self.reconnect_at.unwrap_or_else(Instant::now);
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => Event::LogoutRequested,
                    _ = tokio::time::sleep_until(deadline) => Event::ReconnectTimer,
                }
            }
            state if state.is_listening() => loop {
                let received = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Event::LogoutRequested,
                    Some(error) = self.faults.recv() => {
                        return Event::TransportFailed { error };
                    }
                    received = self.transport.recv() => received,
                };
                match received {
                    Ok(text) => {
                        if let Some(event) = self.decode(&text) {
                            return event;
                        }
                    }
                    Err(e) => return Event::TransportFailed { error: e.to_string() },
                }
            },
            _ => Event::LogoutRequested,
        }
    }

    /// Turn an inbound frame into an event, or drop it.
    fn decode(&self, text: &str) -> Option<Event> {
        match ServerFrame::from_text(text) {
            Ok(ServerFrame::Subscribed { channel }) if channel == self.channel => {
                Some(Event::SubscribeAcked)
            }
            Ok(ServerFrame::Subscribed { channel }) => {
                debug!("ignoring ack for {}", channel);
                None
            }
            Ok(ServerFrame::Event { channel, body }) => {
                if channel != self.channel {
                    debug!("ignoring event for {}", channel);
                    return None;
                }
                match Message::from_value(body) {
                    Ok(message) => {
                        if !message.room_matches_pair() {
                            warn!(
                                "message from {} carries room {:?} for another pair",
                                message.sender, message.room
                            );
                        }
                        Some(Event::MessageReceived { message })
                    }
                    Err(e) => {
                        warn!("dropping malformed message on {}: {}", channel, e);
                        None
                    }
                }
            }
            Ok(ServerFrame::Error { reason }) => {
                warn!("feed server reported: {}", reason);
                None
            }
            Err(e) => {
                warn!("dropping unreadable feed frame: {}", e);
                None
            }
        }
    }

    /// Perform one action. Returns the event it produced, if any.
    async fn execute<T>(&mut self, action: Action, updates: &mpsc::Sender<T>) -> Option<Event>
    where
        T: From<FeedUpdate> + Send,
    {
        match action {
            Action::OpenTransport => {
                // Faults reported against an earlier connection are stale.
                while self.faults.try_recv().is_ok() {}
                debug!("opening feed {}", self.url);
                let result = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Some(Event::LogoutRequested),
                    result = self.transport.connect(&self.url) => result,
                };
                Some(match result {
                    Ok(()) => Event::TransportOpened,
                    Err(e) => Event::TransportFailed { error: e.to_string() },
                })
            }
            Action::Subscribe => {
                let frame = ClientFrame::Subscribe {
                    channel: self.channel.clone(),
                };
                match send_frame(self.transport.as_ref(), &frame).await {
                    Ok(()) => {
                        debug!("subscribing to {}", self.channel);
                        None
                    }
                    Err(e) => Some(Event::TransportFailed { error: e.to_string() }),
                }
            }
            Action::Unsubscribe => {
                let frame = ClientFrame::Unsubscribe {
                    channel: self.channel.clone(),
                };
                if let Err(e) = send_frame(self.transport.as_ref(), &frame).await {
                    debug!("unsubscribe not sent: {}", e);
                }
                None
            }
            Action::CloseTransport => {
                if let Err(e) = self.transport.close().await {
                    debug!("close failed: {}", e);
                }
                None
            }
            Action::StartReconnectTimer { attempt } => {
                self.reconnect_at = Some(Instant::now() + self.reconnect_delay);
                info!(
                    attempt,
                    "feed reconnecting in {}ms",
                    self.reconnect_delay.as_millis()
                );
                None
            }
            Action::CancelReconnect => {
                self.reconnect_at = None;
                None
            }
            Action::Deliver { message } => forward(updates, FeedUpdate::Message(message)).await,
            Action::EmitEvent(event) => {
                match &event {
                    FeedEvent::Connected => info!("feed subscribed to {}", self.channel),
                    FeedEvent::Disconnected { reason } if reason == LOGOUT_REASON => {
                        info!("feed closed for {}", self.channel)
                    }
                    FeedEvent::Disconnected { reason } => warn!("feed disconnected: {}", reason),
                    FeedEvent::ConnectFailed { attempt, error } => {
                        warn!("feed attempt {} failed: {}", attempt, error)
                    }
                }
                forward(updates, FeedUpdate::Connectivity(event)).await
            }
        }
    }
}

/// Hand an update to the session. A closed queue means the session is gone.
async fn forward<T: From<FeedUpdate>>(
    updates: &mpsc::Sender<T>,
    update: FeedUpdate,
) -> Option<Event> {
    match updates.send(T::from(update)).await {
        Ok(()) => None,
        Err(_) => Some(Event::LogoutRequested),
    }
}

async fn send_frame(transport: &dyn FeedTransport, frame: &ClientFrame) -> Result<(), TransportError> {
    let text = frame
        .to_text()
        .map_err(|e| TransportError::SendFailed(e.to_string()))?;
    transport.send(&text).await
}

/// Publish an outgoing message on the feed.
pub async fn publish(
    transport: &dyn FeedTransport,
    message: OutgoingMessage,
) -> Result<(), TransportError> {
    send_frame(transport, &ClientFrame::publish(message)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use serde_json::json;

    const DELAY: Duration = Duration::from_millis(5000);

    fn alice() -> Identity {
        Identity::parse("alice").unwrap()
    }

    fn channel() -> Channel {
        Channel::for_identity(&alice())
    }

    fn event_frame(body: serde_json::Value) -> ServerFrame {
        ServerFrame::Event {
            channel: channel(),
            body,
        }
    }

    fn spawn_driver(
        transport: &MockTransport,
    ) -> (
        mpsc::Receiver<FeedUpdate>,
        CancellationToken,
        tokio::task::JoinHandle<()>,
    ) {
        let (tx, rx) = mpsc::channel(32);
        let cancel = CancellationToken::new();
        let driver = FeedDriver::new(
            &alice(),
            Arc::new(transport.clone()),
            "ws://feed",
            DELAY,
            cancel.clone(),
        );
        let handle = tokio::spawn(driver.run(tx));
        (rx, cancel, handle)
    }

    async fn expect_connectivity(rx: &mut mpsc::Receiver<FeedUpdate>) -> FeedEvent {
        match rx.recv().await {
            Some(FeedUpdate::Connectivity(event)) => event,
            other => panic!("expected connectivity update, got {:?}", other),
        }
    }

    async fn expect_message(rx: &mut mpsc::Receiver<FeedUpdate>) -> Message {
        match rx.recv().await {
            Some(FeedUpdate::Message(message)) => message,
            other => panic!("expected message, got {:?}", other),
        }
    }

    // ===========================================
    // Connect / Subscribe
    // ===========================================

    #[tokio::test(start_paused = true)]
    async fn connects_and_subscribes() {
        let transport = MockTransport::auto_ack();
        let (mut rx, cancel, handle) = spawn_driver(&transport);

        assert_eq!(expect_connectivity(&mut rx).await, FeedEvent::Connected);
        assert_eq!(transport.connected_address(), Some("ws://feed".to_string()));
        assert_eq!(
            transport.sent_client_frames(),
            vec![ClientFrame::Subscribe { channel: channel() }]
        );

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn ack_for_other_channel_is_ignored() {
        let transport = MockTransport::new();
        let (mut rx, cancel, handle) = spawn_driver(&transport);

        transport.queue_frame(&ServerFrame::Subscribed {
            channel: Channel::for_identity(&Identity::parse("mallory").unwrap()),
        });
        transport.queue_frame(&ServerFrame::Subscribed { channel: channel() });

        assert_eq!(expect_connectivity(&mut rx).await, FeedEvent::Connected);
        cancel.cancel();
        handle.await.unwrap();
    }

    // ===========================================
    // Delivery
    // ===========================================

    #[tokio::test(start_paused = true)]
    async fn delivers_in_order_and_drops_malformed() {
        let transport = MockTransport::auto_ack();
        let (mut rx, cancel, handle) = spawn_driver(&transport);
        expect_connectivity(&mut rx).await;

        transport.queue_frame(&event_frame(
            json!({"id": 1, "sender": "bob", "recipient": "alice", "content": "one"}),
        ));
        transport.queue_frame(&event_frame(json!({"content": "no sender"})));
        transport.queue_response("{not json");
        transport.queue_frame(&ServerFrame::Error {
            reason: "slow down".into(),
        });
        transport.queue_frame(&event_frame(
            json!({"id": 2, "sender": "bob", "recipient": "alice", "content": "two"}),
        ));

        assert_eq!(expect_message(&mut rx).await.content, "one");
        assert_eq!(expect_message(&mut rx).await.content, "two");
        assert!(transport.is_connected());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn events_for_other_channels_are_dropped() {
        let transport = MockTransport::auto_ack();
        let (mut rx, cancel, handle) = spawn_driver(&transport);
        expect_connectivity(&mut rx).await;

        transport.queue_frame(&ServerFrame::Event {
            channel: Channel::for_identity(&Identity::parse("carol").unwrap()),
            body: json!({"sender": "bob", "recipient": "carol", "content": "not yours"}),
        });
        transport.queue_frame(&event_frame(
            json!({"sender": "bob", "recipient": "alice", "content": "yours"}),
        ));

        assert_eq!(expect_message(&mut rx).await.content, "yours");
        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn foreign_room_is_delivered_anyway() {
        let transport = MockTransport::auto_ack();
        let (mut rx, cancel, handle) = spawn_driver(&transport);
        expect_connectivity(&mut rx).await;

        transport.queue_frame(&event_frame(json!({
            "sender": "bob",
            "recipient": "alice",
            "room": "bob|carol",
            "content": "odd room",
        })));

        assert_eq!(expect_message(&mut rx).await.content, "odd room");
        cancel.cancel();
        handle.await.unwrap();
    }

    // ===========================================
    // Reconnection
    // ===========================================

    #[tokio::test(start_paused = true)]
    async fn reconnects_after_fixed_delay() {
        let transport = MockTransport::auto_ack();
        let (mut rx, cancel, handle) = spawn_driver(&transport);
        expect_connectivity(&mut rx).await;

        let dropped_at = Instant::now();
        transport.disconnect_remote();

        assert!(matches!(
            expect_connectivity(&mut rx).await,
            FeedEvent::Disconnected { .. }
        ));
        assert_eq!(expect_connectivity(&mut rx).await, FeedEvent::Connected);
        assert!(dropped_at.elapsed() >= DELAY);
        assert_eq!(transport.connect_count(), 2);

        // Resubscribed on the new connection.
        let subscribes = transport
            .sent_client_frames()
            .into_iter()
            .filter(|f| matches!(f, ClientFrame::Subscribe { .. }))
            .count();
        assert_eq!(subscribes, 2);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_attempts_retry_without_limit() {
        let transport = MockTransport::auto_ack();
        transport.fail_connects(3);
        let started = Instant::now();
        let (mut rx, cancel, handle) = spawn_driver(&transport);

        for attempt in 1..=3 {
            assert!(matches!(
                expect_connectivity(&mut rx).await,
                FeedEvent::ConnectFailed { attempt: a, .. } if a == attempt
            ));
        }
        assert_eq!(expect_connectivity(&mut rx).await, FeedEvent::Connected);
        assert!(started.elapsed() >= DELAY * 3);
        assert_eq!(transport.connect_count(), 4);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn subscribe_send_failure_triggers_retry() {
        let transport = MockTransport::auto_ack();
        transport.fail_next_send("broken pipe");
        let (mut rx, cancel, handle) = spawn_driver(&transport);

        assert!(matches!(
            expect_connectivity(&mut rx).await,
            FeedEvent::ConnectFailed { attempt: 1, .. }
        ));
        assert_eq!(expect_connectivity(&mut rx).await, FeedEvent::Connected);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn reported_fault_drops_and_reconnects() {
        let transport = MockTransport::auto_ack();
        let (tx, mut rx) = mpsc::channel::<FeedUpdate>(32);
        let cancel = CancellationToken::new();
        let driver = FeedDriver::new(
            &alice(),
            Arc::new(transport.clone()),
            "ws://feed",
            DELAY,
            cancel.clone(),
        );
        let faults = driver.fault_reporter();
        let handle = tokio::spawn(driver.run(tx));
        expect_connectivity(&mut rx).await;

        let failed_at = Instant::now();
        faults.report("write half closed");

        assert_eq!(
            expect_connectivity(&mut rx).await,
            FeedEvent::Disconnected {
                reason: "write half closed".to_string(),
            }
        );
        assert_eq!(expect_connectivity(&mut rx).await, FeedEvent::Connected);
        assert!(failed_at.elapsed() >= DELAY);
        assert_eq!(transport.connect_count(), 2);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn fault_during_backoff_is_discarded() {
        let transport = MockTransport::auto_ack();
        let (tx, mut rx) = mpsc::channel::<FeedUpdate>(32);
        let cancel = CancellationToken::new();
        let driver = FeedDriver::new(
            &alice(),
            Arc::new(transport.clone()),
            "ws://feed",
            DELAY,
            cancel.clone(),
        );
        let faults = driver.fault_reporter();
        let handle = tokio::spawn(driver.run(tx));
        expect_connectivity(&mut rx).await;

        transport.disconnect_remote();
        assert!(matches!(
            expect_connectivity(&mut rx).await,
            FeedEvent::Disconnected { .. }
        ));
        faults.report("stale");

        assert_eq!(expect_connectivity(&mut rx).await, FeedEvent::Connected);
        tokio::time::sleep(DELAY * 3).await;
        assert_eq!(transport.connect_count(), 2);
        assert!(rx.try_recv().is_err());

        cancel.cancel();
        handle.await.unwrap();
    }

    // ===========================================
    // Shutdown
    // ===========================================

    #[tokio::test(start_paused = true)]
    async fn cancel_unsubscribes_and_closes() {
        let transport = MockTransport::auto_ack();
        let (mut rx, cancel, handle) = spawn_driver(&transport);
        expect_connectivity(&mut rx).await;

        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(
            transport.sent_client_frames().last(),
            Some(&ClientFrame::Unsubscribe { channel: channel() })
        );
        assert!(!transport.is_connected());
        assert!(matches!(
            expect_connectivity(&mut rx).await,
            FeedEvent::Disconnected { reason } if reason == LOGOUT_REASON
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_backoff_stops_retrying() {
        let transport = MockTransport::auto_ack();
        transport.fail_connects(1);
        let (mut rx, cancel, handle) = spawn_driver(&transport);

        assert!(matches!(
            expect_connectivity(&mut rx).await,
            FeedEvent::ConnectFailed { .. }
        ));
        cancel.cancel();
        handle.await.unwrap();

        tokio::time::sleep(DELAY * 2).await;
        assert_eq!(transport.connect_count(), 1);
    }

    #[tokio::test]
    async fn publish_sends_private_message_frame() {
        let transport = MockTransport::new();
        transport.connect("ws://feed").await.unwrap();

        let bob = Identity::parse("bob").unwrap();
        publish(&transport, OutgoingMessage::new(alice(), bob.clone(), "hey"))
            .await
            .unwrap();

        assert_eq!(
            transport.sent_client_frames(),
            vec![ClientFrame::publish(OutgoingMessage::new(alice(), bob, "hey"))]
        );
    }
}
