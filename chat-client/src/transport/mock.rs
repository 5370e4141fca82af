//! Mock transport for testing.
//!
//! Allows queueing server frames, capturing sent frames for verification and
//! simulating a dropped connection.

use super::{FeedTransport, TransportError};
use async_trait::async_trait;
use chat_types::{ClientFrame, ServerFrame};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

/// Mock transport for testing.
///
/// Clones share state, so a test keeps one handle while the session drives
/// the other. `recv()` waits while the queue is empty, like a real socket.
#[derive(Debug, Default, Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
    wake: Arc<Notify>,
}

#[derive(Debug, Default)]
struct MockTransportInner {
    connected: bool,
    connected_address: Option<String>,
    connect_count: usize,
    sent_frames: Vec<String>,
    receive_queue: VecDeque<String>,
    auto_ack: bool,
    fail_connects: usize,
    fail_next_send: Option<String>,
    fail_next_recv: Option<String>,
}

impl MockTransport {
    /// Create a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock that answers every subscribe frame with `subscribed`,
    /// as the feed server does.
    pub fn auto_ack() -> Self {
        let transport = Self::new();
        transport.lock().auto_ack = true;
        transport
    }

    fn lock(&self) -> MutexGuard<'_, MockTransportInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue a frame to be returned by a later `recv()` call.
    pub fn queue_response(&self, frame: impl Into<String>) {
        self.lock().receive_queue.push_back(frame.into());
        self.wake.notify_waiters();
    }

    /// Queue a server frame.
    pub fn queue_frame(&self, frame: &ServerFrame) {
        match frame.to_text() {
            Ok(text) => self.queue_response(text),
            Err(e) => tracing::warn!("mock could not encode {:?}: {}", frame, e),
        }
    }

    /// Get all frames that were sent.
    pub fn sent_frames(&self) -> Vec<String> {
        self.lock().sent_frames.clone()
    }

    /// Sent frames that decode as client frames.
    pub fn sent_client_frames(&self) -> Vec<ClientFrame> {
        self.lock()
            .sent_frames
            .iter()
            .filter_map(|text| ClientFrame::from_text(text).ok())
            .collect()
    }

    /// Get the last frame that was sent.
    pub fn last_sent(&self) -> Option<String> {
        self.lock().sent_frames.last().cloned()
    }

    /// Get the address that was connected to.
    pub fn connected_address(&self) -> Option<String> {
        self.lock().connected_address.clone()
    }

    /// How many times `connect()` has been called.
    pub fn connect_count(&self) -> usize {
        self.lock().connect_count
    }

    /// Cause the next `count` connect() calls to fail.
    pub fn fail_connects(&self, count: usize) {
        self.lock().fail_connects = count;
    }

    /// Cause the next send() to fail with the given error.
    pub fn fail_next_send(&self, error: &str) {
        self.lock().fail_next_send = Some(error.to_string());
    }

    /// Cause the next recv() to fail with the given error.
    pub fn fail_next_recv(&self, error: &str) {
        self.lock().fail_next_recv = Some(error.to_string());
        self.wake.notify_waiters();
    }

    /// Simulate the server dropping the connection.
    ///
    /// Any pending `recv()` fails, and frames still queued are discarded.
    pub fn disconnect_remote(&self) {
        {
            let mut inner = self.lock();
            inner.connected = false;
            inner.receive_queue.clear();
        }
        self.wake.notify_waiters();
    }
}

#[async_trait]
impl FeedTransport for MockTransport {
    async fn connect(&self, address: &str) -> Result<(), TransportError> {
        let mut inner = self.lock();
        inner.connect_count += 1;

        // Check for forced failure
        if inner.fail_connects > 0 {
            inner.fail_connects -= 1;
            return Err(TransportError::ConnectionFailed("refused".into()));
        }

        inner.connected = true;
        inner.connected_address = Some(address.to_string());
        Ok(())
    }

    async fn send(&self, frame: &str) -> Result<(), TransportError> {
        let acked = {
            let mut inner = self.lock();

            if !inner.connected {
                return Err(TransportError::NotConnected);
            }

            // Check for forced failure
            if let Some(error) = inner.fail_next_send.take() {
                return Err(TransportError::SendFailed(error));
            }

            inner.sent_frames.push(frame.to_string());

            let ack = match ClientFrame::from_text(frame) {
                Ok(ClientFrame::Subscribe { channel }) if inner.auto_ack => {
                    ServerFrame::Subscribed { channel }.to_text().ok()
                }
                _ => None,
            };
            if let Some(ack) = &ack {
                inner.receive_queue.push_back(ack.clone());
            }
            ack.is_some()
        };
        if acked {
            self.wake.notify_waiters();
        }
        Ok(())
    }

    async fn recv(&self) -> Result<String, TransportError> {
        loop {
            let woken = self.wake.notified();
            {
                let mut inner = self.lock();

                if !inner.connected {
                    return Err(TransportError::ConnectionClosed);
                }

                // Check for forced failure
                if let Some(error) = inner.fail_next_recv.take() {
                    return Err(TransportError::ReceiveFailed(error));
                }

                if let Some(frame) = inner.receive_queue.pop_front() {
                    return Ok(frame);
                }
            }
            woken.await;
        }
    }

    fn is_connected(&self) -> bool {
        self.lock().connected
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.lock().connected = false;
        self.wake.notify_waiters();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_types::{Channel, Identity};
    use std::time::Duration;

    // ===========================================
    // MockTransport Basic Tests
    // ===========================================

    #[tokio::test]
    async fn mock_transport_connects() {
        let transport = MockTransport::new();
        assert!(!transport.is_connected());

        transport.connect("ws://feed").await.unwrap();

        assert!(transport.is_connected());
        assert_eq!(transport.connected_address(), Some("ws://feed".to_string()));
        assert_eq!(transport.connect_count(), 1);
    }

    #[tokio::test]
    async fn mock_transport_sends_frames() {
        let transport = MockTransport::new();
        transport.connect("ws://feed").await.unwrap();

        transport.send("frame 1").await.unwrap();
        transport.send("frame 2").await.unwrap();

        assert_eq!(transport.sent_frames(), vec!["frame 1", "frame 2"]);
        assert_eq!(transport.last_sent(), Some("frame 2".to_string()));
    }

    #[tokio::test]
    async fn mock_transport_receives_queued_frames() {
        let transport = MockTransport::new();
        transport.connect("ws://feed").await.unwrap();

        transport.queue_response("one");
        transport.queue_response("two");

        assert_eq!(transport.recv().await.unwrap(), "one");
        assert_eq!(transport.recv().await.unwrap(), "two");
    }

    #[tokio::test]
    async fn recv_waits_for_a_frame() {
        let transport = MockTransport::new();
        transport.connect("ws://feed").await.unwrap();

        let reader = transport.clone();
        let pending = tokio::spawn(async move { reader.recv().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!pending.is_finished());

        transport.queue_response("late");
        assert_eq!(pending.await.unwrap().unwrap(), "late");
    }

    // ===========================================
    // Failure Tests
    // ===========================================

    #[tokio::test]
    async fn send_requires_connection() {
        let transport = MockTransport::new();
        assert!(matches!(
            transport.send("x").await,
            Err(TransportError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn fail_connects_counts_down() {
        let transport = MockTransport::new();
        transport.fail_connects(2);

        assert!(transport.connect("ws://feed").await.is_err());
        assert!(transport.connect("ws://feed").await.is_err());
        assert!(transport.connect("ws://feed").await.is_ok());
        assert_eq!(transport.connect_count(), 3);
    }

    #[tokio::test]
    async fn fail_next_send_once() {
        let transport = MockTransport::new();
        transport.connect("ws://feed").await.unwrap();
        transport.fail_next_send("boom");

        assert!(matches!(
            transport.send("x").await,
            Err(TransportError::SendFailed(_))
        ));
        assert!(transport.send("x").await.is_ok());
    }

    #[tokio::test]
    async fn disconnect_remote_wakes_reader() {
        let transport = MockTransport::new();
        transport.connect("ws://feed").await.unwrap();

        let reader = transport.clone();
        let pending = tokio::spawn(async move { reader.recv().await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        transport.disconnect_remote();
        assert!(matches!(
            pending.await.unwrap(),
            Err(TransportError::ConnectionClosed)
        ));
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn auto_ack_answers_subscribe() {
        let transport = MockTransport::auto_ack();
        transport.connect("ws://feed").await.unwrap();

        let channel = Channel::for_identity(&Identity::parse("alice").unwrap());
        let subscribe = ClientFrame::Subscribe {
            channel: channel.clone(),
        };
        transport.send(&subscribe.to_text().unwrap()).await.unwrap();

        let reply = ServerFrame::from_text(&transport.recv().await.unwrap()).unwrap();
        assert_eq!(reply, ServerFrame::Subscribed { channel });
        assert_eq!(transport.sent_client_frames(), vec![subscribe]);
    }
}
