//! Live feed connection state machine.
//!
//! This module provides a pure, side-effect-free state machine for the live
//! feed's lifecycle. The state machine takes events as input and produces a
//! new state plus a list of actions to execute.
//!
//! The actual I/O (opening the socket, subscribing, sleeping between retries)
//! is performed by chat-client, not by this module.
//!
//! ```text
//! Disconnected ──ConnectRequested──► Connecting{Opening}
//!                                       │ TransportOpened
//!                                       ▼
//!                                  Connecting{Subscribing} ──SubscribeAcked──► Connected
//!                                       │ TransportFailed                         │ TransportFailed
//!                                       ▼                                         │
//!                                  Connecting{Backoff} ◄──────────────────────────┘
//!                                       │ ReconnectTimer
//!                                       └──────────► Connecting{Opening}
//! ```
//!
//! Retries are unbounded and use a fixed delay chosen by the caller.
//! `LogoutRequested` returns to `Disconnected` from anywhere.

use chat_types::Message;

/// Disconnect reason reported when the session logs out.
pub const LOGOUT_REASON: &str = "logout";

/// Where a `Connecting` session is in its attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStage {
    /// Waiting for the reconnect timer.
    Backoff,
    /// Transport open in progress.
    Opening,
    /// Transport open, waiting for the subscription acknowledgement.
    Subscribing,
}

/// Connection state machine - NO I/O, just state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport and no subscription.
    Disconnected,
    /// Working towards a subscription.
    Connecting {
        /// Number of failed attempts since the last good subscription.
        attempt: u32,
        /// Progress within the current attempt.
        stage: ConnectStage,
    },
    /// Subscribed to the private channel; events flow.
    Connected,
}

impl ConnectionState {
    /// Create a new state machine in the Disconnected state.
    pub fn new() -> Self {
        Self::Disconnected
    }

    /// Process an event and return the new state plus actions to execute.
    ///
    /// This is a pure function - no side effects. The caller (chat-client)
    /// is responsible for executing the returned actions.
    pub fn on_event(self, event: Event) -> (Self, Vec<Action>) {
        match (self, event) {
            // From Disconnected
            (Self::Disconnected, Event::ConnectRequested) => (
                Self::Connecting {
                    attempt: 0,
                    stage: ConnectStage::Opening,
                },
                vec![Action::OpenTransport],
            ),

            // From Connecting
            (
                Self::Connecting {
                    attempt,
                    stage: ConnectStage::Opening,
                },
                Event::TransportOpened,
            ) => (
                Self::Connecting {
                    attempt,
                    stage: ConnectStage::Subscribing,
                },
                vec![Action::Subscribe],
            ),
            (
                Self::Connecting {
                    stage: ConnectStage::Subscribing,
                    ..
                },
                Event::SubscribeAcked,
            ) => (
                Self::Connected,
                vec![Action::EmitEvent(FeedEvent::Connected)],
            ),
            (
                Self::Connecting {
                    attempt,
                    stage: ConnectStage::Opening | ConnectStage::Subscribing,
                },
                Event::TransportFailed { error },
            ) => {
                let next_attempt = attempt.saturating_add(1);
                (
                    Self::Connecting {
                        attempt: next_attempt,
                        stage: ConnectStage::Backoff,
                    },
                    vec![
                        Action::CloseTransport,
                        Action::EmitEvent(FeedEvent::ConnectFailed {
                            attempt: next_attempt,
                            error,
                        }),
                        Action::StartReconnectTimer {
                            attempt: next_attempt,
                        },
                    ],
                )
            }
            (
                Self::Connecting {
                    attempt,
                    stage: ConnectStage::Backoff,
                },
                Event::ReconnectTimer,
            ) => (
                Self::Connecting {
                    attempt,
                    stage: ConnectStage::Opening,
                },
                vec![Action::OpenTransport],
            ),

            // From Connected
            (Self::Connected, Event::MessageReceived { message }) => {
                (Self::Connected, vec![Action::Deliver { message }])
            }
            (Self::Connected, Event::TransportFailed { error }) => (
                Self::Connecting {
                    attempt: 1,
                    stage: ConnectStage::Backoff,
                },
                vec![
                    Action::CloseTransport,
                    Action::EmitEvent(FeedEvent::Disconnected { reason: error }),
                    Action::StartReconnectTimer { attempt: 1 },
                ],
            ),

            // Logout, from anywhere
            (Self::Connected, Event::LogoutRequested) => (
                Self::Disconnected,
                vec![
                    Action::Unsubscribe,
                    Action::CloseTransport,
                    Action::EmitEvent(FeedEvent::Disconnected {
                        reason: LOGOUT_REASON.into(),
                    }),
                ],
            ),
            (Self::Connecting { stage, .. }, Event::LogoutRequested) => {
                let mut actions = Vec::new();
                match stage {
                    ConnectStage::Backoff => actions.push(Action::CancelReconnect),
                    ConnectStage::Subscribing => {
                        actions.push(Action::Unsubscribe);
                        actions.push(Action::CloseTransport);
                    }
                    ConnectStage::Opening => actions.push(Action::CloseTransport),
                }
                (Self::Disconnected, actions)
            }

            // Invalid transitions - stay in current state
            (state, _) => (state, vec![]),
        }
    }

    /// Check if currently connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if currently trying to connect.
    pub fn is_connecting(&self) -> bool {
        matches!(self, Self::Connecting { .. })
    }

    /// Whether the driver should be reading frames from the transport.
    pub fn is_listening(&self) -> bool {
        matches!(
            self,
            Self::Connected
                | Self::Connecting {
                    stage: ConnectStage::Subscribing,
                    ..
                }
        )
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Events that can occur in the feed lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Session started; bring the feed up.
    ConnectRequested,
    /// Transport connection succeeded.
    TransportOpened,
    /// Server acknowledged the private-channel subscription.
    SubscribeAcked,
    /// Transport failed to open, or an open transport broke.
    TransportFailed {
        /// Error message describing the failure.
        error: String,
    },
    /// Reconnect timer fired.
    ReconnectTimer,
    /// A decoded message arrived on the private channel.
    MessageReceived {
        /// The received message.
        message: Message,
    },
    /// User signed out.
    LogoutRequested,
}

/// Actions to be executed by chat-client.
///
/// These are instructions, not side effects. chat-client interprets these
/// and performs the actual I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Open the transport.
    OpenTransport,
    /// Send the subscribe frame for the identity's channel.
    Subscribe,
    /// Send the unsubscribe frame.
    Unsubscribe,
    /// Close the transport.
    CloseTransport,
    /// Hand a message to the session pipeline.
    Deliver {
        /// The message to deliver.
        message: Message,
    },
    /// Start the fixed-delay reconnect timer.
    StartReconnectTimer {
        /// Which attempt the timer leads to.
        attempt: u32,
    },
    /// Cancel any pending reconnect timer.
    CancelReconnect,
    /// Emit an event to the session.
    EmitEvent(FeedEvent),
}

/// Connectivity events emitted to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    /// Subscribed; the connectivity flag turns on.
    Connected,
    /// A working subscription was lost (or the session logged out).
    Disconnected {
        /// Reason for disconnection.
        reason: String,
    },
    /// A connection attempt failed.
    ConnectFailed {
        /// Which attempt this was.
        attempt: u32,
        /// Error message describing the failure.
        error: String,
    },
}
