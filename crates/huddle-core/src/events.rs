use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, watch};

use crate::errors::HuddleError;

/// Lifecycle of one room membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Joining,
    Active,
    Leaving,
    Errored,
}

impl SessionState {
    /// States in which a session holds (or is acquiring) a room membership.
    pub fn is_engaged(self) -> bool {
        matches!(
            self,
            SessionState::Connecting | SessionState::Joining | SessionState::Active
        )
    }
}

/// Copy of a remote participant's state, handed to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantInfo {
    pub id: String,
    pub name: String,
    pub is_muted: bool,
    pub is_video_off: bool,
    pub has_stream: bool,
    pub consumer_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub sender_id: String,
    pub sender_name: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParticipantEvent {
    Joined(ParticipantInfo),
    Left(String), // participant id
    MediaStateChanged(ParticipantInfo),
}

/// An error surfaced to observers. Non-fatal alerts (e.g. denied camera)
/// leave the session running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionAlert {
    pub error: HuddleError,
    pub fatal: bool,
}

/// Per-kind publication endpoints for session notifications.
///
/// The session state is a `watch` value (observers always see the latest
/// state); everything else is a bounded `broadcast` so a slow observer lags
/// instead of stalling the session task.
#[derive(Clone)]
pub struct EventHub {
    state: Arc<watch::Sender<SessionState>>,
    participants: broadcast::Sender<ParticipantEvent>,
    chat: broadcast::Sender<ChatMessage>,
    alerts: broadcast::Sender<SessionAlert>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (state, _) = watch::channel(SessionState::Idle);
        Self {
            state: Arc::new(state),
            participants: broadcast::channel(capacity).0,
            chat: broadcast::channel(capacity).0,
            alerts: broadcast::channel(capacity).0,
        }
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn subscribe_participants(&self) -> broadcast::Receiver<ParticipantEvent> {
        self.participants.subscribe()
    }

    pub fn subscribe_chat(&self) -> broadcast::Receiver<ChatMessage> {
        self.chat.subscribe()
    }

    pub fn subscribe_alerts(&self) -> broadcast::Receiver<SessionAlert> {
        self.alerts.subscribe()
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub(crate) fn publish_state(&self, state: SessionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::info!("session state: {previous:?} -> {state:?}");
        }
    }

    // A send error only means nobody is subscribed right now.
    pub(crate) fn publish_participant(&self, event: ParticipantEvent) {
        let _ = self.participants.send(event);
    }

    pub(crate) fn publish_chat(&self, message: ChatMessage) {
        let _ = self.chat.send(message);
    }

    pub(crate) fn publish_alert(&self, error: HuddleError, fatal: bool) {
        let _ = self.alerts.send(SessionAlert { error, fatal });
    }
}
