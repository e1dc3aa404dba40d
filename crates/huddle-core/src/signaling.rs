use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::errors::HuddleError;
use crate::events::{ChatMessage, ParticipantInfo};
use crate::participants::{Participant, ParticipantRegistry};
use crate::protocol::{ClientMessage, ServerMessage, validate_chat_body};

/// Inbound text frames. The stream ending means the transport is gone.
pub type FrameStream = BoxStream<'static, String>;

/// The transport under the signaling channel (WebSocket, socket.io, ...).
#[async_trait]
pub trait SignalingTransport: Send + Sync {
    /// Connect and authenticate with `credential`.
    ///
    /// Fails with `AuthenticationFailed` when the credential is rejected and
    /// `ChannelUnavailable` when the endpoint cannot be reached.
    async fn open(&self, credential: &str) -> Result<FrameStream, HuddleError>;

    async fn send(&self, frame: String) -> Result<(), HuddleError>;

    async fn close(&self);
}

/// What an inbound frame did to the registry, for the coordinator to publish.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatched {
    Snapshot {
        room_id: String,
        self_id: String,
        participants: Vec<ParticipantInfo>,
    },
    Joined(ParticipantInfo),
    Left(String),
    MediaStateChanged(ParticipantInfo),
    Chat(ChatMessage),
    ChannelError(String),
    Ignored,
}

/// One logical signaling channel to a room.
pub struct SignalingClient {
    transport: Arc<dyn SignalingTransport>,
    open: bool,
    // Identities whose departure was already applied.
    departed: HashSet<String>,
}

impl SignalingClient {
    pub fn new(transport: Arc<dyn SignalingTransport>) -> Self {
        Self {
            transport,
            open: false,
            departed: HashSet::new(),
        }
    }

    pub fn transport(&self) -> Arc<dyn SignalingTransport> {
        self.transport.clone()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Record a channel opened on this client's transport. The open itself
    /// runs outside the session task so that `leave` can interrupt it.
    pub fn mark_open(&mut self) {
        self.open = true;
        self.departed.clear();
        tracing::info!("signaling channel open");
    }

    pub async fn join_room(&self, room_id: &str) -> Result<(), HuddleError> {
        self.send(ClientMessage::JoinRoom {
            room_id: room_id.to_string(),
        })
        .await
    }

    /// Validate and send a chat body. Returns the body as sent.
    pub async fn send_chat_message(&self, body: &str) -> Result<String, HuddleError> {
        let body = validate_chat_body(body)?;
        self.send(ClientMessage::ChatMessage { message: body.clone() })
            .await?;
        Ok(body)
    }

    pub async fn send_mute_state(&self, is_muted: bool) -> Result<(), HuddleError> {
        self.send(ClientMessage::MuteToggle { is_muted }).await
    }

    pub async fn send_video_state(&self, is_video_off: bool) -> Result<(), HuddleError> {
        self.send(ClientMessage::VideoToggle { is_video_off }).await
    }

    async fn send(&self, msg: ClientMessage) -> Result<(), HuddleError> {
        if !self.open {
            return Err(HuddleError::ChannelUnavailable("channel is not open".into()));
        }
        let frame = msg.to_frame()?;
        tracing::debug!("signaling out: {frame}");
        self.transport.send(frame).await
    }

    pub async fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        self.transport.close().await;
        tracing::info!("signaling channel closed");
    }

    /// Decode one inbound frame and apply it to the registry.
    pub fn dispatch(&mut self, frame: &str, registry: &mut ParticipantRegistry) -> Dispatched {
        let msg = match ServerMessage::from_frame(frame) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!("dropping undecodable signaling frame: {e}");
                return Dispatched::Ignored;
            }
        };

        match msg {
            ServerMessage::JoinedRoom {
                room_id,
                participants,
                self_info,
            } => {
                tracing::info!(
                    "joined room {room_id} as {} with {} peers listed",
                    self_info.id,
                    participants.len()
                );
                registry.set_local_id(self_info.id.clone());
                for peer in participants {
                    self.departed.remove(&peer.id);
                    registry.upsert(Participant::new(peer.id, peer.name));
                }
                Dispatched::Snapshot {
                    room_id,
                    self_id: self_info.id,
                    participants: registry.snapshot(),
                }
            }

            ServerMessage::UserJoined(peer) => {
                self.departed.remove(&peer.id);
                let id = peer.id.clone();
                if !registry.upsert(Participant::new(peer.id, peer.name)) {
                    return Dispatched::Ignored;
                }
                tracing::info!("participant joined: {id}");
                registry
                    .participant(&id)
                    .map(Dispatched::Joined)
                    .unwrap_or(Dispatched::Ignored)
            }

            ServerMessage::UserLeft(peer) => {
                if !self.departed.insert(peer.id.clone()) {
                    tracing::debug!("duplicate leave for {}", peer.id);
                    return Dispatched::Ignored;
                }
                if registry.remove(&peer.id) {
                    tracing::info!("participant left: {}", peer.id);
                    Dispatched::Left(peer.id)
                } else {
                    Dispatched::Ignored
                }
            }

            ServerMessage::ChatMessage(chat) => Dispatched::Chat(ChatMessage {
                sender_id: chat.sender_id,
                sender_name: chat.sender_name,
                body: chat.body,
                timestamp: chat.timestamp,
            }),

            ServerMessage::UserMuteToggle { user_id, is_muted } => registry
                .apply_mute_state(&user_id, is_muted)
                .map(Dispatched::MediaStateChanged)
                .unwrap_or(Dispatched::Ignored),

            ServerMessage::UserVideoToggle {
                user_id,
                is_video_off,
            } => registry
                .apply_video_state(&user_id, is_video_off)
                .map(Dispatched::MediaStateChanged)
                .unwrap_or(Dispatched::Ignored),

            ServerMessage::Error { message } => {
                tracing::warn!("signaling error: {message}");
                Dispatched::ChannelError(message)
            }

            ServerMessage::Offer(_) | ServerMessage::Answer(_) | ServerMessage::IceCandidate(_) => {
                tracing::debug!("media negotiation frame ignored");
                Dispatched::Ignored
            }
        }
    }
}
