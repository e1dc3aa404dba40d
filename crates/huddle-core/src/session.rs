//! Session coordinator.
//!
//! One tokio task owns the signaling client, the participant registry and
//! the local media controller. Caller commands, inbound frames and the
//! completion of in-flight steps (channel open, device acquisition) are
//! serialised through a single `select!` loop, so none of the owned state
//! needs a lock. Callers talk to the task through a cloneable
//! [`SessionHandle`] and observe it through the [`EventHub`].

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle};

use crate::errors::HuddleError;
use crate::events::{EventHub, ParticipantEvent, ParticipantInfo, SessionState};
use crate::media::{
    LocalMediaController, LocalMediaState, LocalStream, MediaConsumer, MediaDevices, RemoteStream,
    TrackKind,
};
use crate::participants::ParticipantRegistry;
use crate::settings::Settings;
use crate::signaling::{Dispatched, FrameStream, SignalingClient, SignalingTransport};

const COMMAND_BUFFER: usize = 32;

/// Per-session knobs, usually derived from [`Settings`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub event_buffer: usize,
    pub mic_enabled_on_join: bool,
    pub camera_enabled_on_join: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            event_buffer: 64,
            mic_enabled_on_join: true,
            camera_enabled_on_join: true,
        }
    }
}

impl From<&Settings> for SessionConfig {
    fn from(s: &Settings) -> Self {
        Self {
            event_buffer: s.event_buffer,
            mic_enabled_on_join: s.mic_enabled_on_join,
            camera_enabled_on_join: s.camera_enabled_on_join,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub state: SessionState,
    pub room_id: Option<String>,
    pub local_id: Option<String>,
}

enum Command {
    Connect {
        credential: String,
        room_id: String,
        respond_to: oneshot::Sender<Result<(), HuddleError>>,
    },
    Leave {
        respond_to: oneshot::Sender<Result<(), HuddleError>>,
    },
    ToggleAudio {
        respond_to: oneshot::Sender<bool>,
    },
    ToggleVideo {
        respond_to: oneshot::Sender<bool>,
    },
    SendChat {
        body: String,
        respond_to: oneshot::Sender<Result<(), HuddleError>>,
    },
    Participants {
        respond_to: oneshot::Sender<Vec<ParticipantInfo>>,
    },
    LocalMedia {
        respond_to: oneshot::Sender<LocalMediaState>,
    },
    Info {
        respond_to: oneshot::Sender<SessionInfo>,
    },
    AttachStream {
        participant_id: String,
        stream: Box<dyn RemoteStream>,
        respond_to: oneshot::Sender<bool>,
    },
    AttachConsumer {
        participant_id: String,
        subscription_id: String,
        consumer: Box<dyn MediaConsumer>,
        respond_to: oneshot::Sender<bool>,
    },
}

/// Result of a step that ran outside the session task.
enum StepOutcome {
    Opened(Result<FrameStream, HuddleError>),
    Acquired(Result<LocalStream, HuddleError>),
}

enum Step {
    Command(Command),
    Frame(Option<String>),
    Outcome(Result<StepOutcome, JoinError>),
}

/// Handle to a running session. Dropping every clone ends the session.
#[derive(Clone)]
pub struct SessionHandle {
    sender: mpsc::Sender<Command>,
    events: EventHub,
}

impl SessionHandle {
    /// Start a session task. Must be called within a tokio runtime.
    pub fn spawn(
        transport: Arc<dyn SignalingTransport>,
        devices: Arc<dyn MediaDevices>,
        config: SessionConfig,
    ) -> (SessionHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(COMMAND_BUFFER);
        let events = EventHub::new(config.event_buffer);

        let actor = SessionActor {
            receiver,
            events: events.clone(),
            config,
            signaling: SignalingClient::new(transport),
            registry: ParticipantRegistry::new(),
            media: LocalMediaController::new(devices),
            state: SessionState::Idle,
            room_id: None,
            frames: None,
            pending: None,
            pending_connect: None,
            draining: None,
        };
        let task = tokio::spawn(actor.run());

        (SessionHandle { sender, events }, task)
    }

    pub fn events(&self) -> &EventHub {
        &self.events
    }

    pub fn state(&self) -> SessionState {
        self.events.state()
    }

    /// Open the signaling channel with `credential` and join `room_id`.
    ///
    /// Resolves once the join intent is sent (`Joining`); `Active` follows
    /// when the room snapshot arrives and is observable on the state channel.
    pub async fn connect(
        &self,
        credential: impl Into<String>,
        room_id: impl Into<String>,
    ) -> Result<(), HuddleError> {
        let credential = credential.into();
        let room_id = room_id.into();
        self.request(|respond_to| Command::Connect {
            credential,
            room_id,
            respond_to,
        })
        .await?
    }

    pub async fn leave(&self) -> Result<(), HuddleError> {
        self.request(|respond_to| Command::Leave { respond_to }).await?
    }

    /// Flip the microphone; returns whether audio is now enabled.
    pub async fn toggle_audio(&self) -> Result<bool, HuddleError> {
        self.request(|respond_to| Command::ToggleAudio { respond_to }).await
    }

    /// Flip the camera; returns whether video is now enabled.
    pub async fn toggle_video(&self) -> Result<bool, HuddleError> {
        self.request(|respond_to| Command::ToggleVideo { respond_to }).await
    }

    pub async fn send_chat(&self, body: impl Into<String>) -> Result<(), HuddleError> {
        let body = body.into();
        self.request(|respond_to| Command::SendChat { body, respond_to })
            .await?
    }

    pub async fn participants(&self) -> Result<Vec<ParticipantInfo>, HuddleError> {
        self.request(|respond_to| Command::Participants { respond_to })
            .await
    }

    pub async fn local_media(&self) -> Result<LocalMediaState, HuddleError> {
        self.request(|respond_to| Command::LocalMedia { respond_to }).await
    }

    pub async fn info(&self) -> Result<SessionInfo, HuddleError> {
        self.request(|respond_to| Command::Info { respond_to }).await
    }

    /// Hand a participant's inbound stream to the session. Returns false
    /// (and stops the stream) if the participant is not in the room.
    pub async fn attach_stream(
        &self,
        participant_id: impl Into<String>,
        stream: Box<dyn RemoteStream>,
    ) -> Result<bool, HuddleError> {
        let participant_id = participant_id.into();
        self.request(|respond_to| Command::AttachStream {
            participant_id,
            stream,
            respond_to,
        })
        .await
    }

    /// Hand a participant's inbound consumer to the session. Returns false
    /// (and closes the consumer) if the participant is not in the room.
    pub async fn attach_consumer(
        &self,
        participant_id: impl Into<String>,
        subscription_id: impl Into<String>,
        consumer: Box<dyn MediaConsumer>,
    ) -> Result<bool, HuddleError> {
        let participant_id = participant_id.into();
        let subscription_id = subscription_id.into();
        self.request(|respond_to| Command::AttachConsumer {
            participant_id,
            subscription_id,
            consumer,
            respond_to,
        })
        .await
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, HuddleError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(make(tx))
            .await
            .map_err(|_| HuddleError::SessionClosed)?;
        rx.await.map_err(|_| HuddleError::SessionClosed)
    }
}

struct SessionActor {
    receiver: mpsc::Receiver<Command>,
    events: EventHub,
    config: SessionConfig,
    signaling: SignalingClient,
    registry: ParticipantRegistry,
    media: LocalMediaController,
    state: SessionState,
    room_id: Option<String>,
    frames: Option<FrameStream>,
    // At most one environment step is in flight.
    pending: Option<JoinHandle<StepOutcome>>,
    pending_connect: Option<oneshot::Sender<Result<(), HuddleError>>>,
    // Disposal of a step abandoned by leave; a new open waits for it.
    draining: Option<JoinHandle<()>>,
}

impl SessionActor {
    async fn run(mut self) {
        tracing::debug!("session task started");
        loop {
            let step = tokio::select! {
                cmd = self.receiver.recv() => match cmd {
                    Some(cmd) => Step::Command(cmd),
                    None => break,
                },
                frame = next_frame(&mut self.frames) => Step::Frame(frame),
                outcome = next_outcome(&mut self.pending) => Step::Outcome(outcome),
            };

            match step {
                Step::Command(cmd) => self.handle_command(cmd).await,
                Step::Frame(Some(frame)) => self.handle_frame(&frame).await,
                Step::Frame(None) => self.handle_channel_closed().await,
                Step::Outcome(outcome) => {
                    self.pending = None;
                    self.handle_outcome(outcome).await;
                }
            }
        }

        if self.state.is_engaged() {
            self.teardown().await;
            self.set_state(SessionState::Idle);
        }
        tracing::debug!("session task stopped");
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Connect {
                credential,
                room_id,
                respond_to,
            } => {
                if let Err(e) = self.check_connect() {
                    let _ = respond_to.send(Err(e));
                    return;
                }
                self.start_connect(credential, room_id, respond_to);
            }

            Command::Leave { respond_to } => {
                let _ = respond_to.send(self.leave().await);
            }

            Command::ToggleAudio { respond_to } => {
                let enabled = match self.media.toggle_audio() {
                    Some(enabled) => {
                        self.announce(TrackKind::Audio, enabled).await;
                        enabled
                    }
                    None => self.media.audio_enabled(),
                };
                let _ = respond_to.send(enabled);
            }

            Command::ToggleVideo { respond_to } => {
                let enabled = match self.media.toggle_video() {
                    Some(enabled) => {
                        self.announce(TrackKind::Video, enabled).await;
                        enabled
                    }
                    None => self.media.video_enabled(),
                };
                let _ = respond_to.send(enabled);
            }

            Command::SendChat { body, respond_to } => {
                let result = if self.state == SessionState::Active {
                    self.signaling.send_chat_message(&body).await.map(|_| ())
                } else {
                    Err(HuddleError::NotJoined)
                };
                let _ = respond_to.send(result);
            }

            Command::Participants { respond_to } => {
                let _ = respond_to.send(self.registry.snapshot());
            }

            Command::LocalMedia { respond_to } => {
                let _ = respond_to.send(self.media.state());
            }

            Command::Info { respond_to } => {
                let _ = respond_to.send(SessionInfo {
                    state: self.state,
                    room_id: self.room_id.clone(),
                    local_id: self.registry.local_id().map(str::to_string),
                });
            }

            Command::AttachStream {
                participant_id,
                stream,
                respond_to,
            } => {
                let attached = match self.registry.attach_stream(&participant_id, stream) {
                    Ok(()) => {
                        self.publish_media_state(&participant_id);
                        true
                    }
                    Err(mut stream) => {
                        stream.stop();
                        false
                    }
                };
                let _ = respond_to.send(attached);
            }

            Command::AttachConsumer {
                participant_id,
                subscription_id,
                consumer,
                respond_to,
            } => {
                let attached =
                    match self
                        .registry
                        .attach_consumer(&participant_id, subscription_id, consumer)
                    {
                        Ok(()) => {
                            self.publish_media_state(&participant_id);
                            true
                        }
                        Err(mut consumer) => {
                            consumer.close();
                            false
                        }
                    };
                let _ = respond_to.send(attached);
            }
        }
    }

    fn check_connect(&self) -> Result<(), HuddleError> {
        match self.state {
            SessionState::Idle => Ok(()),
            s if s.is_engaged() => Err(HuddleError::AlreadyConnected),
            from => Err(HuddleError::InvalidStateTransition {
                from,
                action: "connect",
            }),
        }
    }

    fn start_connect(
        &mut self,
        credential: String,
        room_id: String,
        respond_to: oneshot::Sender<Result<(), HuddleError>>,
    ) {
        tracing::info!("connecting to room {room_id}");
        self.room_id = Some(room_id);
        self.set_state(SessionState::Connecting);

        let transport = self.signaling.transport();
        let draining = self.draining.take();
        self.pending = Some(tokio::spawn(async move {
            if let Some(draining) = draining {
                let _ = draining.await;
            }
            StepOutcome::Opened(transport.open(&credential).await)
        }));
        self.pending_connect = Some(respond_to);
    }

    async fn leave(&mut self) -> Result<(), HuddleError> {
        if !self.state.is_engaged() {
            return Err(HuddleError::InvalidStateTransition {
                from: self.state,
                action: "leave",
            });
        }
        self.set_state(SessionState::Leaving);
        self.teardown().await;
        self.set_state(SessionState::Idle);
        Ok(())
    }

    /// Release everything the session holds. A step still in flight runs to
    /// completion in the background and whatever it produced is disposed of.
    async fn teardown(&mut self) {
        if let Some(step) = self.pending.take() {
            let transport = self.signaling.transport();
            self.draining = Some(tokio::spawn(async move {
                match step.await {
                    Ok(StepOutcome::Opened(Ok(_frames))) => {
                        tracing::debug!("closing channel opened after teardown");
                        transport.close().await;
                    }
                    Ok(StepOutcome::Acquired(Ok(mut stream))) => {
                        tracing::debug!("stopping stream acquired after teardown");
                        stream.stop();
                    }
                    _ => {}
                }
            }));
        }
        if let Some(respond_to) = self.pending_connect.take() {
            let _ = respond_to.send(Err(HuddleError::Cancelled));
        }

        self.media.release();
        self.frames = None;
        self.signaling.close().await;
        for p in self.registry.snapshot() {
            self.events.publish_participant(ParticipantEvent::Left(p.id));
        }
        self.registry.clear();
        self.room_id = None;
    }

    async fn fail(&mut self, error: HuddleError) {
        tracing::error!("session failed: {error}");
        self.teardown().await;
        self.set_state(SessionState::Errored);
        self.events.publish_alert(error, true);
    }

    async fn handle_outcome(&mut self, outcome: Result<StepOutcome, JoinError>) {
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) if self.state == SessionState::Connecting => {
                StepOutcome::Opened(Err(HuddleError::ChannelUnavailable(e.to_string())))
            }
            Err(e) => StepOutcome::Acquired(Err(HuddleError::MediaAccessDenied(e.to_string()))),
        };

        match outcome {
            StepOutcome::Opened(Ok(frames)) => {
                self.signaling.mark_open();
                self.frames = Some(frames);
                self.set_state(SessionState::Joining);

                let room_id = self.room_id.clone().unwrap_or_default();
                let result = self.signaling.join_room(&room_id).await;
                if let Some(respond_to) = self.pending_connect.take() {
                    let _ = respond_to.send(result.clone());
                }
                if let Err(e) = result {
                    self.fail(e).await;
                }
            }

            StepOutcome::Opened(Err(e)) => {
                if let Some(respond_to) = self.pending_connect.take() {
                    let _ = respond_to.send(Err(e.clone()));
                }
                self.fail(e).await;
            }

            StepOutcome::Acquired(result) => match self.media.install(result) {
                Ok(_) => self.apply_join_preferences().await,
                Err(e) => self.events.publish_alert(e, false),
            },
        }
    }

    async fn apply_join_preferences(&mut self) {
        if !self.config.mic_enabled_on_join
            && self.media.set_enabled(TrackKind::Audio, false).is_some()
        {
            self.announce(TrackKind::Audio, false).await;
        }
        if !self.config.camera_enabled_on_join
            && self.media.set_enabled(TrackKind::Video, false).is_some()
        {
            self.announce(TrackKind::Video, false).await;
        }
    }

    // Fire-and-forget: a failed notification is logged, never surfaced.
    async fn announce(&mut self, kind: TrackKind, enabled: bool) {
        let result = match kind {
            TrackKind::Audio => self.signaling.send_mute_state(!enabled).await,
            TrackKind::Video => self.signaling.send_video_state(!enabled).await,
        };
        if let Err(e) = result {
            tracing::warn!("could not announce {kind:?} state: {e}");
        }
    }

    async fn handle_frame(&mut self, frame: &str) {
        match self.signaling.dispatch(frame, &mut self.registry) {
            Dispatched::Snapshot {
                room_id,
                participants,
                ..
            } => {
                for info in participants {
                    self.events.publish_participant(ParticipantEvent::Joined(info));
                }
                if self.state == SessionState::Joining {
                    self.room_id = Some(room_id);
                    self.set_state(SessionState::Active);
                    self.start_acquire();
                } else {
                    tracing::debug!("room snapshot outside of join ({:?})", self.state);
                }
            }
            Dispatched::Joined(info) => {
                self.events.publish_participant(ParticipantEvent::Joined(info));
            }
            Dispatched::Left(id) => {
                self.events.publish_participant(ParticipantEvent::Left(id));
            }
            Dispatched::MediaStateChanged(info) => {
                self.events
                    .publish_participant(ParticipantEvent::MediaStateChanged(info));
            }
            Dispatched::Chat(msg) => self.events.publish_chat(msg),
            Dispatched::ChannelError(message) => {
                self.events
                    .publish_alert(HuddleError::ChannelError(message), false);
            }
            Dispatched::Ignored => {}
        }
    }

    fn start_acquire(&mut self) {
        let devices = self.media.devices();
        self.pending = Some(tokio::spawn(async move {
            StepOutcome::Acquired(devices.acquire().await)
        }));
    }

    async fn handle_channel_closed(&mut self) {
        self.frames = None;
        if self.state.is_engaged() {
            self.fail(HuddleError::ChannelError("signaling channel closed".into()))
                .await;
        }
    }

    fn publish_media_state(&self, participant_id: &str) {
        if let Some(info) = self.registry.participant(participant_id) {
            self.events
                .publish_participant(ParticipantEvent::MediaStateChanged(info));
        }
    }

    fn set_state(&mut self, state: SessionState) {
        self.state = state;
        self.events.publish_state(state);
    }
}

async fn next_frame(frames: &mut Option<FrameStream>) -> Option<String> {
    match frames {
        Some(frames) => frames.next().await,
        None => std::future::pending().await,
    }
}

async fn next_outcome(
    pending: &mut Option<JoinHandle<StepOutcome>>,
) -> Result<StepOutcome, JoinError> {
    match pending {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_follows_settings() {
        let settings = Settings {
            mic_enabled_on_join: false,
            event_buffer: 8,
            ..Settings::default()
        };
        let config = SessionConfig::from(&settings);
        assert_eq!(config.event_buffer, 8);
        assert!(!config.mic_enabled_on_join);
        assert!(config.camera_enabled_on_join);
    }

    #[test]
    fn default_config_enables_media() {
        let config = SessionConfig::default();
        assert!(config.mic_enabled_on_join);
        assert!(config.camera_enabled_on_join);
        assert_eq!(config.event_buffer, 64);
    }
}
