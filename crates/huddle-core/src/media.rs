use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::HuddleError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// One local capture track (microphone or camera) provided by the host.
pub trait CaptureTrack: Send {
    fn kind(&self) -> TrackKind;
    fn is_enabled(&self) -> bool;
    fn set_enabled(&mut self, enabled: bool);
    /// Stop capturing. The track is unusable afterwards.
    fn stop(&mut self);
}

/// Capture device access, implemented by the host platform.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Capture one audio and one video track.
    ///
    /// Fails with `MediaAccessDenied` when permission is refused or no
    /// device is available.
    async fn acquire(&self) -> Result<LocalStream, HuddleError>;
}

/// A remote participant's inbound stream, attached by the media routing layer.
pub trait RemoteStream: Send {
    fn set_track_enabled(&mut self, kind: TrackKind, enabled: bool);
    fn stop(&mut self);
}

/// An inbound media consumer owned by a participant.
pub trait MediaConsumer: Send {
    fn close(&mut self);
}

/// The local capture stream: a set of tracks under one handle id.
pub struct LocalStream {
    id: String,
    tracks: Vec<Box<dyn CaptureTrack>>,
}

impl LocalStream {
    pub fn new(tracks: Vec<Box<dyn CaptureTrack>>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tracks,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn track_mut(&mut self, kind: TrackKind) -> Option<&mut Box<dyn CaptureTrack>> {
        self.tracks.iter_mut().find(|t| t.kind() == kind)
    }

    fn track_enabled(&self, kind: TrackKind) -> Option<bool> {
        self.tracks
            .iter()
            .find(|t| t.kind() == kind)
            .map(|t| t.is_enabled())
    }

    pub fn stop(&mut self) {
        for track in self.tracks.iter_mut() {
            track.stop();
        }
        self.tracks.clear();
    }
}

impl std::fmt::Debug for LocalStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStream")
            .field("id", &self.id)
            .field("tracks", &self.tracks.len())
            .finish()
    }
}

/// Copy of the local media state for observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalMediaState {
    pub stream_id: Option<String>,
    pub audio_enabled: bool,
    pub video_enabled: bool,
}

/// Owns the local capture stream and its enabled flags.
///
/// Toggling flips the live track rather than re-acquiring the stream, so
/// the existing media path is never interrupted.
pub struct LocalMediaController {
    devices: Arc<dyn MediaDevices>,
    stream: Option<LocalStream>,
    audio_enabled: bool,
    video_enabled: bool,
}

impl LocalMediaController {
    pub fn new(devices: Arc<dyn MediaDevices>) -> Self {
        Self {
            devices,
            stream: None,
            audio_enabled: true,
            video_enabled: true,
        }
    }

    pub fn devices(&self) -> Arc<dyn MediaDevices> {
        self.devices.clone()
    }

    /// Take ownership of the outcome of a device acquisition and return the
    /// stream's handle id. Any previously installed stream is stopped.
    pub fn install(
        &mut self,
        result: Result<LocalStream, HuddleError>,
    ) -> Result<String, HuddleError> {
        let stream = match result {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!("local media unavailable: {e}");
                return Err(e);
            }
        };
        self.release();

        self.audio_enabled = stream.track_enabled(TrackKind::Audio).unwrap_or(true);
        self.video_enabled = stream.track_enabled(TrackKind::Video).unwrap_or(true);
        let id = stream.id().to_string();
        tracing::info!("local stream acquired: {id}");
        self.stream = Some(stream);
        Ok(id)
    }

    /// Flip the microphone track. `None` when there is no audio track.
    pub fn toggle_audio(&mut self) -> Option<bool> {
        self.set_enabled(TrackKind::Audio, !self.audio_enabled)
    }

    /// Flip the camera track. `None` when there is no video track.
    pub fn toggle_video(&mut self) -> Option<bool> {
        self.set_enabled(TrackKind::Video, !self.video_enabled)
    }

    pub fn set_enabled(&mut self, kind: TrackKind, enabled: bool) -> Option<bool> {
        let track = self.stream.as_mut()?.track_mut(kind)?;
        track.set_enabled(enabled);
        match kind {
            TrackKind::Audio => self.audio_enabled = enabled,
            TrackKind::Video => self.video_enabled = enabled,
        }
        tracing::info!("local {kind:?} enabled: {enabled}");
        Some(enabled)
    }

    /// Stop every local track and drop the stream. Safe to call repeatedly.
    pub fn release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            tracing::info!("local stream released: {}", stream.id());
        }
        self.audio_enabled = true;
        self.video_enabled = true;
    }

    pub fn has_stream(&self) -> bool {
        self.stream.is_some()
    }

    pub fn audio_enabled(&self) -> bool {
        self.audio_enabled
    }

    pub fn video_enabled(&self) -> bool {
        self.video_enabled
    }

    pub fn state(&self) -> LocalMediaState {
        LocalMediaState {
            stream_id: self.stream.as_ref().map(|s| s.id().to_string()),
            audio_enabled: self.audio_enabled,
            video_enabled: self.video_enabled,
        }
    }
}
