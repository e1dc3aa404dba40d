use std::collections::HashMap;

use crate::events::ParticipantInfo;
use crate::media::{MediaConsumer, RemoteStream, TrackKind};

/// A remote peer present in the room, with the media handles it owns.
pub struct Participant {
    pub id: String,
    pub name: String,
    pub is_muted: bool,
    pub is_video_off: bool,
    stream: Option<Box<dyn RemoteStream>>,
    consumers: HashMap<String, Box<dyn MediaConsumer>>,
}

impl Participant {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_muted: false,
            is_video_off: false,
            stream: None,
            consumers: HashMap::new(),
        }
    }

    pub fn info(&self) -> ParticipantInfo {
        ParticipantInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            is_muted: self.is_muted,
            is_video_off: self.is_video_off,
            has_stream: self.stream.is_some(),
            consumer_count: self.consumers.len(),
        }
    }

    fn release(&mut self) {
        for (_, mut consumer) in self.consumers.drain() {
            consumer.close();
        }
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
        }
    }
}

impl std::fmt::Debug for Participant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Participant")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("is_muted", &self.is_muted)
            .field("is_video_off", &self.is_video_off)
            .field("consumers", &self.consumers.len())
            .finish()
    }
}

/// Remote participants of the current session, in join order.
///
/// Owned by the session task; observers only ever get copies via
/// [`ParticipantRegistry::snapshot`].
#[derive(Debug, Default)]
pub struct ParticipantRegistry {
    participants: Vec<Participant>,
    local_id: Option<String>,
}

impl ParticipantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_local_id(&mut self, id: String) {
        self.local_id = Some(id);
    }

    pub fn local_id(&self) -> Option<&str> {
        self.local_id.as_deref()
    }

    /// Insert or replace a participant by identity.
    ///
    /// The local identity is never tracked. Replacing an entry releases the
    /// handles the previous entry owned. Returns false if nothing was stored.
    pub fn upsert(&mut self, participant: Participant) -> bool {
        if self.local_id.as_deref() == Some(participant.id.as_str()) {
            return false;
        }
        match self.participants.iter_mut().find(|p| p.id == participant.id) {
            Some(existing) => {
                existing.release();
                *existing = participant;
            }
            None => self.participants.push(participant),
        }
        true
    }

    pub fn apply_mute_state(&mut self, id: &str, muted: bool) -> Option<ParticipantInfo> {
        let p = self.participant_mut(id)?;
        p.is_muted = muted;
        if let Some(stream) = p.stream.as_mut() {
            stream.set_track_enabled(TrackKind::Audio, !muted);
        }
        Some(p.info())
    }

    pub fn apply_video_state(&mut self, id: &str, off: bool) -> Option<ParticipantInfo> {
        let p = self.participant_mut(id)?;
        p.is_video_off = off;
        if let Some(stream) = p.stream.as_mut() {
            stream.set_track_enabled(TrackKind::Video, !off);
        }
        Some(p.info())
    }

    /// Release a participant's handles and drop it. Returns false if unknown.
    pub fn remove(&mut self, id: &str) -> bool {
        let Some(pos) = self.participants.iter().position(|p| p.id == id) else {
            return false;
        };
        let mut participant = self.participants.remove(pos);
        participant.release();
        true
    }

    /// Attach the inbound stream for a participant, stopping any previous one.
    pub fn attach_stream(
        &mut self,
        id: &str,
        stream: Box<dyn RemoteStream>,
    ) -> Result<(), Box<dyn RemoteStream>> {
        let Some(p) = self.participant_mut(id) else {
            return Err(stream);
        };
        if let Some(mut old) = p.stream.replace(stream) {
            old.stop();
        }
        Ok(())
    }

    /// Attach a consumer under a subscription id, closing any it replaces.
    pub fn attach_consumer(
        &mut self,
        id: &str,
        subscription_id: String,
        consumer: Box<dyn MediaConsumer>,
    ) -> Result<(), Box<dyn MediaConsumer>> {
        let Some(p) = self.participant_mut(id) else {
            return Err(consumer);
        };
        if let Some(mut old) = p.consumers.insert(subscription_id, consumer) {
            old.close();
        }
        Ok(())
    }

    pub fn participant(&self, id: &str) -> Option<ParticipantInfo> {
        self.participants.iter().find(|p| p.id == id).map(Participant::info)
    }

    fn participant_mut(&mut self, id: &str) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.participants.iter().any(|p| p.id == id)
    }

    pub fn snapshot(&self) -> Vec<ParticipantInfo> {
        self.participants.iter().map(Participant::info).collect()
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    /// Release every participant and forget the local identity.
    pub fn clear(&mut self) {
        for p in self.participants.iter_mut() {
            p.release();
        }
        self.participants.clear();
        self.local_id = None;
    }
}
