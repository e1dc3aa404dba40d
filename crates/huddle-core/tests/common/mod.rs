#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use huddle_core::media::{CaptureTrack, MediaConsumer, RemoteStream};
use huddle_core::protocol::ClientMessage;
use huddle_core::{
    FrameStream, HuddleError, LocalStream, MediaDevices, SessionState, SignalingTransport,
    TrackKind,
};
use tokio::sync::{Notify, mpsc, watch};

pub const TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum OpenBehavior {
    Accept,
    RejectCredential,
    Unreachable,
}

/// In-memory signaling transport. Tests play the server side.
pub struct MemoryTransport {
    behavior: Mutex<OpenBehavior>,
    gate: Option<Arc<Notify>>,
    server: Mutex<Option<mpsc::UnboundedSender<String>>>,
    sent: Mutex<Vec<ClientMessage>>,
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
}

impl MemoryTransport {
    pub fn new() -> Arc<Self> {
        Self::build(OpenBehavior::Accept, None)
    }

    pub fn with_behavior(behavior: OpenBehavior) -> Arc<Self> {
        Self::build(behavior, None)
    }

    /// `open` blocks until the returned gate is notified.
    pub fn gated() -> (Arc<Self>, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        (Self::build(OpenBehavior::Accept, Some(gate.clone())), gate)
    }

    fn build(behavior: OpenBehavior, gate: Option<Arc<Notify>>) -> Arc<Self> {
        Arc::new(Self {
            behavior: Mutex::new(behavior),
            gate,
            server: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
            opens: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        })
    }

    /// Deliver an inbound frame on the current connection.
    pub fn push(&self, frame: serde_json::Value) {
        if let Some(tx) = self.server.lock().unwrap().as_ref() {
            tx.send(frame.to_string()).unwrap();
        }
    }

    pub fn push_raw(&self, frame: &str) {
        if let Some(tx) = self.server.lock().unwrap().as_ref() {
            tx.send(frame.to_string()).unwrap();
        }
    }

    /// Drop the server side, ending the inbound stream.
    pub fn hang_up(&self) {
        self.server.lock().unwrap().take();
    }

    pub fn sent(&self) -> Vec<ClientMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SignalingTransport for MemoryTransport {
    async fn open(&self, credential: &str) -> Result<FrameStream, HuddleError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        let behavior = *self.behavior.lock().unwrap();
        match behavior {
            OpenBehavior::RejectCredential => {
                return Err(HuddleError::AuthenticationFailed(format!(
                    "token '{credential}' rejected"
                )));
            }
            OpenBehavior::Unreachable => {
                return Err(HuddleError::ChannelUnavailable("connection refused".into()));
            }
            OpenBehavior::Accept => {}
        }

        let (tx, rx) = mpsc::unbounded_channel::<String>();
        *self.server.lock().unwrap() = Some(tx);
        let frames = futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|frame| (frame, rx))
        });
        Ok(Box::pin(frames))
    }

    async fn send(&self, frame: String) -> Result<(), HuddleError> {
        let msg: ClientMessage = serde_json::from_str(&frame).unwrap();
        self.sent.lock().unwrap().push(msg);
        Ok(())
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.server.lock().unwrap().take();
    }
}

pub struct FakeTrack {
    kind: TrackKind,
    enabled: Arc<AtomicBool>,
    stops: Arc<AtomicUsize>,
}

impl CaptureTrack for FakeTrack {
    fn kind(&self) -> TrackKind {
        self.kind
    }
    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
    fn set_enabled(&mut self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }
    fn stop(&mut self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Capture devices producing one audio and one video fake track.
pub struct FakeDevices {
    deny: bool,
    gate: Option<Arc<Notify>>,
    pub audio_enabled: Arc<AtomicBool>,
    pub video_enabled: Arc<AtomicBool>,
    pub stops: Arc<AtomicUsize>,
    pub acquisitions: AtomicUsize,
}

impl FakeDevices {
    pub fn new() -> Arc<Self> {
        Self::build(false, None)
    }

    pub fn denied() -> Arc<Self> {
        Self::build(true, None)
    }

    /// `acquire` blocks until the returned gate is notified.
    pub fn gated() -> (Arc<Self>, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        (Self::build(false, Some(gate.clone())), gate)
    }

    fn build(deny: bool, gate: Option<Arc<Notify>>) -> Arc<Self> {
        Arc::new(Self {
            deny,
            gate,
            audio_enabled: Arc::new(AtomicBool::new(true)),
            video_enabled: Arc::new(AtomicBool::new(true)),
            stops: Arc::new(AtomicUsize::new(0)),
            acquisitions: AtomicUsize::new(0),
        })
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaDevices for FakeDevices {
    async fn acquire(&self) -> Result<LocalStream, HuddleError> {
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.deny {
            return Err(HuddleError::MediaAccessDenied("no camera found".into()));
        }
        Ok(LocalStream::new(vec![
            Box::new(FakeTrack {
                kind: TrackKind::Audio,
                enabled: self.audio_enabled.clone(),
                stops: self.stops.clone(),
            }),
            Box::new(FakeTrack {
                kind: TrackKind::Video,
                enabled: self.video_enabled.clone(),
                stops: self.stops.clone(),
            }),
        ]))
    }
}

pub struct CountingConsumer(pub Arc<AtomicUsize>);

impl MediaConsumer for CountingConsumer {
    fn close(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct CountingStream(pub Arc<AtomicUsize>);

impl RemoteStream for CountingStream {
    fn set_track_enabled(&mut self, _kind: TrackKind, _enabled: bool) {}
    fn stop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

pub async fn wait_for_state(rx: &mut watch::Receiver<SessionState>, want: SessionState) {
    tokio::time::timeout(TIMEOUT, rx.wait_for(|s| *s == want))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {want:?}"))
        .expect("session task dropped its state channel");
}

/// Poll `check` until it holds or the timeout expires.
pub async fn eventually<F>(mut check: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub fn snapshot_frame(room_id: &str, self_id: &str, peers: &[(&str, &str)]) -> serde_json::Value {
    let participants: Vec<serde_json::Value> = peers
        .iter()
        .map(|(id, name)| serde_json::json!({"userId": id, "username": name}))
        .collect();
    serde_json::json!({
        "event": "joined-room",
        "data": {
            "roomId": room_id,
            "participants": participants,
            "userInfo": {"userId": self_id, "username": "Me"}
        }
    })
}
