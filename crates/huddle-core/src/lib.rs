//! Huddle core: the real-time session manager.
//!
//! Pure Rust crate with no platform dependencies. Host shells supply the
//! signaling transport and capture devices and observe the session
//! through per-kind event channels.

pub mod directory;
pub mod errors;
pub mod events;
pub mod logging;
pub mod media;
pub mod participants;
pub mod protocol;
pub mod session;
pub mod settings;
pub mod signaling;

pub use directory::DirectoryClient;
pub use errors::HuddleError;
pub use events::{
    ChatMessage, EventHub, ParticipantEvent, ParticipantInfo, SessionAlert, SessionState,
};
pub use media::{LocalMediaController, LocalStream, MediaDevices, TrackKind};
pub use participants::ParticipantRegistry;
pub use session::{SessionConfig, SessionHandle, SessionInfo};
pub use settings::{Settings, SettingsStore};
pub use signaling::{FrameStream, SignalingClient, SignalingTransport};
