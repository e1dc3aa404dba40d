use thiserror::Error;

use crate::events::SessionState;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HuddleError {
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("signaling channel unavailable: {0}")]
    ChannelUnavailable(String),
    #[error("media access denied: {0}")]
    MediaAccessDenied(String),
    #[error("a session is already connected")]
    AlreadyConnected,
    #[error("cannot {action} while {from:?}")]
    InvalidStateTransition {
        from: SessionState,
        action: &'static str,
    },
    #[error("signaling channel error: {0}")]
    ChannelError(String),
    #[error("chat message rejected: {0}")]
    ChatRejected(String),
    #[error("not joined to a room")]
    NotJoined,
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("directory service returned {status}: {message}")]
    Directory { status: u16, message: String },
    #[error("cancelled by leave")]
    Cancelled,
    #[error("session task has stopped")]
    SessionClosed,
}
