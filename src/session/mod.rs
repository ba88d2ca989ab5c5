//! Session state and its single-writer state machine
//!
//! The session is the source of truth for the user-facing status. Only
//! the state machine mutates it; every other component requests
//! transitions by pushing typed events onto the runtime's queue.

mod machine;
mod runtime;

pub use machine::{Action, SessionEvent, SessionMachine};
pub use runtime::{SessionHandle, SessionRuntime};

use uuid::Uuid;

/// User-facing interaction status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Nothing in flight
    Idle,
    /// Microphone capture streaming to the service
    Listening,
    /// Waiting for the service to respond
    Processing,
    /// Playing the synthesized reply
    Speaking,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Listening => write!(f, "listening"),
            Self::Processing => write!(f, "processing"),
            Self::Speaking => write!(f, "speaking"),
        }
    }
}

/// The most recent transcript for this session
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    /// Recognized text
    pub text: String,
    /// Recognition confidence in [0, 1]; only final transcripts carry one
    pub confidence: Option<f32>,
    /// Whether this transcript is authoritative
    pub is_final: bool,
}

/// One logical voice interaction
#[derive(Debug, Clone)]
pub struct Session {
    /// Unique session identifier
    pub id: Uuid,
    /// Opaque owner reference supplied by the embedding application
    pub owner: Option<String>,
    /// Current status; written only by the state machine
    pub status: SessionStatus,
    /// Last transcript received, partial or final
    pub transcript: Option<Transcript>,
    /// Last error surfaced to the UI, if any
    pub last_error: Option<String>,
}

impl Session {
    /// Create a fresh idle session
    #[must_use]
    pub fn new(owner: Option<&str>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner: owner.map(ToString::to_string),
            status: SessionStatus::Idle,
            transcript: None,
            last_error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_display() {
        assert_eq!(SessionStatus::Idle.to_string(), "idle");
        assert_eq!(SessionStatus::Listening.to_string(), "listening");
        assert_eq!(SessionStatus::Processing.to_string(), "processing");
        assert_eq!(SessionStatus::Speaking.to_string(), "speaking");
    }

    #[test]
    fn new_session_is_idle_and_clean() {
        let session = Session::new(Some("user-1"));
        assert_eq!(session.status, SessionStatus::Idle);
        assert_eq!(session.owner.as_deref(), Some("user-1"));
        assert!(session.transcript.is_none());
        assert!(session.last_error.is_none());
    }
}
