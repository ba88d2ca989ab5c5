//! Session state machine
//!
//! Pure transition logic: consumes typed events, mutates the owned
//! [`Session`], and returns the side effects the runtime should execute.
//! No I/O happens here, which keeps every transition unit-testable.

use crate::protocol::ServerPayload;

use super::{Session, SessionStatus, Transcript};

/// Events driving the session state machine
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// User asked to start talking
    StartRequested,
    /// User asked to stop talking
    StopRequested,
    /// Capture pipeline finished tearing down
    CaptureStopped,
    /// Capture pipeline failed to start
    CaptureFailed(String),
    /// Connection established
    ConnectionUp,
    /// Connection lost; `clean` when the user disconnected deliberately
    ConnectionLost { clean: bool },
    /// Circuit breaker opened; connection attempts are suppressed
    BreakerOpen,
    /// A well-formed envelope arrived from the service
    Remote(ServerPayload),
    /// Playback reached the end of the resource
    PlaybackFinished,
    /// Playback could not fetch, decode, or play the resource
    PlaybackFailed(String),
    /// User ended the interaction; reset to a fresh session
    Reset,
    /// Stop the runtime loop
    Shutdown,
}

/// Side effects the runtime executes on behalf of the machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Acquire the microphone and begin streaming
    StartCapture,
    /// Release the microphone; a `CaptureStopped` event follows
    StopCapture,
    /// Play the synthesized reply at the given URL
    Play(String),
    /// Cancel playback and publish the closed mouth
    StopPlayback,
}

/// Owns the [`Session`] and applies every status transition
#[derive(Debug)]
pub struct SessionMachine {
    session: Session,
    connected: bool,
}

impl SessionMachine {
    /// Create a machine owning a fresh idle session
    #[must_use]
    pub fn new(owner: Option<&str>) -> Self {
        Self {
            session: Session::new(owner),
            connected: false,
        }
    }

    /// The current session
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Current status
    #[must_use]
    pub const fn status(&self) -> SessionStatus {
        self.session.status
    }

    /// Whether the machine believes the connection is up
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.connected
    }

    /// Apply one event and return the side effects to execute
    #[allow(clippy::too_many_lines)]
    pub fn handle(&mut self, event: SessionEvent) -> Vec<Action> {
        match event {
            SessionEvent::StartRequested => {
                if self.session.status == SessionStatus::Idle && self.connected {
                    self.set_status(SessionStatus::Listening);
                    self.session.transcript = None;
                    self.session.last_error = None;
                    vec![Action::StartCapture]
                } else {
                    tracing::debug!(
                        status = %self.session.status,
                        connected = self.connected,
                        "start request ignored"
                    );
                    Vec::new()
                }
            }

            SessionEvent::StopRequested => {
                if self.session.status == SessionStatus::Listening {
                    vec![Action::StopCapture]
                } else {
                    Vec::new()
                }
            }

            SessionEvent::CaptureStopped => {
                // Moves to Processing regardless of connection state
                if self.session.status == SessionStatus::Listening {
                    self.set_status(SessionStatus::Processing);
                }
                Vec::new()
            }

            SessionEvent::CaptureFailed(reason) => {
                if self.session.status == SessionStatus::Listening {
                    self.set_status(SessionStatus::Idle);
                    self.session.last_error = Some(reason);
                }
                Vec::new()
            }

            SessionEvent::ConnectionUp => {
                self.connected = true;
                Vec::new()
            }

            SessionEvent::ConnectionLost { clean } => {
                // Capture continues across unclean drops; the session only
                // moves on via user stop or a remote error
                self.connected = false;
                tracing::debug!(clean, status = %self.session.status, "connection lost");
                Vec::new()
            }

            SessionEvent::BreakerOpen => {
                self.connected = false;
                if self.session.status == SessionStatus::Idle {
                    Vec::new()
                } else {
                    tracing::warn!("abandoning session: circuit breaker open");
                    let actions = self.teardown_actions();
                    self.set_status(SessionStatus::Idle);
                    self.session.last_error =
                        Some("connection suppressed by circuit breaker".to_string());
                    actions
                }
            }

            SessionEvent::Remote(payload) => self.handle_remote(payload),

            SessionEvent::PlaybackFinished => {
                if self.session.status == SessionStatus::Speaking {
                    self.set_status(SessionStatus::Idle);
                }
                Vec::new()
            }

            SessionEvent::PlaybackFailed(reason) => {
                if self.session.status == SessionStatus::Speaking {
                    self.set_status(SessionStatus::Idle);
                    self.session.last_error = Some(reason);
                }
                Vec::new()
            }

            SessionEvent::Reset | SessionEvent::Shutdown => {
                let actions = self.teardown_actions();
                let owner = self.session.owner.clone();
                self.session = Session::new(owner.as_deref());
                actions
            }
        }
    }

    fn handle_remote(&mut self, payload: ServerPayload) -> Vec<Action> {
        match payload {
            ServerPayload::TranscriptPartial { text } => {
                // A final transcript is authoritative; late partials lose
                let superseded = self
                    .session
                    .transcript
                    .as_ref()
                    .is_some_and(|t| t.is_final);
                if !superseded {
                    self.session.transcript = Some(Transcript {
                        text,
                        confidence: None,
                        is_final: false,
                    });
                }
                Vec::new()
            }

            ServerPayload::TranscriptFinal { text, confidence } => {
                self.session.transcript = Some(Transcript {
                    text,
                    confidence: Some(confidence),
                    is_final: true,
                });
                Vec::new()
            }

            ServerPayload::AgentResponse { text, audio_url } => {
                if self.session.status != SessionStatus::Processing {
                    tracing::warn!(
                        status = %self.session.status,
                        "agent response outside processing, dropped"
                    );
                    return Vec::new();
                }

                if let Some(reply) = text {
                    tracing::info!(reply = %reply, "agent responded");
                }

                if let Some(url) = audio_url {
                    self.set_status(SessionStatus::Speaking);
                    vec![Action::Play(url)]
                } else {
                    // Text-only reply: straight back to idle
                    self.set_status(SessionStatus::Idle);
                    Vec::new()
                }
            }

            ServerPayload::Error { reason } => {
                tracing::warn!(reason = %reason, "remote error, abandoning session");
                let actions = self.teardown_actions();
                self.set_status(SessionStatus::Idle);
                self.session.last_error = Some(reason);
                actions
            }
        }
    }

    /// Actions needed to leave the current status
    fn teardown_actions(&self) -> Vec<Action> {
        match self.session.status {
            SessionStatus::Listening => vec![Action::StopCapture],
            SessionStatus::Speaking => vec![Action::StopPlayback],
            SessionStatus::Idle | SessionStatus::Processing => Vec::new(),
        }
    }

    fn set_status(&mut self, status: SessionStatus) {
        tracing::debug!(from = %self.session.status, to = %status, "session transition");
        self.session.status = status;
    }
}
