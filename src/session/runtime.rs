//! Session runtime
//!
//! Single-consumer event loop binding the state machine to the pipelines.
//! UI commands, connection events, the chunk cadence, and the animation
//! tick all interleave here, so every status mutation flows through one
//! task and the single-writer invariant holds by construction.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use crate::audio::{AudioSource, CapturePipeline, PlaybackPipeline};
use crate::avatar::LipSyncFrame;
use crate::config::Config;
use crate::connection::{ConnectionEvent, ConnectionManager};

use super::machine::{Action, SessionEvent, SessionMachine};
use super::Session;

/// Command queue depth for UI handles
const COMMAND_BUFFER: usize = 32;

/// Cloneable handle the UI layer uses to request transitions
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionEvent>,
}

impl SessionHandle {
    /// Request capture start
    pub async fn start(&self) {
        let _ = self.tx.send(SessionEvent::StartRequested).await;
    }

    /// Request capture stop
    pub async fn stop(&self) {
        let _ = self.tx.send(SessionEvent::StopRequested).await;
    }

    /// End the interaction and reset to a fresh session
    pub async fn reset(&self) {
        let _ = self.tx.send(SessionEvent::Reset).await;
    }

    /// Stop the runtime loop
    pub async fn shutdown(&self) {
        let _ = self.tx.send(SessionEvent::Shutdown).await;
    }
}

/// Drives the session state machine and executes its actions
pub struct SessionRuntime {
    machine: SessionMachine,
    connection: Arc<ConnectionManager>,
    capture: CapturePipeline,
    playback: PlaybackPipeline,
    commands_rx: mpsc::Receiver<SessionEvent>,
    connection_rx: mpsc::Receiver<ConnectionEvent>,
    session_tx: watch::Sender<Session>,
    chunk_interval: Duration,
    frame_interval: Duration,
}

impl SessionRuntime {
    /// Wire a runtime to the connection manager's event queue.
    ///
    /// Returns the runtime, the UI command handle, and a watch channel
    /// publishing session snapshots after every transition.
    #[must_use]
    pub fn new(
        config: &Config,
        owner: Option<&str>,
        connection: Arc<ConnectionManager>,
        connection_rx: mpsc::Receiver<ConnectionEvent>,
    ) -> (Self, SessionHandle, watch::Receiver<Session>) {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let machine = SessionMachine::new(owner);
        let (session_tx, session_rx) = watch::channel(machine.session().clone());

        let frame_interval = Duration::from_millis(1000 / u64::from(config.frame_rate.max(1)));

        let runtime = Self {
            machine,
            connection,
            capture: CapturePipeline::new(),
            playback: PlaybackPipeline::new(config.silence_threshold),
            commands_rx,
            connection_rx,
            session_tx,
            chunk_interval: config.chunk_interval,
            frame_interval,
        };

        (runtime, SessionHandle { tx: commands_tx }, session_rx)
    }

    /// Subscribe to lip-sync frames for the avatar renderer
    #[must_use]
    pub fn lipsync_frames(&self) -> watch::Receiver<LipSyncFrame> {
        self.playback.frames()
    }

    /// Subscribe to the live input level for UI meters
    #[must_use]
    pub fn input_level(&self) -> watch::Receiver<f32> {
        self.capture.level()
    }

    /// Run until shutdown is requested.
    ///
    /// Holds the audio device handles, so it runs on the caller's task
    /// rather than a spawned one.
    #[allow(clippy::future_not_send)]
    pub async fn run(mut self) {
        let mut chunk_timer = tokio::time::interval(self.chunk_interval);
        chunk_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut frame_timer = tokio::time::interval(self.frame_interval);
        frame_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tracing::info!(session_id = %self.machine.session().id, "session runtime started");

        loop {
            tokio::select! {
                Some(event) = self.commands_rx.recv() => {
                    let shutdown = matches!(event, SessionEvent::Shutdown);
                    self.process(event).await;
                    if shutdown {
                        break;
                    }
                }
                Some(event) = self.connection_rx.recv() => {
                    self.process(map_connection_event(event)).await;
                }
                _ = chunk_timer.tick(), if self.capture.is_capturing() => {
                    self.capture.tick(&self.connection).await;
                }
                _ = frame_timer.tick(), if self.playback.is_playing() => {
                    if self.playback.tick() {
                        self.process(SessionEvent::PlaybackFinished).await;
                    }
                }
                else => break,
            }
        }

        self.connection.disconnect().await;
        tracing::info!("session runtime stopped");
    }

    /// Apply an event plus any follow-up events its actions produce
    async fn process(&mut self, event: SessionEvent) {
        let mut queue = VecDeque::from([event]);

        while let Some(event) = queue.pop_front() {
            let actions = self.machine.handle(event);

            for action in actions {
                match action {
                    Action::StartCapture => {
                        if let Err(e) = self.capture.start(&self.connection).await {
                            tracing::warn!(error = %e, "capture did not start");
                            queue.push_back(SessionEvent::CaptureFailed(e.to_string()));
                        }
                    }
                    Action::StopCapture => {
                        self.capture.stop(&self.connection).await;
                        queue.push_back(SessionEvent::CaptureStopped);
                    }
                    Action::Play(url) => {
                        if let Err(e) = self.playback.play(AudioSource::Url(url)).await {
                            tracing::warn!(error = %e, "playback did not start");
                            queue.push_back(SessionEvent::PlaybackFailed(e.to_string()));
                        }
                    }
                    Action::StopPlayback => {
                        self.playback.stop();
                    }
                }
            }

            let _ = self.session_tx.send(self.machine.session().clone());
        }
    }
}

/// Translate connection notices into session events
fn map_connection_event(event: ConnectionEvent) -> SessionEvent {
    match event {
        ConnectionEvent::Connected => SessionEvent::ConnectionUp,
        ConnectionEvent::Disconnected { clean } => SessionEvent::ConnectionLost { clean },
        ConnectionEvent::BreakerOpen => SessionEvent::BreakerOpen,
        ConnectionEvent::Envelope(envelope) => SessionEvent::Remote(envelope.payload),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Envelope, ServerPayload};

    #[test]
    fn connection_events_map_to_session_events() {
        assert_eq!(
            map_connection_event(ConnectionEvent::Connected),
            SessionEvent::ConnectionUp
        );
        assert_eq!(
            map_connection_event(ConnectionEvent::Disconnected { clean: false }),
            SessionEvent::ConnectionLost { clean: false }
        );
        assert_eq!(
            map_connection_event(ConnectionEvent::BreakerOpen),
            SessionEvent::BreakerOpen
        );

        let envelope = Envelope::new(ServerPayload::TranscriptPartial {
            text: "hi".to_string(),
        });
        assert_eq!(
            map_connection_event(ConnectionEvent::Envelope(envelope)),
            SessionEvent::Remote(ServerPayload::TranscriptPartial {
                text: "hi".to_string(),
            })
        );
    }
}
