//! Aura Client - Voice assistant client runtime
//!
//! This library provides the core of the Aura voice client:
//! - Persistent connection to the recognition/response service
//! - Chunked microphone capture and streaming
//! - Playback of synthesized replies with lip-sync analysis
//! - The session state machine the UI observes
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │               UI / Avatar renderer                   │
//! │   status watch  │  level watch  │  lip-sync watch   │
//! └────────────────────┬────────────────────────────────┘
//!                      │ commands / snapshots
//! ┌────────────────────▼────────────────────────────────┐
//! │                Session runtime                       │
//! │   State machine  │  Capture  │  Playback & lip-sync │
//! └────────────────────┬────────────────────────────────┘
//!                      │ envelopes / voice frames
//! ┌────────────────────▼────────────────────────────────┐
//! │              Connection manager                      │
//! │   backoff  │  circuit breaker  │  keep-alive        │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod avatar;
pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod session;

pub use audio::{
    AudioChunk, AudioSource, CapturePipeline, Chunker, PlaybackPipeline, SAMPLE_RATE, SignalMeter,
    SignalReading, samples_to_wav,
};
pub use avatar::{LipSyncFrame, MouthParams, MouthShape};
pub use config::{Config, ReconnectConfig};
pub use connection::{
    CircuitBreaker, ConnectionEvent, ConnectionManager, ConnectionState,
};
pub use error::{Error, Result};
pub use protocol::{ClientEnvelope, ClientPayload, Envelope, ServerEnvelope, ServerPayload, VoiceFrame};
pub use session::{
    Session, SessionEvent, SessionHandle, SessionMachine, SessionRuntime, SessionStatus,
    Transcript,
};
