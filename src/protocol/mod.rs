//! Wire protocol for the recognition/response service
//!
//! All control traffic is JSON text envelopes `{type, ..., timestamp}`.
//! Captured audio travels as native binary frames (`VoiceFrame`) rather
//! than byte arrays inside JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Byte length of the binary voice frame header
pub const VOICE_FRAME_HEADER_LEN: usize = 20;

/// A timestamped wire message
///
/// The payload's `type` tag and fields are flattened next to the
/// `timestamp`, producing `{"type": "...", ..., "timestamp": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// Message payload, flattened into the envelope object
    #[serde(flatten)]
    pub payload: T,
    /// Send time, RFC 3339
    pub timestamp: DateTime<Utc>,
}

impl<T> Envelope<T> {
    /// Wrap a payload with the current time
    pub fn new(payload: T) -> Self {
        Self {
            payload,
            timestamp: Utc::now(),
        }
    }
}

/// Control messages sent to the service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientPayload {
    /// Capture session opened; audio frames follow
    VoiceStart,
    /// Capture session closed; no further audio frames
    VoiceEnd,
}

/// Messages received from the service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerPayload {
    /// Incremental transcript for the in-flight utterance
    TranscriptPartial { text: String },
    /// Authoritative transcript; supersedes any partial
    TranscriptFinal { text: String, confidence: f32 },
    /// Assistant reply; `audio_url` present when speech was synthesized
    AgentResponse {
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        audio_url: Option<String>,
    },
    /// Remote failure; terminates the current session
    Error { reason: String },
}

/// Outbound envelope alias
pub type ClientEnvelope = Envelope<ClientPayload>;

/// Inbound envelope alias
pub type ServerEnvelope = Envelope<ServerPayload>;

/// One binary audio frame: fixed header plus raw 16-bit LE PCM
///
/// Layout: `[seq: u64][timestamp_ms: u64][sample_rate: u32]` little-endian,
/// followed by the PCM bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceFrame {
    /// Strictly increasing per capture session
    pub seq: u64,
    /// Capture time, milliseconds since the Unix epoch
    pub timestamp_ms: u64,
    /// PCM sample rate in Hz
    pub sample_rate: u32,
    /// Raw 16-bit little-endian PCM
    pub pcm: Vec<u8>,
}

impl VoiceFrame {
    /// Encode into a single binary WebSocket message body
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(VOICE_FRAME_HEADER_LEN + self.pcm.len());
        buf.extend_from_slice(&self.seq.to_le_bytes());
        buf.extend_from_slice(&self.timestamp_ms.to_le_bytes());
        buf.extend_from_slice(&self.sample_rate.to_le_bytes());
        buf.extend_from_slice(&self.pcm);
        buf
    }

    /// Decode a binary message body
    ///
    /// # Errors
    ///
    /// Returns `Error::Transport` if the buffer is shorter than the header.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < VOICE_FRAME_HEADER_LEN {
            return Err(Error::Transport(format!(
                "voice frame too short: {} bytes",
                buf.len()
            )));
        }

        let mut seq = [0u8; 8];
        seq.copy_from_slice(&buf[0..8]);
        let mut timestamp_ms = [0u8; 8];
        timestamp_ms.copy_from_slice(&buf[8..16]);
        let mut sample_rate = [0u8; 4];
        sample_rate.copy_from_slice(&buf[16..20]);

        Ok(Self {
            seq: u64::from_le_bytes(seq),
            timestamp_ms: u64::from_le_bytes(timestamp_ms),
            sample_rate: u32::from_le_bytes(sample_rate),
            pcm: buf[VOICE_FRAME_HEADER_LEN..].to_vec(),
        })
    }
}
