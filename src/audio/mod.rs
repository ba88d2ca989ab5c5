//! Audio pipelines
//!
//! Microphone capture with chunked streaming, playback of synthesized
//! speech, and the spectral signal meter both pipelines share.

mod capture;
mod chunker;
mod meter;
mod playback;

pub use capture::{CapturePipeline, samples_to_wav};
pub use chunker::{AudioChunk, Chunker};
pub use meter::{SignalMeter, SignalReading};
pub use playback::{AudioSource, PlaybackPipeline};

/// Sample rate for microphone capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16_000;
