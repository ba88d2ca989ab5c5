//! Microphone capture pipeline
//!
//! Acquires an exclusive input stream, cuts the live signal into numbered
//! chunks on a fixed cadence, meters each chunk for UI level feedback, and
//! streams the bytes over the connection. Chunk production never blocks on
//! send success: a dropped send is logged and capture continues.

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};
use tokio::sync::watch;

use super::chunker::Chunker;
use super::meter::{SignalMeter, SignalReading};
use super::SAMPLE_RATE;
use crate::connection::{ConnectionManager, ConnectionState};
use crate::protocol::{ClientPayload, VoiceFrame};
use crate::{Error, Result};

/// Capture pipeline: `Idle -> Capturing -> Idle`
pub struct CapturePipeline {
    buffer: Arc<Mutex<Vec<f32>>>,
    stream: Option<Stream>,
    chunker: Chunker,
    meter: SignalMeter,
    level_tx: watch::Sender<f32>,
}

impl CapturePipeline {
    /// Create an idle pipeline. The device is acquired on `start`.
    #[must_use]
    pub fn new() -> Self {
        let (level_tx, _) = watch::channel(0.0);
        Self {
            buffer: Arc::new(Mutex::new(Vec::new())),
            stream: None,
            chunker: Chunker::new(),
            meter: SignalMeter::new(SAMPLE_RATE),
            level_tx,
        }
    }

    /// Subscribe to the instantaneous input level for UI meters
    #[must_use]
    pub fn level(&self) -> watch::Receiver<f32> {
        self.level_tx.subscribe()
    }

    /// Whether a capture session is running
    #[must_use]
    pub const fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }

    /// Start capturing.
    ///
    /// # Errors
    ///
    /// - `Error::NotReady` unless the connection is `Connected`
    /// - `Error::AlreadyCapturing` if a capture session is running
    /// - `Error::DeviceUnavailable` if no input device can be opened
    pub async fn start(&mut self, connection: &Arc<ConnectionManager>) -> Result<()> {
        if connection.state() != ConnectionState::Connected {
            return Err(Error::NotReady);
        }
        if self.stream.is_some() {
            return Err(Error::AlreadyCapturing);
        }

        let stream = self.open_input_stream()?;

        if let Ok(mut buffer) = self.buffer.lock() {
            buffer.clear();
        }
        self.chunker.reset();

        if let Err(e) = connection.send(ClientPayload::VoiceStart).await {
            tracing::warn!(error = %e, "voice_start not delivered, aborting capture");
            drop(stream);
            return Err(Error::NotReady);
        }

        self.stream = Some(stream);
        tracing::info!("capture started");
        Ok(())
    }

    /// Cut one chunk and stream it. Called on the chunk cadence.
    ///
    /// A failed send is logged and does not stop capture.
    pub async fn tick(&mut self, connection: &Arc<ConnectionManager>) {
        if self.stream.is_none() {
            return;
        }

        let samples = self
            .buffer
            .lock()
            .map(|mut buffer| std::mem::take(&mut *buffer))
            .unwrap_or_default();

        let SignalReading { amplitude, .. } = self.meter.analyze(&samples);
        let _ = self.level_tx.send(amplitude);

        let captured_at_ms = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0);
        let chunk = self.chunker.cut(&samples, captured_at_ms);

        let frame = VoiceFrame {
            seq: chunk.seq,
            timestamp_ms: chunk.captured_at_ms,
            sample_rate: SAMPLE_RATE,
            pcm: chunk.pcm,
        };

        if let Err(e) = connection.send_audio(frame).await {
            tracing::warn!(error = %e, seq = chunk.seq, "voice frame dropped");
        }
    }

    /// Stop capturing and release the device. Idempotent.
    pub async fn stop(&mut self, connection: &Arc<ConnectionManager>) {
        let Some(stream) = self.stream.take() else {
            return;
        };
        drop(stream);

        if let Err(e) = connection.send(ClientPayload::VoiceEnd).await {
            tracing::warn!(error = %e, "voice_end not delivered");
        }

        if let Ok(mut buffer) = self.buffer.lock() {
            buffer.clear();
        }
        let _ = self.level_tx.send(0.0);
        tracing::info!(chunks = self.chunker.next_seq(), "capture stopped");
    }

    /// Open the default input device at the capture sample rate
    fn open_input_stream(&self) -> Result<Stream> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| Error::DeviceUnavailable("no input device".to_string()))?;

        let supported = device
            .supported_input_configs()
            .map_err(|e| Error::DeviceUnavailable(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
            })
            .ok_or_else(|| {
                Error::DeviceUnavailable("no suitable input config found".to_string())
            })?;

        let config: StreamConfig = supported.with_sample_rate(SampleRate(SAMPLE_RATE)).config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = SAMPLE_RATE,
            channels = config.channels,
            "input device acquired"
        );

        let buffer = Arc::clone(&self.buffer);
        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = buffer.lock() {
                        buf.extend_from_slice(data);
                    }
                },
                |err| {
                    tracing::error!(error = %err, "capture stream error");
                },
                None,
            )
            .map_err(|e| Error::DeviceUnavailable(e.to_string()))?;

        stream
            .play()
            .map_err(|e| Error::DeviceUnavailable(e.to_string()))?;

        Ok(stream)
    }
}

impl Default for CapturePipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert f32 samples to WAV bytes
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
