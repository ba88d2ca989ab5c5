//! Playback and lip-sync pipeline
//!
//! Plays a synthesized-speech resource while sampling the same signal at
//! the animation rate. Each tick publishes a [`LipSyncFrame`] for the
//! avatar renderer; completion publishes the closed mouth and is reported
//! to the session state machine by the runtime.

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};
use rubato::{FftFixedIn, Resampler};
use tokio::sync::watch;

use super::meter::SignalMeter;
use crate::avatar::LipSyncFrame;
use crate::{Error, Result};

/// Sample rate for playback (matches common TTS output)
const PLAYBACK_SAMPLE_RATE: u32 = 24_000;

/// Samples fed to the meter per animation tick (~43ms at 24kHz)
const LIPSYNC_WINDOW: usize = 1024;

/// Resampler input block size
const RESAMPLE_CHUNK: usize = 1024;

/// A playable audio resource
#[derive(Debug, Clone)]
pub enum AudioSource {
    /// Fetch over HTTP(S)
    Url(String),
    /// Read from the local filesystem
    File(PathBuf),
    /// Already-decoded container bytes (WAV or MP3)
    Bytes(Vec<u8>),
}

struct Playing {
    _stream: Stream,
    samples: Arc<Vec<f32>>,
    position: Arc<AtomicUsize>,
}

/// Plays speech audio and derives lip-sync frames from it
pub struct PlaybackPipeline {
    meter: SignalMeter,
    silence_threshold: f32,
    frames_tx: watch::Sender<LipSyncFrame>,
    http: reqwest::Client,
    playing: Option<Playing>,
}

impl PlaybackPipeline {
    /// Create an idle pipeline
    #[must_use]
    pub fn new(silence_threshold: f32) -> Self {
        let (frames_tx, _) = watch::channel(LipSyncFrame::closed());
        Self {
            meter: SignalMeter::new(PLAYBACK_SAMPLE_RATE),
            silence_threshold,
            frames_tx,
            http: reqwest::Client::new(),
            playing: None,
        }
    }

    /// Subscribe to lip-sync frames; the renderer reads one per tick
    #[must_use]
    pub fn frames(&self) -> watch::Receiver<LipSyncFrame> {
        self.frames_tx.subscribe()
    }

    /// Whether audio is currently playing
    #[must_use]
    pub const fn is_playing(&self) -> bool {
        self.playing.is_some()
    }

    /// Fetch, decode, and start playing a resource.
    ///
    /// Any playback already in progress is stopped first.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource cannot be fetched or decoded, or
    /// if no output device is available.
    pub async fn play(&mut self, source: AudioSource) -> Result<()> {
        self.stop();

        let bytes = self.fetch(source).await?;
        let (samples, source_rate) = decode(&bytes)?;
        let samples = resample(samples, source_rate, PLAYBACK_SAMPLE_RATE)?;

        #[allow(clippy::cast_precision_loss)]
        let duration_secs = samples.len() as f32 / PLAYBACK_SAMPLE_RATE as f32;
        tracing::info!(duration_secs, source_rate, "playback starting");

        let samples = Arc::new(samples);
        let position = Arc::new(AtomicUsize::new(0));
        let stream = open_output_stream(Arc::clone(&samples), Arc::clone(&position))?;

        self.playing = Some(Playing {
            _stream: stream,
            samples,
            position,
        });

        Ok(())
    }

    /// Publish one lip-sync frame for the current play position.
    ///
    /// Returns `true` when playback has finished; the closed mouth has
    /// been published and the device released.
    pub fn tick(&mut self) -> bool {
        let Some(playing) = &self.playing else {
            return false;
        };

        let position = playing.position.load(Ordering::Relaxed);
        if position >= playing.samples.len() {
            self.release();
            return true;
        }

        let end = (position + LIPSYNC_WINDOW).min(playing.samples.len());
        let reading = self.meter.analyze(&playing.samples[position..end]);
        let frame = LipSyncFrame::from_reading(reading, self.silence_threshold);
        let _ = self.frames_tx.send(frame);

        false
    }

    /// Stop playback and publish the closed mouth. Idempotent.
    pub fn stop(&mut self) {
        if self.playing.is_some() {
            self.release();
        }
    }

    fn release(&mut self) {
        self.playing = None;
        let _ = self.frames_tx.send(LipSyncFrame::closed());
        tracing::debug!("playback released");
    }

    async fn fetch(&self, source: AudioSource) -> Result<Vec<u8>> {
        match source {
            AudioSource::Url(url) => {
                tracing::debug!(url = %url, "fetching audio resource");
                let response = self.http.get(&url).send().await?.error_for_status()?;
                Ok(response.bytes().await?.to_vec())
            }
            AudioSource::File(path) => Ok(tokio::fs::read(path).await?),
            AudioSource::Bytes(bytes) => Ok(bytes),
        }
    }
}

/// Decode WAV or MP3 container bytes to mono f32 samples
fn decode(bytes: &[u8]) -> Result<(Vec<f32>, u32)> {
    if bytes.starts_with(b"RIFF") {
        decode_wav(bytes)
    } else {
        decode_mp3(bytes)
    }
}

/// Decode WAV bytes, downmixing to mono
#[allow(clippy::cast_precision_loss)]
fn decode_wav(bytes: &[u8]) -> Result<(Vec<f32>, u32)> {
    let mut reader =
        hound::WavReader::new(Cursor::new(bytes)).map_err(|e| Error::Audio(e.to_string()))?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => reader
            .samples::<i16>()
            .map(|s| s.map(|v| f32::from(v) / 32768.0))
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Audio(e.to_string()))?,
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Audio(e.to_string()))?,
    };

    let mono = if spec.channels > 1 {
        let channels = usize::from(spec.channels);
        samples
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    } else {
        samples
    };

    Ok((mono, spec.sample_rate))
}

/// Decode MP3 bytes to mono f32 samples
fn decode_mp3(bytes: &[u8]) -> Result<(Vec<f32>, u32)> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(bytes));
    let mut samples = Vec::new();
    let mut sample_rate = PLAYBACK_SAMPLE_RATE;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                sample_rate = u32::try_from(frame.sample_rate).unwrap_or(PLAYBACK_SAMPLE_RATE);

                if frame.channels == 2 {
                    samples.extend(frame.data.chunks(2).map(|chunk| {
                        let left = f32::from(chunk[0]) / 32768.0;
                        let right = f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                        f32::midpoint(left, right)
                    }));
                } else {
                    samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    if samples.is_empty() {
        return Err(Error::Audio("no audio frames decoded".to_string()));
    }

    Ok((samples, sample_rate))
}

/// Resample mono samples to the target rate
fn resample(samples: Vec<f32>, from: u32, to: u32) -> Result<Vec<f32>> {
    if from == to || samples.is_empty() {
        return Ok(samples);
    }

    let mut resampler = FftFixedIn::<f32>::new(from as usize, to as usize, RESAMPLE_CHUNK, 2, 1)
        .map_err(|e| Error::Audio(format!("resampler init: {e}")))?;

    let mut output = Vec::with_capacity(samples.len() * to as usize / from as usize + 1);

    for block in samples.chunks(RESAMPLE_CHUNK) {
        let frames = if block.len() == RESAMPLE_CHUNK {
            resampler
                .process(&[block], None)
                .map_err(|e| Error::Audio(format!("resample: {e}")))?
        } else {
            // Final short block: pad with silence
            let mut padded = block.to_vec();
            padded.resize(RESAMPLE_CHUNK, 0.0);
            resampler
                .process(&[padded.as_slice()], None)
                .map_err(|e| Error::Audio(format!("resample: {e}")))?
        };
        if let Some(channel) = frames.into_iter().next() {
            output.extend(channel);
        }
    }

    Ok(output)
}

/// Open the default output device at the playback sample rate
fn open_output_stream(samples: Arc<Vec<f32>>, position: Arc<AtomicUsize>) -> Result<Stream> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::DeviceUnavailable("no output device".to_string()))?;

    let supported = device
        .supported_output_configs()
        .map_err(|e| Error::DeviceUnavailable(e.to_string()))?
        .find(|c| {
            c.channels() == 1
                && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
        })
        .or_else(|| {
            // Fallback: try stereo
            device.supported_output_configs().ok()?.find(|c| {
                c.channels() == 2
                    && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
            })
        })
        .ok_or_else(|| Error::DeviceUnavailable("no suitable output config found".to_string()))?;

    let config: StreamConfig = supported
        .with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE))
        .config();
    let channels = usize::from(config.channels);

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate = PLAYBACK_SAMPLE_RATE,
        channels,
        "output device acquired"
    );

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(channels) {
                    let pos = position.load(Ordering::Relaxed);
                    let sample = samples.get(pos).copied().unwrap_or(0.0);
                    for out in frame.iter_mut() {
                        *out = sample;
                    }
                    if pos < samples.len() {
                        position.store(pos + 1, Ordering::Relaxed);
                    }
                }
            },
            |err| {
                tracing::error!(error = %err, "playback stream error");
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))?;

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;

    Ok(stream)
}
