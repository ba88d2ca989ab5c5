//! Spectral signal meter
//!
//! Computes a scalar loudness value and the dominant frequency of an
//! audio window. Pure and deterministic: identical windows always yield
//! identical readings, so it is unit-testable without audio hardware.

use rustfft::FftPlanner;
use rustfft::num_complex::Complex;

/// One analysis result
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalReading {
    /// Mean of the one-sided magnitude spectrum, clamped to [0, 1].
    /// A full-scale sine reads 1.0.
    pub amplitude: f32,
    /// Frequency of the largest-magnitude bin, in Hz
    pub dominant_frequency: f32,
}

/// Analyzes audio windows at a fixed sample rate
#[derive(Debug, Clone, Copy)]
pub struct SignalMeter {
    sample_rate: u32,
}

impl SignalMeter {
    /// Create a meter for signals captured at `sample_rate` Hz
    #[must_use]
    pub const fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }

    /// The sample rate this meter interprets windows at
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Analyze one window of samples.
    ///
    /// Empty windows read as silence (amplitude 0, frequency 0).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn analyze(&self, window: &[f32]) -> SignalReading {
        if window.is_empty() {
            return SignalReading {
                amplitude: 0.0,
                dominant_frequency: 0.0,
            };
        }

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(window.len());

        let mut buffer: Vec<Complex<f32>> = window
            .iter()
            .map(|&sample| Complex::new(sample, 0.0))
            .collect();
        fft.process(&mut buffer);

        // One-sided spectrum; bin k corresponds to k * rate / len Hz
        let bins = (window.len() / 2).max(1);
        let mut magnitude_sum = 0.0f32;
        let mut peak_magnitude = 0.0f32;
        let mut peak_bin = 0usize;

        for (bin, value) in buffer.iter().take(bins).enumerate() {
            let magnitude = value.norm();
            magnitude_sum += magnitude;
            if magnitude > peak_magnitude {
                peak_magnitude = magnitude;
                peak_bin = bin;
            }
        }

        // Mean magnitude; bins scale with len/2 so a full-scale sine is 1.0
        let amplitude = (magnitude_sum / bins as f32).clamp(0.0, 1.0);
        let dominant_frequency = peak_bin as f32 * self.sample_rate as f32 / window.len() as f32;

        SignalReading {
            amplitude,
            dominant_frequency,
        }
    }
}
