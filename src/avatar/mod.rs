//! Lip-sync classification and animation parameters
//!
//! Maps a signal reading to a discrete mouth shape and a parameter tuple
//! the avatar renderer consumes once per animation tick. The mapping is
//! total: every (frequency, amplitude) pair lands in exactly one shape.

use crate::audio::SignalReading;

/// Discrete mouth shapes the avatar can assume
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouthShape {
    /// Below the silence threshold
    Closed,
    /// Low frequency, quiet
    OpenSmall,
    /// Low frequency, loud
    OpenWide,
    /// Mid frequency, quiet
    OpenMedium,
    /// Mid frequency, loud
    Smile,
    /// High-mid frequency band
    EeShape,
    /// High frequency band
    OhShape,
}

/// Animation parameters for one rendered frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MouthParams {
    /// Horizontal mouth scale
    pub scale_x: f32,
    /// Vertical mouth scale
    pub scale_y: f32,
    /// Vertical offset from the rest position
    pub offset_y: f32,
    /// Rotation in radians
    pub rotation: f32,
}

/// Resting pose: mouth shut
const NEUTRAL: MouthParams = MouthParams {
    scale_x: 1.0,
    scale_y: 0.15,
    offset_y: 0.0,
    rotation: 0.0,
};

/// One lip-sync sample, recomputed every animation tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LipSyncFrame {
    /// Loudness in [0, 1]
    pub amplitude: f32,
    /// Dominant frequency in Hz
    pub dominant_frequency: f32,
    /// Classified mouth shape
    pub shape: MouthShape,
    /// Parameters for the renderer
    pub params: MouthParams,
}

impl MouthShape {
    /// Classify a (frequency, amplitude) pair.
    ///
    /// The silence check runs first; frequency bands are half-open
    /// (`[0, 300)`, `[300, 800)`, `[800, 2000)`, `[2000, ..)`) and the
    /// amplitude comparisons are strict, so boundary values are
    /// unambiguous: exactly 300 Hz falls in the mid band and exactly 0.3
    /// amplitude reads as quiet.
    #[must_use]
    pub fn classify(frequency_hz: f32, amplitude: f32, silence_threshold: f32) -> Self {
        if amplitude < silence_threshold {
            return Self::Closed;
        }

        if frequency_hz < 300.0 {
            if amplitude > 0.3 {
                Self::OpenWide
            } else {
                Self::OpenSmall
            }
        } else if frequency_hz < 800.0 {
            if amplitude > 0.4 {
                Self::Smile
            } else {
                Self::OpenMedium
            }
        } else if frequency_hz < 2000.0 {
            Self::EeShape
        } else {
            Self::OhShape
        }
    }

    /// The fully-articulated pose for this shape
    #[must_use]
    pub const fn base_params(self) -> MouthParams {
        match self {
            Self::Closed => NEUTRAL,
            Self::OpenSmall => MouthParams {
                scale_x: 1.0,
                scale_y: 0.5,
                offset_y: 0.05,
                rotation: 0.0,
            },
            Self::OpenWide => MouthParams {
                scale_x: 1.1,
                scale_y: 1.0,
                offset_y: 0.1,
                rotation: 0.0,
            },
            Self::OpenMedium => MouthParams {
                scale_x: 1.0,
                scale_y: 0.7,
                offset_y: 0.08,
                rotation: 0.0,
            },
            Self::Smile => MouthParams {
                scale_x: 1.3,
                scale_y: 0.4,
                offset_y: -0.05,
                rotation: 0.05,
            },
            Self::EeShape => MouthParams {
                scale_x: 1.4,
                scale_y: 0.25,
                offset_y: 0.0,
                rotation: 0.0,
            },
            Self::OhShape => MouthParams {
                scale_x: 0.7,
                scale_y: 0.9,
                offset_y: 0.12,
                rotation: 0.0,
            },
        }
    }
}

impl LipSyncFrame {
    /// Frame for a silent mouth; published on playback completion
    #[must_use]
    pub const fn closed() -> Self {
        Self {
            amplitude: 0.0,
            dominant_frequency: 0.0,
            shape: MouthShape::Closed,
            params: NEUTRAL,
        }
    }

    /// Build a frame from a meter reading.
    ///
    /// Parameters interpolate linearly from the resting pose toward the
    /// shape's base pose with amplitude, so a quiet vowel barely parts
    /// the lips while a loud one articulates fully.
    #[must_use]
    pub fn from_reading(reading: SignalReading, silence_threshold: f32) -> Self {
        let shape = MouthShape::classify(
            reading.dominant_frequency,
            reading.amplitude,
            silence_threshold,
        );
        let t = reading.amplitude.clamp(0.0, 1.0);
        let base = shape.base_params();

        Self {
            amplitude: reading.amplitude,
            dominant_frequency: reading.dominant_frequency,
            shape,
            params: MouthParams {
                scale_x: lerp(NEUTRAL.scale_x, base.scale_x, t),
                scale_y: lerp(NEUTRAL.scale_y, base.scale_y, t),
                offset_y: lerp(NEUTRAL.offset_y, base.offset_y, t),
                rotation: lerp(NEUTRAL.rotation, base.rotation, t),
            },
        }
    }
}

fn lerp(from: f32, to: f32, t: f32) -> f32 {
    to.mul_add(t, from * (1.0 - t))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SILENCE: f32 = 0.01;

    #[test]
    fn silence_is_closed_in_every_band() {
        for freq in [0.0, 150.0, 300.0, 500.0, 1000.0, 3000.0] {
            assert_eq!(
                MouthShape::classify(freq, 0.005, SILENCE),
                MouthShape::Closed,
                "at {freq} Hz"
            );
        }
    }

    #[test]
    fn low_band_splits_on_amplitude() {
        assert_eq!(
            MouthShape::classify(200.0, 0.5, SILENCE),
            MouthShape::OpenWide
        );
        assert_eq!(
            MouthShape::classify(200.0, 0.2, SILENCE),
            MouthShape::OpenSmall
        );
    }

    #[test]
    fn mid_band_splits_on_amplitude() {
        assert_eq!(MouthShape::classify(500.0, 0.5, SILENCE), MouthShape::Smile);
        assert_eq!(
            MouthShape::classify(500.0, 0.3, SILENCE),
            MouthShape::OpenMedium
        );
    }

    #[test]
    fn upper_bands_ignore_amplitude() {
        assert_eq!(
            MouthShape::classify(1200.0, 0.05, SILENCE),
            MouthShape::EeShape
        );
        assert_eq!(
            MouthShape::classify(1200.0, 0.95, SILENCE),
            MouthShape::EeShape
        );
        assert_eq!(
            MouthShape::classify(2500.0, 0.05, SILENCE),
            MouthShape::OhShape
        );
        assert_eq!(
            MouthShape::classify(2500.0, 0.95, SILENCE),
            MouthShape::OhShape
        );
    }

    #[test]
    fn boundary_values_are_unambiguous() {
        // Exactly 300 Hz belongs to the mid band
        assert_eq!(
            MouthShape::classify(300.0, 0.5, SILENCE),
            MouthShape::Smile
        );
        // Exactly 0.3 amplitude is "quiet" in the low band
        assert_eq!(
            MouthShape::classify(100.0, 0.3, SILENCE),
            MouthShape::OpenSmall
        );
        // Exactly 0.4 amplitude is "quiet" in the mid band
        assert_eq!(
            MouthShape::classify(500.0, 0.4, SILENCE),
            MouthShape::OpenMedium
        );
        // Exactly 800 and 2000 Hz belong to the upper bands
        assert_eq!(
            MouthShape::classify(800.0, 0.5, SILENCE),
            MouthShape::EeShape
        );
        assert_eq!(
            MouthShape::classify(2000.0, 0.5, SILENCE),
            MouthShape::OhShape
        );
    }

    #[test]
    fn classification_is_total() {
        // Sweep the legal input domain; every pair must classify
        let mut frequency = 0.0f32;
        while frequency < 8000.0 {
            let mut amplitude = 0.0f32;
            while amplitude <= 1.0 {
                let _ = MouthShape::classify(frequency, amplitude, SILENCE);
                amplitude += 0.01;
            }
            frequency += 25.0;
        }
    }

    #[test]
    fn params_scale_with_amplitude() {
        let quiet = LipSyncFrame::from_reading(
            SignalReading {
                amplitude: 0.1,
                dominant_frequency: 200.0,
            },
            SILENCE,
        );
        let loud = LipSyncFrame::from_reading(
            SignalReading {
                amplitude: 0.9,
                dominant_frequency: 200.0,
            },
            SILENCE,
        );

        assert!(loud.params.scale_y > quiet.params.scale_y);
        assert!(loud.params.offset_y > quiet.params.offset_y);
    }

    #[test]
    fn closed_frame_matches_resting_pose() {
        let frame = LipSyncFrame::closed();
        assert_eq!(frame.shape, MouthShape::Closed);
        assert_eq!(frame.params, NEUTRAL);
        assert!(frame.amplitude.abs() < f32::EPSILON);
    }
}
