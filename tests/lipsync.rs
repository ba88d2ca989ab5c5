//! Lip-sync pipeline integration tests
//!
//! Runs generated audio through the meter and classifier the way the
//! playback pipeline does each animation tick.

use aura_client::{LipSyncFrame, MouthShape, SAMPLE_RATE, SignalMeter};

mod common;

use common::{silence, sine_samples};

const SILENCE_THRESHOLD: f32 = 0.01;

/// Meter a generated tone and classify it like one animation tick
fn frame_for(frequency: f32, amplitude: f32) -> LipSyncFrame {
    let meter = SignalMeter::new(SAMPLE_RATE);
    let window = &sine_samples(frequency, 0.2, amplitude, SAMPLE_RATE)[..2048];
    LipSyncFrame::from_reading(meter.analyze(window), SILENCE_THRESHOLD)
}

#[test]
fn test_silence_closes_the_mouth() {
    let meter = SignalMeter::new(SAMPLE_RATE);
    let window = silence(0.1, SAMPLE_RATE);
    let frame = LipSyncFrame::from_reading(meter.analyze(&window), SILENCE_THRESHOLD);

    assert_eq!(frame.shape, MouthShape::Closed);
}

#[test]
fn test_loud_low_tone_opens_wide() {
    let frame = frame_for(250.0, 0.6);
    assert_eq!(frame.shape, MouthShape::OpenWide);
}

#[test]
fn test_quiet_low_tone_opens_small() {
    let frame = frame_for(250.0, 0.15);
    assert_eq!(frame.shape, MouthShape::OpenSmall);
}

#[test]
fn test_loud_mid_tone_smiles() {
    let frame = frame_for(500.0, 0.7);
    assert_eq!(frame.shape, MouthShape::Smile);
}

#[test]
fn test_high_mid_band_is_ee() {
    let frame = frame_for(1250.0, 0.5);
    assert_eq!(frame.shape, MouthShape::EeShape);
}

#[test]
fn test_high_band_is_oh() {
    let frame = frame_for(3125.0, 0.5);
    assert_eq!(frame.shape, MouthShape::OhShape);
}

#[test]
fn test_classification_is_total_over_the_domain() {
    // Every (frequency, amplitude) pair must land on exactly one shape;
    // classify never panics and boundary values are unambiguous
    let mut frequency = 0.0f32;
    while frequency <= 8000.0 {
        let mut amplitude = 0.0f32;
        while amplitude <= 1.0 {
            let _ = MouthShape::classify(frequency, amplitude, SILENCE_THRESHOLD);
            amplitude += 0.05;
        }
        frequency += 50.0;
    }

    assert_eq!(
        MouthShape::classify(300.0, 0.5, SILENCE_THRESHOLD),
        MouthShape::Smile
    );
    assert_eq!(
        MouthShape::classify(100.0, 0.3, SILENCE_THRESHOLD),
        MouthShape::OpenSmall
    );
}

#[test]
fn test_params_articulate_with_amplitude() {
    let quiet = frame_for(250.0, 0.15);
    let loud = frame_for(250.0, 0.9);

    // Louder audio opens the mouth further vertically
    assert!(loud.params.scale_y > quiet.params.scale_y);
}

#[test]
fn test_closed_frame_is_the_published_completion_value() {
    let frame = LipSyncFrame::closed();
    assert_eq!(frame.shape, MouthShape::Closed);
    assert!(frame.amplitude.abs() < f32::EPSILON);
    assert!(frame.dominant_frequency.abs() < f32::EPSILON);
}
