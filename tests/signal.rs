//! Signal meter integration tests
//!
//! Exercises the meter without audio hardware using generated windows.

use aura_client::{SAMPLE_RATE, SignalMeter};

mod common;

use common::{silence, sine_samples};

#[test]
fn test_meter_is_pure() {
    let meter = SignalMeter::new(SAMPLE_RATE);
    let window = sine_samples(440.0, 0.064, 0.6, SAMPLE_RATE);

    let first = meter.analyze(&window);
    let second = meter.analyze(&window);
    let third = meter.analyze(&window);

    assert_eq!(first, second);
    assert_eq!(second, third);
}

#[test]
fn test_silence_reads_as_silence() {
    let meter = SignalMeter::new(SAMPLE_RATE);
    let window = silence(0.1, SAMPLE_RATE);

    let reading = meter.analyze(&window);
    assert!(reading.amplitude < 0.01);
}

#[test]
fn test_frequency_detection_across_bands() {
    let meter = SignalMeter::new(SAMPLE_RATE);

    for &frequency in &[125.0f32, 250.0, 500.0, 1000.0, 2500.0] {
        // 2048 samples at 16kHz gives a bin width of 7.8125 Hz
        let window = &sine_samples(frequency, 0.2, 0.5, SAMPLE_RATE)[..2048];
        let reading = meter.analyze(window);

        assert!(
            (reading.dominant_frequency - frequency).abs() < 16.0,
            "{frequency} Hz read as {} Hz",
            reading.dominant_frequency
        );
    }
}

#[test]
fn test_amplitude_ordering_by_level() {
    let meter = SignalMeter::new(SAMPLE_RATE);

    let mut previous = 0.0;
    for &level in &[0.1f32, 0.3, 0.6, 0.9] {
        let window = &sine_samples(250.0, 0.2, level, SAMPLE_RATE)[..2048];
        let amplitude = meter.analyze(window).amplitude;
        assert!(
            amplitude > previous,
            "level {level} read {amplitude}, not above {previous}"
        );
        previous = amplitude;
    }
}

#[test]
fn test_amplitude_stays_in_unit_range() {
    let meter = SignalMeter::new(SAMPLE_RATE);

    for &level in &[0.0f32, 0.5, 1.0] {
        let window = &sine_samples(440.0, 0.2, level, SAMPLE_RATE)[..2048];
        let amplitude = meter.analyze(window).amplitude;
        assert!((0.0..=1.0).contains(&amplitude), "got {amplitude}");
    }
}
