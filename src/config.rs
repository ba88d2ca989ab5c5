//! Configuration for the Aura client runtime

use std::time::Duration;

/// Default remote endpoint for the recognition/response service
pub const DEFAULT_ENDPOINT: &str = "wss://api.aura.dev/voice";

/// Default capture chunk interval
const DEFAULT_CHUNK_INTERVAL_MS: u64 = 100;

/// Default silence threshold below which the mouth is considered closed
const DEFAULT_SILENCE_THRESHOLD: f32 = 0.01;

/// Default lip-sync animation rate in frames per second
const DEFAULT_FRAME_RATE: u32 = 60;

/// Aura client configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// WebSocket endpoint of the recognition/response service
    pub endpoint: String,

    /// Microphone capture sample rate in Hz
    pub capture_sample_rate: u32,

    /// Duration of one captured audio chunk
    pub chunk_interval: Duration,

    /// Amplitude below which lip-sync publishes the closed mouth shape
    pub silence_threshold: f32,

    /// Lip-sync animation frames per second
    pub frame_rate: u32,

    /// Reconnection policy
    pub reconnect: ReconnectConfig,
}

/// Reconnection and circuit-breaker policy
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Base delay between reconnect attempts (doubles each attempt)
    pub base_delay: Duration,

    /// Maximum backoff delay cap
    pub max_delay: Duration,

    /// Reconnection is abandoned once this many attempts have been made
    pub max_attempts: u32,

    /// Consecutive failures before the circuit breaker opens
    pub breaker_threshold: u32,

    /// How long the breaker suppresses attempts once open
    pub breaker_cooldown: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            capture_sample_rate: crate::audio::SAMPLE_RATE,
            chunk_interval: Duration::from_millis(DEFAULT_CHUNK_INTERVAL_MS),
            silence_threshold: DEFAULT_SILENCE_THRESHOLD,
            frame_rate: DEFAULT_FRAME_RATE,
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 10,
            breaker_threshold: 5,
            breaker_cooldown: Duration::from_secs(60),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Reads `AURA_ENDPOINT`, `AURA_CHUNK_INTERVAL_MS`,
    /// `AURA_SILENCE_THRESHOLD`, `AURA_FRAME_RATE`, `AURA_BASE_DELAY_MS`,
    /// `AURA_MAX_DELAY_MS`, `AURA_MAX_RECONNECT_ATTEMPTS`,
    /// `AURA_BREAKER_THRESHOLD`, and `AURA_BREAKER_COOLDOWN_MS`.
    /// Unset or unparsable variables fall back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            endpoint: std::env::var("AURA_ENDPOINT").unwrap_or(defaults.endpoint),
            capture_sample_rate: defaults.capture_sample_rate,
            chunk_interval: env_millis("AURA_CHUNK_INTERVAL_MS")
                .unwrap_or(defaults.chunk_interval),
            silence_threshold: std::env::var("AURA_SILENCE_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.silence_threshold),
            frame_rate: std::env::var("AURA_FRAME_RATE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.frame_rate),
            reconnect: ReconnectConfig {
                base_delay: env_millis("AURA_BASE_DELAY_MS")
                    .unwrap_or(defaults.reconnect.base_delay),
                max_delay: env_millis("AURA_MAX_DELAY_MS")
                    .unwrap_or(defaults.reconnect.max_delay),
                max_attempts: std::env::var("AURA_MAX_RECONNECT_ATTEMPTS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.reconnect.max_attempts),
                breaker_threshold: std::env::var("AURA_BREAKER_THRESHOLD")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.reconnect.breaker_threshold),
                breaker_cooldown: env_millis("AURA_BREAKER_COOLDOWN_MS")
                    .unwrap_or(defaults.reconnect.breaker_cooldown),
            },
        }
    }
}

/// Parse an environment variable holding a millisecond count
fn env_millis(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_millis)
}
