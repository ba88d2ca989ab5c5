//! Error types for the Aura client runtime

use thiserror::Error;

/// Result type alias for Aura operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the Aura client runtime
#[derive(Debug, Error)]
pub enum Error {
    /// Send attempted while the connection is not established
    #[error("not connected")]
    NotConnected,

    /// Capture start attempted before the connection is ready
    #[error("connection not ready for capture")]
    NotReady,

    /// No microphone available or permission denied
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Capture start attempted while a capture session is already running
    #[error("already capturing")]
    AlreadyCapturing,

    /// Remote endpoint reported an error for the current session
    #[error("remote error: {0}")]
    Remote(String),

    /// Audio decode or device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Transport-level error (handshake, socket)
    #[error("transport error: {0}")]
    Transport(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
