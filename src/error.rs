use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Source not found: {0}")]
    SourceNotFound(String),

    #[error("Source already connected: {0}")]
    SourceExists(String),

    #[error("Source already streaming: {0}")]
    AlreadyStreaming(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Vehicle error: {0}")]
    Vehicle(String),

    #[error("Video error: {0}")]
    Video(String),

    #[error("Signaling error: {0}")]
    Signaling(String),

    #[error("WebRTC error: {0}")]
    WebRtc(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;
