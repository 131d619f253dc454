//! Error types for Cadence.

use thiserror::Error;

/// Result type alias using Cadence's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Cadence.
#[derive(Error, Debug)]
pub enum Error {
    // Command errors
    #[error("No active session for {0}")]
    SessionNotFound(String),

    #[error("No track found for query: {0}")]
    TrackNotFound(String),

    #[error("Invalid destination: {0}")]
    InvalidDestination(String),

    // Collaborator errors
    #[error("Track provider error: {0}")]
    Provider(String),

    #[error("Voice transport error: {0}")]
    Transport(String),

    #[error("Stream pipeline error: {0}")]
    Pipeline(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns true if this error was caused by the command itself rather than
    /// by a collaborator failing.
    pub const fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::SessionNotFound(_) | Self::TrackNotFound(_) | Self::InvalidDestination(_)
        )
    }
}
