//! Error types for chatrelay

use thiserror::Error;

/// Main error type for chatrelay startup and server operations
#[derive(Error, Debug)]
pub enum RelayError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Completion provider setup errors
    #[error("Provider error: {0}")]
    Provider(String),

    /// HTTP/WebSocket server errors
    #[error("Server error: {0}")]
    Server(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// General errors
    #[error("{0}")]
    General(String),
}

/// Result type alias for chatrelay operations
pub type Result<T> = std::result::Result<T, RelayError>;
