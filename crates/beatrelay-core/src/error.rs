//! Error types for the core crate
use thiserror::Error;

/// Core errors
#[derive(Error, Debug)]
pub enum CoreError {
    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be parsed or is inconsistent
    #[error("Config error: {0}")]
    Config(String),

    /// Frame that cannot carry a sample (e.g. binary payload)
    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
