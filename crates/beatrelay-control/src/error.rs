//! Error types for the relay
use std::time::Duration;

use beatrelay_core::CoreError;
use thiserror::Error;

/// Relay errors
#[derive(Error, Debug)]
pub enum ControlError {
    /// Sample decoding or configuration error
    #[error(transparent)]
    Core(#[from] CoreError),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP listener error
    #[error("HTTP error: {0}")]
    Http(String),

    /// WebSocket transport error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Upstream connect attempt did not finish in time
    #[error("Upstream connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// The hub task has stopped
    #[error("Broadcast hub is closed")]
    HubClosed,
}

/// Result type for relay operations
pub type Result<T> = std::result::Result<T, ControlError>;
