//! BeatRelay Core - Data Model and Configuration
//!
//! This crate contains the pieces shared by the relay crates:
//! - `AudioSample`, the per-window audio feature record and its JSON codec
//! - `RelayConfig`, loaded once at startup from file and environment
//! - `LogConfig`, consumed by the binary's logging setup

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod logging;
pub mod sample;

pub use config::{saturating_millis, RelayConfig};
pub use error::{CoreError, Result};
pub use logging::LogConfig;
pub use sample::AudioSample;
