//! Logging configuration
//!
//! The binary turns a [`LogConfig`] into a `tracing` subscriber with a daily
//! rolling file writer. This module only holds the settings and the file
//! naming shared with it.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;

/// Log file name prefix; files are `beatrelay.YYYY-MM-DD.log`
pub const LOG_FILE_PREFIX: &str = "beatrelay";
/// Log file name suffix
pub const LOG_FILE_SUFFIX: &str = "log";

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default level (`error`, `warn`, `info`, `debug`, `trace`); `RUST_LOG` wins
    pub level: String,
    /// Write to stderr
    pub console_output: bool,
    /// Write to a file in `log_dir` that rolls over every day
    pub file_output: bool,
    /// Directory for log files
    pub log_dir: PathBuf,
    /// Daily files kept; older ones are deleted at rollover
    pub max_log_files: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console_output: true,
            file_output: false,
            log_dir: PathBuf::from("logs"),
            max_log_files: 7,
        }
    }
}

impl LogConfig {
    /// Parse `level`, falling back to INFO for unknown names
    pub fn parse_level(&self) -> LevelFilter {
        self.level.trim().parse().unwrap_or(LevelFilter::INFO)
    }

    /// Create `log_dir` if file output is enabled
    pub fn ensure_log_directory(&self) -> std::io::Result<()> {
        if self.file_output {
            fs::create_dir_all(&self.log_dir)?;
        }
        Ok(())
    }
}
