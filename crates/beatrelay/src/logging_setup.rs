//! Tracing subscriber for the relay binary
//!
//! Console output goes to stderr. File output goes through a daily rolling
//! appender, so a relay that runs for weeks still gets one file per day and
//! old days are pruned down to `max_log_files`.

use anyhow::{Context, Result};
use beatrelay_core::logging::{LogConfig, LOG_FILE_PREFIX, LOG_FILE_SUFFIX};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, Layer,
};

/// Flushes buffered file output when dropped; hold it for the process lifetime
pub struct LogGuard {
    _worker: WorkerGuard,
}

/// Writer for `<log_dir>/beatrelay.YYYY-MM-DD.log`, switching file at
/// midnight UTC.
pub fn file_appender(config: &LogConfig) -> Result<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix(LOG_FILE_SUFFIX)
        .max_log_files(config.max_log_files)
        .build(&config.log_dir)
        .with_context(|| format!("Failed to open log directory {:?}", config.log_dir))
}

fn env_filter(config: &LogConfig) -> EnvFilter {
    // RUST_LOG wins over the configured level
    EnvFilter::builder()
        .with_default_directive(config.parse_level().into())
        .from_env_lossy()
}

/// Install the global subscriber described by `config`
pub fn init(config: &LogConfig) -> Result<Option<LogGuard>> {
    config
        .ensure_log_directory()
        .context("Failed to create log directory")?;

    let console_layer = config.console_output.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_filter(env_filter(config))
    });

    let mut guard = None;
    let file_layer = if config.file_output {
        let (writer, worker) = tracing_appender::non_blocking(file_appender(config)?);
        guard = Some(LogGuard { _worker: worker });
        Some(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(env_filter(config)),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    tracing::info!(
        level = %config.level,
        file_output = config.file_output,
        log_dir = ?config.log_dir,
        "Logging initialized"
    );

    Ok(guard)
}
