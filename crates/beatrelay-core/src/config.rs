//! Relay configuration
//!
//! Read once at startup: an optional TOML file named by `BEATRELAY_CONFIG`,
//! then individual environment overrides.

use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use crate::{CoreError, LogConfig, Result};

/// Environment variable naming the TOML config file
pub const CONFIG_PATH_ENV: &str = "BEATRELAY_CONFIG";

const UPSTREAM_URL_ENV: &str = "BEATRELAY_UPSTREAM_URL";
const LISTEN_HOST_ENV: &str = "BEATRELAY_LISTEN_HOST";
const LISTEN_PORT_ENV: &str = "BEATRELAY_LISTEN_PORT";
const RECONNECT_DELAY_ENV: &str = "BEATRELAY_RECONNECT_DELAY_MS";
const LOG_LEVEL_ENV: &str = "BEATRELAY_LOG_LEVEL";

/// Whole milliseconds in `duration`, saturating at `u64::MAX`
pub fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Relay process configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// WebSocket URL of the audio analysis daemon
    pub upstream_url: String,
    /// Interface the subscriber listener binds to
    pub listen_host: String,
    /// Port the subscriber listener binds to
    pub listen_port: u16,
    /// Fixed delay between upstream connection attempts
    pub reconnect_delay_ms: u64,
    /// Upper bound on a single upstream connect attempt; `None` or 0 waits forever
    pub connect_timeout_ms: Option<u64>,
    /// Per-subscriber outbound queue length
    pub subscriber_queue: usize,
    /// Hub command queue length
    pub hub_queue: usize,
    /// Add CORS headers to HTTP responses
    pub enable_cors: bool,
    /// Allowed CORS origins, `*` for any
    pub allowed_origins: Vec<String>,
    /// Logging settings
    pub log: LogConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            upstream_url: "ws://localhost:8765".to_string(),
            // All interfaces so kiosks on the LAN can subscribe
            listen_host: "0.0.0.0".to_string(),
            listen_port: 8766,
            reconnect_delay_ms: 3000,
            connect_timeout_ms: Some(10_000),
            subscriber_queue: 64,
            hub_queue: 256,
            enable_cors: true,
            allowed_origins: vec!["*".to_string()],
            log: LogConfig::default(),
        }
    }
}

impl RelayConfig {
    /// Load from the file named by `BEATRELAY_CONFIG` (if set) and apply
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| CoreError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Apply overrides from a key lookup (normally the process environment)
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(UPSTREAM_URL_ENV) {
            self.upstream_url = url;
        }
        if let Some(host) = lookup(LISTEN_HOST_ENV) {
            self.listen_host = host;
        }
        if let Some(port) = lookup(LISTEN_PORT_ENV) {
            self.listen_port = port
                .parse()
                .map_err(|e| CoreError::Config(format!("{}: {}", LISTEN_PORT_ENV, e)))?;
        }
        if let Some(delay) = lookup(RECONNECT_DELAY_ENV) {
            self.reconnect_delay_ms = delay
                .parse()
                .map_err(|e| CoreError::Config(format!("{}: {}", RECONNECT_DELAY_ENV, e)))?;
        }
        if let Some(level) = lookup(LOG_LEVEL_ENV) {
            self.log.level = level;
        }
        Ok(())
    }

    /// Reject settings the relay cannot run with
    pub fn validate(&self) -> Result<()> {
        if !(self.upstream_url.starts_with("ws://") || self.upstream_url.starts_with("wss://")) {
            return Err(CoreError::Config(format!(
                "upstream_url must be a ws:// or wss:// URL, got {}",
                self.upstream_url
            )));
        }
        if self.subscriber_queue == 0 || self.hub_queue == 0 {
            return Err(CoreError::Config("queue lengths must be non-zero".to_string()));
        }
        if self.reconnect_delay_ms == 0 {
            return Err(CoreError::Config(
                "reconnect_delay_ms must be non-zero".to_string(),
            ));
        }
        if self.log.file_output && self.log.max_log_files == 0 {
            return Err(CoreError::Config(
                "log.max_log_files must be non-zero when file output is on".to_string(),
            ));
        }
        self.listen_addr()?;
        Ok(())
    }

    /// Socket address of the subscriber listener.
    ///
    /// `listen_host` is an IPv4 or IPv6 literal; IPv6 may be bracketed.
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        let host = self.listen_host.trim();
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        let ip: IpAddr = host.parse().map_err(|e| {
            CoreError::Config(format!(
                "Invalid listen_host {:?} (expected an IP address): {}",
                self.listen_host, e
            ))
        })?;
        Ok(SocketAddr::new(ip, self.listen_port))
    }

    /// Fixed upstream reconnect delay
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Upstream connect timeout, if any
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    /// Set the upstream URL
    pub fn with_upstream_url(mut self, url: impl Into<String>) -> Self {
        self.upstream_url = url.into();
        self
    }

    /// Set the listen address
    pub fn with_listen(mut self, host: impl Into<String>, port: u16) -> Self {
        self.listen_host = host.into();
        self.listen_port = port;
        self
    }

    /// Set the reconnect delay
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay_ms = saturating_millis(delay);
        self
    }

    /// Set or clear the connect timeout
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout_ms = timeout.map(saturating_millis);
        self
    }

    /// Set CORS enabled/disabled
    pub fn with_cors(mut self, enable: bool) -> Self {
        self.enable_cors = enable;
        self
    }

    /// Set allowed origins for CORS
    pub fn with_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.allowed_origins = origins;
        self
    }
}
