use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Counters updated by the upstream loop and the hub, read by the status API.
#[derive(Debug, Default)]
pub struct RelayStats {
    samples_relayed: AtomicU64,
    decode_failures: AtomicU64,
    upstream_connects: AtomicU64,
    upstream_connected: AtomicBool,
}

/// Point-in-time copy of [`RelayStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub samples_relayed: u64,
    pub decode_failures: u64,
    pub upstream_connects: u64,
    pub upstream_connected: bool,
}

impl RelayStats {
    pub fn record_sample(&self) {
        self.samples_relayed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Mark the upstream link up (counting the connect) or down
    pub fn set_upstream_connected(&self, connected: bool) {
        if connected {
            self.upstream_connects.fetch_add(1, Ordering::Relaxed);
        }
        self.upstream_connected.store(connected, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            samples_relayed: self.samples_relayed.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            upstream_connects: self.upstream_connects.load(Ordering::Relaxed),
            upstream_connected: self.upstream_connected.load(Ordering::Relaxed),
        }
    }
}
