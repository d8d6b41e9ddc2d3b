//! BeatRelay Control - Upstream Feed and Subscriber Fan-out
//!
//! This crate relays audio feature samples from the analysis daemon to
//! browser dashboards:
//! - **Upstream**: one WebSocket connection to the daemon, kept alive with a
//!   fixed-delay reconnect loop
//! - **Hub**: a single task owning the last known sample and the subscriber
//!   set, fanning every sample out to all subscribers
//! - **Web**: the axum listener accepting subscriber WebSockets plus a small
//!   status endpoint
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use beatrelay_control::{spawn_hub, RelayServer, RelayStats, UpstreamFeedConnection};
//! use beatrelay_core::RelayConfig;
//!
//! # async fn run() -> beatrelay_control::Result<()> {
//! let config = RelayConfig::default();
//! let stats = Arc::new(RelayStats::default());
//! let (hub, _hub_task) = spawn_hub(config.hub_queue, stats.clone());
//!
//! let server = RelayServer::bind(&config, hub.clone(), stats.clone()).await?;
//! tokio::spawn(UpstreamFeedConnection::new(&config, hub, stats).run());
//! server.serve().await
//! # }
//! ```

#![allow(missing_docs)]

/// Error types
pub mod error;
/// Subscriber set, last known sample and fan-out
pub mod hub;
/// Relay counters shared between tasks
pub mod stats;
/// Connection to the audio analysis daemon
pub mod upstream;
/// Subscriber listener and status API
pub mod web;

pub use error::{ControlError, Result};
pub use hub::{
    spawn_hub, subscriber_queue, BroadcastReport, HubHandle, HubSnapshot, Payload,
    SubscriberBroadcastHub, SubscriberId, SubscriberQueue, SubscriberSink,
};
pub use stats::{RelayStats, StatsSnapshot};
pub use upstream::{FeedConnector, FeedFrame, FeedLink, TungsteniteConnector, UpstreamFeedConnection};
pub use web::RelayServer;
