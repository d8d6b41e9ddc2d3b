//! Connection to the audio analysis daemon
//!
//! A single task connects, reads frames until the link drops, waits a fixed
//! delay and connects again, forever. Because attempts only ever start after
//! the previous one has ended, there is never more than one live link.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use beatrelay_core::{AudioSample, CoreError, RelayConfig};
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, info, trace, warn};

use crate::{ControlError, HubHandle, RelayStats, Result};

/// Data frame received from the daemon
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedFrame {
    Text(String),
    Binary(Vec<u8>),
}

/// An open upstream link; the stream ends when the link closes
pub type FeedLink = BoxStream<'static, Result<FeedFrame>>;

/// Opens upstream links
#[async_trait]
pub trait FeedConnector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<FeedLink>;
}

/// WebSocket connector backed by `tokio-tungstenite`
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl FeedConnector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<FeedLink> {
        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| ControlError::WebSocket(e.to_string()))?;

        // Control frames are answered by tungstenite itself
        let link = ws_stream.filter_map(|msg| async move {
            match msg {
                Ok(WsMessage::Text(text)) => Some(Ok(FeedFrame::Text(text))),
                Ok(WsMessage::Binary(data)) => Some(Ok(FeedFrame::Binary(data))),
                Ok(_) => None,
                Err(e) => Some(Err(ControlError::WebSocket(e.to_string()))),
            }
        });

        Ok(link.boxed())
    }
}

/// How a link ended
enum LinkEnd {
    Closed,
    Failed(ControlError),
    HubClosed,
}

/// Keeps one connection to the daemon alive and feeds decoded samples to the
/// hub.
pub struct UpstreamFeedConnection<C = TungsteniteConnector> {
    url: String,
    reconnect_delay: Duration,
    connect_timeout: Option<Duration>,
    connector: C,
    hub: HubHandle,
    stats: Arc<RelayStats>,
}

impl UpstreamFeedConnection<TungsteniteConnector> {
    pub fn new(config: &RelayConfig, hub: HubHandle, stats: Arc<RelayStats>) -> Self {
        Self {
            url: config.upstream_url.clone(),
            reconnect_delay: config.reconnect_delay(),
            connect_timeout: config.connect_timeout(),
            connector: TungsteniteConnector,
            hub,
            stats,
        }
    }
}

impl<C: FeedConnector> UpstreamFeedConnection<C> {
    /// Replace the connector
    pub fn with_connector<D: FeedConnector>(self, connector: D) -> UpstreamFeedConnection<D> {
        UpstreamFeedConnection {
            url: self.url,
            reconnect_delay: self.reconnect_delay,
            connect_timeout: self.connect_timeout,
            connector,
            hub: self.hub,
            stats: self.stats,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Run the connect/read/retry loop.
    ///
    /// Only returns once the hub has shut down; upstream failures are retried
    /// after the fixed reconnect delay with no attempt limit.
    pub async fn run(self) -> Result<()> {
        info!("Connecting to audio daemon at {}", self.url);

        loop {
            match self.connect().await {
                Ok(link) => {
                    info!("Connected to audio daemon at {}", self.url);
                    self.stats.set_upstream_connected(true);
                    let end = self.pump(link).await;
                    self.stats.set_upstream_connected(false);

                    match end {
                        LinkEnd::Closed => warn!(
                            "Disconnected from audio daemon, reconnecting in {:?}",
                            self.reconnect_delay
                        ),
                        LinkEnd::Failed(e) => warn!(
                            "Audio daemon connection error: {}, reconnecting in {:?}",
                            e, self.reconnect_delay
                        ),
                        LinkEnd::HubClosed => {
                            debug!("Hub closed, stopping upstream loop");
                            return Err(ControlError::HubClosed);
                        }
                    }
                }
                Err(e) => warn!(
                    "Failed to connect to audio daemon: {}, retrying in {:?}",
                    e, self.reconnect_delay
                ),
            }

            tokio::time::sleep(self.reconnect_delay).await;
        }
    }

    async fn connect(&self) -> Result<FeedLink> {
        let attempt = self.connector.connect(&self.url);
        match self.connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, attempt)
                .await
                .map_err(|_| ControlError::ConnectTimeout(timeout))?,
            None => attempt.await,
        }
    }

    async fn pump(&self, mut link: FeedLink) -> LinkEnd {
        while let Some(frame) = link.next().await {
            let decoded = match frame {
                Ok(FeedFrame::Text(text)) => AudioSample::decode(&text),
                Ok(FeedFrame::Binary(data)) => Err(CoreError::InvalidMessage(format!(
                    "binary frame ({} bytes)",
                    data.len()
                ))),
                Err(e) => return LinkEnd::Failed(e),
            };

            match decoded {
                Ok(sample) => {
                    trace!(?sample, "Decoded audio sample");
                    if self.hub.publish(sample).await.is_err() {
                        return LinkEnd::HubClosed;
                    }
                }
                Err(e) => {
                    self.stats.record_decode_failure();
                    warn!("Dropping malformed audio frame: {}", e);
                }
            }
        }

        LinkEnd::Closed
    }
}
