use std::sync::Arc;

use anyhow::{Context, Result};
use beatrelay_control::{spawn_hub, RelayServer, RelayStats, UpstreamFeedConnection};
use beatrelay_core::RelayConfig;
use tracing::{error, info};

mod logging_setup;

#[tokio::main]
async fn main() -> Result<()> {
    let config = RelayConfig::load().context("Failed to load relay configuration")?;
    let _log_guard = logging_setup::init(&config.log)?;

    info!("BeatRelay {} starting", env!("CARGO_PKG_VERSION"));

    let stats = Arc::new(RelayStats::default());
    let (hub, _hub_task) = spawn_hub(config.hub_queue, stats.clone());

    // Bind failure is fatal, so bind before the upstream loop starts
    let server = RelayServer::bind(&config, hub.clone(), stats.clone())
        .await
        .context("Failed to start subscriber listener")?;

    info!(
        "Attempting to connect to audio daemon on {}...",
        config.upstream_url
    );
    let upstream = tokio::spawn(UpstreamFeedConnection::new(&config, hub, stats).run());

    tokio::select! {
        result = server.serve() => {
            result.context("Subscriber listener failed")?;
        }
        _ = shutdown_signal() => {
            info!("Shutting down relay...");
        }
    }

    upstream.abort();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
