//! Axum HTTP server

use axum::http::{header, HeaderValue, Method};
use axum::{
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::time::Instant;
use tower_http::cors::{Any, CorsLayer};

use beatrelay_core::RelayConfig;

use super::routes::build_router;
use super::websocket::ws_handler;
use crate::{error::ControlError, HubHandle, RelayStats, Result};

/// Application state shared across all requests
#[derive(Clone)]
pub struct AppState {
    pub hub: HubHandle,
    pub stats: Arc<RelayStats>,
    pub started_at: Instant,
    /// Outbound queue length for each new subscriber
    pub subscriber_queue: usize,
}

impl AppState {
    pub fn new(hub: HubHandle, stats: Arc<RelayStats>, subscriber_queue: usize) -> Self {
        Self {
            hub,
            stats,
            started_at: Instant::now(),
            subscriber_queue,
        }
    }
}

/// Build the full application: subscriber WebSocket, status API and layers
pub fn build_app(config: &RelayConfig, state: AppState) -> Result<Router> {
    let app = build_router()
        .route("/", get(ws_handler))
        .route("/ws", get(ws_handler))
        .layer(middleware::from_fn(security_headers))
        .with_state(state);

    if !config.enable_cors {
        return Ok(app);
    }

    let cors_layer = CorsLayer::new()
        .allow_methods([Method::GET])
        .allow_headers([header::CONTENT_TYPE]);

    if config.allowed_origins.iter().any(|o| o == "*") || config.allowed_origins.is_empty() {
        return Ok(app.layer(cors_layer.allow_origin(Any)));
    }

    let origins: Result<Vec<HeaderValue>> = config
        .allowed_origins
        .iter()
        .map(|o| {
            o.parse::<HeaderValue>()
                .map_err(|e| ControlError::Http(format!("Invalid origin header: {}", e)))
        })
        .collect();

    Ok(app.layer(cors_layer.allow_origin(origins?)))
}

/// Bound subscriber listener
pub struct RelayServer {
    listener: TcpListener,
    app: Router,
}

impl RelayServer {
    /// Bind the listener. Failing to bind is fatal for the relay.
    pub async fn bind(config: &RelayConfig, hub: HubHandle, stats: Arc<RelayStats>) -> Result<Self> {
        let addr = config.listen_addr()?;
        let state = AppState::new(hub, stats, config.subscriber_queue);
        let app = build_app(config, state)?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ControlError::Http(format!("Failed to bind {}: {}", addr, e)))?;

        tracing::info!(
            "Relay listening on ws://{} (accessible from network)",
            listener.local_addr()?
        );

        Ok(Self { listener, app })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve subscribers until the task is dropped
    pub async fn serve(self) -> Result<()> {
        let make_service = self.app.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(self.listener, make_service)
            .await
            .map_err(|e| ControlError::Http(format!("Server error: {}", e)))?;

        Ok(())
    }

    /// Spawn the server in a background task
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.serve().await })
    }
}

/// Security headers middleware
async fn security_headers(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("no-referrer"),
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spawn_hub;
    use axum::body::Body;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let stats = Arc::new(RelayStats::default());
        let (hub, _task) = spawn_hub(8, stats.clone());
        AppState::new(hub, stats, 8)
    }

    #[tokio::test]
    async fn test_status_route_with_security_headers() {
        let app = build_app(&RelayConfig::default(), test_state()).unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(
            headers
                .get("X-Content-Type-Options")
                .and_then(|h| h.to_str().ok()),
            Some("nosniff")
        );
        assert_eq!(
            headers.get("X-Frame-Options").and_then(|h| h.to_str().ok()),
            Some("DENY")
        );
        assert_eq!(
            headers.get("Referrer-Policy").and_then(|h| h.to_str().ok()),
            Some("no-referrer")
        );

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["subscribers"], 0);
    }

    #[tokio::test]
    async fn test_cors_specific_origin() {
        let config = RelayConfig::default()
            .with_allowed_origins(vec!["http://kiosk.local:3000".to_string()]);
        let app = build_app(&config, test_state()).unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/status")
                    .header(header::ORIGIN, "http://kiosk.local:3000")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .and_then(|h| h.to_str().ok()),
            Some("http://kiosk.local:3000")
        );
    }

    #[tokio::test]
    async fn test_cors_invalid_origin_rejected() {
        let config = RelayConfig::default().with_allowed_origins(vec!["bad\norigin".to_string()]);
        assert!(build_app(&config, test_state()).is_err());
    }

    #[tokio::test]
    async fn test_bind_failure_is_error() {
        let stats = Arc::new(RelayStats::default());
        let (hub, _task) = spawn_hub(8, stats.clone());

        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();
        let config = RelayConfig::default().with_listen("127.0.0.1", port);

        let result = RelayServer::bind(&config, hub, stats).await;
        assert!(matches!(result, Err(ControlError::Http(_))));
    }
}
