//! Subscriber listener
//!
//! Browser dashboards connect with a WebSocket to `/` (or `/ws`) and receive
//! one JSON text frame per audio sample. `GET /api/status` reports relay
//! health.

pub mod handlers;
pub mod routes;
pub mod server;
pub mod websocket;

pub use handlers::{ApiResponse, StatusResponse};
pub use server::{AppState, RelayServer};
