//! Tally Web Server
//!
//! HTTP API and WebSocket streams for counters, with tower middleware for
//! CORS, tracing, and compression.

#![forbid(unsafe_code)]
#![forbid(clippy::unwrap_used)]
#![forbid(clippy::panic)]
#![deny(clippy::expect_used)]

use axum::{Router, http::Method};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

pub mod error;
pub mod routes;
pub mod server;
mod state;

pub use error::{AppError, ErrorResponse};
pub use server::run_server;
pub use state::AppState;

/// Web server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to (e.g., "127.0.0.1:3000")
    pub bind_address: String,
    /// Allowed CORS origin, or "*" for any
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:3000".to_string(),
            cors_origin: "*".to_string(),
        }
    }
}

/// Create the application with middleware.
///
/// # Errors
///
/// Returns an error if the CORS origin is not a valid header value.
pub fn create_app(config: &ServerConfig, state: AppState) -> Result<Router, Error> {
    info!("Creating router with CORS origin: {}", config.cors_origin);

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);
    let cors = if config.cors_origin == "*" {
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(config.cors_origin.parse::<::axum::http::HeaderValue>()?)
    };

    let app = routes::create_router().with_state(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CompressionLayer::new())
            .layer(cors),
    );

    Ok(app)
}

/// Web server errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid header value
    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] ::axum::http::header::InvalidHeaderValue),

    /// Invalid bind address
    #[error("Invalid bind address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
