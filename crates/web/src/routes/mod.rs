//! HTTP routes
//!
//! ## Route Structure
//!
//! - `GET /api/health` - Health check with live instance count
//! - `GET /api/counter/{key}` - Current count, created at 0 on first access
//! - `POST /api/counter/{key}/increment` - Add one and fan out
//! - `POST /api/counter/{key}/decrement` - Subtract one and fan out
//! - `GET /counter/{key}/ws` - WebSocket stream of count updates
//!
//! Errors are returned as RFC 7807 Problem Details.

use super::state::AppState;
use super::error::Result;
use axum::{
    Router,
    routing::{get, post},
};
use tally_core::CounterKey;

pub mod counter;
pub mod health;
pub mod websocket;

/// Create the application router.
///
/// # Example
///
/// ```ignore
/// use tally_web::{routes, AppState};
///
/// let state = AppState::new(router);
/// let app = routes::create_router().with_state(state);
/// ```
pub fn create_router() -> Router<AppState> {
    let api_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/counter/{key}", get(counter::get_count))
        .route("/counter/{key}/increment", post(counter::increment))
        .route("/counter/{key}/decrement", post(counter::decrement));

    Router::new()
        .nest("/api", api_routes)
        .route("/counter/{key}/ws", get(websocket::counter_socket))
}

/// Validate a raw path segment as a counter key.
pub(crate) fn parse_key(raw: &str) -> Result<CounterKey> {
    Ok(CounterKey::new(raw)?)
}
