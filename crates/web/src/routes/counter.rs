//! Counter endpoints: GET /api/counter/{key}, POST .../increment, POST .../decrement

use super::super::error::Result;
use super::super::state::AppState;
use super::parse_key;
use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use tally_core::CounterKey;
use tracing::debug;

/// Count of one key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterResponse {
    pub key: String,
    pub count: i64,
}

impl CounterResponse {
    fn new(key: &CounterKey, count: i64) -> Json<Self> {
        Json(Self {
            key: key.to_string(),
            count,
        })
    }
}

/// GET /api/counter/{key}
pub async fn get_count(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<CounterResponse>> {
    let key = parse_key(&key)?;
    let count = state.router.get_count(&key).await?;
    Ok(CounterResponse::new(&key, count))
}

/// POST /api/counter/{key}/increment
pub async fn increment(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<CounterResponse>> {
    let key = parse_key(&key)?;
    let count = state.router.increment(&key).await?;
    debug!(key = %key, count, "Incremented");
    Ok(CounterResponse::new(&key, count))
}

/// POST /api/counter/{key}/decrement
pub async fn decrement(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<CounterResponse>> {
    let key = parse_key(&key)?;
    let count = state.router.decrement(&key).await?;
    debug!(key = %key, count, "Decremented");
    Ok(CounterResponse::new(&key, count))
}
