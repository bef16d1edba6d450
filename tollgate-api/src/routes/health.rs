/// Health check endpoint
///
/// ```text
/// GET /health
/// ```
///
/// ```json
/// { "status": "healthy", "version": "0.1.0", "store": "postgres", "counters": "redis" }
/// ```

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::app::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,

    /// `postgres` or `memory`
    pub store: String,

    /// `redis` or `memory`
    pub counters: String,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let backend = |configured: bool, name: &str| {
        if configured { name } else { "memory" }.to_string()
    };

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        store: backend(state.config.database.is_some(), "postgres"),
        counters: backend(state.config.redis.is_some(), "redis"),
    })
}
