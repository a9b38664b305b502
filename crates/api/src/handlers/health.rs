//! Operational endpoints: liveness and readiness.

use std::sync::Arc;

use assess_domain::{HealthResponse, ReadyResponse};
use assess_storage::check_connection;
use axum::extract::State;
use axum::Json;

use crate::AppState;

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_s: state.start_time.elapsed().as_secs(),
    })
}

pub async fn ready(State(state): State<Arc<AppState>>) -> Json<ReadyResponse> {
    let database = match check_connection(&state.pool).await {
        Ok(()) => "connected",
        Err(_) => "disconnected",
    };
    Json(ReadyResponse {
        status: if database == "connected" { "ok" } else { "degraded" },
        database,
    })
}
