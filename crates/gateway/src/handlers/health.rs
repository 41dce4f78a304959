//! Health and readiness handlers

use crate::AppState;
use axum::{extract::State, Json};
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: &'static str,
    /// Graph cache store connectivity; caching is optional, so this never
    /// fails readiness
    pub cache_store: bool,
    pub side_cache: bool,
}

/// Liveness probe
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: papergraph_common::VERSION,
    })
}

/// Readiness probe with optional-dependency status
pub async fn ready(State(state): State<AppState>) -> Json<ReadyResponse> {
    Json(ReadyResponse {
        status: "ready",
        cache_store: state.store.is_connected(),
        side_cache: state.side_cache.enabled(),
    })
}
