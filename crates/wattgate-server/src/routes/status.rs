//! Fleet status and power-group routes.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/status", get(get_status))
        .route("/groups", get(get_groups))
}

/// GET /api/status — registry rows plus live (or cached) miner summaries,
/// fanned out over the bounded worker pool.
async fn get_status(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let statuses = state.status.fleet_status().await;
    Json(serde_json::json!(statuses))
}

/// GET /api/groups — the derived power groups as of the last rebuild.
async fn get_groups(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.registry.list_groups() {
        Ok(groups) => (StatusCode::OK, Json(serde_json::json!(groups))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": e.to_string()})),
        ),
    }
}
