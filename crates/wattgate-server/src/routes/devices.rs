//! Device CRUD routes.
//!
//! This surface shares the registry with the control loop without any
//! cross-process locking protocol; an edit landing mid-cycle takes effect
//! at the next group rebuild, within one cycle.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::state::AppState;
use wattgate_store::NewDevice;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/devices", post(add_device).get(list_devices))
        .route(
            "/devices/{id}",
            get(get_device).put(update_device).delete(delete_device),
        )
}

/// GET /api/devices — every registered device (passwords omitted).
async fn list_devices(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.registry.list_devices() {
        Ok(devices) => (StatusCode::OK, Json(serde_json::json!(devices))),
        Err(e) => internal_error(e),
    }
}

/// POST /api/devices — register a device. New devices start offline.
async fn add_device(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewDevice>,
) -> impl IntoResponse {
    match state.registry.add_device(&req) {
        Ok(id) => (
            StatusCode::CREATED,
            Json(serde_json::json!({"id": id, "status": "added"})),
        ),
        Err(e) => internal_error(e),
    }
}

/// GET /api/devices/{id}
async fn get_device(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    match state.registry.get_device(id) {
        Ok(Some(device)) => (StatusCode::OK, Json(serde_json::json!(device))),
        Ok(None) => not_found(id),
        Err(e) => internal_error(e),
    }
}

/// PUT /api/devices/{id} — full replacement of the editable fields.
async fn update_device(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<NewDevice>,
) -> impl IntoResponse {
    match state.registry.update_device(id, &req) {
        Ok(true) => (
            StatusCode::OK,
            Json(serde_json::json!({"id": id, "status": "updated"})),
        ),
        Ok(false) => not_found(id),
        Err(e) => internal_error(e),
    }
}

/// DELETE /api/devices/{id}
async fn delete_device(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    match state.registry.delete_device(id) {
        Ok(true) => (
            StatusCode::OK,
            Json(serde_json::json!({"id": id, "status": "deleted"})),
        ),
        Ok(false) => not_found(id),
        Err(e) => internal_error(e),
    }
}

fn not_found(id: i64) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({"error": format!("no device with id {}", id)})),
    )
}

fn internal_error(e: wattgate_core::Error) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({"error": e.to_string()})),
    )
}
