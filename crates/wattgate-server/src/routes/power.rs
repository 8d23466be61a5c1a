//! Manual power budget routes.
//!
//! `GET /api/power` serves the same `{"success", "power"}` shape the feed
//! client consumes, so a deployment without an external feed can point
//! `WATTGATE_FEED_URL` at its own API and drive the budget by hand.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/power", get(get_power))
        .route("/power/{watts}", post(set_power))
}

/// GET /api/power — the currently declared budget.
async fn get_power(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let power = *state.manual_power.read();
    Json(serde_json::json!({
        "success": true,
        "time": chrono::Utc::now().to_rfc3339(),
        "power": power,
    }))
}

/// POST /api/power/{watts} — declare the available budget.
async fn set_power(
    State(state): State<Arc<AppState>>,
    Path(watts): Path<u64>,
) -> Json<serde_json::Value> {
    *state.manual_power.write() = watts;
    Json(serde_json::json!({"success": true}))
}
