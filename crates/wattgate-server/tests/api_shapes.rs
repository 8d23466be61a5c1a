//! API shape tests — validates that the response shapes the routes emit
//! stay compatible with what feed clients and dashboards consume.

/// `GET /api/power` must serve exactly the shape the feed client parses:
/// `{ success: bool, power: int }` (plus an informational timestamp).
#[test]
fn power_response_shape() {
    let response = serde_json::json!({
        "success": true,
        "time": "2026-08-26T12:00:00+00:00",
        "power": 2200,
    });

    assert!(response["success"].is_boolean());
    assert!(response["power"].is_i64() || response["power"].is_u64());
    assert!(response["time"].is_string());
}

/// Device rows never leak the password field.
#[test]
fn device_response_omits_password() {
    let device = serde_json::json!({
        "id": 1,
        "addr": "10.0.0.1",
        "port": 8080,
        "username": "admin",
        "model": "DM-T1",
        "rated_watts": 1000,
        "phase": "L1",
        "group_id": 1,
        "online": false,
    });

    assert!(device.get("password").is_none());
    assert!(device["addr"].is_string());
    assert!(device["rated_watts"].is_number());
    assert!(device["online"].is_boolean());
}

/// `GET /api/status` entries: registry row plus an optional summary.
#[test]
fn status_response_shape() {
    let status = serde_json::json!({
        "id": 1,
        "addr": "10.0.0.1",
        "port": 8080,
        "model": "DM-T1",
        "rated_watts": 1000,
        "phase": "L1",
        "group_id": 1,
        "online": true,
        "summary": {
            "hashrate_mhs": 44000.5,
            "temperature_c": 71.0,
            "uptime_secs": 3600,
        },
    });

    assert!(status["online"].is_boolean());
    assert!(status["summary"]["hashrate_mhs"].is_number());

    // An unresponsive device reports a null summary, not a missing field.
    let unresponsive = serde_json::json!({"summary": null});
    assert!(unresponsive["summary"].is_null());
}

/// `GET /api/groups` entries mirror the derived power_groups rows.
#[test]
fn group_response_shape() {
    let group = serde_json::json!({
        "id": 1,
        "total_watts": 2000,
        "online": false,
    });

    assert!(group["id"].is_number());
    assert!(group["total_watts"].is_number());
    assert!(group["online"].is_boolean());
}
