//! Wattgate Feed — the available-power budget client.
//!
//! The feed contract is deliberately infallible: any failure fetching or
//! parsing the budget yields 0 W for the cycle, which sheds load instead of
//! guessing. One attempt per cycle, no retry.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// Source of the externally reported power budget.
pub trait PowerFeed: Send + Sync {
    /// Fetch the available power in watts. Never fails; a broken feed
    /// reports 0.
    fn fetch(&self) -> impl Future<Output = u64> + Send;
}

/// HTTP feed returning JSON `{"success": bool, "power": int}`.
pub struct HttpPowerFeed {
    client: reqwest::Client,
    url: String,
}

impl HttpPowerFeed {
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            url: url.into(),
        }
    }
}

impl PowerFeed for HttpPowerFeed {
    async fn fetch(&self) -> u64 {
        let response = match self.client.get(&self.url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("Power feed unreachable ({}): {}", self.url, e);
                return 0;
            }
        };

        if !response.status().is_success() {
            warn!("Power feed returned HTTP {}", response.status());
            return 0;
        }

        let payload: serde_json::Value = match response.json().await {
            Ok(v) => v,
            Err(e) => {
                warn!("Power feed body is not JSON: {}", e);
                return 0;
            }
        };

        match parse_power_payload(&payload) {
            Some(watts) => {
                debug!("Power feed reports {} W available", watts);
                watts
            }
            None => {
                warn!("Power feed payload rejected: {}", payload);
                0
            }
        }
    }
}

/// Extract a trusted watt value from a feed payload.
///
/// Rejects payloads with a missing or false `success` flag and any
/// negative or non-integer `power` value.
pub fn parse_power_payload(payload: &serde_json::Value) -> Option<u64> {
    if !payload.get("success")?.as_bool()? {
        return None;
    }
    let power = payload.get("power")?.as_i64()?;
    if power < 0 {
        return None;
    }
    Some(power as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_well_formed_payload() {
        let payload = json!({"success": true, "power": 2200});
        assert_eq!(parse_power_payload(&payload), Some(2200));
    }

    #[test]
    fn accepts_zero_power() {
        let payload = json!({"success": true, "power": 0});
        assert_eq!(parse_power_payload(&payload), Some(0));
    }

    #[test]
    fn rejects_declared_failure() {
        let payload = json!({"success": false, "power": 2200});
        assert_eq!(parse_power_payload(&payload), None);
    }

    #[test]
    fn rejects_missing_success() {
        let payload = json!({"power": 2200});
        assert_eq!(parse_power_payload(&payload), None);
    }

    #[test]
    fn rejects_non_bool_success() {
        let payload = json!({"success": "yes", "power": 2200});
        assert_eq!(parse_power_payload(&payload), None);
    }

    #[test]
    fn rejects_negative_power() {
        let payload = json!({"success": true, "power": -500});
        assert_eq!(parse_power_payload(&payload), None);
    }

    #[test]
    fn rejects_missing_or_fractional_power() {
        assert_eq!(parse_power_payload(&json!({"success": true})), None);
        assert_eq!(
            parse_power_payload(&json!({"success": true, "power": 10.5})),
            None
        );
    }

    #[tokio::test]
    async fn unreachable_feed_reports_zero() {
        // Nothing listens on port 1; connection is refused immediately.
        let feed = HttpPowerFeed::new("http://127.0.0.1:1/power.json");
        assert_eq!(feed.fetch().await, 0);
    }
}
