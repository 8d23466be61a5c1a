//! Data types for devices and derived power groups.

use serde::{Deserialize, Serialize};

/// A device row from the database.
///
/// `online` is the recorded state driven by the control loop; it can lag
/// physical reality when a restart RPC fails after the flag was written.
#[derive(Debug, Clone, Serialize)]
pub struct Device {
    pub id: i64,
    /// Management IP of the device.
    pub addr: String,
    pub port: u16,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    /// Vendor model label, informational only.
    pub model: String,
    /// Rated power draw in watts.
    pub rated_watts: i64,
    /// Electrical phase label (e.g. "L1").
    pub phase: String,
    /// Power group this device is admitted/evicted with.
    pub group_id: i64,
    pub online: bool,
}

/// Fields for creating or replacing a device record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDevice {
    pub addr: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub model: String,
    pub rated_watts: i64,
    pub phase: String,
    pub group_id: i64,
}

/// A derived power group: rebuilt from scratch every cycle.
///
/// `online` is true when any member device is online. A group whose members
/// disagree is a transient condition the loop tolerates until the next
/// rebuild.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerGroup {
    pub id: i64,
    pub total_watts: i64,
    pub online: bool,
}
