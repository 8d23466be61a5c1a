//! Database schema SQL.
//!
//! `devices` is authoritative and persists across restarts. `power_groups`
//! is derived state: it is cleared and rebuilt from `devices` on every
//! control cycle, so nothing here keeps the two in sync incrementally.

pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS devices (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    addr TEXT NOT NULL UNIQUE,
    port INTEGER NOT NULL,
    username TEXT NOT NULL,
    password TEXT NOT NULL,
    model TEXT NOT NULL,
    rated_watts INTEGER NOT NULL,
    phase TEXT NOT NULL,
    group_id INTEGER NOT NULL,
    online INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_devices_group ON devices(group_id);
CREATE INDEX IF NOT EXISTS idx_devices_online ON devices(online);

CREATE TABLE IF NOT EXISTS power_groups (
    id INTEGER PRIMARY KEY,
    total_watts INTEGER NOT NULL,
    online INTEGER NOT NULL
);
"#;
