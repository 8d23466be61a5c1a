//! SQLite-backed device registry and power-group aggregator.
//!
//! The registry is constructed once at process start and shared between the
//! control loop and the HTTP surface. Both go through the same connection
//! mutex; no further locking protocol exists between them, so an external
//! edit landing mid-cycle is picked up by the next rebuild rather than
//! serialized against the current one.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::schema::SCHEMA_SQL;
use crate::types::{Device, NewDevice, PowerGroup};
use wattgate_core::{Error, Result};

/// Device registry with derived power-group aggregation.
pub struct SqliteRegistry {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl SqliteRegistry {
    /// Open or create the registry database.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| Error::Database(e.to_string()))?;
            }
        }

        let conn = Connection::open(&db_path).map_err(|e| Error::Database(e.to_string()))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(|e| Error::Database(e.to_string()))?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| Error::Database(format!("Schema init failed: {}", e)))?;

        let registry = Self {
            conn: Mutex::new(conn),
            db_path,
        };

        let count = registry.count_devices()?;
        info!(
            "SqliteRegistry initialized: {} devices, path={}",
            count,
            registry.db_path.display()
        );

        Ok(registry)
    }

    // ---------------------------------------------------------------
    // Device CRUD
    // ---------------------------------------------------------------

    /// Insert a device. Returns the new device ID.
    pub fn add_device(&self, new: &NewDevice) -> Result<i64> {
        let conn = self.conn.lock();
        let id = conn
            .prepare_cached(
                "INSERT INTO devices (addr, port, username, password, model, rated_watts, phase, group_id, online) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0)",
            )
            .map_err(|e| Error::Database(e.to_string()))?
            .insert(params![
                new.addr,
                new.port,
                new.username,
                new.password,
                new.model,
                new.rated_watts,
                new.phase,
                new.group_id,
            ])
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(id)
    }

    /// Replace every editable field of a device. Returns false if absent.
    ///
    /// The online flag is deliberately not editable here; only the control
    /// loop and the bootstrap pass mutate it.
    pub fn update_device(&self, id: i64, new: &NewDevice) -> Result<bool> {
        let conn = self.conn.lock();
        let count = conn
            .execute(
                "UPDATE devices SET addr = ?1, port = ?2, username = ?3, password = ?4, \
                 model = ?5, rated_watts = ?6, phase = ?7, group_id = ?8 WHERE id = ?9",
                params![
                    new.addr,
                    new.port,
                    new.username,
                    new.password,
                    new.model,
                    new.rated_watts,
                    new.phase,
                    new.group_id,
                    id,
                ],
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(count > 0)
    }

    /// Delete a device. Returns false if absent.
    pub fn delete_device(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let count = conn
            .execute("DELETE FROM devices WHERE id = ?1", params![id])
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(count > 0)
    }

    /// Get a device by ID.
    pub fn get_device(&self, id: i64) -> Result<Option<Device>> {
        let conn = self.conn.lock();
        let row = conn
            .prepare_cached("SELECT * FROM devices WHERE id = ?1")
            .map_err(|e| Error::Database(e.to_string()))?
            .query_row(params![id], |row| Ok(Self::row_to_device(row)))
            .optional()
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(row)
    }

    /// Get a device by management address.
    pub fn get_device_by_addr(&self, addr: &str) -> Result<Option<Device>> {
        let conn = self.conn.lock();
        let row = conn
            .prepare_cached("SELECT * FROM devices WHERE addr = ?1")
            .map_err(|e| Error::Database(e.to_string()))?
            .query_row(params![addr], |row| Ok(Self::row_to_device(row)))
            .optional()
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(row)
    }

    /// List every device.
    pub fn list_devices(&self) -> Result<Vec<Device>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("SELECT * FROM devices ORDER BY id")
            .map_err(|e| Error::Database(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| Ok(Self::row_to_device(row)))
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// List devices filtered by online flag.
    pub fn list_devices_by_online(&self, online: bool) -> Result<Vec<Device>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("SELECT * FROM devices WHERE online = ?1 ORDER BY id")
            .map_err(|e| Error::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params![online], |row| Ok(Self::row_to_device(row)))
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Set the online flag for the device at `addr`. Returns false if absent.
    pub fn set_online(&self, addr: &str, online: bool) -> Result<bool> {
        let conn = self.conn.lock();
        let count = conn
            .execute(
                "UPDATE devices SET online = ?1 WHERE addr = ?2",
                params![online, addr],
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(count > 0)
    }

    /// Force every device offline. Returns the number of rows touched.
    pub fn set_all_offline(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count = conn
            .execute("UPDATE devices SET online = 0", [])
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(count)
    }

    /// Count total devices.
    pub fn count_devices(&self) -> Result<i64> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM devices", [], |row| row.get(0))
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(count)
    }

    /// Sum of rated watts of devices currently marked online.
    pub fn active_watts(&self) -> Result<i64> {
        let conn = self.conn.lock();
        let total: i64 = conn
            .query_row(
                "SELECT COALESCE(SUM(rated_watts), 0) FROM devices WHERE online = 1",
                [],
                |row| row.get(0),
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(total)
    }

    // ---------------------------------------------------------------
    // Power groups (derived, rebuilt every cycle)
    // ---------------------------------------------------------------

    /// Clear and re-derive the power_groups table from the device rows.
    ///
    /// A group is classified online when any member is online. Returns the
    /// number of groups derived.
    pub fn rebuild_groups(&self) -> Result<usize> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM power_groups", [])
            .map_err(|e| Error::Database(e.to_string()))?;
        let count = conn
            .execute(
                "INSERT INTO power_groups (id, total_watts, online) \
                 SELECT group_id, SUM(rated_watts), MAX(online) FROM devices GROUP BY group_id",
                [],
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        debug!("Rebuilt {} power groups", count);
        Ok(count)
    }

    /// List every derived power group.
    pub fn list_groups(&self) -> Result<Vec<PowerGroup>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("SELECT * FROM power_groups ORDER BY id")
            .map_err(|e| Error::Database(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| Ok(Self::row_to_group(row)))
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// List derived power groups filtered by online classification.
    pub fn list_groups_by_online(&self, online: bool) -> Result<Vec<PowerGroup>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("SELECT * FROM power_groups WHERE online = ?1 ORDER BY id")
            .map_err(|e| Error::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params![online], |row| Ok(Self::row_to_group(row)))
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Member devices of a group.
    pub fn group_members(&self, group_id: i64) -> Result<Vec<Device>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("SELECT * FROM devices WHERE group_id = ?1 ORDER BY id")
            .map_err(|e| Error::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params![group_id], |row| Ok(Self::row_to_device(row)))
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Aggregated total of a derived group, if present.
    pub fn group_total(&self, group_id: i64) -> Result<Option<i64>> {
        let conn = self.conn.lock();
        let total = conn
            .prepare_cached("SELECT total_watts FROM power_groups WHERE id = ?1")
            .map_err(|e| Error::Database(e.to_string()))?
            .query_row(params![group_id], |row| row.get(0))
            .optional()
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(total)
    }

    // ---------------------------------------------------------------
    // Row mappers
    // ---------------------------------------------------------------

    fn row_to_device(row: &rusqlite::Row<'_>) -> Device {
        Device {
            id: row.get("id").unwrap_or(0),
            addr: row.get("addr").unwrap_or_default(),
            port: row.get::<_, i64>("port").unwrap_or(80) as u16,
            username: row.get("username").unwrap_or_default(),
            password: row.get("password").unwrap_or_default(),
            model: row.get("model").unwrap_or_default(),
            rated_watts: row.get("rated_watts").unwrap_or(0),
            phase: row.get("phase").unwrap_or_default(),
            group_id: row.get("group_id").unwrap_or(0),
            online: row.get("online").unwrap_or(false),
        }
    }

    fn row_to_group(row: &rusqlite::Row<'_>) -> PowerGroup {
        PowerGroup {
            id: row.get("id").unwrap_or(0),
            total_watts: row.get("total_watts").unwrap_or(0),
            online: row.get("online").unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_registry() -> (SqliteRegistry, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let registry = SqliteRegistry::open(dir.path().join("test.db")).unwrap();
        (registry, dir)
    }

    fn device(addr: &str, watts: i64, group_id: i64) -> NewDevice {
        NewDevice {
            addr: addr.into(),
            port: 8080,
            username: "admin".into(),
            password: "admin".into(),
            model: "DM-T1".into(),
            rated_watts: watts,
            phase: "L1".into(),
            group_id,
        }
    }

    #[test]
    fn device_crud_roundtrip() {
        let (registry, _dir) = test_registry();

        let id = registry.add_device(&device("10.0.0.1", 1000, 1)).unwrap();
        assert!(id > 0);

        let fetched = registry.get_device(id).unwrap().unwrap();
        assert_eq!(fetched.addr, "10.0.0.1");
        assert_eq!(fetched.rated_watts, 1000);
        assert!(!fetched.online);

        let mut updated = device("10.0.0.1", 1400, 2);
        updated.phase = "L3".into();
        assert!(registry.update_device(id, &updated).unwrap());
        let fetched = registry.get_device(id).unwrap().unwrap();
        assert_eq!(fetched.rated_watts, 1400);
        assert_eq!(fetched.group_id, 2);
        assert_eq!(fetched.phase, "L3");

        assert!(registry.delete_device(id).unwrap());
        assert!(registry.get_device(id).unwrap().is_none());
        assert!(!registry.delete_device(id).unwrap());
    }

    #[test]
    fn online_flag_and_active_watts() {
        let (registry, _dir) = test_registry();
        registry.add_device(&device("10.0.0.1", 1000, 1)).unwrap();
        registry.add_device(&device("10.0.0.2", 1500, 1)).unwrap();

        assert_eq!(registry.active_watts().unwrap(), 0);

        assert!(registry.set_online("10.0.0.1", true).unwrap());
        assert_eq!(registry.active_watts().unwrap(), 1000);
        assert_eq!(registry.list_devices_by_online(true).unwrap().len(), 1);

        assert!(registry.set_online("10.0.0.2", true).unwrap());
        assert_eq!(registry.active_watts().unwrap(), 2500);

        assert_eq!(registry.set_all_offline().unwrap(), 2);
        assert_eq!(registry.active_watts().unwrap(), 0);

        assert!(!registry.set_online("10.9.9.9", true).unwrap());
    }

    #[test]
    fn rebuild_totals_match_member_sums() {
        let (registry, _dir) = test_registry();
        registry.add_device(&device("10.0.0.1", 1000, 1)).unwrap();
        registry.add_device(&device("10.0.0.2", 1000, 1)).unwrap();
        registry.add_device(&device("10.0.0.3", 500, 2)).unwrap();

        assert_eq!(registry.rebuild_groups().unwrap(), 2);

        for group in registry.list_groups().unwrap() {
            let member_sum: i64 = registry
                .group_members(group.id)
                .unwrap()
                .iter()
                .map(|d| d.rated_watts)
                .sum();
            assert_eq!(group.total_watts, member_sum);
        }
        assert_eq!(registry.group_total(1).unwrap(), Some(2000));
        assert_eq!(registry.group_total(2).unwrap(), Some(500));
    }

    #[test]
    fn rebuild_reflects_external_edits() {
        let (registry, _dir) = test_registry();
        let id = registry.add_device(&device("10.0.0.1", 1000, 1)).unwrap();
        registry.rebuild_groups().unwrap();
        assert_eq!(registry.group_total(1).unwrap(), Some(1000));

        // Simulates a CRUD edit between cycles: next rebuild picks it up.
        registry.update_device(id, &device("10.0.0.1", 1800, 1)).unwrap();
        registry.rebuild_groups().unwrap();
        assert_eq!(registry.group_total(1).unwrap(), Some(1800));
    }

    #[test]
    fn group_online_when_any_member_online() {
        let (registry, _dir) = test_registry();
        registry.add_device(&device("10.0.0.1", 1000, 1)).unwrap();
        registry.add_device(&device("10.0.0.2", 1000, 1)).unwrap();
        registry.add_device(&device("10.0.0.3", 500, 2)).unwrap();

        registry.set_online("10.0.0.2", true).unwrap();
        registry.rebuild_groups().unwrap();

        let online = registry.list_groups_by_online(true).unwrap();
        assert_eq!(online.len(), 1);
        assert_eq!(online[0].id, 1);

        let offline = registry.list_groups_by_online(false).unwrap();
        assert_eq!(offline.len(), 1);
        assert_eq!(offline[0].id, 2);
    }

    #[test]
    fn groups_are_ephemeral() {
        let (registry, _dir) = test_registry();
        registry.add_device(&device("10.0.0.1", 1000, 7)).unwrap();
        registry.rebuild_groups().unwrap();
        assert_eq!(registry.list_groups().unwrap().len(), 1);

        let id = registry.get_device_by_addr("10.0.0.1").unwrap().unwrap().id;
        registry.delete_device(id).unwrap();
        registry.rebuild_groups().unwrap();
        assert!(registry.list_groups().unwrap().is_empty());
        assert_eq!(registry.group_total(7).unwrap(), None);
    }
}
