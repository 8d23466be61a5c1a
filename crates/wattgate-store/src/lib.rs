//! Wattgate Store — SQLite device registry + derived power groups.

pub mod schema;
pub mod sqlite;
pub mod types;

pub use sqlite::SqliteRegistry;
pub use types::*;
