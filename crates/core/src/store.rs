//! SQLite-backed clinic store.
//!
//! Each operation opens its own connection, mirroring the one-request /
//! one-session model of the surrounding server: requests run to completion
//! independently and the database's own transaction isolation is the only
//! cross-request coordination. Multi-statement writes run inside
//! `Connection::transaction()`, so a failed write rolls back as a unit.

use crate::config::CoreConfig;
use crate::ClinicResult;
use rusqlite::Connection;
use std::sync::Arc;

/// Handle to the clinic database.
///
/// Cheap to clone; holds only the resolved configuration. Store operations
/// live in the `repositories` modules as `impl Store` blocks grouped by
/// entity.
#[derive(Clone, Debug)]
pub struct Store {
    cfg: Arc<CoreConfig>,
}

impl Store {
    /// Opens the store and applies the schema.
    ///
    /// Creating tables is idempotent; an existing database is left as-is
    /// apart from any tables it is missing.
    pub fn open(cfg: Arc<CoreConfig>) -> ClinicResult<Self> {
        let store = Self { cfg };
        let conn = store.conn()?;
        conn.execute_batch(include_str!("schema.sql"))?;
        Ok(store)
    }

    pub fn config(&self) -> &CoreConfig {
        &self.cfg
    }

    /// Opens a connection with foreign keys enforced.
    pub(crate) fn conn(&self) -> ClinicResult<Connection> {
        let conn = Connection::open(self.cfg.database_path())?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn open_creates_schema_idempotently() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let cfg = Arc::new(
            CoreConfig::new(temp_dir.path().join("clinic.db")).expect("config should build"),
        );

        let store = Store::open(cfg.clone()).expect("first open should succeed");
        let again = Store::open(cfg).expect("reopen should succeed");

        let conn = again.conn().expect("conn should open");
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN \
                 ('staff_users', 'patients', 'clinics', 'consultations', 'vital_signs', \
                  'role_change_audit', 'clinic_assignment_audit', 'verification_codes')",
                [],
                |row| row.get(0),
            )
            .expect("table count query should succeed");
        assert_eq!(tables, 8, "all tables should exist");
        drop(store);
    }
}
