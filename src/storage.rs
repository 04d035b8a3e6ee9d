//! Package record storage.
//!
//! The resolution engine only consumes the [`PackageStore`] contract; package
//! identity and lifecycle belong to whoever owns the database. `SqliteStore`
//! is the reference implementation used by the CLI.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

#[cfg(test)]
use mockall::automock;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::version::error::StoreError;

/// One watched package, as stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageRecord {
    /// Unique key.
    pub name: String,
    /// Known-good version the upstream candidates are shaped against.
    pub reference_version: Option<String>,
    /// Last resolved upstream version.
    pub upstream_version: Option<String>,
    /// Upstream location URL.
    pub upstream_url: Option<String>,
    /// Explicit strategy choice; `None` means infer from the URL.
    pub strategy_hint: Option<String>,
    /// Substring / JSON path / selector used by the extraction.
    pub extract_key: Option<String>,
    /// Whether pre-release channels should be considered.
    pub check_test_versions: bool,
}

/// Read/write contract the engine needs. Synchronous, idempotent and safe to
/// call from any worker.
#[cfg_attr(test, automock)]
pub trait PackageStore: Send + Sync {
    fn get_by_name(&self, name: &str) -> Result<Option<PackageRecord>, StoreError>;

    /// Bulk read used by batch resolution to avoid N sequential lookups.
    fn get_many(&self, names: &[String]) -> Result<HashMap<String, PackageRecord>, StoreError>;

    /// Returns the number of affected rows.
    fn update_upstream_version(&self, name: &str, version: &str) -> Result<usize, StoreError>;

    /// Returns the number of affected rows.
    fn update_reference_version(&self, name: &str, version: &str) -> Result<usize, StoreError>;
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new(db_path: &Path) -> Result<Self, StoreError> {
        info!("opening package database at {:?}", db_path);

        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;
        Ok(store)
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn create_schema(&self) -> Result<(), StoreError> {
        debug!("ensuring packages schema");
        let conn = self.lock_conn()?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS packages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                reference_version TEXT,
                upstream_version TEXT,
                upstream_url TEXT,
                strategy_hint TEXT,
                extract_key TEXT,
                check_test_versions INTEGER NOT NULL DEFAULT 0,
                checked_at INTEGER
            )
            "#,
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_packages_name ON packages(name)",
            [],
        )?;
        Ok(())
    }

    /// Insert or replace a record. Used by the CLI and tests; the engine
    /// itself only updates versions.
    pub fn upsert(&self, record: &PackageRecord) -> Result<(), StoreError> {
        let conn = self.lock_conn()?;
        conn.execute(
            r#"
            INSERT INTO packages
                (name, reference_version, upstream_version, upstream_url,
                 strategy_hint, extract_key, check_test_versions)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(name) DO UPDATE SET
                reference_version = excluded.reference_version,
                upstream_version = excluded.upstream_version,
                upstream_url = excluded.upstream_url,
                strategy_hint = excluded.strategy_hint,
                extract_key = excluded.extract_key,
                check_test_versions = excluded.check_test_versions
            "#,
            params![
                record.name,
                record.reference_version,
                record.upstream_version,
                record.upstream_url,
                record.strategy_hint,
                record.extract_key,
                record.check_test_versions as i64,
            ],
        )?;
        Ok(())
    }

    pub fn all_names(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare("SELECT name FROM packages ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<PackageRecord> {
        Ok(PackageRecord {
            name: row.get(0)?,
            reference_version: row.get(1)?,
            upstream_version: row.get(2)?,
            upstream_url: row.get(3)?,
            strategy_hint: row.get(4)?,
            extract_key: row.get(5)?,
            check_test_versions: row.get::<_, i64>(6)? != 0,
        })
    }
}

const RECORD_COLUMNS: &str = "name, reference_version, upstream_version, upstream_url, \
                              strategy_hint, extract_key, check_test_versions";

impl PackageStore for SqliteStore {
    fn get_by_name(&self, name: &str) -> Result<Option<PackageRecord>, StoreError> {
        let conn = self.lock_conn()?;
        let record = conn
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM packages WHERE name = ?1"),
                params![name],
                Self::row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    fn get_many(&self, names: &[String]) -> Result<HashMap<String, PackageRecord>, StoreError> {
        let conn = self.lock_conn()?;
        let mut out = HashMap::with_capacity(names.len());
        let mut stmt =
            conn.prepare(&format!("SELECT {RECORD_COLUMNS} FROM packages WHERE name = ?1"))?;
        for name in names {
            if let Some(record) = stmt
                .query_row(params![name], Self::row_to_record)
                .optional()?
            {
                out.insert(record.name.clone(), record);
            }
        }
        Ok(out)
    }

    fn update_upstream_version(&self, name: &str, version: &str) -> Result<usize, StoreError> {
        let conn = self.lock_conn()?;
        let affected = conn.execute(
            "UPDATE packages SET upstream_version = ?2, checked_at = strftime('%s','now') \
             WHERE name = ?1",
            params![name, version],
        )?;
        debug!("upstream version for {} set to {}", name, version);
        Ok(affected)
    }

    fn update_reference_version(&self, name: &str, version: &str) -> Result<usize, StoreError> {
        let conn = self.lock_conn()?;
        let affected = conn.execute(
            "UPDATE packages SET reference_version = ?2 WHERE name = ?1",
            params![name, version],
        )?;
        Ok(affected)
    }
}
