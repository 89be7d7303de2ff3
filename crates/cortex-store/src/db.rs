use anyhow::{Context, Result};
use rusqlite::{Connection, Transaction};
use std::path::Path;

use crate::schema::SCHEMA;

// NOTE: Store design
//
// Why one writer connection per thread of execution?
// - WAL lets concurrent watchers each hold their own connection; SQLite
//   serializes the writes and readers see consistent snapshots
// - The 5s busy timeout absorbs cross-connection write contention
//
// Why upsert-and-classify instead of a RETURNING upsert?
// - INSERT OR IGNORE + conditional UPDATE avoids write churn when a
//   re-sync carries unchanged rows, and the rows-affected counts give the
//   created/updated split without a racy post-insert SELECT

/// Outcome of an upsert-and-classify write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    Unchanged,
}

impl UpsertOutcome {
    pub fn is_created(&self) -> bool {
        matches!(self, UpsertOutcome::Created)
    }

    pub fn is_updated(&self) -> bool {
        matches!(self, UpsertOutcome::Updated)
    }
}

/// Random primary-key string for rows without a deterministic id scheme.
pub fn new_row_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open store: {}", db_path.display()))?;

        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    pub fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Raw connection access for the identity graph and for tests.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Begin a deferred transaction without requiring `&mut self`.
    /// Callers must not nest transactions.
    pub fn begin(&self) -> Result<Transaction<'_>> {
        Ok(self.conn.unchecked_transaction()?)
    }

    /// Baseline pragmas applied at the start of every sync.
    pub fn apply_sync_pragmas(&self) -> Result<()> {
        self.conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        Ok(())
    }

    /// Speed-over-durability pragmas for full imports. A crash mid-import
    /// may leave the store in a bad state; the remedy is to rerun a full
    /// sync.
    pub fn apply_full_import_pragmas(&self) -> Result<()> {
        self.apply_sync_pragmas()?;
        self.conn.execute_batch(
            "PRAGMA synchronous = OFF;
             PRAGMA temp_store = MEMORY;
             PRAGMA cache_size = -200000;
             PRAGMA mmap_size = 268435456;
             PRAGMA wal_autocheckpoint = 10000;
             PRAGMA defer_foreign_keys = ON;",
        )?;
        Ok(())
    }

    pub fn vacuum(&self) -> Result<()> {
        self.conn.execute("VACUUM", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_initialization_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        store.init_schema().unwrap();
        store.init_schema().unwrap();
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("cortex.db");
        let store = Store::open(&path).unwrap();
        store.apply_sync_pragmas().unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_full_import_pragmas() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = Store::open(&dir.path().join("cortex.db")).unwrap();
        store.apply_full_import_pragmas().unwrap();

        let sync_mode: i64 = store
            .conn()
            .query_row("PRAGMA synchronous", [], |row| row.get(0))
            .unwrap();
        assert_eq!(sync_mode, 0);
    }

    #[test]
    fn test_single_me_enforced() {
        let store = Store::open_in_memory().unwrap();
        store
            .conn()
            .execute(
                "INSERT INTO persons (id, canonical_name, is_me, created_at, updated_at)
                 VALUES ('p1', 'Me', 1, 0, 0)",
                [],
            )
            .unwrap();
        let err = store.conn().execute(
            "INSERT INTO persons (id, canonical_name, is_me, created_at, updated_at)
             VALUES ('p2', 'Also Me', 1, 0, 0)",
            [],
        );
        assert!(err.is_err());
    }
}
