use anyhow::Result;
use rusqlite::{OptionalExtension, params};

use crate::db::{Store, UpsertOutcome};
use crate::records::ThreadRecord;

impl Store {
    /// Upsert-and-classify a thread. A later sync may refine the name but
    /// never erases one: a NULL incoming name keeps the stored name.
    pub fn upsert_thread(&self, rec: &ThreadRecord) -> Result<UpsertOutcome> {
        let now = cortex_types::now_ts();

        let mut insert = self.conn().prepare_cached(
            "INSERT OR IGNORE INTO threads
             (id, channel, name, source_adapter, source_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        )?;
        let inserted = insert.execute(params![
            rec.id,
            rec.channel,
            rec.name,
            rec.source_adapter,
            rec.source_id,
            now,
        ])?;
        if inserted == 1 {
            return Ok(UpsertOutcome::Created);
        }

        let mut update = self.conn().prepare_cached(
            "UPDATE threads SET
                 channel = ?1, name = COALESCE(?2, name), updated_at = ?3
             WHERE source_adapter = ?4 AND source_id = ?5
               AND (channel IS NOT ?1 OR COALESCE(?2, name) IS NOT name)",
        )?;
        let updated = update.execute(params![
            rec.channel,
            rec.name,
            now,
            rec.source_adapter,
            rec.source_id,
        ])?;

        if updated == 1 {
            Ok(UpsertOutcome::Updated)
        } else {
            Ok(UpsertOutcome::Unchanged)
        }
    }

    pub fn get_thread(&self, id: &str) -> Result<Option<ThreadRecord>> {
        let mut stmt = self.conn().prepare_cached(
            "SELECT id, channel, name, source_adapter, source_id FROM threads WHERE id = ?1",
        )?;
        Ok(stmt
            .query_row([id], |row| {
                Ok(ThreadRecord {
                    id: row.get(0)?,
                    channel: row.get(1)?,
                    name: row.get(2)?,
                    source_adapter: row.get(3)?,
                    source_id: row.get(4)?,
                })
            })
            .optional()?)
    }
}
