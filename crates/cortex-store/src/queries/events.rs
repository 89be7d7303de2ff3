use anyhow::Result;
use rusqlite::{OptionalExtension, params};

use crate::db::{Store, UpsertOutcome};
use crate::records::EventRecord;

impl Store {
    /// Upsert-and-classify an event keyed by `(source_adapter, source_id)`.
    ///
    /// The insert is tried first; when the row already exists, a
    /// conditional update fires only if any mutable column actually
    /// differs, so unchanged re-syncs report `Unchanged`.
    pub fn upsert_event(&self, rec: &EventRecord) -> Result<UpsertOutcome> {
        let now = cortex_types::now_ts();

        let mut insert = self.conn().prepare_cached(
            "INSERT OR IGNORE INTO events
             (id, timestamp, channel, content_types, content, direction,
              thread_id, reply_to, source_adapter, source_id, metadata_json,
              created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)",
        )?;
        let inserted = insert.execute(params![
            rec.id,
            rec.timestamp,
            rec.channel,
            rec.content_types,
            rec.content,
            rec.direction,
            rec.thread_id,
            rec.reply_to,
            rec.source_adapter,
            rec.source_id,
            rec.metadata_json,
            now,
        ])?;
        if inserted == 1 {
            return Ok(UpsertOutcome::Created);
        }

        let mut update = self.conn().prepare_cached(
            "UPDATE events SET
                 timestamp = ?1, channel = ?2, content_types = ?3,
                 content = ?4, direction = ?5, thread_id = ?6,
                 reply_to = ?7, metadata_json = ?8, updated_at = ?9
             WHERE source_adapter = ?10 AND source_id = ?11
               AND (timestamp IS NOT ?1 OR channel IS NOT ?2
                    OR content_types IS NOT ?3 OR content IS NOT ?4
                    OR direction IS NOT ?5 OR thread_id IS NOT ?6
                    OR reply_to IS NOT ?7 OR metadata_json IS NOT ?8)",
        )?;
        let updated = update.execute(params![
            rec.timestamp,
            rec.channel,
            rec.content_types,
            rec.content,
            rec.direction,
            rec.thread_id,
            rec.reply_to,
            rec.metadata_json,
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

    /// Resolve the stored event id for a `(source_adapter, source_id)` pair.
    pub fn event_id_for_source(
        &self,
        source_adapter: &str,
        source_id: &str,
    ) -> Result<Option<String>> {
        let mut stmt = self.conn().prepare_cached(
            "SELECT id FROM events WHERE source_adapter = ?1 AND source_id = ?2",
        )?;
        Ok(stmt
            .query_row(params![source_adapter, source_id], |row| row.get(0))
            .optional()?)
    }

    pub fn get_event(&self, id: &str) -> Result<Option<EventRecord>> {
        let mut stmt = self.conn().prepare_cached(
            "SELECT id, timestamp, channel, content_types, content, direction,
                    thread_id, reply_to, source_adapter, source_id, metadata_json
             FROM events WHERE id = ?1",
        )?;
        Ok(stmt
            .query_row([id], |row| {
                Ok(EventRecord {
                    id: row.get(0)?,
                    timestamp: row.get(1)?,
                    channel: row.get(2)?,
                    content_types: row.get(3)?,
                    content: row.get(4)?,
                    direction: row.get(5)?,
                    thread_id: row.get(6)?,
                    reply_to: row.get(7)?,
                    source_adapter: row.get(8)?,
                    source_id: row.get(9)?,
                    metadata_json: row.get(10)?,
                })
            })
            .optional()?)
    }

    pub fn count_events(&self, source_adapter: &str) -> Result<usize> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM events WHERE source_adapter = ?1",
            [source_adapter],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> EventRecord {
        EventRecord {
            id: "imessage:G1".to_string(),
            timestamp: 1_700_000_000,
            channel: "imessage".to_string(),
            content_types: r#"["text"]"#.to_string(),
            content: "hi".to_string(),
            direction: "sent".to_string(),
            thread_id: None,
            reply_to: None,
            source_adapter: "imessage".to_string(),
            source_id: "G1".to_string(),
            metadata_json: None,
        }
    }

    #[test]
    fn test_upsert_classifies_created_then_unchanged() {
        let store = Store::open_in_memory().unwrap();
        let rec = sample_event();

        assert_eq!(store.upsert_event(&rec).unwrap(), UpsertOutcome::Created);
        assert_eq!(store.upsert_event(&rec).unwrap(), UpsertOutcome::Unchanged);
    }

    #[test]
    fn test_upsert_classifies_updated_on_content_change() {
        let store = Store::open_in_memory().unwrap();
        let mut rec = sample_event();
        store.upsert_event(&rec).unwrap();

        rec.content = "hi (edited)".to_string();
        assert_eq!(store.upsert_event(&rec).unwrap(), UpsertOutcome::Updated);
        assert_eq!(store.upsert_event(&rec).unwrap(), UpsertOutcome::Unchanged);
    }

    #[test]
    fn test_source_pair_is_unique_across_resync() {
        let store = Store::open_in_memory().unwrap();
        let mut rec = sample_event();
        store.upsert_event(&rec).unwrap();

        // Same source pair with a different row id must not create a row.
        rec.id = "different-id".to_string();
        assert_ne!(store.upsert_event(&rec).unwrap(), UpsertOutcome::Created);
        assert_eq!(store.count_events("imessage").unwrap(), 1);
        assert_eq!(
            store.event_id_for_source("imessage", "G1").unwrap().unwrap(),
            "imessage:G1"
        );
    }

    #[test]
    fn test_nullable_columns_round_trip() {
        let store = Store::open_in_memory().unwrap();
        let mut rec = sample_event();
        rec.reply_to = Some("imessage:G0".to_string());
        rec.metadata_json = Some(r#"{"k":1}"#.to_string());
        store.upsert_event(&rec).unwrap();

        let loaded = store.get_event("imessage:G1").unwrap().unwrap();
        assert_eq!(loaded.reply_to.as_deref(), Some("imessage:G0"));
        assert_eq!(loaded.metadata_json.as_deref(), Some(r#"{"k":1}"#));
        assert_eq!(loaded.thread_id, None);
    }
}
