use anyhow::Result;
use rusqlite::params;

use crate::db::{Store, UpsertOutcome};
use crate::records::AttachmentRecord;

impl Store {
    /// Upsert-and-classify an attachment keyed by `(event_id, source_id)`.
    ///
    /// Rows without a source id cannot be re-identified across syncs and
    /// are inserted as-is; adapters are expected to carry a stable source
    /// id wherever the upstream provides one.
    pub fn upsert_attachment(&self, rec: &AttachmentRecord) -> Result<UpsertOutcome> {
        let now = cortex_types::now_ts();

        let mut insert = self.conn().prepare_cached(
            "INSERT OR IGNORE INTO attachments
             (id, event_id, filename, mime_type, size, media_type,
              storage_uri, storage_type, content_hash, source_id,
              metadata_json, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)",
        )?;
        let inserted = insert.execute(params![
            rec.id,
            rec.event_id,
            rec.filename,
            rec.mime_type,
            rec.size,
            rec.media_type,
            rec.storage_uri,
            rec.storage_type,
            rec.content_hash,
            rec.source_id,
            rec.metadata_json,
            now,
        ])?;
        if inserted == 1 {
            return Ok(UpsertOutcome::Created);
        }

        let mut update = self.conn().prepare_cached(
            "UPDATE attachments SET
                 filename = ?1, mime_type = ?2, size = ?3, media_type = ?4,
                 storage_uri = ?5, storage_type = ?6, content_hash = ?7,
                 metadata_json = ?8, updated_at = ?9
             WHERE event_id = ?10 AND source_id = ?11
               AND (filename IS NOT ?1 OR mime_type IS NOT ?2
                    OR size IS NOT ?3 OR media_type IS NOT ?4
                    OR storage_uri IS NOT ?5 OR storage_type IS NOT ?6
                    OR content_hash IS NOT ?7 OR metadata_json IS NOT ?8)",
        )?;
        let updated = update.execute(params![
            rec.filename,
            rec.mime_type,
            rec.size,
            rec.media_type,
            rec.storage_uri,
            rec.storage_type,
            rec.content_hash,
            rec.metadata_json,
            now,
            rec.event_id,
            rec.source_id,
        ])?;

        if updated == 1 {
            Ok(UpsertOutcome::Updated)
        } else {
            Ok(UpsertOutcome::Unchanged)
        }
    }

    pub fn attachments_for_event(&self, event_id: &str) -> Result<Vec<AttachmentRecord>> {
        let mut stmt = self.conn().prepare_cached(
            "SELECT id, event_id, filename, mime_type, size, media_type,
                    storage_uri, storage_type, content_hash, source_id, metadata_json
             FROM attachments WHERE event_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map([event_id], |row| {
                Ok(AttachmentRecord {
                    id: row.get(0)?,
                    event_id: row.get(1)?,
                    filename: row.get(2)?,
                    mime_type: row.get(3)?,
                    size: row.get(4)?,
                    media_type: row.get(5)?,
                    storage_uri: row.get(6)?,
                    storage_type: row.get(7)?,
                    content_hash: row.get(8)?,
                    source_id: row.get(9)?,
                    metadata_json: row.get(10)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::EventRecord;

    fn seed_event(store: &Store) {
        store
            .upsert_event(&EventRecord {
                id: "imessage:G1".to_string(),
                timestamp: 1_700_000_000,
                channel: "imessage".to_string(),
                content_types: r#"["text","attachment"]"#.to_string(),
                content: "hi".to_string(),
                direction: "sent".to_string(),
                thread_id: None,
                reply_to: None,
                source_adapter: "imessage".to_string(),
                source_id: "G1".to_string(),
                metadata_json: None,
            })
            .unwrap();
    }

    #[test]
    fn test_attachment_resync_is_stable() {
        let store = Store::open_in_memory().unwrap();
        seed_event(&store);

        let rec = AttachmentRecord {
            id: crate::new_row_id(),
            event_id: "imessage:G1".to_string(),
            filename: Some("IMG_0001.jpeg".to_string()),
            mime_type: Some("image/jpeg".to_string()),
            size: Some(120_000),
            media_type: "image".to_string(),
            storage_uri: Some("~/Library/Messages/Attachments/ab/IMG_0001.jpeg".to_string()),
            storage_type: Some("file".to_string()),
            content_hash: None,
            source_id: Some("att-guid-1".to_string()),
            metadata_json: None,
        };
        assert_eq!(store.upsert_attachment(&rec).unwrap(), UpsertOutcome::Created);

        let mut resync = rec.clone();
        resync.id = crate::new_row_id();
        assert_eq!(
            store.upsert_attachment(&resync).unwrap(),
            UpsertOutcome::Unchanged
        );
        assert_eq!(store.attachments_for_event("imessage:G1").unwrap().len(), 1);
    }
}
