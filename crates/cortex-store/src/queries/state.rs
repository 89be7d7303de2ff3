use anyhow::Result;
use rusqlite::{OptionalExtension, params};

use crate::db::Store;
use crate::records::{EventStateRecord, SyncJobRecord, Watermark};

/// Reserved adapter-state keys carrying live-watch status.
pub const LIVE_STATUS: &str = "live_status";
pub const LIVE_LAST_HEARTBEAT: &str = "live_last_heartbeat";
pub const LIVE_LAST_ERROR: &str = "live_last_error";
pub const LIVE_RESTARTS: &str = "live_restarts";

impl Store {
    // --- Watermarks ---

    pub fn get_watermark(&self, adapter: &str) -> Result<Option<Watermark>> {
        let mut stmt = self.conn().prepare_cached(
            "SELECT last_sync_at, last_event_id FROM sync_watermarks WHERE adapter = ?1",
        )?;
        Ok(stmt
            .query_row([adapter], |row| {
                Ok(Watermark {
                    last_sync_at: row.get(0)?,
                    last_event_id: row.get(1)?,
                })
            })
            .optional()?)
    }

    /// Upsert the per-adapter cursor. An empty `last_event_id` is stored
    /// as NULL.
    pub fn set_watermark(&self, adapter: &str, wm: &Watermark) -> Result<()> {
        let last_event_id = wm
            .last_event_id
            .as_deref()
            .filter(|id| !id.is_empty());
        self.conn().execute(
            "INSERT INTO sync_watermarks (adapter, last_sync_at, last_event_id)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(adapter) DO UPDATE SET
                 last_sync_at = ?2,
                 last_event_id = ?3",
            params![adapter, wm.last_sync_at, last_event_id],
        )?;
        Ok(())
    }

    // --- Adapter state ---

    pub fn get_adapter_state(&self, adapter: &str, key: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn()
            .prepare_cached("SELECT value FROM adapter_state WHERE adapter = ?1 AND key = ?2")?;
        Ok(stmt
            .query_row(params![adapter, key], |row| row.get(0))
            .optional()?)
    }

    pub fn set_adapter_state(&self, adapter: &str, key: &str, value: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO adapter_state (adapter, key, value, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(adapter, key) DO UPDATE SET
                 value = ?3,
                 updated_at = ?4",
            params![adapter, key, value, cortex_types::now_ts()],
        )?;
        Ok(())
    }

    pub fn delete_adapter_state(&self, adapter: &str, key: &str) -> Result<()> {
        self.conn().execute(
            "DELETE FROM adapter_state WHERE adapter = ?1 AND key = ?2",
            params![adapter, key],
        )?;
        Ok(())
    }

    /// Increment a numeric adapter-state value, returning the new count.
    pub fn increment_adapter_state(&self, adapter: &str, key: &str) -> Result<i64> {
        let current: i64 = self
            .get_adapter_state(adapter, key)?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let next = current + 1;
        self.set_adapter_state(adapter, key, &next.to_string())?;
        Ok(next)
    }

    // --- Sync jobs ---

    pub fn sync_job_start(&self, adapter: &str) -> Result<()> {
        let now = cortex_types::now_ts();
        self.conn().execute(
            "INSERT INTO sync_jobs (adapter, status, phase, cursor, started_at, updated_at, last_error, progress_json)
             VALUES (?1, 'running', NULL, NULL, ?2, ?2, NULL, NULL)
             ON CONFLICT(adapter) DO UPDATE SET
                 status = 'running',
                 phase = NULL,
                 started_at = ?2,
                 updated_at = ?2,
                 last_error = NULL",
            params![adapter, now],
        )?;
        Ok(())
    }

    pub fn sync_job_complete(&self, adapter: &str, progress_json: Option<&str>) -> Result<()> {
        self.conn().execute(
            "UPDATE sync_jobs SET status = 'completed', updated_at = ?2, progress_json = ?3
             WHERE adapter = ?1",
            params![adapter, cortex_types::now_ts(), progress_json],
        )?;
        Ok(())
    }

    pub fn sync_job_fail(&self, adapter: &str, error: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE sync_jobs SET status = 'error', updated_at = ?2, last_error = ?3
             WHERE adapter = ?1",
            params![adapter, cortex_types::now_ts(), error],
        )?;
        Ok(())
    }

    pub fn get_sync_job(&self, adapter: &str) -> Result<Option<SyncJobRecord>> {
        let mut stmt = self.conn().prepare_cached(
            "SELECT adapter, status, phase, cursor, started_at, updated_at, last_error, progress_json
             FROM sync_jobs WHERE adapter = ?1",
        )?;
        Ok(stmt
            .query_row([adapter], |row| {
                Ok(SyncJobRecord {
                    adapter: row.get(0)?,
                    status: row.get(1)?,
                    phase: row.get(2)?,
                    cursor: row.get(3)?,
                    started_at: row.get(4)?,
                    updated_at: row.get(5)?,
                    last_error: row.get(6)?,
                    progress_json: row.get(7)?,
                })
            })
            .optional()?)
    }

    // --- Event state & tags ---

    pub fn upsert_event_state(&self, rec: &EventStateRecord) -> Result<()> {
        self.conn().execute(
            "INSERT INTO event_states (event_id, read_state, flagged, archived, status)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(event_id) DO UPDATE SET
                 read_state = ?2,
                 flagged = ?3,
                 archived = ?4,
                 status = ?5",
            params![
                rec.event_id,
                rec.read_state,
                rec.flagged,
                rec.archived,
                rec.status
            ],
        )?;
        Ok(())
    }

    pub fn get_event_state(&self, event_id: &str) -> Result<Option<EventStateRecord>> {
        let mut stmt = self.conn().prepare_cached(
            "SELECT event_id, read_state, flagged, archived, status
             FROM event_states WHERE event_id = ?1",
        )?;
        Ok(stmt
            .query_row([event_id], |row| {
                Ok(EventStateRecord {
                    event_id: row.get(0)?,
                    read_state: row.get(1)?,
                    flagged: row.get(2)?,
                    archived: row.get(3)?,
                    status: row.get(4)?,
                })
            })
            .optional()?)
    }

    /// Attach a single tag, keeping existing ones.
    pub fn add_event_tag(&self, event_id: &str, tag: &str) -> Result<()> {
        self.conn()
            .prepare_cached("INSERT OR IGNORE INTO event_tags (event_id, tag) VALUES (?1, ?2)")?
            .execute(params![event_id, tag])?;
        Ok(())
    }

    /// Replace all tags on an event (delete-and-rewrite per sync).
    pub fn replace_event_tags(&self, event_id: &str, tags: &[String]) -> Result<()> {
        let mut delete = self
            .conn()
            .prepare_cached("DELETE FROM event_tags WHERE event_id = ?1")?;
        delete.execute([event_id])?;

        let mut insert = self
            .conn()
            .prepare_cached("INSERT OR IGNORE INTO event_tags (event_id, tag) VALUES (?1, ?2)")?;
        for tag in tags {
            insert.execute(params![event_id, tag])?;
        }
        Ok(())
    }

    pub fn tags_for_event(&self, event_id: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn()
            .prepare_cached("SELECT tag FROM event_tags WHERE event_id = ?1 ORDER BY tag")?;
        let rows = stmt
            .query_map([event_id], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watermark_round_trip_and_null_event_id() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.get_watermark("gmail").unwrap().is_none());

        store
            .set_watermark(
                "gmail",
                &Watermark {
                    last_sync_at: 1_700_000_000,
                    last_event_id: Some(String::new()),
                },
            )
            .unwrap();

        let wm = store.get_watermark("gmail").unwrap().unwrap();
        assert_eq!(wm.last_sync_at, 1_700_000_000);
        assert_eq!(wm.last_event_id, None);
    }

    #[test]
    fn test_adapter_state_upsert_and_delete() {
        let store = Store::open_in_memory().unwrap();
        store
            .set_adapter_state("gmail", "gmail_backfill", "first_run")
            .unwrap();
        store
            .set_adapter_state("gmail", "gmail_backfill", "backfill:2004-06-01")
            .unwrap();
        assert_eq!(
            store.get_adapter_state("gmail", "gmail_backfill").unwrap(),
            Some("backfill:2004-06-01".to_string())
        );

        store.delete_adapter_state("gmail", "gmail_backfill").unwrap();
        assert_eq!(store.get_adapter_state("gmail", "gmail_backfill").unwrap(), None);
    }

    #[test]
    fn test_restart_counter_is_monotonic() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.increment_adapter_state("im", LIVE_RESTARTS).unwrap(), 1);
        assert_eq!(store.increment_adapter_state("im", LIVE_RESTARTS).unwrap(), 2);
    }

    #[test]
    fn test_sync_job_transitions() {
        let store = Store::open_in_memory().unwrap();
        store.sync_job_start("imessage").unwrap();
        let job = store.get_sync_job("imessage").unwrap().unwrap();
        assert_eq!(job.status, "running");

        store
            .sync_job_complete("imessage", Some(r#"{"messages":"0.8s"}"#))
            .unwrap();
        let job = store.get_sync_job("imessage").unwrap().unwrap();
        assert_eq!(job.status, "completed");
        assert!(job.progress_json.unwrap().contains("messages"));

        store.sync_job_start("imessage").unwrap();
        store.sync_job_fail("imessage", "chat.db missing").unwrap();
        let job = store.get_sync_job("imessage").unwrap().unwrap();
        assert_eq!(job.status, "error");
        assert_eq!(job.last_error.as_deref(), Some("chat.db missing"));
    }

    #[test]
    fn test_tags_are_rewritten() {
        let store = Store::open_in_memory().unwrap();
        store
            .replace_event_tags(
                "gmail:m1",
                &["gmail_label:INBOX".to_string(), "gmail_label:UNREAD".to_string()],
            )
            .unwrap();
        store
            .replace_event_tags("gmail:m1", &["gmail_label:INBOX".to_string()])
            .unwrap();
        assert_eq!(
            store.tags_for_event("gmail:m1").unwrap(),
            vec!["gmail_label:INBOX".to_string()]
        );
    }
}
