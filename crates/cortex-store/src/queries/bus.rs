use anyhow::Result;
use rusqlite::params;

use crate::db::Store;

/// Topic published when an adapter creates an event.
pub const TOPIC_EVENT_CREATED: &str = "cortex.event.created";
/// Topic published when an adapter updates an existing event.
pub const TOPIC_EVENT_UPDATED: &str = "cortex.event.updated";

#[derive(Debug, Clone, serde::Serialize)]
pub struct BusNotification {
    pub id: i64,
    pub topic: String,
    pub source_adapter: String,
    pub event_id: String,
    pub payload_json: Option<String>,
    pub created_at: i64,
}

impl Store {
    /// Append a notification for downstream consumers. Best-effort: any
    /// failure is logged and swallowed, never affecting the sync outcome.
    pub fn emit(
        &self,
        topic: &str,
        source_adapter: &str,
        event_id: &str,
        payload_json: Option<&str>,
    ) {
        let result = self.conn().execute(
            "INSERT INTO bus_notifications
             (topic, source_adapter, event_id, payload_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                topic,
                source_adapter,
                event_id,
                payload_json,
                cortex_types::now_ts()
            ],
        );
        if let Err(err) = result {
            tracing::warn!(topic, source_adapter, %err, "bus emit failed");
        }
    }

    /// Notifications with id greater than `after_id`, oldest first.
    pub fn bus_notifications_after(
        &self,
        after_id: i64,
        limit: usize,
    ) -> Result<Vec<BusNotification>> {
        let mut stmt = self.conn().prepare_cached(
            "SELECT id, topic, source_adapter, event_id, payload_json, created_at
             FROM bus_notifications WHERE id > ?1 ORDER BY id ASC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![after_id, limit as i64], |row| {
                Ok(BusNotification {
                    id: row.get(0)?,
                    topic: row.get(1)?,
                    source_adapter: row.get(2)?,
                    event_id: row.get(3)?,
                    payload_json: row.get(4)?,
                    created_at: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Drop consumed notifications up to and including `up_to_id`.
    pub fn prune_bus_notifications(&self, up_to_id: i64) -> Result<usize> {
        let deleted = self.conn().execute(
            "DELETE FROM bus_notifications WHERE id <= ?1",
            params![up_to_id],
        )?;
        Ok(deleted)
    }
}
