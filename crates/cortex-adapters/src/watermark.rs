use cortex_store::{Store, Watermark};

use crate::error::Result;

/// Tracks the maximum imported `(timestamp, event_id)` pair over one sync
/// and advances the stored cursor only after all phase transactions have
/// committed. The pair orders lexicographically: the event id breaks
/// timestamp ties.
#[derive(Debug, Default)]
pub struct WatermarkTracker {
    max: Option<(i64, String)>,
}

impl WatermarkTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, timestamp: i64, event_id: &str) {
        let candidate = (timestamp, event_id.to_string());
        match &self.max {
            Some(current) if *current >= candidate => {}
            _ => self.max = Some(candidate),
        }
    }

    pub fn has_imports(&self) -> bool {
        self.max.is_some()
    }

    /// Advance the stored watermark if this run imported anything beyond
    /// it. Returns true when the cursor moved.
    pub fn advance(&self, store: &Store, adapter: &str) -> Result<bool> {
        let Some((ts, event_id)) = &self.max else {
            return Ok(false);
        };

        let current = store.get_watermark(adapter)?.unwrap_or_default();
        let current_pair = (
            current.last_sync_at,
            current.last_event_id.clone().unwrap_or_default(),
        );
        if (*ts, event_id.clone()) <= current_pair {
            return Ok(false);
        }

        store.set_watermark(
            adapter,
            &Watermark {
                last_sync_at: *ts,
                last_event_id: Some(event_id.clone()),
            },
        )?;
        Ok(true)
    }
}
