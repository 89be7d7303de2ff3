use cortex_store::Store;
use cortex_types::{CancelToken, SyncResult};

use crate::error::{Error, Result};

/// Context threaded through one sync run.
#[derive(Debug, Clone, Default)]
pub struct SyncContext {
    pub cancel: CancelToken,
}

impl SyncContext {
    pub fn new(cancel: CancelToken) -> Self {
        Self { cancel }
    }

    /// Yield point: returns `Error::Cancelled` once the token trips.
    /// Adapters call this at loop headers and before external I/O.
    pub fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// The uniform adapter capability.
///
/// Guarantees required of implementations:
/// - idempotent under repeated calls
/// - on success the watermark is advanced to the maximum imported event
///   timestamp (never wall-clock), so late-arriving backdated events are
///   not skipped
/// - on error, partial work may be committed but the watermark is not
///   advanced past uncommitted events
pub trait SyncAdapter: Send {
    /// Stable name used as `source_adapter`, watermark key, and sync-job
    /// key.
    fn name(&self) -> &str;

    /// Run one sync. `full` means "ignore the watermark, reimport
    /// everything".
    fn sync(&self, ctx: &SyncContext, store: &Store, full: bool) -> Result<SyncResult>;
}

/// Apply the per-sync pragmas for this run mode.
pub fn apply_pragmas(store: &Store, full: bool) -> Result<()> {
    if full {
        store.apply_full_import_pragmas()?;
    } else {
        store.apply_sync_pragmas()?;
    }
    Ok(())
}

/// Upsert an event and publish the matching bus notification.
/// Bus emission is best-effort and never affects the sync outcome.
pub fn apply_event(
    store: &Store,
    rec: &cortex_store::EventRecord,
) -> Result<cortex_store::UpsertOutcome> {
    let outcome = store.upsert_event(rec)?;
    match outcome {
        cortex_store::UpsertOutcome::Created => {
            store.emit(
                cortex_store::TOPIC_EVENT_CREATED,
                &rec.source_adapter,
                &rec.id,
                None,
            );
        }
        cortex_store::UpsertOutcome::Updated => {
            store.emit(
                cortex_store::TOPIC_EVENT_UPDATED,
                &rec.source_adapter,
                &rec.id,
                None,
            );
        }
        cortex_store::UpsertOutcome::Unchanged => {}
    }
    Ok(outcome)
}
