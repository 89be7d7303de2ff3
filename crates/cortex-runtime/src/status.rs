//! Read side for `cortex status`: one snapshot row per configured
//! adapter, assembled from adapter state, watermarks, and sync jobs.

use cortex_store::Store;

use crate::config::Config;
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct AdapterStatus {
    pub adapter: String,
    pub kind: String,
    pub enabled: bool,
    pub live_status: Option<String>,
    pub heartbeat_age_secs: Option<i64>,
    pub restarts: i64,
    pub last_error: Option<String>,
    pub watermark: Option<i64>,
    pub job_status: Option<String>,
}

pub fn snapshot(store: &Store, config: &Config) -> Result<Vec<AdapterStatus>> {
    let now = cortex_types::now_ts();
    let mut rows = Vec::new();

    for (name, entry) in &config.adapters {
        let live_status = store.get_adapter_state(name, cortex_store::LIVE_STATUS)?;
        let heartbeat_age_secs = store
            .get_adapter_state(name, cortex_store::LIVE_LAST_HEARTBEAT)?
            .and_then(|v| v.parse::<i64>().ok())
            .map(|ts| (now - ts).max(0));
        let restarts = store
            .get_adapter_state(name, cortex_store::LIVE_RESTARTS)?
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0);
        let last_error = store
            .get_adapter_state(name, cortex_store::LIVE_LAST_ERROR)?
            .filter(|e| !e.is_empty());
        let watermark = store.get_watermark(name)?.map(|wm| wm.last_sync_at);
        let job_status = store.get_sync_job(name)?.map(|job| job.status);

        rows.push(AdapterStatus {
            adapter: name.clone(),
            kind: entry.kind.clone(),
            enabled: entry.enabled,
            live_status,
            heartbeat_age_secs,
            restarts,
            last_error,
            watermark,
            job_status,
        });
    }
    Ok(rows)
}
