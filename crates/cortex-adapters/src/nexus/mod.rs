//! Nexus adapter: append-only JSONL event logs in a directory. Files are
//! scanned in sorted order, one store event per decodable log line.
//! `last_event_id` breaks timestamp ties on the watermark, so multiple
//! entries sharing one second are never re-imported or skipped.

use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use serde::Deserialize;

use cortex_store::{EventRecord, Store, ThreadRecord};
use cortex_types::{ContentType, Direction, SyncResult};

use crate::contract::{SyncAdapter, SyncContext, apply_event, apply_pragmas};
use crate::error::{Error, Result};
use crate::perf::PhaseTimer;
use crate::watermark::WatermarkTracker;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct LogEntry {
    id: Option<String>,
    session_id: Option<String>,
    source: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    content: Option<String>,
    ts: Option<i64>,
    metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NexusOptions {
    pub dir: PathBuf,
    /// When set, only entries with this source tag are imported.
    #[serde(default)]
    pub source: Option<String>,
}

pub struct NexusAdapter {
    name: String,
    options: NexusOptions,
}

impl NexusAdapter {
    pub fn new(name: String, options: NexusOptions) -> Self {
        Self { name, options }
    }

    fn channel_for(entry: &LogEntry) -> &'static str {
        match entry.source.as_deref() {
            Some(source) if source == "agent" || source.ends_with("_agent") => "nexus_agent",
            _ => "nexus",
        }
    }

    fn log_files(&self) -> Result<Vec<PathBuf>> {
        if !self.options.dir.exists() {
            return Err(Error::Environment(format!(
                "log directory not found: {}",
                self.options.dir.display()
            )));
        }
        let mut files: Vec<PathBuf> = walkdir::WalkDir::new(&self.options.dir)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path().is_file()
                    && e.path().extension().and_then(|s| s.to_str()) == Some("jsonl")
            })
            .map(|e| e.into_path())
            .collect();
        files.sort();
        Ok(files)
    }
}

impl SyncAdapter for NexusAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn sync(&self, ctx: &SyncContext, store: &Store, full: bool) -> Result<SyncResult> {
        apply_pragmas(store, full)?;

        let watermark = if full {
            None
        } else {
            store.get_watermark(&self.name)?
        };
        let floor = watermark
            .map(|wm| (wm.last_sync_at, wm.last_event_id.unwrap_or_default()))
            .unwrap_or((0, String::new()));

        let mut result = SyncResult::default();
        let mut tracker = WatermarkTracker::new();
        let mut timer = PhaseTimer::new();

        timer.phase("scan");
        let files = self.log_files()?;

        timer.phase("import");
        let tx = store.begin().map_err(Error::from)?;
        for path in files {
            ctx.checkpoint()?;
            let file = std::fs::File::open(&path)
                .map_err(|err| Error::Environment(format!("{}: {err}", path.display())))?;
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "log".to_string());

            for (line_no, line) in BufReader::new(file).lines().enumerate() {
                ctx.checkpoint()?;
                let Ok(line) = line else { continue };
                if line.trim().is_empty() {
                    continue;
                }
                let entry: LogEntry = match serde_json::from_str(&line) {
                    Ok(entry) => entry,
                    Err(err) => {
                        // A malformed line never aborts the batch.
                        tracing::debug!(file = %path.display(), line_no, %err, "skipping malformed line");
                        continue;
                    }
                };
                if let Some(filter) = &self.options.source
                    && entry.source.as_deref() != Some(filter.as_str())
                {
                    continue;
                }
                let Some(ts) = entry.ts else { continue };

                let source_id = entry
                    .id
                    .clone()
                    .unwrap_or_else(|| format!("{stem}:{line_no}"));
                let event_id = format!("nexus:{source_id}");
                if (ts, event_id.clone()) <= (floor.0, floor.1.clone()) {
                    continue;
                }

                let channel = Self::channel_for(&entry);
                let thread_id = match &entry.session_id {
                    Some(session_id) => {
                        let thread_id = format!("nexus:{session_id}");
                        let outcome = store.upsert_thread(&ThreadRecord {
                            id: thread_id.clone(),
                            channel: channel.to_string(),
                            name: None,
                            source_adapter: self.name.clone(),
                            source_id: session_id.clone(),
                        })?;
                        if outcome.is_created() {
                            result.threads_created += 1;
                        } else if outcome.is_updated() {
                            result.threads_updated += 1;
                        }
                        Some(thread_id)
                    }
                    None => None,
                };

                let metadata_json = entry.metadata.as_ref().map(|m| m.to_string());
                let event = EventRecord {
                    id: event_id.clone(),
                    timestamp: ts,
                    channel: channel.to_string(),
                    content_types: ContentType::encode(&[ContentType::Text]),
                    content: entry
                        .content
                        .clone()
                        .or(entry.kind.clone())
                        .unwrap_or_default(),
                    direction: Direction::Observed.as_str().to_string(),
                    thread_id,
                    reply_to: None,
                    source_adapter: self.name.clone(),
                    source_id,
                    metadata_json,
                };
                let outcome = apply_event(store, &event)?;
                if outcome.is_created() {
                    result.events_created += 1;
                } else if outcome.is_updated() {
                    result.events_updated += 1;
                }
                tracker.observe(ts, &event_id);
            }
        }
        tx.commit()
            .map_err(|err| Error::Transaction(err.to_string()))?;

        tracker.advance(store, &self.name)?;

        result.duration = timer.total();
        result.perf = timer.into_entries();
        Ok(result)
    }
}
