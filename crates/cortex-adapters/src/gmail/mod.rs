//! Gmail adapter. All network I/O goes through the external CLI; this
//! module owns the backfill state machine, the incremental history/date
//! paths, and the per-message transform into events.

pub mod client;
pub mod schema;
pub mod transform;

use std::collections::HashSet;
use std::time::{Duration, Instant};

use chrono::{Datelike, NaiveDate, Utc};
use serde::Deserialize;

use cortex_store::{AttachmentRecord, EventRecord, Store, ThreadRecord};
use cortex_types::{ContentType, Direction, ParticipantRole, SyncResult};

use crate::contract::{SyncAdapter, SyncContext, apply_event, apply_pragmas};
use crate::error::{Error, Result};
use crate::perf::{PhaseTimer, format_duration};
use crate::pool::fan_out;
use crate::rate::RateLimiter;
use crate::retry::retry_rate_limited;
use crate::watermark::WatermarkTracker;
use client::{GmailSource, GogGmail};
use schema::{GmailMessage, GmailThread};
use transform::{
    extract_payload, header, message_timestamp, parse_address_list, state_from_labels,
};

const CHANNEL: &str = "gmail";

/// Backfill cursor state machine, stored in adapter state:
/// absent or `first_run` → full backfill; `backfill:<YYYY-MM-DD>` →
/// resume the month loop there; empty string → incremental.
const BACKFILL_KEY: &str = "gmail_backfill";
const HISTORY_KEY: &str = "gmail_history_id";

/// Mailboxes older than this are not worth searching.
const BACKFILL_EPOCH: (i32, u32) = (2004, 1);

const ETA_HINT_THRESHOLD: Duration = Duration::from_secs(4 * 3600);

fn default_bin() -> String {
    "gog".to_string()
}
fn default_workers() -> usize {
    8
}
fn default_qps() -> f64 {
    8.0
}
fn default_recent_months() -> u32 {
    3
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GmailOptions {
    #[serde(default = "default_bin")]
    pub bin: String,
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_qps")]
    pub qps: f64,
    #[serde(default = "default_recent_months")]
    pub recent_months: u32,
}

impl Default for GmailOptions {
    fn default() -> Self {
        Self {
            bin: default_bin(),
            account: None,
            workers: default_workers(),
            qps: default_qps(),
            recent_months: default_recent_months(),
        }
    }
}

pub struct GmailAdapter {
    name: String,
    options: GmailOptions,
    source: Box<dyn GmailSource>,
}

impl GmailAdapter {
    pub fn new(name: String, options: GmailOptions) -> Self {
        let source = GogGmail::new(&options.bin, options.account.as_deref());
        Self {
            name,
            options,
            source: Box::new(source),
        }
    }

    pub fn with_source(name: String, options: GmailOptions, source: Box<dyn GmailSource>) -> Self {
        Self {
            name,
            options,
            source,
        }
    }

    fn run_backfill(
        &self,
        ctx: &SyncContext,
        store: &Store,
        resume_from: Option<NaiveDate>,
        timer: &mut PhaseTimer,
        tracker: &mut WatermarkTracker,
        result: &mut SyncResult,
    ) -> Result<()> {
        // Remember where incremental history should resume, taken before
        // the backfill so changes made during it are not lost.
        if let Ok(profile) = self.source.profile()
            && let Some(history_id) = profile.history_id
        {
            store.set_adapter_state(&self.name, HISTORY_KEY, &history_id)?;
        }

        let today = Utc::now().date_naive();
        let recent_start = months_back(first_of_month(today), self.options.recent_months);

        if resume_from.is_none() {
            timer.phase("recent");
            let query = format!("after:{}", gmail_date(recent_start));
            self.import_window(ctx, store, &query, tracker, result)?;
        }

        timer.phase("backfill");
        let epoch = NaiveDate::from_ymd_opt(BACKFILL_EPOCH.0, BACKFILL_EPOCH.1, 1)
            .expect("static epoch date");
        let mut cursor = resume_from.unwrap_or(epoch);
        let total_months = months_between(cursor, recent_start);
        let started = Instant::now();
        let mut months_done: u32 = 0;
        let mut hinted = false;

        while cursor < recent_start {
            ctx.checkpoint()?;
            let next = next_month(cursor);
            let query = format!(
                "after:{} before:{}",
                gmail_date(cursor),
                gmail_date(next.min(recent_start))
            );
            self.import_window(ctx, store, &query, tracker, result)?;

            // Persist the cursor after every month so a killed process
            // resumes here instead of starting over.
            store.set_adapter_state(
                &self.name,
                BACKFILL_KEY,
                &format!("backfill:{}", next.format("%Y-%m-%d")),
            )?;

            months_done += 1;
            let remaining = total_months.saturating_sub(months_done);
            if remaining > 0 && months_done > 0 {
                let avg = started.elapsed() / months_done;
                let eta = avg * remaining;
                tracing::info!(
                    adapter = %self.name,
                    month = %cursor.format("%Y-%m"),
                    remaining_months = remaining,
                    eta = %format_duration(eta),
                    "backfill progress"
                );
                if eta >= ETA_HINT_THRESHOLD && !hinted {
                    hinted = true;
                    tracing::warn!(
                        adapter = %self.name,
                        eta = %format_duration(eta),
                        "backfill will take a while; consider a one-shot mailbox export \
                         ({} gmail export) and re-running incremental sync afterwards",
                        self.options.bin
                    );
                }
            }
            cursor = next;
        }

        store.set_adapter_state(&self.name, BACKFILL_KEY, "")?;
        Ok(())
    }

    fn run_incremental(
        &self,
        ctx: &SyncContext,
        store: &Store,
        timer: &mut PhaseTimer,
        tracker: &mut WatermarkTracker,
        result: &mut SyncResult,
    ) -> Result<()> {
        let history_id = store
            .get_adapter_state(&self.name, HISTORY_KEY)?
            .filter(|id| !id.is_empty());

        if let Some(history_id) = history_id {
            timer.phase("history");
            match self.import_history(ctx, store, &history_id, tracker, result) {
                Ok(()) => return Ok(()),
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(err) => {
                    tracing::warn!(adapter = %self.name, %err, "history sync failed, falling back to date search");
                }
            }
        }

        timer.phase("search");
        let since = store
            .get_watermark(&self.name)?
            .map(|wm| wm.last_sync_at)
            .unwrap_or(0);
        let date = chrono::DateTime::from_timestamp(since, 0)
            .map(|dt| dt.date_naive())
            .unwrap_or_else(|| Utc::now().date_naive());
        let query = format!("after:{}", gmail_date(date));
        self.import_window(ctx, store, &query, tracker, result)?;

        if let Ok(profile) = self.source.profile()
            && let Some(history_id) = profile.history_id
        {
            store.set_adapter_state(&self.name, HISTORY_KEY, &history_id)?;
        }
        Ok(())
    }

    fn import_history(
        &self,
        ctx: &SyncContext,
        store: &Store,
        start_history_id: &str,
        tracker: &mut WatermarkTracker,
        result: &mut SyncResult,
    ) -> Result<()> {
        let mut thread_ids = Vec::new();
        let mut seen = HashSet::new();
        let mut page_token: Option<String> = None;
        let mut latest_history_id = None;

        loop {
            ctx.checkpoint()?;
            let page = self
                .source
                .history(start_history_id, page_token.as_deref())?;
            for entry in &page.history {
                for stub in &entry.messages {
                    if let Some(thread_id) = &stub.thread_id
                        && seen.insert(thread_id.clone())
                    {
                        thread_ids.push(thread_id.clone());
                    }
                }
            }
            if let Some(id) = page.history_id {
                latest_history_id = Some(id);
            }
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        self.import_threads(ctx, store, thread_ids, tracker, result)?;

        if let Some(history_id) = latest_history_id {
            store.set_adapter_state(&self.name, HISTORY_KEY, &history_id)?;
        }
        Ok(())
    }

    /// One search window: paginate, collect thread ids, fan out fetches,
    /// then import each thread in its own transaction.
    fn import_window(
        &self,
        ctx: &SyncContext,
        store: &Store,
        query: &str,
        tracker: &mut WatermarkTracker,
        result: &mut SyncResult,
    ) -> Result<()> {
        let mut thread_ids = Vec::new();
        let mut seen = HashSet::new();
        let mut page_token: Option<String> = None;

        loop {
            ctx.checkpoint()?;
            let page = self.source.search(query, page_token.as_deref())?;
            for stub in page.threads {
                if seen.insert(stub.id.clone()) {
                    thread_ids.push(stub.id);
                }
            }
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        self.import_threads(ctx, store, thread_ids, tracker, result)
    }

    fn import_threads(
        &self,
        ctx: &SyncContext,
        store: &Store,
        thread_ids: Vec<String>,
        tracker: &mut WatermarkTracker,
        result: &mut SyncResult,
    ) -> Result<()> {
        if thread_ids.is_empty() {
            return Ok(());
        }
        let limiter = RateLimiter::new(self.options.qps);
        let source = self.source.as_ref();
        let cancel = &ctx.cancel;

        let fetched = fan_out(
            thread_ids,
            self.options.workers,
            Some(&limiter),
            cancel,
            |thread_id| {
                let thread =
                    retry_rate_limited(cancel, || source.get_thread(&thread_id));
                (thread_id, thread)
            },
        );

        for (thread_id, fetch) in fetched {
            ctx.checkpoint()?;
            match fetch {
                Ok(thread) => self.import_thread(store, &thread, tracker, result)?,
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(err) => {
                    // Skip the thread, keep the run alive.
                    tracing::warn!(adapter = %self.name, thread_id, %err, "thread fetch failed, skipping");
                }
            }
        }
        Ok(())
    }

    fn import_thread(
        &self,
        store: &Store,
        thread: &GmailThread,
        tracker: &mut WatermarkTracker,
        result: &mut SyncResult,
    ) -> Result<()> {
        let tx = store.begin().map_err(Error::from)?;

        let thread_row_id = format!("{CHANNEL}:{}", thread.id);
        let name = thread.messages.first().and_then(|m| {
            m.payload
                .as_ref()
                .and_then(|p| header(&p.headers, "Subject"))
                .map(transform::decode_rfc2047)
                .filter(|s| !s.is_empty())
        });
        let outcome = store.upsert_thread(&ThreadRecord {
            id: thread_row_id.clone(),
            channel: CHANNEL.to_string(),
            name,
            source_adapter: self.name.clone(),
            source_id: thread.id.clone(),
        })?;
        if outcome.is_created() {
            result.threads_created += 1;
        } else if outcome.is_updated() {
            result.threads_updated += 1;
        }

        for message in &thread.messages {
            self.import_message(store, message, &thread_row_id, tracker, result)?;
        }

        tx.commit()
            .map_err(|err| Error::Transaction(err.to_string()))?;
        Ok(())
    }

    fn import_message(
        &self,
        store: &Store,
        message: &GmailMessage,
        thread_row_id: &str,
        tracker: &mut WatermarkTracker,
        result: &mut SyncResult,
    ) -> Result<()> {
        let Some(timestamp) = message_timestamp(message.internal_date.as_deref()) else {
            tracing::debug!(message_id = %message.id, "message without internalDate, skipped");
            return Ok(());
        };

        let payload = message.payload.as_ref();
        let headers = payload.map(|p| p.headers.as_slice()).unwrap_or(&[]);
        let subject = header(headers, "Subject")
            .map(transform::decode_rfc2047)
            .unwrap_or_default();
        let extracted = payload.map(extract_payload).unwrap_or_default();
        let body = extracted.body.unwrap_or_default();

        let mut content_types = vec![ContentType::Text];
        if !extracted.attachments.is_empty() {
            content_types.push(ContentType::Attachment);
        }
        let content = if subject.is_empty() {
            body.clone()
        } else if body.is_empty() {
            subject.clone()
        } else {
            format!("{subject}\n\n{body}")
        };

        let sent = message.label_ids.iter().any(|l| l == "SENT");
        let event_id = format!("{CHANNEL}:{}", message.id);
        let metadata = serde_json::json!({
            "subject": subject,
            "snippet": message.snippet,
            "labels": message.label_ids,
        });

        let event = EventRecord {
            id: event_id.clone(),
            timestamp,
            channel: CHANNEL.to_string(),
            content_types: ContentType::encode(&content_types),
            content,
            direction: if sent {
                Direction::Sent
            } else {
                Direction::Received
            }
            .as_str()
            .to_string(),
            thread_id: Some(thread_row_id.to_string()),
            reply_to: None,
            source_adapter: self.name.clone(),
            source_id: message.id.clone(),
            metadata_json: Some(metadata.to_string()),
        };
        let outcome = apply_event(store, &event)?;
        if outcome.is_created() {
            result.events_created += 1;
        } else if outcome.is_updated() {
            result.events_updated += 1;
        }
        tracker.observe(timestamp, &event_id);

        for (header_name, role) in [
            ("From", ParticipantRole::Sender),
            ("To", ParticipantRole::Recipient),
            ("Cc", ParticipantRole::Cc),
        ] {
            let Some(raw) = header(headers, header_name) else {
                continue;
            };
            for (display_name, email) in parse_address_list(raw) {
                let Ok((contact_id, _)) = cortex_identity::get_or_create_contact(
                    store,
                    "email",
                    &email,
                    display_name.as_deref(),
                    &self.name,
                ) else {
                    continue;
                };
                if store
                    .insert_participant(&event_id, &contact_id, role.as_str())
                    .is_err()
                {
                    result.participants_skipped += 1;
                }
            }
        }

        store.upsert_event_state(&state_from_labels(&event_id, &message.label_ids))?;

        // Mirror labels as tags, deleted-and-rewritten each sync.
        let tags: Vec<String> = message
            .label_ids
            .iter()
            .map(|l| format!("gmail_label:{l}"))
            .collect();
        store.replace_event_tags(&event_id, &tags)?;

        for part in &extracted.attachments {
            let source_id = part
                .attachment_id
                .clone()
                .or_else(|| part.part_id.as_ref().map(|p| format!("part:{p}")));
            let outcome = store.upsert_attachment(&AttachmentRecord {
                id: cortex_store::new_row_id(),
                event_id: event_id.clone(),
                filename: Some(part.filename.clone()),
                mime_type: part.mime_type.clone(),
                size: part.size,
                media_type: cortex_types::media_type_for(
                    part.mime_type.as_deref().unwrap_or(""),
                    false,
                )
                .as_str()
                .to_string(),
                storage_uri: None,
                storage_type: Some("gmail".to_string()),
                content_hash: None,
                source_id,
                metadata_json: None,
            })?;
            if outcome.is_created() {
                result.attachments_created += 1;
            } else if outcome.is_updated() {
                result.attachments_updated += 1;
            }
        }

        Ok(())
    }
}

impl SyncAdapter for GmailAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn sync(&self, ctx: &SyncContext, store: &Store, full: bool) -> Result<SyncResult> {
        apply_pragmas(store, full)?;

        let mut result = SyncResult::default();
        let mut tracker = WatermarkTracker::new();
        let mut timer = PhaseTimer::new();

        let cursor = store.get_adapter_state(&self.name, BACKFILL_KEY)?;
        let resume = cursor
            .as_deref()
            .and_then(|c| c.strip_prefix("backfill:"))
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok());

        if full || cursor.is_none() || cursor.as_deref() == Some("first_run") {
            let resume = if full { None } else { resume };
            self.run_backfill(ctx, store, resume, &mut timer, &mut tracker, &mut result)?;
        } else if let Some(resume) = resume {
            self.run_backfill(ctx, store, Some(resume), &mut timer, &mut tracker, &mut result)?;
        } else {
            self.run_incremental(ctx, store, &mut timer, &mut tracker, &mut result)?;
        }

        tracker.advance(store, &self.name)?;

        result.duration = timer.total();
        result.perf = timer.into_entries();
        Ok(result)
    }
}

// --- month arithmetic ---

fn first_of_month(d: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(d.year(), d.month(), 1).expect("first of month")
}

fn next_month(d: NaiveDate) -> NaiveDate {
    if d.month() == 12 {
        NaiveDate::from_ymd_opt(d.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(d.year(), d.month() + 1, 1)
    }
    .expect("next month")
}

fn months_back(d: NaiveDate, n: u32) -> NaiveDate {
    let total = d.year() * 12 + d.month() as i32 - 1 - n as i32;
    NaiveDate::from_ymd_opt(total.div_euclid(12), (total.rem_euclid(12) + 1) as u32, 1)
        .expect("months back")
}

fn months_between(from: NaiveDate, to: NaiveDate) -> u32 {
    let span = (to.year() * 12 + to.month() as i32) - (from.year() * 12 + from.month() as i32);
    span.max(0) as u32
}

fn gmail_date(d: NaiveDate) -> String {
    d.format("%Y/%m/%d").to_string()
}
