//! Calendar adapter. Subprocess pattern like Gmail: backfill month by
//! month from 2004 through one year ahead, then incremental over a
//! sliding `[now − 30d, now + 1y]` window.

use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDate, Utc};
use serde::Deserialize;

use cortex_store::{EventRecord, Store, ThreadRecord};
use cortex_types::{ContentType, Direction, ParticipantRole, SyncResult};

use crate::contract::{SyncAdapter, SyncContext, apply_event, apply_pragmas};
use crate::error::{Error, Result};
use crate::perf::PhaseTimer;
use crate::subprocess::CliRunner;
use crate::watermark::WatermarkTracker;

const CHANNEL: &str = "calendar";
const BACKFILL_KEY: &str = "calendar_backfill";

// --- wire types ---

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Calendar {
    pub id: String,
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct EventTime {
    pub date_time: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Attendee {
    pub email: Option<String>,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub id: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub start: Option<EventTime>,
    #[serde(default)]
    pub organizer: Option<Attendee>,
    #[serde(default)]
    pub attendees: Vec<Attendee>,
}

/// Seam over the external calendar CLI.
pub trait CalendarSource: Send + Sync {
    fn calendars(&self) -> Result<Vec<Calendar>>;
    fn events(&self, calendar_id: &str, from: NaiveDate, to: NaiveDate)
    -> Result<Vec<CalendarEvent>>;
}

pub struct GogCalendar {
    runner: CliRunner,
}

impl GogCalendar {
    pub fn new(bin: &str, account: Option<&str>) -> Self {
        let mut base_args = Vec::new();
        if let Some(account) = account {
            base_args.push("--account".to_string());
            base_args.push(account.to_string());
        }
        Self {
            runner: CliRunner::new(bin).with_base_args(base_args),
        }
    }
}

impl CalendarSource for GogCalendar {
    fn calendars(&self) -> Result<Vec<Calendar>> {
        Ok(self
            .runner
            .run_json(&["calendar", "list"])?
            .unwrap_or_default())
    }

    fn events(
        &self,
        calendar_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<CalendarEvent>> {
        let from = from.format("%Y-%m-%d").to_string();
        let to = to.format("%Y-%m-%d").to_string();
        Ok(self
            .runner
            .run_json(&[
                "calendar", "events", calendar_id, "--from", &from, "--to", &to,
            ])?
            .unwrap_or_default())
    }
}

fn default_bin() -> String {
    "gog".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CalendarOptions {
    #[serde(default = "default_bin")]
    pub bin: String,
    #[serde(default)]
    pub account: Option<String>,
}

impl Default for CalendarOptions {
    fn default() -> Self {
        Self {
            bin: default_bin(),
            account: None,
        }
    }
}

pub struct CalendarAdapter {
    name: String,
    source: Box<dyn CalendarSource>,
}

impl CalendarAdapter {
    pub fn new(name: String, options: CalendarOptions) -> Self {
        let source = GogCalendar::new(&options.bin, options.account.as_deref());
        Self {
            name,
            source: Box::new(source),
        }
    }

    pub fn with_source(name: String, source: Box<dyn CalendarSource>) -> Self {
        Self { name, source }
    }

    fn import_window(
        &self,
        ctx: &SyncContext,
        store: &Store,
        calendars: &[Calendar],
        from: NaiveDate,
        to: NaiveDate,
        tracker: &mut WatermarkTracker,
        result: &mut SyncResult,
    ) -> Result<()> {
        for calendar in calendars {
            ctx.checkpoint()?;
            let events = self.source.events(&calendar.id, from, to)?;
            if events.is_empty() {
                continue;
            }

            let tx = store.begin().map_err(Error::from)?;
            let thread_id = format!("{CHANNEL}:{}", calendar.id);
            let outcome = store.upsert_thread(&ThreadRecord {
                id: thread_id.clone(),
                channel: CHANNEL.to_string(),
                name: calendar.summary.clone(),
                source_adapter: self.name.clone(),
                source_id: calendar.id.clone(),
            })?;
            if outcome.is_created() {
                result.threads_created += 1;
            } else if outcome.is_updated() {
                result.threads_updated += 1;
            }

            for event in events {
                ctx.checkpoint()?;
                if let Err(err) = self.import_event(store, &event, &thread_id, tracker, result) {
                    if err.is_cancelled() {
                        return Err(err);
                    }
                    // Per-item decode problems never abort the batch.
                    tracing::warn!(adapter = %self.name, event_id = %event.id, %err, "skipping calendar event");
                }
            }
            tx.commit()
                .map_err(|err| Error::Transaction(err.to_string()))?;
        }
        Ok(())
    }

    fn import_event(
        &self,
        store: &Store,
        event: &CalendarEvent,
        thread_id: &str,
        tracker: &mut WatermarkTracker,
        result: &mut SyncResult,
    ) -> Result<()> {
        let Some(timestamp) = event.start.as_ref().and_then(event_time_to_unix) else {
            return Err(Error::Decode("event without start time".to_string()));
        };

        let summary = event.summary.clone().unwrap_or_default();
        let content = match event.description.as_deref().filter(|d| !d.is_empty()) {
            Some(description) => format!("{summary}\n\n{description}"),
            None => summary.clone(),
        };
        let event_id = format!("{CHANNEL}:{}", event.id);

        let record = EventRecord {
            id: event_id.clone(),
            timestamp,
            channel: CHANNEL.to_string(),
            content_types: ContentType::encode(&[ContentType::CalendarEvent]),
            content,
            direction: Direction::Observed.as_str().to_string(),
            thread_id: Some(thread_id.to_string()),
            reply_to: None,
            source_adapter: self.name.clone(),
            source_id: event.id.clone(),
            metadata_json: Some(serde_json::json!({ "summary": summary }).to_string()),
        };
        let outcome = apply_event(store, &record)?;
        if outcome.is_created() {
            result.events_created += 1;
        } else if outcome.is_updated() {
            result.events_updated += 1;
        }
        tracker.observe(timestamp, &event_id);

        let organizer = event.organizer.iter();
        let attendees = event.attendees.iter();
        for (attendee, role) in organizer
            .map(|a| (a, ParticipantRole::Organizer))
            .chain(attendees.map(|a| (a, ParticipantRole::Attendee)))
        {
            let Some(email) = attendee.email.as_deref().filter(|e| !e.is_empty()) else {
                continue;
            };
            let Ok((contact_id, _)) = cortex_identity::get_or_create_contact(
                store,
                "email",
                email,
                attendee.display_name.as_deref(),
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
        Ok(())
    }
}

impl SyncAdapter for CalendarAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn sync(&self, ctx: &SyncContext, store: &Store, full: bool) -> Result<SyncResult> {
        apply_pragmas(store, full)?;

        let mut result = SyncResult::default();
        let mut tracker = WatermarkTracker::new();
        let mut timer = PhaseTimer::new();

        timer.phase("calendars");
        let calendars = self.source.calendars()?;

        let today = Utc::now().date_naive();
        let horizon = today + ChronoDuration::days(365);
        let cursor = store.get_adapter_state(&self.name, BACKFILL_KEY)?;

        let needs_backfill = full || cursor.as_deref().is_none_or(|c| !c.is_empty());
        if needs_backfill {
            timer.phase("backfill");
            let resume = if full {
                None
            } else {
                cursor
                    .as_deref()
                    .and_then(|c| c.strip_prefix("backfill:"))
                    .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            };
            let mut month =
                resume.unwrap_or_else(|| NaiveDate::from_ymd_opt(2004, 1, 1).expect("epoch"));
            while month < horizon {
                ctx.checkpoint()?;
                let next = next_month(month);
                self.import_window(
                    ctx,
                    store,
                    &calendars,
                    month,
                    next.min(horizon),
                    &mut tracker,
                    &mut result,
                )?;
                store.set_adapter_state(
                    &self.name,
                    BACKFILL_KEY,
                    &format!("backfill:{}", next.format("%Y-%m-%d")),
                )?;
                month = next;
            }
            store.set_adapter_state(&self.name, BACKFILL_KEY, "")?;
        } else {
            timer.phase("window");
            let from = today - ChronoDuration::days(30);
            self.import_window(ctx, store, &calendars, from, horizon, &mut tracker, &mut result)?;
        }

        tracker.advance(store, &self.name)?;

        result.duration = timer.total();
        result.perf = timer.into_entries();
        Ok(result)
    }
}

fn event_time_to_unix(time: &EventTime) -> Option<i64> {
    if let Some(date_time) = &time.date_time {
        return DateTime::parse_from_rfc3339(date_time)
            .ok()
            .map(|dt| dt.timestamp());
    }
    let date = NaiveDate::parse_from_str(time.date.as_deref()?, "%Y-%m-%d").ok()?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp())
}

fn next_month(d: NaiveDate) -> NaiveDate {
    if d.month() == 12 {
        NaiveDate::from_ymd_opt(d.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(d.year(), d.month() + 1, 1)
    }
    .expect("next month")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct FakeCalendar {
        events: Vec<CalendarEvent>,
        windows: Mutex<Vec<(NaiveDate, NaiveDate)>>,
    }

    impl CalendarSource for Arc<FakeCalendar> {
        fn calendars(&self) -> Result<Vec<Calendar>> {
            Ok(vec![Calendar {
                id: "primary".to_string(),
                summary: Some("Personal".to_string()),
            }])
        }

        fn events(
            &self,
            _calendar_id: &str,
            from: NaiveDate,
            to: NaiveDate,
        ) -> Result<Vec<CalendarEvent>> {
            self.windows.lock().unwrap().push((from, to));
            Ok(self
                .events
                .iter()
                .filter(|e| {
                    e.start
                        .as_ref()
                        .and_then(event_time_to_unix)
                        .map(|ts| {
                            let from = from.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp();
                            let to = to.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp();
                            ts >= from && ts < to
                        })
                        .unwrap_or(false)
                })
                .cloned()
                .collect())
        }
    }

    fn fixture_event(id: &str, rfc3339: &str) -> CalendarEvent {
        CalendarEvent {
            id: id.to_string(),
            summary: Some("Standup".to_string()),
            description: Some("Daily standup".to_string()),
            start: Some(EventTime {
                date_time: Some(rfc3339.to_string()),
                date: None,
            }),
            organizer: Some(Attendee {
                email: Some("boss@example.com".to_string()),
                display_name: Some("The Boss".to_string()),
            }),
            attendees: vec![Attendee {
                email: Some("me@example.com".to_string()),
                display_name: None,
            }],
        }
    }

    #[test]
    fn test_backfill_then_incremental_window() {
        let source = Arc::new(FakeCalendar {
            events: vec![fixture_event("ev1", "2024-03-05T09:00:00Z")],
            ..Default::default()
        });
        let store = Store::open_in_memory().unwrap();
        let adapter = CalendarAdapter::with_source("calendar".to_string(), Box::new(source.clone()));

        let result = adapter.sync(&SyncContext::default(), &store, false).unwrap();
        assert_eq!(result.events_created, 1);
        assert_eq!(result.threads_created, 1);

        let event = store.get_event("calendar:ev1").unwrap().unwrap();
        assert_eq!(event.content_types, r#"["calendar_event"]"#);
        assert_eq!(event.direction, "observed");
        assert_eq!(event.thread_id.as_deref(), Some("calendar:primary"));

        let roles: Vec<String> = store
            .participants_for_event("calendar:ev1")
            .unwrap()
            .into_iter()
            .map(|(_, role)| role)
            .collect();
        assert!(roles.contains(&"organizer".to_string()));
        assert!(roles.contains(&"attendee".to_string()));

        // Backfill finished: cursor cleared, next run uses one window.
        assert_eq!(
            store.get_adapter_state("calendar", BACKFILL_KEY).unwrap(),
            Some(String::new())
        );
        source.windows.lock().unwrap().clear();
        let second = adapter.sync(&SyncContext::default(), &store, false).unwrap();
        assert_eq!(second.events_created, 0);
        assert_eq!(source.windows.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_all_day_event_timestamp() {
        let time = EventTime {
            date_time: None,
            date: Some("2024-03-05".to_string()),
        };
        assert_eq!(event_time_to_unix(&time), Some(1_709_596_800));
    }
}
