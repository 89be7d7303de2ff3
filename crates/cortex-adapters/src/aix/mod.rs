//! AI-session adapter over the shared assistant database.
//!
//! Two variants share the upstream reader:
//! - `agents`: full fidelity - sessions, messages, turns, and tool calls
//!   mirrored into the parallel `aix_*` tables for downstream analysis
//! - `events`: trimmed to the user-visible conversation - one event per
//!   turn's consolidated user query and one per final assistant text

pub mod upstream;

use std::path::PathBuf;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use cortex_store::{
    AixMessageRecord, AixSessionRecord, AixToolCallRecord, AixTurnRecord, EventRecord, Store,
    ThreadRecord,
};
use cortex_types::{ContentType, Direction, ParticipantRole, SyncResult};

use crate::contract::{SyncAdapter, SyncContext, apply_event, apply_pragmas};
use crate::error::{Error, Result};
use crate::perf::PhaseTimer;
use crate::watermark::WatermarkTracker;
use upstream::{AixDb, MessageRow, SessionRow};

static THINKING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<thinking>.*?</thinking>").unwrap());
static TOOL_BLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<tool_call>.*?</tool_call>").unwrap());

/// Strip thinking and tool-call blocks from assistant text.
fn strip_assistant_text(raw: &str) -> String {
    let without_thinking = THINKING_RE.replace_all(raw, "");
    TOOL_BLOCK_RE
        .replace_all(&without_thinking, "")
        .trim()
        .to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AixVariant {
    Agents,
    #[default]
    Events,
}

fn default_source() -> String {
    "cursor".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AixOptions {
    pub db_path: PathBuf,
    /// Which assistant's rows to ingest (`cursor`, `codex`, `nexus`, ...).
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default)]
    pub variant: AixVariant,
}

pub struct AixAdapter {
    name: String,
    options: AixOptions,
}

/// One conversational turn: the consolidated user query and the final
/// assistant reply.
struct Turn {
    idx: i64,
    user_text: String,
    assistant_text: Option<String>,
    model: Option<String>,
    started_at: i64,
    ended_at: Option<i64>,
}

fn build_turns(messages: &[MessageRow]) -> Vec<Turn> {
    let mut turns: Vec<Turn> = Vec::new();
    for msg in messages {
        match msg.role.as_str() {
            "user" => {
                let text = msg.content.clone().unwrap_or_default();
                match turns.last_mut() {
                    // Consecutive user messages consolidate into one query.
                    Some(turn) if turn.assistant_text.is_none() => {
                        if !text.trim().is_empty() {
                            if !turn.user_text.is_empty() {
                                turn.user_text.push_str("\n\n");
                            }
                            turn.user_text.push_str(&text);
                        }
                    }
                    _ => {
                        turns.push(Turn {
                            idx: turns.len() as i64,
                            user_text: text,
                            assistant_text: None,
                            model: None,
                            started_at: msg.created_at,
                            ended_at: None,
                        });
                    }
                }
            }
            "assistant" => {
                if let Some(turn) = turns.last_mut() {
                    let stripped =
                        strip_assistant_text(msg.content.as_deref().unwrap_or_default());
                    if !stripped.is_empty() {
                        turn.assistant_text = Some(stripped);
                    }
                    turn.model = msg.model.clone().or_else(|| turn.model.clone());
                    turn.ended_at = Some(msg.created_at);
                }
            }
            _ => {}
        }
    }
    turns
}

impl AixAdapter {
    pub fn new(name: String, options: AixOptions) -> Self {
        Self { name, options }
    }

    fn channel(&self) -> &str {
        &self.options.source
    }

    fn sync_agents(
        &self,
        ctx: &SyncContext,
        store: &Store,
        db: &AixDb,
        sessions: &[SessionRow],
        tracker: &mut WatermarkTracker,
        result: &mut SyncResult,
    ) -> Result<()> {
        let tx = store.begin().map_err(Error::from)?;
        for session in sessions {
            ctx.checkpoint()?;
            let outcome = store.upsert_aix_session(&AixSessionRecord {
                id: session.id.clone(),
                source: session.source.clone(),
                title: session.title.clone(),
                cwd: session.cwd.clone(),
                created_at: session.created_at,
                updated_at: session.updated_at,
            })?;
            if outcome.is_created() {
                result.threads_created += 1;
            } else if outcome.is_updated() {
                result.threads_updated += 1;
            }

            let messages = db.messages_for_session(&session.id)?;
            for msg in &messages {
                let outcome = store.upsert_aix_message(&AixMessageRecord {
                    id: msg.id.clone(),
                    session_id: msg.session_id.clone(),
                    role: msg.role.clone(),
                    content: msg.content.clone(),
                    model: msg.model.clone(),
                    created_at: msg.created_at,
                })?;
                if outcome.is_created() {
                    result.events_created += 1;
                } else if outcome.is_updated() {
                    result.events_updated += 1;
                }
                tracker.observe(msg.created_at, &msg.id);

                for call in extract_tool_calls(msg) {
                    store.upsert_aix_tool_call(&call)?;
                }
            }

            for turn in build_turns(&messages) {
                store.upsert_aix_turn(&AixTurnRecord {
                    id: format!("{}:{}", session.id, turn.idx),
                    session_id: session.id.clone(),
                    idx: turn.idx,
                    user_text: Some(turn.user_text),
                    assistant_text: turn.assistant_text,
                    started_at: turn.started_at,
                    ended_at: turn.ended_at,
                })?;
            }
        }
        tx.commit()
            .map_err(|err| Error::Transaction(err.to_string()))?;
        Ok(())
    }

    fn sync_events(
        &self,
        ctx: &SyncContext,
        store: &Store,
        db: &AixDb,
        sessions: &[SessionRow],
        tracker: &mut WatermarkTracker,
        result: &mut SyncResult,
    ) -> Result<()> {
        let channel = self.channel().to_string();

        let me_contact = cortex_identity::get_or_create_contact(
            store,
            "human",
            &format!("{channel}:me"),
            None,
            &self.name,
        )
        .ok()
        .map(|(id, _)| id);

        let tx = store.begin().map_err(Error::from)?;
        for session in sessions {
            ctx.checkpoint()?;
            let thread_id = format!("{channel}:{}", session.id);
            let outcome = store.upsert_thread(&ThreadRecord {
                id: thread_id.clone(),
                channel: channel.clone(),
                name: session.title.clone(),
                source_adapter: self.name.clone(),
                source_id: session.id.clone(),
            })?;
            if outcome.is_created() {
                result.threads_created += 1;
            } else if outcome.is_updated() {
                result.threads_updated += 1;
            }

            let messages = db.messages_for_session(&session.id)?;
            for turn in build_turns(&messages) {
                self.import_turn(store, session, &turn, &thread_id, me_contact.as_deref(), tracker, result)?;
            }

            for msg in &messages {
                self.import_terminal_command(store, msg, tracker, result)?;
            }
        }
        tx.commit()
            .map_err(|err| Error::Transaction(err.to_string()))?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn import_turn(
        &self,
        store: &Store,
        session: &SessionRow,
        turn: &Turn,
        thread_id: &str,
        me_contact: Option<&str>,
        tracker: &mut WatermarkTracker,
        result: &mut SyncResult,
    ) -> Result<()> {
        let channel = self.channel();
        let ai_contact = turn.model.as_deref().and_then(|model| {
            cortex_identity::get_or_create_contact(store, "ai", model, Some(model), &self.name)
                .ok()
                .map(|(id, created)| {
                    if created
                        && let Ok((_, person_created)) = cortex_identity::ensure_person_for_contact(
                            store,
                            &id,
                            model,
                            "deterministic",
                            1.0,
                        )
                        && person_created
                    {
                        result.persons_created += 1;
                    }
                    id
                })
        });

        if !turn.user_text.trim().is_empty() {
            let source_id = format!("{}:{}:user", session.id, turn.idx);
            let event = EventRecord {
                id: format!("{channel}:{source_id}"),
                timestamp: turn.started_at,
                channel: channel.to_string(),
                content_types: ContentType::encode(&[ContentType::Text]),
                content: turn.user_text.clone(),
                direction: Direction::Sent.as_str().to_string(),
                thread_id: Some(thread_id.to_string()),
                reply_to: None,
                source_adapter: self.name.clone(),
                source_id,
                metadata_json: None,
            };
            let outcome = apply_event(store, &event)?;
            if outcome.is_created() {
                result.events_created += 1;
            } else if outcome.is_updated() {
                result.events_updated += 1;
            }
            tracker.observe(turn.started_at, &event.id);
            for (contact, role) in [
                (me_contact, ParticipantRole::Sender),
                (ai_contact.as_deref(), ParticipantRole::Recipient),
            ] {
                if let Some(contact_id) = contact
                    && store
                        .insert_participant(&event.id, contact_id, role.as_str())
                        .is_err()
                {
                    result.participants_skipped += 1;
                }
            }
        }

        if let Some(assistant_text) = &turn.assistant_text {
            let timestamp = turn.ended_at.unwrap_or(turn.started_at);
            let source_id = format!("{}:{}:assistant", session.id, turn.idx);
            let reply_to = (!turn.user_text.trim().is_empty())
                .then(|| format!("{channel}:{}:{}:user", session.id, turn.idx));
            let event = EventRecord {
                id: format!("{channel}:{source_id}"),
                timestamp,
                channel: channel.to_string(),
                content_types: ContentType::encode(&[ContentType::Text]),
                content: assistant_text.clone(),
                direction: Direction::Received.as_str().to_string(),
                thread_id: Some(thread_id.to_string()),
                reply_to,
                source_adapter: self.name.clone(),
                source_id,
                metadata_json: turn
                    .model
                    .as_deref()
                    .map(|m| serde_json::json!({ "model": m }).to_string()),
            };
            let outcome = apply_event(store, &event)?;
            if outcome.is_created() {
                result.events_created += 1;
            } else if outcome.is_updated() {
                result.events_updated += 1;
            }
            tracker.observe(timestamp, &event.id);
            for (contact, role) in [
                (ai_contact.as_deref(), ParticipantRole::Sender),
                (me_contact, ParticipantRole::Recipient),
            ] {
                if let Some(contact_id) = contact
                    && store
                        .insert_participant(&event.id, contact_id, role.as_str())
                        .is_err()
                {
                    result.participants_skipped += 1;
                }
            }
        }
        Ok(())
    }

    /// Cursor-specific: a completed terminal command recorded in the
    /// message metadata becomes a secondary event in a sibling adapter
    /// namespace.
    fn import_terminal_command(
        &self,
        store: &Store,
        msg: &MessageRow,
        tracker: &mut WatermarkTracker,
        result: &mut SyncResult,
    ) -> Result<()> {
        let Some(metadata) = msg.metadata.as_deref() else {
            return Ok(());
        };
        let Ok(value) = serde_json::from_str::<serde_json::Value>(metadata) else {
            tracing::debug!(message_id = %msg.id, "unparseable message metadata, skipped");
            return Ok(());
        };
        let former = &value["toolFormerData"];
        if former["status"].as_str() != Some("completed") {
            return Ok(());
        }
        let Some(command) = former["command"].as_str().filter(|c| !c.is_empty()) else {
            return Ok(());
        };

        let namespace = format!("{}_terminal", self.name);
        let event = EventRecord {
            id: format!("{namespace}:{}", msg.id),
            timestamp: msg.created_at,
            channel: format!("{}_terminal", self.channel()),
            content_types: ContentType::encode(&[ContentType::Text]),
            content: command.to_string(),
            direction: Direction::Sent.as_str().to_string(),
            thread_id: None,
            reply_to: None,
            source_adapter: namespace,
            source_id: msg.id.clone(),
            metadata_json: None,
        };
        let outcome = apply_event(store, &event)?;
        if outcome.is_created() {
            result.events_created += 1;
        } else if outcome.is_updated() {
            result.events_updated += 1;
        }
        tracker.observe(msg.created_at, &event.id);
        Ok(())
    }
}

fn extract_tool_calls(msg: &MessageRow) -> Vec<AixToolCallRecord> {
    let Some(metadata) = msg.metadata.as_deref() else {
        return Vec::new();
    };
    let Ok(value) = serde_json::from_str::<serde_json::Value>(metadata) else {
        return Vec::new();
    };
    let Some(calls) = value["tool_calls"].as_array() else {
        return Vec::new();
    };

    calls
        .iter()
        .enumerate()
        .filter_map(|(i, call)| {
            let name = call["name"].as_str()?;
            let id = call["id"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| format!("{}:{}", msg.id, i));
            Some(AixToolCallRecord {
                id,
                message_id: msg.id.clone(),
                name: name.to_string(),
                arguments_json: call.get("arguments").map(|a| a.to_string()),
                output: call["output"].as_str().map(str::to_string),
                status: call["status"].as_str().map(str::to_string),
                created_at: msg.created_at,
            })
        })
        .collect()
}

impl SyncAdapter for AixAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn sync(&self, ctx: &SyncContext, store: &Store, full: bool) -> Result<SyncResult> {
        apply_pragmas(store, full)?;
        let db = AixDb::open(&self.options.db_path)?;

        let since = if full {
            0
        } else {
            store
                .get_watermark(&self.name)?
                .map(|wm| wm.last_sync_at)
                .unwrap_or(0)
        };

        let mut result = SyncResult::default();
        let mut tracker = WatermarkTracker::new();
        let mut timer = PhaseTimer::new();

        timer.phase("sessions");
        let sessions = db.sessions_since(&self.options.source, since)?;

        match self.options.variant {
            AixVariant::Agents => {
                timer.phase("mirror");
                self.sync_agents(ctx, store, &db, &sessions, &mut tracker, &mut result)?;
            }
            AixVariant::Events => {
                timer.phase("events");
                self.sync_events(ctx, store, &db, &sessions, &mut tracker, &mut result)?;
            }
        }

        tracker.advance(store, &self.name)?;

        result.duration = timer.total();
        result.perf = timer.into_entries();
        Ok(result)
    }
}

#[cfg(test)]
mod tests;
