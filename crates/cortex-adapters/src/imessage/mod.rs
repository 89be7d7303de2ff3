//! Chat-database adapter. Reads the local iMessage store and mirrors
//! contacts, threads, messages, attachments, reactions, and group
//! membership changes. The `eve` config type is a legacy alias for this
//! adapter.

pub mod upstream;

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

use cortex_store::{AttachmentRecord, EventRecord, Store, ThreadRecord};
use cortex_types::{ContentType, Direction, ParticipantRole, SyncResult};

use crate::contract::{SyncAdapter, SyncContext, apply_event, apply_pragmas};
use crate::error::{Error, Result};
use crate::perf::PhaseTimer;
use crate::subprocess::CliRunner;
use crate::watermark::WatermarkTracker;
use upstream::{ChatDb, MessageRow, apple_date_to_unix};

const CHANNEL: &str = "imessage";

/// Reaction codes map to a fixed emoji table; 3000-range codes are
/// removals and are skipped.
fn reaction_emoji(code: i64) -> Option<&'static str> {
    match code {
        2000 => Some("❤️"),
        2001 => Some("👍"),
        2002 => Some("👎"),
        2003 => Some("😂"),
        2004 => Some("‼️"),
        2005 => Some("❓"),
        _ => None,
    }
}

/// Reaction targets arrive as `p:0/<guid>` or `bp:<guid>`.
fn clean_associated_guid(raw: &str) -> &str {
    if let Some(idx) = raw.find('/') {
        &raw[idx + 1..]
    } else if let Some(stripped) = raw.strip_prefix("bp:") {
        stripped
    } else {
        raw
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ImessageOptions {
    /// Path to the chat database. Defaults to the OS location.
    pub db_path: Option<PathBuf>,
    /// Out-of-process command reporting the owner's card as
    /// `{name, phones, emails}`.
    #[serde(default)]
    pub me_command: Vec<String>,
    /// Optional out-of-process address-book dump, an array of
    /// `{name, phones, emails}`.
    #[serde(default)]
    pub contacts_command: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct UpstreamCard {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    phones: Vec<String>,
    #[serde(default)]
    emails: Vec<String>,
}

pub struct ImessageAdapter {
    name: String,
    options: ImessageOptions,
}

impl ImessageAdapter {
    pub fn new(name: String, options: ImessageOptions) -> Self {
        Self { name, options }
    }

    fn db_path(&self) -> PathBuf {
        self.options.db_path.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_default()
                .join("Library/Messages/chat.db")
        })
    }

    fn identifier_type_for(handle: &str) -> &'static str {
        if handle.contains('@') { "email" } else { "phone" }
    }

    /// Phase 1: seed the me-person and its identifiers.
    fn seed_me(&self, store: &Store, result: &mut SyncResult) -> Result<Option<String>> {
        let card = if self.options.me_command.is_empty() {
            None
        } else {
            let runner = CliRunner::new(self.options.me_command[0].clone())
                .with_base_args(self.options.me_command[1..].to_vec());
            match runner.run_json::<UpstreamCard>(&[]) {
                Ok(card) => card,
                Err(err) => {
                    tracing::warn!(%err, "me command failed, keeping existing me-person");
                    None
                }
            }
        };

        let Some(card) = card else {
            return Ok(cortex_identity::me_person(store)
                .map_err(Error::from)?
                .map(|p| p.id));
        };

        let name = card.name.as_deref().unwrap_or("");
        let (me_id, created) = cortex_identity::ensure_me_person(store, name)?;
        if created {
            result.persons_created += 1;
        }

        for (identifier_type, values) in [("phone", &card.phones), ("email", &card.emails)] {
            for raw in values {
                let Ok((contact_id, _)) = cortex_identity::get_or_create_contact(
                    store,
                    identifier_type,
                    raw,
                    card.name.as_deref(),
                    &self.name,
                ) else {
                    continue;
                };
                cortex_identity::ensure_person_contact_link(
                    store,
                    &me_id,
                    &contact_id,
                    "deterministic",
                    1.0,
                )?;
            }
        }
        Ok(Some(me_id))
    }

    /// A contact id representing the owner, for participant rows.
    fn me_contact(&self, store: &Store, me_person: Option<&str>) -> Result<Option<String>> {
        let Some(person_id) = me_person else {
            return Ok(None);
        };
        use rusqlite::OptionalExtension;
        let contact: Option<String> = store
            .conn()
            .prepare_cached(
                "SELECT contact_id FROM person_contact_links
                 WHERE person_id = ?1 ORDER BY confidence DESC, first_seen ASC LIMIT 1",
            )
            .map_err(Error::from)?
            .query_row([person_id], |row| row.get(0))
            .optional()
            .map_err(Error::from)?;
        Ok(contact)
    }

    /// Phase 2: upstream contacts plus every handle in the chat database.
    fn sync_contacts(
        &self,
        ctx: &SyncContext,
        store: &Store,
        db: &ChatDb,
        result: &mut SyncResult,
    ) -> Result<HashMap<i64, String>> {
        if !self.options.contacts_command.is_empty() {
            let runner = CliRunner::new(self.options.contacts_command[0].clone())
                .with_base_args(self.options.contacts_command[1..].to_vec());
            let cards: Vec<UpstreamCard> = runner.run_json(&[])?.unwrap_or_default();
            for card in cards {
                ctx.checkpoint()?;
                self.import_card(store, &card, result)?;
            }
        }

        let mut by_rowid = HashMap::new();
        for handle in db.handles()? {
            ctx.checkpoint()?;
            let identifier_type = Self::identifier_type_for(&handle.id);
            match cortex_identity::get_or_create_contact(
                store,
                identifier_type,
                &handle.id,
                None,
                &self.name,
            ) {
                Ok((contact_id, _)) => {
                    by_rowid.insert(handle.rowid, contact_id);
                }
                Err(err) => tracing::debug!(handle = %handle.id, %err, "skipping handle"),
            }
        }
        Ok(by_rowid)
    }

    fn import_card(
        &self,
        store: &Store,
        card: &UpstreamCard,
        result: &mut SyncResult,
    ) -> Result<()> {
        let mut contact_ids = Vec::new();
        for (identifier_type, values) in [("phone", &card.phones), ("email", &card.emails)] {
            for raw in values {
                if let Ok((contact_id, _)) = cortex_identity::get_or_create_contact(
                    store,
                    identifier_type,
                    raw,
                    card.name.as_deref(),
                    &self.name,
                ) {
                    contact_ids.push(contact_id);
                }
            }
        }

        let name = card.name.as_deref().unwrap_or("");
        if cortex_identity::is_meaningful_name(name) {
            for contact_id in &contact_ids {
                let (_, created) = cortex_identity::ensure_person_for_contact(
                    store,
                    contact_id,
                    name,
                    "deterministic",
                    1.0,
                )?;
                if created {
                    result.persons_created += 1;
                }
            }
        }
        Ok(())
    }

    /// Phase 3: one thread per chat. Returns chat rowid → thread id.
    fn sync_threads(
        &self,
        ctx: &SyncContext,
        store: &Store,
        db: &ChatDb,
        result: &mut SyncResult,
    ) -> Result<HashMap<i64, String>> {
        let tx = store.begin().map_err(Error::from)?;
        let mut by_rowid = HashMap::new();
        for chat in db.chats()? {
            ctx.checkpoint()?;
            let thread_id = format!("{CHANNEL}:{}", chat.guid);
            let name = chat.display_name.filter(|n| !n.is_empty()).or(chat.chat_identifier);
            let outcome = store.upsert_thread(&ThreadRecord {
                id: thread_id.clone(),
                channel: CHANNEL.to_string(),
                name,
                source_adapter: self.name.clone(),
                source_id: chat.guid.clone(),
            })?;
            if outcome.is_created() {
                result.threads_created += 1;
            } else if outcome.is_updated() {
                result.threads_updated += 1;
            }
            by_rowid.insert(chat.rowid, thread_id);
        }
        tx.commit()
            .map_err(|err| Error::Transaction(err.to_string()))?;
        Ok(by_rowid)
    }

    fn event_for_message(
        &self,
        msg: &MessageRow,
        threads: &HashMap<i64, String>,
    ) -> Option<EventRecord> {
        let has_text = msg.text.as_deref().is_some_and(|t| !t.trim().is_empty());
        let mut content_types = Vec::new();
        if has_text {
            content_types.push(ContentType::Text);
        }
        if msg.cache_has_attachments {
            content_types.push(ContentType::Attachment);
        }
        if content_types.is_empty() {
            return None;
        }

        Some(EventRecord {
            id: format!("{CHANNEL}:{}", msg.guid),
            timestamp: apple_date_to_unix(msg.date),
            channel: CHANNEL.to_string(),
            content_types: ContentType::encode(&content_types),
            content: msg.text.clone().unwrap_or_default(),
            direction: if msg.is_from_me {
                Direction::Sent
            } else {
                Direction::Received
            }
            .as_str()
            .to_string(),
            thread_id: msg.chat_rowid.and_then(|id| threads.get(&id)).cloned(),
            reply_to: None,
            source_adapter: self.name.clone(),
            source_id: msg.guid.clone(),
            metadata_json: None,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn sync_messages(
        &self,
        ctx: &SyncContext,
        store: &Store,
        messages: &[MessageRow],
        threads: &HashMap<i64, String>,
        contacts: &HashMap<i64, String>,
        me_contact: Option<&str>,
        tracker: &mut WatermarkTracker,
        result: &mut SyncResult,
    ) -> Result<()> {
        let tx = store.begin().map_err(Error::from)?;
        for msg in messages {
            ctx.checkpoint()?;
            if msg.associated_message_type != 0 || msg.item_type != 0 {
                continue;
            }
            let Some(event) = self.event_for_message(msg, threads) else {
                continue;
            };

            let outcome = apply_event(store, &event)?;
            if outcome.is_created() {
                result.events_created += 1;
            } else if outcome.is_updated() {
                result.events_updated += 1;
            }
            tracker.observe(msg.date, &event.id);

            let handle_contact = contacts.get(&msg.handle_id).map(|s| s.as_str());
            let (sender, recipient) = if msg.is_from_me {
                (me_contact, handle_contact)
            } else {
                (handle_contact, me_contact)
            };
            for (contact, role) in [
                (sender, ParticipantRole::Sender),
                (recipient, ParticipantRole::Recipient),
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
        tx.commit()
            .map_err(|err| Error::Transaction(err.to_string()))?;
        Ok(())
    }

    fn sync_attachments(
        &self,
        ctx: &SyncContext,
        store: &Store,
        db: &ChatDb,
        since: i64,
        messages: &[MessageRow],
        result: &mut SyncResult,
    ) -> Result<()> {
        let guid_by_rowid: HashMap<i64, &str> = messages
            .iter()
            .map(|m| (m.rowid, m.guid.as_str()))
            .collect();

        let tx = store.begin().map_err(Error::from)?;
        for att in db.attachments_since(since)? {
            ctx.checkpoint()?;
            let Some(msg_guid) = guid_by_rowid.get(&att.message_rowid) else {
                continue;
            };
            let event_id = format!("{CHANNEL}:{msg_guid}");
            if store.get_event(&event_id)?.is_none() {
                continue;
            }

            let mime = att.mime_type.clone().unwrap_or_default();
            let media_type = cortex_types::media_type_for(&mime, att.is_sticker);
            let outcome = store.upsert_attachment(&AttachmentRecord {
                id: cortex_store::new_row_id(),
                event_id,
                filename: att.transfer_name.clone().or_else(|| {
                    att.filename
                        .as_deref()
                        .and_then(|f| f.rsplit('/').next())
                        .map(str::to_string)
                }),
                mime_type: att.mime_type.clone(),
                size: att.total_bytes,
                media_type: media_type.as_str().to_string(),
                storage_uri: att.filename.clone(),
                storage_type: att.filename.as_ref().map(|_| "file".to_string()),
                content_hash: None,
                source_id: Some(att.guid.clone()),
                metadata_json: None,
            })?;
            if outcome.is_created() {
                result.attachments_created += 1;
            } else if outcome.is_updated() {
                result.attachments_updated += 1;
            }
        }
        tx.commit()
            .map_err(|err| Error::Transaction(err.to_string()))?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn sync_reactions(
        &self,
        ctx: &SyncContext,
        store: &Store,
        messages: &[MessageRow],
        threads: &HashMap<i64, String>,
        contacts: &HashMap<i64, String>,
        me_contact: Option<&str>,
        tracker: &mut WatermarkTracker,
        result: &mut SyncResult,
    ) -> Result<()> {
        let tx = store.begin().map_err(Error::from)?;
        for msg in messages {
            ctx.checkpoint()?;
            let Some(emoji) = reaction_emoji(msg.associated_message_type) else {
                continue;
            };
            let Some(target_raw) = msg.associated_message_guid.as_deref() else {
                continue;
            };
            let reply_to = format!("{CHANNEL}:{}", clean_associated_guid(target_raw));

            let event = EventRecord {
                id: format!("{CHANNEL}:{}", msg.guid),
                timestamp: apple_date_to_unix(msg.date),
                channel: CHANNEL.to_string(),
                content_types: ContentType::encode(&[ContentType::Reaction]),
                content: emoji.to_string(),
                direction: if msg.is_from_me {
                    Direction::Sent
                } else {
                    Direction::Received
                }
                .as_str()
                .to_string(),
                thread_id: msg.chat_rowid.and_then(|id| threads.get(&id)).cloned(),
                reply_to: Some(reply_to),
                source_adapter: self.name.clone(),
                source_id: msg.guid.clone(),
                metadata_json: None,
            };
            let outcome = apply_event(store, &event)?;
            if outcome.is_created() {
                result.reactions_created += 1;
            } else if outcome.is_updated() {
                result.reactions_updated += 1;
            }
            tracker.observe(msg.date, &event.id);

            let sender = if msg.is_from_me {
                me_contact
            } else {
                contacts.get(&msg.handle_id).map(|s| s.as_str())
            };
            if let Some(contact_id) = sender
                && store
                    .insert_participant(&event.id, contact_id, ParticipantRole::Sender.as_str())
                    .is_err()
            {
                result.participants_skipped += 1;
            }
        }
        tx.commit()
            .map_err(|err| Error::Transaction(err.to_string()))?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn sync_memberships(
        &self,
        ctx: &SyncContext,
        store: &Store,
        messages: &[MessageRow],
        threads: &HashMap<i64, String>,
        contacts: &HashMap<i64, String>,
        tracker: &mut WatermarkTracker,
        result: &mut SyncResult,
    ) -> Result<()> {
        let tx = store.begin().map_err(Error::from)?;
        for msg in messages {
            ctx.checkpoint()?;
            if msg.item_type != 1 {
                continue;
            }
            let action = match msg.group_action_type {
                0 => "added",
                1 => "removed",
                _ => continue,
            };
            let member = contacts.get(&msg.other_handle).cloned();
            let actor = contacts.get(&msg.handle_id).cloned();
            let metadata = serde_json::json!({
                "action": action,
                "member_contact_id": member,
                "actor_contact_id": actor,
            });

            let event = EventRecord {
                id: format!("{CHANNEL}:{}", msg.guid),
                timestamp: apple_date_to_unix(msg.date),
                channel: CHANNEL.to_string(),
                content_types: ContentType::encode(&[ContentType::Membership]),
                content: action.to_string(),
                direction: Direction::Observed.as_str().to_string(),
                thread_id: msg.chat_rowid.and_then(|id| threads.get(&id)).cloned(),
                reply_to: None,
                source_adapter: self.name.clone(),
                source_id: msg.guid.clone(),
                metadata_json: Some(metadata.to_string()),
            };
            let outcome = apply_event(store, &event)?;
            if outcome.is_created() {
                result.events_created += 1;
            } else if outcome.is_updated() {
                result.events_updated += 1;
            }
            tracker.observe(msg.date, &event.id);

            if let Some(member_id) = &member
                && store
                    .insert_participant(&event.id, member_id, ParticipantRole::Member.as_str())
                    .is_err()
            {
                result.participants_skipped += 1;
            }
        }
        tx.commit()
            .map_err(|err| Error::Transaction(err.to_string()))?;
        Ok(())
    }
}

impl SyncAdapter for ImessageAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn sync(&self, ctx: &SyncContext, store: &Store, full: bool) -> Result<SyncResult> {
        apply_pragmas(store, full)?;
        let db = ChatDb::open(&self.db_path())?;

        let since = if full {
            0
        } else {
            store
                .get_watermark(&self.name)
                .map_err(Error::from)?
                .map(|wm| wm.last_sync_at)
                .unwrap_or(0)
        };

        let mut result = SyncResult::default();
        let mut tracker = WatermarkTracker::new();
        let mut timer = PhaseTimer::new();

        timer.phase("me");
        let me_person = self.seed_me(store, &mut result)?;
        let me_contact = self.me_contact(store, me_person.as_deref())?;

        timer.phase("contacts");
        let contacts = self.sync_contacts(ctx, store, &db, &mut result)?;

        timer.phase("threads");
        let threads = self.sync_threads(ctx, store, &db, &mut result)?;

        timer.phase("messages");
        let messages = db.messages_since(since)?;
        self.sync_messages(
            ctx,
            store,
            &messages,
            &threads,
            &contacts,
            me_contact.as_deref(),
            &mut tracker,
            &mut result,
        )?;

        timer.phase("attachments");
        self.sync_attachments(ctx, store, &db, since, &messages, &mut result)?;

        timer.phase("reactions");
        self.sync_reactions(
            ctx,
            store,
            &messages,
            &threads,
            &contacts,
            me_contact.as_deref(),
            &mut tracker,
            &mut result,
        )?;

        timer.phase("memberships");
        self.sync_memberships(
            ctx,
            store,
            &messages,
            &threads,
            &contacts,
            &mut tracker,
            &mut result,
        )?;

        tracker.advance(store, &self.name)?;

        result.duration = timer.total();
        result.perf = timer.into_entries();
        Ok(result)
    }
}

#[cfg(test)]
mod tests;
