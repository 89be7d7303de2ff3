//! Bird (X/Twitter) adapter. Three sub-syncs over the external CLI -
//! bookmarks, likes, mentions - each fetching the latest N tweets.

use chrono::DateTime;
use serde::Deserialize;

use cortex_store::{EventRecord, Store};
use cortex_types::{ContentType, Direction, ParticipantRole, SyncResult};

use crate::contract::{SyncAdapter, SyncContext, apply_event, apply_pragmas};
use crate::error::{Error, Result};
use crate::perf::PhaseTimer;
use crate::subprocess::CliRunner;
use crate::watermark::WatermarkTracker;

const CHANNEL: &str = "x";
const SUB_SYNCS: [&str; 3] = ["bookmarks", "likes", "mentions"];

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Author {
    pub username: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tweet {
    pub id: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub author: Option<Author>,
}

/// Seam over the tweet fetcher CLI.
pub trait BirdSource: Send + Sync {
    fn fetch(&self, sub_sync: &str, count: u32) -> Result<Vec<Tweet>>;
}

pub struct BirdCli {
    runner: CliRunner,
}

impl BirdCli {
    pub fn new(bin: &str) -> Self {
        Self {
            runner: CliRunner::new(bin),
        }
    }
}

impl BirdSource for BirdCli {
    fn fetch(&self, sub_sync: &str, count: u32) -> Result<Vec<Tweet>> {
        let count = count.to_string();
        Ok(self
            .runner
            .run_json(&[sub_sync, "-n", &count])?
            .unwrap_or_default())
    }
}

fn default_bin() -> String {
    "bird".to_string()
}
fn default_count() -> u32 {
    50
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BirdOptions {
    #[serde(default = "default_bin")]
    pub bin: String,
    #[serde(default = "default_count")]
    pub count: u32,
}

impl Default for BirdOptions {
    fn default() -> Self {
        Self {
            bin: default_bin(),
            count: default_count(),
        }
    }
}

pub struct BirdAdapter {
    name: String,
    options: BirdOptions,
    source: Box<dyn BirdSource>,
}

impl BirdAdapter {
    pub fn new(name: String, options: BirdOptions) -> Self {
        let source = BirdCli::new(&options.bin);
        Self {
            name,
            options,
            source: Box::new(source),
        }
    }

    pub fn with_source(name: String, options: BirdOptions, source: Box<dyn BirdSource>) -> Self {
        Self {
            name,
            options,
            source,
        }
    }

    fn import_tweets(
        &self,
        ctx: &SyncContext,
        store: &Store,
        sub_sync: &str,
        tweets: &[Tweet],
        tracker: &mut WatermarkTracker,
        result: &mut SyncResult,
    ) -> Result<()> {
        let tx = store.begin().map_err(Error::from)?;
        for tweet in tweets {
            ctx.checkpoint()?;
            let Some(timestamp) = tweet.created_at.as_deref().and_then(parse_tweet_time) else {
                tracing::debug!(tweet_id = %tweet.id, "tweet without parseable created_at, skipped");
                continue;
            };

            let author = tweet.author.clone().unwrap_or_default();
            let event_id = format!("{CHANNEL}:{}", tweet.id);
            let event = EventRecord {
                id: event_id.clone(),
                timestamp,
                channel: CHANNEL.to_string(),
                content_types: ContentType::encode(&[ContentType::Text]),
                content: tweet.text.clone().unwrap_or_default(),
                direction: Direction::Observed.as_str().to_string(),
                thread_id: None,
                reply_to: None,
                source_adapter: self.name.clone(),
                source_id: tweet.id.clone(),
                metadata_json: author
                    .username
                    .as_deref()
                    .map(|u| serde_json::json!({ "author": u }).to_string()),
            };
            let outcome = apply_event(store, &event)?;
            if outcome.is_created() {
                result.events_created += 1;
            } else if outcome.is_updated() {
                result.events_updated += 1;
            }
            tracker.observe(timestamp, &event_id);
            // Sub-sync membership is additive: a tweet can be both
            // bookmarked and liked.
            store.add_event_tag(&event_id, &format!("bird:{sub_sync}"))?;

            if let Some(username) = author.username.as_deref().filter(|u| !u.is_empty()) {
                if let Ok((contact_id, _)) = cortex_identity::get_or_create_contact(
                    store,
                    "handle",
                    username,
                    author.name.as_deref(),
                    &self.name,
                ) {
                    if store
                        .insert_participant(&event_id, &contact_id, ParticipantRole::Sender.as_str())
                        .is_err()
                    {
                        result.participants_skipped += 1;
                    }
                    if let Some(name) =
                        author.name.as_deref().filter(|n| cortex_identity::is_meaningful_name(n))
                    {
                        let (_, created) = cortex_identity::ensure_person_for_contact(
                            store,
                            &contact_id,
                            name,
                            "heuristic",
                            0.9,
                        )?;
                        if created {
                            result.persons_created += 1;
                        }
                    }
                }
            }
        }
        tx.commit()
            .map_err(|err| Error::Transaction(err.to_string()))?;
        Ok(())
    }
}

impl SyncAdapter for BirdAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn sync(&self, ctx: &SyncContext, store: &Store, full: bool) -> Result<SyncResult> {
        apply_pragmas(store, full)?;

        let mut result = SyncResult::default();
        let mut tracker = WatermarkTracker::new();
        let mut timer = PhaseTimer::new();

        for sub_sync in SUB_SYNCS {
            ctx.checkpoint()?;
            timer.phase(sub_sync);
            match self.source.fetch(sub_sync, self.options.count) {
                Ok(tweets) => {
                    self.import_tweets(ctx, store, sub_sync, &tweets, &mut tracker, &mut result)?;
                }
                Err(Error::Environment(err)) => return Err(Error::Environment(err)),
                Err(err) => {
                    // One failing sub-sync does not abort the others.
                    tracing::warn!(adapter = %self.name, sub_sync, %err, "sub-sync failed, skipping");
                }
            }
        }

        tracker.advance(store, &self.name)?;

        result.duration = timer.total();
        result.perf = timer.into_entries();
        Ok(result)
    }
}

/// Tweets arrive with RFC 3339 or classic Twitter timestamps.
fn parse_tweet_time(raw: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.timestamp());
    }
    DateTime::parse_from_str(raw, "%a %b %d %H:%M:%S %z %Y")
        .ok()
        .map(|dt| dt.timestamp())
}
