use super::upstream::APPLE_EPOCH_OFFSET;
use super::*;
use rusqlite::{Connection, params};
use tempfile::TempDir;

fn apple_ns(unix: i64) -> i64 {
    (unix - APPLE_EPOCH_OFFSET) * 1_000_000_000
}

struct Fixture {
    _dir: TempDir,
    db_path: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("chat.db");
        let conn = Connection::open(&db_path).unwrap();
        conn.execute_batch(
            "CREATE TABLE handle (ROWID INTEGER PRIMARY KEY, id TEXT NOT NULL);
             CREATE TABLE chat (
                 ROWID INTEGER PRIMARY KEY,
                 guid TEXT NOT NULL,
                 chat_identifier TEXT,
                 display_name TEXT
             );
             CREATE TABLE message (
                 ROWID INTEGER PRIMARY KEY,
                 guid TEXT NOT NULL,
                 text TEXT,
                 date INTEGER NOT NULL,
                 is_from_me INTEGER NOT NULL DEFAULT 0,
                 handle_id INTEGER NOT NULL DEFAULT 0,
                 other_handle INTEGER NOT NULL DEFAULT 0,
                 cache_has_attachments INTEGER NOT NULL DEFAULT 0,
                 associated_message_guid TEXT,
                 associated_message_type INTEGER NOT NULL DEFAULT 0,
                 item_type INTEGER NOT NULL DEFAULT 0,
                 group_action_type INTEGER NOT NULL DEFAULT 0
             );
             CREATE TABLE chat_message_join (chat_id INTEGER, message_id INTEGER);
             CREATE TABLE attachment (
                 ROWID INTEGER PRIMARY KEY,
                 guid TEXT NOT NULL,
                 filename TEXT,
                 mime_type TEXT,
                 total_bytes INTEGER,
                 is_sticker INTEGER NOT NULL DEFAULT 0,
                 transfer_name TEXT
             );
             CREATE TABLE message_attachment_join (message_id INTEGER, attachment_id INTEGER);",
        )
        .unwrap();

        conn.execute("INSERT INTO handle (ROWID, id) VALUES (1, '+17072874936')", [])
            .unwrap();
        conn.execute(
            "INSERT INTO chat (ROWID, guid, chat_identifier) VALUES (1, 'chat-1', '+17072874936')",
            [],
        )
        .unwrap();

        Self { _dir: dir, db_path }
    }

    fn conn(&self) -> Connection {
        Connection::open(&self.db_path).unwrap()
    }

    fn insert_message(&self, rowid: i64, guid: &str, text: &str, unix_ts: i64, from_me: bool) {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO message (ROWID, guid, text, date, is_from_me, handle_id)
             VALUES (?1, ?2, ?3, ?4, ?5, 1)",
            params![rowid, guid, text, apple_ns(unix_ts), from_me],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO chat_message_join (chat_id, message_id) VALUES (1, ?1)",
            [rowid],
        )
        .unwrap();
    }

    fn adapter(&self) -> ImessageAdapter {
        ImessageAdapter::new(
            "imessage".to_string(),
            ImessageOptions {
                db_path: Some(self.db_path.clone()),
                ..Default::default()
            },
        )
    }
}

#[test]
fn test_text_with_attachment_end_to_end() {
    let fixture = Fixture::new();
    fixture.insert_message(10, "G1", "hi", 1_700_000_000, true);
    {
        let conn = fixture.conn();
        conn.execute(
            "UPDATE message SET cache_has_attachments = 1 WHERE guid = 'G1'",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO attachment (ROWID, guid, filename, mime_type, total_bytes, transfer_name)
             VALUES (1, 'att-1', '~/Library/Messages/Attachments/ab/IMG_0001.jpeg',
                     'image/jpeg', 120000, 'IMG_0001.jpeg')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO message_attachment_join (message_id, attachment_id) VALUES (10, 1)",
            [],
        )
        .unwrap();
    }

    let store = Store::open_in_memory().unwrap();
    let ctx = SyncContext::default();
    let result = fixture.adapter().sync(&ctx, &store, false).unwrap();

    assert_eq!(result.events_created, 1);
    assert_eq!(result.attachments_created, 1);
    assert_eq!(result.threads_created, 1);

    let event = store.get_event("imessage:G1").unwrap().unwrap();
    assert_eq!(event.content_types, r#"["text","attachment"]"#);
    assert_eq!(event.direction, "sent");
    assert_eq!(event.timestamp, 1_700_000_000);
    assert_eq!(event.thread_id.as_deref(), Some("imessage:chat-1"));

    let attachments = store.attachments_for_event("imessage:G1").unwrap();
    assert_eq!(attachments.len(), 1);
    assert_eq!(attachments[0].media_type, "image");
    assert_eq!(attachments[0].filename.as_deref(), Some("IMG_0001.jpeg"));
}

#[test]
fn test_reaction_maps_to_emoji_and_reply_to() {
    let fixture = Fixture::new();
    fixture.insert_message(10, "G1", "hi", 1_700_000_000, true);
    {
        let conn = fixture.conn();
        conn.execute(
            "INSERT INTO message
             (ROWID, guid, text, date, is_from_me, handle_id,
              associated_message_guid, associated_message_type)
             VALUES (11, 'R1', NULL, ?1, 0, 1, 'p:0/G1', 2000)",
            [apple_ns(1_700_000_100)],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO chat_message_join (chat_id, message_id) VALUES (1, 11)",
            [],
        )
        .unwrap();
    }

    let store = Store::open_in_memory().unwrap();
    let result = fixture
        .adapter()
        .sync(&SyncContext::default(), &store, false)
        .unwrap();
    assert_eq!(result.reactions_created, 1);

    let reaction = store.get_event("imessage:R1").unwrap().unwrap();
    assert_eq!(reaction.content, "❤️");
    assert_eq!(reaction.content_types, r#"["reaction"]"#);
    assert_eq!(reaction.reply_to.as_deref(), Some("imessage:G1"));
}

#[test]
fn test_reaction_removals_are_skipped() {
    let fixture = Fixture::new();
    fixture.insert_message(10, "G1", "hi", 1_700_000_000, true);
    fixture.conn().execute(
        "INSERT INTO message
         (ROWID, guid, date, handle_id, associated_message_guid, associated_message_type)
         VALUES (11, 'R2', ?1, 1, 'p:0/G1', 3000)",
        [apple_ns(1_700_000_100)],
    )
    .unwrap();

    let store = Store::open_in_memory().unwrap();
    fixture
        .adapter()
        .sync(&SyncContext::default(), &store, false)
        .unwrap();
    assert!(store.get_event("imessage:R2").unwrap().is_none());
}

#[test]
fn test_second_sync_is_idempotent() {
    let fixture = Fixture::new();
    fixture.insert_message(10, "G1", "hi", 1_700_000_000, false);

    let store = Store::open_in_memory().unwrap();
    let adapter = fixture.adapter();
    let ctx = SyncContext::default();

    let first = adapter.sync(&ctx, &store, false).unwrap();
    assert_eq!(first.events_created, 1);

    let second = adapter.sync(&ctx, &store, false).unwrap();
    assert_eq!(second.events_created, 0);
    assert_eq!(second.events_updated, 0);
    assert_eq!(second.threads_created, 0);
}

#[test]
fn test_watermark_uses_max_imported_timestamp_not_wall_clock() {
    let fixture = Fixture::new();
    fixture.insert_message(10, "G1", "first", 1_700_000_000, false);

    let store = Store::open_in_memory().unwrap();
    let adapter = fixture.adapter();
    let ctx = SyncContext::default();
    adapter.sync(&ctx, &store, false).unwrap();

    let wm = store.get_watermark("imessage").unwrap().unwrap();
    assert_eq!(wm.last_sync_at, apple_ns(1_700_000_000));

    // A backdated event: older than wall clock, newer than the watermark.
    fixture.insert_message(11, "G2", "late arrival", 1_700_000_050, false);
    let result = adapter.sync(&ctx, &store, false).unwrap();
    assert_eq!(result.events_created, 1);
    assert!(store.get_event("imessage:G2").unwrap().is_some());

    let wm = store.get_watermark("imessage").unwrap().unwrap();
    assert_eq!(wm.last_sync_at, apple_ns(1_700_000_050));
}

#[test]
fn test_membership_change_event() {
    let fixture = Fixture::new();
    {
        let conn = fixture.conn();
        conn.execute("INSERT INTO handle (ROWID, id) VALUES (2, '+15551230000')", [])
            .unwrap();
        conn.execute(
            "INSERT INTO message
             (ROWID, guid, date, handle_id, other_handle, item_type, group_action_type)
             VALUES (20, 'M1', ?1, 1, 2, 1, 0)",
            [apple_ns(1_700_000_200)],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO chat_message_join (chat_id, message_id) VALUES (1, 20)",
            [],
        )
        .unwrap();
    }

    let store = Store::open_in_memory().unwrap();
    fixture
        .adapter()
        .sync(&SyncContext::default(), &store, false)
        .unwrap();

    let event = store.get_event("imessage:M1").unwrap().unwrap();
    assert_eq!(event.content_types, r#"["membership"]"#);
    assert_eq!(event.direction, "observed");
    assert_eq!(event.content, "added");
    let metadata: serde_json::Value =
        serde_json::from_str(event.metadata_json.as_deref().unwrap()).unwrap();
    assert_eq!(metadata["action"], "added");
    assert!(metadata["member_contact_id"].is_string());
}

#[test]
fn test_cancellation_propagates() {
    let fixture = Fixture::new();
    fixture.insert_message(10, "G1", "hi", 1_700_000_000, false);

    let store = Store::open_in_memory().unwrap();
    let ctx = SyncContext::default();
    ctx.cancel.cancel();

    let err = fixture.adapter().sync(&ctx, &store, false).err().unwrap();
    assert!(err.is_cancelled());
}
