use super::*;
use rusqlite::{Connection, params};
use tempfile::TempDir;

struct Fixture {
    _dir: TempDir,
    db_path: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("sessions.db");
        let conn = Connection::open(&db_path).unwrap();
        conn.execute_batch(
            "CREATE TABLE sessions (
                 id TEXT PRIMARY KEY,
                 source TEXT NOT NULL,
                 title TEXT,
                 cwd TEXT,
                 created_at INTEGER NOT NULL,
                 updated_at INTEGER NOT NULL
             );
             CREATE TABLE messages (
                 id TEXT PRIMARY KEY,
                 session_id TEXT NOT NULL,
                 role TEXT NOT NULL,
                 content TEXT,
                 model TEXT,
                 created_at INTEGER NOT NULL,
                 metadata TEXT
             );",
        )
        .unwrap();
        Self { _dir: dir, db_path }
    }

    fn conn(&self) -> Connection {
        Connection::open(&self.db_path).unwrap()
    }

    fn add_session(&self, id: &str, source: &str, updated_at: i64) {
        self.conn()
            .execute(
                "INSERT INTO sessions (id, source, title, cwd, created_at, updated_at)
                 VALUES (?1, ?2, 'fix the tests', '/work', ?3, ?3)",
                params![id, source, updated_at],
            )
            .unwrap();
    }

    fn add_message(
        &self,
        id: &str,
        session: &str,
        role: &str,
        content: &str,
        model: Option<&str>,
        created_at: i64,
        metadata: Option<&str>,
    ) {
        self.conn()
            .execute(
                "INSERT INTO messages (id, session_id, role, content, model, created_at, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![id, session, role, content, model, created_at, metadata],
            )
            .unwrap();
    }

    fn adapter(&self, variant: AixVariant) -> AixAdapter {
        AixAdapter::new(
            "cursor".to_string(),
            AixOptions {
                db_path: self.db_path.clone(),
                source: "cursor".to_string(),
                variant,
            },
        )
    }
}

fn seed_conversation(fixture: &Fixture) {
    fixture.add_session("s1", "cursor", 1_700_000_300);
    fixture.add_message("m1", "s1", "user", "please fix", None, 1_700_000_000, None);
    fixture.add_message("m2", "s1", "user", "the flaky test", None, 1_700_000_010, None);
    fixture.add_message(
        "m3",
        "s1",
        "assistant",
        "<thinking>hmm, where is it</thinking>done: patched the test<tool_call>{\"name\":\"edit\"}</tool_call>",
        Some("gpt-5"),
        1_700_000_100,
        None,
    );
}

#[test]
fn test_strip_assistant_text() {
    assert_eq!(
        strip_assistant_text("<thinking>secret</thinking>visible"),
        "visible"
    );
    assert_eq!(
        strip_assistant_text("before <tool_call>x</tool_call> after"),
        "before  after"
    );
    assert_eq!(strip_assistant_text("plain"), "plain");
}

#[test]
fn test_turn_consolidation() {
    let fixture = Fixture::new();
    seed_conversation(&fixture);

    let store = Store::open_in_memory().unwrap();
    let result = fixture
        .adapter(AixVariant::Events)
        .sync(&SyncContext::default(), &store, false)
        .unwrap();

    // Two user messages consolidate into one query event plus one reply.
    assert_eq!(result.events_created, 2);
    assert_eq!(result.threads_created, 1);

    let user = store.get_event("cursor:s1:0:user").unwrap().unwrap();
    assert_eq!(user.content, "please fix\n\nthe flaky test");
    assert_eq!(user.direction, "sent");
    assert_eq!(user.thread_id.as_deref(), Some("cursor:s1"));

    let assistant = store.get_event("cursor:s1:0:assistant").unwrap().unwrap();
    assert_eq!(assistant.content, "done: patched the test");
    assert_eq!(assistant.direction, "received");
    assert_eq!(assistant.reply_to.as_deref(), Some("cursor:s1:0:user"));

    // Synthesized human/ai contacts participate on both events.
    assert_eq!(store.participants_for_event("cursor:s1:0:user").unwrap().len(), 2);
    assert_eq!(
        store
            .participants_for_event("cursor:s1:0:assistant")
            .unwrap()
            .len(),
        2
    );
}

#[test]
fn test_events_variant_is_idempotent_and_incremental() {
    let fixture = Fixture::new();
    seed_conversation(&fixture);

    let store = Store::open_in_memory().unwrap();
    let adapter = fixture.adapter(AixVariant::Events);
    adapter.sync(&SyncContext::default(), &store, false).unwrap();

    let second = adapter.sync(&SyncContext::default(), &store, false).unwrap();
    assert_eq!(second.events_created, 0);
    assert_eq!(second.events_updated, 0);

    // A new turn bumps the session updated_at; the whole session is
    // rebuilt but only new events are created.
    fixture.add_message("m4", "s1", "user", "thanks", None, 1_700_000_400, None);
    fixture
        .conn()
        .execute("UPDATE sessions SET updated_at = 1700000400 WHERE id = 's1'", [])
        .unwrap();
    let third = adapter.sync(&SyncContext::default(), &store, false).unwrap();
    assert_eq!(third.events_created, 1);
    assert!(store.get_event("cursor:s1:1:user").unwrap().is_some());
}

#[test]
fn test_tool_former_terminal_extraction() {
    let fixture = Fixture::new();
    fixture.add_session("s1", "cursor", 1_700_000_300);
    fixture.add_message(
        "m1",
        "s1",
        "assistant",
        "ran it",
        Some("gpt-5"),
        1_700_000_100,
        Some(r#"{"toolFormerData":{"status":"completed","command":"cargo test"}}"#),
    );
    fixture.add_message(
        "m2",
        "s1",
        "assistant",
        "still running",
        Some("gpt-5"),
        1_700_000_110,
        Some(r#"{"toolFormerData":{"status":"running","command":"cargo bench"}}"#),
    );

    let store = Store::open_in_memory().unwrap();
    fixture
        .adapter(AixVariant::Events)
        .sync(&SyncContext::default(), &store, false)
        .unwrap();

    let terminal = store.get_event("cursor_terminal:m1").unwrap().unwrap();
    assert_eq!(terminal.content, "cargo test");
    assert_eq!(terminal.source_adapter, "cursor_terminal");
    assert_eq!(terminal.channel, "cursor_terminal");
    // Incomplete commands are not emitted.
    assert!(store.get_event("cursor_terminal:m2").unwrap().is_none());
}

#[test]
fn test_agents_variant_mirrors_full_fidelity() {
    let fixture = Fixture::new();
    seed_conversation(&fixture);
    fixture.add_message(
        "m5",
        "s1",
        "assistant",
        "let me look",
        Some("gpt-5"),
        1_700_000_050,
        Some(r#"{"tool_calls":[{"id":"tc1","name":"read_file","arguments":{"path":"x.rs"},"status":"ok"}]}"#),
    );

    let store = Store::open_in_memory().unwrap();
    let result = fixture
        .adapter(AixVariant::Agents)
        .sync(&SyncContext::default(), &store, false)
        .unwrap();
    assert_eq!(result.events_created, 4); // mirrored messages

    assert_eq!(store.count_aix_sessions("cursor").unwrap(), 1);
    let tool_name: String = store
        .conn()
        .query_row(
            "SELECT name FROM aix_tool_calls WHERE id = 'tc1'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(tool_name, "read_file");

    let turn_count: i64 = store
        .conn()
        .query_row("SELECT COUNT(*) FROM aix_turns WHERE session_id = 's1'", [], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(turn_count, 1);

    // Source filtering: rows from other assistants are ignored.
    fixture.add_session("s2", "codex", 1_700_000_500);
    let second = fixture
        .adapter(AixVariant::Agents)
        .sync(&SyncContext::default(), &store, false)
        .unwrap();
    assert_eq!(second.threads_created, 0);
    assert_eq!(store.count_aix_sessions("codex").unwrap(), 0);
}
