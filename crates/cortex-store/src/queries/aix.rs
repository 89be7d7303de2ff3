use anyhow::Result;
use rusqlite::params;

use crate::db::{Store, UpsertOutcome};

#[derive(Debug, Clone)]
pub struct AixSessionRecord {
    pub id: String,
    pub source: String,
    pub title: Option<String>,
    pub cwd: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
pub struct AixMessageRecord {
    pub id: String,
    pub session_id: String,
    pub role: String,
    pub content: Option<String>,
    pub model: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct AixTurnRecord {
    pub id: String,
    pub session_id: String,
    pub idx: i64,
    pub user_text: Option<String>,
    pub assistant_text: Option<String>,
    pub started_at: i64,
    pub ended_at: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct AixToolCallRecord {
    pub id: String,
    pub message_id: String,
    pub name: String,
    pub arguments_json: Option<String>,
    pub output: Option<String>,
    pub status: Option<String>,
    pub created_at: i64,
}

// Full-fidelity mirror tables for the agents variant of the AI-session
// adapter. Same upsert-and-classify discipline as the event tables.
impl Store {
    pub fn upsert_aix_session(&self, rec: &AixSessionRecord) -> Result<UpsertOutcome> {
        let mut insert = self.conn().prepare_cached(
            "INSERT OR IGNORE INTO aix_sessions (id, source, title, cwd, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        if insert.execute(params![
            rec.id,
            rec.source,
            rec.title,
            rec.cwd,
            rec.created_at,
            rec.updated_at
        ])? == 1
        {
            return Ok(UpsertOutcome::Created);
        }

        let mut update = self.conn().prepare_cached(
            "UPDATE aix_sessions SET title = ?2, cwd = ?3, updated_at = ?4
             WHERE id = ?1
               AND (title IS NOT ?2 OR cwd IS NOT ?3 OR updated_at IS NOT ?4)",
        )?;
        if update.execute(params![rec.id, rec.title, rec.cwd, rec.updated_at])? == 1 {
            Ok(UpsertOutcome::Updated)
        } else {
            Ok(UpsertOutcome::Unchanged)
        }
    }

    pub fn upsert_aix_message(&self, rec: &AixMessageRecord) -> Result<UpsertOutcome> {
        let mut insert = self.conn().prepare_cached(
            "INSERT OR IGNORE INTO aix_messages (id, session_id, role, content, model, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        if insert.execute(params![
            rec.id,
            rec.session_id,
            rec.role,
            rec.content,
            rec.model,
            rec.created_at
        ])? == 1
        {
            return Ok(UpsertOutcome::Created);
        }

        let mut update = self.conn().prepare_cached(
            "UPDATE aix_messages SET content = ?2, model = ?3
             WHERE id = ?1 AND (content IS NOT ?2 OR model IS NOT ?3)",
        )?;
        if update.execute(params![rec.id, rec.content, rec.model])? == 1 {
            Ok(UpsertOutcome::Updated)
        } else {
            Ok(UpsertOutcome::Unchanged)
        }
    }

    pub fn upsert_aix_turn(&self, rec: &AixTurnRecord) -> Result<UpsertOutcome> {
        let mut insert = self.conn().prepare_cached(
            "INSERT OR IGNORE INTO aix_turns
             (id, session_id, idx, user_text, assistant_text, started_at, ended_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        if insert.execute(params![
            rec.id,
            rec.session_id,
            rec.idx,
            rec.user_text,
            rec.assistant_text,
            rec.started_at,
            rec.ended_at
        ])? == 1
        {
            return Ok(UpsertOutcome::Created);
        }

        let mut update = self.conn().prepare_cached(
            "UPDATE aix_turns SET user_text = ?3, assistant_text = ?4, ended_at = ?5
             WHERE session_id = ?1 AND idx = ?2
               AND (user_text IS NOT ?3 OR assistant_text IS NOT ?4 OR ended_at IS NOT ?5)",
        )?;
        if update.execute(params![
            rec.session_id,
            rec.idx,
            rec.user_text,
            rec.assistant_text,
            rec.ended_at
        ])? == 1
        {
            Ok(UpsertOutcome::Updated)
        } else {
            Ok(UpsertOutcome::Unchanged)
        }
    }

    pub fn upsert_aix_tool_call(&self, rec: &AixToolCallRecord) -> Result<UpsertOutcome> {
        let mut insert = self.conn().prepare_cached(
            "INSERT OR IGNORE INTO aix_tool_calls
             (id, message_id, name, arguments_json, output, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        if insert.execute(params![
            rec.id,
            rec.message_id,
            rec.name,
            rec.arguments_json,
            rec.output,
            rec.status,
            rec.created_at
        ])? == 1
        {
            return Ok(UpsertOutcome::Created);
        }

        let mut update = self.conn().prepare_cached(
            "UPDATE aix_tool_calls SET arguments_json = ?2, output = ?3, status = ?4
             WHERE id = ?1
               AND (arguments_json IS NOT ?2 OR output IS NOT ?3 OR status IS NOT ?4)",
        )?;
        if update.execute(params![rec.id, rec.arguments_json, rec.output, rec.status])? == 1 {
            Ok(UpsertOutcome::Updated)
        } else {
            Ok(UpsertOutcome::Unchanged)
        }
    }

    pub fn count_aix_sessions(&self, source: &str) -> Result<usize> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM aix_sessions WHERE source = ?1",
            [source],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
