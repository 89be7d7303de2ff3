//! Read side of the shared AI-session database (SQLite, opened
//! read-only). Several coding assistants write here; rows are filtered by
//! their `source` tag.

use std::path::Path;

use rusqlite::{Connection, OpenFlags, params};

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct SessionRow {
    pub id: String,
    pub source: String,
    pub title: Option<String>,
    pub cwd: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: String,
    pub session_id: String,
    pub role: String,
    pub content: Option<String>,
    pub model: Option<String>,
    pub created_at: i64,
    /// Opaque per-assistant extension blob (tool calls, formatter data).
    pub metadata: Option<String>,
}

pub struct AixDb {
    conn: Connection,
}

impl AixDb {
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Environment(format!(
                "session database not found: {}",
                path.display()
            )));
        }
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|err| Error::Environment(format!("cannot open {}: {err}", path.display())))?;
        Ok(Self { conn })
    }

    /// Sessions for a source touched after `since`.
    pub fn sessions_since(&self, source: &str, since: i64) -> Result<Vec<SessionRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, source, title, cwd, created_at, updated_at
             FROM sessions
             WHERE source = ?1 AND updated_at > ?2
             ORDER BY updated_at ASC",
        )?;
        let rows = stmt
            .query_map(params![source, since], |row| {
                Ok(SessionRow {
                    id: row.get(0)?,
                    source: row.get(1)?,
                    title: row.get(2)?,
                    cwd: row.get(3)?,
                    created_at: row.get(4)?,
                    updated_at: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// All messages of one session, oldest first.
    pub fn messages_for_session(&self, session_id: &str) -> Result<Vec<MessageRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, session_id, role, content, model, created_at, metadata
             FROM messages
             WHERE session_id = ?1
             ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt
            .query_map([session_id], |row| {
                Ok(MessageRow {
                    id: row.get(0)?,
                    session_id: row.get(1)?,
                    role: row.get(2)?,
                    content: row.get(3)?,
                    model: row.get(4)?,
                    created_at: row.get(5)?,
                    metadata: row.get(6)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
