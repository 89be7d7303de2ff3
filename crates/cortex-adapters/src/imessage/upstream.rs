//! Read side of the chat database. The upstream store is itself SQLite;
//! it is opened read-only and treated as an opaque stream of rows.

use std::path::Path;

use rusqlite::{Connection, OpenFlags, params};

use crate::error::{Error, Result};

/// Offset between the Apple reference date (2001-01-01) and the Unix epoch.
pub const APPLE_EPOCH_OFFSET: i64 = 978_307_200;

/// Convert an upstream date to Unix seconds. Modern databases store
/// nanoseconds since 2001; ancient ones store seconds.
pub fn apple_date_to_unix(date: i64) -> i64 {
    if date > 1_000_000_000_000 {
        date / 1_000_000_000 + APPLE_EPOCH_OFFSET
    } else {
        date + APPLE_EPOCH_OFFSET
    }
}

#[derive(Debug, Clone)]
pub struct HandleRow {
    pub rowid: i64,
    pub id: String,
}

#[derive(Debug, Clone)]
pub struct ChatRow {
    pub rowid: i64,
    pub guid: String,
    pub chat_identifier: Option<String>,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub rowid: i64,
    pub guid: String,
    pub text: Option<String>,
    /// Native Apple units; watermark for this adapter stays in these units.
    pub date: i64,
    pub is_from_me: bool,
    pub handle_id: i64,
    pub other_handle: i64,
    pub cache_has_attachments: bool,
    pub associated_message_guid: Option<String>,
    pub associated_message_type: i64,
    pub item_type: i64,
    pub group_action_type: i64,
    pub chat_rowid: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct AttachmentRow {
    pub guid: String,
    pub filename: Option<String>,
    pub mime_type: Option<String>,
    pub total_bytes: Option<i64>,
    pub is_sticker: bool,
    pub transfer_name: Option<String>,
    pub message_rowid: i64,
}

pub struct ChatDb {
    conn: Connection,
}

impl ChatDb {
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Environment(format!(
                "chat database not found: {} (grant Full Disk Access if the file exists)",
                path.display()
            )));
        }
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|err| {
                Error::Environment(format!("cannot open {}: {err}", path.display()))
            })?;
        Ok(Self { conn })
    }

    pub fn handles(&self) -> Result<Vec<HandleRow>> {
        let mut stmt = self.conn.prepare("SELECT ROWID, id FROM handle")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(HandleRow {
                    rowid: row.get(0)?,
                    id: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn chats(&self) -> Result<Vec<ChatRow>> {
        let mut stmt = self
            .conn
            .prepare("SELECT ROWID, guid, chat_identifier, display_name FROM chat")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ChatRow {
                    rowid: row.get(0)?,
                    guid: row.get(1)?,
                    chat_identifier: row.get(2)?,
                    display_name: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Messages strictly after `since` (native units), oldest first.
    pub fn messages_since(&self, since: i64) -> Result<Vec<MessageRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT m.ROWID, m.guid, m.text, m.date, m.is_from_me, m.handle_id,
                    m.other_handle, m.cache_has_attachments, m.associated_message_guid,
                    m.associated_message_type, m.item_type, m.group_action_type,
                    cmj.chat_id
             FROM message m
             LEFT JOIN chat_message_join cmj ON cmj.message_id = m.ROWID
             WHERE m.date > ?1
             ORDER BY m.date ASC, m.ROWID ASC",
        )?;
        let rows = stmt
            .query_map(params![since], |row| {
                Ok(MessageRow {
                    rowid: row.get(0)?,
                    guid: row.get(1)?,
                    text: row.get(2)?,
                    date: row.get(3)?,
                    is_from_me: row.get(4)?,
                    handle_id: row.get(5)?,
                    other_handle: row.get(6)?,
                    cache_has_attachments: row.get(7)?,
                    associated_message_guid: row.get(8)?,
                    associated_message_type: row.get(9)?,
                    item_type: row.get(10)?,
                    group_action_type: row.get(11)?,
                    chat_rowid: row.get(12)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Attachments owned by messages strictly after `since`.
    pub fn attachments_since(&self, since: i64) -> Result<Vec<AttachmentRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT a.guid, a.filename, a.mime_type, a.total_bytes, a.is_sticker,
                    a.transfer_name, maj.message_id
             FROM attachment a
             JOIN message_attachment_join maj ON maj.attachment_id = a.ROWID
             JOIN message m ON m.ROWID = maj.message_id
             WHERE m.date > ?1",
        )?;
        let rows = stmt
            .query_map(params![since], |row| {
                Ok(AttachmentRow {
                    guid: row.get(0)?,
                    filename: row.get(1)?,
                    mime_type: row.get(2)?,
                    total_bytes: row.get(3)?,
                    is_sticker: row.get(4)?,
                    transfer_name: row.get(5)?,
                    message_rowid: row.get(6)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apple_date_conversion() {
        // 2023-11-14T22:13:20Z in Apple nanoseconds.
        let apple_ns = (1_700_000_000 - APPLE_EPOCH_OFFSET) * 1_000_000_000;
        assert_eq!(apple_date_to_unix(apple_ns), 1_700_000_000);
        // Legacy seconds representation.
        assert_eq!(
            apple_date_to_unix(1_700_000_000 - APPLE_EPOCH_OFFSET),
            1_700_000_000
        );
    }

    #[test]
    fn test_missing_database_is_environment_error() {
        let err = ChatDb::open(Path::new("/nonexistent/chat.db")).err().unwrap();
        assert!(matches!(err, Error::Environment(_)));
    }
}
