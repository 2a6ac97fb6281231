use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, OptionalExtension};

use chatbridge_shared::Jid;

use crate::database::Database;
use crate::error::{not_found, Result};
use crate::models::Chat;

impl Database {
    /// Insert or replace a chat by key.
    pub fn upsert_chat(&self, chat: &Chat) -> Result<()> {
        self.conn().execute(
            "INSERT INTO chats (key, name, last_message_time)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
                name = excluded.name,
                last_message_time = excluded.last_message_time",
            params![
                chat.key.as_str(),
                chat.name,
                chat.last_message_time.map(format_timestamp),
            ],
        )?;
        Ok(())
    }

    pub fn get_chat(&self, key: &Jid) -> Result<Chat> {
        self.conn()
            .query_row(
                "SELECT key, name, last_message_time FROM chats WHERE key = ?1",
                params![key.as_str()],
                row_to_chat,
            )
            .map_err(not_found)
    }

    /// Stored display name, `None` when the chat is unknown or unnamed.
    pub fn chat_name(&self, key: &Jid) -> Result<Option<String>> {
        let name: Option<Option<String>> = self
            .conn()
            .query_row(
                "SELECT name FROM chats WHERE key = ?1",
                params![key.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(name.flatten().filter(|n| !n.is_empty()))
    }

    pub fn chat_exists(&self, key: &Jid) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM chats WHERE key = ?1",
            params![key.as_str()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// All chats, most recent activity first.
    pub fn list_chats(&self) -> Result<Vec<Chat>> {
        let mut stmt = self.conn().prepare(
            "SELECT key, name, last_message_time
             FROM chats
             ORDER BY last_message_time DESC",
        )?;

        let rows = stmt.query_map([], row_to_chat)?;

        let mut chats = Vec::new();
        for row in rows {
            chats.push(row?);
        }
        Ok(chats)
    }
}

/// Fixed-width RFC 3339 so lexical order matches time order.
pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn row_to_chat(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chat> {
    let key: String = row.get(0)?;
    let name: Option<String> = row.get(1)?;
    let ts: Option<String> = row.get(2)?;

    let last_message_time = match ts {
        Some(raw) => Some(parse_timestamp(2, &raw)?),
        None => None,
    };

    Ok(Chat {
        key: Jid::new(key),
        name: name.unwrap_or_default(),
        last_message_time,
    })
}
