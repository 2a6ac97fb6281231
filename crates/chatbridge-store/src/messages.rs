use chrono::{DateTime, Utc};
use rusqlite::params;

use chatbridge_shared::constants::DELETED_MARKER;
use chatbridge_shared::{Jid, MediaKind, MediaReference};

use crate::chats::{format_timestamp, parse_timestamp};
use crate::database::Database;
use crate::error::{not_found, Result};
use crate::models::{MediaInfo, StoredMessage};

const MESSAGE_COLUMNS: &str = "id, chat_key, sender, content, timestamp, is_from_me, media_kind,
     filename, locator, media_key, digest_plain, digest_enc, length, quoted_preview";

impl Database {
    /// Insert or replace a message by `(id, chat)`.
    ///
    /// Returns `false` without writing when the message has neither text
    /// nor media.  The chat row must already exist.
    pub fn upsert_message(&self, message: &StoredMessage) -> Result<bool> {
        if !message.is_storable() {
            return Ok(false);
        }

        self.conn().execute(
            "INSERT INTO messages (id, chat_key, sender, content, timestamp, is_from_me,
                 media_kind, filename, locator, media_key, digest_plain, digest_enc, length,
                 quoted_preview)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
             ON CONFLICT(id, chat_key) DO UPDATE SET
                sender = excluded.sender,
                content = excluded.content,
                timestamp = excluded.timestamp,
                is_from_me = excluded.is_from_me,
                media_kind = excluded.media_kind,
                filename = excluded.filename,
                locator = excluded.locator,
                media_key = excluded.media_key,
                digest_plain = excluded.digest_plain,
                digest_enc = excluded.digest_enc,
                length = excluded.length,
                quoted_preview = excluded.quoted_preview",
            params![
                message.id,
                message.chat.as_str(),
                message.sender,
                message.content,
                format_timestamp(message.timestamp),
                message.is_from_me,
                message.media_kind.map(|k| k.as_str()).unwrap_or(""),
                message.filename,
                message.media.locator,
                message.media.media_key,
                message.media.digest_plain,
                message.media.digest_enc,
                length_to_sql(message.media.length),
                message.quoted_preview,
            ],
        )?;
        Ok(true)
    }

    /// Overwrite content and timestamp of an existing message.
    ///
    /// Returns `false` when no row matches; the edit is then dropped.
    pub fn apply_edit(
        &self,
        id: &str,
        chat: &Jid,
        text: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE messages SET content = ?1, timestamp = ?2
             WHERE id = ?3 AND chat_key = ?4",
            params![text, format_timestamp(timestamp), id, chat.as_str()],
        )?;
        Ok(affected > 0)
    }

    /// Replace the content of an existing message with the deletion marker.
    ///
    /// Same no-row semantics as [`Database::apply_edit`].
    pub fn apply_revoke(&self, id: &str, chat: &Jid, timestamp: DateTime<Utc>) -> Result<bool> {
        self.apply_edit(id, chat, DELETED_MARKER, timestamp)
    }

    /// The `limit` most recent messages of a chat, newest first.
    pub fn list_messages(&self, chat: &Jid, limit: u32) -> Result<Vec<StoredMessage>> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS}
             FROM messages
             WHERE chat_key = ?1
             ORDER BY timestamp DESC
             LIMIT ?2"
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params![chat.as_str(), limit], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    pub fn get_message(&self, id: &str, chat: &Jid) -> Result<StoredMessage> {
        let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1 AND chat_key = ?2");
        self.conn()
            .query_row(&sql, params![id, chat.as_str()], row_to_message)
            .map_err(not_found)
    }

    pub fn message_exists(&self, id: &str, chat: &Jid) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM messages WHERE id = ?1 AND chat_key = ?2",
            params![id, chat.as_str()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Media columns of one message.
    pub fn get_media_info(&self, id: &str, chat: &Jid) -> Result<MediaInfo> {
        self.conn()
            .query_row(
                "SELECT media_kind, filename, locator, media_key, digest_plain, digest_enc, length
                 FROM messages WHERE id = ?1 AND chat_key = ?2",
                params![id, chat.as_str()],
                |row| {
                    let kind: String = row.get(0)?;
                    Ok(MediaInfo {
                        kind: kind.parse::<MediaKind>().ok(),
                        filename: row.get(1)?,
                        reference: MediaReference {
                            locator: row.get(2)?,
                            media_key: blob(row, 3)?,
                            digest_plain: blob(row, 4)?,
                            digest_enc: blob(row, 5)?,
                            length: length_from_sql(row.get(6)?),
                        },
                    })
                },
            )
            .map_err(not_found)
    }

    /// Backfill the download descriptor of an already stored message.
    pub fn store_media_info(&self, id: &str, chat: &Jid, media: &MediaReference) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE messages
             SET locator = ?1, media_key = ?2, digest_plain = ?3, digest_enc = ?4, length = ?5
             WHERE id = ?6 AND chat_key = ?7",
            params![
                media.locator,
                media.media_key,
                media.digest_plain,
                media.digest_enc,
                length_to_sql(media.length),
                id,
                chat.as_str(),
            ],
        )?;
        Ok(affected > 0)
    }

    /// Id of the most recent message in `chat` carrying `filename`.
    ///
    /// A miss is [`StoreError::NotFound`](crate::StoreError::NotFound), never an
    /// empty id.
    pub fn find_message_id_by_filename(&self, chat: &Jid, filename: &str) -> Result<String> {
        self.conn()
            .query_row(
                "SELECT id FROM messages
                 WHERE chat_key = ?1 AND filename = ?2
                 ORDER BY timestamp DESC
                 LIMIT 1",
                params![chat.as_str(), filename],
                |row| row.get(0),
            )
            .map_err(not_found)
    }
}

fn length_to_sql(length: u64) -> i64 {
    i64::try_from(length).unwrap_or(i64::MAX)
}

fn length_from_sql(length: i64) -> u64 {
    u64::try_from(length).unwrap_or(0)
}

fn blob(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Vec<u8>> {
    let value: Option<Vec<u8>> = row.get(idx)?;
    Ok(value.unwrap_or_default())
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredMessage> {
    let chat: String = row.get(1)?;
    let ts_str: String = row.get(4)?;
    let kind: String = row.get(6)?;

    Ok(StoredMessage {
        id: row.get(0)?,
        chat: Jid::new(chat),
        sender: row.get(2)?,
        content: row.get(3)?,
        timestamp: parse_timestamp(4, &ts_str)?,
        is_from_me: row.get(5)?,
        media_kind: kind.parse::<MediaKind>().ok(),
        filename: row.get(7)?,
        media: MediaReference {
            locator: row.get(8)?,
            media_key: blob(row, 9)?,
            digest_plain: blob(row, 10)?,
            digest_enc: blob(row, 11)?,
            length: length_from_sql(row.get(12)?),
        },
        quoted_preview: row.get(13)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::models::Chat;
    use crate::StoreError;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn setup() -> (Database, Jid) {
        let db = Database::open_in_memory().unwrap();
        let chat = Jid::new("4915123@s.whatsapp.net");
        db.upsert_chat(&Chat {
            key: chat.clone(),
            name: "Alice".into(),
            last_message_time: Some(at(0)),
        })
        .unwrap();
        (db, chat)
    }

    fn text_message(id: &str, chat: &Jid, text: &str, secs: i64) -> StoredMessage {
        StoredMessage {
            id: id.to_string(),
            chat: chat.clone(),
            sender: chat.user().to_string(),
            content: text.to_string(),
            timestamp: at(secs),
            is_from_me: false,
            media_kind: None,
            filename: String::new(),
            media: MediaReference::default(),
            quoted_preview: String::new(),
        }
    }

    fn image_message(id: &str, chat: &Jid, filename: &str, secs: i64) -> StoredMessage {
        StoredMessage {
            media_kind: Some(MediaKind::Image),
            filename: filename.to_string(),
            media: MediaReference {
                locator: "https://mmg.whatsapp.net/v/t62/abc.enc".into(),
                media_key: vec![1, 2, 3],
                digest_plain: vec![4, 5],
                digest_enc: vec![6, 7],
                length: 2048,
            },
            ..text_message(id, chat, "", secs)
        }
    }

    #[test]
    fn empty_message_is_not_written() {
        let (db, chat) = setup();
        let written = db.upsert_message(&text_message("M1", &chat, "", 10)).unwrap();
        assert!(!written);
        assert!(!db.message_exists("M1", &chat).unwrap());
    }

    #[test]
    fn redelivery_overwrites_instead_of_duplicating() {
        let (db, chat) = setup();
        db.upsert_message(&text_message("M1", &chat, "first", 10)).unwrap();
        db.upsert_message(&text_message("M1", &chat, "second", 11)).unwrap();

        let messages = db.list_messages(&chat, 10).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "second");
        assert_eq!(messages[0].timestamp, at(11));
    }

    #[test]
    fn same_id_in_different_chats_is_distinct() {
        let (db, chat) = setup();
        let other = Jid::new("1203630@g.us");
        db.upsert_chat(&Chat {
            key: other.clone(),
            name: "Group".into(),
            last_message_time: None,
        })
        .unwrap();

        db.upsert_message(&text_message("M1", &chat, "a", 10)).unwrap();
        db.upsert_message(&text_message("M1", &other, "b", 10)).unwrap();

        assert_eq!(db.get_message("M1", &chat).unwrap().content, "a");
        assert_eq!(db.get_message("M1", &other).unwrap().content, "b");
    }

    #[test]
    fn edit_updates_content_and_timestamp_only() {
        let (db, chat) = setup();
        let original = image_message("M1", &chat, "image_20240101_120000.jpg", 10);
        db.upsert_message(&StoredMessage {
            content: "caption".into(),
            ..original.clone()
        })
        .unwrap();

        assert!(db.apply_edit("M1", &chat, "[EDITED] better", at(20)).unwrap());

        let stored = db.get_message("M1", &chat).unwrap();
        assert_eq!(stored.content, "[EDITED] better");
        assert_eq!(stored.timestamp, at(20));
        assert_eq!(stored.media_kind, Some(MediaKind::Image));
        assert_eq!(stored.filename, original.filename);
        assert_eq!(stored.media, original.media);
    }

    #[test]
    fn revoke_sets_deletion_marker() {
        let (db, chat) = setup();
        db.upsert_message(&text_message("M1", &chat, "secret", 10)).unwrap();

        assert!(db.apply_revoke("M1", &chat, at(30)).unwrap());
        assert_eq!(db.get_message("M1", &chat).unwrap().content, DELETED_MARKER);
    }

    #[test]
    fn mutation_of_unknown_message_is_a_no_op() {
        let (db, chat) = setup();
        assert!(!db.apply_edit("missing", &chat, "x", at(1)).unwrap());
        assert!(!db.apply_revoke("missing", &chat, at(1)).unwrap());
        assert!(!db.message_exists("missing", &chat).unwrap());
    }

    #[test]
    fn list_returns_most_recent_first_with_limit() {
        let (db, chat) = setup();
        for i in 0..5 {
            db.upsert_message(&text_message(&format!("M{i}"), &chat, "hi", 100 + i))
                .unwrap();
        }

        let ids: Vec<String> = db
            .list_messages(&chat, 3)
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec!["M4", "M3", "M2"]);
    }

    #[test]
    fn media_info_round_trip_and_backfill() {
        let (db, chat) = setup();
        let mut message = image_message("M1", &chat, "image_20240101_120000.jpg", 10);
        message.media = MediaReference::default();
        db.upsert_message(&message).unwrap();

        let info = db.get_media_info("M1", &chat).unwrap();
        assert_eq!(info.kind, Some(MediaKind::Image));
        assert!(!info.reference.is_complete());

        let reference = image_message("M1", &chat, "", 0).media;
        assert!(db.store_media_info("M1", &chat, &reference).unwrap());
        assert_eq!(db.get_media_info("M1", &chat).unwrap().reference, reference);

        assert!(!db.store_media_info("other", &chat, &reference).unwrap());
    }

    #[test]
    fn find_by_filename() {
        let (db, chat) = setup();
        db.upsert_message(&image_message("M1", &chat, "photo.jpg", 10)).unwrap();

        assert_eq!(db.find_message_id_by_filename(&chat, "photo.jpg").unwrap(), "M1");

        let err = db.find_message_id_by_filename(&chat, "nope.jpg").unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[test]
    fn message_requires_known_chat() {
        let db = Database::open_in_memory().unwrap();
        let stray = Jid::new("stray@s.whatsapp.net");
        assert!(db.upsert_message(&text_message("M1", &stray, "hi", 1)).is_err());
    }
}
