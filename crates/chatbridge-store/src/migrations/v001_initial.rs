//! v001 -- Initial schema creation.
//!
//! Creates the two core tables: `chats` and `messages`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Chats
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS chats (
    key               TEXT PRIMARY KEY NOT NULL,  -- opaque chat JID
    name              TEXT,
    last_message_time TEXT                        -- RFC-3339, UTC
);

-- ----------------------------------------------------------------
-- Messages (ids are only unique within a chat)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id             TEXT NOT NULL,
    chat_key       TEXT NOT NULL,              -- FK -> chats(key)
    sender         TEXT NOT NULL DEFAULT '',
    content        TEXT NOT NULL DEFAULT '',
    timestamp      TEXT NOT NULL,              -- RFC-3339, UTC
    is_from_me     INTEGER NOT NULL DEFAULT 0, -- boolean 0/1
    media_kind     TEXT NOT NULL DEFAULT '',   -- '' | image | video | audio | document
    filename       TEXT NOT NULL DEFAULT '',
    locator        TEXT NOT NULL DEFAULT '',
    media_key      BLOB,
    digest_plain   BLOB,
    digest_enc     BLOB,
    length         INTEGER NOT NULL DEFAULT 0,
    quoted_preview TEXT NOT NULL DEFAULT '',

    PRIMARY KEY (id, chat_key),
    FOREIGN KEY (chat_key) REFERENCES chats(key)
);

CREATE INDEX IF NOT EXISTS idx_messages_chat_ts
    ON messages(chat_key, timestamp DESC);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
