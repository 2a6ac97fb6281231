use rusqlite::Connection;

// media lookups by display filename (resolve-by-filename path)
const UP_SQL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_messages_chat_filename
    ON messages(chat_key, filename);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
