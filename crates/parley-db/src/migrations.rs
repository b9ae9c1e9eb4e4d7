use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            username    TEXT NOT NULL UNIQUE,
            email       TEXT NOT NULL UNIQUE,
            avatar      TEXT,
            password    TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS conversations (
            id          TEXT PRIMARY KEY,
            type        TEXT NOT NULL CHECK (type IN ('private', 'group')),
            title       TEXT,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS conversation_participants (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
            user_id         INTEGER NOT NULL REFERENCES users(id) ON DELETE RESTRICT,
            role            TEXT NOT NULL CHECK (role IN ('admin', 'member')),
            joined_at       TEXT NOT NULL,
            UNIQUE(conversation_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_participants_conversation
            ON conversation_participants(conversation_id);

        CREATE TABLE IF NOT EXISTS messages (
            id              TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
            sender_id       INTEGER NOT NULL REFERENCES users(id) ON DELETE RESTRICT,
            text            TEXT,
            reply_to        TEXT REFERENCES messages(id) ON DELETE SET NULL,
            is_edited       INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id, created_at);

        CREATE TABLE IF NOT EXISTS attachments (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            message_id  TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
            file_url    TEXT NOT NULL,
            file_type   TEXT NOT NULL CHECK (file_type IN ('image', 'video', 'file')),
            file_size   INTEGER NOT NULL CHECK (file_size >= 0),
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_attachments_message
            ON attachments(message_id);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
