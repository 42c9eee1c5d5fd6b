use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Owned by the collection CRUD side of the application; the chat
        -- subsystem only reads `name` for display-text fallbacks.
        CREATE TABLE IF NOT EXISTS collection_items (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS messages (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            -- Sender/receiver are user ids owned by the surrounding app;
            -- deliberately not FK-constrained so the chat store never
            -- validates user existence beyond identity presence.
            sender_id       TEXT NOT NULL,
            receiver_id     TEXT NOT NULL,
            msg_type        TEXT NOT NULL,
            content         TEXT NOT NULL,
            file_url        TEXT,
            file_name       TEXT,
            file_size       INTEGER,
            collection_id   TEXT,
            reply_to_id     INTEGER,
            is_read         INTEGER NOT NULL DEFAULT 0,
            is_deleted      INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_pair
            ON messages(sender_id, receiver_id, id);

        CREATE INDEX IF NOT EXISTS idx_messages_receiver_unread
            ON messages(receiver_id, is_read);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
