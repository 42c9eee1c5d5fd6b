use crate::Database;
use crate::models::{MessageRow, NewMessageRow, UserRow};
use anyhow::Result;
use rusqlite::{Connection, Row};

/// Column list + joins shared by every message SELECT. Usernames are
/// joined in one query to avoid N+1 lookups when hydrating pages.
const MESSAGE_SELECT: &str = "
    SELECT m.id, m.sender_id, su.username, m.receiver_id, ru.username,
           m.msg_type, m.content, m.file_url, m.file_name, m.file_size,
           m.collection_id, m.reply_to_id, m.is_read, m.is_deleted, m.created_at
    FROM messages m
    LEFT JOIN users su ON m.sender_id = su.id
    LEFT JOIN users ru ON m.receiver_id = ru.id";

impl Database {
    // -- Users --

    pub fn create_user(&self, id: &str, username: &str, password_hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password) VALUES (?1, ?2, ?3)",
                (id, username, password_hash),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_username(conn, username))
    }

    // -- Collection items (display-name lookup only) --

    pub fn get_collection_name(&self, id: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT name FROM collection_items WHERE id = ?1",
                [id],
                |row| row.get(0),
            )
            .optional()
        })
    }

    pub fn upsert_collection_item(&self, id: &str, name: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO collection_items (id, name) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET name = excluded.name",
                (id, name),
            )?;
            Ok(())
        })
    }

    // -- Messages --

    /// Insert a message and return its store-assigned id.
    pub fn insert_message(&self, msg: &NewMessageRow) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages
                    (sender_id, receiver_id, msg_type, content, file_url, file_name,
                     file_size, collection_id, reply_to_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                rusqlite::params![
                    msg.sender_id,
                    msg.receiver_id,
                    msg.msg_type,
                    msg.content,
                    msg.file_url,
                    msg.file_name,
                    msg.file_size,
                    msg.collection_id,
                    msg.reply_to_id,
                    msg.created_at,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Fetch a single message by id, including soft-deleted rows — the
    /// delete path needs to see them to stay idempotent.
    pub fn get_message(&self, id: i64) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!("{MESSAGE_SELECT} WHERE m.id = ?1");
            let mut stmt = conn.prepare(&sql)?;
            stmt.query_row([id], map_message_row).optional()
        })
    }

    /// Bulk read-receipt: flips every unread, non-deleted message from
    /// `sender_id` to `receiver_id`. Returns the number of rows changed.
    pub fn mark_read(&self, receiver_id: &str, sender_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET is_read = 1
                 WHERE sender_id = ?1 AND receiver_id = ?2
                   AND is_read = 0 AND is_deleted = 0",
                (sender_id, receiver_id),
            )?;
            Ok(changed)
        })
    }

    /// One-way soft delete; the row is retained but leaves every read path.
    pub fn soft_delete_message(&self, id: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("UPDATE messages SET is_deleted = 1 WHERE id = ?1", [id])?;
            Ok(())
        })
    }

    /// Non-deleted messages between two users, ascending (created_at, id),
    /// optionally after a cursor id.
    pub fn conversation(
        &self,
        user_a: &str,
        user_b: &str,
        since_id: Option<i64>,
        limit: u32,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{MESSAGE_SELECT}
                 WHERE ((m.sender_id = ?1 AND m.receiver_id = ?2)
                     OR (m.sender_id = ?2 AND m.receiver_id = ?1))
                   AND m.is_deleted = 0
                   AND m.id > ?3
                 ORDER BY m.created_at ASC, m.id ASC
                 LIMIT ?4"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    rusqlite::params![user_a, user_b, since_id.unwrap_or(0), limit],
                    map_message_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// The user's most recent non-deleted messages (sent or received),
    /// newest first, capped at `window`. Feeds the in-memory
    /// conversation-list grouping.
    pub fn recent_messages_for(&self, user_id: &str, window: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{MESSAGE_SELECT}
                 WHERE (m.sender_id = ?1 OR m.receiver_id = ?1)
                   AND m.is_deleted = 0
                 ORDER BY m.id DESC
                 LIMIT ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![user_id, window], map_message_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn map_message_row(row: &Row<'_>) -> std::result::Result<MessageRow, rusqlite::Error> {
    Ok(MessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        sender_username: row
            .get::<_, Option<String>>(2)?
            .unwrap_or_else(|| "unknown".to_string()),
        receiver_id: row.get(3)?,
        receiver_username: row
            .get::<_, Option<String>>(4)?
            .unwrap_or_else(|| "unknown".to_string()),
        msg_type: row.get(5)?,
        content: row.get(6)?,
        file_url: row.get(7)?,
        file_name: row.get(8)?,
        file_size: row.get(9)?,
        collection_id: row.get(10)?,
        reply_to_id: row.get(11)?,
        is_read: row.get(12)?,
        is_deleted: row.get(13)?,
        created_at: row.get(14)?,
    })
}

fn query_user_by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    let mut stmt =
        conn.prepare("SELECT id, username, password, created_at FROM users WHERE username = ?1")?;

    let row = stmt
        .query_row([username], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password: row.get(2)?,
                created_at: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
