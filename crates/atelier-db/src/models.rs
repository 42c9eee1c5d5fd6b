//! Database row types — these map directly to SQLite rows.
//! Distinct from the atelier-types wire models to keep the DB layer
//! independent; `MessageRow::into_message` bridges the two.

use tracing::warn;
use uuid::Uuid;

use atelier_types::events::MessageBody;
use atelier_types::models::ChatMessage;

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub created_at: String,
}

/// Fields for a message about to be inserted. `id` and read/deleted flags
/// are owned by the store.
pub struct NewMessageRow {
    pub sender_id: String,
    pub receiver_id: String,
    pub msg_type: &'static str,
    pub content: String,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
    pub collection_id: Option<String>,
    pub reply_to_id: Option<i64>,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: i64,
    pub sender_id: String,
    pub sender_username: String,
    pub receiver_id: String,
    pub receiver_username: String,
    pub msg_type: String,
    pub content: String,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
    pub collection_id: Option<String>,
    pub reply_to_id: Option<i64>,
    pub is_read: bool,
    pub is_deleted: bool,
    pub created_at: String,
}

impl MessageRow {
    /// Hydrate a wire-level message from this row. Corrupt fields are
    /// logged and replaced with defaults rather than failing the whole
    /// page — same policy the history endpoint has always had.
    pub fn into_message(self) -> ChatMessage {
        let body = match self.msg_type.as_str() {
            "text" => MessageBody::Text,
            "emoji" => MessageBody::Emoji,
            "image" => MessageBody::Image {
                file_url: self.file_url.unwrap_or_default(),
                file_name: self.file_name,
            },
            "file" => MessageBody::File {
                file_url: self.file_url.unwrap_or_default(),
                file_name: self.file_name.unwrap_or_default(),
                file_size: self.file_size.unwrap_or(0).max(0) as u64,
            },
            "collection" => MessageBody::Collection {
                collection_id: self
                    .collection_id
                    .as_deref()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(|| {
                        warn!("Corrupt collection_id on message '{}'", self.id);
                        Uuid::default()
                    }),
            },
            "poke" => MessageBody::Poke,
            "quote" => MessageBody::Quote {
                reply_to_id: self.reply_to_id.unwrap_or_else(|| {
                    warn!("Missing reply_to_id on quote message '{}'", self.id);
                    0
                }),
            },
            other => {
                warn!("Unknown msg_type '{}' on message '{}'", other, self.id);
                MessageBody::Text
            }
        };

        ChatMessage {
            id: self.id,
            sender_id: parse_uuid(&self.sender_id, "sender_id", self.id),
            sender_username: self.sender_username,
            receiver_id: parse_uuid(&self.receiver_id, "receiver_id", self.id),
            content: self.content,
            body,
            is_read: self.is_read,
            created_at: parse_timestamp(&self.created_at, self.id),
        }
    }
}

fn parse_uuid(raw: &str, field: &str, message_id: i64) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}' on message '{}': {}", field, raw, message_id, e);
        Uuid::default()
    })
}

fn parse_timestamp(raw: &str, message_id: i64) -> chrono::DateTime<chrono::Utc> {
    raw.parse::<chrono::DateTime<chrono::Utc>>()
        .or_else(|_| {
            // SQLite's datetime('now') stores "YYYY-MM-DD HH:MM:SS" without
            // timezone. Parse as naive UTC and convert.
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt created_at '{}' on message '{}': {}", raw, message_id, e);
            chrono::DateTime::default()
        })
}
