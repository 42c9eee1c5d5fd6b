use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::events::MessageBody;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

/// A fully-hydrated direct message as delivered to clients, both over the
/// WebSocket gateway and from the history endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub sender_id: Uuid,
    pub sender_username: String,
    pub receiver_id: Uuid,
    /// Display text; for non-text types a server-derived fallback.
    pub content: String,
    #[serde(flatten)]
    pub body: MessageBody,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}
