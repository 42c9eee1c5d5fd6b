use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::ChatMessage;

// -- JWT Claims --

/// JWT claims shared across atelier-api (REST middleware) and
/// atelier-gateway (WebSocket authentication). Canonical definition lives
/// here in atelier-types to eliminate duplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub token: String,
}

// -- Message history --

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Cursor: only return messages with an id strictly greater than this.
    pub since_id: Option<i64>,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    50
}

/// One entry in the conversation-list view: the most recent message
/// exchanged with a peer plus how many of their messages are unread.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub peer_id: Uuid,
    pub peer_username: String,
    pub last_message: ChatMessage,
    pub unread_count: u64,
}
