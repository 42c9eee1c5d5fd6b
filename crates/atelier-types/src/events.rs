use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::ChatMessage;

/// Per-type message payload. One variant per message type, each carrying
/// only the fields that type needs, so validation is an exhaustive match
/// instead of a struct full of optional columns.
///
/// The display text itself travels alongside as `content` (see
/// `ChatCommand::SendMessage` / `ChatMessage`); for non-text types the
/// server derives a fallback string when the client omits it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageBody {
    Text,
    Emoji,
    Image {
        file_url: String,
        file_name: Option<String>,
    },
    File {
        file_url: String,
        file_name: String,
        file_size: u64,
    },
    Collection { collection_id: Uuid },
    Poke,
    Quote { reply_to_id: i64 },
}

impl MessageBody {
    /// Stable type tag, used as the `msg_type` column value.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Emoji => "emoji",
            Self::Image { .. } => "image",
            Self::File { .. } => "file",
            Self::Collection { .. } => "collection",
            Self::Poke => "poke",
            Self::Quote { .. } => "quote",
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ChatCommand {
    /// Authenticate the WebSocket connection
    Authenticate { token: String },

    /// Join the direct-message room with a peer (live view open)
    JoinChat { peer_id: Uuid },

    /// Leave the direct-message room with a peer
    LeaveChat { peer_id: Uuid },

    /// Send a message to a peer
    SendMessage {
        receiver_id: Uuid,
        content: Option<String>,
        body: MessageBody,
    },

    /// Mark every unread message from a peer as read
    MarkRead { peer_id: Uuid },

    /// Soft-delete an own message
    DeleteMessage { message_id: i64 },

    /// Indicate typing to a peer
    Typing { peer_id: Uuid },

    /// Indicate typing stopped
    StopTyping { peer_id: Uuid },
}

/// Events sent FROM server TO client over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ChatEvent {
    /// Server confirms successful authentication
    Authenticated { user_id: Uuid, username: String },

    /// A command was rejected
    Error { code: String, message: String },

    /// A new message in a room the connection has joined
    NewMessage { message: ChatMessage },

    /// A new message for this user, delivered regardless of room
    /// membership so closed conversations can show an unread badge
    UnreadMessage { message: ChatMessage },

    /// Acknowledgment to the sender: the message was persisted
    MessageSent { message: ChatMessage },

    /// Messages this user sent to `reader_id` were marked read
    MessagesRead {
        reader_id: Uuid,
        peer_id: Uuid,
        updated: u64,
    },

    /// A message in a joined room was soft-deleted
    MessageDeleted { message_id: i64 },

    /// Acknowledgment to the requester: the deletion took effect
    MessageDeletedSuccess { message_id: i64 },

    /// Peer started typing
    UserTyping { user_id: Uuid },

    /// Peer stopped typing
    UserStopTyping { user_id: Uuid },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_message_wire_shape() {
        let cmd = ChatCommand::SendMessage {
            receiver_id: Uuid::nil(),
            content: None,
            body: MessageBody::File {
                file_url: "https://cdn/x".into(),
                file_name: "cert.pdf".into(),
                file_size: 1024,
            },
        };
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["type"], "SendMessage");
        assert_eq!(json["data"]["body"]["type"], "file");
        assert_eq!(json["data"]["body"]["file_size"], 1024);

        let back: ChatCommand = serde_json::from_value(json).unwrap();
        match back {
            ChatCommand::SendMessage { body: MessageBody::File { file_size, .. }, .. } => {
                assert_eq!(file_size, 1024)
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn kind_matches_serde_tag() {
        let body = MessageBody::Collection { collection_id: Uuid::nil() };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["type"], body.kind());
    }
}
