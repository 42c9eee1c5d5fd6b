use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use atelier_db::Database;
use atelier_db::models::NewMessageRow;
use atelier_types::events::{ChatCommand, ChatEvent, MessageBody};
use atelier_types::models::ChatMessage;

use crate::dispatcher::Dispatcher;
use crate::room::room_id;

/// Hard cap on the size of a shared file, matching the upload limit of
/// the file CRUD side of the application.
pub const MAX_FILE_SIZE: u64 = 5 * 1024 * 1024;

/// Fixed display text for a poke; pokes carry no payload of their own.
pub const POKE_CONTENT: &str = "Sent you a poke";

/// Display-name lookup for shared collection items. The catalog lives
/// outside this subsystem; failures only degrade the fallback text,
/// never the send itself.
pub trait CollectionCatalog: Send + Sync {
    fn display_name(&self, collection_id: Uuid) -> anyhow::Result<Option<String>>;
}

impl CollectionCatalog for Database {
    fn display_name(&self, collection_id: Uuid) -> anyhow::Result<Option<String>> {
        self.get_collection_name(&collection_id.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{0}")]
    Validation(String),
    #[error("you can only delete your own messages")]
    Forbidden,
    #[error("message not found")]
    NotFound,
    #[error("storage error")]
    Storage(#[from] anyhow::Error),
}

impl ChatError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "invalid_request",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not_found",
            Self::Storage(_) => "storage_error",
        }
    }
}

fn invalid(msg: &str) -> ChatError {
    ChatError::Validation(msg.to_string())
}

/// Identity of one authenticated connection, established by the session
/// handshake and threaded through every command.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: Uuid,
    pub username: String,
    pub conn_id: Uuid,
}

/// Orchestrates the messaging protocol: validates inbound commands,
/// persists through the message store, and fans the results out via the
/// dispatcher. Transport-independent — the WebSocket layer only parses
/// frames and calls [`ChatService::handle`].
#[derive(Clone)]
pub struct ChatService {
    inner: Arc<ChatServiceInner>,
}

struct ChatServiceInner {
    db: Arc<Database>,
    catalog: Arc<dyn CollectionCatalog>,
    dispatcher: Dispatcher,
}

impl ChatService {
    pub fn new(
        db: Arc<Database>,
        catalog: Arc<dyn CollectionCatalog>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            inner: Arc::new(ChatServiceInner {
                db,
                catalog,
                dispatcher,
            }),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    /// Entry point for every command from an authenticated session.
    /// A failed command becomes exactly one `error` event on the issuing
    /// connection; recipients never observe failed operations.
    pub async fn handle(&self, session: &Session, cmd: ChatCommand) {
        let result = match cmd {
            // The connection layer owns the handshake
            ChatCommand::Authenticate { .. } => Ok(()),

            ChatCommand::JoinChat { peer_id } => self.join_chat(session, peer_id).await,
            ChatCommand::LeaveChat { peer_id } => self.leave_chat(session, peer_id).await,
            ChatCommand::SendMessage {
                receiver_id,
                content,
                body,
            } => self.send_message(session, receiver_id, content, body).await,
            ChatCommand::MarkRead { peer_id } => self.mark_read(session, peer_id).await,
            ChatCommand::DeleteMessage { message_id } => {
                self.delete_message(session, message_id).await
            }
            ChatCommand::Typing { peer_id } => self.typing(session, peer_id, true).await,
            ChatCommand::StopTyping { peer_id } => self.typing(session, peer_id, false).await,
        };

        if let Err(err) = result {
            if let ChatError::Storage(e) = &err {
                error!(
                    "{} ({}): storage failure: {:#}",
                    session.username, session.user_id, e
                );
            }
            self.inner
                .dispatcher
                .send_to_conn(
                    session.conn_id,
                    ChatEvent::Error {
                        code: err.code().to_string(),
                        message: err.to_string(),
                    },
                )
                .await;
        }
    }

    async fn join_chat(&self, session: &Session, peer_id: Uuid) -> Result<(), ChatError> {
        let room = room_id(session.user_id, peer_id);
        self.inner.dispatcher.join_room(&room, session.conn_id).await;
        Ok(())
    }

    async fn leave_chat(&self, session: &Session, peer_id: Uuid) -> Result<(), ChatError> {
        let room = room_id(session.user_id, peer_id);
        self.inner.dispatcher.leave_room(&room, session.conn_id).await;
        Ok(())
    }

    /// Validate, persist, then fan out. Broadcast only happens after the
    /// write returns, so room delivery order equals persistence order and
    /// a failed send is all-or-nothing.
    async fn send_message(
        &self,
        session: &Session,
        receiver_id: Uuid,
        content: Option<String>,
        body: MessageBody,
    ) -> Result<(), ChatError> {
        let sender_id = session.user_id;
        if sender_id == receiver_id {
            return Err(invalid("cannot send a message to yourself"));
        }

        let content = self.resolve_content(content, &body).await?;

        let (file_url, file_name, file_size, collection_id, reply_to_id) = match &body {
            MessageBody::Image { file_url, file_name } => {
                (Some(file_url.clone()), file_name.clone(), None, None, None)
            }
            MessageBody::File {
                file_url,
                file_name,
                file_size,
            } => (
                Some(file_url.clone()),
                Some(file_name.clone()),
                Some(*file_size as i64),
                None,
                None,
            ),
            MessageBody::Collection { collection_id } => {
                (None, None, None, Some(collection_id.to_string()), None)
            }
            MessageBody::Quote { reply_to_id } => (None, None, None, None, Some(*reply_to_id)),
            MessageBody::Text | MessageBody::Emoji | MessageBody::Poke => {
                (None, None, None, None, None)
            }
        };

        let created_at = Utc::now();
        let row = NewMessageRow {
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
            msg_type: body.kind(),
            content: content.clone(),
            file_url,
            file_name,
            file_size,
            collection_id,
            reply_to_id,
            created_at: created_at.to_rfc3339(),
        };
        let id = self.run_blocking(move |db| db.insert_message(&row)).await?;

        let message = ChatMessage {
            id,
            sender_id,
            sender_username: session.username.clone(),
            receiver_id,
            content,
            body,
            is_read: false,
            created_at,
        };

        info!(
            "{} ({}) -> {} [{} #{}]",
            session.username,
            sender_id,
            receiver_id,
            message.body.kind(),
            id
        );

        let dispatcher = &self.inner.dispatcher;
        let room = room_id(sender_id, receiver_id);
        dispatcher
            .send_to_room(&room, ChatEvent::NewMessage { message: message.clone() })
            .await;
        dispatcher
            .send_to_user(receiver_id, ChatEvent::UnreadMessage { message: message.clone() })
            .await;
        dispatcher
            .send_to_conn(session.conn_id, ChatEvent::MessageSent { message })
            .await;

        Ok(())
    }

    /// Per-variant validation plus derivation of the display string when
    /// the caller omitted one.
    async fn resolve_content(
        &self,
        content: Option<String>,
        body: &MessageBody,
    ) -> Result<String, ChatError> {
        let content = content
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        match body {
            MessageBody::Text => content.ok_or_else(|| invalid("text message needs content")),
            MessageBody::Emoji => content.ok_or_else(|| invalid("emoji message needs content")),
            MessageBody::Quote { .. } => {
                content.ok_or_else(|| invalid("quoted reply needs content"))
            }
            MessageBody::Image { file_url, .. } => {
                if file_url.trim().is_empty() {
                    return Err(invalid("image message needs a file URL"));
                }
                Ok(content.unwrap_or_else(|| "[Image]".to_string()))
            }
            MessageBody::File {
                file_url,
                file_name,
                file_size,
            } => {
                if file_url.trim().is_empty() {
                    return Err(invalid("file message needs a file URL"));
                }
                if *file_size > MAX_FILE_SIZE {
                    return Err(invalid("file exceeds the 5 MiB limit"));
                }
                Ok(content.unwrap_or_else(|| format!("[File] {file_name}")))
            }
            MessageBody::Collection { collection_id } => match content {
                Some(c) => Ok(c),
                None => Ok(self.collection_fallback(*collection_id).await),
            },
            MessageBody::Poke => Ok(POKE_CONTENT.to_string()),
        }
    }

    /// Best-effort display name for a shared collection item. A missing
    /// item or catalog failure degrades to a generic placeholder.
    async fn collection_fallback(&self, collection_id: Uuid) -> String {
        let catalog = self.inner.catalog.clone();
        let looked_up =
            tokio::task::spawn_blocking(move || catalog.display_name(collection_id)).await;

        match looked_up {
            Ok(Ok(Some(name))) => format!("[Collection] {name}"),
            Ok(Ok(None)) => "[Collection item]".to_string(),
            Ok(Err(e)) => {
                warn!("Collection lookup failed for {}: {:#}", collection_id, e);
                "[Collection item]".to_string()
            }
            Err(e) => {
                warn!("Collection lookup task failed for {}: {}", collection_id, e);
                "[Collection item]".to_string()
            }
        }
    }

    /// Bulk read-receipt: one UPDATE, never a per-message loop. Zero
    /// matching rows is a no-op, not an error; the caller is always
    /// acknowledged.
    async fn mark_read(&self, session: &Session, peer_id: Uuid) -> Result<(), ChatError> {
        let reader_id = session.user_id;
        let (reader, peer) = (reader_id.to_string(), peer_id.to_string());
        let updated = self
            .run_blocking(move |db| db.mark_read(&reader, &peer))
            .await?;

        let event = ChatEvent::MessagesRead {
            reader_id,
            peer_id,
            updated: updated as u64,
        };
        if updated > 0 {
            self.inner.dispatcher.send_to_user(peer_id, event.clone()).await;
        }
        self.inner.dispatcher.send_to_conn(session.conn_id, event).await;
        Ok(())
    }

    /// Sender-only soft delete. Re-deleting an already-deleted message
    /// acknowledges without re-broadcasting; it never becomes undeleted.
    async fn delete_message(&self, session: &Session, message_id: i64) -> Result<(), ChatError> {
        let row = self
            .run_blocking(move |db| db.get_message(message_id))
            .await?
            .ok_or(ChatError::NotFound)?;

        if row.sender_id != session.user_id.to_string() {
            return Err(ChatError::Forbidden);
        }

        let ack = ChatEvent::MessageDeletedSuccess { message_id };
        if row.is_deleted {
            self.inner.dispatcher.send_to_conn(session.conn_id, ack).await;
            return Ok(());
        }

        self.run_blocking(move |db| db.soft_delete_message(message_id))
            .await?;

        let receiver_id: Uuid = row.receiver_id.parse().map_err(|_| {
            ChatError::Storage(anyhow::anyhow!(
                "corrupt receiver id on message {message_id}"
            ))
        })?;

        info!(
            "{} ({}) deleted message #{}",
            session.username, session.user_id, message_id
        );

        let room = room_id(session.user_id, receiver_id);
        self.inner
            .dispatcher
            .send_to_room(&room, ChatEvent::MessageDeleted { message_id })
            .await;
        self.inner.dispatcher.send_to_conn(session.conn_id, ack).await;
        Ok(())
    }

    /// Ephemeral typing indicator: never persisted, duplicates harmless.
    async fn typing(
        &self,
        session: &Session,
        peer_id: Uuid,
        started: bool,
    ) -> Result<(), ChatError> {
        let event = if started {
            ChatEvent::UserTyping { user_id: session.user_id }
        } else {
            ChatEvent::UserStopTyping { user_id: session.user_id }
        };
        self.inner.dispatcher.send_to_user(peer_id, event).await;
        Ok(())
    }

    /// Run a store round-trip on the blocking pool; only the issuing
    /// handler suspends while it completes.
    async fn run_blocking<T, F>(&self, f: F) -> Result<T, ChatError>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    {
        let db = self.inner.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| ChatError::Storage(anyhow::anyhow!("blocking task failed: {e}")))?
            .map_err(ChatError::Storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn test_service() -> (ChatService, Arc<Database>) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let service = ChatService::new(db.clone(), db.clone(), Dispatcher::new());
        (service, db)
    }

    async fn connect(
        service: &ChatService,
        username: &str,
    ) -> (Session, UnboundedReceiver<ChatEvent>) {
        let user_id = Uuid::new_v4();
        let (conn_id, rx) = service.dispatcher().register_connection(user_id).await;
        (
            Session {
                user_id,
                username: username.to_string(),
                conn_id,
            },
            rx,
        )
    }

    async fn send_text(service: &ChatService, session: &Session, receiver: Uuid, text: &str) {
        service
            .handle(
                session,
                ChatCommand::SendMessage {
                    receiver_id: receiver,
                    content: Some(text.to_string()),
                    body: MessageBody::Text,
                },
            )
            .await;
    }

    fn next(rx: &mut UnboundedReceiver<ChatEvent>) -> ChatEvent {
        rx.try_recv().expect("expected a queued event")
    }

    fn message_count(db: &Database) -> i64 {
        db.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM messages", [], |r| r.get(0))?)
        })
        .unwrap()
    }

    #[tokio::test]
    async fn happy_path_send_and_read() {
        let (service, db) = test_service();
        let (alice, mut alice_rx) = connect(&service, "alice").await;
        let (bob, mut bob_rx) = connect(&service, "bob").await;

        service
            .handle(&alice, ChatCommand::JoinChat { peer_id: bob.user_id })
            .await;
        service
            .handle(&bob, ChatCommand::JoinChat { peer_id: alice.user_id })
            .await;

        send_text(&service, &alice, bob.user_id, "hi").await;

        // Bob: room broadcast first, then the presence-scoped unread copy
        let ChatEvent::NewMessage { message } = next(&mut bob_rx) else {
            panic!("expected NewMessage");
        };
        assert_eq!(message.sender_id, alice.user_id);
        assert_eq!(message.content, "hi");
        assert!(!message.is_read);
        assert!(matches!(next(&mut bob_rx), ChatEvent::UnreadMessage { .. }));

        // Alice: her own room copy plus the persistence ack
        assert!(matches!(next(&mut alice_rx), ChatEvent::NewMessage { .. }));
        assert!(matches!(next(&mut alice_rx), ChatEvent::MessageSent { .. }));

        // Bob reads; Alice is notified and the row flips
        service
            .handle(&bob, ChatCommand::MarkRead { peer_id: alice.user_id })
            .await;
        let ChatEvent::MessagesRead { reader_id, updated, .. } = next(&mut alice_rx) else {
            panic!("expected MessagesRead");
        };
        assert_eq!(reader_id, bob.user_id);
        assert_eq!(updated, 1);

        let row = db.get_message(message.id).unwrap().unwrap();
        assert!(row.is_read);
    }

    #[tokio::test]
    async fn self_message_is_rejected_without_persisting() {
        let (service, db) = test_service();
        let (alice, mut alice_rx) = connect(&service, "alice").await;

        send_text(&service, &alice, alice.user_id, "note to self").await;

        let ChatEvent::Error { code, .. } = next(&mut alice_rx) else {
            panic!("expected Error");
        };
        assert_eq!(code, "invalid_request");
        assert_eq!(message_count(&db), 0);
    }

    #[tokio::test]
    async fn invalid_payload_is_all_or_nothing() {
        let (service, db) = test_service();
        let (alice, mut alice_rx) = connect(&service, "alice").await;
        let (bob, mut bob_rx) = connect(&service, "bob").await;
        service
            .handle(&bob, ChatCommand::JoinChat { peer_id: alice.user_id })
            .await;

        // File with no URL: rejected before any write or broadcast
        service
            .handle(
                &alice,
                ChatCommand::SendMessage {
                    receiver_id: bob.user_id,
                    content: None,
                    body: MessageBody::File {
                        file_url: "".into(),
                        file_name: "cert.pdf".into(),
                        file_size: 100,
                    },
                },
            )
            .await;

        assert!(matches!(next(&mut alice_rx), ChatEvent::Error { .. }));
        assert!(bob_rx.try_recv().is_err());
        assert_eq!(message_count(&db), 0);
    }

    #[tokio::test]
    async fn oversized_file_is_rejected() {
        let (service, db) = test_service();
        let (alice, mut alice_rx) = connect(&service, "alice").await;
        let bob = Uuid::new_v4();

        service
            .handle(
                &alice,
                ChatCommand::SendMessage {
                    receiver_id: bob,
                    content: None,
                    body: MessageBody::File {
                        file_url: "https://cdn/appraisal.pdf".into(),
                        file_name: "appraisal.pdf".into(),
                        file_size: 6_000_000,
                    },
                },
            )
            .await;

        let ChatEvent::Error { code, .. } = next(&mut alice_rx) else {
            panic!("expected Error");
        };
        assert_eq!(code, "invalid_request");
        assert_eq!(message_count(&db), 0);
    }

    #[tokio::test]
    async fn offline_receiver_still_persists_and_acks() {
        let (service, db) = test_service();
        let (alice, mut alice_rx) = connect(&service, "alice").await;
        let offline_bob = Uuid::new_v4();

        send_text(&service, &alice, offline_bob, "are you there?").await;

        // No room joined, receiver offline: only the ack reaches anyone
        assert!(matches!(next(&mut alice_rx), ChatEvent::MessageSent { .. }));
        assert!(alice_rx.try_recv().is_err());
        assert_eq!(message_count(&db), 1);
    }

    #[tokio::test]
    async fn unauthorized_delete_fails_closed() {
        let (service, db) = test_service();
        let (alice, mut alice_rx) = connect(&service, "alice").await;
        let (bob, mut bob_rx) = connect(&service, "bob").await;

        send_text(&service, &alice, bob.user_id, "keep this").await;
        let ChatEvent::MessageSent { message } = next(&mut alice_rx) else {
            panic!("expected MessageSent");
        };
        let _ = next(&mut bob_rx); // UnreadMessage

        service
            .handle(&bob, ChatCommand::DeleteMessage { message_id: message.id })
            .await;
        let ChatEvent::Error { code, .. } = next(&mut bob_rx) else {
            panic!("expected Error");
        };
        assert_eq!(code, "forbidden");
        assert!(!db.get_message(message.id).unwrap().unwrap().is_deleted);

        // Deleting a message that never existed is a clean not-found
        service
            .handle(&bob, ChatCommand::DeleteMessage { message_id: 9999 })
            .await;
        let ChatEvent::Error { code, .. } = next(&mut bob_rx) else {
            panic!("expected Error");
        };
        assert_eq!(code, "not_found");
    }

    #[tokio::test]
    async fn delete_is_one_way_and_idempotent() {
        let (service, db) = test_service();
        let (alice, mut alice_rx) = connect(&service, "alice").await;
        let (bob, mut bob_rx) = connect(&service, "bob").await;
        service
            .handle(&bob, ChatCommand::JoinChat { peer_id: alice.user_id })
            .await;

        send_text(&service, &alice, bob.user_id, "typo").await;
        let _ = next(&mut bob_rx); // NewMessage
        let _ = next(&mut bob_rx); // UnreadMessage
        let ChatEvent::MessageSent { message } = next(&mut alice_rx) else {
            panic!("expected MessageSent");
        };

        service
            .handle(&alice, ChatCommand::DeleteMessage { message_id: message.id })
            .await;
        assert!(matches!(next(&mut bob_rx), ChatEvent::MessageDeleted { .. }));
        assert!(matches!(
            next(&mut alice_rx),
            ChatEvent::MessageDeletedSuccess { .. }
        ));
        assert!(db.get_message(message.id).unwrap().unwrap().is_deleted);

        // Second delete: acknowledged no-op, no second room broadcast
        service
            .handle(&alice, ChatCommand::DeleteMessage { message_id: message.id })
            .await;
        assert!(matches!(
            next(&mut alice_rx),
            ChatEvent::MessageDeletedSuccess { .. }
        ));
        assert!(bob_rx.try_recv().is_err());
        assert!(db.get_message(message.id).unwrap().unwrap().is_deleted);
    }

    #[tokio::test]
    async fn room_delivery_follows_persistence_order() {
        let (service, _db) = test_service();
        let (alice, _alice_rx) = connect(&service, "alice").await;
        let (bob, mut bob_rx) = connect(&service, "bob").await;
        service
            .handle(&bob, ChatCommand::JoinChat { peer_id: alice.user_id })
            .await;

        send_text(&service, &alice, bob.user_id, "first").await;
        send_text(&service, &alice, bob.user_id, "second").await;

        let mut room_messages = vec![];
        while let Ok(event) = bob_rx.try_recv() {
            if let ChatEvent::NewMessage { message } = event {
                room_messages.push(message);
            }
        }
        assert_eq!(room_messages.len(), 2);
        assert_eq!(room_messages[0].content, "first");
        assert_eq!(room_messages[1].content, "second");
        assert!(room_messages[0].id < room_messages[1].id);
    }

    #[tokio::test]
    async fn leave_chat_stops_room_delivery() {
        let (service, _db) = test_service();
        let (alice, mut alice_rx) = connect(&service, "alice").await;
        let (bob, mut bob_rx) = connect(&service, "bob").await;
        service
            .handle(&bob, ChatCommand::JoinChat { peer_id: alice.user_id })
            .await;
        service
            .handle(&bob, ChatCommand::LeaveChat { peer_id: alice.user_id })
            .await;

        send_text(&service, &alice, bob.user_id, "anyone home?").await;

        // Bob left the room but stays presence-registered: unread copy only
        assert!(matches!(next(&mut bob_rx), ChatEvent::UnreadMessage { .. }));
        assert!(bob_rx.try_recv().is_err());
        assert!(matches!(next(&mut alice_rx), ChatEvent::MessageSent { .. }));
    }

    #[tokio::test]
    async fn typing_is_forwarded_not_persisted() {
        let (service, db) = test_service();
        let (alice, _alice_rx) = connect(&service, "alice").await;
        let (bob, mut bob_rx) = connect(&service, "bob").await;

        service
            .handle(&alice, ChatCommand::Typing { peer_id: bob.user_id })
            .await;
        service
            .handle(&alice, ChatCommand::StopTyping { peer_id: bob.user_id })
            .await;

        let ChatEvent::UserTyping { user_id } = next(&mut bob_rx) else {
            panic!("expected UserTyping");
        };
        assert_eq!(user_id, alice.user_id);
        assert!(matches!(next(&mut bob_rx), ChatEvent::UserStopTyping { .. }));
        assert_eq!(message_count(&db), 0);
    }

    #[tokio::test]
    async fn poke_renders_fixed_phrase() {
        let (service, _db) = test_service();
        let (alice, mut alice_rx) = connect(&service, "alice").await;
        let bob = Uuid::new_v4();

        service
            .handle(
                &alice,
                ChatCommand::SendMessage {
                    receiver_id: bob,
                    content: Some("ignored".into()),
                    body: MessageBody::Poke,
                },
            )
            .await;

        let ChatEvent::MessageSent { message } = next(&mut alice_rx) else {
            panic!("expected MessageSent");
        };
        assert_eq!(message.content, POKE_CONTENT);
    }

    #[tokio::test]
    async fn collection_share_resolves_display_name() {
        let (service, db) = test_service();
        let (alice, mut alice_rx) = connect(&service, "alice").await;
        let bob = Uuid::new_v4();

        let item = Uuid::new_v4();
        db.upsert_collection_item(&item.to_string(), "Burmese Ruby Ring")
            .unwrap();

        service
            .handle(
                &alice,
                ChatCommand::SendMessage {
                    receiver_id: bob,
                    content: None,
                    body: MessageBody::Collection { collection_id: item },
                },
            )
            .await;

        let ChatEvent::MessageSent { message } = next(&mut alice_rx) else {
            panic!("expected MessageSent");
        };
        assert_eq!(message.content, "[Collection] Burmese Ruby Ring");
    }

    #[tokio::test]
    async fn collection_lookup_failure_degrades_without_aborting() {
        struct FailingCatalog;
        impl CollectionCatalog for FailingCatalog {
            fn display_name(&self, _collection_id: Uuid) -> anyhow::Result<Option<String>> {
                Err(anyhow::anyhow!("catalog offline"))
            }
        }

        let db = Arc::new(Database::open_in_memory().unwrap());
        let service = ChatService::new(db.clone(), Arc::new(FailingCatalog), Dispatcher::new());
        let (alice, mut alice_rx) = connect(&service, "alice").await;

        service
            .handle(
                &alice,
                ChatCommand::SendMessage {
                    receiver_id: Uuid::new_v4(),
                    content: None,
                    body: MessageBody::Collection { collection_id: Uuid::new_v4() },
                },
            )
            .await;

        let ChatEvent::MessageSent { message } = next(&mut alice_rx) else {
            panic!("expected MessageSent, lookup failure must not abort the send");
        };
        assert_eq!(message.content, "[Collection item]");
        assert_eq!(message_count(&db), 1);
    }
}
