use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use atelier_types::events::ChatEvent;

use crate::presence::PresenceRegistry;

/// Routes outbound events to live connections. Owns the presence
/// registry plus two routing tables: connection id -> outbound channel,
/// and room id -> joined connection ids.
///
/// Every send is best-effort: a connection that disconnected or never
/// joined simply receives nothing, which is not an error. Channels are
/// unbounded so a slow reader never blocks the sender's ack path.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    presence: PresenceRegistry,

    /// Per-connection outbound event channels
    conns: RwLock<HashMap<Uuid, mpsc::UnboundedSender<ChatEvent>>>,

    /// Room membership: room id -> joined connection ids
    rooms: RwLock<HashMap<String, HashSet<Uuid>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                presence: PresenceRegistry::new(),
                conns: RwLock::new(HashMap::new()),
                rooms: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn presence(&self) -> &PresenceRegistry {
        &self.inner.presence
    }

    /// Register a freshly authenticated connection. Returns the new
    /// connection id and the receiver half of its outbound channel.
    pub async fn register_connection(
        &self,
        user_id: Uuid,
    ) -> (Uuid, mpsc::UnboundedReceiver<ChatEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.conns.write().await.insert(conn_id, tx);
        self.inner.presence.register(user_id, conn_id).await;
        (conn_id, rx)
    }

    /// Tear down a connection: drop its channel, its presence membership,
    /// and every room membership. Idempotent — unregistering an unknown
    /// connection is a no-op.
    pub async fn unregister_connection(&self, user_id: Uuid, conn_id: Uuid) {
        self.inner.conns.write().await.remove(&conn_id);
        self.inner.presence.unregister(user_id, conn_id).await;

        let mut rooms = self.inner.rooms.write().await;
        rooms.retain(|_, members| {
            members.remove(&conn_id);
            !members.is_empty()
        });
    }

    pub async fn join_room(&self, room_id: &str, conn_id: Uuid) {
        self.inner
            .rooms
            .write()
            .await
            .entry(room_id.to_string())
            .or_default()
            .insert(conn_id);
    }

    pub async fn leave_room(&self, room_id: &str, conn_id: Uuid) {
        let mut rooms = self.inner.rooms.write().await;
        if let Some(members) = rooms.get_mut(room_id) {
            members.remove(&conn_id);
            if members.is_empty() {
                rooms.remove(room_id);
            }
        }
    }

    /// Send to one connection. Silently drops if it is gone.
    pub async fn send_to_conn(&self, conn_id: Uuid, event: ChatEvent) {
        let conns = self.inner.conns.read().await;
        if let Some(tx) = conns.get(&conn_id) {
            let _ = tx.send(event);
        }
    }

    /// Fan out to every presence-registered connection of a user.
    /// A user with no live connections is a silent no-op.
    pub async fn send_to_user(&self, user_id: Uuid, event: ChatEvent) {
        let targets = self.inner.presence.connections_for(user_id).await;
        if targets.is_empty() {
            return;
        }
        let conns = self.inner.conns.read().await;
        for conn_id in targets {
            if let Some(tx) = conns.get(&conn_id) {
                let _ = tx.send(event.clone());
            }
        }
    }

    /// Fan out to every connection currently joined to a room.
    pub async fn send_to_room(&self, room_id: &str, event: ChatEvent) {
        let targets: Vec<Uuid> = {
            let rooms = self.inner.rooms.read().await;
            match rooms.get(room_id) {
                Some(members) => members.iter().copied().collect(),
                None => return,
            }
        };
        let conns = self.inner.conns.read().await;
        for conn_id in targets {
            if let Some(tx) = conns.get(&conn_id) {
                let _ = tx.send(event.clone());
            }
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typing(user: Uuid) -> ChatEvent {
        ChatEvent::UserTyping { user_id: user }
    }

    #[tokio::test]
    async fn send_to_user_reaches_every_device() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();
        let (_c1, mut rx1) = dispatcher.register_connection(user).await;
        let (_c2, mut rx2) = dispatcher.register_connection(user).await;

        dispatcher.send_to_user(user, typing(user)).await;
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn room_membership_scopes_delivery() {
        let dispatcher = Dispatcher::new();
        let (in_room, mut rx_in) = dispatcher.register_connection(Uuid::new_v4()).await;
        let (_out, mut rx_out) = dispatcher.register_connection(Uuid::new_v4()).await;

        dispatcher.join_room("dm:x:y", in_room).await;
        dispatcher.send_to_room("dm:x:y", typing(Uuid::new_v4())).await;

        assert!(rx_in.try_recv().is_ok());
        assert!(rx_out.try_recv().is_err());
    }

    #[tokio::test]
    async fn unregister_clears_rooms_and_presence() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();
        let (conn, _rx) = dispatcher.register_connection(user).await;
        dispatcher.join_room("dm:x:y", conn).await;

        dispatcher.unregister_connection(user, conn).await;
        // Double unregister is a harmless no-op
        dispatcher.unregister_connection(user, conn).await;

        assert!(dispatcher.presence().connections_for(user).await.is_empty());
        // Sends to the vanished connection and empty room do nothing
        dispatcher.send_to_room("dm:x:y", typing(user)).await;
        dispatcher.send_to_user(user, typing(user)).await;
    }
}
