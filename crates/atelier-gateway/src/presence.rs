use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

/// Process-wide map from user id to the set of that user's live
/// connection ids. Supports multiple simultaneous connections per user
/// (multi-device). Volatile by design: state is lost on restart and
/// clients re-authenticate on reconnect.
///
/// The interface is deliberately narrow (register/unregister/lookup) so
/// a distributed backplane could replace it without touching the chat
/// service.
#[derive(Clone, Default)]
pub struct PresenceRegistry {
    entries: Arc<RwLock<HashMap<Uuid, HashSet<Uuid>>>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a live connection for a user. Idempotent: registering the
    /// same pair twice is a no-op beyond the first.
    pub async fn register(&self, user_id: Uuid, conn_id: Uuid) {
        self.entries
            .write()
            .await
            .entry(user_id)
            .or_default()
            .insert(conn_id);
    }

    /// Remove one connection membership. The whole entry is pruned when
    /// its set empties, so the map stays bounded by live connections.
    /// Unregistering a non-member is a no-op.
    pub async fn unregister(&self, user_id: Uuid, conn_id: Uuid) {
        let mut entries = self.entries.write().await;
        if let Some(conns) = entries.get_mut(&user_id) {
            conns.remove(&conn_id);
            if conns.is_empty() {
                entries.remove(&user_id);
            }
        }
    }

    /// Snapshot of the user's live connection ids; empty when offline.
    pub async fn connections_for(&self, user_id: Uuid) -> HashSet<Uuid> {
        self.entries
            .read()
            .await
            .get(&user_id)
            .cloned()
            .unwrap_or_default()
    }
}
