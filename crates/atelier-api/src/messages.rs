use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{error, warn};
use uuid::Uuid;

use atelier_types::api::{Claims, ConversationSummary, HistoryQuery};
use atelier_types::events::ChatEvent;
use atelier_types::models::ChatMessage;

use crate::auth::AppStateInner;

/// The conversation list groups a fixed window of the caller's most
/// recent messages in memory instead of running an aggregate query.
/// Conversations whose entire history falls outside the window drop off
/// the list; an accepted trade-off for a cheap, index-friendly scan.
const CONVERSATION_WINDOW: u32 = 500;

/// History between the caller and one peer: persisted, non-deleted
/// messages ascending in time, `since_id` cursor for incremental polling.
/// Viewing history marks the peer's messages read as a side effect, and
/// the peer's live connections hear about it.
pub async fn get_messages(
    State(state): State<Arc<AppStateInner>>,
    Path(peer_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    // Run blocking DB work off the async runtime
    let db = state.db.clone();
    let me = claims.sub.to_string();
    let peer = peer_id.to_string();
    let limit = query.limit.min(200);
    let since_id = query.since_id;

    let (rows, updated) = tokio::task::spawn_blocking(move || {
        let rows = db
            .conversation(&me, &peer, since_id, limit)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        let updated = db
            .mark_read(&me, &peer)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        Ok::<_, StatusCode>((rows, updated))
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })??;

    if updated > 0 {
        state
            .dispatcher
            .send_to_user(
                peer_id,
                ChatEvent::MessagesRead {
                    reader_id: claims.sub,
                    peer_id,
                    updated: updated as u64,
                },
            )
            .await;
    }

    let messages: Vec<ChatMessage> = rows.into_iter().map(|row| row.into_message()).collect();
    Ok(Json(messages))
}

/// Aggregated conversation-list view: most recent message plus unread
/// count per peer, newest conversation first.
pub async fn get_conversations(
    State(state): State<Arc<AppStateInner>>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let me = claims.sub.to_string();
    let scan_user = me.clone();

    let rows = tokio::task::spawn_blocking(move || {
        db.recent_messages_for(&scan_user, CONVERSATION_WINDOW)
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    // Rows arrive newest-first, so the first row seen for a peer is that
    // conversation's most recent message; later rows only add unread.
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut summaries: Vec<ConversationSummary> = Vec::new();

    for row in rows {
        let (peer_raw, peer_username) = if row.sender_id == me {
            (row.receiver_id.clone(), row.receiver_username.clone())
        } else {
            (row.sender_id.clone(), row.sender_username.clone())
        };
        let unread = u64::from(row.receiver_id == me && !row.is_read);

        match index.get(&peer_raw) {
            Some(&i) => summaries[i].unread_count += unread,
            None => {
                let Ok(peer_id) = peer_raw.parse::<Uuid>() else {
                    warn!("Corrupt peer id '{}' on message '{}'", peer_raw, row.id);
                    continue;
                };
                index.insert(peer_raw, summaries.len());
                summaries.push(ConversationSummary {
                    peer_id,
                    peer_username,
                    last_message: row.into_message(),
                    unread_count: unread,
                });
            }
        }
    }

    Ok(Json(summaries))
}
