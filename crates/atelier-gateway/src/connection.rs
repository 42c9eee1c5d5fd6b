use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::{info, warn};
use uuid::Uuid;

use atelier_types::api::Claims;
use atelier_types::events::{ChatCommand, ChatEvent};

use crate::service::{ChatService, Session};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// An unauthenticated socket that stays silent this long is dropped.
const AUTH_TIMEOUT: Duration = Duration::from_secs(30);

/// Handle one WebSocket connection through its whole lifecycle:
/// Unauthenticated -> Authenticated -> Closed.
///
/// The unauthenticated phase accepts only `Authenticate`; everything else
/// gets an error event and the session stays where it is. Once the JWT
/// checks out, the connection is registered with the dispatcher and the
/// loop splits into a send half (outbound events + heartbeat) and a recv
/// half (command parsing + service dispatch).
pub async fn handle_connection(socket: WebSocket, service: ChatService, jwt_secret: String) {
    let (mut sender, mut receiver) = socket.split();

    let Some((user_id, username)) = authenticate(&mut sender, &mut receiver, &jwt_secret).await
    else {
        warn!("WebSocket client failed to authenticate, closing");
        return;
    };

    info!("{} ({}) connected to chat gateway", username, user_id);

    let (conn_id, mut outbound) = service.dispatcher().register_connection(user_id).await;
    let session = Session {
        user_id,
        username: username.clone(),
        conn_id,
    };

    let ready = ChatEvent::Authenticated {
        user_id,
        username: username.clone(),
    };
    if sender
        .send(Message::Text(serde_json::to_string(&ready).unwrap().into()))
        .await
        .is_err()
    {
        service.dispatcher().unregister_connection(user_id, conn_id).await;
        return;
    }

    // Shared flag for heartbeat
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward dispatcher events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = outbound.recv() => {
                    let Some(event) = result else { break };
                    let text = serde_json::to_string(&event).unwrap();
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let recv_service = service.clone();
    let recv_session = session.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ChatCommand>(&text) {
                    // Re-authenticating an authenticated session is a no-op
                    Ok(ChatCommand::Authenticate { .. }) => {}
                    Ok(cmd) => recv_service.handle(&recv_session, cmd).await,
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            recv_session.username,
                            recv_session.user_id,
                            e,
                            &text[..text.len().min(200)]
                        );
                        recv_service
                            .dispatcher()
                            .send_to_conn(
                                recv_session.conn_id,
                                ChatEvent::Error {
                                    code: "bad_command".to_string(),
                                    message: "could not parse command".to_string(),
                                },
                            )
                            .await;
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    // Idempotent teardown; also safe if the peer vanished mid-operation
    service.dispatcher().unregister_connection(user_id, conn_id).await;
    info!("{} ({}) disconnected from chat gateway", username, user_id);
}

/// Unauthenticated phase. Loops until a valid `Authenticate` arrives;
/// a bad token or a premature command gets an error event back and the
/// session stays unauthenticated. Returns `None` on disconnect or after
/// `AUTH_TIMEOUT` of silence.
async fn authenticate(
    sender: &mut SplitSink<WebSocket, Message>,
    receiver: &mut SplitStream<WebSocket>,
    jwt_secret: &str,
) -> Option<(Uuid, String)> {
    loop {
        let msg = tokio::time::timeout(AUTH_TIMEOUT, receiver.next())
            .await
            .ok()??;
        let Ok(msg) = msg else { return None };

        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => return None,
            _ => continue,
        };

        match serde_json::from_str::<ChatCommand>(&text) {
            Ok(ChatCommand::Authenticate { token }) => {
                match decode::<Claims>(
                    &token,
                    &DecodingKey::from_secret(jwt_secret.as_bytes()),
                    &Validation::default(),
                ) {
                    Ok(data) => return Some((data.claims.sub, data.claims.username)),
                    Err(e) => {
                        warn!("WebSocket authentication rejected: {}", e);
                        send_error(sender, "unauthenticated", "invalid authentication token")
                            .await?;
                    }
                }
            }
            Ok(_) => {
                send_error(sender, "unauthenticated", "authenticate before sending commands")
                    .await?;
            }
            Err(_) => {
                send_error(sender, "bad_command", "could not parse command").await?;
            }
        }
    }
}

async fn send_error(
    sender: &mut SplitSink<WebSocket, Message>,
    code: &str,
    message: &str,
) -> Option<()> {
    let event = ChatEvent::Error {
        code: code.to_string(),
        message: message.to_string(),
    };
    sender
        .send(Message::Text(serde_json::to_string(&event).unwrap().into()))
        .await
        .ok()
}
