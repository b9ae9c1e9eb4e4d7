use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::{info, warn};
use uuid::Uuid;

use parley_chat::{ChatError, ChatResult, ChatService};
use parley_types::api::Claims;
use parley_types::events::{CLOSE_POLICY_VIOLATION, ChannelCommand, ChannelEvent};

use crate::registry::ChannelRegistry;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Drive one conversation channel connection through its lifecycle:
/// identity resolution, membership check, registry join, command loop,
/// unconditional registry leave on every exit path.
///
/// Unauthorized connections are closed with a policy-violation code and never
/// touch the registry.
pub async fn handle_socket(
    socket: WebSocket,
    chat: Arc<ChatService>,
    registry: ChannelRegistry,
    conversation_id: Uuid,
    token: Option<String>,
    jwt_secret: String,
) {
    let claims = match resolve_identity(token.as_deref(), &jwt_secret) {
        Ok(claims) => claims,
        Err(_) => {
            warn!("unidentified client rejected on conversation {}", conversation_id);
            close_policy_violation(socket).await;
            return;
        }
    };

    if let Err(e) = authorize(&chat, claims.sub, conversation_id).await {
        warn!(
            "{} ({}) rejected on conversation {}: {}",
            claims.username, claims.sub, conversation_id, e
        );
        close_policy_violation(socket).await;
        return;
    }

    info!(
        "{} ({}) connected to conversation {}",
        claims.username, claims.sub, conversation_id
    );
    run_session(socket, chat, registry, conversation_id, claims).await;
}

fn resolve_identity(token: Option<&str>, secret: &str) -> ChatResult<Claims> {
    let token = token.ok_or(ChatError::IdentityUnresolvable)?;
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| ChatError::IdentityUnresolvable)
}

/// Membership is checked against storage, never against the registry.
async fn authorize(chat: &Arc<ChatService>, user_id: i64, conversation_id: Uuid) -> ChatResult<()> {
    let chat = chat.clone();
    tokio::task::spawn_blocking(move || chat.ensure_participant(user_id, conversation_id))
        .await
        .map_err(|e| ChatError::Database(anyhow::anyhow!("spawn_blocking join error: {}", e)))?
}

async fn close_policy_violation(mut socket: WebSocket) {
    let frame = CloseFrame {
        code: CLOSE_POLICY_VIOLATION,
        reason: "policy violation".into(),
    };
    let _ = socket.send(Message::Close(Some(frame))).await;
}

async fn run_session(
    socket: WebSocket,
    chat: Arc<ChatService>,
    registry: ChannelRegistry,
    conversation_id: Uuid,
    claims: Claims,
) {
    let user_id = claims.sub;
    let (mut sender, mut receiver) = socket.split();
    let (conn_id, mut user_rx) = registry.join(conversation_id, user_id).await;

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward queued channel events to this client, with heartbeat.
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = user_rx.recv() => {
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

    // Read commands from the client, strictly one at a time in arrival order.
    let chat_recv = chat.clone();
    let registry_recv = registry.clone();
    let username = claims.username.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    match serde_json::from_str::<ChannelCommand>(&text) {
                        Ok(cmd) => {
                            // Commands run on their own task so a disconnect
                            // cannot cancel a persist that already started —
                            // its broadcast still goes out. Awaiting the handle
                            // keeps this session's commands sequential.
                            let fut = handle_command(
                                chat_recv.clone(),
                                registry_recv.clone(),
                                conversation_id,
                                user_id,
                                cmd,
                            );
                            let _ = tokio::spawn(fut).await;
                        }
                        Err(e) => {
                            let preview: String = text.chars().take(200).collect();
                            warn!("{} ({}) bad command: {} -- raw: {}", username, user_id, e, preview);
                        }
                    }
                }
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

    registry.leave(conversation_id, user_id, conn_id).await;
    info!(
        "{} ({}) disconnected from conversation {}",
        claims.username, user_id, conversation_id
    );
}

async fn handle_command(
    chat: Arc<ChatService>,
    registry: ChannelRegistry,
    conversation_id: Uuid,
    user_id: i64,
    cmd: ChannelCommand,
) {
    match cmd {
        ChannelCommand::MessageNew { text, reply_to } => {
            let service = chat.clone();
            let persisted = tokio::task::spawn_blocking(move || {
                service.send_message(user_id, conversation_id, text, reply_to)
            })
            .await;

            match persisted {
                // Commit happened before this point; now fan out to everyone
                // on the channel, sender included, so all clients converge on
                // the server-assigned id and timestamp.
                Ok(Ok(message)) => {
                    registry
                        .broadcast(conversation_id, ChannelEvent::MessageNew(message), None)
                        .await;
                }
                // The failure belongs to this connection only.
                Ok(Err(e)) => {
                    warn!("send from {} on {} failed: {}", user_id, conversation_id, e);
                    registry
                        .send_to_user(
                            conversation_id,
                            user_id,
                            ChannelEvent::Error {
                                detail: e.to_string(),
                            },
                        )
                        .await;
                }
                Err(e) => {
                    warn!("spawn_blocking join error: {}", e);
                    registry
                        .send_to_user(
                            conversation_id,
                            user_id,
                            ChannelEvent::Error {
                                detail: "internal error".into(),
                            },
                        )
                        .await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use parley_chat::DEFAULT_MAX_ATTACHMENT_BYTES;
    use parley_db::Database;
    use parley_types::models::ConversationType;

    const SECRET: &str = "test-secret";

    fn token_for(user_id: i64, username: &str) -> String {
        let claims = Claims {
            sub: user_id,
            username: username.to_string(),
            exp: (Utc::now() + chrono::Duration::hours(1)).timestamp() as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn identity_requires_a_valid_token() {
        assert!(matches!(
            resolve_identity(None, SECRET),
            Err(ChatError::IdentityUnresolvable)
        ));
        assert!(matches!(
            resolve_identity(Some("garbage"), SECRET),
            Err(ChatError::IdentityUnresolvable)
        ));

        let token = token_for(7, "alice");
        let claims = resolve_identity(Some(&token), SECRET).unwrap();
        assert_eq!(claims.sub, 7);
        assert_eq!(claims.username, "alice");
    }

    #[test]
    fn identity_rejects_a_token_signed_with_another_secret() {
        let token = token_for(7, "alice");
        assert!(matches!(
            resolve_identity(Some(&token), "other-secret"),
            Err(ChatError::IdentityUnresolvable)
        ));
    }

    #[tokio::test]
    async fn authorization_admits_members_and_rejects_outsiders() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let now = Utc::now().to_rfc3339();
        let alice = db.create_user("alice", "alice@example.com", None, "hash", &now).unwrap();
        let bob = db.create_user("bob", "bob@example.com", None, "hash", &now).unwrap();
        let chat = Arc::new(ChatService::new(db, DEFAULT_MAX_ATTACHMENT_BYTES));
        let conv = {
            let chat = chat.clone();
            tokio::task::spawn_blocking(move || {
                chat.create_conversation(alice, ConversationType::Group, None, &[])
            })
            .await
            .unwrap()
            .unwrap()
        };

        assert!(authorize(&chat, alice, conv.id).await.is_ok());
        assert!(matches!(
            authorize(&chat, bob, conv.id).await,
            Err(ChatError::NotAParticipant)
        ));
        assert!(matches!(
            authorize(&chat, alice, Uuid::new_v4()).await,
            Err(ChatError::NotAParticipant)
        ));
    }
}
