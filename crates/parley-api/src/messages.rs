use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::error;
use uuid::Uuid;

use parley_types::api::{Claims, SendMessageRequest, UpdateMessageRequest};
use parley_types::events::ChannelEvent;

use crate::auth::AppState;
use crate::error::into_status;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_limit() -> u32 {
    50
}

/// Persist the message, then publish it on the conversation's channel.
/// Everyone on the channel gets the event, the sender's own live connections
/// included — the HTTP response and the realtime event carry the same payload.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let chat = state.chat.clone();
    let conversation_id = req.conversation_id;
    let message = tokio::task::spawn_blocking(move || {
        chat.send_message(claims.sub, conversation_id, req.text, req.reply_to)
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .map_err(into_status)?;

    state
        .registry
        .broadcast(conversation_id, ChannelEvent::MessageNew(message.clone()), None)
        .await;

    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn list_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<MessageQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let chat = state.chat.clone();
    let messages = tokio::task::spawn_blocking(move || {
        chat.list_messages(claims.sub, conversation_id, query.limit, query.offset)
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .map_err(into_status)?;

    Ok(Json(messages))
}

pub async fn update_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateMessageRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let chat = state.chat.clone();
    let message = tokio::task::spawn_blocking(move || {
        chat.update_message_text(claims.sub, message_id, &req.text)
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .map_err(into_status)?;

    Ok(Json(message))
}

pub async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let chat = state.chat.clone();
    tokio::task::spawn_blocking(move || chat.delete_message(claims.sub, message_id))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(into_status)?;

    Ok(StatusCode::NO_CONTENT)
}
