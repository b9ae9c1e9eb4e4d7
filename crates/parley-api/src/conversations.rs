use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::error;
use uuid::Uuid;

use parley_types::api::{Claims, CreateConversationRequest, RenameConversationRequest};

use crate::auth::AppState;
use crate::error::into_status;

pub async fn create_conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateConversationRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let chat = state.chat.clone();
    let conversation = tokio::task::spawn_blocking(move || {
        chat.create_conversation(claims.sub, req.kind, req.title, &req.participant_ids)
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .map_err(into_status)?;

    Ok((StatusCode::CREATED, Json(conversation)))
}

pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let chat = state.chat.clone();
    let conversations = tokio::task::spawn_blocking(move || chat.list_conversations(claims.sub))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(into_status)?;

    Ok(Json(conversations))
}

pub async fn get_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let chat = state.chat.clone();
    let conversation =
        tokio::task::spawn_blocking(move || chat.get_conversation(claims.sub, conversation_id))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            })?
            .map_err(into_status)?;

    Ok(Json(conversation))
}

pub async fn rename_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<RenameConversationRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let chat = state.chat.clone();
    let conversation = tokio::task::spawn_blocking(move || {
        chat.rename_conversation(claims.sub, conversation_id, req.title)
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .map_err(into_status)?;

    Ok(Json(conversation))
}

pub async fn delete_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let chat = state.chat.clone();
    tokio::task::spawn_blocking(move || chat.delete_conversation(claims.sub, conversation_id))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(into_status)?;

    Ok(StatusCode::NO_CONTENT)
}
