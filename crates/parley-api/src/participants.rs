use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::error;
use uuid::Uuid;

use parley_types::api::{AddParticipantRequest, Claims};

use crate::auth::AppState;
use crate::error::into_status;

pub async fn add_participant(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AddParticipantRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let chat = state.chat.clone();
    let participant = tokio::task::spawn_blocking(move || {
        chat.add_participant(claims.sub, conversation_id, req.user_id, req.role)
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .map_err(into_status)?;

    Ok((StatusCode::CREATED, Json(participant)))
}

pub async fn list_participants(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let chat = state.chat.clone();
    let participants =
        tokio::task::spawn_blocking(move || chat.list_participants(claims.sub, conversation_id))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            })?
            .map_err(into_status)?;

    Ok(Json(participants))
}

pub async fn remove_participant(
    State(state): State<AppState>,
    Path((conversation_id, user_id)): Path<(Uuid, i64)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let chat = state.chat.clone();
    tokio::task::spawn_blocking(move || {
        chat.remove_participant(claims.sub, conversation_id, user_id)
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .map_err(into_status)?;

    Ok(StatusCode::NO_CONTENT)
}
