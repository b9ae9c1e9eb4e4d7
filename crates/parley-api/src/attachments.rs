use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::error;

use parley_types::api::{AttachFileRequest, Claims};

use crate::auth::AppState;
use crate::error::into_status;

pub async fn upload_attachment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AttachFileRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let chat = state.chat.clone();
    let attachment = tokio::task::spawn_blocking(move || {
        chat.attach_file(claims.sub, req.message_id, req.file_url, req.file_type, req.file_size)
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .map_err(into_status)?;

    Ok((StatusCode::CREATED, Json(attachment)))
}
