use axum::{
    Extension, Json,
    extract::{Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use tracing::error;

use parley_chat::convert;
use parley_types::api::Claims;
use parley_types::models::User;

use crate::auth::AppState;

#[derive(Debug, Deserialize)]
pub struct UserSearchQuery {
    pub username: String,
}

/// Substring search over usernames and emails.
pub async fn search_users(
    State(state): State<AppState>,
    Query(query): Query<UserSearchQuery>,
    Extension(_claims): Extension<Claims>,
) -> Result<Json<Vec<User>>, StatusCode> {
    let db = state.db.clone();
    let rows = tokio::task::spawn_blocking(move || db.search_users(&query.username))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(rows.into_iter().map(convert::user_from_row).collect()))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<User>, StatusCode> {
    let db = state.db.clone();
    let row = tokio::task::spawn_blocking(move || db.get_user_by_id(claims.sub))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(convert::user_from_row(row)))
}
