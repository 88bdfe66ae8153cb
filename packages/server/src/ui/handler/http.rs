//! HTTP API endpoint handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::HeaderMap,
};
use serde::Serialize;

use crate::{
    domain::{Message, user::PermsView},
    ui::{
        auth::{AuthUser, session_id},
        error::ApiError,
        state::AppState,
    },
    usecase::PostRequest,
};

/// Entry of `GET /users`.
#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub name: String,
    pub color: u32,
}

/// Health check endpoint
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// History visible to the caller, oldest first.
pub async fn get_messages(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<Message>>, ApiError> {
    let msgs = state.get_messages_usecase.execute(&user).await?;
    Ok(Json(msgs))
}

/// Post a message and push it to live listeners.
pub async fn post_message(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    headers: HeaderMap,
    body: Result<Json<PostRequest>, JsonRejection>,
) -> Result<Json<Message>, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::BadRequest(format!("Bad msg data: {}", e)))?;
    let session = session_id(&headers);

    let msg = state
        .post_message_usecase
        .execute(&user, request, session.as_deref())
        .await?;
    Ok(Json(msg))
}

/// Delete the most recent message.
pub async fn delete_message(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.delete_message_usecase.execute(&user).await?;
    Ok(Json(serde_json::json!({"message": "Msg deleted"})))
}

/// Users that are not hidden, sorted by name.
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    AuthUser(_): AuthUser,
) -> Json<Vec<UserSummary>> {
    let users = state
        .users
        .all()
        .into_iter()
        .filter(|u| !u.hidden)
        .map(|u| UserSummary {
            name: u.name.clone(),
            color: u.color,
        })
        .collect();
    Json(users)
}

/// The caller's own permissions.
pub async fn get_perms(AuthUser(user): AuthUser) -> Json<PermsView> {
    Json(user.perms_view())
}
