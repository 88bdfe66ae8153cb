//! `Authorization: <name> <token>` authentication.

use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{
        HeaderMap, HeaderName,
        header::AUTHORIZATION,
        request::Parts,
    },
};

use crate::domain::User;

use super::{error::ApiError, state::AppState};

/// Carries a websocket session id: set on the upgrade response, echoed back by
/// clients on `POST /messages` so their own socket is skipped.
pub const SESSION_HEADER: HeaderName = HeaderName::from_static("session-id");

/// The authenticated caller.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Arc<User>);

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;

        let (name, token) = split_credentials(header).ok_or(ApiError::Unauthorized)?;

        match state.users.authenticate(name, token) {
            Some(user) => Ok(AuthUser(user)),
            None => {
                tracing::debug!(user = %name, "Rejected credentials");
                Err(ApiError::Unauthorized)
            }
        }
    }
}

/// Split `<name> <token>` on the last space. Names may contain spaces, tokens may not.
pub fn split_credentials(header: &str) -> Option<(&str, &str)> {
    header.rsplit_once(' ')
}

/// The caller's own session id, if the request carries one.
pub fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_on_last_space() {
        // テスト項目: 名前とトークンは最後の空白で分割される
        // given (前提条件) / when (操作) / then (期待する結果):
        assert_eq!(split_credentials("alice tok"), Some(("alice", "tok")));
        assert_eq!(
            split_credentials("Mary Ann tok"),
            Some(("Mary Ann", "tok"))
        );
        assert_eq!(split_credentials("alice"), None);
    }
}
