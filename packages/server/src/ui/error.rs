//! HTTP error responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::usecase::UseCaseError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<UseCaseError> for ApiError {
    fn from(err: UseCaseError) -> Self {
        match err {
            UseCaseError::MissingPerm(_) | UseCaseError::WhisperDenied(_) => {
                ApiError::Forbidden(err.to_string())
            }
            UseCaseError::Validation(e) => ApiError::BadRequest(e.to_string()),
            UseCaseError::Storage(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, self.to_string()),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::Internal(detail) => {
                tracing::error!("Request failed: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{domain::Perm, infrastructure::store::StoreError};

    #[test]
    fn test_usecase_errors_map_to_status() {
        // テスト項目: UseCase のエラーが適切なステータスコードに変換される
        // given (前提条件) / when (操作) / then (期待する結果):
        let status = |e: UseCaseError| ApiError::from(e).into_response().status();
        assert_eq!(
            status(UseCaseError::MissingPerm(Perm::Write)),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status(UseCaseError::WhisperDenied("bob".into())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status(UseCaseError::Validation(
                crate::domain::ValidationError::EmptyContent
            )),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(UseCaseError::Storage(StoreError::Closed)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::Unauthorized.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
    }
}
