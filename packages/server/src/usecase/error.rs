//! UseCase 層のエラー定義

use thiserror::Error;

use crate::{
    domain::{Perm, ValidationError},
    infrastructure::store::StoreError,
};

#[derive(Debug, Error)]
pub enum UseCaseError {
    /// 必要な権限を持っていない
    #[error("Missing perm '{}'", .0.as_str())]
    MissingPerm(Perm),

    /// whisper の宛先に書き込めない
    #[error("Not allowed to whisper to '{0}'")]
    WhisperDenied(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Storage failure: {0}")]
    Storage(StoreError),
}

impl From<StoreError> for UseCaseError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation(e) => UseCaseError::Validation(e),
            other => UseCaseError::Storage(other),
        }
    }
}
