//! UseCase: 最新メッセージの削除

use std::sync::Arc;

use crate::{
    domain::{Perm, User},
    infrastructure::store::MessageStore,
};

use super::error::UseCaseError;

/// 最新メッセージ削除のユースケース
pub struct DeleteMessageUseCase {
    store: Arc<MessageStore>,
}

impl DeleteMessageUseCase {
    pub fn new(store: Arc<MessageStore>) -> Self {
        Self { store }
    }

    /// 履歴の最後の一件をメモリとディスクの両方から削除する
    pub async fn execute(&self, user: &User) -> Result<(), UseCaseError> {
        if !user.has_perm(Perm::Delete) {
            return Err(UseCaseError::MissingPerm(Perm::Delete));
        }

        self.store.delete_last().await?;
        tracing::info!(by = %user.name, "Deleted last message");
        Ok(())
    }
}
