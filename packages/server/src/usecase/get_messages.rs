//! UseCase: 履歴取得

use std::sync::Arc;

use crate::{
    domain::{Message, Perm, User},
    infrastructure::store::{MessageStore, filter_for_user},
};

use super::error::UseCaseError;

/// 履歴取得のユースケース
pub struct GetMessagesUseCase {
    store: Arc<MessageStore>,
}

impl GetMessagesUseCase {
    pub fn new(store: Arc<MessageStore>) -> Self {
        Self { store }
    }

    /// `reader` が読めるメッセージだけを古い順に返す
    pub async fn execute(&self, reader: &User) -> Result<Vec<Message>, UseCaseError> {
        if !reader.has_perm(Perm::Read) {
            return Err(UseCaseError::MissingPerm(Perm::Read));
        }

        Ok(filter_for_user(self.store.get_messages().await, reader))
    }
}
