//! UseCase: メッセージ投稿
//!
//! 投稿を検証してストアに追加し、宛先のルームを購読している接続へ配信します。
//! 公開メッセージは `$*`、whisper は `$<宛先>` に配信されます。

use std::sync::Arc;

use serde::Deserialize;

use crate::{
    domain::{Message, PUBLIC_RECIPIENT, User},
    infrastructure::{
        fanout::{RoomTree, whisper_room},
        store::MessageStore,
    },
};

use super::error::UseCaseError;

/// `POST /messages` のリクエストボディ
#[derive(Debug, Clone, Deserialize)]
pub struct PostRequest {
    pub content: String,
    #[serde(default)]
    pub to: Option<String>,
}

/// メッセージ投稿のユースケース
pub struct PostMessageUseCase {
    store: Arc<MessageStore>,
    tree: Arc<RoomTree>,
}

impl PostMessageUseCase {
    pub fn new(store: Arc<MessageStore>, tree: Arc<RoomTree>) -> Self {
        Self { store, tree }
    }

    /// 投稿を実行
    ///
    /// # Arguments
    ///
    /// * `author` - 認証済みの投稿者
    /// * `request` - 本文と宛先（省略時は公開）
    /// * `session_id` - 投稿者自身の接続。この接続には配信しない
    ///
    /// # Returns
    ///
    /// 保存されたメッセージ（本文はトリム済み）
    pub async fn execute(
        &self,
        author: &User,
        request: PostRequest,
        session_id: Option<&str>,
    ) -> Result<Message, UseCaseError> {
        let to = request
            .to
            .filter(|to| !to.is_empty())
            .unwrap_or_else(|| PUBLIC_RECIPIENT.to_string());

        if !author.can_write_to(&to) {
            return Err(if to == PUBLIC_RECIPIENT {
                UseCaseError::MissingPerm(crate::domain::Perm::Write)
            } else {
                UseCaseError::WhisperDenied(to)
            });
        }

        let msg = self
            .store
            .add_msg(Message::new(author.name.clone(), to, request.content))
            .await?;

        match serde_json::to_string(&msg) {
            Ok(payload) => {
                let room = whisper_room(&msg.to);
                self.tree.broadcast(&[room.as_str()], &payload, session_id).await;
            }
            Err(e) => tracing::error!("Failed to encode message for fanout: {}", e),
        }

        Ok(msg)
    }
}
