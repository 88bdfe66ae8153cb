//! Shared application state.

use std::sync::Arc;

use crate::{
    infrastructure::{fanout::LivenessConfig, users::UserDirectory},
    usecase::{
        ConnectListenerUseCase, DeleteMessageUseCase, GetMessagesUseCase, PostMessageUseCase,
    },
};

/// Handler から参照される状態
pub struct AppState {
    pub users: Arc<UserDirectory>,
    /// PostMessageUseCase（メッセージ投稿）
    pub post_message_usecase: Arc<PostMessageUseCase>,
    /// GetMessagesUseCase（履歴取得）
    pub get_messages_usecase: Arc<GetMessagesUseCase>,
    /// DeleteMessageUseCase（最新メッセージの削除）
    pub delete_message_usecase: Arc<DeleteMessageUseCase>,
    /// ConnectListenerUseCase（ライブ受信の登録）
    pub connect_listener_usecase: Arc<ConnectListenerUseCase>,
    /// 新しい接続に使う生存確認のタイムアウト
    pub liveness: LivenessConfig,
}
