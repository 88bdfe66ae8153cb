//! UseCase: ライブ受信の接続登録
//!
//! 新しい接続を公開ルーム `$*` と、読むことのできる whisper 宛先ごとの
//! ルーム `$<宛先>` に登録します。

use std::sync::Arc;

use crate::{
    domain::{Perm, User},
    infrastructure::{
        fanout::{ALL_ROOM, Connection, RoomTree, whisper_room},
        users::UserDirectory,
    },
};

use super::error::UseCaseError;

/// ライブ受信接続のユースケース
pub struct ConnectListenerUseCase {
    tree: Arc<RoomTree>,
    users: Arc<UserDirectory>,
}

impl ConnectListenerUseCase {
    pub fn new(tree: Arc<RoomTree>, users: Arc<UserDirectory>) -> Self {
        Self { tree, users }
    }

    /// 接続前の権限チェック（WebSocket のアップグレード前に呼ぶ）
    pub fn authorize(&self, user: &User) -> Result<(), UseCaseError> {
        if user.has_perm(Perm::ReadLive) {
            Ok(())
        } else {
            Err(UseCaseError::MissingPerm(Perm::ReadLive))
        }
    }

    /// `conn` を `user` が受信できる全ルームに登録する
    pub async fn execute(&self, user: &User, conn: Arc<Connection>) -> Result<(), UseCaseError> {
        self.authorize(user)?;

        let session_id = conn.session_id().to_string();
        self.tree
            .register(conn.clone(), &[ALL_ROOM, session_id.as_str()])
            .await;

        let targets: Vec<String> = if user.read_all_whispers {
            self.users.all().iter().map(|u| u.name.clone()).collect()
        } else {
            user.read_whispers.iter().cloned().collect()
        };

        for target in &targets {
            let room = whisper_room(target);
            self.tree
                .register(conn.clone(), &[room.as_str(), session_id.as_str()])
                .await;
        }

        tracing::info!(
            user = %user.name,
            session = %session_id,
            whisper_rooms = targets.len(),
            "Listener connected"
        );
        Ok(())
    }
}
