//! Hierarchical rooms of live connections.
//!
//! ## 構造
//!
//! ノードは `Leaf`（一つの接続）か `Room`（パスセグメント → 子ノードのマップ）です。
//! `$` で始まるセグメントは内部で管理するルームを表します。
//!
//! - `$*`: 公開メッセージを受け取る全員のルーム
//! - `$<name>`: `<name>` 宛の whisper を読める接続のルーム
//!
//! それ以外のセグメントは接続のセッション ID です。各接続は
//! `[$*, session]` や `[$bob, session]` のように複数のルームに登録されます。
//!
//! ## ロック
//!
//! 各 `Room` は自分の子マップだけをロックします。ロックは常に親から子の順に取得し、
//! `broadcast` / `ping` / `close` は子のスナップショットを取ってからロックを解放して
//! 並行に処理します。

use std::{collections::HashMap, sync::Arc};

use futures_util::future::{BoxFuture, join_all};
use tokio::sync::Mutex;

use super::connection::Connection;

/// Prefix of internally managed room keys.
pub const INTERNAL_PREFIX: &str = "$";
/// Room of everyone allowed to read public messages.
pub const ALL_ROOM: &str = "$*";

/// Room holding readers of whispers addressed to `target`.
///
/// `whisper_room("*")` is [`ALL_ROOM`], so a message's recipient maps directly
/// onto the room it is delivered to.
pub fn whisper_room(target: &str) -> String {
    format!("{}{}", INTERNAL_PREFIX, target)
}

/// A node of the room tree.
#[derive(Debug, Clone)]
pub enum Node {
    Leaf(Arc<Connection>),
    Room(Arc<Room>),
}

/// Interior node: path segment -> child.
#[derive(Debug, Default)]
pub struct Room {
    children: Mutex<HashMap<String, Node>>,
}

/// Root of the room tree.
#[derive(Debug, Default)]
pub struct RoomTree {
    root: Arc<Room>,
}

impl RoomTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `leaf` at `path`, creating missing rooms on the way.
    ///
    /// The last segment is the leaf's key in its parent room; an existing
    /// binding under that key is replaced.
    pub async fn register(&self, leaf: Arc<Connection>, path: &[&str]) {
        self.root.register(leaf, path).await;
    }

    /// Push `payload` to every leaf under `path`, skipping leaves bound under
    /// `exclude`. Unknown paths are a no-op.
    ///
    /// Keys starting with [`INTERNAL_PREFIX`] are never excluded.
    pub async fn broadcast(&self, path: &[&str], payload: &str, exclude: Option<&str>) {
        let exclude = exclude.filter(|id| !id.starts_with(INTERNAL_PREFIX));

        match self.resolve(path).await {
            Some(node) => node.deliver(payload, exclude).await,
            None => tracing::debug!(path = ?path, "No listeners for room"),
        }
    }

    /// Ping every connection in the tree.
    pub async fn ping(&self) {
        self.root.ping().await;
    }

    /// Drop closed connections and rooms left empty. Returns whether the whole
    /// tree is empty afterwards.
    pub async fn prune(&self) -> bool {
        self.root.prune().await
    }

    /// Close every connection in the tree.
    pub async fn close(&self, reason: &str) {
        self.root.close(reason).await;
    }

    /// Number of leaf bindings. A connection registered in several rooms is
    /// counted once per room.
    pub async fn leaf_count(&self) -> usize {
        self.root.leaf_count().await
    }

    async fn resolve(&self, path: &[&str]) -> Option<Node> {
        let mut node = Node::Room(self.root.clone());
        for segment in path {
            let Node::Room(room) = &node else {
                return None;
            };
            let next = room.children.lock().await.get(*segment).cloned()?;
            node = next;
        }
        Some(node)
    }
}

impl Node {
    fn deliver<'a>(&'a self, payload: &'a str, exclude: Option<&'a str>) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            match self {
                Node::Leaf(conn) => conn.write(payload).await,
                Node::Room(room) => {
                    let children = room.snapshot().await;
                    join_all(
                        children
                            .iter()
                            .filter(|(key, _)| Some(key.as_str()) != exclude)
                            .map(|(_, child)| child.deliver(payload, exclude)),
                    )
                    .await;
                }
            }
        })
    }

    fn ping(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            match self {
                Node::Leaf(conn) => conn.ping().await,
                Node::Room(room) => room.ping().await,
            }
        })
    }

    /// Whether this node can be dropped from its parent.
    fn prune(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            match self {
                Node::Leaf(conn) => conn.is_closed(),
                Node::Room(room) => room.prune().await,
            }
        })
    }

    fn close<'a>(&'a self, reason: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            match self {
                Node::Leaf(conn) => conn.close(reason).await,
                Node::Room(room) => room.close(reason).await,
            }
        })
    }

    fn leaf_count(&self) -> BoxFuture<'_, usize> {
        Box::pin(async move {
            match self {
                Node::Leaf(_) => 1,
                Node::Room(room) => room.leaf_count().await,
            }
        })
    }
}

impl Room {
    async fn snapshot(&self) -> Vec<(String, Node)> {
        self.children
            .lock()
            .await
            .iter()
            .map(|(key, node)| (key.clone(), node.clone()))
            .collect()
    }

    fn register<'a>(&'a self, leaf: Arc<Connection>, path: &'a [&'a str]) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let Some((first, rest)) = path.split_first() else {
                return;
            };

            // Held while descending so a concurrent prune cannot drop a room
            // that is about to receive a leaf.
            let mut children = self.children.lock().await;

            if rest.is_empty() {
                children.insert(first.to_string(), Node::Leaf(leaf));
                return;
            }

            let child = children
                .entry(first.to_string())
                .or_insert_with(|| Node::Room(Arc::new(Room::default())))
                .clone();

            match child {
                Node::Room(room) => room.register(leaf, rest).await,
                Node::Leaf(existing) => tracing::warn!(
                    key = %first,
                    session_id = %existing.session_id(),
                    "Cannot nest a room under a connection, registration skipped"
                ),
            }
        })
    }

    async fn ping(&self) {
        let children = self.snapshot().await;
        join_all(children.iter().map(|(_, child)| child.ping())).await;
    }

    async fn prune(&self) -> bool {
        let mut children = self.children.lock().await;

        let verdicts = join_all(
            children
                .iter()
                .map(|(key, child)| async move { (key.clone(), child.prune().await) }),
        )
        .await;

        for (key, dead) in verdicts {
            if dead {
                children.remove(&key);
            }
        }

        children.is_empty()
    }

    async fn close(&self, reason: &str) {
        let children = self.snapshot().await;
        join_all(children.iter().map(|(_, child)| child.close(reason))).await;
    }

    async fn leaf_count(&self) -> usize {
        let children = self.snapshot().await;
        join_all(children.iter().map(|(_, child)| child.leaf_count()))
            .await
            .into_iter()
            .sum()
    }
}
