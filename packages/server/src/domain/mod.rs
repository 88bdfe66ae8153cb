//! Domain layer.
//!
//! ドメイン層: メッセージ、ユーザー権限、接続への送信口（`FrameSink`）を定義します。
//! Infrastructure 層はこの層の型と trait に依存し、この層は他の層に依存しません。

pub mod frame_sink;
pub mod message;
pub mod user;

pub use frame_sink::{FrameSink, PushError};
pub use message::{Message, PUBLIC_RECIPIENT, ValidationError};
pub use user::{Perm, Perms, User};
