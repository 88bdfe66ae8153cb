//! UseCase layer.
//!
//! 各ユースケースは Infrastructure 層（`MessageStore`, `RoomTree`）を組み合わせ、
//! 権限チェックを行ったうえで処理を実行します。

pub mod connect_listener;
pub mod delete_message;
pub mod error;
pub mod get_messages;
pub mod post_message;

pub use connect_listener::ConnectListenerUseCase;
pub use delete_message::DeleteMessageUseCase;
pub use error::UseCaseError;
pub use get_messages::GetMessagesUseCase;
pub use post_message::{PostMessageUseCase, PostRequest};
