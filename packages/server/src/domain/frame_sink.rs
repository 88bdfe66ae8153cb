//! Outbound side of a live connection.
//!
//! ## 責務
//!
//! - 接続（WebSocket など）へのフレーム送信を抽象化する
//! - Infrastructure 層の `Connection` はこの trait にだけ依存する
//!
//! 具体的な実装は UI 層の WebSocket ハンドラが提供します。

use async_trait::async_trait;
use thiserror::Error;

/// Errors raised while pushing a frame to a connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PushError {
    #[error("Failed to send frame: {0}")]
    SendFailed(String),

    #[error("Timed out while sending frame")]
    Timeout,
}

/// Write half of a bidirectional connection.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FrameSink: Send {
    /// Send a pre-serialized text payload.
    async fn send_text(&mut self, payload: &str) -> Result<(), PushError>;

    /// Send a transport-level ping.
    async fn send_ping(&mut self) -> Result<(), PushError>;

    /// Send a close frame carrying `reason` and shut the write half down.
    async fn close(&mut self, reason: &str) -> Result<(), PushError>;
}
