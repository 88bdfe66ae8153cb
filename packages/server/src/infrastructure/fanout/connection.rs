//! Connection wrapper.
//!
//! ## 責務
//!
//! - 一つの接続への書き込み・クローズを直列化する
//! - 生存確認（ping / pong）を行い、応答がなければ接続を閉じる
//!
//! 状態は `Open → Closed` の一方向のみで、二度目のクローズは何もしません。

use std::{
    sync::{
        Mutex as StdMutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tokio::sync::{Mutex, Notify};

use crate::domain::{FrameSink, PushError};

const PING_FAILED: &str = "Failed to write ping";
const NO_PONG: &str = "No pong";

/// Timeouts used when probing a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessConfig {
    /// Deadline for writing the ping frame, including the wait for the
    /// connection's write lock.
    pub ping_write_timeout: Duration,
    /// Deadline for writing a text or close frame.
    pub write_timeout: Duration,
    /// How long to wait for the pong after the ping was written.
    pub pong_timeout: Duration,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            ping_write_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(5),
            pong_timeout: Duration::from_secs(7),
        }
    }
}

/// One live connection.
pub struct Connection {
    session_id: String,
    sink: Mutex<Box<dyn FrameSink>>,
    /// Only ever flips false -> true, and only while `sink` is locked.
    closed: AtomicBool,
    close_reason: StdMutex<Option<String>>,
    pinging: AtomicBool,
    pong: Notify,
    liveness: LivenessConfig,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("session_id", &self.session_id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Connection {
    pub fn new(
        session_id: impl Into<String>,
        sink: Box<dyn FrameSink>,
        liveness: LivenessConfig,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            sink: Mutex::new(sink),
            closed: AtomicBool::new(false),
            close_reason: StdMutex::new(None),
            pinging: AtomicBool::new(false),
            pong: Notify::new(),
            liveness,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Whether the connection has been closed. No side effects; used by the
    /// room tree's prune pass.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Why the connection was closed, if it was.
    pub fn close_reason(&self) -> Option<String> {
        self.close_reason
            .lock()
            .map(|reason| reason.clone())
            .unwrap_or_default()
    }

    /// Send a pre-serialized payload. No-op once closed.
    ///
    /// Failures and write timeouts are logged only; a broken socket is caught
    /// by the next ping.
    pub async fn write(&self, payload: &str) {
        let mut sink = self.sink.lock().await;
        if self.is_closed() {
            return;
        }

        let sent = tokio::time::timeout(self.liveness.write_timeout, sink.send_text(payload))
            .await
            .unwrap_or(Err(PushError::Timeout));
        if let Err(e) = sent {
            tracing::warn!(
                session_id = %self.session_id,
                error = %e,
                "Failed to write to connection"
            );
        }
    }

    /// Close the connection with a human-readable reason. Idempotent.
    pub async fn close(&self, reason: &str) {
        let mut sink = self.sink.lock().await;
        self.close_locked(&mut **sink, reason).await;
    }

    /// Record that the peer answered a ping.
    pub fn pong_received(&self) {
        self.pong.notify_waiters();
    }

    /// Check that the peer is still alive.
    ///
    /// A second call while a ping is outstanding returns immediately. The
    /// connection is closed when the ping cannot be written or no pong arrives
    /// within the configured timeout.
    pub async fn ping(&self) {
        if self.pinging.swap(true, Ordering::AcqRel) {
            return;
        }

        self.check_liveness().await;
        self.pinging.store(false, Ordering::Release);
    }

    async fn check_liveness(&self) {
        let pong = self.pong.notified();
        tokio::pin!(pong);
        // Register before the ping goes out so an early pong is not missed.
        pong.as_mut().enable();

        // The deadline covers waiting for the write lock as well.
        let written = tokio::time::timeout(self.liveness.ping_write_timeout, async {
            let mut sink = self.sink.lock().await;
            if self.is_closed() {
                return None;
            }
            let result = sink.send_ping().await;
            Some((result, sink))
        })
        .await;

        match written {
            Ok(None) => return,
            Ok(Some((Ok(()), _sink))) => {}
            Ok(Some((Err(e), mut sink))) => {
                tracing::debug!(session_id = %self.session_id, error = %e, "Ping write failed");
                self.close_locked(&mut **sink, PING_FAILED).await;
                return;
            }
            Err(_) => {
                tracing::debug!(
                    session_id = %self.session_id,
                    error = %PushError::Timeout,
                    "Ping write failed"
                );
                self.close(PING_FAILED).await;
                return;
            }
        }

        if tokio::time::timeout(self.liveness.pong_timeout, pong)
            .await
            .is_err()
        {
            self.close(NO_PONG).await;
        }
    }

    async fn close_locked(&self, sink: &mut dyn FrameSink, reason: &str) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Ok(mut slot) = self.close_reason.lock() {
            *slot = Some(reason.to_string());
        }
        tracing::warn!(session_id = %self.session_id, "Closing WS: {}", reason);

        let closed = tokio::time::timeout(self.liveness.write_timeout, sink.close(reason))
            .await
            .unwrap_or(Err(PushError::Timeout));
        if let Err(e) = closed {
            tracing::debug!(
                session_id = %self.session_id,
                error = %e,
                "Close frame could not be delivered"
            );
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use crate::domain::{FrameSink, PushError};

    /// A frame observed by [`RecordingSink`].
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Frame {
        Text(String),
        Ping,
        Close(String),
    }

    /// Sink that records every frame it is asked to send.
    #[derive(Clone, Default)]
    pub struct RecordingSink {
        pub frames: Arc<Mutex<Vec<Frame>>>,
    }

    impl RecordingSink {
        pub fn frames(&self) -> Vec<Frame> {
            self.frames.lock().unwrap().clone()
        }

        pub fn texts(&self) -> Vec<String> {
            self.frames()
                .into_iter()
                .filter_map(|f| match f {
                    Frame::Text(t) => Some(t),
                    _ => None,
                })
                .collect()
        }
    }

    /// Sink whose text and ping writes never complete, like a peer that
    /// stopped reading with a full TCP buffer.
    pub struct StalledSink;

    #[async_trait]
    impl FrameSink for StalledSink {
        async fn send_text(&mut self, _payload: &str) -> Result<(), PushError> {
            std::future::pending().await
        }

        async fn send_ping(&mut self) -> Result<(), PushError> {
            std::future::pending().await
        }

        async fn close(&mut self, _reason: &str) -> Result<(), PushError> {
            Ok(())
        }
    }

    #[async_trait]
    impl FrameSink for RecordingSink {
        async fn send_text(&mut self, payload: &str) -> Result<(), PushError> {
            self.frames.lock().unwrap().push(Frame::Text(payload.to_string()));
            Ok(())
        }

        async fn send_ping(&mut self) -> Result<(), PushError> {
            self.frames.lock().unwrap().push(Frame::Ping);
            Ok(())
        }

        async fn close(&mut self, reason: &str) -> Result<(), PushError> {
            self.frames.lock().unwrap().push(Frame::Close(reason.to_string()));
            Ok(())
        }
    }
}
