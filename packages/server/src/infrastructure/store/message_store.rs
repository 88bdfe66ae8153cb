//! Message store: ring buffer + durable log behind one API.
//!
//! ## ロックの順序
//!
//! リングバッファ → ログファイル → フラッシュバッファ の順でのみ取得します。
//!
//! - `add_msg` はリングとフラッシュバッファだけを使い、ログ書き込みを待たない
//! - `flush_now` はログ → フラッシュバッファ（取り出しの間だけ）
//! - `delete_last` はリング → （フラッシュバッファの確認）→ ログ → フラッシュバッファ

use std::{path::Path, sync::Arc, time::Duration};

use sasayaki_shared::shutdown::ShutdownSignal;
use thiserror::Error;
use tokio::{sync::Mutex, task::JoinHandle, time::MissedTickBehavior};

use crate::domain::{Message, User, ValidationError};

use super::{
    log::{DurableLog, LogError},
    ring::RingBuffer,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Log(#[from] LogError),

    #[error("Message store is closed")]
    Closed,
}

/// Recent message history with eventual durability.
#[derive(Debug)]
pub struct MessageStore {
    ring: RingBuffer<Message>,
    /// `None` once the store has been stopped.
    log: Mutex<Option<DurableLog>>,
    /// Messages accepted since the last successful flush, oldest first.
    staged: Mutex<Vec<Message>>,
}

impl MessageStore {
    /// Open the log at `path` and pre-seed the ring with its newest
    /// `max_messages` records.
    pub async fn open(path: impl AsRef<Path>, max_messages: usize) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let log = DurableLog::open(path).await?;
        let recent = DurableLog::load_recent(path, Some(max_messages)).await?;

        if !recent.is_empty() {
            tracing::info!(count = recent.len(), "Loaded messages from log");
        }

        Ok(Self {
            ring: RingBuffer::with_items(max_messages, recent),
            log: Mutex::new(Some(log)),
            staged: Mutex::new(Vec::new()),
        })
    }

    /// Validate and accept a message.
    ///
    /// The message is visible through [`get_messages`](Self::get_messages)
    /// immediately and reaches the disk on the next flush.
    pub async fn add_msg(&self, msg: Message) -> Result<Message, StoreError> {
        let msg = msg.validated()?;

        let mut ring = self.ring.write().await;
        ring.insert(msg.clone());
        self.staged.lock().await.push(msg.clone());
        drop(ring);

        tracing::info!(
            from = %msg.author,
            to = %msg.to,
            content = %msg.content,
            "New message"
        );
        Ok(msg)
    }

    /// Chronological snapshot of the recent history.
    pub async fn get_messages(&self) -> Vec<Message> {
        self.ring.items().await
    }

    /// Number of messages waiting for the next flush.
    pub async fn staged_len(&self) -> usize {
        self.staged.lock().await.len()
    }

    /// Write every staged message to the log in one append.
    ///
    /// Returns the number of messages written. On failure the batch is staged
    /// again, ahead of anything accepted in the meantime.
    pub async fn flush_now(&self) -> Result<usize, StoreError> {
        let mut log = self.log.lock().await;

        let batch = std::mem::take(&mut *self.staged.lock().await);
        if batch.is_empty() {
            tracing::debug!("Nothing to flush");
            return Ok(0);
        }

        let result = match log.as_mut() {
            Some(log) => log.append(&batch).await.map_err(StoreError::from),
            None => Err(StoreError::Closed),
        };

        match result {
            Ok(()) => {
                tracing::debug!(count = batch.len(), "Flush complete");
                Ok(batch.len())
            }
            Err(e) => {
                let mut staged = self.staged.lock().await;
                let newer = std::mem::replace(&mut *staged, batch);
                staged.extend(newer);
                Err(e)
            }
        }
    }

    /// Delete the most recent message from memory and disk. No-op when empty.
    pub async fn delete_last(&self) -> Result<(), StoreError> {
        let mut ring = self.ring.write().await;
        if ring.is_empty() {
            return Ok(());
        }

        // Still unflushed: never reached the disk.
        if self.staged.lock().await.pop().is_some() {
            ring.delete_last();
            return Ok(());
        }

        let mut log = self.log.lock().await;
        // A flush that was in flight may have failed and staged its batch again.
        if self.staged.lock().await.pop().is_none() {
            log.as_mut()
                .ok_or(StoreError::Closed)?
                .truncate_last()
                .await?;
        }

        ring.delete_last();
        tracing::info!("Deleted last message");
        Ok(())
    }

    /// Flush one last time and release the log file.
    pub async fn stop(&self) -> Result<(), StoreError> {
        let result = self.flush_now().await;
        if let Some(log) = self.log.lock().await.take() {
            tracing::info!(path = %log.path().display(), "Message log closed");
        }
        result.map(|_| ())
    }
}

/// Messages visible to `user`, in the same order.
pub fn filter_for_user(msgs: Vec<Message>, user: &User) -> Vec<Message> {
    if user.read_all_whispers {
        return msgs;
    }
    msgs.into_iter().filter(|m| user.can_read(m)).collect()
}

/// Flush `store` every `interval` and once more when `shutdown` fires.
///
/// Failed flushes are logged; their messages stay staged for the next cycle.
pub fn spawn_flusher(
    store: Arc<MessageStore>,
    interval: Duration,
    mut shutdown: ShutdownSignal,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = store.flush_now().await {
                        tracing::error!("Periodic flush failed: {}", e);
                    }
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Flusher stopping");
                    if let Err(e) = store.flush_now().await {
                        tracing::error!("Final flush failed: {}", e);
                    }
                    break;
                }
            }
        }
    })
}
