//! Message storage.
//!
//! `MessageStore` combines a bounded in-memory [`RingBuffer`] with the on-disk
//! [`DurableLog`]. Messages are accepted into memory immediately and reach the
//! disk on the next flush.

pub mod log;
pub mod message_store;
pub mod ring;

pub use log::{DurableLog, LogError};
pub use message_store::{MessageStore, StoreError, filter_for_user, spawn_flusher};
pub use ring::RingBuffer;
