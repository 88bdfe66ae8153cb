//! Bounded, thread-safe ring of recent items.

use std::collections::VecDeque;

use tokio::sync::{RwLock, RwLockWriteGuard};

/// Fixed-capacity sequence with FIFO eviction, oldest item first.
///
/// Reads run in parallel; `insert` and `delete_last` are exclusive.
#[derive(Debug)]
pub struct RingBuffer<T> {
    items: RwLock<VecDeque<T>>,
    max_len: usize,
}

/// Exclusive access to a [`RingBuffer`], for callers that must keep other
/// state consistent with the ring while they hold it.
pub struct RingWriteGuard<'a, T> {
    items: RwLockWriteGuard<'a, VecDeque<T>>,
    max_len: usize,
}

impl<T: Clone> RingBuffer<T> {
    pub fn new(max_len: usize) -> Self {
        Self::with_items(max_len, Vec::new())
    }

    /// Pre-seed the ring. Only the newest `max_len` of `items` are kept.
    pub fn with_items(max_len: usize, items: Vec<T>) -> Self {
        let skip = items.len().saturating_sub(max_len);
        Self {
            items: RwLock::new(items.into_iter().skip(skip).collect()),
            max_len,
        }
    }

    pub async fn insert(&self, item: T) {
        self.write().await.insert(item);
    }

    /// Remove the most recently inserted item. No-op when empty.
    pub async fn delete_last(&self) -> Option<T> {
        self.write().await.delete_last()
    }

    /// Copy of the contents in chronological order.
    pub async fn items(&self) -> Vec<T> {
        self.items.read().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }

    pub async fn write(&self) -> RingWriteGuard<'_, T> {
        RingWriteGuard {
            items: self.items.write().await,
            max_len: self.max_len,
        }
    }
}

impl<T> RingWriteGuard<'_, T> {
    pub fn insert(&mut self, item: T) {
        if self.max_len == 0 {
            return;
        }
        while self.items.len() >= self.max_len {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    pub fn delete_last(&mut self) -> Option<T> {
        self.items.pop_back()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn test_insert_beyond_capacity_keeps_newest() {
        // テスト項目: 容量を超えると古いものから捨てられる
        // given (前提条件):
        let ring = RingBuffer::new(3);

        // when (操作):
        for i in 0..10 {
            ring.insert(i).await;
        }

        // then (期待する結果):
        assert_eq!(ring.items().await, vec![7, 8, 9]);
    }

    #[tokio::test]
    async fn test_insert_below_capacity_keeps_all_in_order() {
        // テスト項目: 容量未満なら挿入順に全て残る
        // given (前提条件):
        let ring = RingBuffer::new(10);

        // when (操作):
        ring.insert("a").await;
        ring.insert("b").await;

        // then (期待する結果):
        assert_eq!(ring.items().await, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_delete_last_removes_newest() {
        // テスト項目: delete_last は最新の要素を削除する
        // given (前提条件):
        let ring = RingBuffer::new(5);
        ring.insert(1).await;
        ring.insert(2).await;

        // when (操作):
        let removed = ring.delete_last().await;

        // then (期待する結果):
        assert_eq!(removed, Some(2));
        assert_eq!(ring.items().await, vec![1]);
    }

    #[tokio::test]
    async fn test_delete_last_on_empty_is_noop() {
        // テスト項目: 空のリングでの delete_last は何もしない
        // given (前提条件):
        let ring: RingBuffer<u32> = RingBuffer::new(5);

        // when (操作):
        let removed = ring.delete_last().await;

        // then (期待する結果):
        assert_eq!(removed, None);
        assert!(ring.is_empty().await);
    }

    #[tokio::test]
    async fn test_items_returns_a_copy() {
        // テスト項目: items はコピーを返し、以降の変更の影響を受けない
        // given (前提条件):
        let ring = RingBuffer::new(5);
        ring.insert(1).await;
        let snapshot = ring.items().await;

        // when (操作):
        ring.insert(2).await;

        // then (期待する結果):
        assert_eq!(snapshot, vec![1]);
        assert_eq!(ring.len().await, 2);
    }

    #[tokio::test]
    async fn test_with_items_truncates_to_capacity() {
        // テスト項目: 事前投入は最新の max_len 件だけを保持する
        // given (前提条件):
        let seed = vec![1, 2, 3, 4, 5];

        // when (操作):
        let ring = RingBuffer::with_items(2, seed);

        // then (期待する結果):
        assert_eq!(ring.items().await, vec![4, 5]);
    }

    #[tokio::test]
    async fn test_concurrent_inserts_respect_capacity() {
        // テスト項目: 並行挿入でも容量を超えない
        // given (前提条件):
        let ring = Arc::new(RingBuffer::new(16));

        // when (操作):
        let handles: Vec<_> = (0..64)
            .map(|i| {
                let ring = ring.clone();
                tokio::spawn(async move { ring.insert(i).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        // then (期待する結果):
        assert_eq!(ring.len().await, 16);
    }
}
