// src/circulation/locks.rs
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// In-process lock per book id, so stock moves on the same book run one at a time.
#[derive(Debug, Default, Clone)]
pub struct BookLocks {
    table: Arc<Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>>,
}

/// Guards held for the duration of one stock-moving transaction.
pub struct HeldLocks {
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl BookLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, book_id: i64) -> Arc<AsyncMutex<()>> {
        let mut table = match self.table.lock() {
            Ok(table) => table,
            Err(poisoned) => poisoned.into_inner(),
        };
        table.entry(book_id).or_default().clone()
    }

    /// Locks every book in ascending id order; two callers can never wait on each other in a cycle.
    pub async fn acquire(&self, book_ids: &[i64]) -> HeldLocks {
        let ordered: BTreeSet<i64> = book_ids.iter().copied().collect();
        let mut guards = Vec::with_capacity(ordered.len());
        for book_id in ordered {
            guards.push(self.slot(book_id).lock_owned().await);
        }
        HeldLocks { _guards: guards }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[actix_rt::test]
    async fn test_overlapping_sets_serialize() {
        let locks = BookLocks::new();
        let held = locks.acquire(&[3, 1]).await;

        let contender = locks.clone();
        let waiter = tokio::spawn(async move {
            let _held = contender.acquire(&[1, 2]).await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(held);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should acquire once the first holder releases")
            .unwrap();
    }

    #[actix_rt::test]
    async fn test_disjoint_sets_do_not_block() {
        let locks = BookLocks::new();
        let _first = locks.acquire(&[1, 2]).await;
        let second = tokio::time::timeout(Duration::from_millis(100), locks.acquire(&[3])).await;
        assert!(second.is_ok());
    }
}
