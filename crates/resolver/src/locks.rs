//! Per-key serialization of writes to (from, predicate) pairs

use dashmap::DashMap;
use std::sync::Arc;
use tgr_core::EdgeKey;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockTable = DashMap<EdgeKey, Arc<Mutex<()>>>;

/// Async mutex per edge key. Unrelated keys never contend.
///
/// Entries only live while a task holds or waits on the key.
#[derive(Default)]
pub struct KeyLocks {
    locks: Arc<LockTable>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`
    pub async fn lock(&self, key: &EdgeKey) -> KeyGuard {
        let mutex = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = mutex.lock_owned().await;

        KeyGuard {
            guard: Some(guard),
            key: key.clone(),
            locks: self.locks.clone(),
        }
    }

    /// Number of keys currently held or waited on
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Exclusive access to one key; the table entry is dropped with the last user
pub struct KeyGuard {
    guard: Option<OwnedMutexGuard<()>>,
    key: EdgeKey,
    locks: Arc<LockTable>,
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        // Release first so the guard's own reference is gone
        self.guard.take();
        // The table's reference is the only one left when nobody waits
        self.locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
