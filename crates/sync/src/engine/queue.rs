//! Per-product mutation serialization.
//!
//! Each product ID maps to an async mutex held from the remote call through
//! local reconciliation, so effects on one product apply in the order the
//! calls were issued. Different products never wait on each other. Entries
//! are dropped from the map once nobody holds or waits on them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use basket_core::ProductId;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockMap = HashMap<ProductId, Arc<AsyncMutex<()>>>;

/// Keyed async locks, or a no-op when serialization is disabled.
pub(crate) struct MutationLocks {
    enabled: bool,
    locks: Arc<Mutex<LockMap>>,
}

impl MutationLocks {
    pub(crate) fn new(enabled: bool) -> Self {
        Self {
            enabled,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Wait for exclusive access to `id`. Returns `None` when disabled.
    pub(crate) async fn acquire(&self, id: &ProductId) -> Option<MutationGuard> {
        if !self.enabled {
            return None;
        }

        let lock = {
            let mut map = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(map.entry(id.clone()).or_default())
        };
        let guard = lock.lock_owned().await;

        Some(MutationGuard {
            id: id.clone(),
            locks: Arc::clone(&self.locks),
            guard: Some(guard),
        })
    }

    #[cfg(test)]
    pub(crate) fn tracked(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Exclusive access to one product until dropped.
pub(crate) struct MutationGuard {
    id: ProductId,
    locks: Arc<Mutex<LockMap>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for MutationGuard {
    fn drop(&mut self) {
        let mut map = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(guard) = self.guard.take() {
            // One reference in the map, one in this guard: nobody is waiting.
            if Arc::strong_count(OwnedMutexGuard::mutex(&guard)) <= 2 {
                map.remove(&self.id);
            }
            drop(guard);
        }
    }
}
