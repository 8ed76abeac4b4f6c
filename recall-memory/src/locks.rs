//! Per-session critical sections.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use recall_primitives::SessionKey;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Hands out one async mutex per session so read-modify-write sequences on
/// the same session serialise while different sessions proceed in parallel.
#[derive(Debug)]
pub(crate) struct KeyLocks {
    table: Mutex<LockTable>,
    min_prune_at: usize,
}

#[derive(Debug)]
struct LockTable {
    locks: HashMap<SessionKey, Arc<AsyncMutex<()>>>,
    prune_at: usize,
}

impl KeyLocks {
    pub(crate) fn new(prune_at: usize) -> Self {
        let min_prune_at = prune_at.max(64);
        Self {
            table: Mutex::new(LockTable {
                locks: HashMap::new(),
                prune_at: min_prune_at,
            }),
            min_prune_at,
        }
    }

    /// Waits for exclusive access to `session`.
    pub(crate) async fn acquire(&self, session: &SessionKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
            if table.locks.len() >= table.prune_at {
                // Entries only referenced by the table have no holder or waiter.
                table.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
                // Survivors are live; wait for the table to double before scanning again.
                table.prune_at = (table.locks.len() * 2).max(self.min_prune_at);
            }
            Arc::clone(table.locks.entry(session.clone()).or_default())
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn table(&self) -> std::sync::MutexGuard<'_, LockTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    pub(crate) fn tracked(&self) -> usize {
        self.table().locks.len()
    }
}
