//! Per-key async locks that clean up after themselves.
//!
//! Each key maps to a slot holding an async mutex and the number of
//! [`KeyLockHandle`]s referring to it. The slot is removed when the last
//! handle drops, including a handle owned by a future that was cancelled
//! while waiting for the mutex.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use lyprox_core::{LyproxError, LyproxResult, StorageError};
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};

#[derive(Debug, Default)]
struct Slot {
    lock: Arc<AsyncMutex<()>>,
    users: usize,
}

#[derive(Debug)]
pub(crate) struct KeyLocks<K> {
    slots: Mutex<HashMap<K, Slot>>,
}

impl<K> Default for KeyLocks<K> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<K> KeyLocks<K>
where
    K: Eq + Hash + Clone,
{
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register interest in `key`. Lock it with [`KeyLockHandle::lock`].
    pub(crate) fn handle(&self, key: &K) -> LyproxResult<KeyLockHandle<'_, K>> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| LyproxError::Storage(StorageError::LockPoisoned))?;
        let slot = slots.entry(key.clone()).or_default();
        slot.users += 1;
        Ok(KeyLockHandle {
            locks: self,
            key: key.clone(),
            lock: Arc::clone(&slot.lock),
        })
    }

    /// Number of keys with a live handle.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.slots.lock().map(|slots| slots.len()).unwrap_or(0)
    }

    fn release(&self, key: &K) {
        if let Ok(mut slots) = self.slots.lock() {
            let unused = match slots.get_mut(key) {
                Some(slot) => {
                    slot.users = slot.users.saturating_sub(1);
                    slot.users == 0
                }
                None => false,
            };
            if unused {
                slots.remove(key);
            }
        }
    }
}

/// A registered interest in one key; releases its slot on drop.
pub(crate) struct KeyLockHandle<'a, K>
where
    K: Eq + Hash + Clone,
{
    locks: &'a KeyLocks<K>,
    key: K,
    lock: Arc<AsyncMutex<()>>,
}

impl<K> KeyLockHandle<'_, K>
where
    K: Eq + Hash + Clone,
{
    pub(crate) async fn lock(&self) -> AsyncMutexGuard<'_, ()> {
        self.lock.lock().await
    }
}

impl<K> Drop for KeyLockHandle<'_, K>
where
    K: Eq + Hash + Clone,
{
    fn drop(&mut self) {
        self.locks.release(&self.key);
    }
}
