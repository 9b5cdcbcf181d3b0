// ─── Cache primitives ───
// Shared by the entity managers: poison-tolerant lock access and a per-key
// async lock that collapses concurrent lookups of the same entity.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

pub(crate) fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// One async lock per key. Callers re-check the cache after acquiring the
/// lock, so only the first of several concurrent misses reaches the index.
///
/// Each entry counts the guards handed out for its key, holders and waiters
/// alike. The entry is removed when the last of them is dropped, including a
/// waiter whose `acquire` future was cancelled before it got the lock.
pub(crate) struct KeyedLocks<K> {
    locks: Arc<Mutex<HashMap<K, Slot>>>,
}

struct Slot {
    lock: Arc<AsyncMutex<()>>,
    users: usize,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub(crate) async fn acquire(&self, key: K) -> KeyGuard<K> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            let slot = locks.entry(key.clone()).or_insert_with(|| Slot {
                lock: Arc::default(),
                users: 0,
            });
            slot.users += 1;
            Arc::clone(&slot.lock)
        };

        // Registered before waiting: dropping this future releases the slot.
        let mut entry = KeyGuard {
            key,
            locks: Arc::clone(&self.locks),
            guard: None,
        };
        entry.guard = Some(lock.lock_owned().await);
        entry
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Held while a lookup for `key` is in flight.
pub(crate) struct KeyGuard<K: Eq + Hash> {
    key: K,
    locks: Arc<Mutex<HashMap<K, Slot>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K: Eq + Hash> Drop for KeyGuard<K> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        self.guard.take();

        let idle = match locks.get_mut(&self.key) {
            Some(slot) => {
                slot.users = slot.users.saturating_sub(1);
                slot.users == 0
            }
            None => false,
        };
        if idle {
            locks.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn lock_entry_is_dropped_when_idle() {
        let locks: KeyedLocks<String> = KeyedLocks::default();
        {
            let _guard = locks.acquire("geode.devtools".into()).await;
            assert_eq!(locks.len(), 1);
        }
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn cancelled_waiter_leaves_no_entry() {
        let locks: KeyedLocks<&'static str> = KeyedLocks::default();
        let holder = locks.acquire("key").await;

        let mut waiter = Box::pin(locks.acquire("key"));
        assert!(futures_util::poll!(waiter.as_mut()).is_pending());
        assert_eq!(locks.len(), 1);

        drop(holder);
        drop(waiter);
        assert_eq!(locks.len(), 0);

        let timed_out = tokio::time::timeout(Duration::from_millis(5), async {
            let _holder = locks.acquire("other").await;
            locks.acquire("other").await
        })
        .await;
        assert!(timed_out.is_err());
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn same_key_is_serialized() {
        let locks: Arc<KeyedLocks<&'static str>> = Arc::new(KeyedLocks::default());
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..4 {
            let locks = Arc::clone(&locks);
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            tasks.push(tokio::spawn(async move {
                let _guard = locks.acquire("key").await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(locks.len(), 0);
    }
}
