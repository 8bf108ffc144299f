//! Per-identity serialization
//!
//! Two reconciliations of the same `(kind, identity)` in one process must not
//! interleave: the second blocks until the first releases its guard.

use std::collections::HashSet;
use std::sync::{Condvar, Mutex, PoisonError};

/// Set of identity keys currently being reconciled
#[derive(Debug, Default)]
pub struct IdentityLocks {
    held: Mutex<HashSet<String>>,
    released: Condvar,
}

impl IdentityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until `key` is free, then hold it until the guard drops.
    pub fn acquire(&self, key: impl Into<String>) -> IdentityGuard<'_> {
        let key = key.into();
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        while held.contains(&key) {
            held = self
                .released
                .wait(held)
                .unwrap_or_else(PoisonError::into_inner);
        }
        held.insert(key.clone());
        IdentityGuard { locks: self, key }
    }

    /// Whether `key` is held right now.
    pub fn is_held(&self, key: &str) -> bool {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }
}

/// Releases the identity on drop
#[derive(Debug)]
pub struct IdentityGuard<'a> {
    locks: &'a IdentityLocks,
    key: String,
}

impl IdentityGuard<'_> {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for IdentityGuard<'_> {
    fn drop(&mut self) {
        let mut held = self
            .locks
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        held.remove(&self.key);
        self.locks.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_guard_releases_on_drop() {
        let locks = IdentityLocks::new();
        {
            let guard = locks.acquire("site:name=Global/SJC");
            assert_eq!(guard.key(), "site:name=Global/SJC");
            assert!(locks.is_held("site:name=Global/SJC"));
        }
        assert!(!locks.is_held("site:name=Global/SJC"));
    }

    #[test]
    fn test_same_key_is_serialized() {
        let locks = Arc::new(IdentityLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                thread::spawn(move || {
                    let _guard = locks.acquire("cli_credential:description=lab");
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(5));
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_distinct_keys_do_not_block() {
        let locks = IdentityLocks::new();
        let _a = locks.acquire("a");
        let _b = locks.acquire("b");
        assert!(locks.is_held("a") && locks.is_held("b"));
    }
}
