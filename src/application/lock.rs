use crate::domain::interaction::{ActionKind, UserId};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;

const SOURCE: &str = "application::lock";

/// Identifies one user's in-flight action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockKey {
    pub user: UserId,
    pub action: ActionKind,
}

impl LockKey {
    pub fn new(user: UserId, action: ActionKind) -> Self {
        Self { user, action }
    }
}

/// Non-blocking per-(user, action) mutual exclusion.
///
/// A second acquisition of a held key fails immediately instead of waiting.
/// Keys are released when the returned [`ResponseLockGuard`] drops, so every
/// exit path of the holder (including cancellation and panics) frees the key.
#[derive(Debug, Default, Clone)]
pub struct ResponseLock {
    held: Arc<Mutex<HashSet<LockKey>>>,
}

impl ResponseLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self, key: LockKey) -> Option<ResponseLockGuard> {
        let inserted = mutex_lock(&self.held, "try_acquire").insert(key);
        inserted.then(|| ResponseLockGuard {
            held: Arc::clone(&self.held),
            key,
        })
    }

    pub fn is_held(&self, key: LockKey) -> bool {
        mutex_lock(&self.held, "is_held").contains(&key)
    }

    pub fn held_count(&self) -> usize {
        mutex_lock(&self.held, "held_count").len()
    }

    /// Drops every held key. Used on teardown only.
    pub fn clear(&self) {
        mutex_lock(&self.held, "clear").clear();
    }
}

#[derive(Debug)]
pub struct ResponseLockGuard {
    held: Arc<Mutex<HashSet<LockKey>>>,
    key: LockKey,
}

impl ResponseLockGuard {
    pub fn key(&self) -> LockKey {
        self.key
    }
}

impl Drop for ResponseLockGuard {
    fn drop(&mut self) {
        mutex_lock(&self.held, "release").remove(&self.key);
    }
}

fn mutex_lock<'a, T>(lock: &'a Mutex<T>, op: &'static str) -> MutexGuard<'a, T> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!(
                op,
                target_module = SOURCE,
                lock_kind = "mutex.lock",
                result = "poisoned_recovered",
                "Recovered from poisoned response lock"
            );
            poisoned.into_inner()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(user: u64, action: ActionKind) -> LockKey {
        LockKey::new(UserId(user), action)
    }

    #[test]
    fn test_second_acquire_fails_while_held() {
        let lock = ResponseLock::new();
        let guard = lock.try_acquire(key(1, ActionKind::Balance));
        assert!(guard.is_some());
        assert!(lock.try_acquire(key(1, ActionKind::Balance)).is_none());
    }

    #[test]
    fn test_release_on_drop() {
        let lock = ResponseLock::new();
        {
            let _guard = lock.try_acquire(key(1, ActionKind::Buy)).unwrap();
            assert!(lock.is_held(key(1, ActionKind::Buy)));
        }
        assert!(!lock.is_held(key(1, ActionKind::Buy)));
        assert!(lock.try_acquire(key(1, ActionKind::Buy)).is_some());
    }

    #[test]
    fn test_keys_are_independent() {
        let lock = ResponseLock::new();
        let _a = lock.try_acquire(key(1, ActionKind::Buy)).unwrap();
        let _b = lock.try_acquire(key(1, ActionKind::History)).unwrap();
        let _c = lock.try_acquire(key(2, ActionKind::Buy)).unwrap();
        assert_eq!(lock.held_count(), 3);
    }

    #[test]
    fn test_release_after_panic() {
        let lock = ResponseLock::new();
        let cloned = lock.clone();
        let result = std::panic::catch_unwind(move || {
            let _guard = cloned.try_acquire(key(3, ActionKind::Register)).unwrap();
            panic!("handler blew up");
        });
        assert!(result.is_err());
        assert!(!lock.is_held(key(3, ActionKind::Register)));
    }
}
