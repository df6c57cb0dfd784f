//! Client-side submission guard — an advisory, device-local lock with expiry
//! that short-circuits accidental duplicate gift submissions (two tabs, a
//! double-tap) before they reach the network. Not a correctness mechanism:
//! any store failure fails OPEN and the transactional gift path remains the
//! real safety net.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use uuid::Uuid;

/// Default lifetime of an unreleased lock.
pub const DEFAULT_SUBMIT_TTL_SECS: i64 = 10;

/// A lock entry as persisted in client-local storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredLock {
    pub token: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
#[error("lock store unavailable: {0}")]
pub struct LockStoreError(pub String);

/// Client-local persistent storage for submission locks. Small, string-keyed,
/// and allowed to be unavailable — the guard degrades to a no-op then.
pub trait LockStore {
    fn load(&self, key: &str) -> Result<Option<StoredLock>, LockStoreError>;
    fn save(&self, key: &str, lock: &StoredLock) -> Result<(), LockStoreError>;
    fn remove(&self, key: &str) -> Result<(), LockStoreError>;
}

/// In-memory `LockStore` backed by a mutexed map.
#[derive(Debug, Default)]
pub struct MemoryLockStore(Mutex<HashMap<String, StoredLock>>);

impl MemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LockStore for MemoryLockStore {
    fn load(&self, key: &str) -> Result<Option<StoredLock>, LockStoreError> {
        let map = self.0.lock().map_err(|e| LockStoreError(e.to_string()))?;
        Ok(map.get(key).cloned())
    }

    fn save(&self, key: &str, lock: &StoredLock) -> Result<(), LockStoreError> {
        let mut map = self.0.lock().map_err(|e| LockStoreError(e.to_string()))?;
        map.insert(key.to_string(), lock.clone());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), LockStoreError> {
        let mut map = self.0.lock().map_err(|e| LockStoreError(e.to_string()))?;
        map.remove(key);
        Ok(())
    }
}

/// Handle returned by a successful acquire. Carries the token this call
/// wrote, so release never clobbers a newer lock under the same key.
#[derive(Debug)]
pub struct SubmitLock {
    key: String,
    token: Uuid,
}

/// The guard itself: one instance per client, wrapping its local store.
pub struct SubmitGuard<S> {
    store: S,
    ttl: Duration,
}

impl<S: LockStore> SubmitGuard<S> {
    pub fn new(store: S, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn with_default_ttl(store: S) -> Self {
        Self::new(store, Duration::seconds(DEFAULT_SUBMIT_TTL_SECS))
    }

    /// Try to take the submission lock for a user. `None` means a submission
    /// is already in flight and the caller should not send another.
    pub fn try_acquire(&self, user_id: &str) -> Option<SubmitLock> {
        self.try_acquire_at(user_id, Utc::now())
    }

    fn try_acquire_at(&self, user_id: &str, now: DateTime<Utc>) -> Option<SubmitLock> {
        let key = lock_key(user_id);
        let token = Uuid::new_v4();

        match self.store.load(&key) {
            Ok(Some(existing)) if existing.expires_at > now => {
                tracing::debug!(user = user_id, "Submission already in flight, refusing");
                return None;
            }
            Ok(_) => {}
            Err(e) => {
                // Fail open: the server-side path carries correctness.
                tracing::debug!(error = %e, "Lock store unreadable, failing open");
                return Some(SubmitLock { key, token });
            }
        }

        let lock = StoredLock {
            token,
            expires_at: now + self.ttl,
        };
        if let Err(e) = self.store.save(&key, &lock) {
            tracing::debug!(error = %e, "Lock store unwritable, failing open");
        }
        Some(SubmitLock { key, token })
    }

    /// Release after the submission completes (success or failure). Only
    /// removes the entry if the stored token still matches this handle's —
    /// otherwise another call owns the key now and it is left alone.
    pub fn release(&self, lock: SubmitLock) {
        match self.store.load(&lock.key) {
            Ok(Some(stored)) if stored.token == lock.token => {
                let _ = self.store.remove(&lock.key);
            }
            _ => {}
        }
    }
}

fn lock_key(user_id: &str) -> String {
    format!("gift_submit_lock:{user_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> SubmitGuard<MemoryLockStore> {
        SubmitGuard::with_default_ttl(MemoryLockStore::new())
    }

    #[test]
    fn second_acquire_within_ttl_is_refused() {
        let guard = guard();
        let first = guard.try_acquire("u1");
        assert!(first.is_some());
        assert!(guard.try_acquire("u1").is_none());
    }

    #[test]
    fn acquire_after_expiry_is_accepted() {
        let guard = guard();
        let now = Utc::now();
        assert!(guard.try_acquire_at("u1", now).is_some());
        let past_ttl = now + Duration::seconds(DEFAULT_SUBMIT_TTL_SECS + 1);
        assert!(guard.try_acquire_at("u1", past_ttl).is_some());
    }

    #[test]
    fn release_reopens_the_slot() {
        let guard = guard();
        let lock = guard.try_acquire("u1").unwrap();
        guard.release(lock);
        assert!(guard.try_acquire("u1").is_some());
    }

    #[test]
    fn users_lock_independently() {
        let guard = guard();
        assert!(guard.try_acquire("u1").is_some());
        assert!(guard.try_acquire("u2").is_some());
    }

    #[test]
    fn stale_release_leaves_newer_lock_alone() {
        let guard = SubmitGuard::new(MemoryLockStore::new(), Duration::seconds(-1));
        // TTL already expired, so a second acquire succeeds and overwrites.
        let stale = guard.try_acquire("u1").unwrap();
        let fresh = guard.try_acquire("u1").unwrap();

        guard.release(stale);

        // The fresh lock's entry must still be present.
        let stored = guard.store.load(&lock_key("u1")).unwrap();
        assert_eq!(stored.map(|s| s.token), Some(fresh.token));
    }

    struct BrokenStore;

    impl LockStore for BrokenStore {
        fn load(&self, _key: &str) -> Result<Option<StoredLock>, LockStoreError> {
            Err(LockStoreError("storage disabled".into()))
        }
        fn save(&self, _key: &str, _lock: &StoredLock) -> Result<(), LockStoreError> {
            Err(LockStoreError("storage disabled".into()))
        }
        fn remove(&self, _key: &str) -> Result<(), LockStoreError> {
            Err(LockStoreError("storage disabled".into()))
        }
    }

    #[test]
    fn broken_store_fails_open() {
        let guard = SubmitGuard::with_default_ttl(BrokenStore);
        assert!(guard.try_acquire("u1").is_some());
        assert!(guard.try_acquire("u1").is_some());
    }
}
