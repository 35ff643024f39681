//! Session key cache.
//!
//! Unsealing an account envelope costs a full PBKDF2 derivation, so unlocked
//! [`AccountKey`]s are kept in a TTL cache keyed by owner. The cache is
//! constructed once per process and passed by reference into whatever owns
//! login handling; there is no global instance. Logout and password changes
//! must call [`SecretsCache::invalidate`].

use std::sync::Arc;
use std::time::Duration;

use crate::crypto::keys::AccountKey;

/// TTL-bounded map from owner to unlocked account key.
pub struct SecretsCache {
    inner: moka::sync::Cache<String, Arc<AccountKey>>,
}

impl SecretsCache {
    /// Cache holding at most `capacity` sessions, each expiring `ttl` after
    /// insertion regardless of use.
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        SecretsCache {
            inner: moka::sync::Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub fn get(&self, owner: &str) -> Option<Arc<AccountKey>> {
        self.inner.get(owner)
    }

    pub fn insert(&self, owner: &str, key: Arc<AccountKey>) {
        self.inner.insert(owner.to_owned(), key);
    }

    /// Drop the cached key for an owner. The key material itself is
    /// zeroized when the last `Arc` goes away.
    pub fn invalidate(&self, owner: &str) {
        self.inner.invalidate(owner);
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.run_pending_tasks();
        self.inner.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_invalidate() {
        let cache = SecretsCache::new(16, Duration::from_secs(60));
        assert!(cache.get("alice").is_none());

        cache.insert("alice", Arc::new(AccountKey::new([1; 32], [2; 32])));
        let got = cache.get("alice").unwrap();
        assert_eq!(got.with_content_key(|k| k[0]), 1);

        cache.invalidate("alice");
        assert!(cache.get("alice").is_none());
    }

    #[test]
    fn entries_expire_after_ttl() {
        let cache = SecretsCache::new(16, Duration::from_millis(20));
        cache.insert("alice", Arc::new(AccountKey::new([1; 32], [2; 32])));
        assert!(cache.get("alice").is_some());

        std::thread::sleep(Duration::from_millis(60));
        assert!(cache.get("alice").is_none());
        assert_eq!(cache.entry_count(), 0);
    }
}
