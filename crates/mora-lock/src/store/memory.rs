// In-process lock store
// Honours the same atomic contract as the Redis store, with lazy expiry on access

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;
use tracing::debug;

use super::{LockStore, StoreResult};

struct StoredValue {
    value: String,
    expires_at: Instant,
}

/// Stand-in expiry for a TTL that overflows the clock
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

fn expiry_after(now: Instant, ttl: Duration) -> Instant {
    now.checked_add(ttl).unwrap_or_else(|| now + FAR_FUTURE)
}

impl StoredValue {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Lock store backed by a `DashMap`.
///
/// Each primitive runs under the shard lock of its key, which gives the
/// per-key atomicity the lock manager needs. Expired records are treated as
/// absent and dropped when next touched.
#[derive(Clone, Default)]
pub struct MemoryLockStore {
    entries: Arc<DashMap<String, StoredValue>>,
}

impl MemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a background task that drops expired records every `interval`
    pub fn spawn_cleanup(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let removed = store.purge_expired();
                if removed > 0 {
                    debug!(count = removed, "Cleaned up expired lock entries");
                }
            }
        })
    }

    /// Drop every expired record and return how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Number of records held, including expired ones not yet purged
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        let now = Instant::now();
        let record = StoredValue {
            value: value.to_string(),
            expires_at: expiry_after(now, ttl),
        };

        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().is_expired(now) {
                    return Ok(false);
                }
                occupied.insert(record);
                Ok(true)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(record);
                Ok(true)
            }
        }
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> StoreResult<bool> {
        let now = Instant::now();
        let removed = self
            .entries
            .remove_if(key, |_, entry| !entry.is_expired(now) && entry.value == expected);
        Ok(removed.is_some())
    }

    async fn compare_and_expire(&self, key: &str, expected: &str, ttl: Duration) -> StoreResult<bool> {
        let now = Instant::now();
        match self.entries.get_mut(key) {
            Some(mut entry) if !entry.is_expired(now) && entry.value == expected => {
                entry.expires_at = expiry_after(now, ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone()))
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.expires_at - now))
    }
}
