//! Key/value store contract the lock manager relies on.
//!
//! Every mutation of a lock key goes through one of the three atomic
//! primitives below; implementations must never expose an unconditional write.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub mod memory;
#[cfg(feature = "redis-store")]
pub mod redis;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Infrastructure failures reported by a store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),

    #[cfg(feature = "redis-store")]
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    /// The key exists but carries no expiry, which no lock primitive produces
    #[error("key '{0}' has no expiry")]
    NoExpiry(String),
}

#[async_trait]
pub trait LockStore: Send + Sync {
    /// Write `value` with `ttl` only if `key` is absent. Returns whether it was written.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool>;

    /// Delete `key` only if it currently holds `expected`.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> StoreResult<bool>;

    /// Reset the expiry of `key` to `ttl` only if it currently holds `expected`.
    async fn compare_and_expire(&self, key: &str, expected: &str, ttl: Duration) -> StoreResult<bool>;

    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Remaining time to live, `None` when the key is absent.
    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>>;

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
