//! Distributed lock data model

use std::fmt;
use std::time::Duration;

use rand::TryRngCore;
use rand::rngs::OsRng;
use tracing::warn;

// Lock configuration keys
pub const LOCK_TTL_MS_KEY: &str = "lock.ttl_ms";
pub const LOCK_RETRY_DELAY_MS_KEY: &str = "lock.retry_delay_ms";
pub const LOCK_MAX_RETRIES_KEY: &str = "lock.max_retries";
pub const LOCK_TIMEOUT_MS_KEY: &str = "lock.timeout_ms";

pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(30);
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(100);
pub const DEFAULT_MAX_RETRIES: u32 = 10;
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Acquisition settings for [`crate::LockManager::lock`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    /// Lease granted on success
    pub ttl: Duration,
    /// Wait between attempts
    pub retry_delay: Duration,
    /// Attempts allowed after the first one
    pub max_retries: u32,
    /// Wall-clock budget for the whole acquisition
    pub lock_timeout: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_LOCK_TTL,
            retry_delay: DEFAULT_RETRY_DELAY,
            max_retries: DEFAULT_MAX_RETRIES,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

impl LockOptions {
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }
}

/// Unguessable value proving ownership of one acquisition
#[derive(Clone, PartialEq, Eq)]
pub struct OwnerToken {
    value: String,
    degraded: bool,
}

impl OwnerToken {
    /// 128 random bits from the OS, hex-encoded.
    ///
    /// If the OS source fails, falls back to a timestamp-derived value that is
    /// only unique per nanosecond and flags it as degraded.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        match OsRng.try_fill_bytes(&mut bytes) {
            Ok(()) => Self {
                value: const_hex::encode(bytes),
                degraded: false,
            },
            Err(e) => {
                let token = Self::from_timestamp();
                warn!(
                    error = %e,
                    token = %token.value,
                    "Secure randomness unavailable, using timestamp-derived lock owner token"
                );
                token
            }
        }
    }

    fn from_timestamp() -> Self {
        let now = chrono::Utc::now();
        let nanos = now
            .timestamp_nanos_opt()
            .unwrap_or_else(|| now.timestamp_micros().saturating_mul(1000));
        Self {
            value: format!("lock_{}", nanos),
            degraded: true,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// Whether this token came from the timestamp fallback
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }
}

impl fmt::Debug for OwnerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnerToken")
            .field("value", &"***")
            .field("degraded", &self.degraded)
            .finish()
    }
}

/// A held lock.
///
/// Evidence of ownership only while the store still maps `key` to this
/// handle's owner token; a lease that expires in the store leaves the handle
/// stale without notice. Not `Clone`, so one acquisition has one handle.
#[derive(Debug)]
pub struct LockHandle {
    key: String,
    owner: OwnerToken,
    lease: Duration,
}

impl LockHandle {
    pub(crate) fn new(key: impl Into<String>, owner: OwnerToken, lease: Duration) -> Self {
        Self {
            key: key.into(),
            owner,
            lease,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn owner_token(&self) -> &str {
        self.owner.as_str()
    }

    pub fn is_degraded(&self) -> bool {
        self.owner.is_degraded()
    }

    /// Lease requested at acquisition, or by the last successful extend
    pub fn lease(&self) -> Duration {
        self.lease
    }

    pub(crate) fn set_lease(&mut self, lease: Duration) {
        self.lease = lease;
    }
}
