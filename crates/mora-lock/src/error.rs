//! Error types for lock operations.

use std::time::Duration;

use thiserror::Error;

use crate::store::StoreError;

/// Result type for lock operations.
pub type LockResult<T> = Result<T, LockError>;

/// Errors that can occur during lock operations.
#[derive(Error, Debug)]
pub enum LockError {
    /// Key already held at the time of a single attempt
    #[error("lock '{0}' not acquired")]
    NotAcquired(String),

    /// Every allowed attempt found the key held
    #[error("lock '{key}' not acquired: max retries exceeded after {attempts} attempts")]
    RetriesExhausted { key: String, attempts: u32 },

    /// Overall acquisition deadline elapsed
    #[error("lock '{key}' acquisition timeout after {elapsed:?} ({attempts} attempts)")]
    AcquisitionTimeout {
        key: String,
        attempts: u32,
        elapsed: Duration,
    },

    /// Release or extend by a token that no longer owns the key
    #[error("lock '{0}' not owned by this handle")]
    NotOwned(String),

    /// Store failure, never treated as contention
    #[error("failed to {op} lock '{key}': {source}")]
    Store {
        op: &'static str,
        key: String,
        #[source]
        source: StoreError,
    },
}

impl LockError {
    pub(crate) fn store(op: &'static str, key: &str, source: StoreError) -> Self {
        LockError::Store {
            op,
            key: key.to_string(),
            source,
        }
    }

    /// Whether this failure came from another owner holding the key
    pub fn is_contention(&self) -> bool {
        matches!(
            self,
            LockError::NotAcquired(_)
                | LockError::RetriesExhausted { .. }
                | LockError::AcquisitionTimeout { .. }
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, LockError::AcquisitionTimeout { .. })
    }
}
