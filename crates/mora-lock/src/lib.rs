//! Distributed Lock
//!
//! This crate provides:
//! - Lease-based mutual exclusion keyed by resource name
//! - Ownership proof through an unguessable owner token
//! - Bounded retry acquisition, compare-and-delete release and TTL extension
//! - A `LockStore` seam with in-memory and Redis backends

pub mod error;
pub mod model;
pub mod service;
pub mod store;

pub use error::{LockError, LockResult};
pub use model::*;
pub use service::LockManager;
#[cfg(feature = "redis-store")]
pub use store::redis::{RedisConfig, RedisLockStore};
pub use store::{LockStore, StoreError, StoreResult, memory::MemoryLockStore};
