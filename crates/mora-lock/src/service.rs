//! Lock manager
//!
//! Per resource key, observed through the shared store:
//! - UNLOCKED -> LOCKED(owner) on a successful set-if-absent
//! - LOCKED(owner) -> UNLOCKED when the TTL elapses, or on compare-and-delete by owner
//! - LOCKED(owner) -> LOCKED(owner) on compare-and-expire by owner
//!
//! The manager keeps no shared mutable state of its own; correctness rests on
//! the atomicity of the store primitives.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, sleep, timeout_at};
use tracing::{debug, trace, warn};

use crate::error::{LockError, LockResult};
use crate::model::{LockHandle, LockOptions, OwnerToken};
use crate::store::LockStore;

#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn LockStore>,
    defaults: LockOptions,
}

impl LockManager {
    pub fn new(store: Arc<dyn LockStore>) -> Self {
        Self::with_defaults(store, LockOptions::default())
    }

    pub fn with_defaults(store: Arc<dyn LockStore>, defaults: LockOptions) -> Self {
        Self { store, defaults }
    }

    pub fn defaults(&self) -> &LockOptions {
        &self.defaults
    }

    pub fn store(&self) -> &Arc<dyn LockStore> {
        &self.store
    }

    /// Single acquisition attempt with a fresh owner token. Never sleeps.
    pub async fn try_lock(&self, key: &str, ttl: Duration) -> LockResult<LockHandle> {
        let owner = OwnerToken::generate();

        let written = self
            .store
            .set_if_absent(key, owner.as_str(), ttl)
            .await
            .map_err(|e| LockError::store("acquire", key, e))?;

        if !written {
            trace!(key = %key, "Lock held by another owner");
            return Err(LockError::NotAcquired(key.to_string()));
        }

        debug!(key = %key, ttl_ms = ttl.as_millis() as u64, "Lock acquired");
        Ok(LockHandle::new(key, owner, ttl))
    }

    /// Acquire with the manager's default options
    pub async fn lock_default(&self, key: &str) -> LockResult<LockHandle> {
        let options = self.defaults;
        self.lock(key, &options).await
    }

    /// Acquire `key`, retrying on contention.
    ///
    /// Makes at most `max_retries + 1` attempts spaced by `retry_delay`, all
    /// within `lock_timeout`. The deadline is checked before every attempt and
    /// bounds every wait. Store failures abort at once.
    pub async fn lock(&self, key: &str, options: &LockOptions) -> LockResult<LockHandle> {
        let started = Instant::now();
        // A timeout too large to represent means no deadline
        let deadline = started.checked_add(options.lock_timeout);
        let mut attempts: u32 = 0;

        loop {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(Self::timed_out(key, attempts, started));
            }

            attempts += 1;
            match self.try_lock(key, options.ttl).await {
                Ok(handle) => {
                    if attempts > 1 {
                        debug!(key = %key, attempts, "Lock acquired after contention");
                    }
                    return Ok(handle);
                }
                Err(LockError::NotAcquired(_)) => {}
                Err(e) => return Err(e),
            }

            if attempts > options.max_retries {
                debug!(key = %key, attempts, "Lock retries exhausted");
                return Err(LockError::RetriesExhausted {
                    key: key.to_string(),
                    attempts,
                });
            }

            match deadline {
                Some(deadline) => {
                    if timeout_at(deadline, sleep(options.retry_delay)).await.is_err() {
                        return Err(Self::timed_out(key, attempts, started));
                    }
                }
                None => sleep(options.retry_delay).await,
            }
        }
    }

    fn timed_out(key: &str, attempts: u32, started: Instant) -> LockError {
        let elapsed = started.elapsed();
        debug!(key = %key, attempts, elapsed_ms = elapsed.as_millis() as u64, "Lock acquisition timed out");
        LockError::AcquisitionTimeout {
            key: key.to_string(),
            attempts,
            elapsed,
        }
    }

    /// Release the lock if this handle still owns it.
    ///
    /// Reports `NotOwned` when the key expired or now belongs to someone else;
    /// another owner's record is never removed.
    pub async fn unlock(&self, handle: &LockHandle) -> LockResult<()> {
        let released = self
            .store
            .compare_and_delete(handle.key(), handle.owner_token())
            .await
            .map_err(|e| LockError::store("release", handle.key(), e))?;

        if !released {
            return Err(LockError::NotOwned(handle.key().to_string()));
        }

        debug!(key = %handle.key(), "Lock released");
        Ok(())
    }

    /// Refresh the lease to `ttl` if this handle still owns the key.
    pub async fn extend(&self, handle: &mut LockHandle, ttl: Duration) -> LockResult<()> {
        let extended = self
            .store
            .compare_and_expire(handle.key(), handle.owner_token(), ttl)
            .await
            .map_err(|e| LockError::store("extend", handle.key(), e))?;

        if !extended {
            return Err(LockError::NotOwned(handle.key().to_string()));
        }

        handle.set_lease(ttl);
        debug!(key = %handle.key(), ttl_ms = ttl.as_millis() as u64, "Lock extended");
        Ok(())
    }

    /// Whether the store still maps the key to this handle's owner token.
    pub async fn is_locked(&self, handle: &LockHandle) -> LockResult<bool> {
        let current = self
            .store
            .get(handle.key())
            .await
            .map_err(|e| LockError::store("inspect", handle.key(), e))?;

        Ok(current.as_deref() == Some(handle.owner_token()))
    }

    /// Remaining lease of the key in the store, `None` once it is gone
    pub async fn ttl(&self, handle: &LockHandle) -> LockResult<Option<Duration>> {
        self.store
            .ttl(handle.key())
            .await
            .map_err(|e| LockError::store("inspect", handle.key(), e))
    }

    /// Run `critical_section` while holding `key`.
    ///
    /// The lock is released however the section ends. A failed release is
    /// logged and never replaces the section's own outcome. If the section
    /// panics or this future is dropped, release happens on a spawned task.
    pub async fn with_lock<F, Fut, T, E>(
        &self,
        key: &str,
        options: &LockOptions,
        critical_section: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<LockError>,
    {
        let handle = self.lock(key, options).await?;
        let mut guard = ReleaseGuard::new(self.store.clone(), &handle);

        let outcome = critical_section().await;

        let released = self.unlock(&handle).await;
        guard.disarm();
        if let Err(e) = released {
            warn!(key = %key, error = %e, "Failed to release lock after critical section");
        }

        outcome
    }
}

/// Releases a lock from a spawned task if dropped while still armed
struct ReleaseGuard {
    store: Arc<dyn LockStore>,
    key: String,
    owner: String,
    armed: bool,
}

impl ReleaseGuard {
    fn new(store: Arc<dyn LockStore>, handle: &LockHandle) -> Self {
        Self {
            store,
            key: handle.key().to_string(),
            owner: handle.owner_token().to_string(),
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let store = self.store.clone();
        let key = std::mem::take(&mut self.key);
        let owner = std::mem::take(&mut self.owner);

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    match store.compare_and_delete(&key, &owner).await {
                        Ok(true) => debug!(key = %key, "Lock released after abnormal exit"),
                        Ok(false) => {
                            warn!(key = %key, "Lock already gone when releasing after abnormal exit")
                        }
                        Err(e) => {
                            warn!(key = %key, error = %e, "Failed to release lock after abnormal exit")
                        }
                    }
                });
            }
            Err(_) => {
                warn!(key = %key, "No runtime to release lock, leaving it to expire");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryLockStore;
    use crate::store::{StoreError, StoreResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn manager() -> LockManager {
        LockManager::new(Arc::new(MemoryLockStore::new()))
    }

    #[derive(Debug)]
    enum TestError {
        Lock(LockError),
        Business(&'static str),
    }

    impl From<LockError> for TestError {
        fn from(e: LockError) -> Self {
            TestError::Lock(e)
        }
    }

    /// Store whose every call fails, counting attempts
    #[derive(Default)]
    struct FailingStore {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LockStore for FailingStore {
        async fn set_if_absent(&self, _key: &str, _value: &str, _ttl: Duration) -> StoreResult<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Backend("connection refused".into()))
        }

        async fn compare_and_delete(&self, _key: &str, _expected: &str) -> StoreResult<bool> {
            Err(StoreError::Backend("connection refused".into()))
        }

        async fn compare_and_expire(&self, _key: &str, _expected: &str, _ttl: Duration) -> StoreResult<bool> {
            Err(StoreError::Backend("connection refused".into()))
        }

        async fn get(&self, _key: &str) -> StoreResult<Option<String>> {
            Err(StoreError::Backend("connection refused".into()))
        }

        async fn ttl(&self, _key: &str) -> StoreResult<Option<Duration>> {
            Err(StoreError::Backend("connection refused".into()))
        }
    }

    /// Memory store whose deletes can be switched to fail
    #[derive(Default)]
    struct FlakyReleaseStore {
        inner: MemoryLockStore,
        fail_release: AtomicBool,
    }

    #[async_trait]
    impl LockStore for FlakyReleaseStore {
        async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
            self.inner.set_if_absent(key, value, ttl).await
        }

        async fn compare_and_delete(&self, key: &str, expected: &str) -> StoreResult<bool> {
            if self.fail_release.load(Ordering::SeqCst) {
                return Err(StoreError::Backend("timeout".into()));
            }
            self.inner.compare_and_delete(key, expected).await
        }

        async fn compare_and_expire(&self, key: &str, expected: &str, ttl: Duration) -> StoreResult<bool> {
            self.inner.compare_and_expire(key, expected, ttl).await
        }

        async fn get(&self, key: &str) -> StoreResult<Option<String>> {
            self.inner.get(key).await
        }

        async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
            self.inner.ttl(key).await
        }
    }

    /// Memory store whose first release stalls for a minute
    #[derive(Default)]
    struct StalledReleaseStore {
        inner: MemoryLockStore,
        stalled: AtomicBool,
    }

    #[async_trait]
    impl LockStore for StalledReleaseStore {
        async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
            self.inner.set_if_absent(key, value, ttl).await
        }

        async fn compare_and_delete(&self, key: &str, expected: &str) -> StoreResult<bool> {
            if !self.stalled.swap(true, Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            self.inner.compare_and_delete(key, expected).await
        }

        async fn compare_and_expire(&self, key: &str, expected: &str, ttl: Duration) -> StoreResult<bool> {
            self.inner.compare_and_expire(key, expected, ttl).await
        }

        async fn get(&self, key: &str) -> StoreResult<Option<String>> {
            self.inner.get(key).await
        }

        async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
            self.inner.ttl(key).await
        }
    }

    #[tokio::test]
    async fn test_try_lock_and_unlock() {
        let manager = manager();

        let handle = manager.try_lock("key1", Duration::from_secs(30)).await.unwrap();
        assert_eq!(handle.key(), "key1");
        assert_eq!(handle.lease(), Duration::from_secs(30));
        assert!(manager.is_locked(&handle).await.unwrap());

        let err = manager.try_lock("key1", Duration::from_secs(30)).await.unwrap_err();
        assert!(matches!(err, LockError::NotAcquired(ref k) if k == "key1"));

        manager.unlock(&handle).await.unwrap();
        assert!(!manager.is_locked(&handle).await.unwrap());
        assert!(manager.try_lock("key1", Duration::from_secs(30)).await.is_ok());
    }

    #[tokio::test]
    async fn test_handles_carry_distinct_tokens() {
        let manager = manager();
        let a = manager.try_lock("a", Duration::from_secs(30)).await.unwrap();
        let b = manager.try_lock("b", Duration::from_secs(30)).await.unwrap();
        assert_ne!(a.owner_token(), b.owner_token());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_try_lock_has_single_winner() {
        let manager = manager();
        let mut tasks = Vec::new();

        for _ in 0..16 {
            let manager = manager.clone();
            tasks.push(tokio::spawn(async move {
                manager.try_lock("contended", Duration::from_secs(30)).await
            }));
        }

        let mut winners = 0;
        let mut losers = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => winners += 1,
                Err(LockError::NotAcquired(_)) => losers += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(winners, 1);
        assert_eq!(losers, 15);
    }

    #[tokio::test]
    async fn test_unlock_after_expiry_spares_new_owner() {
        let manager = manager();

        let stale = manager.try_lock("key1", Duration::ZERO).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let current = manager.try_lock("key1", Duration::from_secs(30)).await.unwrap();

        let err = manager.unlock(&stale).await.unwrap_err();
        assert!(matches!(err, LockError::NotOwned(_)));
        assert!(!manager.is_locked(&stale).await.unwrap());
        assert!(manager.is_locked(&current).await.unwrap());
    }

    #[tokio::test]
    async fn test_double_unlock_is_not_owned() {
        let manager = manager();
        let handle = manager.try_lock("key1", Duration::from_secs(30)).await.unwrap();

        manager.unlock(&handle).await.unwrap();
        assert!(matches!(
            manager.unlock(&handle).await,
            Err(LockError::NotOwned(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_extend_by_owner() {
        let manager = manager();
        let mut handle = manager.try_lock("key1", Duration::from_secs(1)).await.unwrap();

        manager.extend(&mut handle, Duration::from_secs(60)).await.unwrap();
        assert_eq!(handle.lease(), Duration::from_secs(60));

        let remaining = manager.ttl(&handle).await.unwrap().unwrap();
        assert!(remaining >= Duration::from_secs(59));

        // Still held past the first lease
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(manager.is_locked(&handle).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_extend_by_stale_owner() {
        let manager = manager();
        let mut stale = manager.try_lock("key1", Duration::from_millis(100)).await.unwrap();
        tokio::time::advance(Duration::from_millis(150)).await;

        let current = manager.try_lock("key1", Duration::from_secs(10)).await.unwrap();
        let before = manager.ttl(&current).await.unwrap();

        let err = manager.extend(&mut stale, Duration::from_secs(60)).await.unwrap_err();
        assert!(matches!(err, LockError::NotOwned(_)));
        assert_eq!(stale.lease(), Duration::from_millis(100));
        assert_eq!(manager.ttl(&current).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_is_locked_on_absent_key() {
        let manager = manager();
        let handle = manager.try_lock("key1", Duration::ZERO).await.unwrap();

        assert!(!manager.is_locked(&handle).await.unwrap());
        assert_eq!(manager.ttl(&handle).await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_without_retries_fails_fast() {
        let manager = manager();
        let _held = manager.try_lock("key1", Duration::from_secs(30)).await.unwrap();

        let options = LockOptions::default().with_max_retries(0);
        let started = Instant::now();
        let err = manager.lock("key1", &options).await.unwrap_err();

        assert!(matches!(err, LockError::RetriesExhausted { attempts: 1, .. }));
        assert!(err.is_contention());
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_times_out_mid_wait() {
        let manager = manager();
        let _held = manager.try_lock("key1", Duration::from_secs(30)).await.unwrap();

        let options = LockOptions::default()
            .with_retry_delay(Duration::from_millis(100))
            .with_lock_timeout(Duration::from_millis(50));
        let started = Instant::now();
        let err = manager.lock("key1", &options).await.unwrap_err();

        match err {
            LockError::AcquisitionTimeout { attempts, .. } => assert_eq!(attempts, 1),
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_waits_for_expiry() {
        let manager = manager();
        let _held = manager.try_lock("key1", Duration::from_millis(250)).await.unwrap();

        let options = LockOptions::default()
            .with_retry_delay(Duration::from_millis(100))
            .with_max_retries(10)
            .with_lock_timeout(Duration::from_secs(1));
        let started = Instant::now();
        let handle = manager.lock("key1", &options).await.unwrap();

        assert!(manager.is_locked(&handle).await.unwrap());
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert!(started.elapsed() < Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_orders_scenario() {
        let manager = manager();
        let options = LockOptions {
            ttl: Duration::from_secs(30),
            retry_delay: Duration::from_millis(100),
            max_retries: 3,
            lock_timeout: Duration::from_secs(1),
        };

        let first = manager.lock("orders:42", &options).await.unwrap();

        let started = Instant::now();
        let err = manager.lock("orders:42", &options).await.unwrap_err();
        assert!(matches!(err, LockError::RetriesExhausted { attempts: 4, .. }));
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert!(started.elapsed() < Duration::from_millis(400));

        manager.unlock(&first).await.unwrap();

        let started = Instant::now();
        let third = manager.lock("orders:42", &options).await.unwrap();
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert!(manager.is_locked(&third).await.unwrap());
    }

    #[tokio::test]
    async fn test_try_lock_with_unbounded_ttl() {
        let manager = manager();

        let mut handle = manager.try_lock("key1", Duration::MAX).await.unwrap();
        assert!(manager.is_locked(&handle).await.unwrap());
        assert!(manager.ttl(&handle).await.unwrap().is_some());

        manager.extend(&mut handle, Duration::MAX).await.unwrap();
        assert_eq!(handle.lease(), Duration::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_with_unbounded_timeout() {
        let manager = manager();
        let options = LockOptions::default().with_lock_timeout(Duration::MAX);

        let handle = manager.lock("key1", &options).await.unwrap();
        assert!(manager.is_locked(&handle).await.unwrap());

        let err = manager
            .lock("key1", &options.with_max_retries(2))
            .await
            .unwrap_err();
        assert!(matches!(err, LockError::RetriesExhausted { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn test_store_error_aborts_without_retry() {
        let store = Arc::new(FailingStore::default());
        let manager = LockManager::new(store.clone());

        let err = manager.lock("key1", &LockOptions::default()).await.unwrap_err();
        assert!(matches!(err, LockError::Store { op: "acquire", .. }));
        assert!(!err.is_contention());
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_store_errors_propagate() {
        let manager = LockManager::new(Arc::new(FailingStore::default()));
        let handle = LockHandle::new("key1", OwnerToken::generate(), Duration::from_secs(1));

        assert!(matches!(
            manager.is_locked(&handle).await,
            Err(LockError::Store { op: "inspect", .. })
        ));
        assert!(matches!(
            manager.unlock(&handle).await,
            Err(LockError::Store { op: "release", .. })
        ));
    }

    #[tokio::test]
    async fn test_lock_default_uses_manager_options() {
        let manager = LockManager::with_defaults(
            Arc::new(MemoryLockStore::new()),
            LockOptions::default().with_ttl(Duration::from_secs(5)),
        );

        let handle = manager.lock_default("key1").await.unwrap();
        assert_eq!(handle.lease(), Duration::from_secs(5));
        assert_eq!(manager.defaults().ttl, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_with_lock_success() {
        let manager = manager();

        let value: Result<u32, TestError> = manager
            .with_lock("key1", &LockOptions::default(), || async { Ok(42) })
            .await;
        assert_eq!(value.unwrap(), 42);

        assert!(manager.try_lock("key1", Duration::from_secs(30)).await.is_ok());
    }

    #[tokio::test]
    async fn test_with_lock_releases_on_error() {
        let manager = manager();

        let result: Result<(), TestError> = manager
            .with_lock("key1", &LockOptions::default(), || async {
                Err(TestError::Business("payment declined"))
            })
            .await;
        assert!(matches!(result, Err(TestError::Business("payment declined"))));

        assert!(manager.try_lock("key1", Duration::from_secs(30)).await.is_ok());
    }

    #[tokio::test]
    async fn test_with_lock_surfaces_acquisition_failure() {
        let manager = manager();
        let _held = manager.try_lock("key1", Duration::from_secs(30)).await.unwrap();

        let ran = AtomicBool::new(false);
        let result: Result<(), TestError> = manager
            .with_lock("key1", &LockOptions::default().with_max_retries(0), || async {
                ran.store(true, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert!(matches!(
            result,
            Err(TestError::Lock(LockError::RetriesExhausted { .. }))
        ));
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_with_lock_release_failure_keeps_outcome() {
        let store = Arc::new(FlakyReleaseStore::default());
        store.fail_release.store(true, Ordering::SeqCst);
        let manager = LockManager::new(store);

        let result: Result<&str, TestError> = manager
            .with_lock("key1", &LockOptions::default(), || async { Ok("done") })
            .await;
        assert_eq!(result.unwrap(), "done");
    }

    #[tokio::test]
    async fn test_with_lock_releases_when_cancelled_during_release() {
        let manager = LockManager::new(Arc::new(StalledReleaseStore::default()));

        let cancelled = tokio::time::timeout(
            Duration::from_millis(100),
            manager.with_lock("key1", &LockOptions::default(), || async {
                Ok::<(), TestError>(())
            }),
        )
        .await;
        assert!(cancelled.is_err());

        let mut reacquired = false;
        for _ in 0..50 {
            if manager.try_lock("key1", Duration::from_secs(30)).await.is_ok() {
                reacquired = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(reacquired);
    }

    #[tokio::test]
    async fn test_with_lock_releases_after_panic() {
        let manager = manager();

        let task_manager = manager.clone();
        let joined = tokio::spawn(async move {
            let _: Result<(), TestError> = task_manager
                .with_lock("key1", &LockOptions::default(), || async {
                    let crashed = true;
                    if crashed {
                        panic!("critical section crashed");
                    }
                    Ok(())
                })
                .await;
        })
        .await;
        assert!(joined.unwrap_err().is_panic());

        let mut reacquired = false;
        for _ in 0..50 {
            if manager.try_lock("key1", Duration::from_secs(30)).await.is_ok() {
                reacquired = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(reacquired);
    }

    #[tokio::test]
    async fn test_with_lock_releases_when_cancelled() {
        let manager = manager();

        let cancelled = tokio::time::timeout(
            Duration::from_millis(20),
            manager.with_lock("key1", &LockOptions::default(), || async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<(), TestError>(())
            }),
        )
        .await;
        assert!(cancelled.is_err());

        let mut reacquired = false;
        for _ in 0..50 {
            if manager.try_lock("key1", Duration::from_secs(30)).await.is_ok() {
                reacquired = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(reacquired);
    }
}
