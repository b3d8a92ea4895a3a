/*
 *
 *  *
 *  *      Copyright (c) 2018-2025, SnackCloud All rights reserved.
 *  *
 *  *   Redistribution and use in source and binary forms, with or without
 *  *   modification, are permitted provided that the following conditions are met:
 *  *
 *  *   Redistributions of source code must retain the above copyright notice,
 *  *   this list of conditions and the following disclaimer.
 *  *   Redistributions in binary form must reproduce the above copyright
 *  *   notice, this list of conditions and the following disclaimer in the
 *  *   documentation and/or other materials provided with the distribution.
 *  *   Neither the name of the www.snackcloud.cn developer nor the names of its
 *  *   contributors may be used to endorse or promote products derived from
 *  *   this software without specific prior written permission.
 *  *   Author: SnackCloud
 *  *
 *
 */
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use crate::errors::{LockError, LockResult};
use crate::interrupt;
use crate::lock::local::{LocalReentrantLock, LocalWait};
use crate::lock::registry::RegistryShared;
use crate::lock::{Condition, Lockable};
use crate::repository::LockRepository;
use crate::retry::{self, RetryerFactory};
use crate::util::remaining_until;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Acquire {
    Blocking,
    Interruptibly,
    Try,
    Until(Instant),
}

impl Acquire {
    fn local_wait(self) -> LocalWait {
        match self {
            Acquire::Blocking => LocalWait::Blocking,
            Acquire::Interruptibly => LocalWait::Interruptibly,
            Acquire::Try => LocalWait::Never,
            Acquire::Until(deadline) => LocalWait::Until(deadline),
        }
    }
}

struct LockInner {
    id: String,
    instance_id: String,
    local: LocalReentrantLock,
    held_by_current_process: AtomicBool,
    repository: Arc<dyn LockRepository>,
    retryer_factory: RetryerFactory,
    registry: Weak<RegistryShared>,
}

/// Handle to one named lock shared by every process using the same backend.
///
/// Inside the process the handle behaves like a reentrant mutex. The first
/// hold of a thread also has to win the lock record through the
/// [`LockRepository`]; nested holds never touch the backend. Clones share
/// the same state.
#[derive(Clone)]
pub struct DistributedLock {
    inner: Arc<LockInner>,
}

impl DistributedLock {
    pub(crate) fn new(
        id: &str,
        instance_id: &str,
        repository: Arc<dyn LockRepository>,
        retryer_factory: RetryerFactory,
        registry: Weak<RegistryShared>,
    ) -> Self {
        Self {
            inner: Arc::new(LockInner {
                id: id.to_string(),
                instance_id: instance_id.to_string(),
                local: LocalReentrantLock::new(),
                held_by_current_process: AtomicBool::new(false),
                repository,
                retryer_factory,
                registry,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn instance_id(&self) -> &str {
        &self.inner.instance_id
    }

    /// Holds of the current thread
    pub fn hold_count(&self) -> u32 {
        self.inner.local.hold_count()
    }

    /// Runs `f` while holding the lock, unlocking afterwards even if `f` panics.
    pub fn with_lock<T, F>(&self, f: F) -> LockResult<T>
    where
        F: FnOnce() -> T,
    {
        self.lock()?;
        let mut guard = UnlockOnDrop { lock: self, armed: true };
        let value = f();
        guard.armed = false;
        self.unlock()?;
        Ok(value)
    }

    pub(crate) fn same_handle(&self, other: &DistributedLock) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Nobody holds or waits for the local mutex and no handle exists besides
    /// the cached one and `self`.
    pub(crate) fn is_unused(&self) -> bool {
        self.inner.local.is_idle() && Arc::strong_count(&self.inner) <= 2
    }

    fn acquire(&self, mode: Acquire) -> LockResult<bool> {
        let inner = &self.inner;
        if !inner.local.acquire(mode.local_wait())? {
            return Ok(false);
        }
        if inner.local.hold_count() > 1 {
            return Ok(true);
        }

        match self.acquire_remote(mode) {
            Ok(true) => Ok(true),
            outcome => {
                inner.local.release();
                outcome
            }
        }
    }

    fn acquire_remote(&self, mode: Acquire) -> LockResult<bool> {
        let inner = &self.inner;
        let retryer = (inner.retryer_factory)();
        let mut context = retryer.context();
        loop {
            match inner.repository.acquire_lock(&inner.id, &inner.instance_id) {
                Ok(true) => {
                    inner.held_by_current_process.store(true, Ordering::SeqCst);
                    debug!("Acquired lock {} for instance {}", inner.id, inner.instance_id);
                    return Ok(true);
                }
                Ok(false) => {
                    // Only consecutive failures count against the budget.
                    context = retryer.context();
                    match mode {
                        Acquire::Try => return Ok(false),
                        Acquire::Until(deadline) => {
                            let remaining = remaining_until(deadline);
                            if remaining.is_zero() {
                                return Ok(false);
                            }
                            inner.repository.await_release_lock(&inner.id, Some(remaining))?;
                        }
                        Acquire::Blocking | Acquire::Interruptibly => {
                            inner.repository.await_release_lock(&inner.id, None)?;
                        }
                    }
                }
                Err(error) => {
                    if mode == Acquire::Try || !retryer.should_retry_for(&error, &mut context) {
                        return Err(LockError::cannot_acquire(&inner.id, &inner.instance_id, error));
                    }
                    warn!(
                        attempt = context.attempts(),
                        "Acquiring lock {} failed, retrying: {}", inner.id, error
                    );
                    match mode {
                        Acquire::Until(deadline) => {
                            let remaining = remaining_until(deadline);
                            if remaining.is_zero() {
                                return Ok(false);
                            }
                            retryer.sleep_at_most(&context, remaining)?;
                        }
                        _ => retryer.sleep(&context)?,
                    }
                }
            }

            if let Acquire::Until(deadline) = mode {
                if Instant::now() >= deadline {
                    return Ok(false);
                }
            }
        }
    }

    fn evict_if_unused(&self) {
        if let Some(registry) = self.inner.registry.upgrade() {
            registry.evict_if_unused(self);
        }
    }
}

impl Lockable for DistributedLock {
    fn lock(&self) -> LockResult<()> {
        match self.acquire(Acquire::Blocking) {
            Ok(_) => Ok(()),
            Err(LockError::Interrupted) => {
                interrupt::restore();
                Err(LockError::cannot_acquire(
                    &self.inner.id,
                    &self.inner.instance_id,
                    LockError::Interrupted,
                ))
            }
            Err(e) => Err(e),
        }
    }

    fn lock_interruptibly(&self) -> LockResult<()> {
        self.acquire(Acquire::Interruptibly).map(|_| ())
    }

    fn try_lock(&self) -> LockResult<bool> {
        self.acquire(Acquire::Try)
    }

    fn try_lock_timeout(&self, timeout: Duration) -> LockResult<bool> {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.acquire(Acquire::Until(deadline)),
            None => self.acquire(Acquire::Interruptibly),
        }
    }

    fn unlock(&self) -> LockResult<()> {
        let inner = &self.inner;
        if !inner.local.is_held_by_current_thread() {
            return Err(LockError::NotHeldByCurrentThread(inner.id.clone()));
        }
        if inner.local.hold_count() > 1 {
            inner.local.release();
            return Ok(());
        }

        let retryer = (inner.retryer_factory)();
        let released = retry::apply(retryer.as_ref(), || {
            inner.repository.release_lock(&inner.id, &inner.instance_id)
        });
        inner.held_by_current_process.store(false, Ordering::SeqCst);
        inner.local.release();

        match released {
            Ok(()) => {
                debug!("Released lock {} for instance {}", inner.id, inner.instance_id);
                self.evict_if_unused();
                Ok(())
            }
            Err(e) => Err(LockError::cannot_release(&inner.id, &inner.instance_id, e)),
        }
    }

    fn new_condition(&self) -> LockResult<Box<dyn Condition>> {
        Err(LockError::Unsupported(format!(
            "conditions are not supported by distributed lock {}",
            self.inner.id
        )))
    }

    fn is_held_by_current_thread(&self) -> bool {
        self.inner.local.is_held_by_current_thread()
    }

    fn is_held_by_current_process(&self) -> bool {
        self.inner.held_by_current_process.load(Ordering::SeqCst)
    }
}

impl Debug for DistributedLock {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributedLock")
            .field("id", &self.inner.id)
            .field("instance_id", &self.inner.instance_id)
            .field("held_by_current_process", &self.is_held_by_current_process())
            .finish()
    }
}

struct UnlockOnDrop<'a> {
    lock: &'a DistributedLock,
    armed: bool,
}

impl Drop for UnlockOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = self.lock.unlock() {
                warn!("Failed to unlock {} while unwinding: {}", self.lock.id(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackoffConfig, RetryConfig};
    use crate::errors::ErrorKind;
    use crate::repository::testing::FlakyRepository;
    use crate::retry::{ClassifyingRetryer, Retryer};
    use std::error::Error as StdError;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc::channel;
    use std::thread;

    fn fast_retries() -> RetryerFactory {
        let config = RetryConfig::default().with_backoff(BackoffConfig::None);
        Arc::new(move || Box::new(ClassifyingRetryer::from_config(&config)) as Box<dyn Retryer>)
    }

    fn lock_on(repository: &Arc<FlakyRepository>, id: &str) -> DistributedLock {
        DistributedLock::new(id, "node-a", repository.clone(), fast_retries(), Weak::new())
    }

    fn calls(counter: &AtomicUsize) -> usize {
        FlakyRepository::count(counter)
    }

    #[test]
    fn test_reentrant_holds_contact_backend_once() {
        let repository = Arc::new(FlakyRepository::new());
        let lock = lock_on(&repository, "orders");

        lock.lock().unwrap();
        lock.lock().unwrap();
        assert!(lock.try_lock().unwrap());
        assert_eq!(lock.hold_count(), 3);
        assert_eq!(calls(&repository.acquire_calls), 1);

        lock.unlock().unwrap();
        lock.unlock().unwrap();
        assert!(lock.is_held_by_current_process());
        assert_eq!(calls(&repository.release_calls), 0);

        lock.unlock().unwrap();
        assert!(!lock.is_held_by_current_process());
        assert!(!lock.is_held_by_current_thread());
        assert_eq!(calls(&repository.release_calls), 1);
        assert_eq!(repository.inner().locked_by("orders"), None);
    }

    #[test]
    fn test_unlock_without_hold_is_usage_error() {
        let repository = Arc::new(FlakyRepository::new());
        let lock = lock_on(&repository, "orders");
        assert!(matches!(lock.unlock(), Err(LockError::NotHeldByCurrentThread(id)) if id == "orders"));

        lock.lock().unwrap();
        let other = lock.clone();
        let result = thread::spawn(move || other.unlock()).join().unwrap();
        assert!(matches!(result, Err(LockError::NotHeldByCurrentThread(_))));
        assert_eq!(calls(&repository.release_calls), 0);
        lock.unlock().unwrap();
    }

    #[test]
    fn test_try_lock_makes_single_attempt_without_waiting() {
        let repository = Arc::new(FlakyRepository::new());
        repository.inner().acquire_lock("orders", "node-b").unwrap();
        let lock = lock_on(&repository, "orders");

        assert!(!lock.try_lock().unwrap());
        assert_eq!(calls(&repository.acquire_calls), 1);
        assert_eq!(calls(&repository.await_calls), 0);
        assert_eq!(lock.hold_count(), 0);
        assert!(!lock.is_held_by_current_process());
    }

    #[test]
    fn test_try_lock_backend_error_is_not_retried() {
        let repository = Arc::new(FlakyRepository::new());
        repository.fail_next_acquire(ErrorKind::Connect);
        let lock = lock_on(&repository, "orders");

        let err = lock.try_lock().unwrap_err();
        assert!(matches!(err, LockError::CannotAcquire { .. }));
        assert_eq!(calls(&repository.acquire_calls), 1);
        assert_eq!(lock.hold_count(), 0);
    }

    #[test]
    fn test_transient_errors_are_retried() {
        let repository = Arc::new(FlakyRepository::new());
        repository.fail_next_acquire(ErrorKind::Timeout);
        repository.fail_next_acquire(ErrorKind::Concurrency);
        let lock = lock_on(&repository, "orders");

        lock.lock().unwrap();
        assert_eq!(calls(&repository.acquire_calls), 3);
        assert!(lock.is_held_by_current_process());
        lock.unlock().unwrap();
    }

    #[test]
    fn test_fatal_error_releases_local_mutex() {
        let repository = Arc::new(FlakyRepository::new());
        repository.fail_next_acquire(ErrorKind::Integrity);
        let lock = lock_on(&repository, "orders");

        let err = lock.lock().unwrap_err();
        match &err {
            LockError::CannotAcquire { lock_id, instance_id, source } => {
                assert_eq!(lock_id, "orders");
                assert_eq!(instance_id, "node-a");
                assert_eq!(source.kind(), Some(ErrorKind::Integrity));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(StdError::source(&err).is_some());
        assert_eq!(calls(&repository.acquire_calls), 1);
        assert!(!lock.is_held_by_current_thread());
        assert!(!lock.is_held_by_current_process());

        let other = lock.clone();
        assert!(thread::spawn(move || {
            let acquired = other.try_lock().unwrap();
            other.unlock().unwrap();
            acquired
        })
        .join()
        .unwrap());
    }

    #[test]
    fn test_retry_budget_exhaustion_surfaces_cannot_acquire() {
        let repository = Arc::new(FlakyRepository::new());
        for _ in 0..3 {
            repository.fail_next_acquire(ErrorKind::Connect);
        }
        let lock = lock_on(&repository, "orders");

        assert!(matches!(lock.lock(), Err(LockError::CannotAcquire { .. })));
        assert_eq!(calls(&repository.acquire_calls), 3);
        assert_eq!(lock.hold_count(), 0);
    }

    #[test]
    fn test_timed_lock_gives_up_no_earlier_than_timeout() {
        let repository = Arc::new(FlakyRepository::new());
        repository.inner().acquire_lock("orders", "node-b").unwrap();
        let lock = lock_on(&repository, "orders");

        let timeout = Duration::from_millis(150);
        let start = Instant::now();
        assert!(!lock.try_lock_timeout(timeout).unwrap());
        let elapsed = start.elapsed();
        assert!(elapsed >= timeout);
        assert!(elapsed < Duration::from_secs(2));
        assert!(calls(&repository.await_calls) >= 1);
        assert_eq!(lock.hold_count(), 0);
    }

    #[test]
    fn test_timed_lock_acquires_after_release() {
        let repository = Arc::new(FlakyRepository::new());
        repository.inner().acquire_lock("orders", "node-b").unwrap();
        let lock = lock_on(&repository, "orders");

        let releaser = {
            let repository = repository.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                repository.inner().release_lock("orders", "node-b").unwrap();
            })
        };
        assert!(lock.try_lock_timeout(Duration::from_secs(5)).unwrap());
        releaser.join().unwrap();
        assert_eq!(repository.inner().locked_by("orders").as_deref(), Some("node-a"));
        lock.unlock().unwrap();
    }

    #[test]
    fn test_timed_lock_clips_retry_backoff_to_deadline() {
        let repository = Arc::new(FlakyRepository::new());
        repository.inner().acquire_lock("orders", "node-b").unwrap();
        repository.fail_next_acquire(ErrorKind::Io);
        let config = RetryConfig::default().with_backoff(BackoffConfig::Fixed { delay: Duration::from_secs(2) });
        let retries: RetryerFactory =
            Arc::new(move || Box::new(ClassifyingRetryer::from_config(&config)) as Box<dyn Retryer>);
        let lock = DistributedLock::new("orders", "node-a", repository.clone(), retries, Weak::new());

        let timeout = Duration::from_millis(50);
        let start = Instant::now();
        assert!(!lock.try_lock_timeout(timeout).unwrap());
        let elapsed = start.elapsed();
        assert!(elapsed >= timeout);
        assert!(elapsed < Duration::from_secs(1), "waited {:?}", elapsed);
        assert_eq!(lock.hold_count(), 0);
    }

    #[test]
    fn test_lock_interruptibly_surfaces_interruption() {
        let repository = Arc::new(FlakyRepository::new());
        repository.inner().acquire_lock("orders", "node-b").unwrap();
        let lock = lock_on(&repository, "orders");

        let (tx, rx) = channel();
        let waiter = {
            let lock = lock.clone();
            thread::spawn(move || {
                tx.send(interrupt::current()).unwrap();
                let result = lock.lock_interruptibly();
                (result, interrupt::is_interrupted(), lock.hold_count())
            })
        };
        let handle = rx.recv().unwrap();
        thread::sleep(Duration::from_millis(30));
        handle.interrupt();

        let (result, still_flagged, holds) = waiter.join().unwrap();
        assert!(matches!(result, Err(LockError::Interrupted)));
        assert!(!still_flagged);
        assert_eq!(holds, 0);
    }

    #[test]
    fn test_lock_converts_interruption_and_restores_flag() {
        let repository = Arc::new(FlakyRepository::new());
        repository.inner().acquire_lock("orders", "node-b").unwrap();
        let lock = lock_on(&repository, "orders");

        let (tx, rx) = channel();
        let waiter = {
            let lock = lock.clone();
            thread::spawn(move || {
                tx.send(interrupt::current()).unwrap();
                let result = lock.lock();
                (result, interrupt::is_interrupted())
            })
        };
        let handle = rx.recv().unwrap();
        thread::sleep(Duration::from_millis(30));
        handle.interrupt();

        let (result, still_flagged) = waiter.join().unwrap();
        let err = result.unwrap_err();
        assert!(matches!(err, LockError::CannotAcquire { .. }));
        assert!(err.is_interrupted());
        assert!(still_flagged);
    }

    #[test]
    fn test_release_failure_still_frees_local_mutex() {
        let repository = Arc::new(FlakyRepository::new());
        repository.fail_next_release(ErrorKind::BadQuery);
        let lock = lock_on(&repository, "orders");

        lock.lock().unwrap();
        let err = lock.unlock().unwrap_err();
        assert!(matches!(err, LockError::CannotRelease { .. }));
        assert_eq!(calls(&repository.release_calls), 1);
        assert!(!lock.is_held_by_current_thread());
        assert!(!lock.is_held_by_current_process());
    }

    #[test]
    fn test_release_retries_transient_errors() {
        let repository = Arc::new(FlakyRepository::new());
        repository.fail_next_release(ErrorKind::Io);
        let lock = lock_on(&repository, "orders");

        lock.lock().unwrap();
        lock.unlock().unwrap();
        assert_eq!(calls(&repository.release_calls), 2);
        assert_eq!(repository.inner().locked_by("orders"), None);
    }

    #[test]
    fn test_new_condition_is_unsupported() {
        let repository = Arc::new(FlakyRepository::new());
        let lock = lock_on(&repository, "orders");
        assert!(matches!(lock.new_condition(), Err(LockError::Unsupported(_))));
    }

    #[test]
    fn test_with_lock_unlocks_after_closure_and_panic() {
        let repository = Arc::new(FlakyRepository::new());
        let lock = lock_on(&repository, "orders");

        let value = lock.with_lock(|| {
            assert!(lock.is_held_by_current_process());
            7
        })
        .unwrap();
        assert_eq!(value, 7);
        assert!(!lock.is_held_by_current_thread());

        let result = catch_unwind(AssertUnwindSafe(|| lock.with_lock(|| panic!("boom"))));
        assert!(result.is_err());
        assert!(!lock.is_held_by_current_thread());
        assert_eq!(repository.inner().locked_by("orders"), None);
    }

    #[test]
    fn test_threads_of_one_process_exclude_each_other() {
        let repository = Arc::new(FlakyRepository::new());
        let lock = lock_on(&repository, "counter");
        let inside = Arc::new(AtomicBool::new(false));
        let entries = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let lock = lock.clone();
                let inside = inside.clone();
                let entries = entries.clone();
                thread::spawn(move || {
                    for _ in 0..25 {
                        lock.lock().unwrap();
                        assert!(!inside.swap(true, Ordering::SeqCst));
                        entries.fetch_add(1, Ordering::SeqCst);
                        inside.store(false, Ordering::SeqCst);
                        lock.unlock().unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(entries.load(Ordering::SeqCst), 100);
        assert_eq!(calls(&repository.acquire_calls), 100);
        assert_eq!(calls(&repository.await_calls), 0);
    }
}
