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

//! Fault-injecting repository used by the lock and registry tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use parking_lot::Mutex;
use crate::errors::{ErrorKind, LockResult, RepositoryError};
use crate::repository::{InMemoryLockRepository, LockRepository};

#[derive(Default)]
pub(crate) struct FlakyRepository {
    inner: InMemoryLockRepository,
    acquire_failures: Mutex<VecDeque<ErrorKind>>,
    release_failures: Mutex<VecDeque<ErrorKind>>,
    failing_refresh: AtomicBool,
    panicking_refresh: AtomicBool,
    pub acquire_calls: AtomicUsize,
    pub release_calls: AtomicUsize,
    pub await_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub dead_lock_calls: AtomicUsize,
}

impl FlakyRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &InMemoryLockRepository {
        &self.inner
    }

    pub fn fail_next_acquire(&self, kind: ErrorKind) {
        self.acquire_failures.lock().push_back(kind);
    }

    pub fn fail_next_release(&self, kind: ErrorKind) {
        self.release_failures.lock().push_back(kind);
    }

    pub fn fail_refresh(&self, failing: bool) {
        self.failing_refresh.store(failing, Ordering::SeqCst);
    }

    pub fn panic_on_refresh(&self, panicking: bool) {
        self.panicking_refresh.store(panicking, Ordering::SeqCst);
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

impl LockRepository for FlakyRepository {
    fn acquire_lock(&self, lock_id: &str, instance_id: &str) -> LockResult<bool> {
        self.acquire_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(kind) = self.acquire_failures.lock().pop_front() {
            return Err(RepositoryError::new(kind, "injected acquire failure").into());
        }
        self.inner.acquire_lock(lock_id, instance_id)
    }

    fn release_lock(&self, lock_id: &str, instance_id: &str) -> LockResult<()> {
        self.release_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(kind) = self.release_failures.lock().pop_front() {
            return Err(RepositoryError::new(kind, "injected release failure").into());
        }
        self.inner.release_lock(lock_id, instance_id)
    }

    fn refresh_active_locks(&self, instance_id: &str) -> LockResult<()> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if self.panicking_refresh.load(Ordering::SeqCst) {
            panic!("injected refresh panic");
        }
        if self.failing_refresh.load(Ordering::SeqCst) {
            return Err(RepositoryError::new(ErrorKind::Connect, "injected refresh failure").into());
        }
        self.inner.refresh_active_locks(instance_id)
    }

    fn release_dead_locks(&self, timeout: Duration) -> LockResult<()> {
        self.dead_lock_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.release_dead_locks(timeout)
    }

    fn await_release_lock(&self, lock_id: &str, timeout: Option<Duration>) -> LockResult<bool> {
        self.await_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.await_release_lock(lock_id, timeout)
    }
}
