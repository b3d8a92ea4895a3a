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
mod memory;
#[cfg(test)]
pub(crate) mod testing;

pub use memory::*;

use std::time::Duration;
use crate::errors::LockResult;
use crate::interrupt;
use crate::watcher::Watcher;

/// Sleep used between two acquisition attempts when no watcher is available.
pub const DEFAULT_AWAIT_INTERVAL: Duration = Duration::from_millis(100);

/// Storage-side half of a distributed lock.
///
/// Implementations own the lock records; every state transition must be a
/// single atomic update in the backend, since that update is what actually
/// arbitrates between processes.
pub trait LockRepository: Send + Sync {
    /// Moves the record from unlocked (or absent) to locked by `instance_id`.
    /// Returns whether this call won the transition. Must not block indefinitely.
    fn acquire_lock(&self, lock_id: &str, instance_id: &str) -> LockResult<bool>;

    /// Moves the record back to unlocked; a no-op when it already is.
    fn release_lock(&self, lock_id: &str, instance_id: &str) -> LockResult<()>;

    /// Touches the heartbeat of every record currently locked by `instance_id`.
    fn refresh_active_locks(&self, instance_id: &str) -> LockResult<()>;

    /// Unlocks every record whose heartbeat is older than `timeout`, whoever owns it.
    fn release_dead_locks(&self, timeout: Duration) -> LockResult<()>;

    /// Waits for `lock_id` to be released, at most `timeout` when given.
    /// Returns whether a release notification arrived.
    fn await_release_lock(&self, lock_id: &str, timeout: Option<Duration>) -> LockResult<bool> {
        let _ = lock_id;
        sleep_before_retry(timeout)
    }

    fn is_watchable(&self) -> bool {
        false
    }
}

/// The polling fallback: one [`DEFAULT_AWAIT_INTERVAL`] sleep, clipped to `timeout`.
pub fn sleep_before_retry(timeout: Option<Duration>) -> LockResult<bool> {
    let interval = match timeout {
        Some(timeout) => timeout.min(DEFAULT_AWAIT_INTERVAL),
        None => DEFAULT_AWAIT_INTERVAL,
    };
    interrupt::sleep(interval)?;
    Ok(false)
}

/// Waits through `watcher` while it is active, never longer than `max_wait`
/// so a release published before the wait began costs at most that long.
/// Falls back to [`sleep_before_retry`] otherwise.
pub fn await_release_with(
    watcher: &dyn Watcher,
    lock_id: &str,
    timeout: Option<Duration>,
    max_wait: Duration,
) -> LockResult<bool> {
    if !watcher.is_active() {
        return sleep_before_retry(timeout);
    }
    let wait = match timeout {
        Some(timeout) => timeout.min(max_wait),
        None => max_wait,
    };
    watcher.await_signal_timeout(lock_id, wait)
}
