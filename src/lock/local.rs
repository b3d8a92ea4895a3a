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
use std::thread::{self, ThreadId};
use std::time::Instant;
use parking_lot::{Condvar, Mutex};
use crate::errors::LockResult;
use crate::interrupt;

/// Local lock state
#[derive(Default)]
struct LocalLockState {
    owner: Option<ThreadId>,
    lock_count: u32,
    waiters: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LocalWait {
    /// Wait as long as it takes, ignoring interrupts
    Blocking,
    /// Wait as long as it takes, unless interrupted
    Interruptibly,
    /// Do not wait at all
    Never,
    /// Wait until the deadline, unless interrupted
    Until(Instant),
}

/// Reentrant mutex whose hold is not tied to a guard, so it can be taken in
/// `lock()` and given back in a later `unlock()` call.
#[derive(Default)]
pub(crate) struct LocalReentrantLock {
    state: Mutex<LocalLockState>,
    cond: Condvar,
}

impl LocalReentrantLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the lock, or adds one hold when the calling thread already owns it.
    /// Returns `Ok(false)` only for [`LocalWait::Never`] and [`LocalWait::Until`].
    pub fn acquire(&self, wait: LocalWait) -> LockResult<bool> {
        if matches!(wait, LocalWait::Interruptibly | LocalWait::Until(_)) {
            interrupt::check()?;
        }

        let me = thread::current().id();
        let mut state = self.state.lock();
        if state.owner == Some(me) {
            state.lock_count += 1;
            return Ok(true);
        }
        if state.owner.is_none() {
            state.owner = Some(me);
            state.lock_count = 1;
            return Ok(true);
        }
        if wait == LocalWait::Never {
            return Ok(false);
        }

        state.waiters += 1;
        let outcome = loop {
            if state.owner.is_none() {
                break Ok(true);
            }
            match wait {
                LocalWait::Blocking => {
                    self.cond.wait(&mut state);
                }
                LocalWait::Interruptibly => {
                    if let Err(e) = interrupt::wait_slice(&self.cond, &mut state, None) {
                        break Err(e);
                    }
                }
                LocalWait::Until(deadline) => {
                    if Instant::now() >= deadline {
                        break Ok(false);
                    }
                    if let Err(e) = interrupt::wait_slice(&self.cond, &mut state, Some(deadline)) {
                        break Err(e);
                    }
                }
                LocalWait::Never => break Ok(false),
            }
        };
        state.waiters -= 1;

        if let Ok(true) = outcome {
            state.owner = Some(me);
            state.lock_count = 1;
        }
        outcome
    }

    /// Drops one hold of the calling thread. `None` when the calling thread
    /// is not the owner, otherwise the holds left.
    pub fn release(&self) -> Option<u32> {
        let me = thread::current().id();
        let mut state = self.state.lock();
        if state.owner != Some(me) {
            return None;
        }
        state.lock_count -= 1;
        if state.lock_count == 0 {
            state.owner = None;
            self.cond.notify_all();
        }
        Some(state.lock_count)
    }

    pub fn is_held_by_current_thread(&self) -> bool {
        self.state.lock().owner == Some(thread::current().id())
    }

    /// Holds of the calling thread, zero when another thread (or none) owns it.
    pub fn hold_count(&self) -> u32 {
        let state = self.state.lock();
        if state.owner == Some(thread::current().id()) {
            state.lock_count
        } else {
            0
        }
    }

    /// Nobody owns it and nobody waits for it.
    pub fn is_idle(&self) -> bool {
        let state = self.state.lock();
        state.owner.is_none() && state.waiters == 0
    }
}
