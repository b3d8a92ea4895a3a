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

//! Per-thread interruption flags.
//!
//! Every blocking point in this crate (local mutex waits, release waits,
//! backoff sleeps) checks the calling thread's flag and returns
//! [`LockError::Interrupted`] once it is raised. Another thread raises it
//! through the [`Interrupter`] handle the target thread published with
//! [`current`]. Observing the interruption clears the flag.

use std::sync::Arc;
use std::time::{Duration, Instant};
use parking_lot::{Condvar, Mutex, MutexGuard};
use crate::errors::{LockError, LockResult};

/// Upper bound on how long a wait on a foreign condvar goes without
/// re-checking the interrupt flag.
pub const POLL_SLICE: Duration = Duration::from_millis(10);

#[derive(Default)]
struct InterruptState {
    interrupted: Mutex<bool>,
    cond: Condvar,
}

thread_local! {
    static CURRENT: Arc<InterruptState> = Arc::new(InterruptState::default());
}

/// Handle used to interrupt one particular thread.
#[derive(Clone)]
pub struct Interrupter {
    state: Arc<InterruptState>,
}

impl Interrupter {
    pub fn interrupt(&self) {
        let mut interrupted = self.state.interrupted.lock();
        *interrupted = true;
        self.state.cond.notify_all();
    }

    pub fn is_interrupted(&self) -> bool {
        *self.state.interrupted.lock()
    }
}

/// The handle for the calling thread.
pub fn current() -> Interrupter {
    CURRENT.with(|state| Interrupter { state: state.clone() })
}

pub fn is_interrupted() -> bool {
    CURRENT.with(|state| *state.interrupted.lock())
}

/// Returns whether the calling thread was interrupted, clearing the flag.
pub fn interrupted() -> bool {
    CURRENT.with(|state| std::mem::replace(&mut *state.interrupted.lock(), false))
}

/// Raises the flag on the calling thread again after an interruption was consumed.
pub fn restore() {
    current().interrupt();
}

pub fn check() -> LockResult<()> {
    if interrupted() {
        Err(LockError::Interrupted)
    } else {
        Ok(())
    }
}

/// Sleeps for `duration` unless the calling thread gets interrupted first.
pub fn sleep(duration: Duration) -> LockResult<()> {
    let deadline = Instant::now() + duration;
    CURRENT.with(|state| {
        let mut interrupted = state.interrupted.lock();
        while !*interrupted {
            if state.cond.wait_until(&mut interrupted, deadline).timed_out() {
                break;
            }
        }
        if std::mem::replace(&mut *interrupted, false) {
            Err(LockError::Interrupted)
        } else {
            Ok(())
        }
    })
}

/// Waits on `cond` for at most one [`POLL_SLICE`] (clipped to `deadline`),
/// then reports a pending interruption. Callers loop on their own condition.
pub(crate) fn wait_slice<T>(
    cond: &Condvar,
    guard: &mut MutexGuard<'_, T>,
    deadline: Option<Instant>,
) -> LockResult<()> {
    let slice = match deadline {
        Some(deadline) => deadline.saturating_duration_since(Instant::now()).min(POLL_SLICE),
        None => POLL_SLICE,
    };
    if !slice.is_zero() {
        cond.wait_for(guard, slice);
    }
    check()
}
