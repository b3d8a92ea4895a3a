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

//! Release notifications.
//!
//! A [`Watcher`] lets a blocked acquirer sleep until the backend reports that
//! a particular lock id went back to unlocked, instead of polling on a fixed
//! interval. It is an optimization only: repositories fall back to a fixed
//! sleep whenever their watcher is missing or inactive.

mod channel;
mod signal;

pub use channel::*;
pub use signal::*;

use std::sync::Arc;
use std::thread;
use std::time::Duration;
use crate::errors::{LockError, LockResult};

pub trait Watcher: Send + Sync {
    /// Blocks until `signal(lock_id)` is called; interruptible.
    fn await_signal(&self, lock_id: &str) -> LockResult<()>;

    /// Returns whether the signal arrived before `timeout`.
    fn await_signal_timeout(&self, lock_id: &str, timeout: Duration) -> LockResult<bool>;

    /// Wakes the threads currently waiting on `lock_id`. Not remembered
    /// for later waiters.
    fn signal(&self, lock_id: &str);

    /// Whether the event source is connected and delivering.
    fn is_active(&self) -> bool;

    /// Event-source pump; runs on its own thread until [`close`](Self::close).
    fn run(&self);

    fn close(&self);
}

/// Starts `watcher.run()` on a named thread.
pub fn spawn_watcher(watcher: Arc<dyn Watcher>, name: &str) -> LockResult<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || watcher.run())
        .map_err(|e| LockError::ThreadError(format!("failed to start watcher {}: {}", name, e)))
}
