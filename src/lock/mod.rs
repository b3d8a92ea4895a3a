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
mod distributed;
mod local;
mod registry;

pub use distributed::*;
pub use registry::*;

use std::time::Duration;
use crate::errors::LockResult;

/// Condition variable bound to a lock. No lock of this crate hands one out.
pub trait Condition: Send + Sync {
    fn await_signal(&self) -> LockResult<()>;

    fn signal(&self);

    fn signal_all(&self);
}

/// Mutual exclusion operations of a lock handle
pub trait Lockable {
    /// Acquire the lock, waiting as long as it takes
    fn lock(&self) -> LockResult<()>;

    /// Acquire the lock unless the current thread is interrupted
    fn lock_interruptibly(&self) -> LockResult<()>;

    /// Attempt to acquire the lock once, without waiting
    fn try_lock(&self) -> LockResult<bool>;

    /// Attempt to acquire the lock within `timeout`
    fn try_lock_timeout(&self, timeout: Duration) -> LockResult<bool>;

    /// Release one hold of the current thread
    fn unlock(&self) -> LockResult<()>;

    fn new_condition(&self) -> LockResult<Box<dyn Condition>>;

    /// Checks whether the current thread holds the lock
    fn is_held_by_current_thread(&self) -> bool;

    /// Checks whether this process holds the lock in the backend
    fn is_held_by_current_process(&self) -> bool;
}
