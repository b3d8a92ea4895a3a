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
use std::sync::Arc;
use std::time::Duration;
use crate::config::BackoffConfig;
use crate::errors::LockResult;
use crate::{interrupt, util};

/// Pause inserted between two attempts of a failed repository call.
pub trait BackoffStrategy: Send + Sync {
    fn next_delay(&self) -> Duration;

    /// Blocks for [`next_delay`](Self::next_delay); returns early with
    /// `LockError::Interrupted` when the thread is interrupted.
    fn sleep(&self) -> LockResult<()> {
        pause(self.next_delay())
    }

    /// Like [`sleep`](Self::sleep), but never longer than `limit`.
    fn sleep_at_most(&self, limit: Duration) -> LockResult<()> {
        pause(self.next_delay().min(limit))
    }
}

fn pause(delay: Duration) -> LockResult<()> {
    if delay.is_zero() {
        interrupt::check()
    } else {
        interrupt::sleep(delay)
    }
}

/// Sleeps a uniformly random duration between `min` and `max` so that
/// competing retriers spread out.
#[derive(Debug, Clone, Copy)]
pub struct RandomBackoff {
    min: Duration,
    max: Duration,
}

impl RandomBackoff {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min: min.min(max),
            max: max.max(min),
        }
    }
}

impl BackoffStrategy for RandomBackoff {
    fn next_delay(&self) -> Duration {
        util::random_between(self.min, self.max)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedBackoff(pub Duration);

impl BackoffStrategy for FixedBackoff {
    fn next_delay(&self) -> Duration {
        self.0
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoBackoff;

impl BackoffStrategy for NoBackoff {
    fn next_delay(&self) -> Duration {
        Duration::ZERO
    }
}

impl BackoffConfig {
    pub fn build(&self) -> Arc<dyn BackoffStrategy> {
        match *self {
            BackoffConfig::None => Arc::new(NoBackoff),
            BackoffConfig::Fixed { delay } => Arc::new(FixedBackoff(delay)),
            BackoffConfig::Random { min, max } => Arc::new(RandomBackoff::new(min, max)),
        }
    }
}
