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
mod backoff;
mod classifier;

pub use backoff::*;
pub use classifier::*;

use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use crate::errors::{ErrorKind, LockError, LockResult};

/// Creates a fresh retryer for every acquisition or release sequence.
pub type RetryerFactory = Arc<dyn Fn() -> Box<dyn Retryer> + Send + Sync>;

/// Progress of one retried operation.
#[derive(Debug, Clone)]
pub struct RetryContext {
    attempts: u32,
    max_attempts: u32,
    last_kind: Option<ErrorKind>,
}

impl RetryContext {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempts: 0,
            max_attempts,
            last_kind: None,
        }
    }

    /// Failed attempts recorded so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn last_kind(&self) -> Option<ErrorKind> {
        self.last_kind
    }

    /// True once no further attempt is allowed, whatever the error.
    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    pub fn record_failure(&mut self, error: &LockError) {
        self.attempts = self.attempts.saturating_add(1);
        self.last_kind = error.kind();
    }
}

/// Decides whether a failed repository call is worth another attempt.
pub trait Retryer: Send + Sync {
    fn context(&self) -> RetryContext;

    /// Records `error` against `context` and answers whether to try again.
    fn should_retry_for(&self, error: &LockError, context: &mut RetryContext) -> bool;

    /// Pause before the next attempt.
    fn sleep(&self, context: &RetryContext) -> LockResult<()>;

    /// Pause before the next attempt, never longer than `limit`.
    fn sleep_at_most(&self, context: &RetryContext, limit: Duration) -> LockResult<()>;
}

/// Never retries and never sleeps.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverRetry;

impl Retryer for NeverRetry {
    fn context(&self) -> RetryContext {
        RetryContext::new(1)
    }

    fn should_retry_for(&self, error: &LockError, context: &mut RetryContext) -> bool {
        context.record_failure(error);
        false
    }

    fn sleep(&self, _context: &RetryContext) -> LockResult<()> {
        Ok(())
    }

    fn sleep_at_most(&self, _context: &RetryContext, _limit: Duration) -> LockResult<()> {
        Ok(())
    }
}

/// Runs `task` until it succeeds or `retryer` gives up, returning the last error.
pub fn apply<T, F>(retryer: &dyn Retryer, task: F) -> LockResult<T>
where
    F: FnMut() -> LockResult<T>,
{
    apply_with_recovery(retryer, task, None::<fn(LockError) -> LockResult<T>>)
}

/// Like [`apply`], but hands the final error to `recovery` when one is given.
pub fn apply_with_recovery<T, F, R>(retryer: &dyn Retryer, mut task: F, recovery: Option<R>) -> LockResult<T>
where
    F: FnMut() -> LockResult<T>,
    R: FnOnce(LockError) -> LockResult<T>,
{
    let mut context = retryer.context();
    loop {
        let error = match task() {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        if retryer.should_retry_for(&error, &mut context) {
            warn!(
                attempt = context.attempts(),
                max_attempts = context.max_attempts(),
                "Retrying after failure: {}",
                error
            );
            retryer.sleep(&context)?;
            continue;
        }

        return match recovery {
            Some(recovery) => recovery(error),
            None => Err(error),
        };
    }
}
