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
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use parking_lot::RwLock;
use crate::config::RetryConfig;
use crate::errors::{ErrorKind, LockError, LockResult};
use crate::retry::{BackoffStrategy, NoBackoff, RetryContext, Retryer};

/// Retries repository failures according to their [`ErrorKind`].
///
/// Rules are `(kind, retryable)` registrations. A kind is judged over its
/// whole lineage: a non-retryable registration on the kind or any ancestor
/// wins, then a retryable one, then the default. Decisions are cached per
/// kind for every kind of the walked lineage.
pub struct ClassifyingRetryer {
    rules: Vec<(ErrorKind, bool)>,
    default_decision: bool,
    max_attempts: u32,
    backoff: Arc<dyn BackoffStrategy>,
    decisions: RwLock<HashMap<ErrorKind, bool>>,
}

impl ClassifyingRetryer {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            rules: Vec::new(),
            default_decision: false,
            max_attempts: max_attempts.max(1),
            backoff: Arc::new(NoBackoff),
            decisions: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        let mut retryer = Self::new(config.max_attempts).with_backoff(config.backoff.build());
        for kind in &config.retryable {
            retryer = retryer.retry_on(*kind);
        }
        for kind in &config.non_retryable {
            retryer = retryer.never_retry_on(*kind);
        }
        retryer
    }

    pub fn retry_on(mut self, kind: ErrorKind) -> Self {
        self.rules.push((kind, true));
        self.decisions.get_mut().clear();
        self
    }

    pub fn never_retry_on(mut self, kind: ErrorKind) -> Self {
        self.rules.push((kind, false));
        self.decisions.get_mut().clear();
        self
    }

    /// Answer for kinds no rule covers.
    pub fn with_default(mut self, retryable: bool) -> Self {
        self.default_decision = retryable;
        self.decisions.get_mut().clear();
        self
    }

    pub fn with_backoff(mut self, backoff: Arc<dyn BackoffStrategy>) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn classify(&self, kind: ErrorKind) -> bool {
        if let Some(decision) = self.decisions.read().get(&kind) {
            return *decision;
        }

        let lineage = kind.lineage();
        let mut decisions = self.decisions.write();
        let mut allowed = false;
        let mut denied = false;
        let mut decision = self.default_decision;

        // Root first: after visiting a kind, the flags cover exactly its own lineage.
        for step in lineage.iter().rev() {
            for (rule_kind, retryable) in &self.rules {
                if rule_kind == step {
                    if *retryable {
                        allowed = true;
                    } else {
                        denied = true;
                    }
                }
            }
            decision = if denied {
                false
            } else if allowed {
                true
            } else {
                self.default_decision
            };
            decisions.insert(*step, decision);
        }
        decision
    }

    pub fn cached_decision(&self, kind: ErrorKind) -> Option<bool> {
        self.decisions.read().get(&kind).copied()
    }
}

impl Retryer for ClassifyingRetryer {
    fn context(&self) -> RetryContext {
        RetryContext::new(self.max_attempts)
    }

    fn should_retry_for(&self, error: &LockError, context: &mut RetryContext) -> bool {
        context.record_failure(error);
        if context.is_exhausted() {
            return false;
        }
        match error.kind() {
            Some(kind) => self.classify(kind),
            None => false,
        }
    }

    fn sleep(&self, _context: &RetryContext) -> LockResult<()> {
        self.backoff.sleep()
    }

    fn sleep_at_most(&self, _context: &RetryContext, limit: Duration) -> LockResult<()> {
        self.backoff.sleep_at_most(limit)
    }
}
