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
use serde::{Deserialize, Serialize};
use std::time::Duration;
use crate::errors::{ErrorKind, LockError, LockResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Identity written into the lock records; a random UUID when unset
    pub instance_id: Option<String>,
    /// Delay between two heartbeats of the locks held by this instance
    pub refresh_interval: Duration,
    /// Heartbeat age after which any instance may force-release a lock
    pub dead_lock_timeout: Duration,
    /// Delay between two dead-lock reclamation cycles
    pub dead_lock_check_interval: Duration,
    /// Retry policy applied to repository calls
    pub retry: RetryConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            instance_id: None,
            refresh_interval: Duration::from_secs(1),
            dead_lock_timeout: Duration::from_secs(10),
            dead_lock_check_interval: Duration::from_secs(1),
            retry: RetryConfig::default(),
        }
    }
}

impl RegistryConfig {
    pub fn from_json(json: &str) -> LockResult<Self> {
        let config: RegistryConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> LockResult<()> {
        if let Some(id) = &self.instance_id {
            if id.trim().is_empty() {
                return Err(LockError::ConfigError("instance id must not be blank".to_string()));
            }
        }
        if self.refresh_interval.is_zero() {
            return Err(LockError::ConfigError("refresh interval must be positive".to_string()));
        }
        if self.dead_lock_check_interval.is_zero() {
            return Err(LockError::ConfigError("dead lock check interval must be positive".to_string()));
        }
        if self.dead_lock_timeout <= self.refresh_interval {
            return Err(LockError::ConfigError(format!(
                "dead lock timeout {:?} must exceed the refresh interval {:?}",
                self.dead_lock_timeout, self.refresh_interval
            )));
        }
        self.retry.validate()
    }

    pub fn with_instance_id(mut self, instance_id: &str) -> Self {
        self.instance_id = Some(instance_id.to_string());
        self
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn with_dead_lock_timeout(mut self, timeout: Duration) -> Self {
        self.dead_lock_timeout = timeout;
        self
    }

    pub fn with_dead_lock_check_interval(mut self, interval: Duration) -> Self {
        self.dead_lock_check_interval = interval;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

// ================ Retry configuration ================
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts allowed per operation, the first one included
    pub max_attempts: u32,
    pub retryable: Vec<ErrorKind>,
    pub non_retryable: Vec<ErrorKind>,
    pub backoff: BackoffConfig,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retryable: vec![ErrorKind::Io, ErrorKind::TransientDataAccess],
            non_retryable: vec![ErrorKind::NonTransientDataAccess],
            backoff: BackoffConfig::default(),
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> LockResult<()> {
        if self.max_attempts == 0 {
            return Err(LockError::ConfigError("max attempts must be at least 1".to_string()));
        }
        if let BackoffConfig::Random { min, max } = self.backoff {
            if min > max {
                return Err(LockError::ConfigError(format!(
                    "backoff minimum {:?} exceeds maximum {:?}",
                    min, max
                )));
            }
        }
        Ok(())
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_retryable(mut self, kind: ErrorKind) -> Self {
        self.retryable.push(kind);
        self
    }

    pub fn with_non_retryable(mut self, kind: ErrorKind) -> Self {
        self.non_retryable.push(kind);
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BackoffConfig {
    None,
    Fixed { delay: Duration },
    Random { min: Duration, max: Duration },
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::Random {
            min: Duration::from_millis(50),
            max: Duration::from_millis(200),
        }
    }
}
