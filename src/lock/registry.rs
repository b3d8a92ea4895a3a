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
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use parking_lot::Mutex;
use tracing::info;
use crate::config::RegistryConfig;
use crate::errors::{LockError, LockResult};
use crate::lock::DistributedLock;
use crate::repository::LockRepository;
use crate::retry::{ClassifyingRetryer, Retryer, RetryerFactory};
use crate::scheduler::{ScheduledTask, Scheduler};
use crate::util::new_instance_id;

pub(crate) struct RegistryShared {
    instance_id: String,
    config: RegistryConfig,
    repository: Arc<dyn LockRepository>,
    retryer_factory: RetryerFactory,
    scheduler: Scheduler,
    locks: Mutex<HashMap<String, DistributedLock>>,
    tasks: Mutex<Vec<ScheduledTask>>,
    started: AtomicBool,
    closed: AtomicBool,
}

impl RegistryShared {
    /// Drops the cached handle of `lock` when nothing uses it anymore.
    pub(crate) fn evict_if_unused(&self, lock: &DistributedLock) {
        let mut locks = self.locks.lock();
        let unused = locks
            .get(lock.id())
            .map_or(false, |cached| cached.same_handle(lock) && lock.is_unused());
        if unused {
            locks.remove(lock.id());
        }
    }

    fn ensure_started(&self) -> LockResult<()> {
        if self.started.load(Ordering::SeqCst) {
            return Ok(());
        }
        let mut tasks = self.tasks.lock();
        if self.closed.load(Ordering::SeqCst) {
            return Err(LockError::RegistryClosed);
        }
        if self.started.load(Ordering::SeqCst) {
            return Ok(());
        }

        let repository = self.repository.clone();
        let instance_id = self.instance_id.clone();
        let heartbeat = self.scheduler.schedule_with_fixed_delay(
            "heartbeat",
            self.config.refresh_interval,
            self.config.refresh_interval,
            move || repository.refresh_active_locks(&instance_id),
        )?;

        let repository = self.repository.clone();
        let dead_lock_timeout = self.config.dead_lock_timeout;
        let reclaimer = self.scheduler.schedule_with_fixed_delay(
            "dead-locks",
            self.config.dead_lock_check_interval,
            self.config.dead_lock_check_interval,
            move || repository.release_dead_locks(dead_lock_timeout),
        )?;

        tasks.push(heartbeat);
        tasks.push(reclaimer);
        self.started.store(true, Ordering::SeqCst);
        info!(
            "Lock registry {} started background tasks (refresh every {:?}, dead lock timeout {:?})",
            self.instance_id, self.config.refresh_interval, self.config.dead_lock_timeout
        );
        Ok(())
    }
}

/// Hands out [`DistributedLock`] handles backed by one [`LockRepository`].
///
/// A registry is one participant: every lock it hands out is recorded in the
/// backend under its instance id. While it lives, a heartbeat keeps those
/// records fresh and a reclaimer force-releases records of any participant
/// whose heartbeat stopped for longer than the dead lock timeout. Both start
/// with the first [`get_lock`](Self::get_lock).
pub struct DistributedLockRegistry {
    shared: Arc<RegistryShared>,
}

impl DistributedLockRegistry {
    pub fn new(repository: Arc<dyn LockRepository>, config: RegistryConfig) -> LockResult<Self> {
        let retry = config.retry.clone();
        let factory: RetryerFactory =
            Arc::new(move || Box::new(ClassifyingRetryer::from_config(&retry)) as Box<dyn Retryer>);
        Self::with_retryer_factory(repository, config, factory)
    }

    /// Same as [`new`](Self::new) with a custom retry policy for repository calls.
    pub fn with_retryer_factory(
        repository: Arc<dyn LockRepository>,
        config: RegistryConfig,
        retryer_factory: RetryerFactory,
    ) -> LockResult<Self> {
        config.validate()?;
        let instance_id = config.instance_id.clone().unwrap_or_else(new_instance_id);
        Ok(Self {
            shared: Arc::new(RegistryShared {
                scheduler: Scheduler::new(&format!("distlock-{}", short_id(&instance_id))),
                instance_id,
                config,
                repository,
                retryer_factory,
                locks: Mutex::new(HashMap::new()),
                tasks: Mutex::new(Vec::new()),
                started: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// The handle for `lock_id`, created on first use.
    pub fn get_lock(&self, lock_id: &str) -> LockResult<DistributedLock> {
        if self.is_closed() {
            return Err(LockError::RegistryClosed);
        }
        self.shared.ensure_started()?;

        let shared = &self.shared;
        let mut locks = shared.locks.lock();
        let lock = locks
            .entry(lock_id.to_string())
            .or_insert_with(|| {
                DistributedLock::new(
                    lock_id,
                    &shared.instance_id,
                    shared.repository.clone(),
                    shared.retryer_factory.clone(),
                    Arc::downgrade(shared),
                )
            })
            .clone();
        Ok(lock)
    }

    pub fn instance_id(&self) -> &str {
        &self.shared.instance_id
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.shared.config
    }

    /// Handles currently cached
    pub fn cached_lock_count(&self) -> usize {
        self.shared.locks.lock().len()
    }

    /// Stops the heartbeat and the reclaimer. Locks still held stay held in
    /// the backend until another participant reclaims them.
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let tasks = std::mem::take(&mut *self.shared.tasks.lock());
        for task in &tasks {
            task.cancel();
        }
        info!("Lock registry {} closed", self.shared.instance_id);
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

impl Drop for DistributedLockRegistry {
    fn drop(&mut self) {
        self.close();
    }
}

fn short_id(instance_id: &str) -> &str {
    match instance_id.char_indices().nth(8) {
        Some((end, _)) => &instance_id[..end],
        None => instance_id,
    }
}
