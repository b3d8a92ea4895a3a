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
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use crate::errors::LockResult;
use crate::repository::{await_release_with, sleep_before_retry, LockRepository};
use crate::watcher::{spawn_watcher, ChannelWatcher, Watcher};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockState {
    Locked,
    Unlocked,
}

/// Snapshot of one lock record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockRecord {
    pub id: String,
    pub state: LockState,
    pub locked_at: Option<SystemTime>,
    pub unlocked_at: Option<SystemTime>,
    pub locked_by: Option<String>,
    pub last_heartbeat_at: Option<SystemTime>,
}

impl LockRecord {
    fn unlocked(id: &str) -> Self {
        Self {
            id: id.to_string(),
            state: LockState::Unlocked,
            locked_at: None,
            unlocked_at: None,
            locked_by: None,
            last_heartbeat_at: None,
        }
    }

    fn is_locked_by(&self, instance_id: &str) -> bool {
        self.state == LockState::Locked && self.locked_by.as_deref() == Some(instance_id)
    }

    fn unlock(&mut self, now: SystemTime) {
        self.state = LockState::Unlocked;
        self.unlocked_at = Some(now);
        self.locked_by = None;
    }

    fn heartbeat_age(&self, now: SystemTime) -> Duration {
        self.last_heartbeat_at
            .and_then(|beat| now.duration_since(beat).ok())
            .unwrap_or(Duration::ZERO)
    }
}

/// Repository keeping its records in process memory.
///
/// Every registry sharing one instance behaves like a separate process
/// sharing one backend, which makes it the reference backend for tests.
/// A record locked by an instance is not granted again to that same
/// instance; reentrancy is handled by the lock handles, not the store.
pub struct InMemoryLockRepository {
    records: Mutex<HashMap<String, LockRecord>>,
    watcher: Option<Arc<ChannelWatcher>>,
    releases: Option<Mutex<Sender<String>>>,
    pump: Mutex<Option<JoinHandle<()>>>,
    max_watch_wait: Duration,
}

impl Default for InMemoryLockRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLockRepository {
    pub const DEFAULT_MAX_WATCH_WAIT: Duration = Duration::from_secs(1);

    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            watcher: None,
            releases: None,
            pump: Mutex::new(None),
            max_watch_wait: Self::DEFAULT_MAX_WATCH_WAIT,
        }
    }

    /// A repository that publishes releases to a [`ChannelWatcher`] pumped
    /// on its own thread.
    pub fn watchable() -> LockResult<Self> {
        let (watcher, releases) = ChannelWatcher::new();
        let watcher = Arc::new(watcher);
        let pump = spawn_watcher(watcher.clone(), "distlock-memory-watcher")?;
        Ok(Self {
            records: Mutex::new(HashMap::new()),
            watcher: Some(watcher),
            releases: Some(Mutex::new(releases)),
            pump: Mutex::new(Some(pump)),
            max_watch_wait: Self::DEFAULT_MAX_WATCH_WAIT,
        })
    }

    pub fn with_max_watch_wait(mut self, max_wait: Duration) -> Self {
        self.max_watch_wait = max_wait;
        self
    }

    pub fn watcher(&self) -> Option<Arc<ChannelWatcher>> {
        self.watcher.clone()
    }

    pub fn record(&self, lock_id: &str) -> Option<LockRecord> {
        self.records.lock().get(lock_id).cloned()
    }

    pub fn locked_by(&self, lock_id: &str) -> Option<String> {
        self.records
            .lock()
            .get(lock_id)
            .filter(|record| record.state == LockState::Locked)
            .and_then(|record| record.locked_by.clone())
    }

    /// Stops the watcher pump, if any.
    pub fn close(&self) {
        if let Some(watcher) = &self.watcher {
            watcher.close();
        }
        if let Some(pump) = self.pump.lock().take() {
            let _ = pump.join();
        }
    }

    fn publish_release(&self, lock_id: &str) {
        if let Some(releases) = &self.releases {
            // The pump may already be gone; waiters then fall back to polling.
            let _ = releases.lock().send(lock_id.to_string());
        }
    }
}

impl LockRepository for InMemoryLockRepository {
    fn acquire_lock(&self, lock_id: &str, instance_id: &str) -> LockResult<bool> {
        let mut records = self.records.lock();
        let record = records
            .entry(lock_id.to_string())
            .or_insert_with(|| LockRecord::unlocked(lock_id));
        if record.state == LockState::Locked {
            return Ok(false);
        }

        let now = SystemTime::now();
        record.state = LockState::Locked;
        record.locked_by = Some(instance_id.to_string());
        record.locked_at = Some(now);
        record.last_heartbeat_at = Some(now);
        Ok(true)
    }

    fn release_lock(&self, lock_id: &str, instance_id: &str) -> LockResult<()> {
        let released = {
            let mut records = self.records.lock();
            match records.get_mut(lock_id) {
                Some(record) if record.is_locked_by(instance_id) => {
                    record.unlock(SystemTime::now());
                    true
                }
                _ => false,
            }
        };
        if released {
            self.publish_release(lock_id);
        }
        Ok(())
    }

    fn refresh_active_locks(&self, instance_id: &str) -> LockResult<()> {
        let now = SystemTime::now();
        let mut records = self.records.lock();
        for record in records.values_mut().filter(|record| record.is_locked_by(instance_id)) {
            record.last_heartbeat_at = Some(now);
        }
        Ok(())
    }

    fn release_dead_locks(&self, timeout: Duration) -> LockResult<()> {
        let now = SystemTime::now();
        let mut released = Vec::new();
        {
            let mut records = self.records.lock();
            for record in records.values_mut() {
                if record.state == LockState::Locked && record.heartbeat_age(now) > timeout {
                    debug!(
                        "Releasing dead lock {} held by {:?}",
                        record.id, record.locked_by
                    );
                    record.unlock(now);
                    released.push(record.id.clone());
                }
            }
        }
        for lock_id in released {
            self.publish_release(&lock_id);
        }
        Ok(())
    }

    fn await_release_lock(&self, lock_id: &str, timeout: Option<Duration>) -> LockResult<bool> {
        match &self.watcher {
            Some(watcher) => await_release_with(watcher.as_ref(), lock_id, timeout, self.max_watch_wait),
            None => sleep_before_retry(timeout),
        }
    }

    fn is_watchable(&self) -> bool {
        self.watcher.as_ref().map_or(false, |watcher| watcher.is_active())
    }
}

impl Drop for InMemoryLockRepository {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_acquire_only_from_unlocked() {
        let repository = InMemoryLockRepository::new();
        assert!(repository.acquire_lock("orders", "a").unwrap());
        assert!(!repository.acquire_lock("orders", "b").unwrap());
        assert!(!repository.acquire_lock("orders", "a").unwrap());
        assert_eq!(repository.locked_by("orders").as_deref(), Some("a"));

        let record = repository.record("orders").unwrap();
        assert_eq!(record.state, LockState::Locked);
        assert!(record.locked_at.is_some());
        assert!(record.last_heartbeat_at.is_some());
    }

    #[test]
    fn test_release_is_idempotent_and_owner_checked() {
        let repository = InMemoryLockRepository::new();
        repository.release_lock("missing", "a").unwrap();

        repository.acquire_lock("orders", "a").unwrap();
        repository.release_lock("orders", "b").unwrap();
        assert_eq!(repository.locked_by("orders").as_deref(), Some("a"));

        repository.release_lock("orders", "a").unwrap();
        repository.release_lock("orders", "a").unwrap();
        let record = repository.record("orders").unwrap();
        assert_eq!(record.state, LockState::Unlocked);
        assert!(record.unlocked_at.is_some());
        assert!(repository.acquire_lock("orders", "b").unwrap());
    }

    #[test]
    fn test_refresh_touches_only_own_locks() {
        let repository = InMemoryLockRepository::new();
        repository.acquire_lock("mine", "a").unwrap();
        repository.acquire_lock("theirs", "b").unwrap();
        let before_theirs = repository.record("theirs").unwrap().last_heartbeat_at;
        let before_mine = repository.record("mine").unwrap().last_heartbeat_at;

        thread::sleep(Duration::from_millis(5));
        repository.refresh_active_locks("a").unwrap();

        assert!(repository.record("mine").unwrap().last_heartbeat_at > before_mine);
        assert_eq!(repository.record("theirs").unwrap().last_heartbeat_at, before_theirs);
    }

    #[test]
    fn test_release_dead_locks_by_heartbeat_age() {
        let repository = InMemoryLockRepository::new();
        repository.acquire_lock("stale", "crashed").unwrap();
        thread::sleep(Duration::from_millis(60));
        repository.acquire_lock("fresh", "alive").unwrap();

        repository.release_dead_locks(Duration::from_millis(30)).unwrap();

        assert_eq!(repository.locked_by("stale"), None);
        assert_eq!(repository.locked_by("fresh").as_deref(), Some("alive"));
    }

    #[test]
    fn test_record_serializes() {
        let repository = InMemoryLockRepository::new();
        repository.acquire_lock("orders", "a").unwrap();
        let json = serde_json::to_string(&repository.record("orders").unwrap()).unwrap();
        assert!(json.contains("\"Locked\""));
        let back: LockRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.locked_by.as_deref(), Some("a"));
    }

    #[test]
    fn test_watchable_repository_wakes_waiter_on_release() {
        let repository = Arc::new(InMemoryLockRepository::watchable().unwrap());
        let deadline = Instant::now() + Duration::from_secs(5);
        while !repository.is_watchable() {
            assert!(Instant::now() < deadline);
            thread::sleep(Duration::from_millis(1));
        }
        repository.acquire_lock("orders", "a").unwrap();

        let waiter = {
            let repository = repository.clone();
            thread::spawn(move || {
                let start = Instant::now();
                let signaled = repository.await_release_lock("orders", Some(Duration::from_secs(10))).unwrap();
                (signaled, start.elapsed())
            })
        };
        let watcher = repository.watcher().unwrap();
        while watcher.board().waiting("orders") == 0 {
            assert!(Instant::now() < deadline);
            thread::sleep(Duration::from_millis(1));
        }
        repository.release_lock("orders", "a").unwrap();

        let (signaled, elapsed) = waiter.join().unwrap();
        assert!(signaled);
        assert!(elapsed < InMemoryLockRepository::DEFAULT_MAX_WATCH_WAIT);

        repository.close();
        assert!(!repository.is_watchable());
    }
}
