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
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use parking_lot::{Condvar, Mutex};
use tracing::{error, warn};
use crate::errors::{LockError, LockResult};

#[derive(Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    cond: Condvar,
}

impl StopSignal {
    /// Waits `delay` or until stopped; returns whether it was stopped.
    fn wait(&self, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;
        let mut stopped = self.stopped.lock();
        while !*stopped {
            if self.cond.wait_until(&mut stopped, deadline).timed_out() {
                break;
            }
        }
        *stopped
    }

    fn stop(&self) -> bool {
        let mut stopped = self.stopped.lock();
        let first = !*stopped;
        *stopped = true;
        self.cond.notify_all();
        first
    }

    fn is_stopped(&self) -> bool {
        *self.stopped.lock()
    }
}

/// Spawns named threads running fixed-delay tasks.
pub struct Scheduler {
    thread_prefix: String,
    spawned: AtomicUsize,
}

impl Scheduler {
    pub fn new(thread_prefix: &str) -> Self {
        Self {
            thread_prefix: thread_prefix.to_string(),
            spawned: AtomicUsize::new(0),
        }
    }

    /// Runs `task` after `initial_delay`, then again `delay` after each run
    /// finishes, until the returned handle is cancelled or dropped. Errors and
    /// panics of a run are logged; they never end the schedule.
    pub fn schedule_with_fixed_delay<F>(
        &self,
        name: &str,
        initial_delay: Duration,
        delay: Duration,
        mut task: F,
    ) -> LockResult<ScheduledTask>
    where
        F: FnMut() -> LockResult<()> + Send + 'static,
    {
        let stop = Arc::new(StopSignal::default());
        let runs = Arc::new(AtomicU64::new(0));
        let thread_name = format!(
            "{}-{}-{}",
            self.thread_prefix,
            name,
            self.spawned.fetch_add(1, Ordering::Relaxed)
        );

        let task_name = name.to_string();
        let task_stop = stop.clone();
        let task_runs = runs.clone();
        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                if task_stop.wait(initial_delay) {
                    return;
                }
                loop {
                    match catch_unwind(AssertUnwindSafe(&mut task)) {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => warn!("Scheduled task {} failed: {}", task_name, e),
                        Err(_) => error!("Scheduled task {} panicked", task_name),
                    }
                    task_runs.fetch_add(1, Ordering::SeqCst);
                    if task_stop.wait(delay) {
                        break;
                    }
                }
            })
            .map_err(|e| LockError::ThreadError(format!("failed to spawn {}: {}", thread_name, e)))?;

        Ok(ScheduledTask {
            name: name.to_string(),
            stop,
            runs,
            handle: Mutex::new(Some(handle)),
        })
    }
}

/// Handle to a running fixed-delay task; cancelling is idempotent.
pub struct ScheduledTask {
    name: String,
    stop: Arc<StopSignal>,
    runs: Arc<AtomicU64>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl ScheduledTask {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Completed runs, failed ones included.
    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.stop.is_stopped()
    }

    /// Stops the task and waits for an in-flight run to finish. Returns
    /// whether this call did the cancelling.
    pub fn cancel(&self) -> bool {
        let first = self.stop.stop();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            // A task cancelling itself cannot wait for its own thread.
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
        first
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.cancel();
    }
}
