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
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;
use parking_lot::Mutex;
use tracing::{debug, info};
use crate::errors::LockResult;
use crate::watcher::{SignalBoard, Watcher};

const RECEIVE_TIMEOUT: Duration = Duration::from_millis(50);

/// Watcher fed by a channel of released lock ids.
///
/// Whatever observes releases (a pub/sub subscription, a change stream, the
/// in-memory repository) pushes ids into the [`Sender`] returned by
/// [`ChannelWatcher::new`]; `run` forwards each one to the waiting threads.
pub struct ChannelWatcher {
    board: SignalBoard,
    events: Mutex<Receiver<String>>,
    running: AtomicBool,
    closed: AtomicBool,
}

impl ChannelWatcher {
    pub fn new() -> (Self, Sender<String>) {
        let (tx, rx) = channel();
        let watcher = Self {
            board: SignalBoard::new(),
            events: Mutex::new(rx),
            running: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        };
        (watcher, tx)
    }

    pub fn board(&self) -> &SignalBoard {
        &self.board
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Watcher for ChannelWatcher {
    fn await_signal(&self, lock_id: &str) -> LockResult<()> {
        self.board.await_signal(lock_id)
    }

    fn await_signal_timeout(&self, lock_id: &str, timeout: Duration) -> LockResult<bool> {
        self.board.await_signal_timeout(lock_id, timeout)
    }

    fn signal(&self, lock_id: &str) {
        self.board.signal(lock_id)
    }

    fn is_active(&self) -> bool {
        self.running.load(Ordering::Acquire) && !self.is_closed()
    }

    fn run(&self) {
        if self.is_closed() || self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Release watcher started");

        let events = self.events.lock();
        while !self.is_closed() {
            match events.recv_timeout(RECEIVE_TIMEOUT) {
                Ok(lock_id) => {
                    debug!("Lock {} released, waking waiters", lock_id);
                    self.board.signal(&lock_id);
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!("Release watcher stopped");
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
