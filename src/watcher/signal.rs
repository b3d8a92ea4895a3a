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
use std::time::{Duration, Instant};
use parking_lot::{Condvar, Mutex};
use crate::errors::LockResult;
use crate::interrupt;

#[derive(Default)]
struct SlotState {
    generation: u64,
    waiting: usize,
}

#[derive(Default)]
struct Slot {
    state: Mutex<SlotState>,
    cond: Condvar,
}

/// Per-lock-id waiting room shared by watcher implementations.
///
/// A signal bumps the generation of the id's slot, which releases every
/// thread that entered before it. Slots only exist while someone waits.
#[derive(Default)]
pub struct SignalBoard {
    // Lock order: `slots` before any slot state.
    slots: Mutex<HashMap<String, Arc<Slot>>>,
}

impl SignalBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn await_signal(&self, lock_id: &str) -> LockResult<()> {
        self.wait(lock_id, None).map(|_| ())
    }

    pub fn await_signal_timeout(&self, lock_id: &str, timeout: Duration) -> LockResult<bool> {
        self.wait(lock_id, Some(Instant::now() + timeout))
    }

    pub fn signal(&self, lock_id: &str) {
        let slots = self.slots.lock();
        if let Some(slot) = slots.get(lock_id) {
            let mut state = slot.state.lock();
            if state.waiting > 0 {
                state.generation = state.generation.wrapping_add(1);
                slot.cond.notify_all();
            }
        }
    }

    /// Threads currently parked on `lock_id`.
    pub fn waiting(&self, lock_id: &str) -> usize {
        self.slots
            .lock()
            .get(lock_id)
            .map(|slot| slot.state.lock().waiting)
            .unwrap_or(0)
    }

    fn wait(&self, lock_id: &str, deadline: Option<Instant>) -> LockResult<bool> {
        let (slot, generation) = {
            let mut slots = self.slots.lock();
            let slot = slots.entry(lock_id.to_string()).or_default().clone();
            let mut state = slot.state.lock();
            state.waiting += 1;
            let generation = state.generation;
            drop(state);
            (slot, generation)
        };

        let outcome = {
            let mut state = slot.state.lock();
            loop {
                if state.generation != generation {
                    break Ok(true);
                }
                if let Some(deadline) = deadline {
                    if Instant::now() >= deadline {
                        break Ok(false);
                    }
                }
                if let Err(e) = interrupt::wait_slice(&slot.cond, &mut state, deadline) {
                    break Err(e);
                }
            }
        };

        let mut slots = self.slots.lock();
        let mut state = slot.state.lock();
        state.waiting -= 1;
        if state.waiting == 0 {
            drop(state);
            if slots.get(lock_id).map_or(false, |current| Arc::ptr_eq(current, &slot)) {
                slots.remove(lock_id);
            }
        }
        outcome
    }
}
