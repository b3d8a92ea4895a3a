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

//! Reentrant locks shared by cooperating processes through a common store.
//!
//! A [`DistributedLockRegistry`] hands out [`DistributedLock`] handles. A
//! handle is a reentrant mutex inside the process; its first hold per thread
//! additionally wins the lock record in a [`LockRepository`]. The registry
//! keeps the records of its instance alive with a heartbeat and reclaims the
//! records of instances whose heartbeat stopped.
//!
//! ```
//! use std::sync::Arc;
//! use distlock::{DistributedLockRegistry, InMemoryLockRepository, Lockable, RegistryConfig};
//!
//! let repository = Arc::new(InMemoryLockRepository::new());
//! let registry = DistributedLockRegistry::new(repository, RegistryConfig::default()).unwrap();
//!
//! let lock = registry.get_lock("orders").unwrap();
//! lock.lock().unwrap();
//! assert!(lock.is_held_by_current_process());
//! lock.unlock().unwrap();
//! ```

mod config;
mod errors;
mod util;
mod lock;
mod repository;
mod retry;
mod scheduler;
mod watcher;
pub mod interrupt;

pub use config::*;
pub use errors::*;
pub use util::*;
pub use lock::*;
pub use repository::*;
pub use retry::*;
pub use scheduler::*;
pub use watcher::*;
