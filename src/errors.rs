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

use std::error::Error as StdError;
use std::fmt::{Display, Formatter};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type LockResult<T> = std::result::Result<T, LockError>;

pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum LockError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Failed to acquire lock {lock_id} for instance {instance_id}: {source}")]
    CannotAcquire {
        lock_id: String,
        instance_id: String,
        #[source]
        source: Box<LockError>,
    },

    #[error("Failed to release lock {lock_id} for instance {instance_id}: {source}")]
    CannotRelease {
        lock_id: String,
        instance_id: String,
        #[source]
        source: Box<LockError>,
    },

    #[error("Lock {0} is not held by the current thread")]
    NotHeldByCurrentThread(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Thread interrupted")]
    Interrupted,

    #[error("Lock registry has been closed")]
    RegistryClosed,

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Thread Task error: {0}")]
    ThreadError(String),
}

impl LockError {
    pub fn cannot_acquire(lock_id: &str, instance_id: &str, cause: LockError) -> Self {
        LockError::CannotAcquire {
            lock_id: lock_id.to_string(),
            instance_id: instance_id.to_string(),
            source: Box::new(cause),
        }
    }

    pub fn cannot_release(lock_id: &str, instance_id: &str, cause: LockError) -> Self {
        LockError::CannotRelease {
            lock_id: lock_id.to_string(),
            instance_id: instance_id.to_string(),
            source: Box::new(cause),
        }
    }

    /// The backend error kind, if this error came out of a repository call.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            LockError::Repository(e) => Some(e.kind()),
            _ => None,
        }
    }

    pub fn is_interrupted(&self) -> bool {
        match self {
            LockError::Interrupted => true,
            LockError::CannotAcquire { source, .. } | LockError::CannotRelease { source, .. } => {
                source.is_interrupted()
            }
            _ => false,
        }
    }
}

impl From<serde_json::Error> for LockError {
    fn from(err: serde_json::Error) -> Self {
        LockError::ConfigError(err.to_string())
    }
}

/// Stable tag identifying the family a backend failure belongs to.
///
/// Kinds form a tree through [`ErrorKind::parent`]; retry rules registered on
/// a kind apply to every kind below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Backend,
    Io,
    Timeout,
    Connect,
    TransientDataAccess,
    Concurrency,
    QueryTimeout,
    NonTransientDataAccess,
    Integrity,
    BadQuery,
}

impl ErrorKind {
    pub fn parent(self) -> Option<ErrorKind> {
        match self {
            ErrorKind::Backend => None,
            ErrorKind::Io | ErrorKind::TransientDataAccess | ErrorKind::NonTransientDataAccess => {
                Some(ErrorKind::Backend)
            }
            ErrorKind::Timeout | ErrorKind::Connect => Some(ErrorKind::Io),
            ErrorKind::Concurrency | ErrorKind::QueryTimeout => Some(ErrorKind::TransientDataAccess),
            ErrorKind::Integrity | ErrorKind::BadQuery => Some(ErrorKind::NonTransientDataAccess),
        }
    }

    /// This kind followed by its ancestors, most specific first.
    pub fn lineage(self) -> Vec<ErrorKind> {
        let mut chain = vec![self];
        let mut current = self;
        while let Some(parent) = current.parent() {
            chain.push(parent);
            current = parent;
        }
        chain
    }

    pub fn is_a(self, ancestor: ErrorKind) -> bool {
        self.lineage().contains(&ancestor)
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Backend => "backend",
            ErrorKind::Io => "io",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Connect => "connect",
            ErrorKind::TransientDataAccess => "transient data access",
            ErrorKind::Concurrency => "concurrency",
            ErrorKind::QueryTimeout => "query timeout",
            ErrorKind::NonTransientDataAccess => "non-transient data access",
            ErrorKind::Integrity => "integrity",
            ErrorKind::BadQuery => "bad query",
        };
        f.write_str(name)
    }
}

/// A failure reported by a [`LockRepository`](crate::LockRepository).
#[derive(Error, Debug)]
#[error("{kind} failure: {message}")]
pub struct RepositoryError {
    kind: ErrorKind,
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl RepositoryError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(kind: ErrorKind, message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
