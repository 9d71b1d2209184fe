//! Poison-recovering lock acquisition.
//!
//! A panicking subscriber callback must not wedge the cache for the rest of
//! the session; a poisoned guard is recovered and the incident logged.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

pub(crate) fn read<'a, T>(lock: &'a RwLock<T>, op: &'static str) -> RwLockReadGuard<'a, T> {
    lock.read().unwrap_or_else(|poisoned: PoisonError<_>| {
        warn!(op, lock_kind = "rwlock.read", "recovered poisoned sync lock");
        poisoned.into_inner()
    })
}

pub(crate) fn write<'a, T>(lock: &'a RwLock<T>, op: &'static str) -> RwLockWriteGuard<'a, T> {
    lock.write().unwrap_or_else(|poisoned: PoisonError<_>| {
        warn!(op, lock_kind = "rwlock.write", "recovered poisoned sync lock");
        poisoned.into_inner()
    })
}
