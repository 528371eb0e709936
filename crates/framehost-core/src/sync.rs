//! Lock helpers shared by the registries.
//!
//! Every structure guarded here stays valid after a panic mid-operation
//! (appends and removals are single `Vec` operations), so a poisoned lock
//! is recovered instead of propagated.

use std::sync::{Mutex, MutexGuard, PoisonError};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
