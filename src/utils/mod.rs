//! The `utils` module provides shared definitions used across the
//! `popsub-connector` crate: the error type and logging setup.

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod error;
pub mod logging;

pub use error::{ConnectorError, Result};

/// Locks `mutex`, recovering the guard if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
