//! Lock poisoning helpers
//!
//! Converts poisoned std locks into module errors so callers propagate them
//! with `?` instead of panicking while holding shared engine state.

use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

fn poison_message(kind: &str) -> String {
    format!(
        "Internal synchronisation error ({kind} poisoned). A panic occurred while the lock was held"
    )
}

/// Lock a mutex, mapping poisoning to an application error
///
/// # Examples
/// ```
/// use std::sync::Mutex;
/// use dak_engine::core::sync::lock_mutex;
/// use dak_engine::cache::api::CacheError;
///
/// let mutex = Mutex::new(42);
/// let guard = lock_mutex(&mutex, CacheError::Storage).unwrap();
/// assert_eq!(*guard, 42);
/// ```
pub fn lock_mutex<T, E>(
    mutex: &Mutex<T>,
    error_constructor: impl FnOnce(String) -> E,
) -> Result<MutexGuard<'_, T>, E> {
    mutex
        .lock()
        .map_err(|_| error_constructor(poison_message("mutex")))
}

/// Acquire a read guard, mapping poisoning to an application error
pub fn read_lock<T, E>(
    lock: &RwLock<T>,
    error_constructor: impl FnOnce(String) -> E,
) -> Result<RwLockReadGuard<'_, T>, E> {
    lock.read()
        .map_err(|_| error_constructor(poison_message("RwLock read")))
}

/// Acquire a write guard, mapping poisoning to an application error
pub fn write_lock<T, E>(
    lock: &RwLock<T>,
    error_constructor: impl FnOnce(String) -> E,
) -> Result<RwLockWriteGuard<'_, T>, E> {
    lock.write()
        .map_err(|_| error_constructor(poison_message("RwLock write")))
}
