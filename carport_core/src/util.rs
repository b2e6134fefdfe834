//! Small shared helpers.
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Lock, recovering the data if a previous holder panicked.
///
/// Door state stays usable after a panicking request; the cached values are
/// plain data with no cross-field invariants.
#[inline]
pub fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Whole milliseconds of `d`, saturating at `u64::MAX`.
#[inline]
pub fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
