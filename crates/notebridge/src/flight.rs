//! Single-flight guard.

use std::sync::atomic::{AtomicBool, Ordering};

/// Holds a single-flight flag for as long as it lives.
///
/// Dropping the guard clears the flag, including when the owning future is
/// cancelled.
#[derive(Debug)]
pub(crate) struct FlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> FlightGuard<'a> {
    /// Take the flag, or `None` if it is already held.
    pub(crate) fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        if flag.swap(true, Ordering::AcqRel) {
            None
        } else {
            Some(Self { flag })
        }
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
