//! Counting semaphore with millisecond timeouts

use super::SyncError;
use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Timeout value meaning "wait until a unit is available"
pub const WAIT_FOREVER: u16 = 0xFFFF;

/// Counting semaphore
///
/// Units are capped at `max_units`; releasing past the cap is silently
/// clamped.
pub struct Semaphore {
    units: Mutex<u32>,
    max_units: u32,
    available: Condvar,
}

impl Semaphore {
    /// Create a semaphore holding `initial` units
    pub fn new(initial: u32, max_units: u32) -> Self {
        Self {
            units: Mutex::new(initial.min(max_units)),
            max_units,
            available: Condvar::new(),
        }
    }

    /// Take one unit, waiting up to `timeout_ms` milliseconds
    ///
    /// A timeout of [`WAIT_FOREVER`] never expires; a timeout of zero only
    /// polls.
    pub fn acquire(&self, timeout_ms: u16) -> Result<(), SyncError> {
        let mut units = self.units.lock();

        if timeout_ms == WAIT_FOREVER {
            while *units == 0 {
                self.available.wait(&mut units);
            }
        } else {
            let deadline = Instant::now() + Duration::from_millis(u64::from(timeout_ms));
            while *units == 0 {
                if self.available.wait_until(&mut units, deadline).timed_out() && *units == 0 {
                    return Err(SyncError::AcquireTimeout);
                }
            }
        }

        *units -= 1;
        Ok(())
    }

    /// Take one unit without waiting
    pub fn try_acquire(&self) -> bool {
        let mut units = self.units.lock();
        if *units == 0 {
            return false;
        }
        *units -= 1;
        true
    }

    /// Return one unit and wake a waiter
    pub fn release(&self) {
        let mut units = self.units.lock();
        if *units < self.max_units {
            *units += 1;
        }
        drop(units);
        self.available.notify_one();
    }

    /// Drop all pending units
    pub fn reset(&self) {
        *self.units.lock() = 0;
    }

    /// Currently available units
    pub fn available_units(&self) -> u32 {
        *self.units.lock()
    }

    /// Maximum number of units
    pub fn max_units(&self) -> u32 {
        self.max_units
    }
}

impl std::fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Semaphore")
            .field("units", &self.available_units())
            .field("max_units", &self.max_units)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_acquire_release() {
        let sem = Semaphore::new(1, 1);
        assert!(sem.acquire(0).is_ok());
        assert_eq!(sem.available_units(), 0);
        sem.release();
        assert_eq!(sem.available_units(), 1);
    }

    #[test]
    fn test_poll_times_out() {
        let sem = Semaphore::new(0, 1);
        assert_eq!(sem.acquire(0), Err(SyncError::AcquireTimeout));
        assert_eq!(sem.acquire(5), Err(SyncError::AcquireTimeout));
        assert!(!sem.try_acquire());
    }

    #[test]
    fn test_release_is_capped() {
        let sem = Semaphore::new(0, 2);
        sem.release();
        sem.release();
        sem.release();
        assert_eq!(sem.available_units(), 2);
        sem.reset();
        assert_eq!(sem.available_units(), 0);
    }

    #[test]
    fn test_wait_forever_wakes_on_release() {
        let sem = Arc::new(Semaphore::new(0, 1));
        let waiter = {
            let sem = sem.clone();
            thread::spawn(move || sem.acquire(WAIT_FOREVER))
        };

        thread::sleep(Duration::from_millis(10));
        sem.release();
        assert!(waiter.join().unwrap().is_ok());
    }
}
