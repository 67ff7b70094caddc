//! RAII guard for semaphore units

use super::{Semaphore, SyncError};

/// Holds one unit of a [`Semaphore`] and returns it on drop
pub struct SemaphoreGuard<'a> {
    semaphore: &'a Semaphore,
}

impl<'a> SemaphoreGuard<'a> {
    /// Acquire one unit, waiting up to `timeout_ms`
    pub fn acquire(semaphore: &'a Semaphore, timeout_ms: u16) -> Result<Self, SyncError> {
        semaphore.acquire(timeout_ms)?;
        Ok(Self { semaphore })
    }
}

impl Drop for SemaphoreGuard<'_> {
    fn drop(&mut self) {
        self.semaphore.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::WAIT_FOREVER;

    #[test]
    fn test_guard_releases_on_drop() {
        let sem = Semaphore::new(1, 1);
        {
            let _guard = SemaphoreGuard::acquire(&sem, WAIT_FOREVER).unwrap();
            assert_eq!(sem.available_units(), 0);
            assert!(SemaphoreGuard::acquire(&sem, 0).is_err());
        }
        assert_eq!(sem.available_units(), 1);
    }
}
