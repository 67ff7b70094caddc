//! AML Event: a counting semaphore with Signal/Wait/Reset

use super::Semaphore;

/// AML Event object
#[derive(Debug)]
pub struct AmlEvent {
    units: Semaphore,
}

impl AmlEvent {
    /// Create an event with no pending signals
    pub fn new() -> Self {
        Self {
            units: Semaphore::new(0, u32::MAX),
        }
    }

    /// Add one pending unit
    pub fn signal(&self) {
        self.units.release();
    }

    /// Consume one unit; `false` on timeout
    pub fn wait(&self, timeout_ms: u16) -> bool {
        self.units.acquire(timeout_ms).is_ok()
    }

    /// Clear pending units
    pub fn reset(&self) {
        self.units.reset();
    }

    /// Pending units
    pub fn pending(&self) -> u32 {
        self.units.available_units()
    }
}

impl Default for AmlEvent {
    fn default() -> Self {
        Self::new()
    }
}
