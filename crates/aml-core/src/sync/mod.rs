//! Synchronization objects of the AML language
//!
//! AML exposes two synchronization types: `Mutex` (owned, recursive, ordered
//! by sync level) and `Event` (a counting semaphore). Both are built on
//! [`Semaphore`], which is also used internally to serialize bank/index
//! register sequences.

mod event;
mod guard;
mod mutex;
mod semaphore;

pub use event::AmlEvent;
pub use guard::SemaphoreGuard;
pub use mutex::AmlMutex;
pub use semaphore::{Semaphore, WAIT_FOREVER};

/// Highest sync level a mutex may declare
pub const MAX_SYNC_LEVEL: u8 = 15;

/// Errors raised by mutexes, events and semaphores
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// Timed out waiting for a unit
    #[error("Acquire timed out")]
    AcquireTimeout,

    /// Release by a walk list that does not hold the mutex
    #[error("Mutex released by non-owner")]
    NotOwner,

    /// Acquire of a mutex below the sync level already held
    #[error("Mutex order violation: sync level {requested} below current level {current}")]
    MutexOrder {
        /// Level of the mutex being acquired
        requested: u8,
        /// Highest level currently held
        current: u8,
    },

    /// Sync level outside of 0..=15
    #[error("Invalid sync level {0}")]
    InvalidSyncLevel(u8),
}
