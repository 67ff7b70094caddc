//! AML Mutex: an owned, recursive lock with a sync level

use super::{Semaphore, SyncError, MAX_SYNC_LEVEL};
use crate::walk::WalkListId;
use crossbeam::atomic::AtomicCell;
use std::sync::atomic::{AtomicUsize, Ordering};

/// AML Mutex object
///
/// Ownership is tracked per walk list, so the same invocation chain may
/// acquire the mutex recursively. Sync-level ordering is checked by the
/// walk list, which knows every mutex it holds.
pub struct AmlMutex {
    sync_level: u8,

    /// Current owner (None if unlocked)
    owner: AtomicCell<Option<WalkListId>>,

    /// Recursive acquisition depth of the owner
    depth: AtomicUsize,

    lock: Semaphore,
}

impl AmlMutex {
    /// Create an unlocked mutex
    pub fn new(sync_level: u8) -> Result<Self, SyncError> {
        if sync_level > MAX_SYNC_LEVEL {
            return Err(SyncError::InvalidSyncLevel(sync_level));
        }
        Ok(Self {
            sync_level,
            owner: AtomicCell::new(None),
            depth: AtomicUsize::new(0),
            lock: Semaphore::new(1, 1),
        })
    }

    /// Declared sync level
    pub fn sync_level(&self) -> u8 {
        self.sync_level
    }

    /// Acquire for `owner`, waiting up to `timeout_ms`
    ///
    /// Returns `true` when this call took the lock, `false` when it only
    /// deepened an acquisition the owner already held.
    pub fn acquire(&self, owner: WalkListId, timeout_ms: u16) -> Result<bool, SyncError> {
        if self.owner.load() == Some(owner) {
            self.depth.fetch_add(1, Ordering::AcqRel);
            return Ok(false);
        }

        self.lock.acquire(timeout_ms)?;
        self.owner.store(Some(owner));
        self.depth.store(1, Ordering::Release);
        Ok(true)
    }

    /// Release one level of acquisition held by `owner`
    ///
    /// Returns `true` when the mutex became free.
    pub fn release(&self, owner: WalkListId) -> Result<bool, SyncError> {
        if self.owner.load() != Some(owner) {
            return Err(SyncError::NotOwner);
        }

        if self.depth.fetch_sub(1, Ordering::AcqRel) > 1 {
            return Ok(false);
        }

        self.owner.store(None);
        self.lock.release();
        Ok(true)
    }

    /// Release every level held by `owner`
    pub fn force_release(&self, owner: WalkListId) {
        if self.owner.load() == Some(owner) {
            self.depth.store(0, Ordering::Release);
            self.owner.store(None);
            self.lock.release();
        }
    }

    /// Current owner
    pub fn owner(&self) -> Option<WalkListId> {
        self.owner.load()
    }

    /// Whether the mutex is held
    pub fn is_locked(&self) -> bool {
        self.owner.load().is_some()
    }

    /// Recursive acquisition depth
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for AmlMutex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmlMutex")
            .field("sync_level", &self.sync_level)
            .field("owner", &self.owner.load())
            .field("depth", &self.depth())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mutex_creation() {
        let mutex = AmlMutex::new(3).unwrap();
        assert_eq!(mutex.sync_level(), 3);
        assert!(!mutex.is_locked());
        assert!(AmlMutex::new(16).is_err());
    }

    #[test]
    fn test_recursive_acquire() {
        let mutex = AmlMutex::new(0).unwrap();
        let owner = WalkListId::new();

        assert_eq!(mutex.acquire(owner, 0), Ok(true));
        assert_eq!(mutex.acquire(owner, 0), Ok(false));
        assert_eq!(mutex.depth(), 2);

        assert_eq!(mutex.release(owner), Ok(false));
        assert!(mutex.is_locked());
        assert_eq!(mutex.release(owner), Ok(true));
        assert!(!mutex.is_locked());
    }

    #[test]
    fn test_contended_acquire_times_out() {
        let mutex = AmlMutex::new(0).unwrap();
        let first = WalkListId::new();
        let second = WalkListId::new();

        mutex.acquire(first, 0).unwrap();
        assert_eq!(mutex.acquire(second, 0), Err(SyncError::AcquireTimeout));
        assert_eq!(mutex.owner(), Some(first));
    }

    #[test]
    fn test_release_by_non_owner() {
        let mutex = AmlMutex::new(0).unwrap();
        let owner = WalkListId::new();
        assert_eq!(mutex.release(owner), Err(SyncError::NotOwner));

        mutex.acquire(owner, 0).unwrap();
        assert_eq!(mutex.release(WalkListId::new()), Err(SyncError::NotOwner));
    }

    #[test]
    fn test_force_release() {
        let mutex = AmlMutex::new(0).unwrap();
        let owner = WalkListId::new();
        mutex.acquire(owner, 0).unwrap();
        mutex.acquire(owner, 0).unwrap();
        mutex.force_release(owner);
        assert!(!mutex.is_locked());
        assert_eq!(mutex.acquire(WalkListId::new(), 0), Ok(true));
    }
}
