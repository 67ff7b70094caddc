//! Walk state
//!
//! A [`WalkState`] is the execution context of one table load or method
//! invocation: operand stack, result frames, scope stack and method frame.
//! A method call pushes a new walk state onto the caller's [`WalkList`]
//! instead of spawning a thread; the list is the whole invocation chain and
//! is the owner identity of every AML mutex the chain holds.

mod frame;
mod scope;
mod stack;

pub use frame::{FrameId, MethodFrame, PseudoSlot, SlotKind, SlotValue, MAX_ARGS, MAX_LOCALS};
pub use scope::{ScopeEntry, ScopeStack};
pub use stack::{
    BoundedStack, ResultStack, MAX_RESULT_FRAMES, OPERAND_STACK_DEPTH, RESULT_FRAME_SIZE,
};

use crate::namespace::{NodeId, OwnerId};
use crate::object::ObjectHandle;
use crate::sync::{AmlMutex, SyncError};
use crate::{AmlError, AmlResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Walk states kept for reuse
const POOL_CAPACITY: usize = 16;

/// Identity of an invocation chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WalkListId(u64);

impl WalkListId {
    /// Allocate a new unique id
    pub fn new() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        WalkListId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw id
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for WalkListId {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Walk state
// ============================================================================

/// Execution context of one table load or method invocation
#[derive(Debug)]
pub struct WalkState {
    /// Owner given to nodes created by this walk
    pub owner: OwnerId,
    /// Method node or table scope the walk started at
    pub origin: NodeId,
    /// Method object being executed (None for table loads)
    pub method: Option<ObjectHandle>,
    /// Operands of the operator being executed
    pub operands: BoundedStack<ObjectHandle>,
    /// Intermediate results of nested operators
    pub results: ResultStack,
    /// Open scopes
    pub scopes: ScopeStack,
    /// Locals and Args
    pub frame: MethodFrame,
    /// Value of the last `Return`
    pub return_value: Option<ObjectHandle>,
}

impl WalkState {
    /// Fresh walk state: slots unset, one result frame, `origin` as scope
    pub fn new(
        owner: OwnerId,
        origin: NodeId,
        method: Option<ObjectHandle>,
        slack_uninitialized: bool,
    ) -> Self {
        let mut scopes = ScopeStack::new();
        scopes.push(origin, crate::object::ObjectType::LocalScope);
        Self {
            owner,
            origin,
            method,
            operands: BoundedStack::with_capacity(OPERAND_STACK_DEPTH),
            results: ResultStack::new(),
            scopes,
            frame: MethodFrame::new(slack_uninitialized),
            return_value: None,
        }
    }

    /// Scope relative names currently resolve against
    pub fn current_scope(&self) -> NodeId {
        self.scopes.current_node_or(self.origin)
    }

    /// Identity of the method frame
    pub fn frame_id(&self) -> FrameId {
        self.frame.id()
    }

    /// Release every held reference: operands, results, scopes and slots
    pub fn teardown(&mut self) {
        self.operands.clear();
        self.results.clear();
        self.scopes.clear();
        self.frame.clear();
        self.method = None;
        self.return_value = None;
    }

    fn reinit(
        &mut self,
        owner: OwnerId,
        origin: NodeId,
        method: Option<ObjectHandle>,
        slack_uninitialized: bool,
    ) {
        self.teardown();
        self.owner = owner;
        self.origin = origin;
        self.method = method;
        self.scopes.push(origin, crate::object::ObjectType::LocalScope);
        self.frame.reset(slack_uninitialized);
    }
}

/// Free pool of torn-down walk states
#[derive(Debug, Default)]
pub struct WalkStatePool {
    free: Vec<WalkState>,
}

impl WalkStatePool {
    /// Empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// A ready walk state, reused from the pool when possible
    pub fn acquire(
        &mut self,
        owner: OwnerId,
        origin: NodeId,
        method: Option<ObjectHandle>,
        slack_uninitialized: bool,
    ) -> WalkState {
        match self.free.pop() {
            Some(mut state) => {
                state.reinit(owner, origin, method, slack_uninitialized);
                state
            }
            None => WalkState::new(owner, origin, method, slack_uninitialized),
        }
    }

    /// Tear a walk state down and keep it for reuse
    pub fn release(&mut self, mut state: WalkState) {
        state.teardown();
        if self.free.len() < POOL_CAPACITY {
            self.free.push(state);
        }
    }

    /// Number of pooled states
    pub fn len(&self) -> usize {
        self.free.len()
    }

    /// Whether the pool is empty
    pub fn is_empty(&self) -> bool {
        self.free.is_empty()
    }
}

// ============================================================================
// Walk list
// ============================================================================

/// Invocation chain: the walk states of nested method calls
#[derive(Debug)]
pub struct WalkList {
    id: WalkListId,
    states: Vec<WalkState>,
    held: Vec<Arc<AmlMutex>>,
}

impl WalkList {
    /// Empty chain with a new identity
    pub fn new() -> Self {
        Self {
            id: WalkListId::new(),
            states: Vec::new(),
            held: Vec::new(),
        }
    }

    /// Owner identity for mutexes
    pub fn id(&self) -> WalkListId {
        self.id
    }

    /// Number of walk states in the chain
    pub fn depth(&self) -> usize {
        self.states.len()
    }

    /// Innermost walk state
    pub fn current(&self) -> AmlResult<&WalkState> {
        self.states
            .last()
            .ok_or_else(|| AmlError::InternalInconsistency("empty walk list".to_string()))
    }

    /// Innermost walk state, mutably
    pub fn current_mut(&mut self) -> AmlResult<&mut WalkState> {
        self.states
            .last_mut()
            .ok_or_else(|| AmlError::InternalInconsistency("empty walk list".to_string()))
    }

    /// Enter a nested invocation
    pub fn push(&mut self, state: WalkState) {
        self.states.push(state);
    }

    /// Leave the innermost invocation
    pub fn pop(&mut self) -> Option<WalkState> {
        self.states.pop()
    }

    /// Method frame with the given identity, anywhere in the chain
    pub fn find_frame(&self, id: FrameId) -> Option<&MethodFrame> {
        self.states
            .iter()
            .rev()
            .map(|state| &state.frame)
            .find(|frame| frame.id() == id)
    }

    /// Method frame with the given identity, mutably
    pub fn find_frame_mut(&mut self, id: FrameId) -> Option<&mut MethodFrame> {
        self.states
            .iter_mut()
            .rev()
            .map(|state| &mut state.frame)
            .find(|frame| frame.id() == id)
    }

    // ========================================================================
    // Mutexes
    // ========================================================================

    /// Highest sync level among held mutexes
    pub fn current_sync_level(&self) -> Option<u8> {
        self.held.iter().map(|mutex| mutex.sync_level()).max()
    }

    /// Number of distinct mutexes held
    pub fn held_count(&self) -> usize {
        self.held.len()
    }

    /// Acquire an AML mutex for this chain
    ///
    /// Returns `false` on timeout.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::MutexOrder` when the mutex's sync level is below
    /// the highest level already held.
    pub fn acquire_mutex(&mut self, mutex: &Arc<AmlMutex>, timeout_ms: u16) -> AmlResult<bool> {
        if mutex.owner() != Some(self.id) {
            if let Some(current) = self.current_sync_level() {
                if mutex.sync_level() < current {
                    return Err(SyncError::MutexOrder {
                        requested: mutex.sync_level(),
                        current,
                    }
                    .into());
                }
            }
        }

        match mutex.acquire(self.id, timeout_ms) {
            Ok(true) => {
                self.held.push(Arc::clone(mutex));
                Ok(true)
            }
            Ok(false) => Ok(true),
            Err(SyncError::AcquireTimeout) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Release one acquisition of an AML mutex
    pub fn release_mutex(&mut self, mutex: &Arc<AmlMutex>) -> AmlResult<()> {
        if mutex.release(self.id)? {
            if let Some(pos) = self.held.iter().rposition(|held| Arc::ptr_eq(held, mutex)) {
                self.held.remove(pos);
            }
        }
        Ok(())
    }

    /// Release every mutex the chain still holds
    pub fn release_all(&mut self) {
        for mutex in self.held.drain(..).rev() {
            log::debug!("releasing mutex held at exit (sync level {})", mutex.sync_level());
            mutex.force_release(self.id);
        }
    }
}

impl Default for WalkList {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> NodeId {
        NodeId::from_raw(0, 0)
    }

    #[test]
    fn test_new_state_has_origin_scope() {
        let state = WalkState::new(OwnerId::new(3), origin(), None, false);
        assert_eq!(state.current_scope(), origin());
        assert!(state.operands.is_empty());
        assert_eq!(state.results.frame_count(), 1);
    }

    #[test]
    fn test_pool_reuse_renews_frame() {
        let mut pool = WalkStatePool::new();
        let mut state = pool.acquire(OwnerId::new(1), origin(), None, false);
        let object = ObjectHandle::integer(1);
        state.frame.set_value(SlotKind::Local, 0, object.clone()).unwrap();
        state.operands.push(object.clone()).unwrap();
        let old_frame = state.frame_id();

        pool.release(state);
        assert_eq!(object.ref_count(), 1);
        assert_eq!(pool.len(), 1);

        let state = pool.acquire(OwnerId::new(2), origin(), None, false);
        assert!(pool.is_empty());
        assert_ne!(state.frame_id(), old_frame);
        assert!(state.frame.get_node(SlotKind::Local, 0).unwrap().is_unset());
        assert_eq!(state.owner, OwnerId::new(2));
    }

    #[test]
    fn test_find_frame_across_chain() {
        let mut list = WalkList::new();
        list.push(WalkState::new(OwnerId::new(1), origin(), None, false));
        let outer = list.current().unwrap().frame_id();
        list.push(WalkState::new(OwnerId::new(2), origin(), None, false));

        assert_eq!(list.depth(), 2);
        assert!(list.find_frame(outer).is_some());
        list.pop();
        list.pop();
        assert!(list.find_frame(outer).is_none());
        assert!(list.current().is_err());
    }

    #[test]
    fn test_mutex_ordering() {
        let mut list = WalkList::new();
        let high = Arc::new(AmlMutex::new(5).unwrap());
        let low = Arc::new(AmlMutex::new(2).unwrap());

        assert!(list.acquire_mutex(&high, 0).unwrap());
        assert_eq!(
            list.acquire_mutex(&low, 0),
            Err(AmlError::Sync(SyncError::MutexOrder { requested: 2, current: 5 }))
        );

        // Recursive acquisition is allowed and counted once
        assert!(list.acquire_mutex(&high, 0).unwrap());
        assert_eq!(list.held_count(), 1);
        list.release_mutex(&high).unwrap();
        assert!(high.is_locked());
        list.release_mutex(&high).unwrap();
        assert!(!high.is_locked());
        assert_eq!(list.held_count(), 0);
    }

    #[test]
    fn test_acquire_timeout_and_release_all() {
        let mut first = WalkList::new();
        let mut second = WalkList::new();
        let mutex = Arc::new(AmlMutex::new(0).unwrap());

        assert!(first.acquire_mutex(&mutex, 0).unwrap());
        assert!(!second.acquire_mutex(&mutex, 0).unwrap());
        assert!(matches!(
            second.release_mutex(&mutex),
            Err(AmlError::Sync(SyncError::NotOwner))
        ));

        first.release_all();
        assert!(!mutex.is_locked());
        assert!(second.acquire_mutex(&mutex, 0).unwrap());
    }
}
