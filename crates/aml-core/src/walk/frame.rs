//! Method frame: the Local and Arg pseudo-slots of one invocation

use crate::namespace::NodeId;
use crate::object::{ObjectHandle, ObjectType};
use crate::{AmlError, AmlResult};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Locals per invocation
pub const MAX_LOCALS: usize = 8;

/// Arguments per invocation
pub const MAX_ARGS: usize = 7;

/// Identity of one method frame
///
/// Every walk state taken from the pool gets a fresh id, so references to
/// the slots of a finished invocation never reach a later one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(u64);

impl FrameId {
    /// Allocate a new unique id
    pub fn new() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        FrameId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw id
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for FrameId {
    fn default() -> Self {
        Self::new()
    }
}

/// Which pseudo-slot table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    /// `Local0`..`Local7`
    Local,
    /// `Arg0`..`Arg6`
    Arg,
}

impl SlotKind {
    /// Size of the table
    pub const fn capacity(self) -> usize {
        match self {
            SlotKind::Local => MAX_LOCALS,
            SlotKind::Arg => MAX_ARGS,
        }
    }
}

impl fmt::Display for SlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotKind::Local => f.write_str("Local"),
            SlotKind::Arg => f.write_str("Arg"),
        }
    }
}

/// Contents of a pseudo-slot
#[derive(Debug, Clone, Default)]
pub enum SlotValue {
    /// Never written
    #[default]
    Unset,
    /// Holds one reference to an object
    Object(ObjectHandle),
    /// Designates a namespace node (an argument passed by name)
    Node(NodeId),
}

/// One Local or Arg
#[derive(Debug, Clone, Default)]
pub struct PseudoSlot {
    /// Type of the current occupant (`Any` when unset)
    pub ty: ObjectType,
    /// Occupant
    pub value: SlotValue,
}

impl PseudoSlot {
    /// Whether the slot was never written
    pub fn is_unset(&self) -> bool {
        matches!(self.value, SlotValue::Unset)
    }
}

/// Locals and Args of one invocation
#[derive(Debug)]
pub struct MethodFrame {
    id: FrameId,
    locals: [PseudoSlot; MAX_LOCALS],
    args: [PseudoSlot; MAX_ARGS],
    slack_uninitialized: bool,
}

impl MethodFrame {
    /// Frame with every slot unset
    pub fn new(slack_uninitialized: bool) -> Self {
        Self {
            id: FrameId::new(),
            locals: Default::default(),
            args: Default::default(),
            slack_uninitialized,
        }
    }

    /// Identity of this frame
    pub fn id(&self) -> FrameId {
        self.id
    }

    /// Unset every slot and take a new identity
    pub fn reset(&mut self, slack_uninitialized: bool) {
        self.clear();
        self.id = FrameId::new();
        self.slack_uninitialized = slack_uninitialized;
    }

    /// Unset every slot, dropping the references they held
    pub fn clear(&mut self) {
        for slot in self.locals.iter_mut().chain(self.args.iter_mut()) {
            *slot = PseudoSlot::default();
        }
    }

    /// Pseudo-slot by kind and index
    ///
    /// # Errors
    ///
    /// Returns `AmlError::InvalidIndex` if `index` is outside the table.
    pub fn get_node(&self, kind: SlotKind, index: usize) -> AmlResult<&PseudoSlot> {
        let table: &[PseudoSlot] = match kind {
            SlotKind::Local => &self.locals,
            SlotKind::Arg => &self.args,
        };
        table.get(index).ok_or(AmlError::InvalidIndex { kind, index })
    }

    fn get_node_mut(&mut self, kind: SlotKind, index: usize) -> AmlResult<&mut PseudoSlot> {
        let table: &mut [PseudoSlot] = match kind {
            SlotKind::Local => &mut self.locals,
            SlotKind::Arg => &mut self.args,
        };
        table.get_mut(index).ok_or(AmlError::InvalidIndex { kind, index })
    }

    /// Occupant of a slot
    ///
    /// # Errors
    ///
    /// Returns `UninitializedLocal` or `UninitializedArg` for a slot that was
    /// never written, unless the frame tolerates uninitialized reads, in
    /// which case Integer 0 is returned.
    pub fn get_value(&self, kind: SlotKind, index: usize) -> AmlResult<SlotValue> {
        let slot = self.get_node(kind, index)?;
        match &slot.value {
            SlotValue::Unset if self.slack_uninitialized => {
                Ok(SlotValue::Object(ObjectHandle::integer(0)))
            }
            SlotValue::Unset => Err(match kind {
                SlotKind::Local => AmlError::UninitializedLocal(index),
                SlotKind::Arg => AmlError::UninitializedArg(index),
            }),
            value => Ok(value.clone()),
        }
    }

    /// Replace the occupant of a slot with an object
    ///
    /// The previous occupant loses the reference the slot held on it.
    pub fn set_value(
        &mut self,
        kind: SlotKind,
        index: usize,
        object: ObjectHandle,
    ) -> AmlResult<()> {
        let slot = self.get_node_mut(kind, index)?;
        if let SlotValue::Object(current) = &slot.value {
            if current.ptr_eq(&object) {
                return Ok(());
            }
        }
        slot.ty = object.object_type();
        slot.value = SlotValue::Object(object);
        Ok(())
    }

    /// Make a slot designate a namespace node
    pub fn set_node(
        &mut self,
        kind: SlotKind,
        index: usize,
        node: NodeId,
        ty: ObjectType,
    ) -> AmlResult<()> {
        let slot = self.get_node_mut(kind, index)?;
        slot.ty = ty;
        slot.value = SlotValue::Node(node);
        Ok(())
    }

    /// Unset a slot
    pub fn delete_value(&mut self, kind: SlotKind, index: usize) -> AmlResult<()> {
        let slot = self.get_node_mut(kind, index)?;
        *slot = PseudoSlot::default();
        Ok(())
    }

    /// Load the arguments of an invocation into `Arg0..`
    pub fn init_args(&mut self, args: Vec<SlotValue>) -> AmlResult<()> {
        if args.len() > MAX_ARGS {
            return Err(AmlError::InvalidIndex {
                kind: SlotKind::Arg,
                index: args.len() - 1,
            });
        }
        for (index, value) in args.into_iter().enumerate() {
            let slot = &mut self.args[index];
            slot.ty = match &value {
                SlotValue::Object(object) => object.object_type(),
                SlotValue::Node(_) | SlotValue::Unset => ObjectType::Any,
            };
            slot.value = value;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_bounds() {
        let frame = MethodFrame::new(false);
        assert_eq!(
            frame.get_node(SlotKind::Local, MAX_LOCALS).unwrap_err(),
            AmlError::InvalidIndex { kind: SlotKind::Local, index: 8 }
        );
        assert_eq!(
            frame.get_node(SlotKind::Arg, MAX_ARGS).unwrap_err(),
            AmlError::InvalidIndex { kind: SlotKind::Arg, index: 7 }
        );
        assert!(frame.get_node(SlotKind::Arg, MAX_ARGS - 1).is_ok());
    }

    #[test]
    fn test_uninitialized_errors_are_distinct() {
        let frame = MethodFrame::new(false);
        assert_eq!(
            frame.get_value(SlotKind::Local, 3).unwrap_err(),
            AmlError::UninitializedLocal(3)
        );
        assert_eq!(
            frame.get_value(SlotKind::Arg, 0).unwrap_err(),
            AmlError::UninitializedArg(0)
        );
    }

    #[test]
    fn test_slack_reads_zero() {
        let frame = MethodFrame::new(true);
        match frame.get_value(SlotKind::Local, 0).unwrap() {
            SlotValue::Object(object) => assert_eq!(object.as_integer(), Some(0)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_set_and_delete_value() {
        let mut frame = MethodFrame::new(false);
        let object = ObjectHandle::string("abc");
        frame.set_value(SlotKind::Local, 1, object.clone()).unwrap();
        assert_eq!(object.ref_count(), 2);
        assert_eq!(frame.get_node(SlotKind::Local, 1).unwrap().ty, ObjectType::String);

        // Storing the occupant again leaves the count alone
        frame.set_value(SlotKind::Local, 1, object.clone()).unwrap();
        assert_eq!(object.ref_count(), 2);

        frame.delete_value(SlotKind::Local, 1).unwrap();
        assert_eq!(object.ref_count(), 1);
        assert!(frame.get_node(SlotKind::Local, 1).unwrap().is_unset());
    }

    #[test]
    fn test_reset_changes_identity_and_releases() {
        let mut frame = MethodFrame::new(false);
        let id = frame.id();
        let object = ObjectHandle::integer(4);
        frame.init_args(vec![SlotValue::Object(object.clone())]).unwrap();
        assert_eq!(object.ref_count(), 2);

        frame.reset(false);
        assert_ne!(frame.id(), id);
        assert_eq!(object.ref_count(), 1);
    }

    #[test]
    fn test_too_many_args() {
        let mut frame = MethodFrame::new(false);
        let args = vec![SlotValue::Unset; MAX_ARGS + 1];
        assert!(matches!(
            frame.init_args(args),
            Err(AmlError::InvalidIndex { kind: SlotKind::Arg, .. })
        ));
    }
}
