//! Reference objects
//!
//! A reference denotes a location instead of a value. Slot and node targets
//! are plain keys; a walk state or node that has gone away simply makes the
//! reference stale. Index references hold their container strongly, the way
//! a package element is kept alive by its package.

use super::ObjectHandle;
use crate::namespace::NodeId;
use crate::walk::{FrameId, SlotKind};
use std::fmt;

/// Location of a Local or Arg slot in a particular invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotRef {
    /// Walk state owning the slot
    pub frame: FrameId,
    /// Local or Arg
    pub kind: SlotKind,
    /// Slot index
    pub index: usize,
}

/// Target of a `RefOf` reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefTarget {
    /// A namespace node
    Node(NodeId),
    /// A Local or Arg slot
    Slot(SlotRef),
}

/// What an index reference selects inside its container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexTarget {
    /// An element of a package
    PackageElement,
    /// A byte of a buffer or string
    BufferByte,
}

/// Element of a container selected by `Index`
#[derive(Debug, Clone)]
pub struct IndexRef {
    /// Package, buffer or string
    pub container: ObjectHandle,
    /// Element or byte index
    pub index: usize,
    /// Element kind
    pub target: IndexTarget,
}

/// Reference sub-kinds
#[derive(Debug, Clone)]
pub enum Reference {
    /// A Local or Arg operand
    Slot(SlotRef),
    /// A name operand
    Name(NodeId),
    /// Result of `RefOf`/`CondRefOf`
    RefOf(RefTarget),
    /// Result of `Index`
    Index(IndexRef),
    /// The Debug object as a target
    Debug,
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Slot(slot) => write!(f, "[{}{}]", slot.kind, slot.index),
            Reference::Name(node) => write!(f, "[Name {}]", node),
            Reference::RefOf(RefTarget::Node(node)) => write!(f, "[RefOf {}]", node),
            Reference::RefOf(RefTarget::Slot(slot)) => {
                write!(f, "[RefOf {}{}]", slot.kind, slot.index)
            }
            Reference::Index(index) => write!(f, "[Index {}]", index.index),
            Reference::Debug => f.write_str("[Debug]"),
        }
    }
}
