//! Object model
//!
//! Every runtime value is an [`Object`] behind an [`ObjectHandle`]. Handles
//! are shared-ownership pointers: a namespace node, a Local/Arg slot, a
//! package element or an operand stack entry each hold one handle, and the
//! object is freed when the last one is dropped. Dropping a package drops one
//! handle per element.
//!
//! Reference objects that locate a slot or a node hold plain keys
//! ([`NodeId`], [`reference::SlotRef`]) and never keep their target alive.

pub mod convert;
pub mod reference;

pub use reference::{IndexRef, IndexTarget, RefTarget, Reference, SlotRef};

use crate::field::FieldDescriptor;
use crate::namespace::NodeId;
use crate::region::{PciLocation, RegionSpace};
use crate::sync::{AmlEvent, AmlMutex};
use crate::term::{CreateFieldKind, Term};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Object types
// ============================================================================

/// Type tag of a node or object
///
/// The first seventeen variants carry the codes returned by the
/// `ObjectType` operator; the rest are internal kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ObjectType {
    /// Untyped
    #[default]
    Any,
    /// Integer
    Integer,
    /// String
    String,
    /// Buffer
    Buffer,
    /// Package
    Package,
    /// Field unit (public face of region, bank and index fields)
    FieldUnit,
    /// Device
    Device,
    /// Event
    Event,
    /// Control method
    Method,
    /// Mutex
    Mutex,
    /// Operation region
    Region,
    /// Power resource
    PowerResource,
    /// Processor
    Processor,
    /// Thermal zone
    ThermalZone,
    /// Buffer field
    BufferField,
    /// DDB handle
    DdbHandle,
    /// The Debug object
    Debug,
    /// Field of an operation region
    RegionField,
    /// Banked field
    BankField,
    /// Index/data field
    IndexField,
    /// Reference
    Reference,
    /// Alias to another node
    Alias,
    /// Scope with no object of its own (`Scope`, the root)
    LocalScope,
}

impl ObjectType {
    /// Code returned by the `ObjectType` operator
    pub fn code(self) -> u64 {
        match self {
            ObjectType::Any => 0,
            ObjectType::Integer => 1,
            ObjectType::String => 2,
            ObjectType::Buffer => 3,
            ObjectType::Package => 4,
            ObjectType::FieldUnit
            | ObjectType::RegionField
            | ObjectType::BankField
            | ObjectType::IndexField => 5,
            ObjectType::Device => 6,
            ObjectType::Event => 7,
            ObjectType::Method => 8,
            ObjectType::Mutex => 9,
            ObjectType::Region => 10,
            ObjectType::PowerResource => 11,
            ObjectType::Processor => 12,
            ObjectType::ThermalZone => 13,
            ObjectType::BufferField => 14,
            ObjectType::DdbHandle => 15,
            ObjectType::Debug => 16,
            ObjectType::Reference | ObjectType::Alias | ObjectType::LocalScope => 0,
        }
    }

    /// Whether nodes of this type have children resolved relative to them
    pub fn opens_scope(self) -> bool {
        matches!(
            self,
            ObjectType::Device
                | ObjectType::Method
                | ObjectType::PowerResource
                | ObjectType::Processor
                | ObjectType::ThermalZone
                | ObjectType::LocalScope
        )
    }

    /// Whether this is one of the four field kinds
    pub fn is_field(self) -> bool {
        matches!(
            self,
            ObjectType::BufferField
                | ObjectType::RegionField
                | ObjectType::BankField
                | ObjectType::IndexField
                | ObjectType::FieldUnit
        )
    }

    /// Whether this is Integer, String or Buffer
    pub fn is_simple_data(self) -> bool {
        matches!(self, ObjectType::Integer | ObjectType::String | ObjectType::Buffer)
    }

    /// Whether a node of type `actual` satisfies a lookup for `self`
    pub fn accepts(self, actual: ObjectType) -> bool {
        match self {
            ObjectType::Any => true,
            _ if actual == ObjectType::Any || actual == self => true,
            ObjectType::LocalScope => actual.opens_scope(),
            ObjectType::FieldUnit => actual.is_field(),
            _ => false,
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ObjectType::Any => "Untyped",
            ObjectType::Integer => "Integer",
            ObjectType::String => "String",
            ObjectType::Buffer => "Buffer",
            ObjectType::Package => "Package",
            ObjectType::FieldUnit => "FieldUnit",
            ObjectType::Device => "Device",
            ObjectType::Event => "Event",
            ObjectType::Method => "Method",
            ObjectType::Mutex => "Mutex",
            ObjectType::Region => "OpRegion",
            ObjectType::PowerResource => "Power",
            ObjectType::Processor => "Processor",
            ObjectType::ThermalZone => "Thermal",
            ObjectType::BufferField => "BufferField",
            ObjectType::DdbHandle => "DdbHandle",
            ObjectType::Debug => "DebugObject",
            ObjectType::RegionField => "RegionField",
            ObjectType::BankField => "BankField",
            ObjectType::IndexField => "IndexField",
            ObjectType::Reference => "Reference",
            ObjectType::Alias => "Alias",
            ObjectType::LocalScope => "Scope",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Deferred evaluation
// ============================================================================

/// Operand terms whose evaluation waits for first use
#[derive(Debug, Clone)]
pub struct DeferredTerm {
    /// Scope the terms resolve names against
    pub scope: NodeId,
    /// Unevaluated operands
    pub args: Arc<[Term]>,
}

impl DeferredTerm {
    /// Capture terms for later evaluation
    pub fn new(scope: NodeId, args: Vec<Term>) -> Self {
        Self {
            scope,
            args: args.into(),
        }
    }
}

/// A value that is either still bytecode or already computed
///
/// The transition from `Pending` to `Ready` happens at most once.
#[derive(Debug, Clone)]
pub enum Deferred<T> {
    /// Not yet evaluated
    Pending(DeferredTerm),
    /// Evaluated
    Ready(T),
}

impl<T> Deferred<T> {
    /// The value, if evaluated
    pub fn ready(&self) -> Option<&T> {
        match self {
            Deferred::Ready(value) => Some(value),
            Deferred::Pending(_) => None,
        }
    }

    /// The pending terms, if not evaluated
    pub fn pending(&self) -> Option<&DeferredTerm> {
        match self {
            Deferred::Pending(term) => Some(term),
            Deferred::Ready(_) => None,
        }
    }

    /// Whether the value has been evaluated
    pub fn is_ready(&self) -> bool {
        matches!(self, Deferred::Ready(_))
    }

    /// Transition to `Ready` unless already there; returns whether it did
    pub fn resolve(&mut self, value: T) -> bool {
        if self.is_ready() {
            return false;
        }
        *self = Deferred::Ready(value);
        true
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// Resolved address range of a region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionExtent {
    /// Base address
    pub address: u64,
    /// Length in bytes
    pub length: u64,
    /// Bus location for PCI configuration regions
    pub pci: Option<PciLocation>,
}

/// Operation region
#[derive(Debug, Clone)]
pub struct Region {
    /// Address space
    pub space: RegionSpace,
    /// Base address and length
    pub extent: Deferred<RegionExtent>,
    /// Node the region is declared at
    pub node: NodeId,
}

/// Buffer and descriptor a buffer field is bound to
#[derive(Debug, Clone)]
pub struct BufferBinding {
    /// Backing buffer (or string) object
    pub buffer: ObjectHandle,
    /// Location inside the buffer
    pub field: FieldDescriptor,
}

/// Field created over a buffer by `Create*Field`
#[derive(Debug, Clone)]
pub struct BufferField {
    /// Which create operator declared it
    pub kind: CreateFieldKind,
    /// Buffer and location, evaluated on first use
    pub binding: Deferred<BufferBinding>,
}

/// Field of an operation region
#[derive(Debug, Clone)]
pub struct RegionField {
    /// Owning region
    pub region: ObjectHandle,
    /// Location inside the region
    pub field: FieldDescriptor,
}

/// Field behind a bank-select register
#[derive(Debug, Clone)]
pub struct BankField {
    /// Owning region
    pub region: ObjectHandle,
    /// Register selecting the bank (a region field)
    pub bank_register: ObjectHandle,
    /// Value written to the bank register before each access
    pub bank_value: u64,
    /// Location inside the region
    pub field: FieldDescriptor,
}

/// Field reached through an index/data register pair
#[derive(Debug, Clone)]
pub struct IndexField {
    /// Register receiving the datum byte offset
    pub index_register: ObjectHandle,
    /// Register carrying the datum
    pub data_register: ObjectHandle,
    /// Location in the index space
    pub field: FieldDescriptor,
}

/// Control method
#[derive(Debug, Clone)]
pub struct Method {
    /// Declared argument count (0..=7)
    pub arg_count: u8,
    /// Whether invocations are serialized
    pub serialized: bool,
    /// Sync level of the implicit mutex
    pub sync_level: u8,
    /// Method body
    pub body: Arc<[Term]>,
    /// Implicit mutex of serialized methods
    pub mutex: Option<Arc<AmlMutex>>,
}

/// Processor object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Processor {
    /// Processor id
    pub id: u8,
    /// Processor block address
    pub pblk_address: u32,
    /// Processor block length
    pub pblk_length: u8,
}

/// Power resource object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerResource {
    /// Deepest system sleep level the resource supports
    pub system_level: u8,
    /// Ordering among power resources
    pub resource_order: u16,
}

/// Buffer or package initializer waiting for first use
#[derive(Debug, Clone)]
pub struct DeferredData {
    /// Type the object will have once evaluated
    pub ty: ObjectType,
    /// The initializer term
    pub term: DeferredTerm,
}

// ============================================================================
// Object
// ============================================================================

/// A runtime value
#[derive(Debug)]
pub enum Object {
    /// Integer (truncated to the active integer width)
    Integer(u64),
    /// ASCII string
    String(String),
    /// Byte buffer
    Buffer(Vec<u8>),
    /// Package of shared elements
    Package(Vec<ObjectHandle>),
    /// Operation region
    Region(Region),
    /// Buffer field
    BufferField(BufferField),
    /// Region field
    RegionField(RegionField),
    /// Bank field
    BankField(BankField),
    /// Index field
    IndexField(IndexField),
    /// Reference
    Reference(Reference),
    /// Control method
    Method(Method),
    /// Mutex
    Mutex(Arc<AmlMutex>),
    /// Event
    Event(Arc<AmlEvent>),
    /// Device
    Device,
    /// Processor
    Processor(Processor),
    /// Power resource
    PowerResource(PowerResource),
    /// Thermal zone
    ThermalZone,
    /// The Debug sink
    Debug,
    /// Buffer or package whose initializer has not run yet
    Deferred(DeferredData),
}

impl Object {
    /// Type tag
    pub fn object_type(&self) -> ObjectType {
        match self {
            Object::Integer(_) => ObjectType::Integer,
            Object::String(_) => ObjectType::String,
            Object::Buffer(_) => ObjectType::Buffer,
            Object::Package(_) => ObjectType::Package,
            Object::Region(_) => ObjectType::Region,
            Object::BufferField(_) => ObjectType::BufferField,
            Object::RegionField(_) => ObjectType::RegionField,
            Object::BankField(_) => ObjectType::BankField,
            Object::IndexField(_) => ObjectType::IndexField,
            Object::Reference(_) => ObjectType::Reference,
            Object::Method(_) => ObjectType::Method,
            Object::Mutex(_) => ObjectType::Mutex,
            Object::Event(_) => ObjectType::Event,
            Object::Device => ObjectType::Device,
            Object::Processor(_) => ObjectType::Processor,
            Object::PowerResource(_) => ObjectType::PowerResource,
            Object::ThermalZone => ObjectType::ThermalZone,
            Object::Debug => ObjectType::Debug,
            Object::Deferred(data) => data.ty,
        }
    }

    /// Integer value, if this is an Integer
    pub fn as_integer(&self) -> Option<u64> {
        match self {
            Object::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Copy of the object
    ///
    /// Packages are copied element by element; synchronization objects and
    /// method bodies are shared with the original.
    pub fn duplicate(&self) -> Object {
        match self {
            Object::Integer(value) => Object::Integer(*value),
            Object::String(value) => Object::String(value.clone()),
            Object::Buffer(bytes) => Object::Buffer(bytes.clone()),
            Object::Package(elements) => {
                Object::Package(elements.iter().map(ObjectHandle::duplicate).collect())
            }
            Object::Region(region) => Object::Region(region.clone()),
            Object::BufferField(field) => Object::BufferField(field.clone()),
            Object::RegionField(field) => Object::RegionField(field.clone()),
            Object::BankField(field) => Object::BankField(field.clone()),
            Object::IndexField(field) => Object::IndexField(field.clone()),
            Object::Reference(reference) => Object::Reference(reference.clone()),
            Object::Method(method) => Object::Method(method.clone()),
            Object::Mutex(mutex) => Object::Mutex(mutex.clone()),
            Object::Event(event) => Object::Event(event.clone()),
            Object::Device => Object::Device,
            Object::Processor(processor) => Object::Processor(*processor),
            Object::PowerResource(power) => Object::PowerResource(*power),
            Object::ThermalZone => Object::ThermalZone,
            Object::Debug => Object::Debug,
            Object::Deferred(data) => Object::Deferred(data.clone()),
        }
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Object::Integer(value) => write!(f, "{:#x}", value),
            Object::String(value) => write!(f, "\"{}\"", value),
            Object::Buffer(bytes) => write!(f, "Buffer {:02x?}", bytes),
            Object::Package(elements) => write!(f, "Package ({} elements)", elements.len()),
            Object::Reference(reference) => write!(f, "{}", reference),
            other => write!(f, "[{} Object]", other.object_type()),
        }
    }
}

// ============================================================================
// Handles
// ============================================================================

/// Shared-ownership handle to an object
#[derive(Clone)]
pub struct ObjectHandle(Arc<RwLock<Object>>);

impl ObjectHandle {
    /// Allocate a new object
    pub fn new(object: Object) -> Self {
        Self(Arc::new(RwLock::new(object)))
    }

    /// Shorthand for an Integer
    pub fn integer(value: u64) -> Self {
        Self::new(Object::Integer(value))
    }

    /// Shorthand for a String
    pub fn string(value: impl Into<String>) -> Self {
        Self::new(Object::String(value.into()))
    }

    /// Shorthand for a Buffer
    pub fn buffer(bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(Object::Buffer(bytes.into()))
    }

    /// Shorthand for a Package
    pub fn package(elements: Vec<ObjectHandle>) -> Self {
        Self::new(Object::Package(elements))
    }

    /// Shared access
    pub fn read(&self) -> RwLockReadGuard<'_, Object> {
        self.0.read()
    }

    /// Exclusive access
    pub fn write(&self) -> RwLockWriteGuard<'_, Object> {
        self.0.write()
    }

    /// Whether both handles point at the same object
    pub fn ptr_eq(&self, other: &ObjectHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Number of handles currently pointing at the object
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    /// Type tag of the object
    pub fn object_type(&self) -> ObjectType {
        self.read().object_type()
    }

    /// Integer value, if the object is an Integer
    pub fn as_integer(&self) -> Option<u64> {
        self.read().as_integer()
    }

    /// New handle sharing ownership
    pub fn add_reference(&self) -> ObjectHandle {
        self.clone()
    }

    /// Give up this handle's ownership
    pub fn remove_reference(self) {
        drop(self)
    }

    /// Copy of the object behind a fresh handle
    pub fn duplicate(&self) -> ObjectHandle {
        ObjectHandle::new(self.read().duplicate())
    }
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_read() {
            Some(object) => write!(f, "ObjectHandle({:?})", &*object),
            None => f.write_str("ObjectHandle(<locked>)"),
        }
    }
}

impl From<Object> for ObjectHandle {
    fn from(object: Object) -> Self {
        ObjectHandle::new(object)
    }
}
