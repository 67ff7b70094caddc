//! AML Interpreter Core
//!
//! This crate provides the execution core of an AML (firmware bytecode)
//! interpreter:
//! - Hierarchical namespace with relative, parent-prefixed and absolute lookup
//! - Reference-counted tagged object model
//! - Per-invocation walk state (operand stack, result frames, scopes, Locals/Args)
//! - Field I/O engine with bit-granular packing and update rules
//! - Store engine with implicit type conversion
//! - Two-pass namespace loading over a typed term tree
//!
//! Parsing AML bytes into the term tree and hardware-specific region handlers
//! are provided by the host.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![allow(clippy::new_without_default)]

pub mod field;
pub mod interpreter;
pub mod name;
pub mod namespace;
pub mod object;
pub mod options;
pub mod region;
pub mod sync;
pub mod term;
pub mod walk;

pub use field::{AccessType, FieldDescriptor, FieldFlags, LockRule, UpdateRule};
pub use interpreter::{Destination, InitializationReport, Interpreter};
pub use name::{NamePath, NameSeg, PathPrefix};
pub use namespace::{LookupFlags, LookupMode, Namespace, Node, NodeFlags, NodeId, OwnerId};
pub use object::{Object, ObjectHandle, ObjectType, Reference};
pub use options::{IntegerWidth, InterpreterOptions};
pub use region::{AccessDirection, NoopRegionHandler, RegionHandler, RegionHandlers, RegionSpace};
pub use sync::{AmlEvent, AmlMutex, SyncError};
pub use term::{DefinitionBlock, Target, Term};
pub use walk::{SlotKind, WalkList, WalkState};

use object::ObjectType as Type;

/// Interpreter errors
///
/// AML-level errors (uninitialized slots, type mismatches, region limits)
/// unwind the active walk state but leave the interpreter usable. See
/// [`AmlError::is_recoverable`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmlError {
    /// Name lookup failed
    #[error("Name not found: {0}")]
    NotFound(String),

    /// Name already exists in the target scope
    #[error("Name already exists: {0}")]
    AlreadyExists(String),

    /// Invalid argument passed to an interpreter entry point
    #[error("Bad parameter: {0}")]
    BadParameter(String),

    /// Allocation refused
    #[error("Out of memory")]
    NoMemory,

    /// Index or length past the end of a buffer, string or package
    #[error("Buffer overflow: index {index} exceeds length {length}")]
    BufferOverflow {
        /// Requested index (in bytes or elements)
        index: u64,
        /// Length of the container
        length: u64,
    },

    /// Field access outside of the owning operation region
    #[error("Region limit: offset {offset:#x} width {width} exceeds region length {length:#x}")]
    RegionLimit {
        /// Byte offset of the access inside the region
        offset: u64,
        /// Access width in bytes
        width: u32,
        /// Declared region length
        length: u64,
    },

    /// Bank or index selector does not fit into its register
    #[error("Register limit: value {value:#x} does not fit in {bits}-bit register")]
    RegisterLimit {
        /// Selector value
        value: u64,
        /// Register width in bits
        bits: u32,
    },

    /// Numeric conversion overflow (BCD, string to integer)
    #[error("Numeric overflow")]
    NumericOverflow,

    /// Read of a Local that was never written
    #[error("Uninitialized Local{0}")]
    UninitializedLocal(usize),

    /// Read of an Arg that was never passed
    #[error("Uninitialized Arg{0}")]
    UninitializedArg(usize),

    /// Local/Arg index outside of the fixed table
    #[error("Invalid {kind} index {index}")]
    InvalidIndex {
        /// Which pseudo-slot table
        kind: SlotKind,
        /// Requested index
        index: usize,
    },

    /// Operator or operand combination that cannot be executed
    #[error("Bad opcode: {0}")]
    BadOpcode(String),

    /// Operand has the wrong type for the operation
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Required type
        expected: Type,
        /// Actual type
        found: Type,
    },

    /// Malformed name path, or parent prefixes past the root
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Operand stack overflow
    #[error("Stack overflow")]
    StackOverflow,

    /// Operand stack underflow
    #[error("Stack underflow")]
    StackUnderflow,

    /// Scope stack popped while empty
    #[error("Scope stack underflow")]
    ScopeUnderflow,

    /// Result frame full, or too many result frames
    #[error("Result stack overflow")]
    ResultFrameOverflow,

    /// A method used as an operand ended without returning a value
    #[error("Method {0} returned no value")]
    NoReturnValue(String),

    /// Operation recognized but not supported by this interpreter
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Integer division by zero
    #[error("Divide by zero")]
    DivideByZero,

    /// Nested method invocation limit reached
    #[error("Method call depth limit {0} reached")]
    MethodLimit(usize),

    /// While loop exceeded the configured iteration budget
    #[error("Loop iteration limit reached")]
    LoopTimeout,

    /// No region handler installed for the address space
    #[error("No handler installed for {0:?} space")]
    NoHandler(RegionSpace),

    /// Region handler reported a failure
    #[error("Region handler failed: {0}")]
    RegionHandler(String),

    /// Mutex or event failure
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Interpreter state that should be unreachable
    #[error("Internal inconsistency: {0}")]
    InternalInconsistency(String),
}

impl AmlError {
    /// Whether the error is an AML-level failure that only unwinds the
    /// current invocation chain.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            AmlError::NoMemory | AmlError::InternalInconsistency(_) | AmlError::StackOverflow
        )
    }

    pub(crate) fn type_mismatch(expected: Type, found: Type) -> Self {
        AmlError::TypeMismatch { expected, found }
    }
}

/// Interpreter result
pub type AmlResult<T> = Result<T, AmlError>;
