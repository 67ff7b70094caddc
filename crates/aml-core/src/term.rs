//! Typed term tree
//!
//! The core does not decode AML bytes. A parser hands it a tree of [`Term`]s:
//! definitions, statements and expressions, with name strings already
//! decoded into [`NamePath`]s and targets into [`Target`]s.

use crate::field::{AccessType, FieldFlags};
use crate::name::{NamePath, NameSeg};
use crate::region::RegionSpace;
use std::sync::Arc;

/// A loaded definition block
#[derive(Debug, Clone, PartialEq)]
pub struct DefinitionBlock {
    /// Table revision; below 2 selects 32-bit integers
    pub revision: u8,
    /// Table body
    pub body: Vec<Term>,
}

impl DefinitionBlock {
    /// Block with the given revision
    pub fn new(revision: u8, body: Vec<Term>) -> Self {
        Self { revision, body }
    }
}

/// Entry of a Field, BankField or IndexField list
#[derive(Debug, Clone, PartialEq)]
pub enum FieldElement {
    /// Named field of `bit_length` bits
    Named {
        /// Field name
        name: NameSeg,
        /// Length in bits
        bit_length: u32,
    },
    /// Unnamed gap of `bit_length` bits
    Reserved {
        /// Length in bits
        bit_length: u32,
    },
    /// Move to an absolute byte offset
    Offset(u32),
    /// Change the access type for the following fields
    AccessAs(AccessType),
}

/// `Create*Field` variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CreateFieldKind {
    /// One bit at a bit index
    Bit,
    /// One byte at a byte index
    Byte,
    /// Two bytes at a byte index
    Word,
    /// Four bytes at a byte index
    DWord,
    /// Eight bytes at a byte index
    QWord,
    /// Arbitrary bit length at a bit index
    Field,
}

impl CreateFieldKind {
    /// Index unit in bits, fixed length in bits, access type
    pub fn layout(self) -> (u32, Option<u32>, AccessType) {
        match self {
            CreateFieldKind::Bit => (1, Some(1), AccessType::Byte),
            CreateFieldKind::Byte => (8, Some(8), AccessType::Byte),
            CreateFieldKind::Word => (8, Some(16), AccessType::Word),
            CreateFieldKind::DWord => (8, Some(32), AccessType::DWord),
            CreateFieldKind::QWord => (8, Some(64), AccessType::QWord),
            CreateFieldKind::Field => (1, None, AccessType::Byte),
        }
    }
}

/// Integer operators with a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// Add
    Add,
    /// Subtract
    Subtract,
    /// Multiply
    Multiply,
    /// Mod
    Mod,
    /// And
    And,
    /// Or
    Or,
    /// Xor
    Xor,
    /// Nand
    Nand,
    /// Nor
    Nor,
    /// ShiftLeft
    ShiftLeft,
    /// ShiftRight
    ShiftRight,
}

/// Comparison and boolean operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalOp {
    /// LAnd
    And,
    /// LOr
    Or,
    /// LEqual
    Equal,
    /// LNotEqual
    NotEqual,
    /// LGreater
    Greater,
    /// LGreaterEqual
    GreaterEqual,
    /// LLess
    Less,
    /// LLessEqual
    LessEqual,
}

/// Conversion operators with a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConvertOp {
    /// ToBCD
    ToBcd,
    /// FromBCD
    FromBcd,
    /// ToInteger
    ToInteger,
    /// ToBuffer
    ToBuffer,
    /// ToHexString
    ToHexString,
    /// ToDecimalString
    ToDecimalString,
}

/// Destination of an operator result, or a SuperName operand
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// No target
    Null,
    /// A named object
    Name(NamePath),
    /// LocalN
    Local(u8),
    /// ArgN
    Arg(u8),
    /// The Debug object
    Debug,
    /// An expression producing a reference (`Index`, `DerefOf`, `RefOf`)
    Reference(Box<Term>),
}

impl Target {
    /// Whether this is the null target
    pub fn is_null(&self) -> bool {
        matches!(self, Target::Null)
    }
}

/// One node of the term tree
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    // ------------------------------------------------------------------
    // Definitions
    // ------------------------------------------------------------------
    /// `Scope (name) { body }`
    Scope {
        /// Existing scope
        name: NamePath,
        /// Contents
        body: Vec<Term>,
    },
    /// `Device (name) { body }`
    Device {
        /// Device name
        name: NamePath,
        /// Contents
        body: Vec<Term>,
    },
    /// `Processor (name, id, pblk, len) { body }`
    Processor {
        /// Processor name
        name: NamePath,
        /// Processor id
        id: u8,
        /// Processor block address
        pblk_address: u32,
        /// Processor block length
        pblk_length: u8,
        /// Contents
        body: Vec<Term>,
    },
    /// `PowerResource (name, level, order) { body }`
    PowerResource {
        /// Resource name
        name: NamePath,
        /// System level
        system_level: u8,
        /// Resource order
        resource_order: u16,
        /// Contents
        body: Vec<Term>,
    },
    /// `ThermalZone (name) { body }`
    ThermalZone {
        /// Zone name
        name: NamePath,
        /// Contents
        body: Vec<Term>,
    },
    /// `Method (name, args, serialize, level) { body }`
    Method {
        /// Method name
        name: NamePath,
        /// Argument count
        arg_count: u8,
        /// Serialized flag
        serialized: bool,
        /// Sync level
        sync_level: u8,
        /// Body, shared with the method object
        body: Arc<[Term]>,
    },
    /// `Name (name, value)`
    Name {
        /// Object name
        name: NamePath,
        /// Initial value
        value: Box<Term>,
    },
    /// `Alias (source, alias)`
    Alias {
        /// Existing object
        source: NamePath,
        /// New name
        alias: NamePath,
    },
    /// `OperationRegion (name, space, offset, length)`
    OperationRegion {
        /// Region name
        name: NamePath,
        /// Address space
        space: RegionSpace,
        /// Base address
        offset: Box<Term>,
        /// Length in bytes
        length: Box<Term>,
    },
    /// `Field (region, flags) { elements }`
    Field {
        /// Owning region
        region: NamePath,
        /// Field flags
        flags: FieldFlags,
        /// Field list
        elements: Vec<FieldElement>,
    },
    /// `BankField (region, bank, value, flags) { elements }`
    BankField {
        /// Owning region
        region: NamePath,
        /// Bank-select register
        bank: NamePath,
        /// Bank-select value
        bank_value: Box<Term>,
        /// Field flags
        flags: FieldFlags,
        /// Field list
        elements: Vec<FieldElement>,
    },
    /// `IndexField (index, data, flags) { elements }`
    IndexField {
        /// Index register
        index: NamePath,
        /// Data register
        data: NamePath,
        /// Field flags
        flags: FieldFlags,
        /// Field list
        elements: Vec<FieldElement>,
    },
    /// `Create*Field (buffer, index[, length], name)`
    CreateField {
        /// Operator variant
        kind: CreateFieldKind,
        /// Source buffer
        buffer: Box<Term>,
        /// Bit or byte index
        index: Box<Term>,
        /// Bit length (`CreateField` only)
        length: Option<Box<Term>>,
        /// Field name
        name: NamePath,
    },
    /// `Mutex (name, level)`
    Mutex {
        /// Mutex name
        name: NamePath,
        /// Sync level
        sync_level: u8,
    },
    /// `Event (name)`
    Event {
        /// Event name
        name: NamePath,
    },

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------
    /// `Store (value, target)`
    Store {
        /// Source
        value: Box<Term>,
        /// Destination
        target: Target,
    },
    /// `CopyObject (value, target)`
    CopyObject {
        /// Source
        value: Box<Term>,
        /// Destination
        target: Target,
    },
    /// `If (predicate) { then } Else { otherwise }`
    If {
        /// Condition
        predicate: Box<Term>,
        /// Taken branch
        then: Vec<Term>,
        /// Else branch
        otherwise: Vec<Term>,
    },
    /// `While (predicate) { body }`
    While {
        /// Condition
        predicate: Box<Term>,
        /// Loop body
        body: Vec<Term>,
    },
    /// `Break`
    Break,
    /// `Continue`
    Continue,
    /// `Return (value)`
    Return(Box<Term>),
    /// `Noop`
    Noop,
    /// `Acquire (mutex, timeout)`
    Acquire {
        /// Mutex operand
        mutex: Target,
        /// Timeout in milliseconds
        timeout: u16,
    },
    /// `Release (mutex)`
    Release(Target),
    /// `Signal (event)`
    Signal(Target),
    /// `Wait (event, timeout)`
    Wait {
        /// Event operand
        event: Target,
        /// Timeout in milliseconds
        timeout: Box<Term>,
    },
    /// `Reset (event)`
    Reset(Target),
    /// `Sleep (ms)`
    Sleep(Box<Term>),
    /// `Stall (us)`
    Stall(Box<Term>),

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------
    /// Integer constant
    Integer(u64),
    /// String constant
    String(String),
    /// `Buffer (size) { bytes }`
    Buffer {
        /// Declared size, defaults to the initializer length
        size: Option<Box<Term>>,
        /// Initializer bytes
        bytes: Vec<u8>,
    },
    /// `Package (count) { elements }`
    Package {
        /// Declared element count, defaults to the initializer length
        count: Option<Box<Term>>,
        /// Initializer elements
        elements: Vec<Term>,
    },
    /// `Zero`
    Zero,
    /// `One`
    One,
    /// `Ones`
    Ones,
    /// `Revision`
    Revision,
    /// A name operand (invokes methods with no arguments)
    NameRef(NamePath),
    /// Method invocation with arguments
    Invoke {
        /// Method name
        method: NamePath,
        /// Arguments
        args: Vec<Term>,
    },
    /// `LocalN`
    Local(u8),
    /// `ArgN`
    Arg(u8),
    /// `Debug`
    Debug,
    /// Integer operator with a target
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand
        left: Box<Term>,
        /// Right operand
        right: Box<Term>,
        /// Result target
        target: Target,
    },
    /// `Not (operand, target)`
    Not {
        /// Operand
        operand: Box<Term>,
        /// Result target
        target: Target,
    },
    /// `Divide (dividend, divisor, remainder, quotient)`
    Divide {
        /// Dividend
        dividend: Box<Term>,
        /// Divisor
        divisor: Box<Term>,
        /// Remainder target
        remainder: Target,
        /// Quotient target
        quotient: Target,
    },
    /// `Increment (target)`
    Increment(Target),
    /// `Decrement (target)`
    Decrement(Target),
    /// Comparison or boolean operator
    Logical {
        /// Operator
        op: LogicalOp,
        /// Left operand
        left: Box<Term>,
        /// Right operand
        right: Box<Term>,
    },
    /// `LNot (operand)`
    LNot(Box<Term>),
    /// `RefOf (target)`
    RefOf(Target),
    /// `CondRefOf (source, target)`
    CondRefOf {
        /// Object to reference
        source: Target,
        /// Receives the reference when the source exists
        target: Target,
    },
    /// `DerefOf (reference)`
    DerefOf(Box<Term>),
    /// `Index (source, index, target)`
    Index {
        /// Package, buffer or string
        source: Box<Term>,
        /// Element index
        index: Box<Term>,
        /// Receives the reference
        target: Target,
    },
    /// `SizeOf (target)`
    SizeOf(Target),
    /// `ObjectType (target)`
    ObjectType(Target),
    /// Conversion operator with a target
    Convert {
        /// Operator
        op: ConvertOp,
        /// Operand
        operand: Box<Term>,
        /// Result target
        target: Target,
    },
    /// `Concatenate (left, right, target)`
    Concatenate {
        /// First operand (selects the result type)
        left: Box<Term>,
        /// Second operand
        right: Box<Term>,
        /// Result target
        target: Target,
    },
}

impl Term {
    /// `Name` definition shorthand
    pub fn name(name: NamePath, value: Term) -> Term {
        Term::Name {
            name,
            value: Box::new(value),
        }
    }

    /// `Store` shorthand
    pub fn store(value: Term, target: Target) -> Term {
        Term::Store {
            value: Box::new(value),
            target,
        }
    }

    /// Whether this term declares a named object
    pub fn is_definition(&self) -> bool {
        matches!(
            self,
            Term::Scope { .. }
                | Term::Device { .. }
                | Term::Processor { .. }
                | Term::PowerResource { .. }
                | Term::ThermalZone { .. }
                | Term::Method { .. }
                | Term::Name { .. }
                | Term::Alias { .. }
                | Term::OperationRegion { .. }
                | Term::Field { .. }
                | Term::BankField { .. }
                | Term::IndexField { .. }
                | Term::CreateField { .. }
                | Term::Mutex { .. }
                | Term::Event { .. }
        )
    }

    /// Whether this term is a constant that needs no walk state to evaluate
    pub fn is_literal(&self) -> bool {
        match self {
            Term::Integer(_)
            | Term::String(_)
            | Term::Zero
            | Term::One
            | Term::Ones
            | Term::Revision => true,
            Term::Buffer { size, .. } => size.as_deref().map_or(true, Term::is_literal),
            Term::Package { count, elements } => {
                count.as_deref().map_or(true, Term::is_literal)
                    && elements.iter().all(Term::is_literal)
            }
            _ => false,
        }
    }
}
