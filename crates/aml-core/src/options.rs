//! Interpreter configuration
//!
//! Options are plain data with sensible defaults. Hosts that keep their
//! configuration in a file can deserialize [`InterpreterOptions`] directly;
//! every field is optional there.

use serde::Deserialize;

/// Default maximum nesting of method invocations
pub const DEFAULT_MAX_CALL_DEPTH: usize = 256;

/// Default While loop iteration budget
pub const DEFAULT_MAX_LOOP_ITERATIONS: u64 = 0xFFFF_FFFF;

/// Native integer width of the interpreter
///
/// Selected per table from the definition block revision: revision 1 tables
/// run with 32-bit integers, later revisions with 64-bit integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
pub enum IntegerWidth {
    /// 32-bit integers (definition block revision < 2)
    Bits32,
    /// 64-bit integers
    #[default]
    Bits64,
}

impl IntegerWidth {
    /// Integer width for a definition block revision
    pub fn from_revision(revision: u8) -> Self {
        if revision < 2 {
            IntegerWidth::Bits32
        } else {
            IntegerWidth::Bits64
        }
    }

    /// Width in bits
    #[inline]
    pub const fn bits(self) -> u32 {
        match self {
            IntegerWidth::Bits32 => 32,
            IntegerWidth::Bits64 => 64,
        }
    }

    /// Width in bytes
    #[inline]
    pub const fn bytes(self) -> usize {
        match self {
            IntegerWidth::Bits32 => 4,
            IntegerWidth::Bits64 => 8,
        }
    }

    /// The `Ones` constant for this width
    #[inline]
    pub const fn ones(self) -> u64 {
        match self {
            IntegerWidth::Bits32 => u32::MAX as u64,
            IntegerWidth::Bits64 => u64::MAX,
        }
    }

    /// Truncate a value to this width
    #[inline]
    pub const fn truncate(self, value: u64) -> u64 {
        value & self.ones()
    }

    /// Number of decimal digits a packed BCD value can hold
    #[inline]
    pub const fn bcd_digits(self) -> u32 {
        self.bits() / 4
    }

    /// Number of hex digits needed to print any integer of this width
    #[inline]
    pub const fn hex_digits(self) -> usize {
        self.bytes() * 2
    }
}

/// Interpreter options
///
/// Operand nesting is not configurable. Pending operands of an expression
/// live on the walk's result stack, which holds
/// [`MAX_RESULT_FRAMES`](crate::walk::MAX_RESULT_FRAMES) frames of
/// [`RESULT_FRAME_SIZE`](crate::walk::RESULT_FRAME_SIZE) results. A right-nested
/// expression such as `Add (1, Add (1, ...))` deeper than about 47 levels
/// fails with `AmlError::ResultFrameOverflow`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InterpreterOptions {
    /// Integer width used until a table selects one through its revision
    pub integer_width: IntegerWidth,

    /// Maximum nesting of method invocations
    pub max_call_depth: usize,

    /// While loop iteration budget before `LoopTimeout`
    pub max_loop_iterations: u64,

    /// Methods that end without `Return` yield Integer 0
    pub enable_interpreter_slack: bool,

    /// Reads of never-written Locals/Args yield Integer 0 instead of failing
    pub slack_uninitialized: bool,

    /// Value of `\_OS_`
    pub os_name: String,

    /// Value of `\_REV`
    pub revision: u64,
}

impl Default for InterpreterOptions {
    fn default() -> Self {
        Self {
            integer_width: IntegerWidth::Bits64,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            max_loop_iterations: DEFAULT_MAX_LOOP_ITERATIONS,
            enable_interpreter_slack: true,
            slack_uninitialized: false,
            os_name: "Microsoft Windows NT".to_string(),
            revision: 2,
        }
    }
}

impl InterpreterOptions {
    /// Options with a specific call depth limit
    pub fn with_call_depth(max_call_depth: usize) -> Self {
        Self {
            max_call_depth,
            ..Default::default()
        }
    }

    /// Options with a specific loop budget
    pub fn with_loop_limit(max_loop_iterations: u64) -> Self {
        Self {
            max_loop_iterations,
            ..Default::default()
        }
    }

    /// Options with a specific integer width
    pub fn with_integer_width(integer_width: IntegerWidth) -> Self {
        Self {
            integer_width,
            ..Default::default()
        }
    }

    /// Options without interpreter slack
    pub fn strict() -> Self {
        Self {
            enable_interpreter_slack: false,
            slack_uninitialized: false,
            ..Default::default()
        }
    }
}
