//! Identifiers, values and use edges.
//!
//! Every entity of a [`crate::module::Module`] lives in an arena and is
//! addressed by a stable key. A key becomes stale once its entity is removed;
//! stale keys never alias a newer entity (see `slotmap` versioning).
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use strum::{EnumIs, EnumTryAs};

new_key_type! {
    /// Identifier of a function within a module.
    pub struct FuncId;

    /// Identifier of a basic block within a module.
    pub struct BlockId;

    /// Identifier of an instruction. Instructions produce at most one
    /// result, so the identifier also names that result.
    pub struct InstrId;

    /// Identifier of a block argument (formal parameters are the arguments
    /// of a function's entry block).
    pub struct ArgId;
}

/// Anything that can be referenced by an operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, EnumIs, EnumTryAs)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Value {
    /// Result of an instruction (literals included).
    Instr(InstrId),
    /// Block argument.
    Arg(ArgId),
}

impl From<InstrId> for Value {
    fn from(value: InstrId) -> Self {
        Value::Instr(value)
    }
}

impl From<ArgId> for Value {
    fn from(value: ArgId) -> Self {
        Value::Arg(value)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Instr(id) => write!(f, "%{:?}", id),
            Value::Arg(id) => write!(f, "%arg{:?}", id),
        }
    }
}

/// One def-use edge seen from the definition side: operand `index` of
/// instruction `user` refers to the value owning this use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Use {
    pub user: InstrId,
    pub index: usize,
}

/// Source location attached to an instruction.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

impl Location {
    /// Location of compiler-synthesized code.
    pub const UNKNOWN: Location = Location { line: 0, column: 0 };

    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    pub fn is_unknown(&self) -> bool {
        *self == Location::UNKNOWN
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_unknown() {
            write!(f, "<unknown>")
        } else {
            write!(f, "{}:{}", self.line, self.column)
        }
    }
}
