//! Instruction kinds and the instruction node.
//!
//! An instruction is a [`InstrKind`] (what it does, plus any non-value
//! payload) together with an ordered list of operand slots. Operand layouts
//! are fixed per kind; see [`layout`] for the positions that analyses rely
//! on.
use bitflags::bitflags;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use strum::{EnumDiscriminants, EnumIs, EnumTryAs, IntoStaticStr};

use crate::{
    types::{FnSignature, Substitution},
    value::{BlockId, FuncId, Location, Use, Value},
};

bitflags! {
    /// General metadata about an instruction kind.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    pub struct InstructionFlags: u32 {
        /// Ends a basic block.
        const TERMINATOR = 1 << 0;

        /// Materializes a constant.
        const LITERAL = 1 << 1;

        /// May read memory reachable by other code.
        const READS_MEMORY = 1 << 2;

        /// May write memory reachable by other code.
        const WRITES_MEMORY = 1 << 3;

        /// May abort execution.
        const MAY_TRAP = 1 << 4;

        /// Has an effect not captured by the memory bits (allocation
        /// lifetimes, debug information, opaque calls).
        const SIDE_EFFECTS = 1 << 5;

        /// Derives an address (or reinterprets one) from its single operand
        /// without touching memory.
        const ADDRESS_PROJECTION = 1 << 6;
    }
}

/// Operand positions shared by analyses.
pub mod layout {
    /// Callee of `Apply` and `PartialApply`. Arguments follow.
    pub const CALLEE: usize = 0;
    /// Stored value of `Store` and `Assign`.
    pub const STORE_VALUE: usize = 0;
    /// Destination address of `Store` and `Assign`.
    pub const STORE_DEST: usize = 1;
    /// Source address of `CopyAddr`.
    pub const COPY_SRC: usize = 0;
    /// Destination address of `CopyAddr`.
    pub const COPY_DEST: usize = 1;
    /// Single operand of projections, casts, loads and `CondFail`.
    pub const BASE: usize = 0;
}

/// Call-site metadata of a full application.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ApplyInfo {
    /// Signature of the callee after substitution.
    pub callee_type: FnSignature,
    /// Generic bindings applied at this call site.
    pub substitutions: Vec<Substitution>,
    /// The call is marked for mandatory inlining.
    pub transparent: bool,
}

impl ApplyInfo {
    pub fn new(callee_type: FnSignature) -> Self {
        Self {
            callee_type,
            substitutions: Vec::new(),
            transparent: false,
        }
    }

    pub fn has_substitutions(&self) -> bool {
        !self.substitutions.is_empty()
    }
}

/// Call-site metadata of a partial application (closure construction).
///
/// Captured arguments bind the *trailing* parameters of `callee_type`.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PartialApplyInfo {
    pub callee_type: FnSignature,
    pub substitutions: Vec<Substitution>,
}

impl PartialApplyInfo {
    pub fn new(callee_type: FnSignature) -> Self {
        Self {
            callee_type,
            substitutions: Vec::new(),
        }
    }

    pub fn has_substitutions(&self) -> bool {
        !self.substitutions.is_empty()
    }
}

/// Discriminated union covering all instruction kinds.
///
/// Operands are not stored here; the comment on each variant gives the
/// operand layout expected by [`crate::module::Module::insert_instruction`].
#[derive(Debug, Clone, Hash, PartialEq, Eq, EnumIs, EnumTryAs, EnumDiscriminants)]
#[strum_discriminants(name(InstrOpcode))]
#[strum_discriminants(derive(Hash, PartialOrd, Ord, IntoStaticStr))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum InstrKind {
    /// `[]`
    IntegerLiteral { value: i128 },
    /// `[]`
    FunctionRef { function: FuncId },
    /// `[]` Reference to a primitive operation (named builtin or foreign
    /// intrinsic), resolved by name.
    BuiltinRef { name: String },
    /// `[]`
    GlobalAddr { name: String },
    /// `[]`
    AllocStack,
    /// `[addr]`
    DeallocStack,
    /// `[addr]`
    Load,
    /// `[value, dest]`
    Store,
    /// `[value, dest]`
    Assign,
    /// `[src, dest]`
    CopyAddr { take: bool, initialize: bool },
    /// `[elements...]`
    Struct,
    /// `[elements...]`
    Tuple,
    /// `[aggregate]`
    StructExtract { field: u32 },
    /// `[base]`
    StructElementAddr { field: u32 },
    /// `[base]`
    TupleElementAddr { index: u32 },
    /// `[base]`
    ProjectExistential,
    /// `[base]`
    OpenExistential,
    /// `[base]` Carries a definite-initialization obligation.
    MarkUninitialized,
    /// `[base]`
    AddressToPointer,
    /// `[base]`
    PointerToAddress,
    /// `[receiver]` Dynamic dispatch lookup.
    ProtocolMethod { member: String },
    /// `[value]`
    DebugValue,
    /// `[addr]`
    DebugValueAddr,
    /// `[condition]` Traps when the condition is non-zero.
    CondFail,
    /// `[callee, args...]`
    Apply(ApplyInfo),
    /// `[callee, captured args...]`
    PartialApply(PartialApplyInfo),
    /// `[value]`
    Return,
    /// `[block args...]`
    Branch { target: BlockId },
    /// `[condition]`
    CondBranch { on_true: BlockId, on_false: BlockId },
    /// `[]`
    Unreachable,
}

impl InstrKind {
    pub fn opcode(&self) -> InstrOpcode {
        self.into()
    }

    pub fn flags(&self) -> InstructionFlags {
        use InstrKind::*;

        match self {
            IntegerLiteral { .. } => InstructionFlags::LITERAL,
            FunctionRef { .. } | BuiltinRef { .. } | GlobalAddr { .. } => {
                InstructionFlags::empty()
            }
            AllocStack => InstructionFlags::SIDE_EFFECTS,
            DeallocStack => InstructionFlags::SIDE_EFFECTS | InstructionFlags::WRITES_MEMORY,
            Load => InstructionFlags::READS_MEMORY,
            Store | Assign => InstructionFlags::WRITES_MEMORY,
            CopyAddr { .. } => InstructionFlags::READS_MEMORY | InstructionFlags::WRITES_MEMORY,
            Struct | Tuple | StructExtract { .. } => InstructionFlags::empty(),
            StructElementAddr { .. }
            | TupleElementAddr { .. }
            | ProjectExistential
            | OpenExistential
            | MarkUninitialized
            | AddressToPointer
            | PointerToAddress => InstructionFlags::ADDRESS_PROJECTION,
            ProtocolMethod { .. } => InstructionFlags::empty(),
            DebugValue | DebugValueAddr => InstructionFlags::SIDE_EFFECTS,
            CondFail => InstructionFlags::MAY_TRAP,
            Apply(_) => {
                InstructionFlags::SIDE_EFFECTS
                    | InstructionFlags::READS_MEMORY
                    | InstructionFlags::WRITES_MEMORY
                    | InstructionFlags::MAY_TRAP
            }
            PartialApply(_) => InstructionFlags::empty(),
            Return | Branch { .. } | CondBranch { .. } | Unreachable => {
                InstructionFlags::TERMINATOR
            }
        }
    }

    #[inline]
    pub fn is_terminator(&self) -> bool {
        self.flags().contains(InstructionFlags::TERMINATOR)
    }

    /// Returns true if removing an unused instance of this kind could change
    /// observable behavior.
    #[inline]
    pub fn may_have_side_effects(&self) -> bool {
        self.flags().intersects(
            InstructionFlags::WRITES_MEMORY
                | InstructionFlags::MAY_TRAP
                | InstructionFlags::SIDE_EFFECTS,
        )
    }

    /// Returns true for call sites (full or partial application).
    pub fn is_call_site(&self) -> bool {
        matches!(self, InstrKind::Apply(_) | InstrKind::PartialApply(_))
    }
}

impl std::fmt::Display for InstrOpcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name: &'static str = self.into();
        f.write_str(name)
    }
}

/// An instruction node stored in a module.
///
/// Fields are only mutable through [`crate::module::Module`], which keeps
/// the operand slots and the use lists of the referenced values in sync.
#[derive(Debug, Clone)]
pub struct Instruction {
    pub(crate) kind: InstrKind,
    pub(crate) operands: SmallVec<Option<Value>, 4>,
    pub(crate) parent: BlockId,
    pub(crate) location: Location,
    pub(crate) uses: Vec<Use>,
}

impl Instruction {
    pub fn kind(&self) -> &InstrKind {
        &self.kind
    }

    pub fn opcode(&self) -> InstrOpcode {
        self.kind.opcode()
    }

    /// Operand slots in order. A `None` slot has been severed.
    pub fn operands(&self) -> &[Option<Value>] {
        &self.operands
    }

    pub fn operand(&self, index: usize) -> Option<Value> {
        self.operands.get(index).copied().flatten()
    }

    pub fn num_operands(&self) -> usize {
        self.operands.len()
    }

    /// Live operand values, severed slots skipped.
    pub fn operand_values(&self) -> impl Iterator<Item = Value> + '_ {
        self.operands.iter().filter_map(|op| *op)
    }

    /// Argument operands of a call site (everything after the callee).
    pub fn arguments(&self) -> &[Option<Value>] {
        debug_assert!(self.kind.is_call_site());
        self.operands.get(layout::CALLEE + 1..).unwrap_or(&[])
    }

    pub fn parent(&self) -> BlockId {
        self.parent
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn uses(&self) -> &[Use] {
        &self.uses
    }

    pub fn has_uses(&self) -> bool {
        !self.uses.is_empty()
    }
}
