use strum::{EnumIs, EnumTryAs};
use thiserror::Error;

use crate::value::{BlockId, FuncId, InstrId, Value};

#[derive(Debug, PartialEq, Eq, Hash, EnumIs, EnumTryAs, Error)]
pub enum Error {
    /// An operand slot refers to a value whose use list does not record it.
    #[error(
        "Operand {index} of instruction `{user:?}` refers to `{value}`, but the use list of `{value}` has no matching entry."
    )]
    MissingUse {
        user: InstrId,
        index: usize,
        value: Value,
    },

    /// A use list entry does not correspond to an operand slot.
    #[error(
        "The use list of `{value}` records operand {index} of instruction `{user:?}`, which does not refer to `{value}`."
    )]
    StaleUse {
        value: Value,
        user: InstrId,
        index: usize,
    },

    /// An operand slot refers to a value that is no longer in the module.
    #[error("Operand {index} of instruction `{user:?}` refers to a value that has been erased.")]
    DanglingOperand { user: InstrId, index: usize },

    /// A basic block does not end with a terminator.
    #[error("Basic block `{block:?}` of function `{function}` does not end with a terminator.")]
    MissingTerminator { function: String, block: BlockId },

    /// A terminator appears before the end of its block.
    #[error(
        "Basic block `{block:?}` of function `{function}` contains terminator `{instr:?}` before its last instruction."
    )]
    MisplacedTerminator {
        function: String,
        block: BlockId,
        instr: InstrId,
    },

    /// An entity's parent link disagrees with its container.
    #[error("Instruction `{instr:?}` is listed in block `{block:?}` but records a different parent.")]
    ParentMismatch { instr: InstrId, block: BlockId },

    /// A block is listed in a function it does not belong to.
    #[error("Basic block `{block:?}` is listed in function `{function:?}` but records a different parent.")]
    BlockParentMismatch { function: FuncId, block: BlockId },

    /// A function with the same name already exists in the module.
    #[error("A function named `{0}` already exists in the module.")]
    DuplicateFunctionName(String),
}
