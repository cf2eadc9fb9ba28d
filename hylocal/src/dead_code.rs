//! Dead instruction detection and recursive deletion.
use std::collections::BTreeSet;

use hymir::{
    InstrId, Value,
    instructions::{InstrKind, layout},
    module::Module,
};
use log::{debug, trace};
use smallvec::SmallVec;

use crate::purity::{PurityOracle, is_side_effect_free};

/// Returns the callee of `apply` if it is a direct reference to a primitive.
fn builtin_callee(module: &Module, apply: InstrId) -> Option<InstrId> {
    match module.instruction(apply).operand(layout::CALLEE) {
        Some(Value::Instr(callee)) if module.instruction(callee).kind().is_builtin_ref() => {
            Some(callee)
        }
        _ => None,
    }
}

/// Returns true if `instr` can be removed without changing the observable
/// behavior of the program.
///
/// An instruction is trivially dead when nothing uses its result, it is not
/// a terminator and it has no side effect. Calls to primitives the oracle
/// reports as side-effect free and `cond_fail` on a literal zero qualify;
/// `mark_uninitialized` never does, as it carries an initialization
/// obligation for later passes.
pub fn is_instruction_trivially_dead<O: PurityOracle + ?Sized>(
    module: &Module,
    oracle: &O,
    instr: InstrId,
) -> bool {
    let node = module.instruction(instr);
    if node.has_uses() || node.kind().is_terminator() {
        return false;
    }

    match node.kind() {
        InstrKind::Apply(_) => {
            if let Some(callee) = builtin_callee(module, instr) {
                if is_side_effect_free(module, oracle, callee) {
                    return true;
                }
            }
        }
        InstrKind::CondFail => {
            if let Some(Value::Instr(condition)) = node.operand(layout::BASE) {
                if let InstrKind::IntegerLiteral { value: 0 } = module.instruction(condition).kind() {
                    return true;
                }
            }
        }
        InstrKind::MarkUninitialized => return false,
        _ => {}
    }

    !node.kind().may_have_side_effects()
}

/// Delete the given instructions together with every operand that becomes
/// trivially dead as a result, transitively.
///
/// Without `force` only the given instructions that are themselves trivially
/// dead are deleted. With `force` all of them are, and the caller is
/// responsible for their uses: an instruction still used from outside the
/// set is a fatal error. Ids that no longer refer to a live instruction are
/// ignored.
///
/// Deletion proceeds in rounds. Every operand of every pending instruction
/// is severed first, so that instructions of the same round may use each
/// other, then the operands that became trivially dead are collected for the
/// next round and the pending instructions are erased.
///
/// Returns true if at least one instruction was deleted.
pub fn recursively_delete_trivially_dead_instructions<O: PurityOracle + ?Sized>(
    module: &mut Module,
    oracle: &O,
    instrs: impl IntoIterator<Item = InstrId>,
    force: bool,
) -> bool {
    let mut pending: BTreeSet<InstrId> = instrs
        .into_iter()
        .filter(|&instr| module.contains_instruction(instr))
        .filter(|&instr| force || is_instruction_trivially_dead(module, oracle, instr))
        .collect();

    let mut deleted = 0usize;
    while !pending.is_empty() {
        let mut next = BTreeSet::new();

        for &instr in &pending {
            let operands: SmallVec<Value, 4> = module.instruction(instr).operand_values().collect();
            module.drop_all_operands(instr);

            for operand in operands {
                let Value::Instr(operand) = operand else {
                    continue;
                };
                if !pending.contains(&operand)
                    && is_instruction_trivially_dead(module, oracle, operand)
                {
                    next.insert(operand);
                }
            }
        }

        for &instr in &pending {
            trace!(
                "deleting dead {} `{instr:?}`",
                module.instruction(instr).opcode()
            );
            module.erase_instruction(instr);
        }

        deleted += pending.len();
        pending = next;
    }

    if deleted > 0 {
        debug!("deleted {deleted} dead instruction(s)");
    }
    deleted > 0
}

/// Single instruction form of [`recursively_delete_trivially_dead_instructions`].
pub fn recursively_delete_trivially_dead_instruction<O: PurityOracle + ?Sized>(
    module: &mut Module,
    oracle: &O,
    instr: InstrId,
    force: bool,
) -> bool {
    recursively_delete_trivially_dead_instructions(module, oracle, [instr], force)
}
