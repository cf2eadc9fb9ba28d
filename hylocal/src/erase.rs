//! Erasure of the subgraph hanging off an instruction's result.
use std::collections::BTreeSet;

use hymir::{InstrId, Value, module::Module};
use log::{debug, trace};

use crate::{
    dead_code::recursively_delete_trivially_dead_instruction, purity::PurityOracle,
};

/// Erase every transitive user of `instr`.
///
/// Users are erased depth first, each after its own users. Before a user
/// goes away, its operands coming from other instructions are severed and
/// deleted as well if that left them trivially dead. `instr` itself stays in
/// place, with no uses.
///
/// # Panics
/// If the use graph reachable from `instr` contains a cycle.
pub fn erase_uses_of_instruction<O: PurityOracle + ?Sized>(
    module: &mut Module,
    oracle: &O,
    instr: InstrId,
) {
    debug!(
        "erasing the {} use(s) of {} `{instr:?}`",
        module.uses(instr.into()).len(),
        module.instruction(instr).opcode()
    );
    let mut stack = BTreeSet::new();
    erase_users(module, oracle, instr, &mut stack);
}

fn erase_users<O: PurityOracle + ?Sized>(
    module: &mut Module,
    oracle: &O,
    instr: InstrId,
    stack: &mut BTreeSet<InstrId>,
) {
    assert!(
        stack.insert(instr),
        "use chain through `{instr:?}` is cyclic"
    );

    while let Some(edge) = module.uses(instr.into()).first().copied() {
        let user = edge.user;
        erase_users(module, oracle, user, stack);

        // Cleanup of a deeper user may have taken this one with it.
        if !module.contains_instruction(user) {
            continue;
        }

        for index in 0..module.instruction(user).num_operands() {
            let Some(Value::Instr(source)) = module.instruction(user).operand(index) else {
                continue;
            };
            if source == instr {
                continue;
            }
            module.drop_operand(user, index);
            recursively_delete_trivially_dead_instruction(module, oracle, source, false);
        }

        trace!("erasing {} `{user:?}`", module.instruction(user).opcode());
        module.erase_instruction(user);
    }

    stack.remove(&instr);
}

/// Erase every transitive user of `instr`, then `instr` itself together
/// with the operands it leaves dead.
pub fn erase_instruction_and_uses<O: PurityOracle + ?Sized>(
    module: &mut Module,
    oracle: &O,
    instr: InstrId,
) {
    erase_uses_of_instruction(module, oracle, instr);
    recursively_delete_trivially_dead_instruction(module, oracle, instr, true);
}
