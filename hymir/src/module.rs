//! Module, function and basic block containers.
//!
//! A [`Module`] owns every entity of the IR in arenas. Def-use edges are
//! stored twice, as operand slots on the user and as [`Use`] entries on the
//! referenced value; every mutation helper on [`Module`] updates both sides
//! before returning, and no API hands out mutable access to either list.
use std::collections::BTreeMap;

use auto_enums::auto_enum;
use log::trace;
use slotmap::SlotMap;

use crate::{
    instructions::{InstrKind, Instruction},
    types::FnSignature,
    utils::Error,
    value::{ArgId, BlockId, FuncId, InstrId, Location, Use, Value},
};

/// A function: a signature and an ordered list of basic blocks.
///
/// A function without blocks is an external declaration. By convention the
/// first block is the entry block and its arguments are the formal
/// parameters.
#[derive(Debug, Clone)]
pub struct Function {
    name: String,
    signature: FnSignature,
    blocks: Vec<BlockId>,
}

impl Function {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &FnSignature {
        &self.signature
    }

    pub fn blocks(&self) -> &[BlockId] {
        &self.blocks
    }

    /// Returns true if the function is defined in this module (as opposed to
    /// declared).
    pub fn has_body(&self) -> bool {
        !self.blocks.is_empty()
    }

    pub fn entry_block(&self) -> Option<BlockId> {
        self.blocks.first().copied()
    }
}

/// A sequence of instructions ending with a terminator.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    parent: FuncId,
    arguments: Vec<ArgId>,
    instructions: Vec<InstrId>,
}

impl BasicBlock {
    pub fn parent(&self) -> FuncId {
        self.parent
    }

    pub fn arguments(&self) -> &[ArgId] {
        &self.arguments
    }

    /// Instructions in program order.
    pub fn instructions(&self) -> &[InstrId] {
        &self.instructions
    }
}

/// A value flowing into a basic block.
#[derive(Debug, Clone)]
pub struct BlockArgument {
    parent: BlockId,
    index: usize,
    uses: Vec<Use>,
}

impl BlockArgument {
    pub fn parent(&self) -> BlockId {
        self.parent
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn uses(&self) -> &[Use] {
        &self.uses
    }
}

/// The compilation unit: functions and everything they contain.
#[derive(Debug, Default, Clone)]
pub struct Module {
    functions: SlotMap<FuncId, Function>,
    blocks: SlotMap<BlockId, BasicBlock>,
    instructions: SlotMap<InstrId, Instruction>,
    arguments: SlotMap<ArgId, BlockArgument>,
    names: BTreeMap<String, FuncId>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Functions and blocks
    // ------------------------------------------------------------------

    /// Declare a function. It has no body until a block is appended.
    pub fn add_function(
        &mut self,
        name: impl Into<String>,
        signature: FnSignature,
    ) -> Result<FuncId, Error> {
        let name = name.into();
        if self.names.contains_key(&name) {
            return Err(Error::DuplicateFunctionName(name));
        }

        let id = self.functions.insert(Function {
            name: name.clone(),
            signature,
            blocks: Vec::new(),
        });
        self.names.insert(name, id);
        Ok(id)
    }

    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[id]
    }

    pub fn get_function(&self, id: FuncId) -> Option<&Function> {
        self.functions.get(id)
    }

    pub fn function_by_name(&self, name: &str) -> Option<FuncId> {
        self.names.get(name).copied()
    }

    /// Functions in declaration order.
    pub fn functions(&self) -> impl Iterator<Item = (FuncId, &Function)> {
        self.functions.iter()
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    /// Append an empty block to `function`. The first appended block is the
    /// entry block.
    pub fn append_block(&mut self, function: FuncId) -> BlockId {
        let id = self.blocks.insert(BasicBlock {
            parent: function,
            arguments: Vec::new(),
            instructions: Vec::new(),
        });
        self.functions[function].blocks.push(id);
        id
    }

    /// Append an argument to `block`.
    pub fn add_block_argument(&mut self, block: BlockId) -> ArgId {
        let index = self.blocks[block].arguments.len();
        let id = self.arguments.insert(BlockArgument {
            parent: block,
            index,
            uses: Vec::new(),
        });
        self.blocks[block].arguments.push(id);
        id
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id]
    }

    pub fn argument(&self, id: ArgId) -> &BlockArgument {
        &self.arguments[id]
    }

    pub fn entry_block(&self, function: FuncId) -> Option<BlockId> {
        self.functions[function].entry_block()
    }

    /// Formal parameters of `function`; empty for declarations.
    pub fn formal_parameters(&self, function: FuncId) -> &[ArgId] {
        match self.entry_block(function) {
            Some(entry) => &self.blocks[entry].arguments,
            None => &[],
        }
    }

    pub fn formal_parameter(&self, function: FuncId, index: usize) -> Option<ArgId> {
        self.formal_parameters(function).get(index).copied()
    }

    /// The trailing terminator of `block`, if present.
    pub fn terminator(&self, block: BlockId) -> Option<InstrId> {
        self.blocks[block]
            .instructions
            .last()
            .copied()
            .filter(|&last| self.instructions[last].kind.is_terminator())
    }

    #[auto_enum(Iterator)]
    pub fn successors(&self, block: BlockId) -> impl Iterator<Item = BlockId> {
        match self.terminator(block).map(|t| &self.instructions[t].kind) {
            Some(InstrKind::Branch { target }) => std::iter::once(*target),
            Some(InstrKind::CondBranch { on_true, on_false }) => [*on_true, *on_false].into_iter(),
            _ => std::iter::empty(),
        }
    }

    // ------------------------------------------------------------------
    // Instructions and values
    // ------------------------------------------------------------------

    pub fn instruction(&self, id: InstrId) -> &Instruction {
        self.instructions
            .get(id)
            .unwrap_or_else(|| panic!("instruction `{id:?}` is not part of the module (erased?)"))
    }

    pub fn get_instruction(&self, id: InstrId) -> Option<&Instruction> {
        self.instructions.get(id)
    }

    pub fn contains_instruction(&self, id: InstrId) -> bool {
        self.instructions.contains_key(id)
    }

    pub fn contains_value(&self, value: Value) -> bool {
        match value {
            Value::Instr(id) => self.instructions.contains_key(id),
            Value::Arg(id) => self.arguments.contains_key(id),
        }
    }

    pub fn instruction_count(&self) -> usize {
        self.instructions.len()
    }

    /// Uses of `value`, in the order they were created.
    pub fn uses(&self, value: Value) -> &[Use] {
        match value {
            Value::Instr(id) => &self.instruction(id).uses,
            Value::Arg(id) => &self.arguments[id].uses,
        }
    }

    pub fn has_uses(&self, value: Value) -> bool {
        !self.uses(value).is_empty()
    }

    pub fn parent_block(&self, instr: InstrId) -> BlockId {
        self.instruction(instr).parent
    }

    pub fn parent_function(&self, instr: InstrId) -> FuncId {
        self.blocks[self.parent_block(instr)].parent
    }

    fn uses_mut(&mut self, value: Value) -> &mut Vec<Use> {
        match value {
            Value::Instr(id) => &mut self.instructions[id].uses,
            Value::Arg(id) => &mut self.arguments[id].uses,
        }
    }

    fn remove_use(&mut self, value: Value, edge: Use) {
        let uses = self.uses_mut(value);
        match uses.iter().position(|u| *u == edge) {
            Some(position) => {
                uses.remove(position);
            }
            None => unreachable!("use list of `{value}` is missing {edge:?}"),
        }
    }

    /// Create an instruction and insert it at `position` in `block`.
    ///
    /// Every operand must refer to a live value. The use lists of the
    /// operands are updated before this returns.
    pub fn insert_instruction(
        &mut self,
        block: BlockId,
        position: usize,
        kind: InstrKind,
        operands: impl IntoIterator<Item = Value>,
        location: Location,
    ) -> InstrId {
        let operands = operands.into_iter().map(Some).collect();
        let id = self.instructions.insert(Instruction {
            kind,
            operands,
            parent: block,
            location,
            uses: Vec::new(),
        });

        let count = self.instructions[id].operands.len();
        for index in 0..count {
            if let Some(value) = self.instructions[id].operands[index] {
                assert!(
                    self.contains_value(value),
                    "operand {index} of new instruction `{id:?}` refers to erased value `{value}`"
                );
                self.uses_mut(value).push(Use { user: id, index });
            }
        }

        let instructions = &mut self.blocks[block].instructions;
        assert!(
            position <= instructions.len(),
            "insertion position {position} is past the end of block `{block:?}`"
        );
        instructions.insert(position, id);

        trace!(
            "inserted {} `{id:?}` into block `{block:?}` at {position}",
            self.instructions[id].opcode()
        );
        id
    }

    /// Index of `instr` within its parent block.
    pub fn position_in_block(&self, instr: InstrId) -> usize {
        let block = self.parent_block(instr);
        match self.blocks[block].instructions.iter().position(|&i| i == instr) {
            Some(position) => position,
            None => unreachable!("instruction `{instr:?}` is not listed in its parent block"),
        }
    }

    /// Point operand `index` of `user` at `value`, returning what it referred
    /// to before.
    pub fn set_operand(&mut self, user: InstrId, index: usize, value: Value) -> Option<Value> {
        assert!(
            self.contains_value(value),
            "cannot set operand {index} of `{user:?}` to erased value `{value}`"
        );
        let previous = self.drop_operand(user, index);
        self.instructions[user].operands[index] = Some(value);
        self.uses_mut(value).push(Use { user, index });
        previous
    }

    /// Sever operand `index` of `user`, returning the value it referred to.
    /// The slot stays in place, empty.
    pub fn drop_operand(&mut self, user: InstrId, index: usize) -> Option<Value> {
        let previous = self.instruction(user).operands[index];
        if let Some(value) = previous {
            self.instructions[user].operands[index] = None;
            self.remove_use(value, Use { user, index });
        }
        previous
    }

    /// Sever every operand of `user`.
    pub fn drop_all_operands(&mut self, user: InstrId) {
        for index in 0..self.instruction(user).operands.len() {
            self.drop_operand(user, index);
        }
    }

    /// Redirect every use of `old` to `new`.
    pub fn replace_all_uses_with(&mut self, old: Value, new: Value) {
        assert_ne!(old, new, "cannot replace a value with itself");
        assert!(
            self.contains_value(new),
            "cannot replace uses of `{old}` with erased value `{new}`"
        );

        let uses = std::mem::take(self.uses_mut(old));
        for edge in &uses {
            self.instructions[edge.user].operands[edge.index] = Some(new);
        }
        self.uses_mut(new).extend(uses);
    }

    /// Remove `instr` from its block and free it.
    ///
    /// # Panics
    /// If the instruction still has uses. Callers must redirect or erase the
    /// users first.
    pub fn erase_instruction(&mut self, instr: InstrId) {
        let node = self.instruction(instr);
        assert!(
            !node.has_uses(),
            "cannot erase {} `{instr:?}`: it still has {} use(s)",
            node.opcode(),
            node.uses.len()
        );

        self.drop_all_operands(instr);
        let position = self.position_in_block(instr);
        let block = self.instructions[instr].parent;
        self.blocks[block].instructions.remove(position);
        self.instructions.remove(instr);
        trace!("erased `{instr:?}` from block `{block:?}`");
    }

    // ------------------------------------------------------------------
    // Verification
    // ------------------------------------------------------------------

    /// Check the structural invariants of the module:
    /// 1) every block of a function points back to it and ends with exactly
    ///    one terminator;
    /// 2) every operand refers to a live value whose use list records it;
    /// 3) every use list entry corresponds to an operand slot.
    pub fn verify(&self) -> Result<(), Error> {
        for (function_id, function) in self.functions.iter() {
            for &block_id in &function.blocks {
                let block = &self.blocks[block_id];
                if block.parent != function_id {
                    return Err(Error::BlockParentMismatch {
                        function: function_id,
                        block: block_id,
                    });
                }

                let Some((&last, rest)) = block.instructions.split_last() else {
                    return Err(Error::MissingTerminator {
                        function: function.name.clone(),
                        block: block_id,
                    });
                };

                for &instr in rest {
                    if self.instructions[instr].kind.is_terminator() {
                        return Err(Error::MisplacedTerminator {
                            function: function.name.clone(),
                            block: block_id,
                            instr,
                        });
                    }
                }

                if !self.instructions[last].kind.is_terminator() {
                    return Err(Error::MissingTerminator {
                        function: function.name.clone(),
                        block: block_id,
                    });
                }

                for &instr in &block.instructions {
                    if self.instructions[instr].parent != block_id {
                        return Err(Error::ParentMismatch {
                            instr,
                            block: block_id,
                        });
                    }
                }
            }
        }

        for (user, instr) in self.instructions.iter() {
            for (index, operand) in instr.operands.iter().enumerate() {
                let Some(value) = *operand else { continue };
                if !self.contains_value(value) {
                    return Err(Error::DanglingOperand { user, index });
                }
                if !self.uses(value).contains(&Use { user, index }) {
                    return Err(Error::MissingUse { user, index, value });
                }
            }
        }

        let values = self
            .instructions
            .keys()
            .map(Value::Instr)
            .chain(self.arguments.keys().map(Value::Arg));
        for value in values {
            for edge in self.uses(value) {
                let referenced = self
                    .instructions
                    .get(edge.user)
                    .and_then(|user| user.operands.get(edge.index).copied().flatten());
                if referenced != Some(value) {
                    return Err(Error::StaleUse {
                        value,
                        user: edge.user,
                        index: edge.index,
                    });
                }
            }
        }

        Ok(())
    }
}
