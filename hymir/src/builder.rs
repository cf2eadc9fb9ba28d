//! Instruction builder.
//!
//! A [`Builder`] inserts new instructions either at the end of a block or
//! immediately before an existing instruction, stamping each of them with
//! its current [`Location`].
use crate::{
    instructions::{ApplyInfo, InstrKind, PartialApplyInfo},
    module::Module,
    value::{BlockId, FuncId, InstrId, Location, Value},
};

#[derive(Debug, Clone, Copy)]
enum InsertPoint {
    End,
    Before(InstrId),
}

pub struct Builder<'m> {
    module: &'m mut Module,
    block: BlockId,
    point: InsertPoint,
    location: Location,
}

impl<'m> Builder<'m> {
    /// Append to the end of `block`.
    pub fn at_end(module: &'m mut Module, block: BlockId) -> Self {
        Self {
            module,
            block,
            point: InsertPoint::End,
            location: Location::UNKNOWN,
        }
    }

    /// Insert before `instr`, inheriting its location.
    pub fn before(module: &'m mut Module, instr: InstrId) -> Self {
        let node = module.instruction(instr);
        let block = node.parent();
        let location = node.location();
        Self {
            module,
            block,
            point: InsertPoint::Before(instr),
            location,
        }
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    pub fn set_location(&mut self, location: Location) {
        self.location = location;
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn block(&self) -> BlockId {
        self.block
    }

    pub fn module(&mut self) -> &mut Module {
        &mut *self.module
    }

    /// Insert an instruction of any kind at the insertion point.
    pub fn insert(&mut self, kind: InstrKind, operands: &[Value]) -> InstrId {
        let position = match self.point {
            InsertPoint::End => self.module.block(self.block).instructions().len(),
            InsertPoint::Before(instr) => self.module.position_in_block(instr),
        };
        self.module.insert_instruction(
            self.block,
            position,
            kind,
            operands.iter().copied(),
            self.location,
        )
    }

    pub fn create_integer_literal(&mut self, value: i128) -> InstrId {
        self.insert(InstrKind::IntegerLiteral { value }, &[])
    }

    pub fn create_function_ref(&mut self, function: FuncId) -> InstrId {
        self.insert(InstrKind::FunctionRef { function }, &[])
    }

    pub fn create_builtin_ref(&mut self, name: impl Into<String>) -> InstrId {
        self.insert(InstrKind::BuiltinRef { name: name.into() }, &[])
    }

    pub fn create_global_addr(&mut self, name: impl Into<String>) -> InstrId {
        self.insert(InstrKind::GlobalAddr { name: name.into() }, &[])
    }

    pub fn create_alloc_stack(&mut self) -> InstrId {
        self.insert(InstrKind::AllocStack, &[])
    }

    pub fn create_dealloc_stack(&mut self, addr: Value) -> InstrId {
        self.insert(InstrKind::DeallocStack, &[addr])
    }

    pub fn create_load(&mut self, addr: Value) -> InstrId {
        self.insert(InstrKind::Load, &[addr])
    }

    pub fn create_store(&mut self, value: Value, dest: Value) -> InstrId {
        self.insert(InstrKind::Store, &[value, dest])
    }

    pub fn create_assign(&mut self, value: Value, dest: Value) -> InstrId {
        self.insert(InstrKind::Assign, &[value, dest])
    }

    pub fn create_copy_addr(&mut self, src: Value, dest: Value, take: bool, initialize: bool) -> InstrId {
        self.insert(InstrKind::CopyAddr { take, initialize }, &[src, dest])
    }

    pub fn create_struct(&mut self, elements: &[Value]) -> InstrId {
        self.insert(InstrKind::Struct, elements)
    }

    pub fn create_tuple(&mut self, elements: &[Value]) -> InstrId {
        self.insert(InstrKind::Tuple, elements)
    }

    pub fn create_struct_extract(&mut self, aggregate: Value, field: u32) -> InstrId {
        self.insert(InstrKind::StructExtract { field }, &[aggregate])
    }

    pub fn create_struct_element_addr(&mut self, base: Value, field: u32) -> InstrId {
        self.insert(InstrKind::StructElementAddr { field }, &[base])
    }

    pub fn create_tuple_element_addr(&mut self, base: Value, index: u32) -> InstrId {
        self.insert(InstrKind::TupleElementAddr { index }, &[base])
    }

    pub fn create_project_existential(&mut self, base: Value) -> InstrId {
        self.insert(InstrKind::ProjectExistential, &[base])
    }

    pub fn create_open_existential(&mut self, base: Value) -> InstrId {
        self.insert(InstrKind::OpenExistential, &[base])
    }

    pub fn create_mark_uninitialized(&mut self, base: Value) -> InstrId {
        self.insert(InstrKind::MarkUninitialized, &[base])
    }

    pub fn create_address_to_pointer(&mut self, base: Value) -> InstrId {
        self.insert(InstrKind::AddressToPointer, &[base])
    }

    pub fn create_pointer_to_address(&mut self, base: Value) -> InstrId {
        self.insert(InstrKind::PointerToAddress, &[base])
    }

    pub fn create_protocol_method(&mut self, receiver: Value, member: impl Into<String>) -> InstrId {
        self.insert(
            InstrKind::ProtocolMethod {
                member: member.into(),
            },
            &[receiver],
        )
    }

    pub fn create_debug_value(&mut self, value: Value) -> InstrId {
        self.insert(InstrKind::DebugValue, &[value])
    }

    pub fn create_debug_value_addr(&mut self, addr: Value) -> InstrId {
        self.insert(InstrKind::DebugValueAddr, &[addr])
    }

    pub fn create_cond_fail(&mut self, condition: Value) -> InstrId {
        self.insert(InstrKind::CondFail, &[condition])
    }

    /// Full application of `callee` to `args`.
    pub fn create_apply(&mut self, callee: Value, args: &[Value], info: ApplyInfo) -> InstrId {
        let operands: Vec<Value> = std::iter::once(callee).chain(args.iter().copied()).collect();
        self.insert(InstrKind::Apply(info), &operands)
    }

    /// Closure formation capturing `args` as the trailing parameters of
    /// `callee`.
    pub fn create_partial_apply(
        &mut self,
        callee: Value,
        args: &[Value],
        info: PartialApplyInfo,
    ) -> InstrId {
        let operands: Vec<Value> = std::iter::once(callee).chain(args.iter().copied()).collect();
        self.insert(InstrKind::PartialApply(info), &operands)
    }

    pub fn create_return(&mut self, value: Value) -> InstrId {
        self.insert(InstrKind::Return, &[value])
    }

    pub fn create_branch(&mut self, target: BlockId, args: &[Value]) -> InstrId {
        self.insert(InstrKind::Branch { target }, args)
    }

    pub fn create_cond_branch(&mut self, condition: Value, on_true: BlockId, on_false: BlockId) -> InstrId {
        self.insert(InstrKind::CondBranch { on_true, on_false }, &[condition])
    }

    pub fn create_unreachable(&mut self) -> InstrId {
        self.insert(InstrKind::Unreachable, &[])
    }
}
