//! Helpers for building small test graphs.
use hymir::{
    BlockId, FuncId, InstrId, Value,
    builder::Builder,
    module::Module,
    types::FnSignature,
};

use crate::purity::{BuiltinKind, IntrinsicAttributes, PurityFact, PurityTable};

/// A module holding one function `test` whose entry block ends with
/// `unreachable`. New instructions are inserted before the terminator, so
/// the module verifies at every step.
pub struct Fixture {
    pub module: Module,
    pub function: FuncId,
    pub entry: BlockId,
    pub terminator: InstrId,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_signature(FnSignature::default())
    }

    /// The `test` function takes one entry block argument per parameter of
    /// `signature`.
    pub fn with_signature(signature: FnSignature) -> Self {
        let mut module = Module::new();
        let (function, entry, terminator) = define_in(&mut module, "test", signature);
        Self {
            module,
            function,
            entry,
            terminator,
        }
    }

    /// Builder inserting before the terminator of `test`.
    pub fn builder(&mut self) -> Builder<'_> {
        Builder::before(&mut self.module, self.terminator)
    }

    pub fn param(&self, index: usize) -> Value {
        self.module
            .formal_parameter(self.function, index)
            .unwrap_or_else(|| panic!("`test` has no parameter {index}"))
            .into()
    }

    /// Add a function with a body. Returns the function and a builder
    /// position (its terminator) for filling it.
    pub fn define(&mut self, name: &str, signature: FnSignature) -> (FuncId, InstrId) {
        let (function, _, terminator) = define_in(&mut self.module, name, signature);
        (function, terminator)
    }

    /// Add an external declaration.
    pub fn declare(&mut self, name: &str, signature: FnSignature) -> FuncId {
        self.module
            .add_function(name, signature)
            .unwrap_or_else(|err| panic!("cannot declare `{name}`: {err}"))
    }

    /// Instructions of the entry block of `test`, terminator included.
    pub fn live(&self) -> Vec<InstrId> {
        self.module.block(self.entry).instructions().to_vec()
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}

fn define_in(module: &mut Module, name: &str, signature: FnSignature) -> (FuncId, BlockId, InstrId) {
    let arity = signature.params.len();
    let function = module
        .add_function(name, signature)
        .unwrap_or_else(|err| panic!("cannot define `{name}`: {err}"));
    let entry = module.append_block(function);
    for _ in 0..arity {
        module.add_block_argument(entry);
    }
    let terminator = Builder::at_end(module, entry).create_unreachable();
    (function, entry, terminator)
}

/// An oracle that knows `add` (pure), `sdiv` (may trap), `destroy`
/// (effectful) and two intrinsics, `test.pure` and `test.unwinds`.
pub fn synthetic_oracle() -> PurityTable {
    PurityTable::empty()
        .with_builtin(BuiltinKind::Add, PurityFact::READ_NONE | PurityFact::NEVER_TRAPS)
        .with_builtin(BuiltinKind::SDiv, PurityFact::READ_NONE)
        .with_builtin(BuiltinKind::Destroy, PurityFact::empty())
        .with_intrinsic(
            "test.pure",
            IntrinsicAttributes::READ_NONE | IntrinsicAttributes::NO_UNWIND,
        )
        .with_intrinsic("test.unwinds", IntrinsicAttributes::READ_NONE)
}
