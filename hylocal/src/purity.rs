//! Purity oracle adapter.
//!
//! Primitive operations are referenced in the IR by name through
//! `BuiltinRef` instructions. A name is either a recognized named builtin
//! ([`BuiltinKind`]) whose effects are described by a [`PurityFact`], or a
//! foreign intrinsic described by [`IntrinsicAttributes`]. The tables are
//! supplied by the caller through a [`PurityOracle`]; nothing here is global.
use std::collections::BTreeMap;

use bitflags::bitflags;
use enum_map::{Enum, EnumMap};
use hymir::{InstrId, instructions::InstrKind, module::Module};
use log::trace;
use strum::{EnumString, IntoStaticStr};

bitflags! {
    /// Effects of a named builtin.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PurityFact: u8 {
        /// Does not read mutable state.
        const READS_NO_STATE = 1 << 0;
        /// Does not write mutable state.
        const WRITES_NO_STATE = 1 << 1;
        /// Cannot trap or throw. Informational: the side-effect queries of
        /// this crate only consult the read-none bits, so a trapping
        /// arithmetic builtin with an unused result is still deletable.
        const NEVER_TRAPS = 1 << 2;

        const READ_NONE = Self::READS_NO_STATE.bits() | Self::WRITES_NO_STATE.bits();
    }
}

impl PurityFact {
    /// Neither reads nor writes mutable state.
    pub fn is_read_none(self) -> bool {
        self.contains(PurityFact::READ_NONE)
    }

    pub fn never_traps(self) -> bool {
        self.contains(PurityFact::NEVER_TRAPS)
    }
}

bitflags! {
    /// Declared attributes of a foreign intrinsic.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct IntrinsicAttributes: u8 {
        const READ_NONE = 1 << 0;
        const READ_ONLY = 1 << 1;
        const NO_UNWIND = 1 << 2;
    }
}

/// Named builtins understood by the IR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Enum, EnumString, IntoStaticStr)]
pub enum BuiltinKind {
    #[strum(serialize = "add")]
    Add,
    #[strum(serialize = "sub")]
    Sub,
    #[strum(serialize = "mul")]
    Mul,
    #[strum(serialize = "sdiv")]
    SDiv,
    #[strum(serialize = "udiv")]
    UDiv,
    #[strum(serialize = "sadd_with_overflow")]
    SAddWithOverflow,
    #[strum(serialize = "cmp_eq")]
    CmpEq,
    #[strum(serialize = "cmp_ne")]
    CmpNe,
    #[strum(serialize = "cmp_slt")]
    CmpSlt,
    #[strum(serialize = "cmp_ult")]
    CmpUlt,
    #[strum(serialize = "trunc")]
    Trunc,
    #[strum(serialize = "zext")]
    ZExt,
    #[strum(serialize = "sext")]
    SExt,
    #[strum(serialize = "load")]
    Load,
    #[strum(serialize = "assign")]
    Assign,
    #[strum(serialize = "init")]
    Init,
    #[strum(serialize = "destroy")]
    Destroy,
    #[strum(serialize = "alloc_raw")]
    AllocRaw,
    #[strum(serialize = "dealloc_raw")]
    DeallocRaw,
}

/// Source of purity metadata for primitive operations.
pub trait PurityOracle {
    /// Effects of a named builtin.
    fn builtin_fact(&self, builtin: BuiltinKind) -> PurityFact;

    /// Attributes of the foreign intrinsic called `name`, or `None` if the
    /// name is not a known intrinsic.
    fn intrinsic_attributes(&self, name: &str) -> Option<IntrinsicAttributes>;
}

/// Table-backed [`PurityOracle`].
#[derive(Debug, Clone)]
pub struct PurityTable {
    builtins: EnumMap<BuiltinKind, PurityFact>,
    intrinsics: BTreeMap<String, IntrinsicAttributes>,
}

const PURE: PurityFact = PurityFact::READ_NONE.union(PurityFact::NEVER_TRAPS);

const STANDARD_INTRINSICS: &[(&str, IntrinsicAttributes)] = &[
    (
        "llvm.sqrt.f64",
        IntrinsicAttributes::READ_NONE.union(IntrinsicAttributes::NO_UNWIND),
    ),
    (
        "llvm.fabs.f64",
        IntrinsicAttributes::READ_NONE.union(IntrinsicAttributes::NO_UNWIND),
    ),
    (
        "llvm.ctpop.i64",
        IntrinsicAttributes::READ_NONE.union(IntrinsicAttributes::NO_UNWIND),
    ),
    (
        "llvm.objectsize.i64",
        IntrinsicAttributes::READ_ONLY.union(IntrinsicAttributes::NO_UNWIND),
    ),
    ("llvm.memcpy", IntrinsicAttributes::NO_UNWIND),
    ("llvm.trap", IntrinsicAttributes::NO_UNWIND),
];

impl PurityTable {
    /// A table where every builtin is assumed effectful and no intrinsic is
    /// known.
    pub fn empty() -> Self {
        Self {
            builtins: EnumMap::from_fn(|_| PurityFact::empty()),
            intrinsics: BTreeMap::new(),
        }
    }

    /// Facts for the builtins and intrinsics emitted by the front end.
    pub fn standard() -> Self {
        let mut table = Self::empty();
        for (kind, fact) in table.builtins.iter_mut() {
            *fact = match kind {
                BuiltinKind::Add
                | BuiltinKind::Sub
                | BuiltinKind::Mul
                | BuiltinKind::SAddWithOverflow
                | BuiltinKind::CmpEq
                | BuiltinKind::CmpNe
                | BuiltinKind::CmpSlt
                | BuiltinKind::CmpUlt
                | BuiltinKind::Trunc
                | BuiltinKind::ZExt
                | BuiltinKind::SExt => PURE,
                // Division traps on zero.
                BuiltinKind::SDiv | BuiltinKind::UDiv => PurityFact::READ_NONE,
                BuiltinKind::Load => PurityFact::WRITES_NO_STATE | PurityFact::NEVER_TRAPS,
                BuiltinKind::Assign
                | BuiltinKind::Init
                | BuiltinKind::Destroy
                | BuiltinKind::AllocRaw
                | BuiltinKind::DeallocRaw => PurityFact::empty(),
            };
        }

        for (name, attributes) in STANDARD_INTRINSICS {
            table.intrinsics.insert((*name).to_string(), *attributes);
        }
        table
    }

    pub fn with_builtin(mut self, builtin: BuiltinKind, fact: PurityFact) -> Self {
        self.builtins[builtin] = fact;
        self
    }

    pub fn with_intrinsic(mut self, name: impl Into<String>, attributes: IntrinsicAttributes) -> Self {
        self.intrinsics.insert(name.into(), attributes);
        self
    }
}

impl Default for PurityTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl PurityOracle for PurityTable {
    fn builtin_fact(&self, builtin: BuiltinKind) -> PurityFact {
        self.builtins[builtin]
    }

    fn intrinsic_attributes(&self, name: &str) -> Option<IntrinsicAttributes> {
        self.intrinsics.get(name).copied()
    }
}

/// A primitive operation after name resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Builtin(BuiltinKind, PurityFact),
    Intrinsic(IntrinsicAttributes),
}

/// Resolve the primitive referenced by the `BuiltinRef` instruction
/// `builtin_ref`.
///
/// # Panics
/// If the instruction is not a `BuiltinRef`, or if its name is neither a
/// named builtin nor an intrinsic known to `oracle`. Both categories are
/// exhaustive by construction, so a miss is a hole in the oracle.
pub fn resolve_primitive<O: PurityOracle + ?Sized>(
    module: &Module,
    oracle: &O,
    builtin_ref: InstrId,
) -> Primitive {
    let InstrKind::BuiltinRef { name } = module.instruction(builtin_ref).kind() else {
        panic!(
            "`{builtin_ref:?}` is a {}, not a builtin reference",
            module.instruction(builtin_ref).opcode()
        );
    };

    if let Ok(builtin) = name.parse::<BuiltinKind>() {
        return Primitive::Builtin(builtin, oracle.builtin_fact(builtin));
    }

    match oracle.intrinsic_attributes(name) {
        Some(attributes) => Primitive::Intrinsic(attributes),
        None => unreachable!("primitive `{name}` is neither a named builtin nor a known intrinsic"),
    }
}

/// Returns true if calling the referenced primitive has no observable side
/// effect.
pub fn is_side_effect_free<O: PurityOracle + ?Sized>(
    module: &Module,
    oracle: &O,
    builtin_ref: InstrId,
) -> bool {
    let result = match resolve_primitive(module, oracle, builtin_ref) {
        Primitive::Builtin(_, fact) => fact.is_read_none(),
        Primitive::Intrinsic(attributes) => {
            attributes.intersects(IntrinsicAttributes::READ_NONE | IntrinsicAttributes::READ_ONLY)
                && attributes.contains(IntrinsicAttributes::NO_UNWIND)
        }
    };
    trace!("primitive `{builtin_ref:?}` side-effect free: {result}");
    result
}

/// Returns true if the referenced primitive never reads mutable state.
pub fn is_read_none<O: PurityOracle + ?Sized>(module: &Module, oracle: &O, builtin_ref: InstrId) -> bool {
    match resolve_primitive(module, oracle, builtin_ref) {
        Primitive::Builtin(_, fact) => fact.is_read_none(),
        Primitive::Intrinsic(attributes) => attributes
            .contains(IntrinsicAttributes::READ_NONE | IntrinsicAttributes::NO_UNWIND),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests_utils::Fixture;

    #[test]
    fn named_builtins_use_the_read_none_fact() {
        let mut fx = Fixture::new();
        let add = fx.builder().create_builtin_ref("add");
        let sdiv = fx.builder().create_builtin_ref("sdiv");
        let load = fx.builder().create_builtin_ref("load");
        let table = PurityTable::standard();

        assert!(is_side_effect_free(&fx.module, &table, add));
        assert!(is_side_effect_free(&fx.module, &table, sdiv));
        assert!(!is_side_effect_free(&fx.module, &table, load));
        assert!(is_read_none(&fx.module, &table, add));
        assert!(!is_read_none(&fx.module, &table, load));
    }

    #[test]
    fn trapping_builtins_are_still_side_effect_free() {
        let mut fx = Fixture::new();
        let sdiv = fx.builder().create_builtin_ref("sdiv");
        let table = PurityTable::standard();

        assert!(table.builtin_fact(BuiltinKind::Add).never_traps());
        assert!(!table.builtin_fact(BuiltinKind::SDiv).never_traps());
        assert!(table.builtin_fact(BuiltinKind::SDiv).is_read_none());
        assert!(is_side_effect_free(&fx.module, &table, sdiv));
    }

    #[test]
    fn intrinsics_also_require_no_unwind() {
        let mut fx = Fixture::new();
        let sqrt = fx.builder().create_builtin_ref("llvm.sqrt.f64");
        let objsize = fx.builder().create_builtin_ref("llvm.objectsize.i64");
        let throwing = fx.builder().create_builtin_ref("my.readonly.throwing");
        let table = PurityTable::standard()
            .with_intrinsic("my.readonly.throwing", IntrinsicAttributes::READ_ONLY);

        assert!(is_side_effect_free(&fx.module, &table, sqrt));
        assert!(is_read_none(&fx.module, &table, sqrt));

        assert!(is_side_effect_free(&fx.module, &table, objsize));
        assert!(!is_read_none(&fx.module, &table, objsize));

        assert!(!is_side_effect_free(&fx.module, &table, throwing));
    }

    #[test]
    fn synthetic_tables_override_facts() {
        let mut fx = Fixture::new();
        let destroy = fx.builder().create_builtin_ref("destroy");
        let table = PurityTable::empty().with_builtin(BuiltinKind::Destroy, PurityFact::READ_NONE);

        assert!(is_side_effect_free(&fx.module, &table, destroy));
        assert_eq!(
            resolve_primitive(&fx.module, &table, destroy),
            Primitive::Builtin(BuiltinKind::Destroy, PurityFact::READ_NONE)
        );
    }

    #[test]
    #[should_panic(expected = "neither a named builtin nor a known intrinsic")]
    fn unknown_primitives_are_fatal() {
        let mut fx = Fixture::new();
        let mystery = fx.builder().create_builtin_ref("mystery");
        is_side_effect_free(&fx.module, &PurityTable::standard(), mystery);
    }

    #[test]
    #[should_panic(expected = "not a builtin reference")]
    fn non_builtin_instructions_are_fatal() {
        let mut fx = Fixture::new();
        let literal = fx.builder().create_integer_literal(3);
        is_read_none(&fx.module, &PurityTable::standard(), literal);
    }
}
