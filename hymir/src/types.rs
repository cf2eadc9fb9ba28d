//! Types module
//!
//! A deliberately small structural type language. Instructions do not carry
//! full types; what the IR needs is the calling convention of callees and
//! the generic substitutions recorded on call sites. [`Type`] exists so that
//! substitutions can be described and inspected for unbound archetypes.
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use strum::EnumIs;

/// How a parameter is passed across a call boundary.
#[derive(Debug, Default, Clone, Copy, Hash, PartialEq, Eq, EnumIs)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ParamConvention {
    /// Passed by value.
    #[default]
    Direct,

    /// Passed by address. The callee receives a pointer to caller-owned
    /// storage.
    Indirect,
}

/// Lowered signature of a function as seen from a call site.
#[derive(Debug, Default, Clone, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FnSignature {
    /// Convention of every formal parameter, in order.
    pub params: Vec<ParamConvention>,

    /// Names of the generic parameters. A signature with at least one
    /// generic parameter is polymorphic.
    pub generic_params: Vec<String>,
}

impl FnSignature {
    /// Monomorphic signature with the given parameter conventions.
    pub fn new(params: impl IntoIterator<Item = ParamConvention>) -> Self {
        Self {
            params: params.into_iter().collect(),
            generic_params: Vec::new(),
        }
    }

    /// Add generic parameters to this signature.
    pub fn with_generic_params<S: Into<String>>(
        mut self,
        generic_params: impl IntoIterator<Item = S>,
    ) -> Self {
        self.generic_params
            .extend(generic_params.into_iter().map(Into::into));
        self
    }

    pub fn is_polymorphic(&self) -> bool {
        !self.generic_params.is_empty()
    }

    /// Convention of the parameter at `index`, if any.
    pub fn param(&self, index: usize) -> Option<ParamConvention> {
        self.params.get(index).copied()
    }
}

/// Structural type used by generic substitutions.
#[derive(Debug, Clone, Hash, PartialEq, Eq, EnumIs)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Type {
    /// Integer of the given bit width.
    Int(u16),
    /// Untyped pointer.
    RawPointer,
    /// Address of a value of the inner type.
    Address(Box<Type>),
    /// Tuple of element types.
    Tuple(Vec<Type>),
    /// Named nominal type, possibly applied to generic arguments.
    Nominal { name: String, generic_args: Vec<Type> },
    /// Function type.
    Function { params: Vec<Type>, result: Box<Type> },
    /// Generic placeholder that has not been bound to a concrete type.
    Archetype(String),
}

impl Type {
    /// Returns true if an archetype appears anywhere within this type.
    pub fn has_unbound_generic_types(&self) -> bool {
        match self {
            Type::Int(_) | Type::RawPointer => false,
            Type::Archetype(_) => true,
            Type::Address(inner) => inner.has_unbound_generic_types(),
            Type::Tuple(elements) => elements.iter().any(Type::has_unbound_generic_types),
            Type::Nominal { generic_args, .. } => {
                generic_args.iter().any(Type::has_unbound_generic_types)
            }
            Type::Function { params, result } => {
                params.iter().any(Type::has_unbound_generic_types)
                    || result.has_unbound_generic_types()
            }
        }
    }
}

/// Binding of one generic parameter to a replacement type.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Substitution {
    pub archetype: String,
    pub replacement: Type,
}

impl Substitution {
    pub fn new(archetype: impl Into<String>, replacement: Type) -> Self {
        Self {
            archetype: archetype.into(),
            replacement,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archetypes_are_found_in_nested_positions() {
        let concrete = Type::Tuple(vec![Type::Int(64), Type::Address(Box::new(Type::RawPointer))]);
        assert!(!concrete.has_unbound_generic_types());

        let nested = Type::Nominal {
            name: "Array".into(),
            generic_args: vec![Type::Function {
                params: vec![Type::Int(8)],
                result: Box::new(Type::Archetype("T".into())),
            }],
        };
        assert!(nested.has_unbound_generic_types());
    }

    #[test]
    fn signature_polymorphism_follows_generic_params() {
        let sig = FnSignature::new([ParamConvention::Indirect, ParamConvention::Direct]);
        assert!(!sig.is_polymorphic());
        assert_eq!(sig.param(0), Some(ParamConvention::Indirect));
        assert_eq!(sig.param(2), None);

        let generic = sig.with_generic_params(["T"]);
        assert!(generic.is_polymorphic());
    }
}
