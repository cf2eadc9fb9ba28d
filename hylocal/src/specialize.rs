//! Call-site redirection to a specialized function.
use hymir::{
    FuncId, InstrId, Value,
    builder::Builder,
    instructions::{ApplyInfo, InstrKind},
    module::Module,
};
use log::debug;
use smallvec::SmallVec;

use crate::{dead_code::recursively_delete_trivially_dead_instruction, purity::PurityOracle};

/// Replace the call `apply` by a call to `new_function` with the same
/// arguments, and return the new call.
///
/// The new call is inserted right before the old one, at the same location,
/// keeps its transparency and carries no substitutions: `new_function` is
/// expected to be fully specialized already. Uses of the old result move to
/// the new one, then the old call is deleted along with whatever that leaves
/// dead (typically the reference to the generic callee).
///
/// # Panics
/// If `apply` is not a full application or one of its arguments has been
/// severed.
pub fn replace_with_specialized_function<O: PurityOracle + ?Sized>(
    module: &mut Module,
    oracle: &O,
    apply: InstrId,
    new_function: FuncId,
) -> InstrId {
    let node = module.instruction(apply);
    let InstrKind::Apply(info) = node.kind() else {
        panic!("`{apply:?}` is a {}, not a full application", node.opcode());
    };
    let transparent = info.transparent;

    let arguments: SmallVec<Value, 4> = node
        .arguments()
        .iter()
        .enumerate()
        .map(|(index, argument)| match argument {
            Some(value) => *value,
            None => panic!("argument {index} of `{apply:?}` has been severed"),
        })
        .collect();

    let new_info = ApplyInfo {
        callee_type: module.function(new_function).signature().clone(),
        substitutions: Vec::new(),
        transparent,
    };

    let mut builder = Builder::before(module, apply);
    let callee = builder.create_function_ref(new_function);
    let new_apply = builder.create_apply(callee.into(), &arguments, new_info);

    module.replace_all_uses_with(apply.into(), new_apply.into());
    recursively_delete_trivially_dead_instruction(module, oracle, apply, true);

    debug!(
        "redirected call `{apply:?}` to `{}` as `{new_apply:?}`",
        module.function(new_function).name()
    );
    new_apply
}

#[cfg(test)]
mod tests {
    use hymir::{
        Location,
        types::{FnSignature, ParamConvention, Substitution, Type},
    };

    use super::*;
    use crate::tests_utils::{Fixture, synthetic_oracle};

    #[test]
    fn calls_are_redirected_end_to_end() {
        let mut fx = Fixture::new();
        let oracle = synthetic_oracle();
        let params = [ParamConvention::Direct, ParamConvention::Indirect];
        let generic = fx.declare("generic", FnSignature::new(params).with_generic_params(["T"]));
        let (specialized, _) = fx.define("generic<Int32>", FnSignature::new(params));

        let location = Location::new(12, 5);
        let mut b = fx.builder().with_location(location);
        let a = b.create_integer_literal(1);
        let slot = b.create_alloc_stack();
        let fref = b.create_function_ref(generic);
        let old_call = b.create_apply(
            fref.into(),
            &[a.into(), slot.into()],
            ApplyInfo {
                substitutions: vec![Substitution::new("T", Type::Int(32))],
                transparent: true,
                ..ApplyInfo::new(FnSignature::new(params))
            },
        );
        b.set_location(Location::new(13, 1));
        let user = b.create_tuple(&[old_call.into()]);

        let new_call = replace_with_specialized_function(&mut fx.module, &oracle, old_call, specialized);

        assert!(!fx.module.contains_instruction(old_call));
        assert!(!fx.module.contains_instruction(fref));

        let node = fx.module.instruction(new_call);
        let InstrKind::Apply(info) = node.kind() else {
            panic!("expected an apply, found {}", node.opcode());
        };
        assert!(info.transparent);
        assert!(!info.has_substitutions());
        assert_eq!(info.callee_type, *fx.module.function(specialized).signature());
        assert_eq!(node.location(), location);
        assert_eq!(node.arguments(), &[Some(Value::from(a)), Some(Value::from(slot))]);

        let Some(Value::Instr(callee)) = node.operand(0) else {
            panic!("new call has no callee");
        };
        assert_eq!(
            fx.module.instruction(callee).kind(),
            &InstrKind::FunctionRef { function: specialized }
        );

        assert_eq!(fx.module.instruction(user).operand(0), Some(new_call.into()));
        assert_eq!(fx.live(), vec![a, slot, callee, new_call, user, fx.terminator]);
        fx.module.verify().unwrap();
    }

    #[test]
    #[should_panic(expected = "not a full application")]
    fn only_full_applications_can_be_redirected() {
        let mut fx = Fixture::new();
        let oracle = synthetic_oracle();
        let target = fx.declare("target", FnSignature::default());
        let mut b = fx.builder();
        let fref = b.create_function_ref(target);
        let closure = b.create_partial_apply(
            fref.into(),
            &[],
            hymir::instructions::PartialApplyInfo::new(FnSignature::default()),
        );

        replace_with_specialized_function(&mut fx.module, &oracle, closure, target);
    }
}
