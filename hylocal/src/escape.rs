//! Escape analysis for addresses and values.
//!
//! A value escapes when some use lets it outlive, or be observed outside of,
//! the code that can see its definition: being stored somewhere, returned,
//! passed by value to a call, captured by an escaping closure and so on.
//! The analysis classifies each use of the value and stops at the first
//! escaping one. Whenever a use cannot be classified, it is assumed to
//! escape.
use hymir::{
    ArgId, Use, Value,
    instructions::{ApplyInfo, InstrKind, InstructionFlags, PartialApplyInfo, layout},
    module::Module,
    types::ParamConvention,
};
use log::trace;

/// Returns true if `value` may escape.
///
/// Projections and casts of an address are followed: a projection use only
/// escapes if the projected value does. Indirect arguments of a call to a
/// known, non-generic function with a body are assumed not to escape
/// through the call unless `examine_calls` is set, in which case the
/// matching formal parameter of the callee is analyzed in turn (one level
/// deep, without examining further calls). Indirect arguments of any other
/// call escape.
pub fn can_value_escape(module: &Module, value: Value, examine_calls: bool) -> bool {
    module
        .uses(value)
        .iter()
        .any(|&edge| use_escapes(module, edge, examine_calls))
}

fn use_escapes(module: &Module, edge: Use, examine_calls: bool) -> bool {
    let user = module.instruction(edge.user);
    let escapes = match user.kind() {
        InstrKind::CopyAddr { .. }
        | InstrKind::Load
        | InstrKind::ProtocolMethod { .. }
        | InstrKind::DebugValue
        | InstrKind::DebugValueAddr => false,

        // Storing through the address is fine, storing the address is not.
        InstrKind::Store | InstrKind::Assign => edge.index != layout::STORE_DEST,

        kind if kind.flags().contains(InstructionFlags::ADDRESS_PROJECTION) => {
            can_value_escape(module, edge.user.into(), examine_calls)
        }

        InstrKind::Apply(info) => apply_operand_escapes(module, edge, info, examine_calls),
        InstrKind::PartialApply(info) => {
            partial_apply_operand_escapes(module, edge, info, examine_calls)
        }

        _ => true,
    };

    if escapes {
        trace!(
            "operand {} of {} `{:?}` escapes",
            edge.index,
            user.opcode(),
            edge.user
        );
    }
    escapes
}

fn apply_operand_escapes(module: &Module, edge: Use, info: &ApplyInfo, examine_calls: bool) -> bool {
    if edge.index == layout::CALLEE {
        return false;
    }

    let param = edge.index - (layout::CALLEE + 1);
    match info.callee_type.param(param) {
        Some(ParamConvention::Indirect) => match callee_formal_parameter(module, edge, info, param) {
            Some(_) if !examine_calls => false,
            Some(formal) => can_value_escape(module, formal.into(), false),
            // Generic, indirect or bodiless callee: nothing to inspect.
            None => true,
        },
        // By-value arguments are not inspected.
        Some(ParamConvention::Direct) | None => true,
    }
}

/// The formal parameter receiving argument `param` of the call, provided the
/// callee is known, has a body and is not generic.
fn callee_formal_parameter(module: &Module, edge: Use, info: &ApplyInfo, param: usize) -> Option<ArgId> {
    if info.has_substitutions() || info.callee_type.is_polymorphic() {
        return None;
    }

    let Some(Value::Instr(callee)) = module.instruction(edge.user).operand(layout::CALLEE) else {
        return None;
    };
    let InstrKind::FunctionRef { function } = module.instruction(callee).kind() else {
        return None;
    };

    let target = module.function(*function);
    if !target.has_body() || target.signature().is_polymorphic() {
        return None;
    }
    module.formal_parameter(*function, param)
}

fn partial_apply_operand_escapes(
    module: &Module,
    edge: Use,
    info: &PartialApplyInfo,
    examine_calls: bool,
) -> bool {
    if edge.index == layout::CALLEE {
        return true;
    }

    // Captured arguments bind the trailing parameters of the callee.
    let captured = module.instruction(edge.user).num_operands() - (layout::CALLEE + 1);
    let position = edge.index - (layout::CALLEE + 1);
    let param = match info.callee_type.params.len().checked_sub(captured) {
        Some(first) => first + position,
        None => return true,
    };

    match info.callee_type.param(param) {
        Some(ParamConvention::Indirect) => can_value_escape(module, edge.user.into(), examine_calls),
        Some(ParamConvention::Direct) | None => true,
    }
}

#[cfg(test)]
mod tests {
    use hymir::{
        builder::Builder,
        instructions::{ApplyInfo, PartialApplyInfo},
        types::{FnSignature, ParamConvention, Substitution, Type},
    };

    use super::*;
    use crate::tests_utils::Fixture;

    fn indirect() -> FnSignature {
        FnSignature::new([ParamConvention::Indirect])
    }

    #[test]
    fn reads_and_debug_uses_do_not_capture() {
        let mut fx = Fixture::new();
        let mut b = fx.builder();
        let slot = b.create_alloc_stack();
        let other = b.create_alloc_stack();
        b.create_load(slot.into());
        b.create_debug_value_addr(slot.into());
        b.create_copy_addr(slot.into(), other.into(), false, true);
        b.create_protocol_method(slot.into(), "describe");

        assert!(!can_value_escape(&fx.module, slot.into(), false));
        assert!(!can_value_escape(&fx.module, slot.into(), true));
    }

    #[test]
    fn stores_capture_the_stored_value_only() {
        let mut fx = Fixture::new();
        let mut b = fx.builder();
        let stored = b.create_alloc_stack();
        let dest = b.create_alloc_stack();
        b.create_store(stored.into(), dest.into());

        assert!(can_value_escape(&fx.module, stored.into(), false));
        assert!(!can_value_escape(&fx.module, dest.into(), false));
    }

    #[test]
    fn assigns_capture_the_assigned_value_only() {
        let mut fx = Fixture::new();
        let mut b = fx.builder();
        let assigned = b.create_alloc_stack();
        let dest = b.create_alloc_stack();
        b.create_assign(assigned.into(), dest.into());

        assert!(can_value_escape(&fx.module, assigned.into(), true));
        assert!(!can_value_escape(&fx.module, dest.into(), true));
    }

    #[test]
    fn projections_are_transparent() {
        let mut fx = Fixture::new();
        let mut b = fx.builder();
        let safe = b.create_alloc_stack();
        let safe_field = b.create_struct_element_addr(safe.into(), 1);
        b.create_load(safe_field.into());

        let leaked = b.create_alloc_stack();
        let leaked_field = b.create_tuple_element_addr(leaked.into(), 0);
        let leaked_ptr = b.create_address_to_pointer(leaked_field.into());
        let global = b.create_global_addr("sink");
        b.create_store(leaked_ptr.into(), global.into());

        for (base, projection) in [(safe, safe_field), (leaked, leaked_field)] {
            assert_eq!(
                can_value_escape(&fx.module, base.into(), false),
                can_value_escape(&fx.module, projection.into(), false)
            );
        }
        assert!(!can_value_escape(&fx.module, safe.into(), false));
        assert!(can_value_escape(&fx.module, leaked.into(), false));
    }

    #[test]
    fn existential_and_cast_chains_are_transparent() {
        let mut fx = Fixture::new();
        let mut b = fx.builder();
        let slot = b.create_alloc_stack();
        let opened = b.create_open_existential(slot.into());
        let projected = b.create_project_existential(opened.into());
        let marked = b.create_mark_uninitialized(projected.into());
        let pointer = b.create_address_to_pointer(marked.into());
        let addr = b.create_pointer_to_address(pointer.into());
        b.create_load(addr.into());

        let chain = [slot, opened, projected, marked, pointer, addr];
        for link in chain {
            assert!(!can_value_escape(&fx.module, link.into(), false));
        }

        // Leaking the end of the chain leaks every link before it.
        let global = fx.builder().create_global_addr("sink");
        fx.builder().create_store(addr.into(), global.into());
        for link in chain {
            assert!(can_value_escape(&fx.module, link.into(), false));
            assert!(can_value_escape(&fx.module, link.into(), true));
        }
    }

    #[test]
    fn unknown_uses_escape_and_more_uses_never_help() {
        let mut fx = Fixture::new();
        let slot = fx.builder().create_alloc_stack();
        fx.builder().create_load(slot.into());
        assert!(!can_value_escape(&fx.module, slot.into(), false));

        fx.builder().create_tuple(&[slot.into()]);
        assert!(can_value_escape(&fx.module, slot.into(), false));

        fx.builder().create_load(slot.into());
        assert!(can_value_escape(&fx.module, slot.into(), false));
    }

    #[test]
    fn indirect_arguments_follow_the_callee_parameter() {
        let mut fx = Fixture::new();

        // reader(%p) loads through %p; leaker(%p) stores %p in a global.
        let (reader, reader_end) = fx.define("reader", indirect());
        let reader_param = fx.module.formal_parameter(reader, 0).unwrap();
        Builder::before(&mut fx.module, reader_end).create_load(reader_param.into());

        let (leaker, leaker_end) = fx.define("leaker", indirect());
        let leaker_param = fx.module.formal_parameter(leaker, 0).unwrap();
        let mut b = Builder::before(&mut fx.module, leaker_end);
        let global = b.create_global_addr("escaped");
        b.create_store(leaker_param.into(), global.into());

        let mut b = fx.builder();
        let read_slot = b.create_alloc_stack();
        let reader_ref = b.create_function_ref(reader);
        let reader_call = b.create_apply(reader_ref.into(), &[read_slot.into()], ApplyInfo::new(indirect()));
        let leak_slot = b.create_alloc_stack();
        let leaker_ref = b.create_function_ref(leaker);
        b.create_apply(leaker_ref.into(), &[leak_slot.into()], ApplyInfo::new(indirect()));

        assert!(!can_value_escape(&fx.module, read_slot.into(), false));
        assert!(!can_value_escape(&fx.module, leak_slot.into(), false));

        assert_eq!(
            can_value_escape(&fx.module, read_slot.into(), true),
            can_value_escape(&fx.module, reader_param.into(), false)
        );
        assert!(!can_value_escape(&fx.module, read_slot.into(), true));
        assert!(can_value_escape(&fx.module, leak_slot.into(), true));

        // Being the callee is not an escape; the call result is unused.
        assert!(!can_value_escape(&fx.module, reader_ref.into(), true));
        assert!(!can_value_escape(&fx.module, reader_call.into(), true));
    }

    #[test]
    fn uninspectable_callees_are_conservative() {
        let mut fx = Fixture::new();
        let (reader, reader_end) = fx.define("reader", indirect());
        let param = fx.module.formal_parameter(reader, 0).unwrap();
        Builder::before(&mut fx.module, reader_end).create_load(param.into());
        let external = fx.declare("external", indirect());

        let generic_info = ApplyInfo {
            substitutions: vec![Substitution::new("T", Type::Int(32))],
            ..ApplyInfo::new(indirect())
        };
        let polymorphic_info = ApplyInfo::new(indirect().with_generic_params(["T"]));

        let mut b = fx.builder();
        let reader_ref = b.create_function_ref(reader);
        let external_ref = b.create_function_ref(external);
        let builtin = b.create_builtin_ref("test.pure");

        let mut slots = Vec::new();
        for (callee, info) in [
            (reader_ref, generic_info),
            (reader_ref, polymorphic_info),
            (external_ref, ApplyInfo::new(indirect())),
            (builtin, ApplyInfo::new(indirect())),
        ] {
            let slot = b.create_alloc_stack();
            b.create_apply(callee.into(), &[slot.into()], info);
            slots.push(slot);
        }

        for slot in slots {
            assert!(can_value_escape(&fx.module, slot.into(), false));
            assert!(can_value_escape(&fx.module, slot.into(), true));
        }
    }

    #[test]
    fn direct_arguments_escape() {
        let mut fx = Fixture::new();
        let (reader, _) = fx.define("by_value", FnSignature::new([ParamConvention::Direct]));
        let mut b = fx.builder();
        let slot = b.create_alloc_stack();
        let fref = b.create_function_ref(reader);
        b.create_apply(
            fref.into(),
            &[slot.into()],
            ApplyInfo::new(FnSignature::new([ParamConvention::Direct])),
        );

        assert!(can_value_escape(&fx.module, slot.into(), false));
        assert!(can_value_escape(&fx.module, slot.into(), true));
    }

    #[test]
    fn closure_captures_follow_the_closure() {
        let mut fx = Fixture::new();
        let callee_type = FnSignature::new([ParamConvention::Direct, ParamConvention::Indirect]);
        let (closure_body, _) = fx.define("closure_body", callee_type.clone());

        let mut b = fx.builder();
        let fref = b.create_function_ref(closure_body);
        let arg = b.create_integer_literal(1);

        // Invoked locally only.
        let kept = b.create_alloc_stack();
        let local_closure =
            b.create_partial_apply(fref.into(), &[kept.into()], PartialApplyInfo::new(callee_type.clone()));
        b.create_apply(
            local_closure.into(),
            &[arg.into()],
            ApplyInfo::new(FnSignature::new([ParamConvention::Direct])),
        );

        // Returned closure.
        let leaked = b.create_alloc_stack();
        let returned_closure =
            b.create_partial_apply(fref.into(), &[leaked.into()], PartialApplyInfo::new(callee_type));
        b.create_tuple(&[returned_closure.into()]);

        for examine_calls in [false, true] {
            assert!(!can_value_escape(&fx.module, kept.into(), examine_calls));
            assert!(can_value_escape(&fx.module, leaked.into(), examine_calls));
        }
        // The callee of a partial application does escape: it lives on in the closure.
        assert!(can_value_escape(&fx.module, fref.into(), false));
    }

    #[test]
    fn closures_handed_to_callees_are_examined() {
        let mut fx = Fixture::new();
        let callee_type = FnSignature::new([ParamConvention::Indirect]);
        let (closure_body, _) = fx.define("closure_body", callee_type.clone());

        // reader(%c) loads through %c; keeper(%c) stores %c in a global.
        let (reader, reader_end) = fx.define("reader", indirect());
        let reader_param = fx.module.formal_parameter(reader, 0).unwrap();
        Builder::before(&mut fx.module, reader_end).create_load(reader_param.into());
        let (keeper, keeper_end) = fx.define("keeper", indirect());
        let keeper_param = fx.module.formal_parameter(keeper, 0).unwrap();
        let mut b = Builder::before(&mut fx.module, keeper_end);
        let global = b.create_global_addr("closures");
        b.create_store(keeper_param.into(), global.into());

        let mut b = fx.builder();
        let fref = b.create_function_ref(closure_body);
        let mut captures = Vec::new();
        for target in [reader, keeper] {
            let capture = b.create_alloc_stack();
            let closure =
                b.create_partial_apply(fref.into(), &[capture.into()], PartialApplyInfo::new(callee_type.clone()));
            let target_ref = b.create_function_ref(target);
            b.create_apply(target_ref.into(), &[closure.into()], ApplyInfo::new(indirect()));
            captures.push(capture);
        }
        let (read_capture, kept_capture) = (captures[0], captures[1]);

        assert!(!can_value_escape(&fx.module, read_capture.into(), false));
        assert!(!can_value_escape(&fx.module, kept_capture.into(), false));
        assert!(!can_value_escape(&fx.module, read_capture.into(), true));
        assert!(can_value_escape(&fx.module, kept_capture.into(), true));
    }
}
