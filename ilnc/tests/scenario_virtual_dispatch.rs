//! `spec.md` §8, scenario 3 (VirtualDispatch): a base type and an override
//! reached through a `callvirt` against the *declared* (base) method token —
//! no devirtualization is attempted, so the generated `CallVirtual` carries
//! a vtable slot both types agree on.

mod common;

use common::*;
use ilnc::ir::instr::Instr;
use ilnc::model::{AssemblyKind, MethodAttributes, TypeAttributes, TypeHandle, ValueKind};
use ilnc::raw::il::{Operand, OpCode};

fn build_zoo() -> ilnc::model::Assembly {
    let animal_speak = method(MethodSpec {
        token: 1,
        name: "Speak",
        flags: MethodAttributes::PUBLIC | MethodAttributes::VIRTUAL,
        return_kind: ValueKind::Void,
        param_kinds: vec![],
        instructions: vec![instr(0, OpCode::Ret, Operand::None)],
        locals: vec![],
        exception_handlers: vec![],
    });
    let animal = ty("Zoo", "Animal", TypeAttributes::PUBLIC, None, vec![], vec![], vec![animal_speak]);

    let dog_speak = method(MethodSpec {
        token: 2,
        name: "Speak",
        flags: MethodAttributes::PUBLIC | MethodAttributes::VIRTUAL,
        return_kind: ValueKind::Void,
        param_kinds: vec![],
        instructions: vec![instr(0, OpCode::Ret, Operand::None)],
        locals: vec![],
        exception_handlers: vec![],
    });
    let dog_ctor = method(MethodSpec {
        token: 3,
        name: ".ctor",
        flags: MethodAttributes::PUBLIC | MethodAttributes::RT_SPECIAL_NAME,
        return_kind: ValueKind::Void,
        param_kinds: vec![],
        instructions: vec![instr(0, OpCode::Ldarg0, Operand::None), instr(1, OpCode::Ret, Operand::None)],
        locals: vec![],
        exception_handlers: vec![],
    });
    // `Animal` lives at type_index 0 in this assembly's `types` vec.
    let dog = ty("Zoo", "Dog", TypeAttributes::PUBLIC, Some(TypeHandle::Local(0)), vec![], vec![], vec![dog_speak, dog_ctor]);

    let main = method(MethodSpec {
        token: 4,
        name: "Main",
        flags: MethodAttributes::PUBLIC | MethodAttributes::STATIC,
        return_kind: ValueKind::Void,
        param_kinds: vec![],
        instructions: vec![
            instr(0, OpCode::Newobj, method_token(3)),
            instr(1, OpCode::Callvirt, method_token(1)),
            instr(2, OpCode::Ret, Operand::None),
        ],
        locals: vec![],
        exception_handlers: vec![],
    });
    let program = ty("Zoo", "Program", TypeAttributes::PUBLIC, None, vec![], vec![], vec![main]);

    assembly("Zoo", AssemblyKind::User, vec![animal, dog, program], vec![], Some(4))
}

#[test]
fn both_types_declare_speak_at_vtable_slot_zero() {
    let built = run_pipeline(vec![build_zoo()]);
    let animal = built.module.types.iter().find(|t| t.full_name == "Zoo.Animal").expect("Animal reachable");
    let dog = built.module.types.iter().find(|t| t.full_name == "Zoo.Dog").expect("Dog reachable");
    assert_eq!(animal.vtable.len(), 1);
    assert_eq!(dog.vtable.len(), 1);
}

#[test]
fn callvirt_on_the_base_token_lowers_to_a_virtual_call_on_slot_zero() {
    let built = run_pipeline(vec![build_zoo()]);
    let animal_id = type_id_of(&built.module, "Animal");
    let main = find_method(&built.module, "Main");
    let call = main
        .blocks
        .iter()
        .flat_map(|b| &b.instructions)
        .find_map(|i| match i {
            Instr::CallVirtual { slot, .. } => Some(*slot),
            _ => None,
        })
        .expect("a CallVirtual instruction");

    assert_eq!(call.slot_index, 0);
    assert_eq!(call.declaring_type, animal_id);
}
