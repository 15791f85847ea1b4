//! `spec.md` §8, scenario 4 (InterfaceDispatch): a `callvirt` against an
//! interface method token dispatches through that interface's own vtable
//! slot, not the implementing type's — `IRType::interface_impls` carries
//! the per-interface table the generator needs to pick the right thunk.

mod common;

use common::*;
use ilnc::ir::instr::Instr;
use ilnc::model::{AssemblyKind, MethodAttributes, TypeAttributes, TypeHandle, ValueKind};
use ilnc::raw::il::{Operand, OpCode};

fn build_pond() -> ilnc::model::Assembly {
    let get_sound = method(MethodSpec {
        token: 1,
        name: "GetSound",
        flags: MethodAttributes::PUBLIC | MethodAttributes::VIRTUAL | MethodAttributes::ABSTRACT,
        return_kind: ValueKind::I4,
        param_kinds: vec![],
        instructions: vec![],
        locals: vec![],
        exception_handlers: vec![],
    });
    let ispeak = ty("Pond", "ISpeak", TypeAttributes::PUBLIC | TypeAttributes::INTERFACE, None, vec![], vec![], vec![get_sound]);

    let duck_get_sound = method(MethodSpec {
        token: 2,
        name: "GetSound",
        flags: MethodAttributes::PUBLIC | MethodAttributes::VIRTUAL,
        return_kind: ValueKind::I4,
        param_kinds: vec![],
        instructions: vec![instr(0, OpCode::LdcI40, Operand::None), instr(1, OpCode::Ret, Operand::None)],
        locals: vec![],
        exception_handlers: vec![],
    });
    let duck_ctor = method(MethodSpec {
        token: 3,
        name: ".ctor",
        flags: MethodAttributes::PUBLIC | MethodAttributes::RT_SPECIAL_NAME,
        return_kind: ValueKind::Void,
        param_kinds: vec![],
        instructions: vec![instr(0, OpCode::Ldarg0, Operand::None), instr(1, OpCode::Ret, Operand::None)],
        locals: vec![],
        exception_handlers: vec![],
    });
    // `ISpeak` lives at type_index 0 in this assembly's `types` vec.
    let duck = ty(
        "Pond",
        "Duck",
        TypeAttributes::PUBLIC,
        None,
        vec![TypeHandle::Local(0)],
        vec![],
        vec![duck_get_sound, duck_ctor],
    );

    let main = method(MethodSpec {
        token: 4,
        name: "Main",
        flags: MethodAttributes::PUBLIC | MethodAttributes::STATIC,
        return_kind: ValueKind::Void,
        param_kinds: vec![],
        instructions: vec![
            instr(0, OpCode::Newobj, method_token(3)),
            instr(1, OpCode::Callvirt, method_token(1)),
            instr(2, OpCode::Pop, Operand::None),
            instr(3, OpCode::Ret, Operand::None),
        ],
        locals: vec![],
        exception_handlers: vec![],
    });
    let program = ty("Pond", "Program", TypeAttributes::PUBLIC, None, vec![], vec![], vec![main]);

    assembly("Pond", AssemblyKind::User, vec![ispeak, duck, program], vec![], Some(4))
}

#[test]
fn duck_carries_an_interface_impl_table_for_ispeak() {
    let built = run_pipeline(vec![build_pond()]);
    let ispeak_id = type_id_of(&built.module, "ISpeak");
    let duck = built.module.types.iter().find(|t| t.full_name == "Pond.Duck").expect("Duck reachable");
    assert_eq!(duck.interface_impls.len(), 1);
    assert_eq!(duck.interface_impls[0].interface, ispeak_id);
    assert_eq!(duck.interface_impls[0].slots.len(), 1);
}

#[test]
fn callvirt_on_the_interface_token_dispatches_through_the_interfaces_own_slot() {
    let built = run_pipeline(vec![build_pond()]);
    let ispeak_id = type_id_of(&built.module, "ISpeak");
    let main = find_method(&built.module, "Main");
    let call = main
        .blocks
        .iter()
        .flat_map(|b| &b.instructions)
        .find_map(|i| match i {
            Instr::CallInterface { interface, slot_index, .. } => Some((*interface, *slot_index)),
            _ => None,
        })
        .expect("a CallInterface instruction");

    assert_eq!(call.1, 0);
    assert_eq!(call.0, ispeak_id);

    assert!(
        !main.blocks.iter().flat_map(|b| &b.instructions).any(|i| matches!(i, Instr::CallVirtual { .. })),
        "interface dispatch must not collapse into CallVirtual"
    );
}
