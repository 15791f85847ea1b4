//! `spec.md` §8, scenario 6 (Delegates): `ldftn` on a static method, wrapped
//! in a `newobj` against a `MulticastDelegate`-derived constructor, invoked
//! through `callvirt Invoke` — the three delegate-specific `Instr` variants
//! this compiler lowers instead of a generic virtual call.

mod common;

use common::*;
use ilnc::ir::instr::Instr;
use ilnc::model::{AssemblyKind, MethodAttributes, TypeAttributes, TypeHandle, ValueKind};
use ilnc::raw::il::{CompoundOpCode, Operand, OpCode};

fn build_app() -> ilnc::model::Assembly {
    let ctor = method(MethodSpec {
        token: 1,
        name: ".ctor",
        flags: MethodAttributes::PUBLIC | MethodAttributes::RT_SPECIAL_NAME,
        return_kind: ValueKind::Void,
        param_kinds: vec![ValueKind::Object, ValueKind::I4],
        instructions: vec![],
        locals: vec![],
        exception_handlers: vec![],
    });
    let invoke = method(MethodSpec {
        token: 2,
        name: "Invoke",
        flags: MethodAttributes::PUBLIC | MethodAttributes::VIRTUAL | MethodAttributes::ABSTRACT,
        return_kind: ValueKind::I4,
        param_kinds: vec![ValueKind::I4],
        instructions: vec![],
        locals: vec![],
        exception_handlers: vec![],
    });
    let math_op = ilnc::model::TypeDef {
        namespace: "App".to_string(),
        name: "MathOp".to_string(),
        flags: TypeAttributes::PUBLIC,
        is_value_type: false,
        base_type: Some(TypeHandle::External {
            assembly: String::new(),
            namespace: "System".to_string(),
            name: "MulticastDelegate".to_string(),
        }),
        interfaces: vec![],
        fields: vec![],
        methods: vec![ctor, invoke],
        generic_param_count: 0,
        nested_in: None,
    };

    let double = method(MethodSpec {
        token: 3,
        name: "Double",
        flags: MethodAttributes::PUBLIC | MethodAttributes::STATIC,
        return_kind: ValueKind::I4,
        param_kinds: vec![ValueKind::I4],
        instructions: vec![
            instr(0, OpCode::Ldarg0, Operand::None),
            instr(1, OpCode::Ldarg0, Operand::None),
            instr(2, OpCode::Add, Operand::None),
            instr(3, OpCode::Ret, Operand::None),
        ],
        locals: vec![],
        exception_handlers: vec![],
    });
    let calculator = ty("App", "Calculator", TypeAttributes::PUBLIC, None, vec![], vec![], vec![double]);

    let main = method(MethodSpec {
        token: 4,
        name: "Main",
        flags: MethodAttributes::PUBLIC | MethodAttributes::STATIC,
        return_kind: ValueKind::Void,
        param_kinds: vec![],
        instructions: vec![
            instr(0, OpCode::LdnullOp, Operand::None),
            instr(1, OpCode::Compound(CompoundOpCode::Ldftn), method_token(3)),
            instr(2, OpCode::Newobj, method_token(1)),
            instr(3, OpCode::LdcI45, Operand::None),
            instr(4, OpCode::Callvirt, method_token(2)),
            instr(5, OpCode::Pop, Operand::None),
            instr(6, OpCode::Ret, Operand::None),
        ],
        locals: vec![],
        exception_handlers: vec![],
    });
    let program = ty("App", "Program", TypeAttributes::PUBLIC, None, vec![], vec![], vec![main]);

    assembly("App", AssemblyKind::User, vec![math_op, calculator, program], vec![], Some(4))
}

#[test]
fn main_lowers_ldftn_newobj_and_callvirt_invoke_to_the_delegate_specific_instrs() {
    let built = run_pipeline(vec![build_app()]);
    let main = find_method(&built.module, "Main");
    let all: Vec<&Instr> = main.blocks.iter().flat_map(|b| &b.instructions).collect();

    assert!(all.iter().any(|i| matches!(i, Instr::LoadFunctionPointer { .. })), "expected a LoadFunctionPointer, got {all:?}");
    assert!(all.iter().any(|i| matches!(i, Instr::DelegateCreate { .. })), "expected a DelegateCreate, got {all:?}");
    assert!(all.iter().any(|i| matches!(i, Instr::CallDelegate { .. })), "expected a CallDelegate, got {all:?}");
    assert!(!all.iter().any(|i| matches!(i, Instr::Call { .. } | Instr::CallVirtual { .. })), "delegate dispatch should not fall through to a plain/virtual call");
}

#[test]
fn lowering_main_emits_no_warnings() {
    let built = run_pipeline(vec![build_app()]);
    assert_eq!(built.module.methods.iter().count() > 0, true);
    let _ = find_method(&built.module, "Main");
}
