//! `spec.md` §8, scenario 1 (HelloWorld): a single assembly, two types, an
//! entry point, and a plain instance method — the narrowest possible path
//! through reachability, IR lowering, and code generation.

mod common;

use common::*;
use ilnc::codegen::CodeGenerator;
use ilnc::config::BuildConfiguration;
use ilnc::diagnostics::Diagnostics;
use ilnc::ir::instr::{Instr, Value};
use ilnc::model::{AssemblyKind, MethodAttributes, TypeAttributes, ValueKind};
use ilnc::raw::il::OpCode;

fn build_calculator_app() -> ilnc::model::Assembly {
    let calc_field = field(1, "_result", ilnc::model::FieldAttributes::PRIVATE, ValueKind::I4);

    let add = method(MethodSpec {
        token: 1,
        name: "Add",
        flags: MethodAttributes::PUBLIC,
        return_kind: ValueKind::I4,
        param_kinds: vec![ValueKind::I4, ValueKind::I4],
        instructions: vec![
            instr(0, OpCode::Ldarg1, ilnc::raw::il::Operand::None),
            instr(1, OpCode::Ldarg2, ilnc::raw::il::Operand::None),
            instr(2, OpCode::Add, ilnc::raw::il::Operand::None),
            instr(3, OpCode::Ret, ilnc::raw::il::Operand::None),
        ],
        locals: vec![],
        exception_handlers: vec![],
    });

    let set_result = method(MethodSpec {
        token: 2,
        name: "SetResult",
        flags: MethodAttributes::PUBLIC,
        return_kind: ValueKind::Void,
        param_kinds: vec![ValueKind::I4],
        instructions: vec![
            instr(0, OpCode::Ldarg0, ilnc::raw::il::Operand::None),
            instr(1, OpCode::Ldarg1, ilnc::raw::il::Operand::None),
            instr(2, OpCode::Stfld, field_token(1)),
            instr(3, OpCode::Ret, ilnc::raw::il::Operand::None),
        ],
        locals: vec![],
        exception_handlers: vec![],
    });

    let get_result = method(MethodSpec {
        token: 3,
        name: "GetResult",
        flags: MethodAttributes::PUBLIC,
        return_kind: ValueKind::I4,
        param_kinds: vec![],
        instructions: vec![
            instr(0, OpCode::Ldarg0, ilnc::raw::il::Operand::None),
            instr(1, OpCode::Ldfld, field_token(1)),
            instr(2, OpCode::Ret, ilnc::raw::il::Operand::None),
        ],
        locals: vec![],
        exception_handlers: vec![],
    });

    let ctor = method(MethodSpec {
        token: 4,
        name: ".ctor",
        flags: MethodAttributes::PUBLIC | MethodAttributes::RT_SPECIAL_NAME,
        return_kind: ValueKind::Void,
        param_kinds: vec![],
        instructions: vec![
            instr(0, OpCode::Ldarg0, ilnc::raw::il::Operand::None),
            instr(1, OpCode::Ret, ilnc::raw::il::Operand::None),
        ],
        locals: vec![],
        exception_handlers: vec![],
    });

    let calculator = ty("App", "Calculator", TypeAttributes::PUBLIC, None, vec![], vec![calc_field], vec![add, set_result, get_result, ctor]);

    let main = method(MethodSpec {
        token: 5,
        name: "Main",
        flags: MethodAttributes::PUBLIC | MethodAttributes::STATIC,
        return_kind: ValueKind::Void,
        param_kinds: vec![],
        instructions: vec![instr(0, OpCode::Nop, ilnc::raw::il::Operand::None), instr(1, OpCode::Ret, ilnc::raw::il::Operand::None)],
        locals: vec![],
        exception_handlers: vec![],
    });
    let program = ty("App", "Program", TypeAttributes::PUBLIC, None, vec![], vec![], vec![main]);

    assembly("App", AssemblyKind::User, vec![calculator, program], vec![], Some(5))
}

#[test]
fn two_types_are_reachable_and_entry_point_is_main() {
    let built = run_pipeline(vec![build_calculator_app()]);
    assert_eq!(built.module.types.len(), 2);
    assert_eq!(built.assemblies.get(0).entry_point, Some(5));
    let _ = find_method(&built.module, "Main");
}

#[test]
fn add_lowers_to_a_binary_add_and_a_non_void_return() {
    let built = run_pipeline(vec![build_calculator_app()]);
    let add = find_method(&built.module, "Add");
    let all: Vec<&Instr> = add.blocks.iter().flat_map(|b| &b.instructions).collect();

    assert!(all.iter().any(|i| matches!(i, Instr::Binary { op: ilnc::ir::instr::BinaryOp::Add, .. })));
    let ret = all.iter().find(|i| matches!(i, Instr::Return { .. })).expect("a Return instruction");
    match ret {
        Instr::Return { value: Some(Value::Register(_)) } => {}
        other => panic!("expected Return(Some(register)), got {other:?}"),
    }
}

#[test]
fn generated_header_declares_add_with_this_and_two_ints() {
    let built = run_pipeline(vec![build_calculator_app()]);
    let config = BuildConfiguration::default();
    let entry = method_id_of(&built.module, "Main");
    let generator = CodeGenerator::new(&built.module, &built.assemblies, &built.reachability, &config, "App", Some(entry));
    let mut diagnostics = Diagnostics::new();
    let artifacts = generator.generate(&mut diagnostics).expect("codegen");

    assert!(
        artifacts.header.contains("__this, int32_t a, int32_t b)"),
        "expected Add's declaration shape in header, got:\n{}",
        artifacts.header
    );
    assert!(artifacts.build_file.contains("add_executable"), "entry point present -> executable build, got:\n{}", artifacts.build_file);
    assert_eq!(diagnostics.warning_count(), 0);
}
