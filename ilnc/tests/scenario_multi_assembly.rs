//! `spec.md` §8, scenario 2 (MultiAssembly): a root assembly referencing a
//! library assembly, with a cross-assembly call that only shows up as a
//! `MemberRef`-kind token — exercising reachability's "crosses into a
//! referenced assembly" over-approximation (`reachability.rs`).

mod common;

use common::*;
use ilnc::metadata_token::MetadataToken;
use ilnc::model::{AssemblyKind, AssemblyName, MethodAttributes, TypeAttributes, ValueKind};
use ilnc::raw::il::{Operand, OpCode};

fn build_math_lib() -> ilnc::model::Assembly {
    let add = method(MethodSpec {
        token: 1,
        name: "Add",
        flags: MethodAttributes::PUBLIC | MethodAttributes::STATIC,
        return_kind: ValueKind::I4,
        param_kinds: vec![ValueKind::I4, ValueKind::I4],
        instructions: vec![
            instr(0, OpCode::Ldarg0, Operand::None),
            instr(1, OpCode::Ldarg1, Operand::None),
            instr(2, OpCode::Add, Operand::None),
            instr(3, OpCode::Ret, Operand::None),
        ],
        locals: vec![],
        exception_handlers: vec![],
    });
    let math_utils = ty("MathLib", "MathUtils", TypeAttributes::PUBLIC, None, vec![], vec![], vec![add]);

    let increment = method(MethodSpec {
        token: 2,
        name: "Increment",
        flags: MethodAttributes::PUBLIC,
        return_kind: ValueKind::Void,
        param_kinds: vec![],
        instructions: vec![instr(0, OpCode::Ret, Operand::None)],
        locals: vec![],
        exception_handlers: vec![],
    });
    let counter_field = field(1, "_value", ilnc::model::FieldAttributes::PRIVATE, ValueKind::I4);
    let counter = ty("MathLib", "Counter", TypeAttributes::PUBLIC, None, vec![], vec![counter_field], vec![increment]);

    let get_result = method(MethodSpec {
        token: 3,
        name: "GetResult",
        flags: MethodAttributes::PUBLIC | MethodAttributes::VIRTUAL | MethodAttributes::ABSTRACT,
        return_kind: ValueKind::I4,
        param_kinds: vec![],
        instructions: vec![],
        locals: vec![],
        exception_handlers: vec![],
    });
    let icalculator = ty("MathLib", "ICalculator", TypeAttributes::PUBLIC | TypeAttributes::INTERFACE, None, vec![], vec![], vec![get_result]);

    assembly("MathLib", AssemblyKind::User, vec![math_utils, counter, icalculator], vec![], None)
}

fn build_app() -> ilnc::model::Assembly {
    let main = method(MethodSpec {
        token: 1,
        name: "Main",
        flags: MethodAttributes::PUBLIC | MethodAttributes::STATIC,
        return_kind: ValueKind::Void,
        param_kinds: vec![],
        instructions: vec![
            // A cross-assembly call shows up as a raw `MemberRef`-kind
            // token, not the loader-resolved `Operand::MemberRef` shape —
            // the latter is reserved for intrinsic/BCL targets the loader
            // already matched by name (see `model::loader`).
            instr(0, OpCode::Call, Operand::Token(MetadataToken::try_from(0x0A00_0001).unwrap())),
            instr(1, OpCode::Ret, Operand::None),
        ],
        locals: vec![],
        exception_handlers: vec![],
    });
    let program = ty("App", "Program", TypeAttributes::PUBLIC, None, vec![], vec![], vec![main]);
    assembly("App", AssemblyKind::User, vec![program], vec![AssemblyName::simple("MathLib")], Some(1))
}

#[test]
fn both_assemblies_are_loaded_and_classified_user() {
    let built = run_pipeline(vec![build_app(), build_math_lib()]);
    assert_eq!(built.assemblies.user_assemblies().count(), 2);
    assert_eq!(built.assemblies.all_loaded_types().count(), 4);
}

#[test]
fn cross_assembly_call_pulls_in_the_librarys_externally_visible_surface() {
    let built = run_pipeline(vec![build_app(), build_math_lib()]);
    // App.Program, plus all three of MathLib's public types.
    assert_eq!(built.reachability.types.len(), 4);
    assert!(built.reachability.types.iter().any(|t| t.assembly == 0));
    assert!(built.reachability.types.iter().any(|t| t.assembly == 1));
    assert_eq!(built.module.types.len(), 4);
}
