//! `newarr`/`box`/`unbox`/`unbox.any`/`castclass`/`isinst` each name their
//! own type operand on the wire — none of them should ever resolve to the
//! enclosing method's own declaring type.

mod common;

use common::*;
use ilnc::ir::instr::Instr;
use ilnc::model::{AssemblyKind, MethodAttributes, TypeAttributes, ValueKind};
use ilnc::raw::il::{Operand, OpCode};

fn build_zoo() -> ilnc::model::Assembly {
    let speak = method(MethodSpec {
        token: 10,
        name: "Speak",
        flags: MethodAttributes::PUBLIC,
        return_kind: ValueKind::Void,
        param_kinds: vec![],
        instructions: vec![instr(0, OpCode::Ret, Operand::None)],
        locals: vec![],
        exception_handlers: vec![],
    });
    let animal = ty("Zoo", "Animal", TypeAttributes::PUBLIC, None, vec![], vec![], vec![speak]);

    let run = method(MethodSpec {
        token: 1,
        name: "Run",
        flags: MethodAttributes::PUBLIC | MethodAttributes::STATIC,
        return_kind: ValueKind::Void,
        param_kinds: vec![ValueKind::Object],
        instructions: vec![
            instr(0, OpCode::Ldarg0, Operand::None),
            instr(1, OpCode::Castclass, Operand::TypeName("Zoo.Animal".to_string())),
            instr(2, OpCode::Pop, Operand::None),
            instr(3, OpCode::LdcI40, Operand::None),
            instr(4, OpCode::Newarr, Operand::TypeName("Zoo.Animal".to_string())),
            instr(5, OpCode::Pop, Operand::None),
            instr(6, OpCode::Ret, Operand::None),
        ],
        locals: vec![],
        exception_handlers: vec![],
    });
    let zookeeper = ty("Zoo", "Zookeeper", TypeAttributes::PUBLIC, None, vec![], vec![], vec![run]);

    assembly("Zoo", AssemblyKind::User, vec![animal, zookeeper], vec![], None)
}

#[test]
fn castclass_and_newarr_resolve_to_the_operands_own_type_not_the_enclosing_method() {
    let built = run_pipeline(vec![build_zoo()]);
    let animal_id = type_id_of(&built.module, "Animal");
    let zookeeper_id = type_id_of(&built.module, "Zookeeper");
    let run = find_method(&built.module, "Run");
    let all: Vec<&Instr> = run.blocks.iter().flat_map(|b| &b.instructions).collect();

    let cast_target = all
        .iter()
        .find_map(|i| match i {
            Instr::CastClass { target_type, .. } => Some(*target_type),
            _ => None,
        })
        .expect("a CastClass instruction");
    assert_eq!(cast_target, animal_id);
    assert_ne!(cast_target, zookeeper_id);

    let array_element = all
        .iter()
        .find_map(|i| match i {
            Instr::NewArray { element, .. } => Some(*element),
            _ => None,
        })
        .expect("a NewArray instruction");
    assert_eq!(array_element, animal_id);
}

#[test]
fn an_unresolvable_type_operand_warns_instead_of_substituting_a_type() {
    let mut name_mapper = ilnc::name_mapper::NameMapper::new();
    let intrinsics = ilnc::intrinsics::IntrinsicCallRegistry::new();
    let mut diagnostics = ilnc::diagnostics::Diagnostics::new();

    let broken_run = method(MethodSpec {
        token: 2,
        name: "Broken",
        flags: MethodAttributes::PUBLIC | MethodAttributes::STATIC,
        return_kind: ValueKind::Void,
        param_kinds: vec![],
        instructions: vec![
            instr(0, OpCode::LdcI40, Operand::None),
            instr(1, OpCode::Newarr, Operand::TypeName("Zoo.DoesNotExist".to_string())),
            instr(2, OpCode::Pop, Operand::None),
            instr(3, OpCode::Ret, Operand::None),
        ],
        locals: vec![],
        exception_handlers: vec![],
    });
    let mut broken_zoo = build_zoo();
    broken_zoo.types.push(ty("Zoo", "Broken", TypeAttributes::PUBLIC, None, vec![], vec![], vec![broken_run]));
    let mut set = ilnc::assembly_set::AssemblySet::new();
    set.insert(broken_zoo);
    let reachability = ilnc::reachability::ReachabilityAnalyzer::new(&set).analyze().expect("reachability analysis");
    let module = ilnc::ir::builder::IRBuilder::new(&set, &reachability, &mut name_mapper, &intrinsics, &mut diagnostics)
        .build()
        .expect("IR build should not hard-fail on an unresolved type operand");

    assert!(diagnostics.warning_count() > 0, "expected a diagnosed warning for the unresolved type operand");
    let broken = module.methods.iter().find(|m| m.mangled_name.ends_with("Broken")).expect("Broken method reachable");
    assert!(
        !broken.blocks.iter().flat_map(|b| &b.instructions).any(|i| matches!(i, Instr::NewArray { .. })),
        "no NewArray should be emitted for an unresolved element type"
    );
}
