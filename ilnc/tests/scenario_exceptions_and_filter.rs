//! `spec.md` §8, scenario 5 (ExceptionsAndFilter): a protected region with a
//! filtered catch followed by a `finally` over the same `try_range`
//! (ECMA-335 §I.12.4.2.5) — the lowered instruction stream must contain one
//! `TryBegin`/`TryEnd` pair bracketing both handlers, with `FilterBegin`,
//! `EndFilter`, `CatchBegin`, and `FinallyBegin` markers spliced in between
//! in source order.

mod common;

use common::*;
use ilnc::ir::instr::Instr;
use ilnc::model::{AssemblyKind, ExceptionHandler, ExceptionHandlerKind, MethodAttributes, TypeAttributes, ValueKind};
use ilnc::raw::il::{Operand, OpCode};

fn build_guarded() -> ilnc::model::Assembly {
    let exn_ctor = method(MethodSpec {
        token: 1,
        name: ".ctor",
        flags: MethodAttributes::PUBLIC | MethodAttributes::RT_SPECIAL_NAME,
        return_kind: ValueKind::Void,
        param_kinds: vec![],
        instructions: vec![instr(0, OpCode::Ldarg0, Operand::None), instr(1, OpCode::Ret, Operand::None)],
        locals: vec![],
        exception_handlers: vec![],
    });
    let my_exception = ty("Guard", "MyException", TypeAttributes::PUBLIC, None, vec![], vec![], vec![exn_ctor]);

    // Offsets:
    //   0 Nop            \ try
    //   1 Newobj MyException::.ctor
    //   2 Throw           /
    //   3 Ldc.i4.1        \ filter (filter_offset = 3)
    //   4 Endfilter        /
    //   5 Nop             \ catch handler (handler_range = (5,7))
    //   6 Leave -> 9       /
    //   7 Nop             \ finally (handler_range = (7,9))
    //   8 Endfinally       /
    //   9 Ret
    let handlers = vec![
        ExceptionHandler { kind: ExceptionHandlerKind::Filter { filter_offset: 3 }, try_range: (0, 3), handler_range: (5, 7) },
        ExceptionHandler { kind: ExceptionHandlerKind::Finally, try_range: (0, 3), handler_range: (7, 9) },
    ];

    let run = method(MethodSpec {
        token: 2,
        name: "Run",
        flags: MethodAttributes::PUBLIC | MethodAttributes::STATIC,
        return_kind: ValueKind::Void,
        param_kinds: vec![],
        instructions: vec![
            instr(0, OpCode::Nop, Operand::None),
            instr(1, OpCode::Newobj, method_token(1)),
            instr(2, OpCode::Throw, Operand::None),
            instr(3, OpCode::LdcI41, Operand::None),
            instr(4, OpCode::Compound(ilnc::raw::il::CompoundOpCode::Endfilter), Operand::None),
            instr(5, OpCode::Nop, Operand::None),
            instr(6, OpCode::Leave, Operand::BranchTarget(2)),
            instr(7, OpCode::Nop, Operand::None),
            instr(8, OpCode::Endfinally, Operand::None),
            instr(9, OpCode::Ret, Operand::None),
        ],
        locals: vec![],
        exception_handlers: handlers,
    });
    let program = ty("Guard", "Program", TypeAttributes::PUBLIC, None, vec![], vec![], vec![run]);

    assembly("Guard", AssemblyKind::User, vec![my_exception, program], vec![], None)
}

#[test]
fn the_markers_appear_in_try_filter_catch_finally_order() {
    let built = run_pipeline(vec![build_guarded()]);
    let run = find_method(&built.module, "Run");
    let all: Vec<&Instr> = run.blocks.iter().flat_map(|b| &b.instructions).collect();

    let markers: Vec<&str> = all
        .iter()
        .filter_map(|i| match i {
            Instr::TryBegin { .. } => Some("TryBegin"),
            Instr::FilterBegin { .. } => Some("FilterBegin"),
            Instr::EndFilter => Some("EndFilter"),
            Instr::CatchBegin { .. } => Some("CatchBegin"),
            Instr::FinallyBegin { .. } => Some("FinallyBegin"),
            Instr::TryEnd { .. } => Some("TryEnd"),
            _ => None,
        })
        .collect();

    assert_eq!(markers, vec!["TryBegin", "FilterBegin", "EndFilter", "CatchBegin", "FinallyBegin", "TryEnd"]);
}

#[test]
fn the_filters_catch_clause_carries_no_static_exception_type() {
    let built = run_pipeline(vec![build_guarded()]);
    let run = find_method(&built.module, "Run");
    let catch = run
        .blocks
        .iter()
        .flat_map(|b| &b.instructions)
        .find_map(|i| match i {
            Instr::CatchBegin { exception_type, .. } => Some(exception_type.clone()),
            _ => None,
        })
        .expect("a CatchBegin instruction");
    assert_eq!(catch, None);
}

#[test]
fn try_begin_and_try_end_share_a_single_region_bracketing_both_handlers() {
    let built = run_pipeline(vec![build_guarded()]);
    let run = find_method(&built.module, "Run");
    assert_eq!(run.exception_regions.len(), 2);
    for region in &run.exception_regions {
        assert_eq!(region.try_range, (0, 3));
    }
}
