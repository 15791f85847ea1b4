//! Shared helpers for the scenario tests in this directory: each one builds
//! a `model::` graph by hand (no PE bytes, no `model::loader`) and drives
//! it straight through `ReachabilityAnalyzer` / `IRBuilder` / `CodeGenerator`,
//! the same way `reachability.rs`'s own unit tests construct a minimal
//! `Assembly` in-process.

#![allow(dead_code)]

use ilnc::assembly_set::AssemblySet;
use ilnc::diagnostics::Diagnostics;
use ilnc::intrinsics::IntrinsicCallRegistry;
use ilnc::ir::builder::IRBuilder;
use ilnc::ir::{IRMethod, IRModule};
use ilnc::metadata_token::MetadataToken;
use ilnc::model::{
    Assembly, AssemblyKind, AssemblyName, ExceptionHandler, FieldAttributes, FieldDef, MethodAttributes, MethodBody, MethodDef,
    TypeAttributes, TypeDef, TypeHandle, ValueKind,
};
use ilnc::name_mapper::NameMapper;
use ilnc::raw::il::{Operand, OpCode, RawInstruction};
use ilnc::raw::signature::{CallingConvention, MethodSignature, TypeSignature};
use ilnc::reachability::{MethodId, ReachabilityAnalyzer, ReachabilityResult, TypeId};

pub fn instr(offset: u32, opcode: OpCode, operand: Operand) -> RawInstruction {
    RawInstruction { offset, opcode, operand }
}

/// A `call`/`callvirt`/`newobj`/`ldfld`/`ldftn` operand naming a same-assembly
/// `MethodDef` row — tests reference methods by their own plain `token`
/// (see [`method`]), this wraps it in the `0x06xxxxxx`-tagged token the
/// lowering pass expects to find on the wire.
pub fn method_token(index: u32) -> Operand {
    Operand::Token(MetadataToken::try_from(0x0600_0000 | index).unwrap())
}

pub fn field_token(index: u32) -> Operand {
    Operand::Token(MetadataToken::try_from(0x0400_0000 | index).unwrap())
}

fn prim_sig(kind: &ValueKind) -> TypeSignature {
    match kind {
        ValueKind::Void => TypeSignature::Void,
        ValueKind::I4 => TypeSignature::I4,
        ValueKind::Boolean => TypeSignature::Boolean,
        _ => TypeSignature::Object,
    }
}

pub struct MethodSpec {
    pub token: u32,
    pub name: &'static str,
    pub flags: MethodAttributes,
    pub return_kind: ValueKind,
    pub param_kinds: Vec<ValueKind>,
    pub instructions: Vec<RawInstruction>,
    pub locals: Vec<ValueKind>,
    pub exception_handlers: Vec<ExceptionHandler>,
}

pub fn method(spec: MethodSpec) -> MethodDef {
    let has_this = !spec.flags.contains(MethodAttributes::STATIC);
    let signature = MethodSignature {
        calling_convention: if has_this { CallingConvention::HAS_THIS } else { CallingConvention::DEFAULT },
        generic_param_count: 0,
        return_type: prim_sig(&spec.return_kind),
        parameters: spec.param_kinds.iter().map(prim_sig).collect(),
    };
    let body = if spec.instructions.is_empty() {
        None
    } else {
        Some(MethodBody {
            max_stack: 8,
            locals: spec.locals.iter().map(prim_sig).collect(),
            local_kinds: spec.locals.clone(),
            instructions: spec.instructions,
            exception_handlers: spec.exception_handlers,
            sequence_points: Vec::new(),
        })
    };
    MethodDef {
        token: spec.token,
        name: spec.name.to_string(),
        flags: spec.flags,
        signature,
        return_kind: spec.return_kind,
        parameter_kinds: spec.param_kinds,
        generic_param_count: 0,
        body,
        overrides: Vec::new(),
    }
}

pub fn ty(
    namespace: &str,
    name: &str,
    flags: TypeAttributes,
    base: Option<TypeHandle>,
    interfaces: Vec<TypeHandle>,
    fields: Vec<FieldDef>,
    methods: Vec<MethodDef>,
) -> TypeDef {
    TypeDef {
        namespace: namespace.to_string(),
        name: name.to_string(),
        flags,
        is_value_type: false,
        base_type: base,
        interfaces,
        fields,
        methods,
        generic_param_count: 0,
        nested_in: None,
    }
}

pub fn field(token: u32, name: &str, flags: FieldAttributes, value_kind: ValueKind) -> FieldDef {
    FieldDef { token, name: name.to_string(), flags, signature: prim_sig(&value_kind), value_kind, constant: None }
}

pub fn assembly(name: &str, kind: AssemblyKind, types: Vec<TypeDef>, references: Vec<AssemblyName>, entry_point: Option<usize>) -> Assembly {
    Assembly { name: AssemblyName::simple(name), kind, references, types, entry_point }
}

pub struct BuiltPipeline {
    pub assemblies: AssemblySet,
    pub reachability: ReachabilityResult,
    pub module: IRModule,
}

pub fn run_pipeline(assemblies: Vec<Assembly>) -> BuiltPipeline {
    let mut set = AssemblySet::new();
    for a in assemblies {
        set.insert(a);
    }
    let reachability = ReachabilityAnalyzer::new(&set).analyze().expect("reachability analysis");
    let mut name_mapper = NameMapper::new();
    let intrinsics = IntrinsicCallRegistry::new();
    let mut diagnostics = Diagnostics::new();
    let module = IRBuilder::new(&set, &reachability, &mut name_mapper, &intrinsics, &mut diagnostics)
        .build()
        .expect("IR build");
    BuiltPipeline { assemblies: set, reachability, module }
}

pub fn find_method<'a>(module: &'a IRModule, name_suffix: &str) -> &'a IRMethod {
    module
        .methods
        .iter()
        .find(|m| m.mangled_name.ends_with(name_suffix))
        .unwrap_or_else(|| panic!("no method with mangled name ending in {name_suffix:?}"))
}

pub fn method_id_of(module: &IRModule, name_suffix: &str) -> MethodId {
    find_method(module, name_suffix).source
}

pub fn type_id_of(module: &IRModule, name_suffix: &str) -> TypeId {
    module
        .types
        .iter()
        .find(|t| t.full_name.ends_with(name_suffix))
        .unwrap_or_else(|| panic!("no type with full name ending in {name_suffix:?}"))
        .source
}
