//! The C++ type-naming half of the Name Mapper's job (`spec.md` §4.4's
//! `cpp_type_name_for_decl`/`cpp_type_name_for_signature`): turns a
//! [`ValueKind`] into the string the generator prints in a field
//! declaration, a parameter list, or a `static_cast`.

use crate::assembly_set::AssemblySet;
use crate::ir::IRModule;
use crate::model::{TypeHandle, ValueKind};
use crate::reachability::ReachabilityResult;
use crate::runtime_types;

/// Ensures a type name doesn't end up double-pointered (`spec.md` §4.4's
/// `cpp_type_name_for_decl` guarantee) — every runtime-provided reference
/// type is already spelled with its trailing `*`.
pub fn pointer_to(base: &str) -> String {
    if base.ends_with('*') {
        base.to_string()
    } else {
        format!("{base}*")
    }
}

fn full_name_of_handle(handle: &TypeHandle, assemblies: &AssemblySet, from_assembly: usize) -> String {
    match handle {
        TypeHandle::Local(index) => assemblies.get(from_assembly).types[*index].full_name(),
        TypeHandle::External { namespace, name, .. } => {
            if namespace.is_empty() {
                name.clone()
            } else {
                format!("{namespace}.{name}")
            }
        }
        TypeHandle::Generic { base, .. } => full_name_of_handle(base, assemblies, from_assembly),
    }
}

/// Resolves a `Class`/`ValueType` reference to its C++ spelling: the
/// module-local `IRType`'s mangled name if the referenced type itself made
/// it into this compile's reachable set, otherwise the fixed runtime-object
/// surface for whatever BCL type it names.
fn resolve_class(
    handle: &TypeHandle,
    is_value_type: bool,
    from_assembly: usize,
    module: &IRModule,
    assemblies: &AssemblySet,
    reachability: &ReachabilityResult,
) -> String {
    if let Some(type_id) = reachability.resolve_type_handle(assemblies, from_assembly, handle) {
        if let Some(ir_type) = module.types.iter().find(|t| t.source == type_id) {
            if !ir_type.runtime_provided {
                return if is_value_type { ir_type.mangled_name.clone() } else { pointer_to(&ir_type.mangled_name) };
            }
        }
    }
    runtime_types::cpp_name(&full_name_of_handle(handle, assemblies, from_assembly)).to_string()
}

/// The C++ type string for a value of this [`ValueKind`], as seen from
/// `from_assembly` (the assembly whose `TypeHandle::Local` indices the
/// kind's class references, if any, are relative to).
pub fn cpp_type_name(kind: &ValueKind, from_assembly: usize, module: &IRModule, assemblies: &AssemblySet, reachability: &ReachabilityResult) -> String {
    match kind {
        ValueKind::Void => "void".to_string(),
        ValueKind::Boolean => "bool".to_string(),
        ValueKind::Char => "char16_t".to_string(),
        ValueKind::I1 => "int8_t".to_string(),
        ValueKind::U1 => "uint8_t".to_string(),
        ValueKind::I2 => "int16_t".to_string(),
        ValueKind::U2 => "uint16_t".to_string(),
        ValueKind::I4 => "int32_t".to_string(),
        ValueKind::U4 => "uint32_t".to_string(),
        ValueKind::I8 => "int64_t".to_string(),
        ValueKind::U8 => "uint64_t".to_string(),
        ValueKind::R4 => "float".to_string(),
        ValueKind::R8 => "double".to_string(),
        ValueKind::String => "ilnc_rt::String*".to_string(),
        ValueKind::Object => "ilnc_rt::Object*".to_string(),
        ValueKind::IntPtr => "intptr_t".to_string(),
        ValueKind::UIntPtr => "uintptr_t".to_string(),
        ValueKind::Ptr(inner) => pointer_to(&cpp_type_name(inner, from_assembly, module, assemblies, reachability)),
        ValueKind::ByRef(inner) => format!("{}&", cpp_type_name(inner, from_assembly, module, assemblies, reachability)),
        ValueKind::Class { handle, is_value_type } => resolve_class(handle, *is_value_type, from_assembly, module, assemblies, reachability),
        ValueKind::SzArray(_) => "ilnc_rt::Array*".to_string(),
        ValueKind::Generic => "ilnc_rt::Object*".to_string(),
    }
}

/// `spec.md` §4.4's `default_value`: the zero-value literal a freshly
/// allocated field or a `default(T)` expression prints.
pub fn default_value(kind: &ValueKind) -> &'static str {
    match kind {
        ValueKind::Void => "",
        ValueKind::Boolean => "false",
        ValueKind::Char => "u'\\0'",
        ValueKind::R4 => "0.0f",
        ValueKind::R8 => "0.0",
        ValueKind::I1 | ValueKind::U1 | ValueKind::I2 | ValueKind::U2 | ValueKind::I4 | ValueKind::U4 | ValueKind::I8 | ValueKind::U8 | ValueKind::IntPtr | ValueKind::UIntPtr => "0",
        ValueKind::Class { is_value_type: true, .. } => "{}",
        _ => "nullptr",
    }
}
