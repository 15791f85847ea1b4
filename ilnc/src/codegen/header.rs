use crate::codegen::{pointer_to, CodeGenerator, RUNTIME_HEADER};
use crate::ir::{IRMethod, IRType};

/// Emits `<module>.h` (`spec.md` §4.5's header-file item list).
pub fn render(gen: &CodeGenerator) -> String {
    let mut out = String::new();
    out.push_str(&format!("#pragma once\n\n#include \"{RUNTIME_HEADER}\"\n\n"));

    for ty in gen.emitted_types() {
        out.push_str(&format!("struct {};\n", ty.mangled_name));
    }
    out.push('\n');

    for ty in gen.emitted_types() {
        out.push_str(&format!("extern const ilnc_rt::TypeInfo {}_TypeInfo;\n", ty.mangled_name));
    }
    out.push('\n');

    for ty in gen.emitted_types() {
        render_struct(gen, ty, &mut out);
        if has_static_fields(ty) {
            render_statics(gen, ty, &mut out);
        }
    }

    for method in &gen.module.methods {
        let Some(ty) = gen.ir_type(method.source.ty) else { continue };
        if ty.runtime_provided {
            continue;
        }
        out.push_str(&method_signature(gen, ty, method));
        out.push_str(";\n");
    }

    if !gen.module.string_pool.is_empty() {
        out.push_str("\nvoid __ilnc_init_string_literals();\n");
    }

    out
}

fn has_static_fields(ty: &IRType) -> bool {
    ty.fields.iter().any(|f| f.is_static)
}

fn render_struct(gen: &CodeGenerator, ty: &IRType, out: &mut String) {
    out.push_str(&format!("struct {} {{\n", ty.mangled_name));
    if !ty.is_value_type {
        out.push_str("    const ilnc_rt::TypeInfo* __type_info;\n");
        out.push_str("    uintptr_t __sync_block;\n");
    }
    for field in ty.fields.iter().filter(|f| !f.is_static) {
        let cpp_type = gen.cpp_type(&field.value_kind, ty.source.assembly);
        out.push_str(&format!("    {cpp_type} {};\n", field.mangled_name));
    }
    out.push_str("};\n\n");
}

fn render_statics(gen: &CodeGenerator, ty: &IRType, out: &mut String) {
    out.push_str(&format!("struct {}_Statics {{\n", ty.mangled_name));
    if ty.static_constructor.is_some() {
        out.push_str("    bool __cctor_ran = false;\n");
    }
    for field in ty.fields.iter().filter(|f| f.is_static) {
        let cpp_type = gen.cpp_type(&field.value_kind, ty.source.assembly);
        out.push_str(&format!("    {cpp_type} {};\n", field.mangled_name));
    }
    out.push_str("};\n");
    out.push_str(&format!("extern {}_Statics {}_statics;\n\n", ty.mangled_name, ty.mangled_name));
}

/// Builds a method's full C++ declaration, e.g.
/// `int32_t Calculator_Add(Calculator* __this, int32_t a, int32_t b)`
/// (`spec.md` §8's HelloWorld scenario names this exact shape).
pub(crate) fn method_signature(gen: &CodeGenerator, ty: &IRType, method: &IRMethod) -> String {
    let model = gen.method_def(method.source);
    let return_cpp = gen.cpp_type(&model.return_kind, method.source.ty.assembly);
    let mut params = Vec::new();
    if !model.is_static() {
        params.push(format!("{} __this", pointer_to(&ty.mangled_name)));
    }
    for (i, kind) in model.parameter_kinds.iter().enumerate() {
        params.push(format!("{} a{i}", gen.cpp_type(kind, method.source.ty.assembly)));
    }
    format!("{return_cpp} {}({})", method.mangled_name, params.join(", "))
}
