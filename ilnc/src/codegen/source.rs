//! The translation-unit body (`spec.md` §4.5 item 2): type-info constants,
//! static storage, cctor guards, and method bodies walked block-by-block.

use crate::codegen::CodeGenerator;
use crate::diagnostics::Diagnostics;
use crate::errors::CompileResult;
use crate::ir::instr::{BinaryOp, ConvertTarget, Instr, Register, UnaryOp, Value};
use crate::ir::{IRMethod, IRType};

pub fn render(gen: &CodeGenerator, diagnostics: &mut Diagnostics) -> CompileResult<String> {
    let mut out = String::new();
    out.push_str(&format!("#include \"{}\"\n\n", gen.header_file_name()));
    if gen.config.debug {
        out.push_str("// DEBUG BUILD\n\n");
    }

    for ty in gen.emitted_types() {
        render_type_info(gen, ty, &mut out);
    }
    out.push('\n');

    for ty in gen.emitted_types() {
        if ty.fields.iter().any(|f| f.is_static) {
            out.push_str(&format!("{}_Statics {}_statics{{}};\n", ty.mangled_name, ty.mangled_name));
        }
    }
    out.push('\n');

    for ty in gen.emitted_types() {
        if let Some(cctor) = ty.static_constructor {
            let cctor_method = gen.module.methods.iter().find(|m| m.source == cctor);
            if let Some(cctor_method) = cctor_method {
                out.push_str(&format!(
                    "static inline void {}_EnsureStaticsInit() {{\n    if (!{}_statics.__cctor_ran) {{\n        {}_statics.__cctor_ran = true;\n        {}();\n    }}\n}}\n\n",
                    ty.mangled_name, ty.mangled_name, ty.mangled_name, cctor_method.mangled_name
                ));
            }
        }
    }

    for method in &gen.module.methods {
        let Some(ty) = gen.ir_type(method.source.ty) else { continue };
        if ty.runtime_provided {
            continue;
        }
        render_method_body(gen, ty, method, &mut out, diagnostics)?;
    }

    if !gen.module.string_pool.is_empty() {
        out.push_str("void __ilnc_init_string_literals() {\n");
        for (index, literal) in gen.module.string_pool.iter().enumerate() {
            out.push_str(&format!("    __ilnc_string_{index} = ilnc_rt::string_literal(u8\"{}\");\n", escape(literal)));
        }
        out.push_str("}\n");
    }

    Ok(out)
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

fn render_type_info(gen: &CodeGenerator, ty: &IRType, out: &mut String) {
    let vtable_name = if ty.vtable.is_empty() { "nullptr".to_string() } else { format!("{}_vtable", ty.mangled_name) };
    if !ty.vtable.is_empty() {
        out.push_str(&format!("static void* {}_vtable[] = {{\n", ty.mangled_name));
        for slot in &ty.vtable {
            let name = gen.module.methods.iter().find(|m| m.source == *slot).map(|m| m.mangled_name.clone()).unwrap_or_else(|| "nullptr".to_string());
            out.push_str(&format!("    reinterpret_cast<void*>(&{name}),\n"));
        }
        out.push_str("};\n");
    }
    for (idx, iface) in ty.interface_impls.iter().enumerate() {
        out.push_str(&format!("static void* {}_iface{idx}_vtable[] = {{\n", ty.mangled_name));
        for slot in &iface.slots {
            let name = slot
                .and_then(|s| gen.module.methods.iter().find(|m| m.source == s))
                .map(|m| m.mangled_name.clone())
                .unwrap_or_else(|| "nullptr".to_string());
            out.push_str(&format!("    reinterpret_cast<void*>(&{name}),\n"));
        }
        out.push_str("};\n");
    }
    if !ty.interface_impls.is_empty() {
        out.push_str(&format!("static const ilnc_rt::InterfaceImpl {}_ifaces[] = {{\n", ty.mangled_name));
        for (idx, iface) in ty.interface_impls.iter().enumerate() {
            let iface_type = gen.ir_type(iface.interface).map(|t| t.mangled_name.clone()).unwrap_or_default();
            out.push_str(&format!("    {{ &{iface_type}_TypeInfo, {}_iface{idx}_vtable }},\n", ty.mangled_name));
        }
        out.push_str("};\n");
    }
    out.push_str(&format!("const ilnc_rt::TypeInfo {}_TypeInfo = {{\n", ty.mangled_name));
    out.push_str(&format!("    .name = \"{}\",\n", short_name(&ty.full_name)));
    out.push_str(&format!("    .full_name = \"{}\",\n", ty.full_name));
    out.push_str(&format!("    .instance_size = sizeof({}),\n", ty.mangled_name));
    out.push_str(&format!("    .vtable = {vtable_name},\n"));
    if ty.interface_impls.is_empty() {
        out.push_str("    .interfaces = nullptr,\n");
        out.push_str("    .interface_count = 0,\n");
    } else {
        out.push_str(&format!("    .interfaces = {}_ifaces,\n", ty.mangled_name));
        out.push_str(&format!("    .interface_count = {},\n", ty.interface_impls.len()));
    }
    out.push_str("    .custom_attributes = nullptr,\n");
    out.push_str("};\n\n");
}

fn short_name(full_name: &str) -> &str {
    full_name.rsplit('.').next().unwrap_or(full_name)
}

fn render_method_body(gen: &CodeGenerator, ty: &IRType, method: &IRMethod, out: &mut String, diagnostics: &mut Diagnostics) -> CompileResult<()> {
    let _ = diagnostics;
    out.push_str(&crate::codegen::header::method_signature(gen, ty, method));
    out.push_str(" {\n");

    let model = gen.method_def(method.source);
    if let Some(body) = &model.body {
        for (index, kind) in body.local_kinds.iter().enumerate() {
            let default = crate::codegen::default_value(kind);
            let cpp_type = gen.cpp_type(kind, method.source.ty.assembly);
            if default.is_empty() {
                out.push_str(&format!("    {cpp_type} loc{index};\n"));
            } else {
                out.push_str(&format!("    {cpp_type} loc{index} = {default};\n"));
            }
        }
    }
    for register in 0..register_count(method) {
        out.push_str(&format!("    ilnc_rt::Slot r{register};\n"));
    }

    for block in &method.blocks {
        out.push_str(&format!("BB_{}:\n", block.id.0));
        for instr in &block.instructions {
            render_instr(gen, method, instr, out);
        }
    }

    out.push_str("}\n\n");
    Ok(())
}

fn value_text(gen: &CodeGenerator, method: &IRMethod, value: &Value) -> String {
    match value {
        Value::Register(Register(idx)) => format!("r{idx}"),
        Value::ConstI32(v) => format!("{v}"),
        Value::ConstI64(v) => format!("{v}LL"),
        Value::ConstF32(v) => format!("{v}f"),
        Value::ConstF64(v) => format!("{v}"),
        Value::ConstString(s) => {
            let index = gen.module.string_index(s).unwrap_or(0);
            let _ = method;
            format!("__ilnc_string_{index}")
        }
        Value::Null => "nullptr".to_string(),
    }
}

fn binary_op_text(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "ilnc_rt::checked_add",
        BinaryOp::Sub => "ilnc_rt::checked_sub",
        BinaryOp::Mul => "ilnc_rt::checked_mul",
        BinaryOp::Div => "ilnc_rt::op_div",
        BinaryOp::DivUnsigned => "ilnc_rt::op_div_un",
        BinaryOp::Rem => "ilnc_rt::op_rem",
        BinaryOp::RemUnsigned => "ilnc_rt::op_rem_un",
        BinaryOp::And => "ilnc_rt::op_and",
        BinaryOp::Or => "ilnc_rt::op_or",
        BinaryOp::Xor => "ilnc_rt::op_xor",
        BinaryOp::Shl => "ilnc_rt::op_shl",
        BinaryOp::Shr => "ilnc_rt::op_shr",
        BinaryOp::ShrUnsigned => "ilnc_rt::op_shr_un",
        BinaryOp::Eq => "ilnc_rt::op_eq",
        BinaryOp::Lt => "ilnc_rt::op_lt",
        BinaryOp::LtUnsigned => "ilnc_rt::op_lt_un",
        BinaryOp::Gt => "ilnc_rt::op_gt",
        BinaryOp::GtUnsigned => "ilnc_rt::op_gt_un",
        BinaryOp::Ne => "ilnc_rt::op_ne",
        BinaryOp::Le => "ilnc_rt::op_le",
        BinaryOp::LeUnsigned => "ilnc_rt::op_le_un",
        BinaryOp::Ge => "ilnc_rt::op_ge",
        BinaryOp::GeUnsigned => "ilnc_rt::op_ge_un",
    }
}

fn convert_target_text(target: ConvertTarget) -> &'static str {
    match target {
        ConvertTarget::I1 => "int8_t",
        ConvertTarget::I2 => "int16_t",
        ConvertTarget::I4 => "int32_t",
        ConvertTarget::I8 => "int64_t",
        ConvertTarget::U1 => "uint8_t",
        ConvertTarget::U2 => "uint16_t",
        ConvertTarget::U4 => "uint32_t",
        ConvertTarget::U8 => "uint64_t",
        ConvertTarget::R4 => "float",
        ConvertTarget::R8 => "double",
    }
}

/// The number of distinct virtual registers a method's body allocated —
/// `next_register`'s high-water mark isn't kept on [`IRMethod`], so this
/// recovers it by scanning every `Register` a block's instructions name.
fn register_count(method: &IRMethod) -> u32 {
    let mut max = 0u32;
    let mut note = |r: &Register| max = max.max(r.0 + 1);
    for block in &method.blocks {
        for instr in &block.instructions {
            for value in crate::ir::builder::instr_values(instr) {
                if let Value::Register(r) = value {
                    note(r);
                }
            }
            if let Some(dst) = instr_dst(instr) {
                note(&dst);
            }
        }
    }
    max
}

fn instr_dst(instr: &Instr) -> Option<Register> {
    match instr {
        Instr::Move { dst, .. }
        | Instr::Binary { dst, .. }
        | Instr::Unary { dst, .. }
        | Instr::Convert { dst, .. }
        | Instr::LoadArg { dst, .. }
        | Instr::LoadLocal { dst, .. }
        | Instr::LoadField { dst, .. }
        | Instr::LoadStaticField { dst, .. }
        | Instr::LoadFieldAddress { dst, .. }
        | Instr::LoadStaticFieldAddress { dst, .. }
        | Instr::NewObject { dst, .. }
        | Instr::NewArray { dst, .. }
        | Instr::LoadElement { dst, .. }
        | Instr::ArrayLength { dst, .. }
        | Instr::Box { dst, .. }
        | Instr::Unbox { dst, .. }
        | Instr::CastClass { dst, .. }
        | Instr::IsInstance { dst, .. }
        | Instr::LoadFunctionPointer { dst, .. }
        | Instr::DelegateCreate { dst, .. } => Some(*dst),
        Instr::Call { dst, .. }
        | Instr::CallVirtual { dst, .. }
        | Instr::CallInterface { dst, .. }
        | Instr::CallIntrinsic { dst, .. }
        | Instr::CallDelegate { dst, .. } => *dst,
        _ => None,
    }
}

fn render_instr(gen: &CodeGenerator, method: &IRMethod, instr: &Instr, out: &mut String) {
    let v = |value: &Value| value_text(gen, method, value);
    match instr {
        Instr::Move { dst, value } => out.push_str(&format!("    r{} = {};\n", dst.0, v(value))),
        Instr::Binary { dst, op, lhs, rhs } => out.push_str(&format!("    r{} = {}({}, {});\n", dst.0, binary_op_text(*op), v(lhs), v(rhs))),
        Instr::Unary { dst, op, operand } => {
            let sym = match op {
                UnaryOp::Neg => "-",
                UnaryOp::Not => "~",
            };
            out.push_str(&format!("    r{} = {}{};\n", dst.0, sym, v(operand)));
        }
        Instr::Convert { dst, operand, target } => out.push_str(&format!("    r{} = static_cast<{}>({});\n", dst.0, convert_target_text(*target), v(operand))),
        Instr::LoadArg { dst, index } => out.push_str(&format!("    r{} = a{};\n", dst.0, index)),
        Instr::StoreArg { index, value } => out.push_str(&format!("    a{} = {};\n", index, v(value))),
        Instr::LoadLocal { dst, index } => out.push_str(&format!("    r{} = loc{};\n", dst.0, index)),
        Instr::StoreLocal { index, value } => out.push_str(&format!("    loc{} = {};\n", index, v(value))),
        Instr::LoadField { dst, object, field } => {
            let name = field_name(gen, field.declaring_type, field.field_index);
            out.push_str(&format!("    r{} = {}->{};\n", dst.0, v(object), name));
        }
        Instr::StoreField { object, field, value } => {
            let name = field_name(gen, field.declaring_type, field.field_index);
            out.push_str(&format!("    {}->{} = {};\n", v(object), name, v(value)));
        }
        Instr::LoadFieldAddress { dst, object, field } => {
            let name = field_name(gen, field.declaring_type, field.field_index);
            out.push_str(&format!("    r{} = &{}->{};\n", dst.0, v(object), name));
        }
        Instr::LoadStaticFieldAddress { dst, field } => {
            let ty = gen.ir_type(field.declaring_type);
            let (type_name, name) = static_field_ref(gen, field.declaring_type, field.field_index);
            if let Some(ty) = ty {
                if ty.static_constructor.is_some() {
                    out.push_str(&format!("    {}_EnsureStaticsInit();\n", ty.mangled_name));
                }
            }
            out.push_str(&format!("    r{} = &{type_name}_statics.{name};\n", dst.0));
        }
        Instr::LoadStaticField { dst, field } => {
            let ty = gen.ir_type(field.declaring_type);
            let (type_name, name) = static_field_ref(gen, field.declaring_type, field.field_index);
            if let Some(ty) = ty {
                if ty.static_constructor.is_some() {
                    out.push_str(&format!("    {}_EnsureStaticsInit();\n", ty.mangled_name));
                }
            }
            out.push_str(&format!("    r{} = {type_name}_statics.{name};\n", dst.0));
        }
        Instr::StoreStaticField { field, value } => {
            let ty = gen.ir_type(field.declaring_type);
            let (type_name, name) = static_field_ref(gen, field.declaring_type, field.field_index);
            if let Some(ty) = ty {
                if ty.static_constructor.is_some() {
                    out.push_str(&format!("    {}_EnsureStaticsInit();\n", ty.mangled_name));
                }
            }
            out.push_str(&format!("    {type_name}_statics.{name} = {};\n", v(value)));
        }
        Instr::NewObject { dst, ty, ctor, args } => {
            let ir_ty = gen.ir_type(*ty);
            let mangled = ir_ty.map(|t| t.mangled_name.clone()).unwrap_or_else(|| "ilnc_rt::Object".to_string());
            let ctor_name = gen.module.methods.iter().find(|m| m.source == *ctor).map(|m| m.mangled_name.clone());
            out.push_str(&format!(
                "    r{} = reinterpret_cast<{mangled}*>(ilnc_rt::gc_alloc(sizeof({mangled}), &{mangled}_TypeInfo));\n",
                dst.0
            ));
            if let Some(ctor_name) = ctor_name {
                let args_text = std::iter::once(format!("r{}", dst.0)).chain(args.iter().map(v)).collect::<Vec<_>>().join(", ");
                out.push_str(&format!("    {ctor_name}({args_text});\n"));
            }
        }
        Instr::NewArray { dst, element, length } => {
            let ir_ty = gen.ir_type(*element);
            let elem_name = ir_ty.map(|t| format!("&{}_TypeInfo", t.mangled_name)).unwrap_or_else(|| "nullptr".to_string());
            out.push_str(&format!("    r{} = ilnc_rt::array_new({elem_name}, {});\n", dst.0, v(length)));
        }
        Instr::LoadElement { dst, array, index } => out.push_str(&format!("    r{} = ilnc_rt::array_get({}, {});\n", dst.0, v(array), v(index))),
        Instr::StoreElement { array, index, value } => out.push_str(&format!("    ilnc_rt::array_set({}, {}, {});\n", v(array), v(index), v(value))),
        Instr::ArrayLength { dst, array } => out.push_str(&format!("    r{} = ilnc_rt::array_length({});\n", dst.0, v(array))),
        Instr::Call { dst, method: callee, args } => {
            let name = gen.module.methods.iter().find(|m| m.source == *callee).map(|m| m.mangled_name.clone()).unwrap_or_else(|| "/* unresolved call */ nullptr".to_string());
            let args_text = args.iter().map(v).collect::<Vec<_>>().join(", ");
            match dst {
                Some(d) => out.push_str(&format!("    r{} = {name}({args_text});\n", d.0)),
                None => out.push_str(&format!("    {name}({args_text});\n")),
            }
        }
        Instr::CallVirtual { dst, slot, receiver, args } => {
            let ty = gen.ir_type(slot.declaring_type);
            let recv = v(receiver);
            let args_text = std::iter::once(recv.clone()).chain(args.iter().map(v)).collect::<Vec<_>>().join(", ");
            let fn_ptr = format!("{recv}->__type_info->vtable->methods[{}]", slot.slot_index);
            let _ = ty;
            match dst {
                Some(d) => out.push_str(&format!("    r{} = reinterpret_cast<decltype(r{})(*)(...)>({fn_ptr})({args_text});\n", d.0, d.0)),
                None => out.push_str(&format!("    reinterpret_cast<void(*)(...)>({fn_ptr})({args_text});\n")),
            }
        }
        Instr::CallInterface { dst, interface, slot_index, receiver, args } => {
            let iface_ty = gen.ir_type(*interface);
            let iface_name = iface_ty.map(|t| format!("&{}_TypeInfo", t.mangled_name)).unwrap_or_else(|| "nullptr".to_string());
            let recv = v(receiver);
            let args_text = std::iter::once(recv.clone()).chain(args.iter().map(v)).collect::<Vec<_>>().join(", ");
            let fn_ptr = format!("ilnc_rt::type_get_interface_vtable_checked({recv}->__type_info, {iface_name})->methods[{slot_index}]");
            match dst {
                Some(d) => out.push_str(&format!("    r{} = reinterpret_cast<decltype(r{})(*)(...)>({fn_ptr})({args_text});\n", d.0, d.0)),
                None => out.push_str(&format!("    reinterpret_cast<void(*)(...)>({fn_ptr})({args_text});\n")),
            }
        }
        Instr::CallIntrinsic { dst, runtime_function, args } => {
            let args_text = args.iter().map(v).collect::<Vec<_>>().join(", ");
            match dst {
                Some(d) => out.push_str(&format!("    r{} = {runtime_function}({args_text});\n", d.0)),
                None => out.push_str(&format!("    {runtime_function}({args_text});\n")),
            }
        }
        Instr::CallDelegate { dst, delegate, args, parameter_kinds, return_kind } => {
            let return_cpp = gen.cpp_type(return_kind, method.source.ty.assembly);
            let param_cpp = parameter_kinds.iter().map(|k| gen.cpp_type(k, method.source.ty.assembly)).collect::<Vec<_>>().join(", ");
            let template_args = if param_cpp.is_empty() { return_cpp } else { format!("{return_cpp}, {param_cpp}") };
            let args_text = std::iter::once(v(delegate)).chain(args.iter().map(v)).collect::<Vec<_>>().join(", ");
            match dst {
                Some(d) => out.push_str(&format!("    r{} = ilnc_rt::delegate_invoke<{template_args}>({args_text});\n", d.0)),
                None => out.push_str(&format!("    ilnc_rt::delegate_invoke<{template_args}>({args_text});\n")),
            }
        }
        Instr::LoadFunctionPointer { dst, method, receiver } => {
            let name = gen.module.methods.iter().find(|m| m.source == *method).map(|m| m.mangled_name.clone()).unwrap_or_else(|| "nullptr".to_string());
            match receiver {
                Some(receiver) => out.push_str(&format!("    r{} = ilnc_rt::bound_function_pointer({}, reinterpret_cast<void*>(&{name}));\n", dst.0, v(receiver))),
                None => out.push_str(&format!("    r{} = reinterpret_cast<void*>(&{name});\n", dst.0)),
            }
        }
        Instr::DelegateCreate { dst, delegate_type, target, function } => {
            let ty = gen.ir_type(*delegate_type);
            let name = ty.map(|t| format!("&{}_TypeInfo", t.mangled_name)).unwrap_or_else(|| "nullptr".to_string());
            out.push_str(&format!("    r{} = ilnc_rt::delegate_create({name}, {}, {});\n", dst.0, v(target), v(function)));
        }
        Instr::Box { dst, value, value_type } => {
            let ty = gen.ir_type(*value_type);
            let name = ty.map(|t| format!("&{}_TypeInfo", t.mangled_name)).unwrap_or_else(|| "nullptr".to_string());
            out.push_str(&format!("    r{} = ilnc_rt::box({name}, {});\n", dst.0, v(value)));
        }
        Instr::Unbox { dst, value, target_type } => {
            let ty = gen.ir_type(*target_type);
            let cpp = ty.map(|t| t.mangled_name.clone()).unwrap_or_else(|| "ilnc_rt::Object".to_string());
            out.push_str(&format!("    r{} = *reinterpret_cast<{cpp}*>(ilnc_rt::unbox({}));\n", dst.0, v(value)));
        }
        Instr::CastClass { dst, value, target_type } => {
            let ty = gen.ir_type(*target_type);
            let name = ty.map(|t| format!("&{}_TypeInfo", t.mangled_name)).unwrap_or_else(|| "nullptr".to_string());
            out.push_str(&format!("    r{} = ilnc_rt::cast_class({name}, {});\n", dst.0, v(value)));
        }
        Instr::IsInstance { dst, value, target_type } => {
            let ty = gen.ir_type(*target_type);
            let name = ty.map(|t| format!("&{}_TypeInfo", t.mangled_name)).unwrap_or_else(|| "nullptr".to_string());
            out.push_str(&format!("    r{} = ilnc_rt::is_instance({name}, {});\n", dst.0, v(value)));
        }
        Instr::InitObj { address, ty } => {
            let ir_ty = gen.ir_type(*ty);
            let cpp = ir_ty.map(|t| t.mangled_name.clone()).unwrap_or_else(|| "ilnc_rt::Object".to_string());
            out.push_str(&format!("    *reinterpret_cast<{cpp}*>({}) = {cpp}{{}};\n", v(address)));
        }
        Instr::NullCheck { value } => out.push_str(&format!("    ilnc_rt::null_check({});\n", v(value))),
        Instr::Throw { exception } => out.push_str(&format!("    ilnc_rt::throw_exception({});\n", v(exception))),
        Instr::Rethrow => out.push_str("    RETHROW;\n"),
        Instr::Branch { target } => out.push_str(&format!("    goto BB_{};\n", target.0)),
        Instr::BranchIf { condition, when_true, when_false } => {
            out.push_str(&format!("    if ({}) goto BB_{}; else goto BB_{};\n", v(condition), when_true.0, when_false.0));
        }
        Instr::Switch { selector, targets, default } => {
            out.push_str(&format!("    switch ({}) {{\n", v(selector)));
            for (i, target) in targets.iter().enumerate() {
                out.push_str(&format!("        case {i}: goto BB_{}; break;\n", target.0));
            }
            out.push_str(&format!("        default: goto BB_{};\n", default.0));
            out.push_str("    }\n");
        }
        Instr::Return { value } => match value {
            Some(value) => out.push_str(&format!("    return {};\n", v(value))),
            None => out.push_str("    return;\n"),
        },
        Instr::TryBegin { region } => out.push_str(&format!("    TRY {{ // region {region}\n")),
        Instr::TryEnd { region } => out.push_str(&format!("    }} // end region {region}\n")),
        Instr::CatchBegin { region, exception_type } => {
            match exception_type.and_then(|t| gen.ir_type(t)) {
                Some(ty) => out.push_str(&format!("    }} CATCH({}) {{ // region {region}\n", ty.mangled_name)),
                None => out.push_str(&format!("    }} CATCH_ALL {{ // region {region}\n")),
            }
        }
        Instr::FilterBegin { region } => out.push_str(&format!("    }} FILTER_BEGIN {{ // region {region}\n")),
        Instr::FinallyBegin { region } => out.push_str(&format!("    }} FINALLY {{ // region {region}\n")),
        Instr::EndFilter => out.push_str("    } // end filter\n"),
        Instr::EndFinally => out.push_str("    }\n    END_TRY;\n"),
        Instr::Leave { target } => out.push_str(&format!("    goto BB_{};\n", target.0)),
        Instr::Nop => out.push_str("    ;\n"),
        Instr::Comment(text) => out.push_str(&format!("    // {text}\n")),
    }
}

fn field_name(gen: &CodeGenerator, declaring_type: crate::reachability::TypeId, field_index: usize) -> String {
    gen.ir_type(declaring_type).and_then(|t| t.fields.get(field_index)).map(|f| f.mangled_name.clone()).unwrap_or_else(|| format!("f_unknown_{field_index}"))
}

fn static_field_ref(gen: &CodeGenerator, declaring_type: crate::reachability::TypeId, field_index: usize) -> (String, String) {
    let ty = gen.ir_type(declaring_type);
    let type_name = ty.map(|t| t.mangled_name.clone()).unwrap_or_default();
    let field_name = ty.and_then(|t| t.fields.get(field_index)).map(|f| f.mangled_name.clone()).unwrap_or_else(|| format!("f_unknown_{field_index}"));
    (type_name, field_name)
}
