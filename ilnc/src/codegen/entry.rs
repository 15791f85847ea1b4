//! `main.cpp` (`spec.md` §4.5): emitted only when the module has an entry
//! point — runtime init, string-literal init, the entry call, runtime
//! shutdown.

use crate::codegen::CodeGenerator;

pub fn render(gen: &CodeGenerator) -> String {
    let mut out = String::new();
    out.push_str(&format!("#include \"{}\"\n\n", gen.header_file_name()));
    out.push_str("int main(int argc, char** argv) {\n");
    out.push_str("    ilnc_rt::runtime_init(argc, argv);\n");
    if !gen.module.string_pool.is_empty() {
        out.push_str("    __ilnc_init_string_literals();\n");
    }

    let entry_name = gen
        .entry_point
        .and_then(|id| gen.module.methods.iter().find(|m| m.source == id))
        .map(|m| m.mangled_name.clone())
        .unwrap_or_else(|| "/* missing entry point */ nullptr".to_string());

    let entry_method = gen.entry_point.map(|id| gen.method_def(id));
    let returns_int = entry_method.map(|m| matches!(m.return_kind, crate::model::ValueKind::I4)).unwrap_or(false);

    if returns_int {
        out.push_str(&format!("    int32_t __result = {entry_name}();\n"));
    } else {
        out.push_str(&format!("    {entry_name}();\n"));
    }
    out.push_str("    ilnc_rt::runtime_shutdown();\n");
    out.push_str(if returns_int { "    return __result;\n" } else { "    return 0;\n" });
    out.push_str("}\n");
    out
}
