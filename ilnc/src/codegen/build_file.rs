//! `CMakeLists.txt` (`spec.md` §4.5): package discovery, executable-vs-
//! library declaration, generated source list, runtime linking.

use crate::codegen::CodeGenerator;

pub fn render(gen: &CodeGenerator) -> String {
    let mut out = String::new();
    out.push_str("cmake_minimum_required(VERSION 3.20)\n");
    out.push_str(&format!("project({})\n\n", gen.module_name));
    out.push_str("set(CMAKE_CXX_STANDARD 20)\n");
    out.push_str("set(CMAKE_CXX_STANDARD_REQUIRED ON)\n\n");
    out.push_str("find_package(IlncRuntime REQUIRED)\n\n");

    let mut sources = vec![gen.source_file_name()];
    if gen.entry_point.is_some() {
        sources.push("main.cpp".to_string());
    }
    let source_list = sources.join(" ");

    if gen.entry_point.is_some() {
        out.push_str(&format!("add_executable({} {source_list})\n", gen.module_name));
    } else {
        out.push_str(&format!("add_library({} STATIC {source_list})\n", gen.module_name));
    }
    out.push_str(&format!("target_link_libraries({} PRIVATE IlncRuntime::runtime)\n", gen.module_name));
    out
}
