//! The C++ Code Generator (`spec.md` §4.5): deterministic, textual emission
//! of the four output artifacts from an [`IRModule`] — a header, a
//! translation-unit source, an optional entry-point source, and a build
//! description file.

mod build_file;
mod entry;
mod header;
mod source;
mod types;

pub use types::{cpp_type_name, default_value, pointer_to};

use crate::assembly_set::AssemblySet;
use crate::config::BuildConfiguration;
use crate::diagnostics::Diagnostics;
use crate::errors::CompileResult;
use crate::ir::IRModule;
use crate::reachability::{MethodId, ReachabilityResult};

/// A C++ identifier naming the runtime's single umbrella header — the one
/// include every generated translation unit opens with (`spec.md` §4.5).
pub const RUNTIME_HEADER: &str = "ilnc_rt/runtime.h";

pub struct GeneratedArtifacts {
    pub header: String,
    pub source: String,
    /// `None` for a library build (`spec.md` §8's "library vs executable
    /// mode is decided solely by presence of an entry point" rule).
    pub entry: Option<String>,
    pub build_file: String,
}

pub struct CodeGenerator<'a> {
    pub module: &'a IRModule,
    pub assemblies: &'a AssemblySet,
    pub reachability: &'a ReachabilityResult,
    pub config: &'a BuildConfiguration,
    pub module_name: String,
    pub entry_point: Option<MethodId>,
}

impl<'a> CodeGenerator<'a> {
    pub fn new(
        module: &'a IRModule,
        assemblies: &'a AssemblySet,
        reachability: &'a ReachabilityResult,
        config: &'a BuildConfiguration,
        module_name: impl Into<String>,
        entry_point: Option<MethodId>,
    ) -> Self {
        Self { module, assemblies, reachability, config, module_name: module_name.into(), entry_point }
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self, diagnostics)))]
    pub fn generate(&self, diagnostics: &mut Diagnostics) -> CompileResult<GeneratedArtifacts> {
        let header = header::render(self);
        let source = source::render(self, diagnostics)?;
        let entry = self.entry_point.map(|_| entry::render(self));
        let build_file = build_file::render(self);
        Ok(GeneratedArtifacts { header, source, entry, build_file })
    }

    /// The header's own file name, e.g. `App.h` — every other artifact
    /// includes it by this name.
    pub fn header_file_name(&self) -> String {
        format!("{}.h", self.module_name)
    }

    pub fn source_file_name(&self) -> String {
        format!("{}.cpp", self.module_name)
    }

    /// Every compiler-emitted (non-runtime-provided) type, in module
    /// insertion order — `spec.md` §4.5's ordering rule.
    pub(crate) fn emitted_types(&self) -> impl Iterator<Item = &crate::ir::IRType> {
        self.module.types.iter().filter(|t| !t.runtime_provided)
    }

    pub(crate) fn method_def(&self, id: MethodId) -> &crate::model::MethodDef {
        &self.assemblies.get(id.ty.assembly).types[id.ty.type_index].methods[id.method_index]
    }

    pub(crate) fn type_def(&self, id: crate::reachability::TypeId) -> &crate::model::TypeDef {
        &self.assemblies.get(id.assembly).types[id.type_index]
    }

    pub(crate) fn cpp_type(&self, kind: &crate::model::ValueKind, from_assembly: usize) -> String {
        types::cpp_type_name(kind, from_assembly, self.module, self.assemblies, self.reachability)
    }

    pub(crate) fn ir_type(&self, id: crate::reachability::TypeId) -> Option<&crate::ir::IRType> {
        self.module.types.iter().find(|t| t.source == id)
    }
}
