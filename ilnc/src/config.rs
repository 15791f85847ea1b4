//! External configuration surfaces (`spec.md` §6): the build configuration
//! passed in by the caller, the host runtime directory probe, and the
//! optional per-library dependency manifest.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::errors::{CompileError, CompileResult};

/// Caller-supplied knobs (`spec.md` §6). `debug` controls whether the C++
/// code generator emits `#line` directives and keeps local variable names;
/// `read_debug_symbols` controls whether sequence points are read from a
/// companion symbol file at all (§4.1's "missing symbols is never fatal"
/// rule governs what happens when this is `true` but no symbols exist).
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildConfiguration {
    pub read_debug_symbols: bool,
    pub debug: bool,
}

/// Resolves the on-disk layout of an installed managed runtime
/// (`shared/<runtime-id>/<version>/`), the same probe a real AOT compiler
/// runs to find the core library assemblies that back `spec.md`'s
/// classification of BCL vs. user assemblies.
#[derive(Debug, Clone)]
pub struct RuntimeDirectory {
    root: PathBuf,
}

impl RuntimeDirectory {
    pub fn probe(install_root: &Path, runtime_id: &str) -> CompileResult<Self> {
        let shared = install_root.join("shared").join(runtime_id);
        let version_dir = std::fs::read_dir(&shared)
            .map_err(|_| CompileError::Resolution {
                reference: runtime_id.to_string(),
                searched: vec![shared.display().to_string()],
            })?
            .filter_map(Result::ok)
            .filter(|entry| entry.path().is_dir())
            .max_by_key(|entry| entry.file_name())
            .ok_or_else(|| CompileError::Resolution { reference: runtime_id.to_string(), searched: vec![shared.display().to_string()] })?;

        Ok(Self { root: version_dir.path() })
    }

    pub fn assembly_search_path(&self) -> &Path {
        &self.root
    }
}

/// Per-library JSON manifest describing the assemblies a project depends
/// on, read alongside a project's root assembly when present (`spec.md`
/// §6). Absence of the file is not an error — it only narrows the
/// resolver's search list.
#[derive(Debug, Clone, Deserialize)]
pub struct DependencyManifest {
    #[serde(default)]
    pub dependencies: Vec<DependencyEntry>,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    Project,
    Package,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DependencyEntry {
    pub name: String,
    pub version: String,
    #[serde(rename = "type")]
    pub kind: DependencyKind,
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// `spec.md` §6: only the first target-framework entry of a real
    /// manifest is honored, flattened down to this field by the time it
    /// reaches us; a dependency with none is skipped entirely.
    #[serde(default)]
    pub runtime_dll_paths: Vec<PathBuf>,
}

impl DependencyManifest {
    pub fn read(path: &Path) -> CompileResult<Option<Self>> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                let manifest = serde_json::from_str(&contents)
                    .map_err(|err| CompileError::Metadata { assembly: path.display().to_string(), detail: err.to_string() })?;
                Ok(Some(manifest))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// The distinct directories every dependency's `runtime_dll_paths`
    /// live in — what the resolver adds to its search path list, in
    /// manifest order (`spec.md` §6's "libraries with no runtime DLLs are
    /// skipped" rule falls out of `runtime_dll_paths` simply being empty).
    pub fn runtime_dll_directories(&self) -> Vec<PathBuf> {
        let mut seen = std::collections::HashSet::new();
        self.dependencies
            .iter()
            .flat_map(|dep| &dep.runtime_dll_paths)
            .filter_map(|dll| dll.parent().map(Path::to_path_buf))
            .filter(|dir| seen.insert(dir.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_manifest_is_not_an_error() {
        let result = DependencyManifest::read(Path::new("/nonexistent/deps.json"));
        assert!(matches!(result, Ok(None)));
    }

    #[test]
    fn parses_dependency_entries() {
        let json = r#"{"dependencies":[{"name":"System.Collections","version":"8.0.0","type":"package"}]}"#;
        let manifest: DependencyManifest = serde_json::from_str(json).unwrap();
        assert_eq!(manifest.dependencies.len(), 1);
        assert_eq!(manifest.dependencies[0].name, "System.Collections");
        assert_eq!(manifest.dependencies[0].kind, DependencyKind::Package);
    }

    #[test]
    fn collects_runtime_dll_directories_skipping_dll_less_dependencies() {
        let json = r#"{"dependencies":[
            {"name":"A","version":"1.0.0","type":"package","runtime_dll_paths":["/libs/a/A.dll"]},
            {"name":"B","version":"1.0.0","type":"project"}
        ]}"#;
        let manifest: DependencyManifest = serde_json::from_str(json).unwrap();
        assert_eq!(manifest.runtime_dll_directories(), vec![PathBuf::from("/libs/a")]);
    }
}
