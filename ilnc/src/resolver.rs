//! The Assembly Resolver (`spec.md` §4.1): turns an [`AssemblyName`]
//! reference into loaded bytes, searching the directories a real AOT
//! compiler would — the root assembly's own directory, the probed
//! [`RuntimeDirectory`], and any paths named in a [`DependencyManifest`].

use std::path::{Path, PathBuf};

use crate::config::RuntimeDirectory;
use crate::errors::{CompileError, CompileResult};
use crate::model::AssemblyName;

/// Abstracts assembly lookup so the reachability analyzer's cross-assembly
/// walk (`spec.md` §4.2) doesn't need to know whether an assembly came from
/// disk, an in-memory cache, or (in tests) a hand-built `model::Assembly`.
pub trait AssemblyResolver {
    fn resolve(&self, reference: &AssemblyName) -> CompileResult<Vec<u8>>;
}

/// Searches, in order: the root assembly's directory, each configured
/// dependency path, then the runtime directory — mirroring a real loader's
/// probing path search (`spec.md` §4.1's "search in a defined order, first
/// match wins" rule).
pub struct DefaultAssemblyResolver {
    search_paths: Vec<PathBuf>,
}

impl DefaultAssemblyResolver {
    pub fn new(root_assembly_directory: &Path, runtime: Option<&RuntimeDirectory>, extra_paths: Vec<PathBuf>) -> Self {
        let mut search_paths = vec![root_assembly_directory.to_path_buf()];
        search_paths.extend(extra_paths);
        if let Some(runtime) = runtime {
            search_paths.push(runtime.assembly_search_path().to_path_buf());
        }
        Self { search_paths }
    }
}

impl AssemblyResolver for DefaultAssemblyResolver {
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self)))]
    fn resolve(&self, reference: &AssemblyName) -> CompileResult<Vec<u8>> {
        for dir in &self.search_paths {
            let candidate = dir.join(format!("{}.dll", reference.name));
            if let Ok(bytes) = std::fs::read(&candidate) {
                #[cfg(feature = "tracing")]
                tracing::debug!(assembly = %reference.name, path = %candidate.display(), "resolved assembly");
                return Ok(bytes);
            }
        }
        Err(CompileError::Resolution {
            reference: reference.name.clone(),
            searched: self.search_paths.iter().map(|p| p.display().to_string()).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct InMemoryResolver(std::collections::HashMap<String, Vec<u8>>);

    impl AssemblyResolver for InMemoryResolver {
        fn resolve(&self, reference: &AssemblyName) -> CompileResult<Vec<u8>> {
            self.0.get(&reference.name).cloned().ok_or_else(|| CompileError::Resolution {
                reference: reference.name.clone(),
                searched: vec!["<in-memory>".into()],
            })
        }
    }

    #[test]
    fn resolves_known_reference() {
        let mut map = std::collections::HashMap::new();
        map.insert("System.Private.CoreLib".to_string(), vec![1, 2, 3]);
        let resolver = InMemoryResolver(map);
        let bytes = resolver.resolve(&AssemblyName::simple("System.Private.CoreLib")).unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
    }

    #[test]
    fn reports_every_searched_location_on_miss() {
        let resolver = DefaultAssemblyResolver::new(Path::new("/nonexistent"), None, vec![]);
        let err = resolver.resolve(&AssemblyName::simple("Missing")).unwrap_err();
        assert!(matches!(err, CompileError::Resolution { .. }));
    }
}
