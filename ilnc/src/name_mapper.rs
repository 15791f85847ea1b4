//! The Name Mapper (`spec.md` §4.4): an injective function from metadata
//! names (types, methods, fields — all of which allow characters C++
//! identifiers don't, and can collide after sanitization) to distinct C++
//! identifiers.

use fxhash::FxHashMap;

/// Tracks every identifier minted so far so a colliding mangled name gets
/// a numeric suffix instead of silently aliasing a previous symbol —
/// that's the injectivity invariant `spec.md` §4.4 requires.
#[derive(Debug, Default)]
pub struct NameMapper {
    minted: FxHashMap<String, u32>,
    value_types: FxHashMap<String, ()>,
}

impl NameMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a type as value-type, so callers that generate per-kind
    /// naming conventions (e.g. a `_t` suffix for structs) can look the
    /// classification back up after the fact.
    pub fn register_value_type(&mut self, mangled_name: &str) {
        self.value_types.insert(mangled_name.to_string(), ());
    }

    pub fn is_value_type(&self, mangled_name: &str) -> bool {
        self.value_types.contains_key(mangled_name)
    }

    /// Only meaningful between independent compiles in the same process
    /// (e.g. test scenarios) — a production run never needs it, since the
    /// mapper outlives one `Compiler::compile` call.
    pub fn clear_value_types(&mut self) {
        self.value_types.clear();
    }

    /// Sanitizes `raw` into a legal C++ identifier and de-duplicates it
    /// against every name minted so far in this compile.
    pub fn mangle(&mut self, raw: &str) -> String {
        let sanitized = sanitize(raw);
        let candidate = if sanitized.is_empty() { "_".to_string() } else { sanitized };
        match self.minted.get_mut(&candidate) {
            None => {
                self.minted.insert(candidate.clone(), 0);
                candidate
            }
            Some(count) => {
                *count += 1;
                format!("{candidate}_{count}")
            }
        }
    }

    /// Builds a fully-qualified C++ identifier for a type from its
    /// namespace and name, e.g. `System.Collections.Generic.List\`1` →
    /// `System_Collections_Generic_List_1`.
    pub fn mangle_type(&mut self, namespace: &str, name: &str) -> String {
        let joined = if namespace.is_empty() { name.to_string() } else { format!("{namespace}.{name}") };
        self.mangle(&joined)
    }

    pub fn mangle_member(&mut self, owner_mangled: &str, member: &str) -> String {
        self.mangle(&format!("{owner_mangled}__{member}"))
    }
}

fn sanitize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for (i, ch) in raw.chars().enumerate() {
        let keep = if i == 0 { ch.is_ascii_alphabetic() || ch == '_' } else { ch.is_ascii_alphanumeric() || ch == '_' };
        if keep {
            out.push(ch);
        } else {
            out.push('_');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_generic_backtick_names() {
        let mut mapper = NameMapper::new();
        assert_eq!(mapper.mangle("List`1"), "List_1");
    }

    #[test]
    fn disambiguates_collisions_injectively() {
        let mut mapper = NameMapper::new();
        let first = mapper.mangle("A.B");
        let second = mapper.mangle("A_B");
        assert_ne!(first, second);
    }

    #[test]
    fn leading_digit_is_replaced() {
        let mut mapper = NameMapper::new();
        assert_eq!(mapper.mangle("3D"), "_D");
    }
}
