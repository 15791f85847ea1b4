//! The Intrinsic Call Registry (`spec.md` §4.3/§4.5): a fixed table of BCL
//! methods the compiler lowers directly to a runtime helper call instead
//! of compiling their (often unavailable or reflection-heavy) managed
//! body — `Console.WriteLine`, `string` concatenation operators, array
//! bounds-check helpers, and so on.

use fxhash::FxHashMap;

/// Identifies a BCL method by its declaring type's full name and its own
/// name — signature overloads collapse to the same intrinsic, matching
/// how few of these actually need overload-sensitive lowering.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct IntrinsicKey {
    pub type_full_name: String,
    pub method_name: String,
}

/// The runtime entry point an intrinsic lowers to, named the way the C++
/// code generator's emitted call expression needs it.
#[derive(Debug, Clone)]
pub struct IntrinsicTarget {
    pub runtime_function: &'static str,
}

#[derive(Debug, Default)]
pub struct IntrinsicCallRegistry {
    entries: FxHashMap<IntrinsicKey, IntrinsicTarget>,
}

impl IntrinsicCallRegistry {
    pub fn new() -> Self {
        let mut registry = Self::default();
        registry.register_defaults();
        registry
    }

    pub fn register(&mut self, type_full_name: impl Into<String>, method_name: impl Into<String>, runtime_function: &'static str) {
        self.entries.insert(
            IntrinsicKey { type_full_name: type_full_name.into(), method_name: method_name.into() },
            IntrinsicTarget { runtime_function },
        );
    }

    pub fn lookup(&self, type_full_name: &str, method_name: &str) -> Option<&IntrinsicTarget> {
        self.entries.get(&IntrinsicKey { type_full_name: type_full_name.to_string(), method_name: method_name.to_string() })
    }

    fn register_defaults(&mut self) {
        self.register("System.Console", "WriteLine", "ilnc_rt_console_write_line");
        self.register("System.Console", "Write", "ilnc_rt_console_write");
        self.register("System.String", "Concat", "ilnc_rt_string_concat");
        self.register("System.String", "Equals", "ilnc_rt_string_equals");
        self.register("System.Object", "GetType", "ilnc_rt_object_get_type");
        self.register("System.Object", "ToString", "ilnc_rt_object_to_string");
        self.register("System.Array", "get_Length", "ilnc_rt_array_length");
        self.register("System.Threading.Monitor", "Enter", "ilnc_rt_monitor_enter");
        self.register("System.Threading.Monitor", "Exit", "ilnc_rt_monitor_exit");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_default_console_write_line() {
        let registry = IntrinsicCallRegistry::new();
        let target = registry.lookup("System.Console", "WriteLine").unwrap();
        assert_eq!(target.runtime_function, "ilnc_rt_console_write_line");
    }

    #[test]
    fn unregistered_method_is_not_an_intrinsic() {
        let registry = IntrinsicCallRegistry::new();
        assert!(registry.lookup("App.MyType", "DoWork").is_none());
    }

    #[test]
    fn user_registrations_take_priority_when_re_registered() {
        let mut registry = IntrinsicCallRegistry::new();
        registry.register("System.Console", "WriteLine", "custom_write_line");
        assert_eq!(registry.lookup("System.Console", "WriteLine").unwrap().runtime_function, "custom_write_line");
    }
}
