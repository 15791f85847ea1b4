//! The fixed set of BCL types the companion runtime hand-writes (`spec.md`
//! §3/§4.5): `System.Object`, `System.String`, array types, `Task`, and so
//! on. The code generator emits no struct, no type-info constant, and no
//! method bodies for these — the runtime already defines them. Everything
//! else reachable, BCL or user, gets a compiler-emitted struct.

/// Full metadata names of hand-written runtime types. Array types are
/// matched structurally (`full_name` ending in `[]`) rather than listed
/// here, since there are infinitely many element-type instantiations.
const HAND_WRITTEN: &[&str] = &[
    "System.Object",
    "System.String",
    "System.ValueType",
    "System.Enum",
    "System.Array",
    "System.Exception",
    "System.Boolean",
    "System.Char",
    "System.SByte",
    "System.Byte",
    "System.Int16",
    "System.UInt16",
    "System.Int32",
    "System.UInt32",
    "System.Int64",
    "System.UInt64",
    "System.Single",
    "System.Double",
    "System.IntPtr",
    "System.UIntPtr",
    "System.Delegate",
    "System.MulticastDelegate",
    "System.Threading.Tasks.Task",
];

pub fn is_runtime_provided(full_name: &str) -> bool {
    HAND_WRITTEN.contains(&full_name) || full_name.ends_with("[]")
}

/// The C++ spelling of a hand-written runtime type, for a metadata type
/// reference the code generator can't resolve to a module-local `IRType`
/// (either because it's one of [`HAND_WRITTEN`], or simply unreachable and
/// therefore erased to the closest runtime surface it still satisfies).
pub fn cpp_name(full_name: &str) -> &'static str {
    if full_name.ends_with("[]") {
        return "ilnc_rt::Array*";
    }
    match full_name {
        "System.String" => "ilnc_rt::String*",
        "System.Exception" => "ilnc_rt::Exception*",
        "System.Delegate" | "System.MulticastDelegate" => "ilnc_rt::Delegate*",
        "System.Threading.Tasks.Task" => "ilnc_rt::Task*",
        _ => "ilnc_rt::Object*",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_hand_written_object() {
        assert!(is_runtime_provided("System.Object"));
    }

    #[test]
    fn recognizes_array_types_structurally() {
        assert!(is_runtime_provided("System.Int32[]"));
    }

    #[test]
    fn user_type_is_not_runtime_provided() {
        assert!(!is_runtime_provided("App.Calculator"));
    }
}
