use crate::model::TypeHandle;

/// A field/parameter/local's type, resolved enough for the code generator
/// to pick a C++ representation without re-reading `raw::` tables — mirrors
/// [`crate::raw::signature::TypeSignature`] but replaces every
/// `TypeDefOrRef` coded index with the [`TypeHandle`] it names (resolved
/// once, at load time, same as every other heap/table lookup in
/// [`crate::model::loader`]).
#[derive(Debug, Clone)]
pub enum ValueKind {
    Void,
    Boolean,
    Char,
    I1,
    U1,
    I2,
    U2,
    I4,
    U4,
    I8,
    U8,
    R4,
    R8,
    String,
    Object,
    IntPtr,
    UIntPtr,
    Ptr(Box<ValueKind>),
    ByRef(Box<ValueKind>),
    Class { handle: TypeHandle, is_value_type: bool },
    SzArray(Box<ValueKind>),
    /// A generic type variable, function pointer, or multi-dimensional
    /// array — the generator erases these to an opaque runtime object
    /// reference rather than modelling them structurally.
    Generic,
}
