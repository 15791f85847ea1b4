use crate::model::{FieldAttributes, ValueKind};
use crate::raw::signature::TypeSignature;

#[derive(Debug, Clone)]
pub struct FieldDef {
    /// The field's own 1-based row index in its assembly's `Field` table —
    /// lets a `Ldfld`/`Stfld` operand's `MetadataToken` resolve back to this
    /// field without re-reading `raw::` tables.
    pub token: u32,
    pub name: String,
    pub flags: FieldAttributes,
    pub signature: TypeSignature,
    /// The field's type, with every `TypeDefOrRef` coded index already
    /// resolved to a [`crate::model::TypeHandle`] — what the code generator
    /// actually picks a C++ representation from.
    pub value_kind: ValueKind,
    /// Present for `const` fields (`FieldAttributes::LITERAL`); the raw
    /// blob from the `Constant` table row, already type-tagged.
    pub constant: Option<ConstantValue>,
}

#[derive(Debug, Clone)]
pub enum ConstantValue {
    I32(i32),
    I64(i64),
    R4(f32),
    R8(f64),
    Bool(bool),
    Char(u16),
    String(String),
    Null,
}
