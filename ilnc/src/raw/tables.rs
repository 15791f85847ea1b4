//! The `#~` compressed metadata table stream (ECMA-335 §II.24.2.6): table
//! row schemas, simple row-index and coded-index columns, and the
//! `TableHeap` that owns every table this compiler understands.
//!
//! Tables the compiler has no model for (e.g. `Event`, `Property`,
//! `ClassLayout`) are legal in a well-formed assembly but are not read here;
//! an assembly whose `valid` bitmask names one is rejected with
//! [`crate::errors::CompileError::Metadata`] rather than silently skipped,
//! since skipping would require knowing a schema we don't implement.

use std::io::{Cursor, Error, ErrorKind};
use std::marker::PhantomData;

use ilnc_macros::{FromRepr, Table};

use crate::raw::heaps::{BlobIndex, GuidIndex, StringIndex};
use crate::utilities::{enumerate_set_bits, FromByteStream};

/// One bit position per table kind in the `#~` stream's `valid` bitmask,
/// matching the table's ECMA-335 table number.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, FromRepr)]
pub enum TableKind {
    Module = 0x00,
    TypeRef = 0x01,
    TypeDef = 0x02,
    Field = 0x04,
    MethodDef = 0x06,
    Param = 0x08,
    InterfaceImpl = 0x09,
    MemberRef = 0x0A,
    Constant = 0x0B,
    CustomAttribute = 0x0C,
    StandAloneSig = 0x11,
    ClassLayout = 0x0F,
    FieldLayout = 0x10,
    EventMap = 0x12,
    Event = 0x14,
    PropertyMap = 0x15,
    Property = 0x17,
    MethodSemantics = 0x18,
    MethodImpl = 0x19,
    ModuleRef = 0x1A,
    TypeSpec = 0x1B,
    FieldMarshal = 0x0D,
    DeclSecurity = 0x0E,
    ImplMap = 0x1C,
    FieldRva = 0x1D,
    Assembly = 0x20,
    AssemblyRef = 0x23,
    File = 0x26,
    ExportedType = 0x27,
    ManifestResource = 0x28,
    NestedClass = 0x29,
    GenericParam = 0x2A,
    MethodSpec = 0x2B,
    GenericParamConstraint = 0x2C,
}

/// Tables this compiler builds a structured model for. Anything else
/// present in the stream's `valid` bitmask is rejected in [`TableHeap::read`].
const SUPPORTED: &[TableKind] = &[
    TableKind::Module,
    TableKind::TypeRef,
    TableKind::TypeDef,
    TableKind::Field,
    TableKind::MethodDef,
    TableKind::Param,
    TableKind::InterfaceImpl,
    TableKind::MemberRef,
    TableKind::Constant,
    TableKind::CustomAttribute,
    TableKind::StandAloneSig,
    TableKind::ModuleRef,
    TableKind::TypeSpec,
    TableKind::Assembly,
    TableKind::AssemblyRef,
    TableKind::NestedClass,
    TableKind::GenericParam,
    TableKind::MethodSpec,
    TableKind::GenericParamConstraint,
];

/// Heap- and table-size-dependent column widths, computed once from the
/// `#~` stream header before any row is read (ECMA-335 §II.24.2.6).
pub struct IndexSizes {
    pub string: bool,
    pub guid: bool,
    pub blob: bool,
    /// Row count per table, indexed by [`TableKind`] discriminant; 0 for
    /// tables absent from this assembly.
    rows: [u32; 64],
}

impl IndexSizes {
    fn table_rows(&self, kinds: &[TableKind]) -> u32 {
        kinds.iter().map(|k| self.rows[*k as usize]).max().unwrap_or(0)
    }

    /// Whether a coded index spanning `kinds` (occupying `tag_bits` low
    /// bits for the table tag) needs the wide, 4-byte encoding.
    fn coded_is_wide(&self, kinds: &[TableKind], tag_bits: u32) -> bool {
        self.table_rows(kinds) >= (1u32 << (16 - tag_bits))
    }

    fn simple_is_wide(&self, kind: TableKind) -> bool {
        self.rows[kind as usize] >= (1 << 16)
    }
}

/// A non-coded reference to a row in table `T` (e.g. `TypeDef::field_list`).
/// `T` only selects which table's row count decides the column width; the
/// value stored is always the raw 1-based row index.
pub struct RowIndex<T> {
    pub index: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> RowIndex<T> {
    pub fn get(&self) -> usize {
        self.index as usize
    }
}

impl<T> Copy for RowIndex<T> {}
impl<T> Clone for RowIndex<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> std::fmt::Debug for RowIndex<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RowIndex({})", self.index)
    }
}

macro_rules! define_row_index {
    ($($marker: ident => $kind: expr),* $(,)?) => {$(
        #[derive(Debug, Copy, Clone)]
        pub struct $marker;
        impl FromByteStream for RowIndex<$marker> {
            type Deps = IndexSizes;
            fn read(stream: &mut Cursor<&[u8]>, sizes: &IndexSizes) -> std::io::Result<Self> {
                let index = if sizes.simple_is_wide($kind) { u32::read(stream, &())? } else { u16::read(stream, &())? as u32 };
                Ok(RowIndex { index, _marker: PhantomData })
            }
        }
    )*};
}

define_row_index! {
    FieldMarker => TableKind::Field,
    MethodDefMarker => TableKind::MethodDef,
    ParamMarker => TableKind::Param,
    GenericParamMarker => TableKind::GenericParam,
}

/// A tagged reference into one of several possible tables (ECMA-335
/// §II.24.2.6 "coded indices"). `tag()` names which table; `row()` is the
/// 1-based index within it.
#[derive(Debug, Copy, Clone)]
pub struct CodedIndex<Tag> {
    raw: u32,
    tag_bits: u32,
    _marker: PhantomData<fn() -> Tag>,
}

impl<Tag> CodedIndex<Tag> {
    pub fn row(&self) -> usize {
        (self.raw >> self.tag_bits) as usize
    }

    pub fn tag_value(&self) -> u32 {
        self.raw & ((1 << self.tag_bits) - 1)
    }

    /// Builds a coded index from an already-decoded `(tag | row << bits)`
    /// value. Used by the blob-signature reader, which encodes coded
    /// indices as a single ECMA-335 compressed integer (§II.23.2.8) rather
    /// than the fixed 2-or-4-byte table-row column width `read` computes.
    pub(crate) fn from_raw(raw: u32, tag_bits: u32) -> Self {
        CodedIndex { raw, tag_bits, _marker: PhantomData }
    }
}

macro_rules! define_coded_index {
    ($($name: ident { bits: $bits: literal, tables: [$($kind: expr),* $(,)?] }),* $(,)?) => {$(
        #[derive(Debug, Copy, Clone)]
        pub struct $name;

        impl FromByteStream for CodedIndex<$name> {
            type Deps = IndexSizes;
            fn read(stream: &mut Cursor<&[u8]>, sizes: &IndexSizes) -> std::io::Result<Self> {
                const KINDS: &[TableKind] = &[$($kind),*];
                let wide = sizes.coded_is_wide(KINDS, $bits);
                let raw = if wide { u32::read(stream, &())? } else { u16::read(stream, &())? as u32 };
                Ok(CodedIndex { raw, tag_bits: $bits, _marker: PhantomData })
            }
        }

        impl CodedIndex<$name> {
            /// The tables this coded index kind can tag into, in tag order
            /// (tag 0 names `TABLES[0]`, and so on).
            pub const TABLES: &'static [TableKind] = &[$($kind),*];

            pub fn table(&self) -> Option<TableKind> {
                Self::TABLES.get(self.tag_value() as usize).copied()
            }
        }
    )*};
}

define_coded_index! {
    TypeDefOrRef { bits: 2, tables: [TableKind::TypeDef, TableKind::TypeRef, TableKind::TypeSpec] },
    ResolutionScope { bits: 2, tables: [TableKind::Module, TableKind::ModuleRef, TableKind::AssemblyRef, TableKind::TypeRef] },
    MemberRefParent { bits: 3, tables: [TableKind::TypeDef, TableKind::TypeRef, TableKind::ModuleRef, TableKind::MethodDef, TableKind::TypeSpec] },
    HasConstant { bits: 2, tables: [TableKind::Field, TableKind::Param, TableKind::Property] },
    HasCustomAttribute { bits: 5, tables: [
        TableKind::MethodDef, TableKind::Field, TableKind::TypeRef, TableKind::TypeDef, TableKind::Param,
        TableKind::InterfaceImpl, TableKind::MemberRef, TableKind::Module, TableKind::DeclSecurity,
        TableKind::Property, TableKind::Event, TableKind::StandAloneSig, TableKind::ModuleRef, TableKind::TypeSpec,
        TableKind::Assembly, TableKind::AssemblyRef, TableKind::File, TableKind::ExportedType,
        TableKind::ManifestResource, TableKind::GenericParam, TableKind::GenericParamConstraint, TableKind::MethodSpec,
    ] },
    CustomAttributeType { bits: 3, tables: [TableKind::Module, TableKind::Module, TableKind::MethodDef, TableKind::MemberRef, TableKind::Module] },
    TypeOrMethodDef { bits: 1, tables: [TableKind::TypeDef, TableKind::MethodDef] },
}

pub use CodedIndex as Coded;

#[derive(Debug, Clone, Table)]
pub struct ModuleRow {
    pub generation: u16,
    pub name: StringIndex,
    pub mvid: GuidIndex,
    pub enc_id: GuidIndex,
    pub enc_base_id: GuidIndex,
}

#[derive(Debug, Clone, Table)]
pub struct TypeRefRow {
    pub resolution_scope: Coded<ResolutionScope>,
    pub type_name: StringIndex,
    pub type_namespace: StringIndex,
}

#[derive(Debug, Clone, Table)]
pub struct TypeDefRow {
    pub flags: u32,
    pub type_name: StringIndex,
    pub type_namespace: StringIndex,
    pub extends: Coded<TypeDefOrRef>,
    pub field_list: RowIndex<FieldMarker>,
    pub method_list: RowIndex<MethodDefMarker>,
}

#[derive(Debug, Clone, Table)]
pub struct FieldRow {
    pub flags: u16,
    pub name: StringIndex,
    pub signature: BlobIndex,
}

#[derive(Debug, Clone, Table)]
pub struct MethodDefRow {
    pub rva: u32,
    pub impl_flags: u16,
    pub flags: u16,
    pub name: StringIndex,
    pub signature: BlobIndex,
    pub param_list: RowIndex<ParamMarker>,
}

#[derive(Debug, Clone, Table)]
pub struct ParamRow {
    pub flags: u16,
    pub sequence: u16,
    pub name: StringIndex,
}

#[derive(Debug, Clone, Table)]
pub struct InterfaceImplRow {
    pub class: RowIndex<TypeDefMarkerDummy>,
    pub interface: Coded<TypeDefOrRef>,
}

// `InterfaceImpl::class` is a simple index into TypeDef, which has no other
// simple-index readers; give it its own marker rather than widening the
// `define_row_index!` call above for a single field.
define_row_index! { TypeDefMarkerDummy => TableKind::TypeDef }

#[derive(Debug, Clone, Table)]
pub struct MemberRefRow {
    pub class: Coded<MemberRefParent>,
    pub name: StringIndex,
    pub signature: BlobIndex,
}

#[derive(Debug, Clone, Table)]
pub struct ConstantRow {
    pub ty: u8,
    pub padding: u8,
    pub parent: Coded<HasConstant>,
    pub value: BlobIndex,
}

#[derive(Debug, Clone, Table)]
pub struct CustomAttributeRow {
    pub parent: Coded<HasCustomAttribute>,
    pub ctor: Coded<CustomAttributeType>,
    pub value: BlobIndex,
}

#[derive(Debug, Clone, Table)]
pub struct StandAloneSigRow {
    pub signature: BlobIndex,
}

#[derive(Debug, Clone, Table)]
pub struct ModuleRefRow {
    pub name: StringIndex,
}

#[derive(Debug, Clone, Table)]
pub struct TypeSpecRow {
    pub signature: BlobIndex,
}

#[derive(Debug, Clone, Table)]
pub struct AssemblyRow {
    pub hash_alg_id: u32,
    pub major_version: u16,
    pub minor_version: u16,
    pub build_number: u16,
    pub revision_number: u16,
    pub flags: u32,
    pub public_key: BlobIndex,
    pub name: StringIndex,
    pub culture: StringIndex,
}

#[derive(Debug, Clone, Table)]
pub struct AssemblyRefRow {
    pub major_version: u16,
    pub minor_version: u16,
    pub build_number: u16,
    pub revision_number: u16,
    pub flags: u32,
    pub public_key_or_token: BlobIndex,
    pub name: StringIndex,
    pub culture: StringIndex,
    pub hash_value: BlobIndex,
}

#[derive(Debug, Clone, Table)]
pub struct NestedClassRow {
    pub nested_class: RowIndex<TypeDefMarkerDummy>,
    pub enclosing_class: RowIndex<TypeDefMarkerDummy>,
}

#[derive(Debug, Clone, Table)]
pub struct GenericParamRow {
    pub number: u16,
    pub flags: u16,
    pub owner: Coded<TypeOrMethodDef>,
    pub name: StringIndex,
}

#[derive(Debug, Clone, Table)]
pub struct MethodSpecRow {
    pub method: Coded<MemberRefParent>,
    pub instantiation: BlobIndex,
}

#[derive(Debug, Clone, Table)]
pub struct GenericParamConstraintRow {
    pub owner: RowIndex<GenericParamMarker>,
    pub constraint: Coded<TypeDefOrRef>,
}

/// Every table this compiler reads out of the `#~` stream, in file order.
#[derive(Debug, Clone, Default)]
pub struct TableHeap {
    pub module: Option<ModuleTable>,
    pub type_ref: Option<TypeRefTable>,
    pub type_def: Option<TypeDefTable>,
    pub field: Option<FieldTable>,
    pub method_def: Option<MethodDefTable>,
    pub param: Option<ParamTable>,
    pub interface_impl: Option<InterfaceImplTable>,
    pub member_ref: Option<MemberRefTable>,
    pub constant: Option<ConstantTable>,
    pub custom_attribute: Option<CustomAttributeTable>,
    pub stand_alone_sig: Option<StandAloneSigTable>,
    pub module_ref: Option<ModuleRefTable>,
    pub type_spec: Option<TypeSpecTable>,
    pub assembly: Option<AssemblyTable>,
    pub assembly_ref: Option<AssemblyRefTable>,
    pub nested_class: Option<NestedClassTable>,
    pub generic_param: Option<GenericParamTable>,
    pub method_spec: Option<MethodSpecTable>,
    pub generic_param_constraint: Option<GenericParamConstraintTable>,
}

impl TableHeap {
    /// Reads the `#~` stream: a 24-byte header (ECMA-335 §II.24.2.6) giving
    /// heap-index widths and the `valid`/`sorted` bitmasks, an array of row
    /// counts (one `u32` per set bit of `valid`), and then the rows
    /// themselves in table-number order.
    pub fn read(stream: &mut Cursor<&[u8]>) -> std::io::Result<Self> {
        let _reserved0 = u32::read(stream, &())?;
        let _major_version = u8::read(stream, &())?;
        let _minor_version = u8::read(stream, &())?;
        let heap_sizes = u8::read(stream, &())?;
        let _reserved1 = u8::read(stream, &())?;
        let valid = u64::read(stream, &())?;
        let _sorted = u64::read(stream, &())?;

        let mut rows = [0u32; 64];
        for bit in enumerate_set_bits(valid) {
            rows[bit] = u32::read(stream, &())?;
        }

        let sizes = IndexSizes {
            string: heap_sizes & 0x1 != 0,
            guid: heap_sizes & 0x2 != 0,
            blob: heap_sizes & 0x4 != 0,
            rows,
        };

        for bit in enumerate_set_bits(valid) {
            let kind = TableKind::from_repr(bit as u8)
                .ok_or_else(|| Error::from(ErrorKind::InvalidData))?;
            if !SUPPORTED.contains(&kind) {
                return Err(Error::new(ErrorKind::InvalidData, format!("unsupported metadata table {kind:?}")));
            }
        }

        macro_rules! read_table {
            ($field: ident, $table: ident, $kind: expr) => {
                if rows[$kind as usize] > 0 { Some($table::read(stream, &sizes, rows[$kind as usize] as usize)?) } else { None }
            };
        }

        Ok(Self {
            module: read_table!(module, ModuleTable, TableKind::Module),
            type_ref: read_table!(type_ref, TypeRefTable, TableKind::TypeRef),
            type_def: read_table!(type_def, TypeDefTable, TableKind::TypeDef),
            field: read_table!(field, FieldTable, TableKind::Field),
            method_def: read_table!(method_def, MethodDefTable, TableKind::MethodDef),
            param: read_table!(param, ParamTable, TableKind::Param),
            interface_impl: read_table!(interface_impl, InterfaceImplTable, TableKind::InterfaceImpl),
            member_ref: read_table!(member_ref, MemberRefTable, TableKind::MemberRef),
            constant: read_table!(constant, ConstantTable, TableKind::Constant),
            custom_attribute: read_table!(custom_attribute, CustomAttributeTable, TableKind::CustomAttribute),
            stand_alone_sig: read_table!(stand_alone_sig, StandAloneSigTable, TableKind::StandAloneSig),
            module_ref: read_table!(module_ref, ModuleRefTable, TableKind::ModuleRef),
            type_spec: read_table!(type_spec, TypeSpecTable, TableKind::TypeSpec),
            assembly: read_table!(assembly, AssemblyTable, TableKind::Assembly),
            assembly_ref: read_table!(assembly_ref, AssemblyRefTable, TableKind::AssemblyRef),
            nested_class: read_table!(nested_class, NestedClassTable, TableKind::NestedClass),
            generic_param: read_table!(generic_param, GenericParamTable, TableKind::GenericParam),
            method_spec: read_table!(method_spec, MethodSpecTable, TableKind::MethodSpec),
            generic_param_constraint: read_table!(generic_param_constraint, GenericParamConstraintTable, TableKind::GenericParamConstraint),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_kind_round_trips_known_discriminant() {
        assert_eq!(TableKind::from_repr(0x02), Some(TableKind::TypeDef));
        assert_eq!(TableKind::from_repr(0xFF), None);
    }

    #[test]
    fn coded_index_widens_past_16_bits_of_headroom() {
        let mut rows = [0u32; 64];
        rows[TableKind::TypeDef as usize] = 1 << 15;
        let sizes = IndexSizes { string: false, guid: false, blob: false, rows };
        assert!(!sizes.coded_is_wide(CodedIndex::<TypeDefOrRef>::TABLES, 2));
        rows[TableKind::TypeDef as usize] = 1 << 15;
        let sizes = IndexSizes { string: false, guid: false, blob: false, rows: [1 << 15; 64] };
        assert!(sizes.coded_is_wide(CodedIndex::<TypeDefOrRef>::TABLES, 2));
    }
}
