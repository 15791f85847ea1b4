//! Builds a [`Assembly`] out of the `raw::` metadata tables and heaps —
//! the one place coded indices, string/blob heap lookups and row-range
//! ownership (`TypeDef::field_list`..next `TypeDef::field_list`, and so
//! on) are all resolved, so every later stage works with plain strings and
//! owned vectors.

use std::io::Cursor;

use crate::config::BuildConfiguration;
use crate::errors::{CompileError, CompileResult};
use crate::model::field::ConstantValue;
use crate::model::method::{ExceptionHandler, ExceptionHandlerKindTag, MethodBody as ModelMethodBody, SequencePoint};
use crate::model::{Assembly, AssemblyKind, AssemblyName, FieldAttributes, FieldDef, MethodAttributes, MethodDef, TypeAttributes, TypeDef, TypeHandle, ValueKind};
use crate::raw::heaps::{BlobIndex, MetadataHeaps, StringIndex, UserStringIndex};
use crate::raw::il::MethodBody as RawMethodBody;
use crate::raw::pe;
use crate::raw::signature::{LocalVariableSignature, MethodSignature, TypeSignature};
use crate::raw::tables::{AssemblyRefRow, TableKind, TypeDefRow, TypeRefRow};

pub fn load_assembly(file: &[u8], kind: AssemblyKind, config: &BuildConfiguration) -> CompileResult<Assembly> {
    let parsed = pe::Assembly::read(file).map_err(|err| CompileError::Metadata { assembly: "<unnamed>".into(), detail: err.to_string() })?;
    let heaps = &parsed.metadata.heaps;
    let tables = &parsed.metadata.tables;
    let rvas = RvaResolver { assembly: &parsed, file };

    let assembly_row = tables
        .assembly
        .as_ref()
        .and_then(|t| t.get(1))
        .ok_or_else(|| CompileError::Metadata { assembly: "<unnamed>".into(), detail: "missing Assembly table row".into() })?;
    let assembly_name = assembly_name_from_row(heaps, assembly_row)?;

    let references = tables
        .assembly_ref
        .as_ref()
        .map(|t| t.rows().iter().map(|row| assembly_ref_name(heaps, row)).collect::<CompileResult<Vec<_>>>())
        .transpose()?
        .unwrap_or_default();

    let type_def_table = tables.type_def.as_ref();
    let row_count = type_def_table.map(|t| t.len()).unwrap_or(0);

    let mut types = Vec::with_capacity(row_count);
    for i in 0..row_count {
        let row = type_def_table.unwrap().get(i + 1).expect("row index in range");
        types.push(load_type_def(heaps, tables, row, i, type_def_table.unwrap(), config, &rvas)?);
    }

    let entry_point = parsed
        .cli_header
        .entry_point_token
        .filter(|t| t.kind() == crate::metadata_token::MetadataTokenKind::MethodDef)
        .map(|t| t.index());

    Ok(Assembly { name: assembly_name, kind, references, types, entry_point })
}

fn assembly_name_from_row(heaps: &MetadataHeaps, row: &crate::raw::tables::AssemblyRow) -> CompileResult<AssemblyName> {
    Ok(AssemblyName {
        name: heap_string(heaps, row.name)?,
        version: (row.major_version, row.minor_version, row.build_number, row.revision_number),
        culture: optional_string(heaps, row.culture)?,
        public_key_token: non_empty_blob(heaps, row.public_key)?,
    })
}

fn assembly_ref_name(heaps: &MetadataHeaps, row: &AssemblyRefRow) -> CompileResult<AssemblyName> {
    Ok(AssemblyName {
        name: heap_string(heaps, row.name)?,
        version: (row.major_version, row.minor_version, row.build_number, row.revision_number),
        culture: optional_string(heaps, row.culture)?,
        public_key_token: non_empty_blob(heaps, row.public_key_or_token)?,
    })
}

fn heap_string(heaps: &MetadataHeaps, index: StringIndex) -> CompileResult<String> {
    Ok(heaps.string(index).map_err(|err| CompileError::Metadata { assembly: "<unnamed>".into(), detail: err.to_string() })?.to_string())
}

fn optional_string(heaps: &MetadataHeaps, index: StringIndex) -> CompileResult<Option<String>> {
    let s = heap_string(heaps, index)?;
    Ok(if s.is_empty() { None } else { Some(s) })
}

fn non_empty_blob(heaps: &MetadataHeaps, index: BlobIndex) -> CompileResult<Option<Vec<u8>>> {
    let bytes = heaps.blob(index).map_err(|err| CompileError::Metadata { assembly: "<unnamed>".into(), detail: err.to_string() })?;
    Ok(if bytes.is_empty() { None } else { Some(bytes.to_vec()) })
}

fn load_type_def(
    heaps: &MetadataHeaps,
    tables: &crate::raw::tables::TableHeap,
    row: &TypeDefRow,
    index: usize,
    type_def_table: &crate::raw::tables::TypeDefTable,
    config: &BuildConfiguration,
    rvas: &RvaResolver,
) -> CompileResult<TypeDef> {
    let name = heap_string(heaps, row.type_name)?;
    let namespace = heap_string(heaps, row.type_namespace)?;
    let flags = TypeAttributes::from_bits_truncate(row.flags);

    let base_type = resolve_type_def_or_ref(heaps, tables, &row.extends)?;
    let is_value_type = base_type.as_ref().map(is_known_value_type_base).unwrap_or(false);

    let interfaces = tables
        .interface_impl
        .as_ref()
        .map(|t| {
            t.rows()
                .iter()
                .filter(|r| r.class.get() == index + 1)
                .map(|r| resolve_type_def_or_ref(heaps, tables, &r.interface))
                .collect::<CompileResult<Vec<_>>>()
        })
        .transpose()?
        .unwrap_or_default()
        .into_iter()
        .flatten()
        .collect();

    let field_start = row.field_list.get();
    let field_end = type_def_table.get(index + 2).map(|next| next.field_list.get()).unwrap_or(usize::MAX);
    let fields = tables
        .field
        .as_ref()
        .map(|t| {
            (field_start..field_end.min(t.len() + 1))
                .filter_map(|i| t.get(i).map(|row| (i, row)))
                .map(|(i, r)| load_field(heaps, tables, r, i))
                .collect::<CompileResult<Vec<_>>>()
        })
        .transpose()?
        .unwrap_or_default();

    let method_start = row.method_list.get();
    let method_end = type_def_table.get(index + 2).map(|next| next.method_list.get()).unwrap_or(usize::MAX);
    let methods = tables
        .method_def
        .as_ref()
        .map(|t| {
            (method_start..method_end.min(t.len() + 1))
                .filter_map(|i| t.get(i).map(|row| (i, row)))
                .map(|(i, r)| load_method(heaps, tables, r, i, config, rvas))
                .collect::<CompileResult<Vec<_>>>()
        })
        .transpose()?
        .unwrap_or_default();

    let generic_param_count = tables
        .generic_param
        .as_ref()
        .map(|t| {
            t.rows()
                .iter()
                .filter(|r| r.owner.table() == Some(TableKind::TypeDef) && r.owner.row() == index + 1)
                .count() as u32
        })
        .unwrap_or(0);

    let nested_in = tables.nested_class.as_ref().and_then(|t| {
        t.rows().iter().find(|r| r.nested_class.get() == index + 1).map(|r| r.enclosing_class.get() - 1)
    });

    Ok(TypeDef { namespace, name, flags, is_value_type, base_type, interfaces, fields, methods, generic_param_count, nested_in })
}

fn is_known_value_type_base(handle: &TypeHandle) -> bool {
    matches!(handle, TypeHandle::External { namespace, name, .. } if namespace == "System" && (name == "ValueType" || name == "Enum"))
}

fn resolve_type_def_or_ref(
    heaps: &MetadataHeaps,
    tables: &crate::raw::tables::TableHeap,
    coded: &crate::raw::tables::CodedIndex<crate::raw::tables::TypeDefOrRef>,
) -> CompileResult<Option<TypeHandle>> {
    if coded.row() == 0 {
        return Ok(None);
    }
    Ok(match coded.table() {
        Some(TableKind::TypeDef) => Some(TypeHandle::Local(coded.row() - 1)),
        Some(TableKind::TypeRef) => {
            let row: &TypeRefRow = tables
                .type_ref
                .as_ref()
                .and_then(|t| t.get(coded.row()))
                .ok_or_else(|| CompileError::Metadata { assembly: "<unnamed>".into(), detail: "dangling TypeRef".into() })?;
            Some(TypeHandle::External {
                assembly: String::new(),
                namespace: heap_string(heaps, row.type_namespace)?,
                name: heap_string(heaps, row.type_name)?,
            })
        }
        _ => None,
    })
}

/// Resolves a decoded [`TypeSignature`] into the [`ValueKind`] the code
/// generator consumes, recursively following `Ptr`/`ByRef`/`SzArray` and
/// resolving `Class`/`ValueType` coded indices the same way
/// [`resolve_type_def_or_ref`] does for base types and interfaces.
fn resolve_value_kind(heaps: &MetadataHeaps, tables: &crate::raw::tables::TableHeap, sig: &TypeSignature) -> CompileResult<ValueKind> {
    Ok(match sig {
        TypeSignature::Void => ValueKind::Void,
        TypeSignature::Boolean => ValueKind::Boolean,
        TypeSignature::Char => ValueKind::Char,
        TypeSignature::I1 => ValueKind::I1,
        TypeSignature::U1 => ValueKind::U1,
        TypeSignature::I2 => ValueKind::I2,
        TypeSignature::U2 => ValueKind::U2,
        TypeSignature::I4 => ValueKind::I4,
        TypeSignature::U4 => ValueKind::U4,
        TypeSignature::I8 => ValueKind::I8,
        TypeSignature::U8 => ValueKind::U8,
        TypeSignature::R4 => ValueKind::R4,
        TypeSignature::R8 => ValueKind::R8,
        TypeSignature::String => ValueKind::String,
        TypeSignature::Object => ValueKind::Object,
        TypeSignature::IntPtr => ValueKind::IntPtr,
        TypeSignature::UIntPtr => ValueKind::UIntPtr,
        TypeSignature::TypedReference => ValueKind::Generic,
        TypeSignature::Ptr(inner) => ValueKind::Ptr(Box::new(resolve_value_kind(heaps, tables, inner)?)),
        TypeSignature::ByRef(inner) => ValueKind::ByRef(Box::new(resolve_value_kind(heaps, tables, inner)?)),
        TypeSignature::Pinned(inner) => resolve_value_kind(heaps, tables, inner)?,
        TypeSignature::SzArray(inner) => ValueKind::SzArray(Box::new(resolve_value_kind(heaps, tables, inner)?)),
        TypeSignature::Array { element, .. } => ValueKind::SzArray(Box::new(resolve_value_kind(heaps, tables, element)?)),
        TypeSignature::Class { token, is_value_type } => match resolve_type_def_or_ref(heaps, tables, token)? {
            Some(handle) => ValueKind::Class { handle, is_value_type: *is_value_type },
            None => ValueKind::Generic,
        },
        TypeSignature::GenericInst { base, .. } => resolve_value_kind(heaps, tables, base)?,
        TypeSignature::Var(_) | TypeSignature::MVar(_) | TypeSignature::FnPtr(_) => ValueKind::Generic,
    })
}

fn load_field(
    heaps: &MetadataHeaps,
    tables: &crate::raw::tables::TableHeap,
    row: &crate::raw::tables::FieldRow,
    row_index: usize,
) -> CompileResult<FieldDef> {
    let name = heap_string(heaps, row.name)?;
    let flags = FieldAttributes::from_bits_truncate(row.flags);
    let signature_blob = heaps.blob(row.signature).map_err(|err| CompileError::Metadata { assembly: "<unnamed>".into(), detail: err.to_string() })?;
    let mut cursor = Cursor::new(signature_blob);
    let _calling_convention = crate::utilities::FromByteStream::read(&mut cursor, &())
        .map_err(|err: std::io::Error| CompileError::Metadata { assembly: "<unnamed>".into(), detail: err.to_string() })
        .map(|b: u8| b)?;
    let signature = TypeSignature::read(&mut cursor).map_err(|err| CompileError::Metadata { assembly: "<unnamed>".into(), detail: err.to_string() })?;
    let value_kind = resolve_value_kind(heaps, tables, &signature)?;

    let constant = tables
        .constant
        .as_ref()
        .and_then(|t| t.rows().iter().find(|c| c.parent.table() == Some(TableKind::Field) && c.parent.row() == row_index))
        .and_then(|c| {
            let bytes = heaps.blob(c.value).ok()?;
            Some(decode_constant(c.ty, bytes))
        });

    Ok(FieldDef { token: row_index as u32, name, flags, signature, value_kind, constant })
}

fn decode_constant(tag: u8, bytes: &[u8]) -> ConstantValue {
    match tag {
        0x08 if bytes.len() >= 4 => ConstantValue::I32(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        0x0A if bytes.len() >= 8 => ConstantValue::I64(i64::from_le_bytes(bytes[..8].try_into().unwrap())),
        0x0C if bytes.len() >= 4 => ConstantValue::R4(f32::from_le_bytes(bytes[..4].try_into().unwrap())),
        0x0D if bytes.len() >= 8 => ConstantValue::R8(f64::from_le_bytes(bytes[..8].try_into().unwrap())),
        0x02 => ConstantValue::Bool(bytes.first().copied().unwrap_or(0) != 0),
        0x0E => {
            let units: Vec<u16> = bytes.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect();
            ConstantValue::String(String::from_utf16_lossy(&units))
        }
        0xFF => ConstantValue::Null,
        _ => ConstantValue::Null,
    }
}

fn load_method(
    heaps: &MetadataHeaps,
    tables: &crate::raw::tables::TableHeap,
    row: &crate::raw::tables::MethodDefRow,
    row_index: usize,
    config: &BuildConfiguration,
    rvas: &RvaResolver,
) -> CompileResult<MethodDef> {
    let name = heap_string(heaps, row.name)?;
    let flags = MethodAttributes::from_bits_truncate(row.flags);
    let signature_blob = heaps.blob(row.signature).map_err(|err| CompileError::Metadata { assembly: "<unnamed>".into(), detail: err.to_string() })?;
    let mut cursor = Cursor::new(signature_blob);
    let signature = MethodSignature::read(&mut cursor).map_err(|err| CompileError::Metadata { assembly: "<unnamed>".into(), detail: err.to_string() })?;
    let return_kind = resolve_value_kind(heaps, tables, &signature.return_type)?;
    let parameter_kinds = signature.parameters.iter().map(|p| resolve_value_kind(heaps, tables, p)).collect::<CompileResult<Vec<_>>>()?;

    let generic_param_count = tables
        .generic_param
        .as_ref()
        .map(|t| {
            t.rows()
                .iter()
                .filter(|r| r.owner.table() == Some(TableKind::MethodDef) && r.owner.row() == row_index)
                .count() as u32
        })
        .unwrap_or(0);

    let body = if row.rva == 0 {
        None
    } else {
        Some(load_method_body(row.rva, tables, heaps, config, rvas)?)
    };

    Ok(MethodDef { token: row_index as u32, name, flags, signature, return_kind, parameter_kinds, generic_param_count, body, overrides: Vec::new() })
}

/// Resolves RVAs against the PE section table built while reading the
/// assembly's CLI header — kept alive for the loader's whole run since
/// every method with a body needs one lookup into it.
struct RvaResolver<'a, 'f> {
    assembly: &'a pe::Assembly<'f>,
    file: &'f [u8],
}

impl<'a, 'f> RvaResolver<'a, 'f> {
    fn method_body_bytes(&self, rva: u32) -> CompileResult<&'f [u8]> {
        self.assembly
            .resolve_rva(self.file, rva)
            .map_err(|err| CompileError::Metadata { assembly: "<unnamed>".into(), detail: err.to_string() })
    }
}

/// Resolves a `TypeDef`/`TypeRef` metadata token (as found in a `catch`
/// clause's `class_token`) to a printable `Namespace.Name`, the same shape
/// [`crate::model::TypeDef::full_name`] produces — the generator matches
/// catch clauses against reachable types by this string.
fn resolve_type_token_name(heaps: &MetadataHeaps, tables: &crate::raw::tables::TableHeap, token: crate::metadata_token::MetadataToken) -> CompileResult<String> {
    use crate::metadata_token::MetadataTokenKind;
    match token.kind() {
        MetadataTokenKind::TypeDef => {
            let row = tables
                .type_def
                .as_ref()
                .and_then(|t| t.get(token.index()))
                .ok_or_else(|| CompileError::Metadata { assembly: "<unnamed>".into(), detail: "dangling TypeDef catch token".into() })?;
            let namespace = heap_string(heaps, row.type_namespace)?;
            let name = heap_string(heaps, row.type_name)?;
            Ok(if namespace.is_empty() { name } else { format!("{namespace}.{name}") })
        }
        MetadataTokenKind::TypeRef => {
            let row: &TypeRefRow = tables
                .type_ref
                .as_ref()
                .and_then(|t| t.get(token.index()))
                .ok_or_else(|| CompileError::Metadata { assembly: "<unnamed>".into(), detail: "dangling TypeRef catch token".into() })?;
            let namespace = heap_string(heaps, row.type_namespace)?;
            let name = heap_string(heaps, row.type_name)?;
            Ok(if namespace.is_empty() { name } else { format!("{namespace}.{name}") })
        }
        _ => Ok(String::new()),
    }
}

/// Resolves a `MemberRef` row to the operand the IR builder needs to check
/// it against the intrinsic registry: the declaring type's full name, the
/// member's own name, and enough of its signature (arg count, whether it
/// returns a value) to know how many stack slots a lowered call consumes.
///
/// Only `TypeRef`/`TypeDef`-parented member refs are resolved — the common
/// shape for a BCL intrinsic call. `ModuleRef`/`MethodDef`/`TypeSpec`
/// parents (vararg calls, generic-instantiation call sites) are left
/// unresolved, same over-approximation `reachability.rs` already documents
/// for cross-assembly `MemberRef` calls in general.
fn resolve_member_ref(
    heaps: &MetadataHeaps,
    tables: &crate::raw::tables::TableHeap,
    row_index: usize,
) -> CompileResult<Option<crate::raw::il::Operand>> {
    let row = match tables.member_ref.as_ref().and_then(|t| t.get(row_index)) {
        Some(row) => row,
        None => return Ok(None),
    };
    let declaring_type = match row.class.table() {
        Some(TableKind::TypeRef) => {
            let Some(type_ref): Option<&TypeRefRow> = tables.type_ref.as_ref().and_then(|t| t.get(row.class.row())) else {
                return Ok(None);
            };
            let namespace = heap_string(heaps, type_ref.type_namespace)?;
            let name = heap_string(heaps, type_ref.type_name)?;
            if namespace.is_empty() { name } else { format!("{namespace}.{name}") }
        }
        Some(TableKind::TypeDef) => {
            let Some(type_def): Option<&TypeDefRow> = tables.type_def.as_ref().and_then(|t| t.get(row.class.row())) else {
                return Ok(None);
            };
            let namespace = heap_string(heaps, type_def.type_namespace)?;
            let name = heap_string(heaps, type_def.type_name)?;
            if namespace.is_empty() { name } else { format!("{namespace}.{name}") }
        }
        _ => return Ok(None),
    };
    let method_name = heap_string(heaps, row.name)?;
    let signature_blob = heaps.blob(row.signature).map_err(|err| CompileError::Metadata { assembly: "<unnamed>".into(), detail: err.to_string() })?;
    let mut cursor = Cursor::new(signature_blob);
    let signature = MethodSignature::read(&mut cursor).map_err(|err| CompileError::Metadata { assembly: "<unnamed>".into(), detail: err.to_string() })?;
    let arg_count = signature.parameters.len() + if signature.calling_convention.contains(crate::raw::signature::CallingConvention::HAS_THIS) { 1 } else { 0 };
    let has_return = !matches!(signature.return_type, TypeSignature::Void);
    Ok(Some(crate::raw::il::Operand::MemberRef { declaring_type, method_name, arg_count, has_return }))
}

fn load_method_body(
    rva: u32,
    tables: &crate::raw::tables::TableHeap,
    heaps: &MetadataHeaps,
    config: &BuildConfiguration,
    rvas: &RvaResolver,
) -> CompileResult<ModelMethodBody> {
    let bytes = rvas.method_body_bytes(rva)?;
    let raw = RawMethodBody::read(bytes, |token| {
        let row = tables
            .stand_alone_sig
            .as_ref()
            .and_then(|t| t.get(token.index()))
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidData, "dangling local var sig token"))?;
        let blob = heaps.blob(row.signature)?;
        let mut cursor = Cursor::new(blob);
        Ok(LocalVariableSignature::read(&mut cursor)?.locals)
    })
    .map_err(|err| CompileError::Metadata { assembly: "<unnamed>".into(), detail: err.to_string() })?;
    let sequence_points = if config.read_debug_symbols { Vec::<SequencePoint>::new() } else { Vec::new() };
    let local_kinds = raw.locals.iter().map(|l| resolve_value_kind(heaps, tables, l)).collect::<CompileResult<Vec<_>>>()?;
    let mut instructions = raw.instructions;
    for instr in &mut instructions {
        let crate::raw::il::Operand::Token(token) = &instr.operand else { continue };
        match (instr.opcode, token.kind()) {
            (crate::raw::il::OpCode::Ldstr, _) => {
                let resolved = heaps
                    .user_string(UserStringIndex(token.index() as u32))
                    .map_err(|err| CompileError::Metadata { assembly: "<unnamed>".into(), detail: err.to_string() })?;
                instr.operand = crate::raw::il::Operand::String(resolved);
            }
            (
                crate::raw::il::OpCode::Call | crate::raw::il::OpCode::Callvirt | crate::raw::il::OpCode::Newobj,
                crate::metadata_token::MetadataTokenKind::MemberRef,
            ) => {
                if let Some(resolved) = resolve_member_ref(heaps, tables, token.index())? {
                    instr.operand = resolved;
                }
            }
            (
                crate::raw::il::OpCode::Newarr
                | crate::raw::il::OpCode::Box
                | crate::raw::il::OpCode::Unbox
                | crate::raw::il::OpCode::UnboxAny
                | crate::raw::il::OpCode::Castclass
                | crate::raw::il::OpCode::Isinst
                | crate::raw::il::OpCode::Compound(crate::raw::il::CompoundOpCode::InitObj),
                crate::metadata_token::MetadataTokenKind::TypeDef | crate::metadata_token::MetadataTokenKind::TypeRef,
            ) => {
                let resolved = resolve_type_token_name(heaps, tables, *token)?;
                instr.operand = crate::raw::il::Operand::TypeName(resolved);
            }
            _ => {}
        }
    }
    let exception_handlers = raw
        .exception_clauses
        .into_iter()
        .map(|clause| {
            let kind = match ExceptionHandlerKindTag::from(clause.kind) {
                ExceptionHandlerKindTag::Catch => {
                    let exception_type = clause.class_token.map(|t| resolve_type_token_name(heaps, tables, t)).transpose()?.unwrap_or_default();
                    crate::model::ExceptionHandlerKind::Catch { exception_type }
                }
                ExceptionHandlerKindTag::Filter => crate::model::ExceptionHandlerKind::Filter { filter_offset: clause.filter_offset.unwrap_or(0) },
                ExceptionHandlerKindTag::Finally => crate::model::ExceptionHandlerKind::Finally,
                ExceptionHandlerKindTag::Fault => crate::model::ExceptionHandlerKind::Fault,
            };
            Ok(ExceptionHandler {
                kind,
                try_range: (clause.try_offset, clause.try_offset + clause.try_length),
                handler_range: (clause.handler_offset, clause.handler_offset + clause.handler_length),
            })
        })
        .collect::<CompileResult<Vec<_>>>()?;

    Ok(ModelMethodBody {
        max_stack: raw.max_stack,
        locals: raw.locals,
        local_kinds,
        instructions,
        exception_handlers,
        sequence_points,
    })
}
