//! Blob-encoded type and method signatures (ECMA-335 §II.23.2). These are
//! read out of `#Blob` heap entries referenced by `Field::signature`,
//! `MethodDef::signature`, `MemberRef::signature`, `TypeSpec::signature`
//! and `StandAloneSig::signature`.

use std::io::{Cursor, Error, ErrorKind};

use crate::metadata_token::MetadataToken;
use crate::raw::tables::{CodedIndex, TypeDefOrRef};
use crate::utilities::{read_compressed_u32, FromByteStream};

/// The `ELEMENT_TYPE_*` tag byte a type signature opens with.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(u8)]
pub enum ElementType {
    Void = 0x01,
    Boolean = 0x02,
    Char = 0x03,
    I1 = 0x04,
    U1 = 0x05,
    I2 = 0x06,
    U2 = 0x07,
    I4 = 0x08,
    U4 = 0x09,
    I8 = 0x0A,
    U8 = 0x0B,
    R4 = 0x0C,
    R8 = 0x0D,
    String = 0x0E,
    Ptr = 0x0F,
    ByRef = 0x10,
    ValueType = 0x11,
    Class = 0x12,
    Var = 0x13,
    Array = 0x14,
    GenericInst = 0x15,
    TypedByRef = 0x16,
    I = 0x18,
    U = 0x19,
    FnPtr = 0x1B,
    Object = 0x1C,
    SzArray = 0x1D,
    MVar = 0x1E,
    CModReqd = 0x1F,
    CModOpt = 0x20,
    Sentinel = 0x41,
    Pinned = 0x45,
}

impl ElementType {
    fn from_byte(byte: u8) -> std::io::Result<Self> {
        use ElementType::*;
        Ok(match byte {
            0x01 => Void, 0x02 => Boolean, 0x03 => Char, 0x04 => I1, 0x05 => U1, 0x06 => I2,
            0x07 => U2, 0x08 => I4, 0x09 => U4, 0x0A => I8, 0x0B => U8, 0x0C => R4, 0x0D => R8,
            0x0E => String, 0x0F => Ptr, 0x10 => ByRef, 0x11 => ValueType, 0x12 => Class,
            0x13 => Var, 0x14 => Array, 0x15 => GenericInst, 0x16 => TypedByRef, 0x18 => I,
            0x19 => U, 0x1B => FnPtr, 0x1C => Object, 0x1D => SzArray, 0x1E => MVar,
            0x1F => CModReqd, 0x20 => CModOpt, 0x41 => Sentinel, 0x45 => Pinned,
            _ => return Err(Error::new(ErrorKind::InvalidData, format!("unknown ELEMENT_TYPE {byte:#x}"))),
        })
    }
}

/// A fully decoded type signature, recursive over pointers, arrays,
/// generics and modifiers.
#[derive(Debug, Clone)]
pub enum TypeSignature {
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
    TypedReference,
    Ptr(Box<TypeSignature>),
    ByRef(Box<TypeSignature>),
    /// `class`/`valuetype` reference: the coded index into TypeDef/TypeRef/TypeSpec.
    Class { token: CodedIndex<TypeDefOrRef>, is_value_type: bool },
    SzArray(Box<TypeSignature>),
    Array { element: Box<TypeSignature>, rank: u32, sizes: Vec<u32>, lower_bounds: Vec<i32> },
    GenericInst { base: Box<TypeSignature>, arguments: Vec<TypeSignature> },
    Var(u32),
    MVar(u32),
    FnPtr(Box<MethodSignature>),
    Pinned(Box<TypeSignature>),
}

impl TypeSignature {
    pub fn read(stream: &mut Cursor<&[u8]>) -> std::io::Result<Self> {
        let tag = ElementType::from_byte(u8::read(stream, &())?)?;
        Ok(match tag {
            ElementType::CModReqd | ElementType::CModOpt => {
                let _custom_mod = read_type_def_or_ref_encoded(stream)?;
                Self::read(stream)?
            }
            ElementType::Void => TypeSignature::Void,
            ElementType::Boolean => TypeSignature::Boolean,
            ElementType::Char => TypeSignature::Char,
            ElementType::I1 => TypeSignature::I1,
            ElementType::U1 => TypeSignature::U1,
            ElementType::I2 => TypeSignature::I2,
            ElementType::U2 => TypeSignature::U2,
            ElementType::I4 => TypeSignature::I4,
            ElementType::U4 => TypeSignature::U4,
            ElementType::I8 => TypeSignature::I8,
            ElementType::U8 => TypeSignature::U8,
            ElementType::R4 => TypeSignature::R4,
            ElementType::R8 => TypeSignature::R8,
            ElementType::String => TypeSignature::String,
            ElementType::Object => TypeSignature::Object,
            ElementType::I => TypeSignature::IntPtr,
            ElementType::U => TypeSignature::UIntPtr,
            ElementType::TypedByRef => TypeSignature::TypedReference,
            ElementType::Ptr => TypeSignature::Ptr(Box::new(Self::read(stream)?)),
            ElementType::ByRef => TypeSignature::ByRef(Box::new(Self::read(stream)?)),
            ElementType::Pinned => TypeSignature::Pinned(Box::new(Self::read(stream)?)),
            ElementType::Class => TypeSignature::Class {
                token: read_type_def_or_ref_encoded(stream)?,
                is_value_type: false,
            },
            ElementType::ValueType => TypeSignature::Class {
                token: read_type_def_or_ref_encoded(stream)?,
                is_value_type: true,
            },
            ElementType::Var => TypeSignature::Var(read_compressed_u32(stream)?),
            ElementType::MVar => TypeSignature::MVar(read_compressed_u32(stream)?),
            ElementType::SzArray => TypeSignature::SzArray(Box::new(Self::read(stream)?)),
            ElementType::Array => {
                let element = Box::new(Self::read(stream)?);
                let rank = read_compressed_u32(stream)?;
                let num_sizes = read_compressed_u32(stream)?;
                let sizes = (0..num_sizes).map(|_| read_compressed_u32(stream)).collect::<std::io::Result<_>>()?;
                let num_lower_bounds = read_compressed_u32(stream)?;
                let lower_bounds = (0..num_lower_bounds)
                    .map(|_| read_compressed_i32(stream))
                    .collect::<std::io::Result<_>>()?;
                TypeSignature::Array { element, rank, sizes, lower_bounds }
            }
            ElementType::GenericInst => {
                let base_tag = ElementType::from_byte(u8::read(stream, &())?)?;
                let is_value_type = matches!(base_tag, ElementType::ValueType);
                let base = TypeSignature::Class { token: read_type_def_or_ref_encoded(stream)?, is_value_type };
                let argument_count = read_compressed_u32(stream)?;
                let arguments = (0..argument_count).map(|_| Self::read(stream)).collect::<std::io::Result<_>>()?;
                TypeSignature::GenericInst { base: Box::new(base), arguments }
            }
            ElementType::FnPtr => TypeSignature::FnPtr(Box::new(MethodSignature::read(stream)?)),
            ElementType::Sentinel => return Err(Error::new(ErrorKind::InvalidData, "unexpected sentinel in type signature")),
        })
    }
}

fn read_compressed_i32(stream: &mut Cursor<&[u8]>) -> std::io::Result<i32> {
    let unsigned = read_compressed_u32(stream)?;
    let negative = unsigned & 1 != 0;
    let magnitude = (unsigned >> 1) as i32;
    Ok(if negative { -magnitude } else { magnitude })
}

/// `TypeDefOrRefEncoded` (ECMA-335 §II.23.2.8): a single compressed integer
/// whose low 2 bits select `TypeDef`/`TypeRef`/`TypeSpec` and whose
/// remaining bits are the 1-based row index — distinct from the fixed
/// 2-or-4-byte column a coded index occupies in a table row.
fn read_type_def_or_ref_encoded(stream: &mut Cursor<&[u8]>) -> std::io::Result<CodedIndex<TypeDefOrRef>> {
    let encoded = read_compressed_u32(stream)?;
    Ok(CodedIndex::from_raw(encoded, 2))
}

bitflags::bitflags! {
    #[derive(Debug, Copy, Clone, Eq, PartialEq)]
    pub struct CallingConvention: u8 {
        const DEFAULT = 0x0;
        const VARARG = 0x5;
        const GENERIC = 0x10;
        const HAS_THIS = 0x20;
        const EXPLICIT_THIS = 0x40;
    }
}

#[derive(Debug, Clone)]
pub struct Parameter {
    pub ty: TypeSignature,
    pub by_ref: bool,
}

#[derive(Debug, Clone)]
pub struct MethodSignature {
    pub calling_convention: CallingConvention,
    pub generic_param_count: u32,
    pub return_type: TypeSignature,
    pub parameters: Vec<TypeSignature>,
}

impl MethodSignature {
    pub fn read(stream: &mut Cursor<&[u8]>) -> std::io::Result<Self> {
        let flags = u8::read(stream, &())?;
        let calling_convention = CallingConvention::from_bits_truncate(flags);
        let generic_param_count = if calling_convention.contains(CallingConvention::GENERIC) {
            read_compressed_u32(stream)?
        } else {
            0
        };
        let param_count = read_compressed_u32(stream)?;
        let return_type = TypeSignature::read(stream)?;
        let parameters = (0..param_count).map(|_| TypeSignature::read(stream)).collect::<std::io::Result<_>>()?;
        Ok(Self { calling_convention, generic_param_count, return_type, parameters })
    }
}

/// A method's local-variable signature, referenced from a fat method body
/// header's `local_var_sig_tok` (ECMA-335 §II.25.4.6).
#[derive(Debug, Clone)]
pub struct LocalVariableSignature {
    pub locals: Vec<TypeSignature>,
}

impl LocalVariableSignature {
    pub fn read(stream: &mut Cursor<&[u8]>) -> std::io::Result<Self> {
        let tag = u8::read(stream, &())?;
        if tag != 0x07 {
            return Err(Error::new(ErrorKind::InvalidData, "expected LOCAL_SIG tag 0x07"));
        }
        let count = read_compressed_u32(stream)?;
        let locals = (0..count).map(|_| TypeSignature::read(stream)).collect::<std::io::Result<_>>()?;
        Ok(Self { locals })
    }
}

/// Unused once `MethodDef` resolution is wired through `model::`, kept so
/// call sites can still name a method by token without re-deriving a
/// signature type from scratch.
#[derive(Debug, Copy, Clone)]
pub struct MethodRef(pub MetadataToken);
