//! The error taxonomy described in `spec.md` §7: every stage either
//! succeeds, records a non-fatal [`Warning`] and continues, or returns a
//! [`CompileError`] naming the offending symbol in metadata terms.

use std::fmt::{Display, Formatter};

/// A metadata-level coordinate an error or warning is attached to, printed
/// the way a linker or disassembler would name a symbol.
#[derive(Debug, Clone)]
pub struct SymbolRef {
    pub assembly: String,
    pub type_name: Option<String>,
    pub member_name: Option<String>,
}

impl SymbolRef {
    pub fn assembly(name: impl Into<String>) -> Self {
        Self { assembly: name.into(), type_name: None, member_name: None }
    }

    pub fn type_in(assembly: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self { assembly: assembly.into(), type_name: Some(type_name.into()), member_name: None }
    }

    pub fn member_of(assembly: impl Into<String>, type_name: impl Into<String>, member_name: impl Into<String>) -> Self {
        Self { assembly: assembly.into(), type_name: Some(type_name.into()), member_name: Some(member_name.into()) }
    }
}

impl Display for SymbolRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.assembly)?;
        if let Some(ty) = &self.type_name {
            write!(f, "!{ty}")?;
        }
        if let Some(member) = &self.member_name {
            write!(f, "::{member}")?;
        }
        Ok(())
    }
}

/// Fatal, pipeline-stopping errors (`spec.md` §7's Resolution / Metadata /
/// Structural / Emission categories). Each carries enough context to be
/// printed without re-walking the graph that produced it.
#[derive(Debug)]
pub enum CompileError {
    /// §7 Resolution: a referenced assembly could not be found or loaded.
    Resolution { reference: String, searched: Vec<String> },
    /// §7 Metadata: malformed bytes at the ECMA-335 layer — bad table,
    /// bad coded index, truncated heap, unreadable PE/CLI header.
    Metadata { assembly: String, detail: String },
    /// §7 Structural: a reachable type/method graph is internally
    /// inconsistent — a dangling vtable slot, a cyclic value-type layout,
    /// a method body referencing a local index out of range.
    Structural { symbol: SymbolRef, detail: String },
    /// §7 Emission: the IR was valid but the code generator could not
    /// produce C++ for it (a pathological identifier collision the name
    /// mapper could not resolve after its configured retry budget, a
    /// disk/IO failure writing an artifact).
    Emission { detail: String },
    Io(std::io::Error),
}

impl From<std::io::Error> for CompileError {
    fn from(value: std::io::Error) -> Self {
        CompileError::Io(value)
    }
}

impl Display for CompileError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileError::Resolution { reference, searched } => {
                write!(f, "could not resolve assembly reference '{reference}' (searched: {})", searched.join(", "))
            }
            CompileError::Metadata { assembly, detail } => write!(f, "malformed metadata in '{assembly}': {detail}"),
            CompileError::Structural { symbol, detail } => write!(f, "structural error at {symbol}: {detail}"),
            CompileError::Emission { detail } => write!(f, "code generation failed: {detail}"),
            CompileError::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl std::error::Error for CompileError {}

/// §7's non-fatal category: an intrinsic, a platform invoke, or a CIL
/// construct the compiler recognizes but does not lower, reported so the
/// driver can print a "N opcodes lowered with warnings" summary instead of
/// the build silently doing the wrong thing.
#[derive(Debug, Clone)]
pub struct Warning {
    pub symbol: SymbolRef,
    pub message: String,
}

impl Display for Warning {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "warning at {}: {}", self.symbol, self.message)
    }
}

pub type CompileResult<T> = Result<T, CompileError>;
