use crate::model::{MethodAttributes, ValueKind};
use crate::raw::il::{ExceptionClauseKind, RawInstruction};
use crate::raw::signature::{MethodSignature, TypeSignature};

#[derive(Debug, Clone)]
pub struct MethodDef {
    /// The method's own 1-based row index in its assembly's `MethodDef`
    /// table — kept so a `Call`/`Callvirt` operand's `MetadataToken` can be
    /// matched back to this method without re-reading `raw::` tables.
    pub token: u32,
    pub name: String,
    pub flags: MethodAttributes,
    pub signature: MethodSignature,
    /// `signature.return_type`/`signature.parameters`, resolved to
    /// [`ValueKind`] — the code generator's input for a method's C++
    /// declaration.
    pub return_kind: ValueKind,
    pub parameter_kinds: Vec<ValueKind>,
    pub generic_param_count: u32,
    /// `None` for `abstract`/P-invoke/runtime-provided methods that have
    /// no CIL body to lower (`spec.md` §4.3's "method has no body" edge case).
    pub body: Option<MethodBody>,
    /// Set on the declaring type's vtable slot once the reachability pass
    /// decides this method overrides a base/interface slot (`spec.md` §4.2).
    pub overrides: Vec<OverrideTarget>,
}

impl MethodDef {
    pub fn is_static(&self) -> bool {
        self.flags.contains(MethodAttributes::STATIC)
    }

    pub fn is_virtual(&self) -> bool {
        self.flags.contains(MethodAttributes::VIRTUAL)
    }

    pub fn is_abstract(&self) -> bool {
        self.flags.contains(MethodAttributes::ABSTRACT)
    }

    pub fn is_constructor(&self) -> bool {
        self.flags.contains(MethodAttributes::RT_SPECIAL_NAME) && (self.name == ".ctor" || self.name == ".cctor")
    }

    pub fn is_static_constructor(&self) -> bool {
        self.is_constructor() && self.name == ".cctor"
    }
}

/// Names the base or interface method slot a method overrides, resolved
/// once the owning type's full inheritance chain is known.
#[derive(Debug, Clone)]
pub struct OverrideTarget {
    pub declaring_type: String,
    pub method_name: String,
}

#[derive(Debug, Clone)]
pub struct MethodBody {
    pub max_stack: u16,
    pub locals: Vec<TypeSignature>,
    /// `locals`, resolved to [`ValueKind`] — the generator's per-local
    /// variable declaration type.
    pub local_kinds: Vec<ValueKind>,
    pub instructions: Vec<RawInstruction>,
    pub exception_handlers: Vec<ExceptionHandler>,
    pub sequence_points: Vec<SequencePoint>,
}

#[derive(Debug, Clone)]
pub struct ExceptionHandler {
    pub kind: ExceptionHandlerKind,
    pub try_range: (u32, u32),
    pub handler_range: (u32, u32),
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ExceptionHandlerKind {
    Catch { exception_type: String },
    Filter { filter_offset: u32 },
    Finally,
    Fault,
}

impl From<ExceptionClauseKind> for ExceptionHandlerKindTag {
    fn from(value: ExceptionClauseKind) -> Self {
        match value {
            ExceptionClauseKind::Catch => ExceptionHandlerKindTag::Catch,
            ExceptionClauseKind::Filter => ExceptionHandlerKindTag::Filter,
            ExceptionClauseKind::Finally => ExceptionHandlerKindTag::Finally,
            ExceptionClauseKind::Fault => ExceptionHandlerKindTag::Fault,
        }
    }
}

/// A bare tag mirroring [`ExceptionClauseKind`] without the payload that
/// needs type-name resolution — the loader matches on this before it has
/// resolved `class_token` into a printable type name.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ExceptionHandlerKindTag {
    Catch,
    Filter,
    Finally,
    Fault,
}

/// A PDB-lite (bytecode_offset, file, line, column) tuple — `spec.md`
/// §4.3's debug line-mapping requirement, populated only when
/// [`crate::config::BuildConfiguration::read_debug_symbols`] is set and a
/// symbol file was actually found.
#[derive(Debug, Clone)]
pub struct SequencePoint {
    pub bytecode_offset: u32,
    pub file: String,
    pub line: u32,
    pub column: u32,
}
