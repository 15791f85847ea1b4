//! The IR Builder's output (`spec.md` §4.3): a flat, index-addressed
//! module of lowered types and methods, ready for the C++ code generator
//! to walk in a single deterministic pass.

pub mod builder;
pub mod instr;

use fxhash::FxHashMap;

use crate::ir::instr::{BasicBlock, VirtualSlot};
use crate::model::ValueKind;
use crate::reachability::{MethodId, TypeId};

/// A lowered type: its field layout, its vtable (virtual methods only,
/// ordered by slot), and the interfaces it implements with their own
/// per-interface dispatch tables (`spec.md` §4.3's interface-impl tables).
#[derive(Debug, Clone)]
pub struct IRType {
    pub source: TypeId,
    pub full_name: String,
    pub mangled_name: String,
    pub is_value_type: bool,
    pub base: Option<TypeId>,
    pub fields: Vec<IRField>,
    pub vtable: Vec<MethodId>,
    pub interface_impls: Vec<InterfaceImpl>,
    /// Present when this type declares a static constructor — the
    /// generator guards every static-field access and static-method entry
    /// with a check against this flag's backing storage (`spec.md` §4.3's
    /// cctor-guard requirement).
    pub static_constructor: Option<MethodId>,
    /// `true` for a BCL type the companion runtime hand-writes (`spec.md`
    /// §4.5's "IR type that is not runtime-provided" qualifier) — the
    /// generator emits no struct, type-info constant, or forward
    /// declaration for these.
    pub runtime_provided: bool,
}

#[derive(Debug, Clone)]
pub struct IRField {
    pub mangled_name: String,
    pub is_static: bool,
    pub value_kind: ValueKind,
}

/// Maps one implemented interface to the concrete methods filling its
/// slots, in the interface's own vtable order. A slot is `None` when no
/// method on the implementing type matches it by name — `spec.md` §4.3
/// item 3 requires recording this rather than guessing a method, since a
/// silently wrong entry in a dispatch table is worse than a diagnosed gap.
#[derive(Debug, Clone)]
pub struct InterfaceImpl {
    pub interface: TypeId,
    pub slots: Vec<Option<MethodId>>,
}

#[derive(Debug, Clone)]
pub struct IRMethod {
    pub source: MethodId,
    pub mangled_name: String,
    pub parameter_count: usize,
    pub local_count: usize,
    pub blocks: Vec<BasicBlock>,
    pub exception_regions: Vec<ExceptionRegion>,
    /// Assigned only for methods reachable through a `callvirt` on a
    /// virtual slot; used by the generator to also emit the function
    /// pointer the vtable/interface-impl table stores.
    pub virtual_slot: Option<VirtualSlot>,
}

#[derive(Debug, Clone)]
pub struct ExceptionRegion {
    pub try_range: (u32, u32),
    pub handler_range: (u32, u32),
    pub kind: RegionKind,
}

#[derive(Debug, Clone)]
pub enum RegionKind {
    Catch { exception_type: Option<TypeId> },
    Filter { filter_block: crate::ir::instr::BlockId },
    Finally,
    Fault,
}

#[derive(Debug, Default)]
pub struct IRModule {
    pub types: Vec<IRType>,
    pub methods: Vec<IRMethod>,
    /// `spec.md` §4.5's deduplicated string pool, keyed by the literal so
    /// repeated `ldstr` operands share one emitted constant.
    pub string_pool: Vec<String>,
    string_pool_index: FxHashMap<String, usize>,
}

impl IRModule {
    pub fn intern_string(&mut self, value: &str) -> usize {
        if let Some(&index) = self.string_pool_index.get(value) {
            return index;
        }
        let index = self.string_pool.len();
        self.string_pool.push(value.to_string());
        self.string_pool_index.insert(value.to_string(), index);
        index
    }

    /// The pool index a literal was interned at — the code generator uses
    /// this to turn a `Value::ConstString` back into the symbol its
    /// literal-initialization function assigned it.
    pub fn string_index(&self, value: &str) -> Option<usize> {
        self.string_pool_index.get(value).copied()
    }
}
