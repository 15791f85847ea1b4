//! The three-address IR instruction set `spec.md` §4.3's stack-to-register
//! lowering produces. Every instruction reads from and writes to a
//! [`Value`] — either a virtual register or a constant — never the
//! evaluation stack the source bytecode used.

use crate::model::ValueKind;
use crate::reachability::{MethodId, TypeId};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Register(pub u32);

#[derive(Debug, Clone)]
pub enum Value {
    Register(Register),
    ConstI32(i32),
    ConstI64(i64),
    ConstF32(f32),
    ConstF64(f64),
    ConstString(String),
    Null,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    DivUnsigned,
    Rem,
    RemUnsigned,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    ShrUnsigned,
    Eq,
    Ne,
    Lt,
    LtUnsigned,
    Le,
    LeUnsigned,
    Gt,
    GtUnsigned,
    Ge,
    GeUnsigned,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// A reference to a field, resolved to its declaring type and slot index
/// rather than a metadata token — the C++ generator emits a plain struct
/// member access from this.
#[derive(Debug, Copy, Clone)]
pub struct FieldRef {
    pub declaring_type: TypeId,
    pub field_index: usize,
}

#[derive(Debug, Clone)]
pub enum Instr {
    /// `dst = value`
    Move { dst: Register, value: Value },
    Binary { dst: Register, op: BinaryOp, lhs: Value, rhs: Value },
    Unary { dst: Register, op: UnaryOp, operand: Value },
    Convert { dst: Register, operand: Value, target: ConvertTarget },

    LoadArg { dst: Register, index: u16 },
    StoreArg { index: u16, value: Value },
    LoadLocal { dst: Register, index: u16 },
    StoreLocal { index: u16, value: Value },

    LoadField { dst: Register, object: Value, field: FieldRef },
    StoreField { object: Value, field: FieldRef, value: Value },
    LoadStaticField { dst: Register, field: FieldRef },
    StoreStaticField { field: FieldRef, value: Value },
    /// `ldflda` — the address of a field rather than its value, used when
    /// the field is about to be passed by reference or written through a
    /// pointer the caller holds onto.
    LoadFieldAddress { dst: Register, object: Value, field: FieldRef },
    /// `ldsflda` — the address of a static field.
    LoadStaticFieldAddress { dst: Register, field: FieldRef },

    NewObject { dst: Register, ty: TypeId, ctor: MethodId, args: Vec<Value> },
    NewArray { dst: Register, element: TypeId, length: Value },
    LoadElement { dst: Register, array: Value, index: Value },
    StoreElement { array: Value, index: Value, value: Value },
    ArrayLength { dst: Register, array: Value },

    /// A direct, statically resolved call — `invokevirtual`/`invokestatic`
    /// where devirtualization already happened (`Callvirt` on a sealed
    /// type or a non-virtual method lowers here too).
    Call { dst: Option<Register>, method: MethodId, args: Vec<Value> },
    /// A dispatch through the callee's own vtable slot, used for every
    /// `callvirt` on a method declared on a (non-interface) reference type
    /// that is actually virtual.
    CallVirtual { dst: Option<Register>, slot: VirtualSlot, receiver: Value, args: Vec<Value> },
    /// A dispatch through an interface's per-implementation vtable —
    /// `callvirt` on a method declared on an interface type. Kept distinct
    /// from [`Instr::CallVirtual`] since the receiver's own vtable is not
    /// indexable by an interface slot; the generator instead looks up the
    /// implementing type's table for `interface` before indexing.
    CallInterface { dst: Option<Register>, interface: TypeId, slot_index: usize, receiver: Value, args: Vec<Value> },
    CallIntrinsic { dst: Option<Register>, runtime_function: &'static str, args: Vec<Value> },
    /// A delegate invocation — `spec.md` §8's Delegates scenario: calls
    /// through a function-pointer-plus-target-object pair rather than a
    /// vtable slot. Carries the invoked signature's parameter/return kinds
    /// so the generator can cast the stored function pointer to the right
    /// C++ type before calling through it.
    CallDelegate { dst: Option<Register>, delegate: Value, args: Vec<Value>, parameter_kinds: Vec<ValueKind>, return_kind: ValueKind },

    /// `ldftn`/`ldvirtftn` — takes a method's entry point as a value rather
    /// than calling it, the first half of a delegate construction. `receiver`
    /// is `Some` only for the `ldvirtftn` (bound/virtual) form.
    LoadFunctionPointer { dst: Register, method: MethodId, receiver: Option<Value> },
    /// `newobj` on a delegate type: binds a target object and a function
    /// pointer into one delegate instance (`spec.md` §8's Delegates scenario).
    DelegateCreate { dst: Register, delegate_type: TypeId, target: Value, function: Value },

    Box { dst: Register, value: Value, value_type: TypeId },
    Unbox { dst: Register, value: Value, target_type: TypeId },
    CastClass { dst: Register, value: Value, target_type: TypeId },
    IsInstance { dst: Register, value: Value, target_type: TypeId },
    /// `initobj` on a value-type address — zero-fills the storage `address`
    /// names rather than allocating or constructing.
    InitObj { address: Value, ty: TypeId },

    /// Guards a dereference against a null receiver — emitted ahead of a
    /// `LoadField`/`StoreField`/`CallVirtual`/`CallInterface` on a
    /// reference-typed receiver, mirroring the `StaticCtorGuard` placement
    /// ahead of static field access.
    NullCheck { value: Value },

    Throw { exception: Value },
    Rethrow,

    Branch { target: BlockId },
    BranchIf { condition: Value, when_true: BlockId, when_false: BlockId },
    Switch { selector: Value, targets: Vec<BlockId>, default: BlockId },
    Return { value: Option<Value> },

    TryBegin { region: usize },
    TryEnd { region: usize },
    CatchBegin { region: usize, exception_type: Option<TypeId> },
    FilterBegin { region: usize },
    /// `endfilter` — closes a filter funclet, distinct from `EndFinally`
    /// which closes a `finally`/`fault` handler.
    EndFilter,
    FinallyBegin { region: usize },
    EndFinally,
    Leave { target: BlockId },

    Nop,
    /// An opcode the builder does not model, or a body-lowering failure —
    /// carries the diagnostic text verbatim (prefixed `WARNING` by the
    /// builder) so it survives into the generated C++ as an inline comment.
    Comment(String),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ConvertTarget {
    I1,
    I2,
    I4,
    I8,
    U1,
    U2,
    U4,
    U8,
    R4,
    R8,
}

/// A virtual dispatch slot, assigned once per overridable method by the
/// vtable layout pass (`spec.md` §4.3): the declaring interface/base type
/// and the slot's position within that type's vtable.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct VirtualSlot {
    pub declaring_type: TypeId,
    pub slot_index: usize,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct BlockId(pub u32);

#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub id: BlockId,
    /// The originating bytecode offset of this block's leader instruction —
    /// lets the generator test a block against an [`super::ExceptionRegion`]'s
    /// `try_range`/handler range without re-walking the source instructions.
    pub start_offset: u32,
    pub instructions: Vec<Instr>,
}
