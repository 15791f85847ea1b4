//! The IR Builder (`spec.md` §4.3): a structural pass that lays out every
//! reachable type (fields, vtable, interface-impl tables, static
//! constructor guards) followed by a per-method pass that lowers each
//! method's CIL stack machine into the three-address [`super::instr::Instr`]
//! form, splitting basic blocks at every branch target.

use std::collections::BTreeSet;

use fxhash::FxHashMap;

use crate::diagnostics::Diagnostics;
use crate::errors::{CompileResult, SymbolRef, Warning};
use crate::intrinsics::IntrinsicCallRegistry;
use crate::ir::instr::{
    BasicBlock, BinaryOp, BlockId, ConvertTarget, FieldRef, Instr, Register, UnaryOp, Value, VirtualSlot,
};
use crate::ir::{ExceptionRegion, IRField, IRMethod, IRModule, IRType, InterfaceImpl, RegionKind};
use crate::metadata_token::MetadataTokenKind;
use crate::model::{Assembly, ExceptionHandlerKind, MethodDef};
use crate::name_mapper::NameMapper;
use crate::raw::il::{CompoundOpCode, Operand, OpCode, RawInstruction};
use crate::assembly_set::AssemblySet;
use crate::reachability::{MethodId, ReachabilityResult, TypeId};

pub struct IRBuilder<'a> {
    assemblies: &'a AssemblySet,
    reachability: &'a ReachabilityResult,
    name_mapper: &'a mut NameMapper,
    intrinsics: &'a IntrinsicCallRegistry,
    diagnostics: &'a mut Diagnostics,
}

impl<'a> IRBuilder<'a> {
    pub fn new(
        assemblies: &'a AssemblySet,
        reachability: &'a ReachabilityResult,
        name_mapper: &'a mut NameMapper,
        intrinsics: &'a IntrinsicCallRegistry,
        diagnostics: &'a mut Diagnostics,
    ) -> Self {
        Self { assemblies, reachability, name_mapper, intrinsics, diagnostics }
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self)))]
    pub fn build(&mut self) -> CompileResult<IRModule> {
        let mut module = IRModule::default();
        let mut ordered_types: Vec<TypeId> = self.reachability.types.iter().copied().collect();
        ordered_types.sort_by_key(|t| (t.assembly, t.type_index));

        for type_id in &ordered_types {
            module.types.push(self.build_type(*type_id)?);
        }

        let mut ordered_methods: Vec<MethodId> = self.reachability.methods.iter().copied().collect();
        ordered_methods.sort_by_key(|m| (m.ty.assembly, m.ty.type_index, m.method_index));

        for method_id in &ordered_methods {
            module.methods.push(self.build_method(*method_id)?);
        }

        // Deduplicate string literals into the module's pool now that every
        // method has been lowered; `Ldstr` lowers a bare `Value::ConstString`
        // wherever it's consumed (a store, a call argument, a field write,
        // ...), so every instruction's operand values are swept rather than
        // matching one specific `Instr` shape.
        let literals: Vec<String> = module
            .methods
            .iter()
            .flat_map(|m| &m.blocks)
            .flat_map(|b| &b.instructions)
            .flat_map(instr_values)
            .filter_map(|v| match v {
                Value::ConstString(s) => Some(s.clone()),
                _ => None,
            })
            .collect();
        for literal in literals {
            module.intern_string(&literal);
        }

        Ok(module)
    }

    fn build_type(&mut self, type_id: TypeId) -> CompileResult<IRType> {
        let assembly = self.assemblies.get(type_id.assembly);
        let ty = &assembly.types[type_id.type_index];
        let full_name = ty.full_name();
        let runtime_provided = crate::runtime_types::is_runtime_provided(&full_name);
        let mangled_name = self.name_mapper.mangle_type(&ty.namespace, &ty.name);
        if ty.is_value_type {
            self.name_mapper.register_value_type(&mangled_name);
        }

        let fields = ty
            .fields
            .iter()
            .map(|f| IRField {
                mangled_name: self.name_mapper.mangle_member(&mangled_name, &f.name),
                is_static: f.flags.contains(crate::model::FieldAttributes::STATIC),
                value_kind: f.value_kind.clone(),
            })
            .collect();

        let vtable: Vec<MethodId> = ty
            .methods
            .iter()
            .enumerate()
            .filter(|(_, m)| m.is_virtual() && !m.is_abstract())
            .map(|(i, _)| MethodId { ty: type_id, method_index: i })
            .collect();

        let interface_impls = ty
            .interfaces
            .iter()
            .filter_map(|handle| self.resolve_local_or_known(type_id.assembly, handle))
            .map(|interface_id| {
                let interface_assembly = self.assemblies.get(interface_id.assembly);
                let interface_ty = &interface_assembly.types[interface_id.type_index];
                let slots = interface_ty
                    .methods
                    .iter()
                    .map(|im| {
                        let slot = ty.methods.iter().position(|m| m.name == im.name).map(|i| MethodId { ty: type_id, method_index: i });
                        if slot.is_none() {
                            self.diagnostics.warn(Warning {
                                symbol: SymbolRef::member_of(&assembly.name.name, full_name.clone(), &im.name),
                                message: format!("no method implements {}::{} on {full_name}", interface_ty.full_name(), im.name),
                            });
                        }
                        slot
                    })
                    .collect();
                InterfaceImpl { interface: interface_id, slots }
            })
            .collect();

        let static_constructor = ty
            .methods
            .iter()
            .position(|m| m.is_static_constructor())
            .map(|i| MethodId { ty: type_id, method_index: i });

        Ok(IRType {
            source: type_id,
            full_name,
            mangled_name,
            is_value_type: ty.is_value_type,
            base: ty.base_type.as_ref().and_then(|h| self.resolve_local_or_known(type_id.assembly, h)),
            fields,
            vtable,
            interface_impls,
            static_constructor,
            runtime_provided,
        })
    }

    fn resolve_local_or_known(&self, from_assembly: usize, handle: &crate::model::TypeHandle) -> Option<TypeId> {
        match handle {
            crate::model::TypeHandle::Local(index) => Some(TypeId { assembly: from_assembly, type_index: *index }),
            crate::model::TypeHandle::External { namespace, name, .. } => {
                self.reachability.types.iter().find(|t| {
                    let a = self.assemblies.get(t.assembly);
                    a.types[t.type_index].namespace == *namespace && a.types[t.type_index].name == *name
                }).copied()
            }
            crate::model::TypeHandle::Generic { base, .. } => self.resolve_local_or_known(from_assembly, base),
        }
    }

    fn build_method(&mut self, method_id: MethodId) -> CompileResult<IRMethod> {
        let assembly = self.assemblies.get(method_id.ty.assembly);
        let ty = &assembly.types[method_id.ty.type_index];
        let method = &ty.methods[method_id.method_index];
        let type_mangled = self.name_mapper.mangle_type(&ty.namespace, &ty.name);
        let mangled_name = self.name_mapper.mangle_member(&type_mangled, &method.name);

        let virtual_slot = method.is_virtual().then(|| {
            let slot_index = ty.methods.iter().take(method_id.method_index).filter(|m| m.is_virtual()).count();
            VirtualSlot { declaring_type: method_id.ty, slot_index }
        });

        let Some(body) = &method.body else {
            return Ok(IRMethod {
                source: method_id,
                mangled_name,
                parameter_count: method.signature.parameters.len(),
                local_count: 0,
                blocks: Vec::new(),
                exception_regions: Vec::new(),
                virtual_slot,
            });
        };

        let mut lowering = MethodLowering {
            assembly,
            method,
            method_id,
            assemblies: self.assemblies,
            reachability: self.reachability,
            name_mapper: self.name_mapper,
            intrinsics: self.intrinsics,
            diagnostics: self.diagnostics,
            next_register: 0,
        };
        let (blocks, exception_regions) = lowering.lower(body)?;

        Ok(IRMethod {
            source: method_id,
            mangled_name,
            parameter_count: method.signature.parameters.len(),
            local_count: body.locals.len(),
            blocks,
            exception_regions,
            virtual_slot,
        })
    }
}

struct MethodLowering<'a> {
    assembly: &'a Assembly,
    method: &'a MethodDef,
    method_id: MethodId,
    assemblies: &'a AssemblySet,
    reachability: &'a ReachabilityResult,
    name_mapper: &'a mut NameMapper,
    intrinsics: &'a IntrinsicCallRegistry,
    diagnostics: &'a mut Diagnostics,
    next_register: u32,
}

impl<'a> MethodLowering<'a> {
    fn fresh_register(&mut self) -> Register {
        let r = Register(self.next_register);
        self.next_register += 1;
        r
    }

    fn lower(&mut self, body: &crate::model::MethodBody) -> CompileResult<(Vec<BasicBlock>, Vec<ExceptionRegion>)> {
        let branch_targets = self.compute_branch_targets(&body.instructions);
        let mut leaders = self.compute_leaders(&body.instructions, &branch_targets);
        for handler in &body.exception_handlers {
            leaders.insert(handler.try_range.0);
            leaders.insert(handler.try_range.1);
            leaders.insert(handler.handler_range.0);
            leaders.insert(handler.handler_range.1);
            if let ExceptionHandlerKind::Filter { filter_offset } = &handler.kind {
                leaders.insert(*filter_offset);
            }
        }
        let mut blocks: Vec<BasicBlock> = Vec::new();
        let mut current = Vec::new();
        let mut current_id = BlockId(0);
        let mut current_offset = body.instructions.first().map(|i| i.offset).unwrap_or(0);
        let mut stack: Vec<Value> = Vec::new();
        let mut offset_to_block: FxHashMap<u32, BlockId> = FxHashMap::default();

        let mut sorted_leaders: Vec<u32> = leaders.into_iter().collect();
        sorted_leaders.sort_unstable();
        for (i, offset) in sorted_leaders.iter().enumerate() {
            offset_to_block.insert(*offset, BlockId(i as u32));
        }

        let mut block_index = 0usize;
        for (i, instr) in body.instructions.iter().enumerate() {
            if let Some(&block_id) = offset_to_block.get(&instr.offset) {
                if !current.is_empty() || block_index > 0 {
                    blocks.push(BasicBlock { id: current_id, start_offset: current_offset, instructions: std::mem::take(&mut current) });
                }
                current_id = block_id;
                current_offset = instr.offset;
                stack.clear();
                block_index += 1;
            }
            let fallthrough = body.instructions.get(i + 1).and_then(|n| offset_to_block.get(&n.offset)).copied();
            self.lower_instruction(instr, &mut stack, &mut current, &offset_to_block, &branch_targets, fallthrough)?;
        }
        blocks.push(BasicBlock { id: current_id, start_offset: current_offset, instructions: current });

        self.insert_exception_markers(body, &offset_to_block, &mut blocks);

        let exception_regions = body
            .exception_handlers
            .iter()
            .map(|h| ExceptionRegion {
                try_range: h.try_range,
                handler_range: h.handler_range,
                kind: match &h.kind {
                    ExceptionHandlerKind::Catch { exception_type } => RegionKind::Catch {
                        exception_type: self.resolve_type_name(exception_type),
                    },
                    ExceptionHandlerKind::Filter { filter_offset } => RegionKind::Filter {
                        filter_block: offset_to_block.get(filter_offset).copied().unwrap_or(BlockId(0)),
                    },
                    ExceptionHandlerKind::Finally => RegionKind::Finally,
                    ExceptionHandlerKind::Fault => RegionKind::Fault,
                },
            })
            .collect();

        Ok((blocks, exception_regions))
    }

    /// Splices `TryBegin`/`CatchBegin`/`FilterBegin`/`EndFilter`/`FinallyBegin`/
    /// `TryEnd` markers into the basic blocks that start at each handler's
    /// boundary offsets — `lower_instruction` never emits these on its own
    /// since they aren't CIL opcodes, only metadata-table entries
    /// (`model::ExceptionHandler`). Handlers sharing the same `try_range`
    /// (e.g. a filtered catch followed by a `finally` over the same
    /// protected block) get one `TryBegin` and one trailing `TryEnd`, the
    /// latter anchored to the last handler's `handler_range.1` so it closes
    /// the whole try/catch/finally construct rather than just the try body.
    fn insert_exception_markers(&self, body: &crate::model::MethodBody, offset_to_block: &FxHashMap<u32, BlockId>, blocks: &mut [BasicBlock]) {
        let mut try_ranges: Vec<(u32, u32)> = Vec::new();
        for handler in &body.exception_handlers {
            if !try_ranges.contains(&handler.try_range) {
                try_ranges.push(handler.try_range);
            }
        }

        for try_range in try_ranges {
            let handlers: Vec<(usize, &crate::model::ExceptionHandler)> =
                body.exception_handlers.iter().enumerate().filter(|(_, h)| h.try_range == try_range).collect();
            let Some(&(first_region, _)) = handlers.first() else { continue };
            self.prepend_markers(blocks, offset_to_block, try_range.0, vec![Instr::TryBegin { region: first_region }]);

            for &(region, handler) in &handlers {
                match &handler.kind {
                    ExceptionHandlerKind::Catch { exception_type } => {
                        let resolved = self.resolve_type_name(exception_type);
                        self.prepend_markers(
                            blocks,
                            offset_to_block,
                            handler.handler_range.0,
                            vec![Instr::CatchBegin { region, exception_type: resolved }],
                        );
                    }
                    ExceptionHandlerKind::Filter { filter_offset } => {
                        self.prepend_markers(blocks, offset_to_block, *filter_offset, vec![Instr::FilterBegin { region }]);
                        self.prepend_markers(
                            blocks,
                            offset_to_block,
                            handler.handler_range.0,
                            vec![Instr::EndFilter, Instr::CatchBegin { region, exception_type: None }],
                        );
                    }
                    ExceptionHandlerKind::Finally | ExceptionHandlerKind::Fault => {
                        self.prepend_markers(blocks, offset_to_block, handler.handler_range.0, vec![Instr::FinallyBegin { region }]);
                    }
                }
            }

            if let Some(&(last_region, last_handler)) = handlers.last() {
                self.prepend_markers(blocks, offset_to_block, last_handler.handler_range.1, vec![Instr::TryEnd { region: last_region }]);
            }
        }
    }

    fn prepend_markers(&self, blocks: &mut [BasicBlock], offset_to_block: &FxHashMap<u32, BlockId>, offset: u32, markers: Vec<Instr>) {
        let Some(&block_id) = offset_to_block.get(&offset) else { return };
        let Some(block) = blocks.iter_mut().find(|b| b.id == block_id) else { return };
        for marker in markers.into_iter().rev() {
            block.instructions.insert(0, marker);
        }
    }

    /// Resolves the `Operand::TypeName` the loader attached to a
    /// `newarr`/`box`/`unbox`/`unbox.any`/`castclass`/`isinst`/`initobj`
    /// instruction to the `TypeId` it names, warning (rather than
    /// substituting the enclosing method's own type) when it can't be
    /// matched against a reachable type.
    fn resolve_type_operand(&mut self, instr: &RawInstruction) -> Option<TypeId> {
        let Operand::TypeName(name) = &instr.operand else { return None };
        let resolved = self.resolve_type_name(name);
        if resolved.is_none() {
            let this_type = self.assembly.types[self.method_id.ty.type_index].full_name();
            self.diagnostics.warn(Warning {
                symbol: SymbolRef::member_of(&self.assembly.name.name, this_type, &self.method.name),
                message: format!("unresolved type operand '{name}' for opcode {:?}", instr.opcode),
            });
        }
        resolved
    }

    fn resolve_type_name(&self, name: &str) -> Option<TypeId> {
        if name.is_empty() {
            return None;
        }
        self.reachability.types.iter().find(|t| {
            let a = self.assemblies.get(t.assembly);
            a.types[t.type_index].full_name() == name
        }).copied()
    }

    /// Maps each branch/switch instruction's own offset to the absolute
    /// target offset(s) its delta(s) encode, resolved against the
    /// instruction immediately following it (ECMA-335 branch deltas are
    /// relative to the start of the *next* instruction, not the branch
    /// itself).
    fn compute_branch_targets(&self, instructions: &[RawInstruction]) -> FxHashMap<u32, Vec<u32>> {
        let mut targets = FxHashMap::default();
        for (i, instr) in instructions.iter().enumerate() {
            let next_offset = instructions.get(i + 1).map(|n| n.offset).unwrap_or(instr.offset);
            match &instr.operand {
                Operand::BranchTarget(delta) => {
                    targets.insert(instr.offset, vec![(next_offset as i64 + *delta as i64) as u32]);
                }
                Operand::Switch(deltas) => {
                    let resolved = deltas.iter().map(|d| (next_offset as i64 + *d as i64) as u32).collect();
                    targets.insert(instr.offset, resolved);
                }
                _ => {}
            }
        }
        targets
    }

    fn compute_leaders(&self, instructions: &[RawInstruction], branch_targets: &FxHashMap<u32, Vec<u32>>) -> BTreeSet<u32> {
        let mut leaders = BTreeSet::new();
        if let Some(first) = instructions.first() {
            leaders.insert(first.offset);
        }
        for (i, instr) in instructions.iter().enumerate() {
            if let Some(targets) = branch_targets.get(&instr.offset) {
                leaders.extend(targets.iter().copied());
                if let Some(next) = instructions.get(i + 1) {
                    leaders.insert(next.offset);
                }
            }
        }
        leaders
    }

    fn lower_instruction(
        &mut self,
        instr: &RawInstruction,
        stack: &mut Vec<Value>,
        out: &mut Vec<Instr>,
        offset_to_block: &FxHashMap<u32, BlockId>,
        branch_targets: &FxHashMap<u32, Vec<u32>>,
        fallthrough: Option<BlockId>,
    ) -> CompileResult<()> {
        let single_target = || {
            branch_targets
                .get(&instr.offset)
                .and_then(|t| t.first())
                .and_then(|offset| offset_to_block.get(offset))
                .copied()
                .unwrap_or(BlockId(0))
        };
        let fallthrough_or_zero = fallthrough.unwrap_or(BlockId(0));
        use OpCode as O;
        match &instr.opcode {
            O::Nop => out.push(Instr::Nop),
            O::Dup => stack.push(stack.last().cloned().unwrap_or(Value::Null)),
            O::Pop => {
                stack.pop();
            }
            O::LdnullOp => stack.push(Value::Null),
            O::LdcI4M1 => stack.push(Value::ConstI32(-1)),
            O::LdcI40 => stack.push(Value::ConstI32(0)),
            O::LdcI41 => stack.push(Value::ConstI32(1)),
            O::LdcI42 => stack.push(Value::ConstI32(2)),
            O::LdcI43 => stack.push(Value::ConstI32(3)),
            O::LdcI44 => stack.push(Value::ConstI32(4)),
            O::LdcI45 => stack.push(Value::ConstI32(5)),
            O::LdcI46 => stack.push(Value::ConstI32(6)),
            O::LdcI47 => stack.push(Value::ConstI32(7)),
            O::LdcI48 => stack.push(Value::ConstI32(8)),
            O::LdcI4S => stack.push(Value::ConstI32(operand_u8(instr) as i8 as i32)),
            O::LdcI4 => stack.push(Value::ConstI32(operand_i32(instr))),
            O::LdcI8 => stack.push(Value::ConstI64(operand_i64(instr))),
            O::LdcR4 => stack.push(Value::ConstF32(operand_f32(instr))),
            O::LdcR8 => stack.push(Value::ConstF64(operand_f64(instr))),
            O::Ldstr => {
                if let Operand::String(s) = &instr.operand {
                    stack.push(Value::ConstString(s.clone()));
                }
            }

            O::Ldarg0 => stack.push(self.load_arg(0, out)),
            O::Ldarg1 => stack.push(self.load_arg(1, out)),
            O::Ldarg2 => stack.push(self.load_arg(2, out)),
            O::Ldarg3 => stack.push(self.load_arg(3, out)),
            O::LdargS => stack.push(self.load_arg(operand_u8(instr) as u16, out)),
            O::Compound(CompoundOpCode::Ldarg) => stack.push(self.load_arg(operand_u16(instr), out)),

            O::Stloc0 => self.store_local(0, stack, out),
            O::Stloc1 => self.store_local(1, stack, out),
            O::Stloc2 => self.store_local(2, stack, out),
            O::Stloc3 => self.store_local(3, stack, out),
            O::StlocS => self.store_local(operand_u8(instr) as u16, stack, out),
            O::Compound(CompoundOpCode::Stloc) => self.store_local(operand_u16(instr), stack, out),

            O::Ldloc0 => stack.push(self.load_local(0, out)),
            O::Ldloc1 => stack.push(self.load_local(1, out)),
            O::Ldloc2 => stack.push(self.load_local(2, out)),
            O::Ldloc3 => stack.push(self.load_local(3, out)),
            O::LdlocS => stack.push(self.load_local(operand_u8(instr) as u16, out)),
            O::Compound(CompoundOpCode::Ldloc) => stack.push(self.load_local(operand_u16(instr), out)),

            O::StargS => {
                let value = stack.pop().unwrap_or(Value::Null);
                out.push(Instr::StoreArg { index: operand_u8(instr) as u16, value });
            }

            O::Add => self.binary(BinaryOp::Add, stack, out),
            O::Sub => self.binary(BinaryOp::Sub, stack, out),
            O::Mul => self.binary(BinaryOp::Mul, stack, out),
            O::Div => self.binary(BinaryOp::Div, stack, out),
            O::DivUn => self.binary(BinaryOp::DivUnsigned, stack, out),
            O::Rem => self.binary(BinaryOp::Rem, stack, out),
            O::RemUn => self.binary(BinaryOp::RemUnsigned, stack, out),
            O::And => self.binary(BinaryOp::And, stack, out),
            O::Or => self.binary(BinaryOp::Or, stack, out),
            O::Xor => self.binary(BinaryOp::Xor, stack, out),
            O::Shl => self.binary(BinaryOp::Shl, stack, out),
            O::Shr => self.binary(BinaryOp::Shr, stack, out),
            O::ShrUn => self.binary(BinaryOp::ShrUnsigned, stack, out),
            O::Compound(CompoundOpCode::Ceq) => self.binary(BinaryOp::Eq, stack, out),
            O::Compound(CompoundOpCode::Clt) => self.binary(BinaryOp::Lt, stack, out),
            O::Compound(CompoundOpCode::CltUn) => self.binary(BinaryOp::LtUnsigned, stack, out),
            O::Compound(CompoundOpCode::Cgt) => self.binary(BinaryOp::Gt, stack, out),
            O::Compound(CompoundOpCode::CgtUn) => self.binary(BinaryOp::GtUnsigned, stack, out),

            O::Neg => self.unary(UnaryOp::Neg, stack, out),
            O::Not => self.unary(UnaryOp::Not, stack, out),

            O::ConvI1 | O::ConvOvfI1 => self.convert(ConvertTarget::I1, stack, out),
            O::ConvI2 | O::ConvOvfI2 => self.convert(ConvertTarget::I2, stack, out),
            O::ConvI4 | O::ConvOvfI4 => self.convert(ConvertTarget::I4, stack, out),
            O::ConvI8 | O::ConvOvfI8 => self.convert(ConvertTarget::I8, stack, out),
            O::ConvU1 | O::ConvOvfU1 => self.convert(ConvertTarget::U1, stack, out),
            O::ConvU2 | O::ConvOvfU2 => self.convert(ConvertTarget::U2, stack, out),
            O::ConvU4 | O::ConvOvfU4 => self.convert(ConvertTarget::U4, stack, out),
            O::ConvU8 | O::ConvOvfU8 => self.convert(ConvertTarget::U8, stack, out),
            O::ConvR4 => self.convert(ConvertTarget::R4, stack, out),
            O::ConvR8 | O::ConvRUn => self.convert(ConvertTarget::R8, stack, out),

            O::Br | O::BrS => out.push(Instr::Branch { target: single_target() }),
            O::Leave | O::LeaveS => {
                stack.clear();
                out.push(Instr::Leave { target: single_target() });
            }
            O::Brfalse | O::BrfalseS => {
                let condition = stack.pop().unwrap_or(Value::Null);
                out.push(Instr::BranchIf { condition, when_true: fallthrough_or_zero, when_false: single_target() });
            }
            O::Brtrue | O::BrtrueS => {
                let condition = stack.pop().unwrap_or(Value::Null);
                out.push(Instr::BranchIf { condition, when_true: single_target(), when_false: fallthrough_or_zero });
            }
            O::Beq | O::BeqS | O::Bge | O::BgeS | O::Bgt | O::BgtS | O::Ble | O::BleS | O::Blt | O::BltS
            | O::BneUn | O::BneUnS | O::BgeUn | O::BgeUnS | O::BgtUn | O::BgtUnS | O::BleUn | O::BleUnS
            | O::BltUn | O::BltUnS => {
                let op = comparison_op(&instr.opcode);
                let rhs = stack.pop().unwrap_or(Value::Null);
                let lhs = stack.pop().unwrap_or(Value::Null);
                let dst = self.fresh_register();
                out.push(Instr::Binary { dst, op, lhs, rhs });
                out.push(Instr::BranchIf { condition: Value::Register(dst), when_true: single_target(), when_false: fallthrough_or_zero });
            }
            O::Switch => {
                if let Operand::Switch(_) = &instr.operand {
                    let selector = stack.pop().unwrap_or(Value::Null);
                    let targets = branch_targets
                        .get(&instr.offset)
                        .map(|offsets| offsets.iter().map(|o| offset_to_block.get(o).copied().unwrap_or(BlockId(0))).collect())
                        .unwrap_or_default();
                    out.push(Instr::Switch { selector, targets, default: fallthrough_or_zero });
                }
            }

            O::Ret => {
                let value = stack.pop();
                out.push(Instr::Return { value });
            }

            O::Call | O::Callvirt | O::Newobj => self.lower_call(instr, stack, out)?,

            O::Ldfld => {
                let object = stack.pop().unwrap_or(Value::Null);
                let dst = self.fresh_register();
                if let Some(field) = self.resolve_field(instr) {
                    out.push(Instr::NullCheck { value: object.clone() });
                    out.push(Instr::LoadField { dst, object, field });
                }
                stack.push(Value::Register(dst));
            }
            O::Stfld => {
                let value = stack.pop().unwrap_or(Value::Null);
                let object = stack.pop().unwrap_or(Value::Null);
                if let Some(field) = self.resolve_field(instr) {
                    out.push(Instr::NullCheck { value: object.clone() });
                    out.push(Instr::StoreField { object, field, value });
                }
            }
            O::Ldsfld => {
                let dst = self.fresh_register();
                if let Some(field) = self.resolve_field(instr) {
                    out.push(Instr::LoadStaticField { dst, field });
                }
                stack.push(Value::Register(dst));
            }
            O::Stsfld => {
                let value = stack.pop().unwrap_or(Value::Null);
                if let Some(field) = self.resolve_field(instr) {
                    out.push(Instr::StoreStaticField { field, value });
                }
            }
            O::Ldflda => {
                let object = stack.pop().unwrap_or(Value::Null);
                let dst = self.fresh_register();
                if let Some(field) = self.resolve_field(instr) {
                    out.push(Instr::NullCheck { value: object.clone() });
                    out.push(Instr::LoadFieldAddress { dst, object, field });
                }
                stack.push(Value::Register(dst));
            }
            O::Ldsflda => {
                let dst = self.fresh_register();
                if let Some(field) = self.resolve_field(instr) {
                    out.push(Instr::LoadStaticFieldAddress { dst, field });
                }
                stack.push(Value::Register(dst));
            }

            O::Newarr => {
                let length = stack.pop().unwrap_or(Value::Null);
                let dst = self.fresh_register();
                if let Some(element) = self.resolve_type_operand(instr) {
                    out.push(Instr::NewArray { dst, element, length });
                }
                stack.push(Value::Register(dst));
            }
            O::Ldlen => {
                let array = stack.pop().unwrap_or(Value::Null);
                let dst = self.fresh_register();
                out.push(Instr::ArrayLength { dst, array });
                stack.push(Value::Register(dst));
            }
            O::LdelemRef | O::LdelemI4 | O::LdelemI8 | O::LdelemI1 | O::LdelemI2 | O::Ldelem => {
                let index = stack.pop().unwrap_or(Value::Null);
                let array = stack.pop().unwrap_or(Value::Null);
                let dst = self.fresh_register();
                out.push(Instr::LoadElement { dst, array, index });
                stack.push(Value::Register(dst));
            }
            O::StelemRef | O::StelemI4 | O::StelemI8 | O::StelemI1 | O::StelemI2 | O::Stelem => {
                let value = stack.pop().unwrap_or(Value::Null);
                let index = stack.pop().unwrap_or(Value::Null);
                let array = stack.pop().unwrap_or(Value::Null);
                out.push(Instr::StoreElement { array, index, value });
            }

            O::Box => {
                let value = stack.pop().unwrap_or(Value::Null);
                let dst = self.fresh_register();
                if let Some(value_type) = self.resolve_type_operand(instr) {
                    out.push(Instr::Box { dst, value, value_type });
                }
                stack.push(Value::Register(dst));
            }
            O::Unbox | O::UnboxAny => {
                let value = stack.pop().unwrap_or(Value::Null);
                let dst = self.fresh_register();
                if let Some(target_type) = self.resolve_type_operand(instr) {
                    out.push(Instr::Unbox { dst, value, target_type });
                }
                stack.push(Value::Register(dst));
            }
            O::Castclass => {
                let value = stack.pop().unwrap_or(Value::Null);
                let dst = self.fresh_register();
                if let Some(target_type) = self.resolve_type_operand(instr) {
                    out.push(Instr::CastClass { dst, value, target_type });
                }
                stack.push(Value::Register(dst));
            }
            O::Isinst => {
                let value = stack.pop().unwrap_or(Value::Null);
                let dst = self.fresh_register();
                if let Some(target_type) = self.resolve_type_operand(instr) {
                    out.push(Instr::IsInstance { dst, value, target_type });
                }
                stack.push(Value::Register(dst));
            }

            O::Throw => {
                let exception = stack.pop().unwrap_or(Value::Null);
                out.push(Instr::Throw { exception });
            }
            O::Compound(CompoundOpCode::Rethrow) => out.push(Instr::Rethrow),
            O::Endfinally => out.push(Instr::EndFinally),
            O::Compound(CompoundOpCode::Endfilter) => {
                stack.pop();
            }

            O::Compound(CompoundOpCode::Ldftn) => self.lower_load_function_pointer(instr, None, stack, out),
            O::Compound(CompoundOpCode::Ldvirtftn) => {
                let receiver = stack.pop().unwrap_or(Value::Null);
                self.lower_load_function_pointer(instr, Some(receiver), stack, out);
            }
            O::Compound(CompoundOpCode::InitObj) => {
                let address = stack.pop().unwrap_or(Value::Null);
                if let Some(ty) = self.resolve_type_operand(instr) {
                    out.push(Instr::InitObj { address, ty });
                }
            }

            O::Break | O::Compound(_) => self.warn_unlowered(instr, out),
            _ => self.warn_unlowered(instr, out),
        }
        Ok(())
    }

    /// `spec.md` §4.3's "unsupported opcodes" handling: records a
    /// diagnostic warning and leaves a `WARNING`-tagged [`Instr::Comment`]
    /// in place of the dropped instruction so the gap is visible in the
    /// generated C++ too, not just the build log.
    fn warn_unlowered(&mut self, instr: &RawInstruction, out: &mut Vec<Instr>) {
        let message = format!("opcode {:?} is not lowered", instr.opcode);
        self.diagnostics.warn(Warning {
            symbol: SymbolRef::member_of(&self.assembly.name.name, self.assembly.types[self.method_id.ty.type_index].full_name(), &self.method.name),
            message: message.clone(),
        });
        out.push(Instr::Comment(format!("WARNING: {message}")));
    }

    fn load_arg(&mut self, index: u16, out: &mut Vec<Instr>) -> Value {
        let dst = self.fresh_register();
        out.push(Instr::LoadArg { dst, index });
        Value::Register(dst)
    }

    fn load_local(&mut self, index: u16, out: &mut Vec<Instr>) -> Value {
        let dst = self.fresh_register();
        out.push(Instr::LoadLocal { dst, index });
        Value::Register(dst)
    }

    fn store_local(&mut self, index: u16, stack: &mut Vec<Value>, out: &mut Vec<Instr>) {
        let value = stack.pop().unwrap_or(Value::Null);
        out.push(Instr::StoreLocal { index, value });
    }

    fn binary(&mut self, op: BinaryOp, stack: &mut Vec<Value>, out: &mut Vec<Instr>) {
        let rhs = stack.pop().unwrap_or(Value::Null);
        let lhs = stack.pop().unwrap_or(Value::Null);
        let dst = self.fresh_register();
        out.push(Instr::Binary { dst, op, lhs, rhs });
        stack.push(Value::Register(dst));
    }

    fn unary(&mut self, op: UnaryOp, stack: &mut Vec<Value>, out: &mut Vec<Instr>) {
        let operand = stack.pop().unwrap_or(Value::Null);
        let dst = self.fresh_register();
        out.push(Instr::Unary { dst, op, operand });
        stack.push(Value::Register(dst));
    }

    fn convert(&mut self, target: ConvertTarget, stack: &mut Vec<Value>, out: &mut Vec<Instr>) {
        let operand = stack.pop().unwrap_or(Value::Null);
        let dst = self.fresh_register();
        out.push(Instr::Convert { dst, operand, target });
        stack.push(Value::Register(dst));
    }

    /// `ty`'s base resolves to `System.MulticastDelegate`/`System.Delegate` by
    /// name alone — both are runtime-provided (`crate::runtime_types`) and
    /// never appear as a loaded `IRType`, so this can't go through the usual
    /// `TypeId` resolution the rest of the builder uses.
    fn is_delegate_type(ty: &crate::model::TypeDef) -> bool {
        matches!(
            &ty.base_type,
            Some(crate::model::TypeHandle::External { name, .. }) if name == "MulticastDelegate" || name == "Delegate"
        )
    }

    fn lower_load_function_pointer(&mut self, instr: &RawInstruction, receiver: Option<Value>, stack: &mut Vec<Value>, out: &mut Vec<Instr>) {
        let Operand::Token(token) = &instr.operand else { return };
        if token.kind() != MetadataTokenKind::MethodDef {
            return;
        }
        let target = self.assembly.types.iter().enumerate().find_map(|(type_index, t)| {
            t.methods.iter().position(|m| m.token == token.index() as u32).map(|method_index| MethodId {
                ty: TypeId { assembly: self.method_id.ty.assembly, type_index },
                method_index,
            })
        });
        if let Some(method) = target {
            let dst = self.fresh_register();
            out.push(Instr::LoadFunctionPointer { dst, method, receiver });
            stack.push(Value::Register(dst));
        }
    }

    fn resolve_field(&self, instr: &RawInstruction) -> Option<FieldRef> {
        let Operand::Token(token) = &instr.operand else { return None };
        if token.kind() != MetadataTokenKind::Field {
            return None;
        }
        // A `FieldDef` token always names a field on a type in the same
        // assembly (ECMA-335 §II.22.15); a cross-assembly field access goes
        // through a `MemberRef` instead, which this compiler does not yet
        // resolve to a concrete field (mirrors the `MemberRef` call
        // over-approximation in `reachability.rs`).
        self.assembly.types.iter().enumerate().find_map(|(type_index, t)| {
            t.fields.iter().position(|f| f.token == token.index() as u32).map(|field_index| FieldRef {
                declaring_type: TypeId { assembly: self.method_id.ty.assembly, type_index },
                field_index,
            })
        })
    }

    fn lower_call(&mut self, instr: &RawInstruction, stack: &mut Vec<Value>, out: &mut Vec<Instr>) -> CompileResult<()> {
        // A MemberRef target (cross-assembly, or a BCL intrinsic): the
        // loader has already resolved it to a declaring-type/method-name
        // pair where it could (`model::loader::resolve_member_ref`); check
        // the intrinsic registry before falling back to an unresolved-call
        // warning. An unresolved intrinsic is non-fatal, not a structural
        // error, since the compiled program may simply never execute that
        // path.
        if let Operand::MemberRef { declaring_type, method_name, arg_count, has_return } = &instr.operand {
            if let Some(target) = self.intrinsics.lookup(declaring_type, method_name) {
                let args = pop_n(stack, *arg_count);
                let dst = has_return.then(|| self.fresh_register());
                out.push(Instr::CallIntrinsic { dst, runtime_function: target.runtime_function, args });
                if let Some(dst) = dst {
                    stack.push(Value::Register(dst));
                }
            } else {
                let this_type = self.assembly.types[self.method_id.ty.type_index].full_name();
                self.diagnostics.warn(Warning {
                    symbol: SymbolRef::member_of(&self.assembly.name.name, this_type, &self.method.name),
                    message: format!("unresolved call to {declaring_type}::{method_name}"),
                });
            }
            return Ok(());
        }

        let Operand::Token(token) = &instr.operand else { return Ok(()) };

        if token.kind() == MetadataTokenKind::MethodDef {
            let target = self.assembly.types.iter().enumerate().find_map(|(type_index, t)| {
                t.methods.iter().position(|m| m.token == token.index() as u32).map(|method_index| MethodId {
                    ty: TypeId { assembly: self.method_id.ty.assembly, type_index },
                    method_index,
                })
            });
            if let Some(target) = target {
                let target_assembly = self.assemblies.get(target.ty.assembly);
                let declaring_ty = &target_assembly.types[target.ty.type_index];
                let target_method = &declaring_ty.methods[target.method_index];

                if Self::is_delegate_type(declaring_ty) {
                    if instr.opcode == OpCode::Newobj && target_method.is_constructor() {
                        let mut args = pop_n(stack, 2);
                        let function = args.pop().unwrap_or(Value::Null);
                        let object_target = args.pop().unwrap_or(Value::Null);
                        let dst = self.fresh_register();
                        out.push(Instr::DelegateCreate { dst, delegate_type: target.ty, target: object_target, function });
                        stack.push(Value::Register(dst));
                        return Ok(());
                    }
                    if target_method.name == "Invoke" {
                        let arg_count = target_method.signature.parameters.len() + 1;
                        let mut args = pop_n(stack, arg_count);
                        let delegate = args.remove(0);
                        let dst = (!matches!(target_method.signature.return_type, crate::raw::signature::TypeSignature::Void))
                            .then(|| self.fresh_register());
                        out.push(Instr::CallDelegate {
                            dst,
                            delegate,
                            args,
                            parameter_kinds: target_method.parameter_kinds.clone(),
                            return_kind: target_method.return_kind.clone(),
                        });
                        if let Some(dst) = dst {
                            stack.push(Value::Register(dst));
                        }
                        return Ok(());
                    }
                }

                let arg_count = target_method.signature.parameters.len() + if target_method.is_static() { 0 } else { 1 };
                let args = pop_n(stack, arg_count);
                let dst = if matches!(target_method.signature.return_type, crate::raw::signature::TypeSignature::Void) {
                    None
                } else {
                    Some(self.fresh_register())
                };

                let is_interface_dispatch = instr.opcode == OpCode::Callvirt && declaring_ty.is_interface();
                let is_virtual_dispatch = instr.opcode == OpCode::Callvirt && !declaring_ty.is_interface() && target_method.is_virtual();
                if is_interface_dispatch {
                    let receiver = args.first().cloned().unwrap_or(Value::Null);
                    out.push(Instr::NullCheck { value: receiver.clone() });
                    out.push(Instr::CallInterface {
                        dst,
                        interface: target.ty,
                        slot_index: target.method_index,
                        receiver,
                        args: args.into_iter().skip(1).collect(),
                    });
                } else if is_virtual_dispatch {
                    let slot_index = target_assembly.types[target.ty.type_index]
                        .methods
                        .iter()
                        .take(target.method_index)
                        .filter(|m| m.is_virtual())
                        .count();
                    let receiver = args.first().cloned().unwrap_or(Value::Null);
                    out.push(Instr::NullCheck { value: receiver.clone() });
                    out.push(Instr::CallVirtual {
                        dst,
                        slot: VirtualSlot { declaring_type: target.ty, slot_index },
                        receiver,
                        args: args.into_iter().skip(1).collect(),
                    });
                } else if instr.opcode == OpCode::Newobj {
                    let obj_dst = self.fresh_register();
                    out.push(Instr::NewObject { dst: obj_dst, ty: target.ty, ctor: target, args });
                    stack.push(Value::Register(obj_dst));
                    return Ok(());
                } else {
                    out.push(Instr::Call { dst, method: target, args });
                }
                if let Some(dst) = dst {
                    stack.push(Value::Register(dst));
                }
                return Ok(());
            }
        }

        let declaring_type = self.assembly.types[self.method_id.ty.type_index].full_name();
        self.diagnostics.warn(Warning {
            symbol: SymbolRef::member_of(&self.assembly.name.name, declaring_type, &self.method.name),
            message: format!("unresolved call target (token {:#x})", token.raw()),
        });
        Ok(())
    }
}

/// Every [`Value`] an instruction reads, flattening `args: Vec<Value>`
/// fields — used to sweep string literals into the module's pool after
/// lowering, and by the code generator to recover a method's register count.
pub(crate) fn instr_values(instr: &Instr) -> Vec<&Value> {
    match instr {
        Instr::Move { value, .. } => vec![value],
        Instr::Binary { lhs, rhs, .. } => vec![lhs, rhs],
        Instr::Unary { operand, .. } => vec![operand],
        Instr::Convert { operand, .. } => vec![operand],
        Instr::StoreArg { value, .. } => vec![value],
        Instr::StoreLocal { value, .. } => vec![value],
        Instr::LoadField { object, .. } => vec![object],
        Instr::StoreField { object, value, .. } => vec![object, value],
        Instr::StoreStaticField { value, .. } => vec![value],
        Instr::NewObject { args, .. } => args.iter().collect(),
        Instr::NewArray { length, .. } => vec![length],
        Instr::LoadElement { array, index, .. } => vec![array, index],
        Instr::StoreElement { array, index, value } => vec![array, index, value],
        Instr::ArrayLength { array, .. } => vec![array],
        Instr::Call { args, .. } => args.iter().collect(),
        Instr::CallVirtual { receiver, args, .. } => std::iter::once(receiver).chain(args.iter()).collect(),
        Instr::CallInterface { receiver, args, .. } => std::iter::once(receiver).chain(args.iter()).collect(),
        Instr::CallIntrinsic { args, .. } => args.iter().collect(),
        Instr::CallDelegate { delegate, args, .. } => std::iter::once(delegate).chain(args.iter()).collect(),
        Instr::LoadFunctionPointer { receiver, .. } => receiver.iter().collect(),
        Instr::DelegateCreate { target, function, .. } => vec![target, function],
        Instr::Box { value, .. } => vec![value],
        Instr::Unbox { value, .. } => vec![value],
        Instr::CastClass { value, .. } => vec![value],
        Instr::IsInstance { value, .. } => vec![value],
        Instr::LoadFieldAddress { object, .. } => vec![object],
        Instr::InitObj { address, .. } => vec![address],
        Instr::NullCheck { value } => vec![value],
        Instr::Throw { exception } => vec![exception],
        Instr::BranchIf { condition, .. } => vec![condition],
        Instr::Switch { selector, .. } => vec![selector],
        Instr::Return { value } => value.iter().collect(),
        _ => Vec::new(),
    }
}

fn pop_n(stack: &mut Vec<Value>, n: usize) -> Vec<Value> {
    let start = stack.len().saturating_sub(n);
    stack.split_off(start)
}

/// Maps a compare-and-branch opcode to the `BinaryOp` whose result the
/// following `BranchIf` reads as its condition — the comparison itself,
/// not its complement, so `Ge`/`Le`/`Ne` keep the equality case `Gt`/`Lt`
/// drop and `BneUn`'s "not equal" sense isn't inverted into "equal".
fn comparison_op(opcode: &OpCode) -> BinaryOp {
    use OpCode as O;
    match opcode {
        O::Beq | O::BeqS => BinaryOp::Eq,
        O::Bge | O::BgeS => BinaryOp::Ge,
        O::Bgt | O::BgtS => BinaryOp::Gt,
        O::Ble | O::BleS => BinaryOp::Le,
        O::Blt | O::BltS => BinaryOp::Lt,
        O::BneUn | O::BneUnS => BinaryOp::Ne,
        O::BgeUn | O::BgeUnS => BinaryOp::GeUnsigned,
        O::BgtUn | O::BgtUnS => BinaryOp::GtUnsigned,
        O::BleUn | O::BleUnS => BinaryOp::LeUnsigned,
        O::BltUn | O::BltUnS => BinaryOp::LtUnsigned,
        _ => BinaryOp::Eq,
    }
}

fn operand_u8(instr: &RawInstruction) -> u8 {
    match &instr.operand {
        Operand::UInt8(v) => *v,
        _ => 0,
    }
}

fn operand_u16(instr: &RawInstruction) -> u16 {
    match &instr.operand {
        Operand::Int32(v) => *v as u16,
        _ => 0,
    }
}

fn operand_i32(instr: &RawInstruction) -> i32 {
    match &instr.operand {
        Operand::Int32(v) => *v,
        _ => 0,
    }
}

fn operand_i64(instr: &RawInstruction) -> i64 {
    match &instr.operand {
        Operand::Int64(v) => *v,
        _ => 0,
    }
}

fn operand_f32(instr: &RawInstruction) -> f32 {
    match &instr.operand {
        Operand::Float32(v) => *v,
        _ => 0.0,
    }
}

fn operand_f64(instr: &RawInstruction) -> f64 {
    match &instr.operand {
        Operand::Float64(v) => *v,
        _ => 0.0,
    }
}
