//! Reading instructions from the bytes of a code array.
use anyhow::{anyhow, bail, Context, Result};
use crate::class_constants::{opcode, pool};
use crate::instruction::{switch_padding, Instruction, SwitchCase, TypeKind};
use crate::label::{Label, LabelContext};
use crate::pool::{ConstantPool, PoolEntry};

/// The opcode and size of an instruction. For `wide` instructions, `opcode` is the widened opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RawInstruction {
	pub(crate) opcode: u8,
	pub(crate) wide: bool,
	pub(crate) size: u32,
}

fn slice<const N: usize>(code: &[u8], pos: u32) -> Result<[u8; N]> {
	(pos as usize).checked_add(N)
		.and_then(|end| code.get(pos as usize..end))
		.and_then(|slice| <[u8; N]>::try_from(slice).ok())
		.ok_or_else(|| anyhow!("instruction reaches past the end of the code at bytecode offset {pos}"))
}

pub(crate) fn u8_at(code: &[u8], pos: u32) -> Result<u8> {
	slice::<1>(code, pos).map(|[x]| x)
}
pub(crate) fn u16_at(code: &[u8], pos: u32) -> Result<u16> {
	slice(code, pos).map(u16::from_be_bytes)
}
pub(crate) fn i16_at(code: &[u8], pos: u32) -> Result<i16> {
	slice(code, pos).map(i16::from_be_bytes)
}
pub(crate) fn i32_at(code: &[u8], pos: u32) -> Result<i32> {
	slice(code, pos).map(i32::from_be_bytes)
}

/// Reads the opcode at `pos` and computes the size of the instruction there.
///
/// Fails for unknown opcodes, for `wide` with an opcode that can't be widened, for switches with `low > high` or a
/// negative number of pairs, and for instructions reaching past the end of `code`.
pub(crate) fn read_instruction(code: &[u8], pos: u32) -> Result<RawInstruction> {
	let op = u8_at(code, pos)?;
	let (opcode, wide, size) = match op {
		opcode::WIDE => {
			let widened = u8_at(code, pos + 1)?;
			match widened {
				opcode::ILOAD..=opcode::ALOAD | opcode::ISTORE..=opcode::ASTORE | opcode::RET => (widened, true, 4),
				opcode::IINC => (widened, true, 6),
				x => bail!("unknown wide opcode {x:#x} at bytecode offset {pos}"),
			}
		},
		opcode::TABLESWITCH => {
			let operands = pos + 1 + switch_padding(pos);
			let low = i32_at(code, operands + 4)?;
			let high = i32_at(code, operands + 8)?;
			if low > high {
				bail!("tableswitch at bytecode offset {pos} has low {low} > high {high}");
			}
			let count = high as i64 - low as i64 + 1;
			(op, false, (1 + switch_padding(pos) as i64 + 12 + 4 * count).min(u32::MAX as i64) as u32)
		},
		opcode::LOOKUPSWITCH => {
			let operands = pos + 1 + switch_padding(pos);
			let npairs = i32_at(code, operands + 4)?;
			if npairs < 0 {
				bail!("lookupswitch at bytecode offset {pos} has negative number of pairs {npairs}");
			}
			(op, false, (1 + switch_padding(pos) as i64 + 8 + 8 * npairs as i64).min(u32::MAX as i64) as u32)
		},
		opcode::NOP..=opcode::DCONST_1 => (op, false, 1),
		opcode::BIPUSH => (op, false, 2),
		opcode::SIPUSH => (op, false, 3),
		opcode::LDC => (op, false, 2),
		opcode::LDC_W | opcode::LDC2_W => (op, false, 3),
		opcode::ILOAD..=opcode::ALOAD => (op, false, 2),
		opcode::ILOAD_0..=opcode::SALOAD => (op, false, 1),
		opcode::ISTORE..=opcode::ASTORE => (op, false, 2),
		opcode::ISTORE_0..=opcode::LXOR => (op, false, 1),
		opcode::IINC => (op, false, 3),
		opcode::I2L..=opcode::DCMPG => (op, false, 1),
		opcode::IFEQ..=opcode::JSR => (op, false, 3),
		opcode::RET => (op, false, 2),
		opcode::IRETURN..=opcode::RETURN => (op, false, 1),
		opcode::GETSTATIC..=opcode::INVOKESTATIC => (op, false, 3),
		opcode::INVOKEINTERFACE | opcode::INVOKEDYNAMIC => (op, false, 5),
		opcode::NEW => (op, false, 3),
		opcode::NEWARRAY => (op, false, 2),
		opcode::ANEWARRAY => (op, false, 3),
		opcode::ARRAYLENGTH | opcode::ATHROW => (op, false, 1),
		opcode::CHECKCAST | opcode::INSTANCEOF => (op, false, 3),
		opcode::MONITORENTER | opcode::MONITOREXIT => (op, false, 1),
		opcode::MULTIANEWARRAY => (op, false, 4),
		opcode::IFNULL | opcode::IFNONNULL => (op, false, 3),
		opcode::GOTO_W | opcode::JSR_W => (op, false, 5),
		x => bail!("unknown opcode {x:#x} at bytecode offset {pos}"),
	};

	if pos as u64 + size as u64 > code.len() as u64 {
		bail!("instruction {} at bytecode offset {pos} with size {size} reaches past the end of the code (length {})",
			opcode::name(opcode).unwrap_or("?"), code.len());
	}

	Ok(RawInstruction { opcode, wide, size })
}

/// Whether execution can't continue with the next instruction.
pub(crate) fn ends_flow(opcode: u8) -> bool {
	matches!(opcode,
		opcode::GOTO | opcode::GOTO_W | opcode::TABLESWITCH | opcode::LOOKUPSWITCH | opcode::ATHROW | opcode::RET |
		opcode::IRETURN..=opcode::RETURN
	)
}

pub(crate) fn has_label(opcode: u8) -> bool {
	matches!(opcode,
		opcode::IFEQ..=opcode::JSR | opcode::IFNULL..=opcode::JSR_W | opcode::TABLESWITCH | opcode::LOOKUPSWITCH
	)
}

/// The absolute bytecode offsets this instruction may jump to, default target first for switches.
pub(crate) fn branch_targets(code: &[u8], pos: u32, raw: &RawInstruction) -> Result<Vec<i64>> {
	let pos_i = pos as i64;
	Ok(match raw.opcode {
		opcode::IFEQ..=opcode::JSR | opcode::IFNULL | opcode::IFNONNULL => {
			vec![pos_i + i16_at(code, pos + 1)? as i64]
		},
		opcode::GOTO_W | opcode::JSR_W => vec![pos_i + i32_at(code, pos + 1)? as i64],
		opcode::TABLESWITCH => {
			let operands = pos + 1 + switch_padding(pos);
			let default = i32_at(code, operands)?;
			let low = i32_at(code, operands + 4)?;
			let high = i32_at(code, operands + 8)?;
			let count = (high as i64 - low as i64 + 1) as u32;
			let mut targets = Vec::with_capacity(count as usize + 1);
			targets.push(pos_i + default as i64);
			for i in 0..count {
				targets.push(pos_i + i32_at(code, operands + 12 + 4 * i)? as i64);
			}
			targets
		},
		opcode::LOOKUPSWITCH => {
			let operands = pos + 1 + switch_padding(pos);
			let default = i32_at(code, operands)?;
			let npairs = i32_at(code, operands + 4)? as u32;
			let mut targets = Vec::with_capacity(npairs as usize + 1);
			targets.push(pos_i + default as i64);
			for i in 0..npairs {
				targets.push(pos_i + i32_at(code, operands + 8 + 8 * i + 4)? as i64);
			}
			targets
		},
		_ => Vec::new(),
	})
}

/// Gets the constant pool index an instruction references, if it references one.
pub(crate) fn pool_index(code: &[u8], pos: u32, raw: &RawInstruction) -> Result<Option<u16>> {
	Ok(match raw.opcode {
		opcode::LDC => Some(u8_at(code, pos + 1)? as u16),
		opcode::LDC_W | opcode::LDC2_W |
		opcode::GETSTATIC..=opcode::INVOKEDYNAMIC |
		opcode::NEW | opcode::ANEWARRAY | opcode::CHECKCAST | opcode::INSTANCEOF | opcode::MULTIANEWARRAY => {
			Some(u16_at(code, pos + 1)?)
		},
		_ => None,
	})
}

/// The local variable slot an instruction uses, if it uses one.
pub(crate) fn local_slot(code: &[u8], pos: u32, raw: &RawInstruction) -> Result<Option<u16>> {
	Ok(match raw.opcode {
		opcode::ILOAD..=opcode::ALOAD | opcode::ISTORE..=opcode::ASTORE | opcode::IINC | opcode::RET if raw.wide => {
			Some(u16_at(code, pos + 2)?)
		},
		opcode::ILOAD..=opcode::ALOAD | opcode::ISTORE..=opcode::ASTORE | opcode::IINC | opcode::RET => {
			Some(u8_at(code, pos + 1)? as u16)
		},
		op @ opcode::ILOAD_0..=opcode::ALOAD_3 => Some(((op - opcode::ILOAD_0) % 4) as u16),
		op @ opcode::ISTORE_0..=opcode::ASTORE_3 => Some(((op - opcode::ISTORE_0) % 4) as u16),
		_ => None,
	})
}

fn entry_with_tags(pool: &dyn ConstantPool, index: u16, tags: &[u8], what: &str) -> Result<PoolEntry> {
	let entry = pool.entry_by_index(index)?;
	if !tags.contains(&entry.tag()) {
		entry.expect_tag(tags[0])
			.with_context(|| anyhow!("wrong constant pool entry for {what}"))?;
	}
	Ok(entry)
}

fn switch_target(context: LabelContext, pos: u32, offset: i32, code_len: usize) -> Result<Label> {
	target_label(context, pos as i64 + offset as i64, code_len)
}

fn target_label(context: LabelContext, target: i64, code_len: usize) -> Result<Label> {
	if target < 0 || target >= code_len as i64 {
		bail!("branch target {target} out of bounds for code length {code_len}");
	}
	Ok(Label::read(context, target as u32))
}

/// Decodes the instruction at `pos` into an [`Instruction`].
///
/// Branch targets become labels of `context`, constant pool references are resolved with `pool`.
pub(crate) fn decode(
	code: &[u8],
	pos: u32,
	raw: &RawInstruction,
	context: LabelContext,
	pool: &dyn ConstantPool,
) -> Result<Instruction> {
	let op = raw.opcode;
	let name = opcode::name(op).unwrap_or("?");
	let index = || -> Result<u16> { pool_index(code, pos, raw)?.ok_or_else(|| anyhow!("{name} has no pool index")) };
	let slot = || -> Result<u16> { local_slot(code, pos, raw)?.ok_or_else(|| anyhow!("{name} has no local variable")) };

	let instruction = match op {
		opcode::NOP => Instruction::Nop,
		opcode::ACONST_NULL..=opcode::DCONST_1 => Instruction::ConstantIntrinsic { opcode: op },
		opcode::BIPUSH => Instruction::ConstantArgument { opcode: op, value: u8_at(code, pos + 1)? as i8 as i16 },
		opcode::SIPUSH => Instruction::ConstantArgument { opcode: op, value: i16_at(code, pos + 1)? },
		opcode::LDC..=opcode::LDC2_W => {
			let entry = pool.entry_by_index(index()?)?;
			if !entry.is_loadable() {
				bail!("{name} at bytecode offset {pos} loads the non-loadable entry {entry:?}");
			}
			if (op == opcode::LDC2_W) != entry.is_wide_constant() {
				bail!("{name} at bytecode offset {pos} can't load {entry:?}");
			}
			Instruction::ConstantLoad { entry }
		},
		opcode::ILOAD..=opcode::ALOAD | opcode::ILOAD_0..=opcode::ALOAD_3 => {
			let ordinal = if op <= opcode::ALOAD { op - opcode::ILOAD } else { (op - opcode::ILOAD_0) / 4 };
			let kind = TypeKind::from_ordinal(ordinal).with_context(|| anyhow!("no load kind for {name}"))?;
			Instruction::Load { kind, slot: slot()? }
		},
		opcode::IALOAD..=opcode::SALOAD => Instruction::ArrayLoad { opcode: op },
		opcode::ISTORE..=opcode::ASTORE | opcode::ISTORE_0..=opcode::ASTORE_3 => {
			let ordinal = if op <= opcode::ASTORE { op - opcode::ISTORE } else { (op - opcode::ISTORE_0) / 4 };
			let kind = TypeKind::from_ordinal(ordinal).with_context(|| anyhow!("no store kind for {name}"))?;
			Instruction::Store { kind, slot: slot()? }
		},
		opcode::IASTORE..=opcode::SASTORE => Instruction::ArrayStore { opcode: op },
		opcode::POP..=opcode::SWAP => Instruction::Stack { opcode: op },
		opcode::IADD..=opcode::LXOR | opcode::LCMP..=opcode::DCMPG | opcode::ARRAYLENGTH => Instruction::Operator { opcode: op },
		opcode::IINC if raw.wide => Instruction::Increment { slot: slot()?, constant: i16_at(code, pos + 4)? },
		opcode::IINC => Instruction::Increment { slot: slot()?, constant: u8_at(code, pos + 2)? as i8 as i16 },
		opcode::I2L..=opcode::I2S => Instruction::Convert { opcode: op },
		opcode::IFEQ..=opcode::JSR | opcode::IFNULL..=opcode::JSR_W => {
			let target = branch_targets(code, pos, raw)?;
			let target = target.first().copied().with_context(|| anyhow!("{name} without target"))?;
			Instruction::Branch { opcode: op, target: target_label(context, target, code.len())? }
		},
		opcode::RET => Instruction::Ret { slot: slot()? },
		opcode::TABLESWITCH => {
			let operands = pos + 1 + switch_padding(pos);
			let default_offset = i32_at(code, operands)?;
			let default = switch_target(context, pos, default_offset, code.len())?;
			let low = i32_at(code, operands + 4)?;
			let high = i32_at(code, operands + 8)?;
			let mut cases = Vec::new();
			for (i, value) in (low..=high).enumerate() {
				let offset = i32_at(code, operands + 12 + 4 * i as u32)?;
				let target = switch_target(context, pos, offset, code.len())?;
				if target != default {
					cases.push(SwitchCase { value, target });
				}
			}
			Instruction::TableSwitch { low, high, default, cases }
		},
		opcode::LOOKUPSWITCH => {
			let operands = pos + 1 + switch_padding(pos);
			let default = switch_target(context, pos, i32_at(code, operands)?, code.len())?;
			let npairs = i32_at(code, operands + 4)? as u32;
			let mut cases = Vec::with_capacity(npairs as usize);
			for i in 0..npairs {
				let value = i32_at(code, operands + 8 + 8 * i)?;
				let target = switch_target(context, pos, i32_at(code, operands + 12 + 8 * i)?, code.len())?;
				cases.push(SwitchCase { value, target });
			}
			Instruction::LookupSwitch { default, cases }
		},
		opcode::IRETURN..=opcode::ARETURN => {
			let kind = TypeKind::from_ordinal(op - opcode::IRETURN).with_context(|| anyhow!("no return kind for {name}"))?;
			Instruction::Return { kind: Some(kind) }
		},
		opcode::RETURN => Instruction::Return { kind: None },
		opcode::GETSTATIC..=opcode::PUTFIELD => Instruction::Field {
			opcode: op,
			field: entry_with_tags(pool, index()?, &[pool::FIELD_REF], name)?,
		},
		opcode::INVOKEVIRTUAL => Instruction::Invoke {
			opcode: op,
			method: entry_with_tags(pool, index()?, &[pool::METHOD_REF], name)?,
		},
		opcode::INVOKESPECIAL | opcode::INVOKESTATIC => Instruction::Invoke {
			opcode: op,
			method: entry_with_tags(pool, index()?, &[pool::METHOD_REF, pool::INTERFACE_METHOD_REF], name)?,
		},
		opcode::INVOKEINTERFACE => Instruction::Invoke {
			opcode: op,
			method: entry_with_tags(pool, index()?, &[pool::INTERFACE_METHOD_REF], name)?,
		},
		opcode::INVOKEDYNAMIC => Instruction::InvokeDynamic {
			entry: entry_with_tags(pool, index()?, &[pool::INVOKE_DYNAMIC], name)?,
		},
		opcode::NEW => Instruction::NewObject { class: entry_with_tags(pool, index()?, &[pool::CLASS], name)? },
		opcode::NEWARRAY => Instruction::NewPrimitiveArray { array_type: u8_at(code, pos + 1)? },
		opcode::ANEWARRAY => Instruction::NewReferenceArray { class: entry_with_tags(pool, index()?, &[pool::CLASS], name)? },
		opcode::ATHROW => Instruction::Throw,
		opcode::CHECKCAST | opcode::INSTANCEOF => Instruction::TypeCheck {
			opcode: op,
			class: entry_with_tags(pool, index()?, &[pool::CLASS], name)?,
		},
		opcode::MONITORENTER | opcode::MONITOREXIT => Instruction::Monitor { opcode: op },
		opcode::MULTIANEWARRAY => Instruction::NewMultiArray {
			class: entry_with_tags(pool, index()?, &[pool::CLASS], name)?,
			dimensions: u8_at(code, pos + 3)?,
		},
		x => bail!("unknown opcode {x:#x} at bytecode offset {pos}"),
	};
	Ok(instruction)
}
