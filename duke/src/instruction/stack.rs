//! Operand stack effects, and the computation of `max_stack` from them.
use anyhow::{anyhow, bail, Context, Result};
use crate::class_constants::opcode;
use crate::descriptor::{parse_field_descriptor, parse_method_descriptor};
use crate::instruction::decode::{self, RawInstruction};
use crate::pool::{ConstantPool, EntryValue, PoolEntry};

/// How many stack slots an instruction pops and pushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StackEffect {
	pub(crate) pop: u16,
	pub(crate) push: u16,
}

const fn effect(pop: u16, push: u16) -> StackEffect {
	StackEffect { pop, push }
}

/// The stack effect of the arithmetic opcodes `iadd` to `drem`, which come in groups of int, long, float and double.
fn arithmetic(op: u8) -> StackEffect {
	match (op - opcode::IADD) % 4 {
		0 | 2 => effect(2, 1),
		_ => effect(4, 2),
	}
}

/// Computes the stack effect of the instruction at `pos`, looking up descriptors in `pool`.
pub(crate) fn stack_effect(code: &[u8], pos: u32, raw: &RawInstruction, pool: &dyn ConstantPool) -> Result<StackEffect> {
	let op = raw.opcode;
	Ok(match op {
		opcode::NOP => effect(0, 0),
		opcode::ACONST_NULL..=opcode::ICONST_5 => effect(0, 1),
		opcode::LCONST_0 | opcode::LCONST_1 => effect(0, 2),
		opcode::FCONST_0..=opcode::FCONST_2 => effect(0, 1),
		opcode::DCONST_0 | opcode::DCONST_1 => effect(0, 2),
		opcode::BIPUSH | opcode::SIPUSH => effect(0, 1),
		opcode::LDC..=opcode::LDC2_W => {
			let index = decode::pool_index(code, pos, raw)?
				.with_context(|| anyhow!("instruction at bytecode offset {pos} has no constant pool index"))?;
			effect(0, if pool.entry_by_index(index)?.is_wide_constant() { 2 } else { 1 })
		},
		opcode::ILOAD | opcode::FLOAD | opcode::ALOAD => effect(0, 1),
		opcode::LLOAD | opcode::DLOAD => effect(0, 2),
		opcode::ILOAD_0..=opcode::ALOAD_3 => match (op - opcode::ILOAD_0) / 4 {
			1 | 3 => effect(0, 2),
			_ => effect(0, 1),
		},
		opcode::LALOAD | opcode::DALOAD => effect(2, 2),
		opcode::IALOAD..=opcode::SALOAD => effect(2, 1),
		opcode::ISTORE | opcode::FSTORE | opcode::ASTORE => effect(1, 0),
		opcode::LSTORE | opcode::DSTORE => effect(2, 0),
		opcode::ISTORE_0..=opcode::ASTORE_3 => match (op - opcode::ISTORE_0) / 4 {
			1 | 3 => effect(2, 0),
			_ => effect(1, 0),
		},
		opcode::LASTORE | opcode::DASTORE => effect(4, 0),
		opcode::IASTORE..=opcode::SASTORE => effect(3, 0),
		opcode::POP => effect(1, 0),
		opcode::POP2 => effect(2, 0),
		opcode::DUP => effect(1, 2),
		opcode::DUP_X1 => effect(2, 3),
		opcode::DUP_X2 => effect(3, 4),
		opcode::DUP2 => effect(2, 4),
		opcode::DUP2_X1 => effect(3, 5),
		opcode::DUP2_X2 => effect(4, 6),
		opcode::SWAP => effect(2, 2),
		opcode::IADD..=opcode::DREM => arithmetic(op),
		opcode::INEG | opcode::FNEG => effect(1, 1),
		opcode::LNEG | opcode::DNEG => effect(2, 2),
		opcode::ISHL | opcode::ISHR | opcode::IUSHR => effect(2, 1),
		opcode::LSHL | opcode::LSHR | opcode::LUSHR => effect(3, 2),
		opcode::IAND | opcode::IOR | opcode::IXOR => effect(2, 1),
		opcode::LAND | opcode::LOR | opcode::LXOR => effect(4, 2),
		opcode::IINC => effect(0, 0),
		opcode::I2L | opcode::I2D | opcode::F2L | opcode::F2D => effect(1, 2),
		opcode::I2F | opcode::F2I | opcode::I2B | opcode::I2C | opcode::I2S => effect(1, 1),
		opcode::L2I | opcode::L2F | opcode::D2I | opcode::D2F => effect(2, 1),
		opcode::L2D | opcode::D2L => effect(2, 2),
		opcode::LCMP | opcode::DCMPL | opcode::DCMPG => effect(4, 1),
		opcode::FCMPL | opcode::FCMPG => effect(2, 1),
		opcode::IFEQ..=opcode::IFLE => effect(1, 0),
		opcode::IF_ICMPEQ..=opcode::IF_ACMPNE => effect(2, 0),
		opcode::GOTO | opcode::GOTO_W => effect(0, 0),
		opcode::JSR | opcode::JSR_W => effect(0, 1),
		opcode::RET => effect(0, 0),
		opcode::TABLESWITCH | opcode::LOOKUPSWITCH => effect(1, 0),
		opcode::IRETURN | opcode::FRETURN | opcode::ARETURN => effect(1, 0),
		opcode::LRETURN | opcode::DRETURN => effect(2, 0),
		opcode::RETURN => effect(0, 0),
		opcode::GETSTATIC..=opcode::PUTFIELD => {
			let entry = entry(code, pos, raw, pool)?;
			let size = parse_field_descriptor(entry.member_descriptor()?)?.slot_size();
			match op {
				opcode::GETSTATIC => effect(0, size),
				opcode::PUTSTATIC => effect(size, 0),
				opcode::GETFIELD => effect(1, size),
				_ => effect(1 + size, 0),
			}
		},
		opcode::INVOKEVIRTUAL..=opcode::INVOKEDYNAMIC => {
			let entry = entry(code, pos, raw, pool)?;
			let descriptor = parse_method_descriptor(entry.member_descriptor()?)?;
			let receiver = if matches!(op, opcode::INVOKESTATIC | opcode::INVOKEDYNAMIC) { 0 } else { 1 };
			effect(descriptor.arguments_size() + receiver, descriptor.return_size())
		},
		opcode::NEW => effect(0, 1),
		opcode::NEWARRAY | opcode::ANEWARRAY | opcode::ARRAYLENGTH => effect(1, 1),
		opcode::ATHROW => effect(1, 0),
		opcode::CHECKCAST | opcode::INSTANCEOF => effect(1, 1),
		opcode::MONITORENTER | opcode::MONITOREXIT => effect(1, 0),
		opcode::MULTIANEWARRAY => effect(decode::u8_at(code, pos + 3)? as u16, 1),
		opcode::IFNULL | opcode::IFNONNULL => effect(1, 0),
		x => bail!("no stack effect for opcode {x:#x} at bytecode offset {pos}"),
	})
}

fn entry(code: &[u8], pos: u32, raw: &RawInstruction, pool: &dyn ConstantPool) -> Result<PoolEntry> {
	let index = decode::pool_index(code, pos, raw)?
		.with_context(|| anyhow!("instruction at bytecode offset {pos} has no constant pool index"))?;
	let entry = pool.entry_by_index(index)?;
	if matches!(entry.value(), EntryValue::InvokeDynamic { .. } | EntryValue::FieldRef { .. } |
		EntryValue::MethodRef { .. } | EntryValue::InterfaceMethodRef { .. }) {
		Ok(entry)
	} else {
		bail!("instruction at bytecode offset {pos} references {entry:?}, expected a member reference")
	}
}

/// The result of following all paths through some code.
#[derive(Debug, Clone)]
pub(crate) struct StackAnalysis {
	pub(crate) max_stack: u16,
	/// The stack depth before each instruction, [`None`] for unreachable bytecode offsets.
	pub(crate) depths: Vec<Option<u16>>,
}

/// Follows every path through `code`, starting at `0` with an empty stack, and at each of the `handlers` with the
/// exception on the stack.
///
/// Fails if the stack underflows, if two paths meet with different depths, or if execution falls off the end of the
/// code.
pub(crate) fn analyze(code: &[u8], handlers: &[u32], pool: &dyn ConstantPool) -> Result<StackAnalysis> {
	let mut depths: Vec<Option<u16>> = vec![None; code.len()];
	let mut worklist: Vec<(i64, u16, u32)> = vec![(0, 0, 0)];
	worklist.extend(handlers.iter().map(|&handler| (handler as i64, 1, handler)));
	let mut max_stack = 0;

	while let Some((pos, depth, from)) = worklist.pop() {
		if pos < 0 || pos >= code.len() as i64 {
			bail!("jump from bytecode offset {from} to {pos} out of bounds for code length {}", code.len());
		}
		let pos = pos as u32;
		match depths[pos as usize] {
			Some(known) if known == depth => continue,
			Some(known) => bail!("inconsistent stack depth at bytecode offset {pos}: {known} and {depth} (coming from {from})"),
			None => depths[pos as usize] = Some(depth),
		}

		let raw = decode::read_instruction(code, pos)?;
		let effect = stack_effect(code, pos, &raw, pool)?;
		let after = depth.checked_sub(effect.pop)
			.ok_or_else(|| anyhow!("stack underflow at bytecode offset {pos}: popping {} from a depth of {depth}", effect.pop))?
			.checked_add(effect.push)
			.ok_or_else(|| anyhow!("stack overflow at bytecode offset {pos}"))?;
		max_stack = max_stack.max(depth).max(after);

		for target in decode::branch_targets(code, pos, &raw)? {
			worklist.push((target, after, pos));
		}
		if !decode::ends_flow(raw.opcode) {
			let next = pos + raw.size;
			if next as usize >= code.len() {
				bail!("execution falls off the end of the code after bytecode offset {pos}");
			}
			// the return address pushed by jsr is consumed by the subroutine
			let next_depth = if matches!(raw.opcode, opcode::JSR | opcode::JSR_W) { depth } else { after };
			worklist.push((next as i64, next_depth, pos));
		}
	}

	Ok(StackAnalysis { max_stack, depths })
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use crate::class_constants::opcode;
	use crate::class_constants::pool::method_handle_reference;
	use crate::instruction::stack::analyze;
	use crate::pool::builder::PoolBuilder;
	use crate::pool::{BootstrapMethod, ConstantPool};

	#[test]
	fn straight_line() -> Result<()> {
		let pool = PoolBuilder::new();
		let code = [opcode::LCONST_1, opcode::LCONST_1, opcode::LADD, opcode::L2I, opcode::IRETURN];
		let analysis = analyze(&code, &[], &pool)?;
		assert_eq!(analysis.max_stack, 4);
		assert_eq!(analysis.depths, vec![Some(0), Some(2), Some(4), Some(2), Some(1)]);
		Ok(())
	}

	#[test]
	fn branches_and_handlers() -> Result<()> {
		let pool = PoolBuilder::new();
		// 0: iconst_0, 1: ifeq +5, 4: iconst_1, 5: ireturn, 6: iconst_2, 7: ireturn, 8: athrow
		let code = [
			opcode::ICONST_0, opcode::IFEQ, 0, 5, opcode::ICONST_1, opcode::IRETURN,
			opcode::ICONST_2, opcode::IRETURN, opcode::ATHROW,
		];
		let analysis = analyze(&code, &[8], &pool)?;
		assert_eq!(analysis.max_stack, 1);
		assert_eq!(analysis.depths[6], Some(0));
		assert_eq!(analysis.depths[8], Some(1));
		Ok(())
	}

	#[test]
	fn field_and_invoke_descriptors() -> Result<()> {
		let mut pool = PoolBuilder::new();
		let field = pool.field_ref("A", "f", "J")?;
		let method = pool.method_ref("A", "m", "(JLjava/lang/String;)D")?;
		let [f_high, f_low] = field.index().to_be_bytes();
		let [m_high, m_low] = method.index().to_be_bytes();
		let code = [
			opcode::GETSTATIC, f_high, f_low,
			opcode::ACONST_NULL,
			opcode::INVOKESTATIC, m_high, m_low,
			opcode::DRETURN,
		];
		let analysis = analyze(&code, &[], &pool)?;
		assert_eq!(analysis.max_stack, 3);
		assert_eq!(analysis.depths[7], Some(2));
		assert!(pool.entry_count() > 1);
		Ok(())
	}

	#[test]
	fn wide_dynamic_constant() -> Result<()> {
		let mut pool = PoolBuilder::new();
		let factory = pool.method_ref("Constants", "make", "()J")?;
		let handle = pool.method_handle_entry(method_handle_reference::INVOKE_STATIC, &factory)?;
		let bootstrap = BootstrapMethod { handle, arguments: Vec::new() };
		let name_and_type = pool.name_and_type("value", "J")?;
		let entry = pool.constant_dynamic_entry(&bootstrap, &name_and_type)?;
		let [high, low] = entry.index().to_be_bytes();
		let code = [opcode::LDC2_W, high, low, opcode::LRETURN];
		let analysis = analyze(&code, &[], &pool)?;
		assert_eq!(analysis.max_stack, 2);
		assert_eq!(analysis.depths[3], Some(2));
		Ok(())
	}

	#[test]
	fn errors() {
		let pool = PoolBuilder::new();
		assert!(analyze(&[opcode::POP, opcode::RETURN], &[], &pool).is_err());
		assert!(analyze(&[opcode::NOP], &[], &pool).is_err());
		// 0: iconst_0, 1: iconst_0, 2: ifeq -2 meets depth 1 at 0 again
		assert!(analyze(&[opcode::ICONST_0, opcode::ICONST_0, opcode::IFEQ, 0xff, 0xfe, opcode::RETURN], &[], &pool).is_err());
	}
}
