//! The instruction model.
//!
//! An instruction is either an [`Instruction`], holding its operands as values, or a [`BoundInstruction`], a view on
//! the bytes of a code attribute that was read. [`Insn`] is either one of them.
use std::fmt::{Debug, Formatter};
use anyhow::Result;
use crate::class_constants::opcode;
use crate::label::Label;
use crate::pool::{EntryValue, PoolEntry};
use crate::pool::builder::PoolBuilder;
use crate::writer::code::CodeWriter;

pub(crate) mod bound;
pub(crate) mod decode;
pub(crate) mod stack;

pub use bound::BoundInstruction;

/// The type of the value a load, store or return instruction works with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
	Int,
	Long,
	Float,
	Double,
	Reference,
}

impl TypeKind {
	/// Same order as the opcodes: `iload`, `lload`, `fload`, `dload`, `aload`.
	fn ordinal(self) -> u8 {
		match self {
			TypeKind::Int => 0,
			TypeKind::Long => 1,
			TypeKind::Float => 2,
			TypeKind::Double => 3,
			TypeKind::Reference => 4,
		}
	}

	pub(crate) fn from_ordinal(ordinal: u8) -> Option<TypeKind> {
		Some(match ordinal {
			0 => TypeKind::Int,
			1 => TypeKind::Long,
			2 => TypeKind::Float,
			3 => TypeKind::Double,
			4 => TypeKind::Reference,
			_ => return None,
		})
	}

	pub fn slot_size(self) -> u16 {
		match self {
			TypeKind::Long | TypeKind::Double => 2,
			_ => 1,
		}
	}
}

/// One `match`-`offset` pair of a switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchCase {
	pub value: i32,
	pub target: Label,
}

/// The kinds of instructions, without their operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstructionKind {
	Load,
	Store,
	Increment,
	Branch,
	LookupSwitch,
	TableSwitch,
	Return,
	Throw,
	Field,
	Invoke,
	InvokeDynamic,
	NewObject,
	NewPrimitiveArray,
	NewReferenceArray,
	NewMultiArray,
	ArrayLoad,
	ArrayStore,
	TypeCheck,
	Convert,
	Operator,
	Stack,
	ConstantIntrinsic,
	ConstantArgument,
	ConstantLoad,
	Monitor,
	Nop,
	/// `jsr`, `jsr_w` and `ret`.
	Discontinued,
}

impl InstructionKind {
	/// The kind of an opcode. For `wide`, pass the widened opcode.
	pub fn of(opcode: u8) -> Option<InstructionKind> {
		use InstructionKind as K;
		Some(match opcode {
			opcode::NOP => K::Nop,
			opcode::ACONST_NULL..=opcode::DCONST_1 => K::ConstantIntrinsic,
			opcode::BIPUSH | opcode::SIPUSH => K::ConstantArgument,
			opcode::LDC..=opcode::LDC2_W => K::ConstantLoad,
			opcode::ILOAD..=opcode::ALOAD_3 => K::Load,
			opcode::IALOAD..=opcode::SALOAD => K::ArrayLoad,
			opcode::ISTORE..=opcode::ASTORE_3 => K::Store,
			opcode::IASTORE..=opcode::SASTORE => K::ArrayStore,
			opcode::POP..=opcode::SWAP => K::Stack,
			opcode::IADD..=opcode::LXOR => K::Operator,
			opcode::IINC => K::Increment,
			opcode::I2L..=opcode::I2S => K::Convert,
			opcode::LCMP..=opcode::DCMPG => K::Operator,
			opcode::IFEQ..=opcode::GOTO => K::Branch,
			opcode::JSR | opcode::RET => K::Discontinued,
			opcode::TABLESWITCH => K::TableSwitch,
			opcode::LOOKUPSWITCH => K::LookupSwitch,
			opcode::IRETURN..=opcode::RETURN => K::Return,
			opcode::GETSTATIC..=opcode::PUTFIELD => K::Field,
			opcode::INVOKEVIRTUAL..=opcode::INVOKEINTERFACE => K::Invoke,
			opcode::INVOKEDYNAMIC => K::InvokeDynamic,
			opcode::NEW => K::NewObject,
			opcode::NEWARRAY => K::NewPrimitiveArray,
			opcode::ANEWARRAY => K::NewReferenceArray,
			opcode::ARRAYLENGTH => K::Operator,
			opcode::ATHROW => K::Throw,
			opcode::CHECKCAST | opcode::INSTANCEOF => K::TypeCheck,
			opcode::MONITORENTER | opcode::MONITOREXIT => K::Monitor,
			opcode::MULTIANEWARRAY => K::NewMultiArray,
			opcode::IFNULL..=opcode::GOTO_W => K::Branch,
			opcode::JSR_W => K::Discontinued,
			_ => return None,
		})
	}
}

/// The padding between the opcode of a `tableswitch` or `lookupswitch` at `pos` and its operands.
pub fn switch_padding(pos: u32) -> u32 {
	(4 - ((pos + 1) % 4)) % 4
}

/// An instruction with all its operands as values.
///
/// Instructions with several encodings (like `iload_0`, `iload 0` and `wide iload 0`) are represented once, and
/// written in the shortest encoding possible.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
	Load { kind: TypeKind, slot: u16 },
	Store { kind: TypeKind, slot: u16 },
	Increment { slot: u16, constant: i16 },
	/// Any of the `if*` instructions, `goto` and `goto_w`, as well as `jsr` and `jsr_w`.
	Branch { opcode: u8, target: Label },
	/// The cases get sorted by value when written.
	LookupSwitch { default: Label, cases: Vec<SwitchCase> },
	/// Values in `low..=high` without a case jump to `default`.
	TableSwitch { low: i32, high: i32, default: Label, cases: Vec<SwitchCase> },
	/// [`None`] for `return`.
	Return { kind: Option<TypeKind> },
	Throw,
	Field { opcode: u8, field: PoolEntry },
	Invoke { opcode: u8, method: PoolEntry },
	InvokeDynamic { entry: PoolEntry },
	NewObject { class: PoolEntry },
	NewPrimitiveArray { array_type: u8 },
	NewReferenceArray { class: PoolEntry },
	NewMultiArray { class: PoolEntry, dimensions: u8 },
	ArrayLoad { opcode: u8 },
	ArrayStore { opcode: u8 },
	TypeCheck { opcode: u8, class: PoolEntry },
	Convert { opcode: u8 },
	/// Arithmetic, comparisons and `arraylength`.
	Operator { opcode: u8 },
	Stack { opcode: u8 },
	/// `aconst_null` and the `*const_*` instructions.
	ConstantIntrinsic { opcode: u8 },
	/// `bipush` and `sipush`.
	ConstantArgument { opcode: u8, value: i16 },
	/// `ldc`, `ldc_w` and `ldc2_w`.
	ConstantLoad { entry: PoolEntry },
	Monitor { opcode: u8 },
	Nop,
	Ret { slot: u16 },
}

impl Instruction {
	pub fn load(kind: TypeKind, slot: u16) -> Instruction {
		Instruction::Load { kind, slot }
	}

	pub fn store(kind: TypeKind, slot: u16) -> Instruction {
		Instruction::Store { kind, slot }
	}

	pub fn increment(slot: u16, constant: i16) -> Instruction {
		Instruction::Increment { slot, constant }
	}

	pub fn branch(opcode: u8, target: Label) -> Instruction {
		Instruction::Branch { opcode, target }
	}

	pub fn goto(target: Label) -> Instruction {
		Instruction::Branch { opcode: opcode::GOTO, target }
	}

	pub fn return_value(kind: TypeKind) -> Instruction {
		Instruction::Return { kind: Some(kind) }
	}

	pub fn return_void() -> Instruction {
		Instruction::Return { kind: None }
	}

	/// Loads an `int` constant with `iconst_*`, `bipush`, `sipush` or `ldc`, whichever is the shortest.
	pub fn int_constant(pool: &mut PoolBuilder, value: i32) -> Result<Instruction> {
		Ok(match value {
			-1..=5 => Instruction::ConstantIntrinsic { opcode: (opcode::ICONST_0 as i32 + value) as u8 },
			value if i8::try_from(value).is_ok() => Instruction::ConstantArgument { opcode: opcode::BIPUSH, value: value as i16 },
			value if i16::try_from(value).is_ok() => Instruction::ConstantArgument { opcode: opcode::SIPUSH, value: value as i16 },
			value => Instruction::ConstantLoad { entry: pool.int_entry(value)? },
		})
	}

	/// If this instruction loads an `int` constant, that constant.
	pub fn as_int_constant(&self) -> Option<i32> {
		match self {
			&Instruction::ConstantIntrinsic { opcode: op @ opcode::ICONST_M1..=opcode::ICONST_5 } =>
				Some(op as i32 - opcode::ICONST_0 as i32),
			&Instruction::ConstantArgument { value, .. } => Some(value as i32),
			Instruction::ConstantLoad { entry } => match entry.value() {
				&EntryValue::Integer(value) => Some(value),
				_ => None,
			},
			_ => None,
		}
	}

	pub fn kind(&self) -> InstructionKind {
		match self {
			Instruction::Load { .. } => InstructionKind::Load,
			Instruction::Store { .. } => InstructionKind::Store,
			Instruction::Increment { .. } => InstructionKind::Increment,
			&Instruction::Branch { opcode: opcode::JSR | opcode::JSR_W, .. } => InstructionKind::Discontinued,
			Instruction::Branch { .. } => InstructionKind::Branch,
			Instruction::LookupSwitch { .. } => InstructionKind::LookupSwitch,
			Instruction::TableSwitch { .. } => InstructionKind::TableSwitch,
			Instruction::Return { .. } => InstructionKind::Return,
			Instruction::Throw => InstructionKind::Throw,
			Instruction::Field { .. } => InstructionKind::Field,
			Instruction::Invoke { .. } => InstructionKind::Invoke,
			Instruction::InvokeDynamic { .. } => InstructionKind::InvokeDynamic,
			Instruction::NewObject { .. } => InstructionKind::NewObject,
			Instruction::NewPrimitiveArray { .. } => InstructionKind::NewPrimitiveArray,
			Instruction::NewReferenceArray { .. } => InstructionKind::NewReferenceArray,
			Instruction::NewMultiArray { .. } => InstructionKind::NewMultiArray,
			Instruction::ArrayLoad { .. } => InstructionKind::ArrayLoad,
			Instruction::ArrayStore { .. } => InstructionKind::ArrayStore,
			Instruction::TypeCheck { .. } => InstructionKind::TypeCheck,
			Instruction::Convert { .. } => InstructionKind::Convert,
			Instruction::Operator { .. } => InstructionKind::Operator,
			Instruction::Stack { .. } => InstructionKind::Stack,
			Instruction::ConstantIntrinsic { .. } => InstructionKind::ConstantIntrinsic,
			Instruction::ConstantArgument { .. } => InstructionKind::ConstantArgument,
			Instruction::ConstantLoad { .. } => InstructionKind::ConstantLoad,
			Instruction::Monitor { .. } => InstructionKind::Monitor,
			Instruction::Nop => InstructionKind::Nop,
			Instruction::Ret { .. } => InstructionKind::Discontinued,
		}
	}

	/// The opcode this instruction gets written with.
	///
	/// For [`Instruction::ConstantLoad`], this uses the index the entry has in its current pool. For instructions that
	/// need a `wide` prefix, this is the opcode after the prefix.
	pub fn opcode(&self) -> u8 {
		match self {
			&Instruction::Load { kind, slot } if slot <= 3 => opcode::ILOAD_0 + kind.ordinal() * 4 + slot as u8,
			&Instruction::Load { kind, .. } => opcode::ILOAD + kind.ordinal(),
			&Instruction::Store { kind, slot } if slot <= 3 => opcode::ISTORE_0 + kind.ordinal() * 4 + slot as u8,
			&Instruction::Store { kind, .. } => opcode::ISTORE + kind.ordinal(),
			Instruction::Increment { .. } => opcode::IINC,
			&Instruction::Branch { opcode, .. } => opcode,
			Instruction::LookupSwitch { .. } => opcode::LOOKUPSWITCH,
			Instruction::TableSwitch { .. } => opcode::TABLESWITCH,
			Instruction::Return { kind: Some(kind) } => opcode::IRETURN + kind.ordinal(),
			Instruction::Return { kind: None } => opcode::RETURN,
			Instruction::Throw => opcode::ATHROW,
			&Instruction::Field { opcode, .. } => opcode,
			&Instruction::Invoke { opcode, .. } => opcode,
			Instruction::InvokeDynamic { .. } => opcode::INVOKEDYNAMIC,
			Instruction::NewObject { .. } => opcode::NEW,
			Instruction::NewPrimitiveArray { .. } => opcode::NEWARRAY,
			Instruction::NewReferenceArray { .. } => opcode::ANEWARRAY,
			Instruction::NewMultiArray { .. } => opcode::MULTIANEWARRAY,
			&Instruction::ArrayLoad { opcode } => opcode,
			&Instruction::ArrayStore { opcode } => opcode,
			&Instruction::TypeCheck { opcode, .. } => opcode,
			&Instruction::Convert { opcode } => opcode,
			&Instruction::Operator { opcode } => opcode,
			&Instruction::Stack { opcode } => opcode,
			&Instruction::ConstantIntrinsic { opcode } => opcode,
			&Instruction::ConstantArgument { opcode, .. } => opcode,
			Instruction::ConstantLoad { entry } if entry.is_wide_constant() => opcode::LDC2_W,
			Instruction::ConstantLoad { entry } if entry.index() <= 255 => opcode::LDC,
			Instruction::ConstantLoad { .. } => opcode::LDC_W,
			Instruction::Monitor { opcode } => *opcode,
			Instruction::Nop => opcode::NOP,
			Instruction::Ret { .. } => opcode::RET,
		}
	}

	/// Whether this instruction needs the `wide` prefix.
	pub fn is_wide(&self) -> bool {
		match self {
			&Instruction::Load { slot, .. } | &Instruction::Store { slot, .. } | &Instruction::Ret { slot } => slot > 255,
			&Instruction::Increment { slot, constant } => slot > 255 || i8::try_from(constant).is_err(),
			_ => false,
		}
	}

	/// The number of bytes this instruction takes up when written at `pos`.
	///
	/// Only the switch instructions depend on `pos`, because of their padding.
	pub fn size_in_bytes(&self, pos: u32) -> u32 {
		match self {
			Instruction::Load { slot, .. } | Instruction::Store { slot, .. } if *slot <= 3 => 1,
			Instruction::Load { .. } | Instruction::Store { .. } | Instruction::Ret { .. } if self.is_wide() => 4,
			Instruction::Load { .. } | Instruction::Store { .. } | Instruction::Ret { .. } => 2,
			Instruction::Increment { .. } if self.is_wide() => 6,
			Instruction::Increment { .. } => 3,
			&Instruction::Branch { opcode: opcode::GOTO_W | opcode::JSR_W, .. } => 5,
			Instruction::Branch { .. } => 3,
			Instruction::LookupSwitch { cases, .. } => {
				1 + switch_padding(pos) + 8 + 8 * cases.len() as u32
			},
			Instruction::TableSwitch { low, high, .. } => {
				let count = (*high as i64 - *low as i64 + 1).clamp(0, u32::MAX as i64 / 8) as u32;
				1 + switch_padding(pos) + 12 + 4 * count
			},
			&Instruction::Invoke { opcode: opcode::INVOKEINTERFACE, .. } => 5,
			Instruction::InvokeDynamic { .. } => 5,
			Instruction::Field { .. } | Instruction::Invoke { .. } | Instruction::NewObject { .. } |
			Instruction::NewReferenceArray { .. } | Instruction::TypeCheck { .. } => 3,
			Instruction::NewPrimitiveArray { .. } => 2,
			Instruction::NewMultiArray { .. } => 4,
			&Instruction::ConstantArgument { opcode: opcode::BIPUSH, .. } => 2,
			Instruction::ConstantArgument { .. } => 3,
			Instruction::ConstantLoad { .. } if self.opcode() == opcode::LDC => 2,
			Instruction::ConstantLoad { .. } => 3,
			Instruction::Return { .. } | Instruction::Throw | Instruction::ArrayLoad { .. } |
			Instruction::ArrayStore { .. } | Instruction::Convert { .. } | Instruction::Operator { .. } |
			Instruction::Stack { .. } | Instruction::ConstantIntrinsic { .. } | Instruction::Monitor { .. } |
			Instruction::Nop => 1,
		}
	}
}

/// An instruction, either bound to the bytes it was read from or with explicit operands.
#[derive(Clone)]
pub enum Insn<'r> {
	Bound(BoundInstruction<'r>),
	Unbound(Instruction),
}

impl Debug for Insn<'_> {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			Insn::Bound(bound) => bound.fmt(f),
			Insn::Unbound(instruction) => instruction.fmt(f),
		}
	}
}

impl From<Instruction> for Insn<'_> {
	fn from(value: Instruction) -> Self {
		Insn::Unbound(value)
	}
}

impl<'r> From<BoundInstruction<'r>> for Insn<'r> {
	fn from(value: BoundInstruction<'r>) -> Self {
		Insn::Bound(value)
	}
}

impl<'r> Insn<'r> {
	pub fn opcode(&self) -> u8 {
		match self {
			Insn::Bound(bound) => bound.opcode(),
			Insn::Unbound(instruction) => instruction.opcode(),
		}
	}

	pub fn kind(&self) -> InstructionKind {
		match self {
			Insn::Bound(bound) => bound.kind(),
			Insn::Unbound(instruction) => instruction.kind(),
		}
	}

	/// The size in bytes when written at `pos` into `pool`.
	///
	/// A bound instruction copied byte by byte keeps the size it was read with. Otherwise it's the size of the
	/// encoding chosen when writing, so an `ldc_w` whose entry gets a small index in `pool` shrinks to an `ldc`, and
	/// a switch follows the padding at `pos`. The entry of an `ldc` is added to `pool` to learn its index.
	pub fn size_in_bytes(&self, pos: u32, pool: &mut PoolBuilder<'_>) -> Result<u32> {
		let instruction = match self {
			Insn::Bound(bound) if bound.can_copy_into(pool)? => return Ok(bound.size()),
			Insn::Bound(bound) => bound.decode()?,
			Insn::Unbound(instruction) => instruction.clone(),
		};
		Ok(match instruction {
			Instruction::ConstantLoad { entry } => {
				Instruction::ConstantLoad { entry: pool.maybe_clone(&entry)? }.size_in_bytes(pos)
			},
			instruction => instruction.size_in_bytes(pos),
		})
	}

	/// Gets the operands as values.
	pub fn decode(&self) -> Result<Instruction> {
		match self {
			Insn::Bound(bound) => bound.decode(),
			Insn::Unbound(instruction) => Ok(instruction.clone()),
		}
	}

	/// Shortcut for [`Instruction::as_int_constant`], without decoding instructions that don't load constants.
	pub fn as_int_constant(&self) -> Option<i32> {
		match self {
			Insn::Bound(bound) if bound.kind() == InstructionKind::ConstantIntrinsic ||
				bound.kind() == InstructionKind::ConstantArgument ||
				bound.kind() == InstructionKind::ConstantLoad => bound.decode().ok()?.as_int_constant(),
			Insn::Bound(_) => None,
			Insn::Unbound(instruction) => instruction.as_int_constant(),
		}
	}

	pub fn write_to(&self, writer: &mut CodeWriter<'_, 'r>) -> Result<()> {
		writer.write_instruction(self)
	}
}
