use std::fmt::{Debug, Formatter};
use std::sync::OnceLock;
use anyhow::{anyhow, Context, Result};
use crate::class_constants::opcode;
use crate::class_reader::ClassReader;
use crate::instruction::decode::{self, RawInstruction};
use crate::instruction::{Instruction, InstructionKind};
use crate::label::{Label, LabelContext};
use crate::pool::{ConstantPool, PoolEntry, PoolId};
use crate::pool::builder::PoolBuilder;

/// The code array of a `Code` attribute that was read.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CodeSpan<'r> {
	pub(crate) reader: &'r ClassReader,
	/// Position of the first byte of the code array in the class file.
	pub(crate) code_pos: usize,
	pub(crate) code_len: u32,
	pub(crate) context: LabelContext,
}

impl<'r> CodeSpan<'r> {
	pub(crate) fn code(&self) -> &'r [u8] {
		&self.reader.bytes()[self.code_pos..self.code_pos + self.code_len as usize]
	}

	pub(crate) fn label(&self, bci: u32) -> Label {
		Label::read(self.context, bci)
	}
}

/// An instruction of a code attribute that was read.
///
/// Only the opcode and the size are known up front. Operands are read from the class file when asked for, the
/// constant pool entry is resolved once and cached.
#[derive(Clone)]
pub struct BoundInstruction<'r> {
	span: CodeSpan<'r>,
	bci: u32,
	raw: RawInstruction,
	entry: OnceLock<PoolEntry>,
}

impl Debug for BoundInstruction<'_> {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		let name = opcode::name(self.raw.opcode).unwrap_or("?");
		if self.raw.wide {
			write!(f, "{}: wide {name}", self.bci)
		} else {
			write!(f, "{}: {name}", self.bci)
		}
	}
}

impl<'r> BoundInstruction<'r> {
	pub(crate) fn new(span: CodeSpan<'r>, bci: u32, raw: RawInstruction) -> BoundInstruction<'r> {
		BoundInstruction { span, bci, raw, entry: OnceLock::new() }
	}

	/// The bytecode offset of this instruction in the code it was read from.
	pub fn bci(&self) -> u32 {
		self.bci
	}

	/// The opcode, after the `wide` prefix if there's one.
	pub fn opcode(&self) -> u8 {
		self.raw.opcode
	}

	pub fn is_wide(&self) -> bool {
		self.raw.wide
	}

	pub fn size(&self) -> u32 {
		self.raw.size
	}

	pub fn kind(&self) -> InstructionKind {
		// read_instruction only hands out known opcodes
		InstructionKind::of(self.raw.opcode).unwrap_or(InstructionKind::Nop)
	}

	/// The original bytes of this instruction.
	pub fn bytes(&self) -> &'r [u8] {
		&self.span.code()[self.bci as usize..(self.bci + self.raw.size) as usize]
	}

	pub(crate) fn pool_id(&self) -> PoolId {
		self.span.reader.id()
	}

	/// Whether this instruction jumps somewhere, so that it can't be copied byte by byte.
	pub fn has_label(&self) -> bool {
		decode::has_label(self.raw.opcode)
	}

	/// The local variable slot used by loads, stores, `iinc` and `ret`.
	pub fn slot(&self) -> Result<Option<u16>> {
		decode::local_slot(self.span.code(), self.bci, &self.raw)
	}

	/// The constant pool entry this instruction references, if any.
	pub fn entry(&self) -> Result<Option<PoolEntry>> {
		if let Some(entry) = self.entry.get() {
			return Ok(Some(entry.clone()));
		}
		let Some(index) = decode::pool_index(self.span.code(), self.bci, &self.raw)? else {
			return Ok(None);
		};
		let entry = self.span.reader.entry_by_index(index)
			.with_context(|| anyhow!("failed to resolve the constant pool entry of {self:?}"))?;
		Ok(Some(self.entry.get_or_init(|| entry).clone()))
	}

	/// The target of a branch instruction, as a label of the code it was read from.
	pub fn branch_target(&self) -> Result<Option<Label>> {
		if !matches!(self.kind(), InstructionKind::Branch | InstructionKind::Discontinued) || self.raw.opcode == opcode::RET {
			return Ok(None);
		}
		let targets = decode::branch_targets(self.span.code(), self.bci, &self.raw)?;
		Ok(targets.first().map(|&target| self.span.label(target as u32)))
	}

	/// Reads all operands.
	pub fn decode(&self) -> Result<Instruction> {
		decode::decode(self.span.code(), self.bci, &self.raw, self.span.context, self.span.reader)
			.with_context(|| anyhow!("failed to decode {self:?}"))
	}

	/// Whether the bytes of this instruction stay valid when written into `pool`.
	pub(crate) fn can_copy_into(&self, pool: &PoolBuilder) -> Result<bool> {
		if self.has_label() {
			return Ok(false);
		}
		let references_pool = decode::pool_index(self.span.code(), self.bci, &self.raw)?.is_some();
		Ok(!references_pool || pool.can_write_direct(self.pool_id()))
	}
}
