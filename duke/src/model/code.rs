//! The code of a method as a stream of instructions and pseudo elements.
use anyhow::{anyhow, Context, Result};
use log::debug;
use crate::class_constants::{attribute, pool, verification_type};
use crate::class_reader::{AttributeSpan, ClassReader, Cursor};
use crate::class_reader::labels::LabelTargets;
use crate::error::ClassFileError;
use crate::instruction::bound::{BoundInstruction, CodeSpan};
use crate::instruction::decode::{self, RawInstruction};
use crate::instruction::{Insn, Instruction};
use crate::label::{Label, LabelArena, LabelContext};
use crate::options::StackMapsOption;
use crate::pool::PoolEntry;

/// An entry of the `locals` or `stack` of a stack map frame.
#[derive(Debug, Clone, PartialEq)]
pub enum VerificationType {
	Top,
	Integer,
	Float,
	Double,
	Long,
	Null,
	UninitializedThis,
	Object(PoolEntry),
	/// An object created by the `new` instruction at the label, not yet initialized.
	Uninitialized(Label),
}

/// A frame of the `StackMapTable`, in the same compressed form it's stored in.
///
/// The frame applies to the instruction following it in the code stream. `Chop` and `Append` are relative to the
/// previous frame, so frames should be kept in order.
#[derive(Debug, Clone, PartialEq)]
pub enum StackMapFrame {
	Same,
	SameLocals1StackItem(VerificationType),
	/// Removes the last `1..=3` locals.
	Chop(u8),
	/// Adds `1..=3` locals.
	Append(Vec<VerificationType>),
	Full {
		locals: Vec<VerificationType>,
		stack: Vec<VerificationType>,
	},
}

/// An entry of a `LocalVariableTable` or `LocalVariableTypeTable`.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalVariable {
	pub slot: u16,
	pub name: PoolEntry,
	/// The field descriptor, or the generic signature for [`CodeElement::LocalVariableType`].
	pub descriptor: PoolEntry,
	pub start: Label,
	/// Exclusive.
	pub end: Label,
}

/// An element of a code stream.
#[derive(Debug, Clone)]
pub enum CodeElement<'r> {
	Instruction(Insn<'r>),
	/// Binds the label to the position of the next instruction.
	Label(Label),
	/// An exception table entry, `end` is exclusive. A `catch_type` of [`None`] catches everything.
	ExceptionCatch {
		start: Label,
		end: Label,
		handler: Label,
		catch_type: Option<PoolEntry>,
	},
	/// The source line of the instructions following it.
	LineNumber(u16),
	LocalVariable(LocalVariable),
	LocalVariableType(LocalVariable),
	Frame(StackMapFrame),
}

impl From<Instruction> for CodeElement<'_> {
	fn from(value: Instruction) -> Self {
		CodeElement::Instruction(Insn::Unbound(value))
	}
}

impl<'r> From<Insn<'r>> for CodeElement<'r> {
	fn from(value: Insn<'r>) -> Self {
		CodeElement::Instruction(value)
	}
}

/// A `Code` attribute of a class file that was read.
#[derive(Debug, Clone)]
pub(crate) struct BoundCode<'r> {
	pub(crate) span: CodeSpan<'r>,
	/// The whole `Code` attribute.
	pub(crate) attribute: AttributeSpan,
	pub(crate) exception_table_pos: usize,
	pub(crate) attributes_pos: usize,
}

#[derive(Debug, Clone)]
enum Source<'r> {
	Bound(BoundCode<'r>),
	/// Elements built by a code builder, together with the labels it created.
	Buffered {
		elements: Vec<CodeElement<'r>>,
		labels: LabelArena,
	},
}

/// The code of a method, either read from a class file or built.
#[derive(Debug, Clone)]
pub struct CodeModel<'r> {
	max_stack: Option<u16>,
	max_locals: Option<u16>,
	source: Source<'r>,
}

impl<'r> CodeModel<'r> {
	pub(crate) fn read(reader: &'r ClassReader, attribute: AttributeSpan) -> Result<CodeModel<'r>> {
		let mut c = Cursor::new(reader, attribute.pos, attribute.len);
		let max_stack = c.read_u16()?;
		let max_locals = c.read_u16()?;
		let code_len = c.read_u32()?;
		if code_len == 0 || code_len > u16::MAX as u32 {
			return Err(ClassFileError::malformed(c.pos() - 4, format!("code length {code_len} isn't in 1..=65535")).into());
		}
		let code_pos = c.pos();
		c.skip(code_len as usize)?;
		let exception_table_pos = c.pos();
		let exception_table_length = c.read_u16_as_usize()?;
		c.skip(exception_table_length * 8)?;
		let attributes_pos = c.pos();

		let end = reader.skip_attribute_holder(attributes_pos)?;
		if end != attribute.end() {
			return Err(ClassFileError::malformed(attributes_pos, format!(
				"code attributes end at {end}, but the code attribute ends at {}", attribute.end()
			)).into());
		}

		let span = CodeSpan { reader, code_pos, code_len, context: LabelContext::new_read() };
		Ok(CodeModel {
			max_stack: Some(max_stack),
			max_locals: Some(max_locals),
			source: Source::Bound(BoundCode { span, attribute, exception_table_pos, attributes_pos }),
		})
	}

	pub(crate) fn buffered(
		elements: Vec<CodeElement<'r>>,
		labels: LabelArena,
		max_stack: Option<u16>,
		max_locals: Option<u16>,
	) -> CodeModel<'r> {
		CodeModel { max_stack, max_locals, source: Source::Buffered { elements, labels } }
	}

	/// The `max_stack` of the code that was read. Built code gets it computed when written.
	pub fn max_stack(&self) -> Option<u16> {
		self.max_stack
	}

	pub fn max_locals(&self) -> Option<u16> {
		self.max_locals
	}

	/// The length of the code array, for code that was read.
	pub fn code_length(&self) -> Option<u32> {
		match &self.source {
			Source::Bound(code) => Some(code.span.code_len),
			Source::Buffered { .. } => None,
		}
	}

	pub(crate) fn bound(&self) -> Option<&BoundCode<'r>> {
		match &self.source {
			Source::Bound(code) => Some(code),
			Source::Buffered { .. } => None,
		}
	}

	/// Gets all elements.
	///
	/// For code that was read, the labels are the same on each call.
	pub fn elements(&self) -> Result<Vec<CodeElement<'r>>> {
		match &self.source {
			Source::Bound(code) => code.elements(),
			Source::Buffered { elements, .. } => Ok(elements.clone()),
		}
	}

	/// The elements and the label arena for writing them. Read code gets a fresh arena.
	pub(crate) fn into_parts(self) -> Result<(Vec<CodeElement<'r>>, LabelArena)> {
		match self.source {
			Source::Bound(code) => Ok((code.elements()?, LabelArena::new())),
			Source::Buffered { elements, labels } => Ok((elements, labels)),
		}
	}
}

impl<'r> BoundCode<'r> {
	pub(crate) fn reader(&self) -> &'r ClassReader {
		self.span.reader
	}

	/// The whole `Code` attribute, including its name and length.
	pub(crate) fn attribute_bytes(&self) -> &'r [u8] {
		&self.span.reader.bytes()[self.attribute.start..self.attribute.end()]
	}

	fn label(&self, bci: u32) -> Label {
		self.span.label(bci)
	}

	fn elements(&self) -> Result<Vec<CodeElement<'r>>> {
		let reader = self.span.reader;
		let options = reader.options();
		let code = self.span.code();
		let code_len = self.span.code_len;
		let mut targets = LabelTargets::new(code_len);

		let mut instructions: Vec<(u32, RawInstruction)> = Vec::new();
		let mut starts = vec![false; code_len as usize + 1];
		let mut pos = 0;
		while pos < code_len {
			let raw = decode::read_instruction(code, pos)
				.with_context(|| anyhow!("failed to read instruction at bytecode offset {pos}"))?;
			for target in decode::branch_targets(code, pos, &raw)? {
				targets.create(target)
					.with_context(|| anyhow!("invalid branch target of instruction at bytecode offset {pos}"))?;
			}
			starts[pos as usize] = true;
			instructions.push((pos, raw));
			pos += raw.size;
		}
		starts[code_len as usize] = true;

		let mut c = Cursor::new(reader, self.exception_table_pos, self.attributes_pos - self.exception_table_pos);
		let catches = c.read_vec(|c| c.read_u16_as_usize(), |c| {
			let start = targets.create(c.read_u16()? as i64)?;
			let end = targets.create_exclusive(c.read_u16()? as i64)?;
			let handler = targets.create(c.read_u16()? as i64)?;
			let catch_type = c.read_entry_or_none()?;
			if let Some(catch_type) = &catch_type {
				catch_type.expect_tag(pool::CLASS)?;
			}
			Ok(CodeElement::ExceptionCatch {
				start: self.label(start),
				end: self.label(end),
				handler: self.label(handler),
				catch_type,
			})
		}).with_context(|| anyhow!("failed to read exception table"))?;

		let mut locals = Vec::new();
		let mut line_numbers: Vec<(u32, u16)> = Vec::new();
		let mut frames: Vec<(u32, StackMapFrame)> = Vec::new();
		for span in reader.attributes(self.attributes_pos)? {
			let mut c = Cursor::new(reader, span.pos, span.len);
			if span.is(attribute::LINE_NUMBER_TABLE) {
				if !options.line_numbers {
					continue;
				}
				let entries = c.read_vec(|c| c.read_u16_as_usize(), |c| Ok((c.read_u16()? as u32, c.read_u16()?)))?;
				line_numbers.extend(entries);
			} else if span.is(attribute::LOCAL_VARIABLE_TABLE) || span.is(attribute::LOCAL_VARIABLE_TYPE_TABLE) {
				if !options.debug_elements {
					continue;
				}
				let is_type = span.is(attribute::LOCAL_VARIABLE_TYPE_TABLE);
				let entries = c.read_vec(|c| c.read_u16_as_usize(), |c| {
					let start_pc = c.read_u16()? as i64;
					let length = c.read_u16()? as i64;
					let variable = LocalVariable {
						start: self.label(targets.create_exclusive(start_pc)?),
						end: self.label(targets.create_exclusive(start_pc + length)?),
						name: c.read_utf8_entry()?,
						descriptor: c.read_utf8_entry()?,
						slot: c.read_u16()?,
					};
					Ok(if is_type { CodeElement::LocalVariableType(variable) } else { CodeElement::LocalVariable(variable) })
				}).with_context(|| anyhow!("failed to read {:?}", span.name))?;
				locals.extend(entries);
			} else if span.is(attribute::STACK_MAP_TABLE) {
				if options.stack_maps == StackMapsOption::Drop {
					continue;
				}
				frames = self.read_frames(&mut c, &mut targets)
					.with_context(|| anyhow!("failed to read stack map table"))?;
			} else {
				debug!("code attribute {:?} isn't modeled, it's lost if the code is written again", span.name);
				continue;
			}
			if c.remaining() != 0 {
				return Err(ClassFileError::malformed(c.pos(), format!(
					"attribute {:?} has {} bytes left after its contents", span.name, c.remaining()
				)).into());
			}
		}

		for pc in 0..=code_len {
			if targets.is_target(pc) && !starts[pc as usize] {
				return Err(ClassFileError::malformed(self.span.code_pos + pc as usize, format!(
					"label target at bytecode offset {pc} isn't the start of an instruction"
				)).into());
			}
		}
		for &(pc, _) in &frames {
			if !starts.get(pc as usize).is_some_and(|&start| start) || pc == code_len {
				return Err(ClassFileError::malformed(self.span.code_pos, format!(
					"stack map frame at bytecode offset {pc} isn't at the start of an instruction"
				)).into());
			}
		}
		for &(pc, line) in &line_numbers {
			if pc >= code_len || !starts[pc as usize] {
				return Err(ClassFileError::malformed(self.span.code_pos, format!(
					"line number {line} at bytecode offset {pc} isn't at the start of an instruction"
				)).into());
			}
		}
		line_numbers.sort_by_key(|&(pc, _)| pc);

		let mut elements = Vec::with_capacity(catches.len() + locals.len() + instructions.len() * 2);
		elements.extend(catches);
		elements.extend(locals);
		let mut frames = frames.into_iter().peekable();
		let mut line_numbers = line_numbers.into_iter().peekable();
		for (bci, raw) in instructions {
			if targets.is_target(bci) {
				elements.push(CodeElement::Label(self.label(bci)));
			}
			while let Some((_, frame)) = frames.next_if(|&(pc, _)| pc == bci) {
				elements.push(CodeElement::Frame(frame));
			}
			while let Some((_, line)) = line_numbers.next_if(|&(pc, _)| pc == bci) {
				elements.push(CodeElement::LineNumber(line));
			}
			elements.push(CodeElement::Instruction(Insn::Bound(BoundInstruction::new(self.span, bci, raw))));
		}
		if targets.is_target(code_len) {
			elements.push(CodeElement::Label(self.label(code_len)));
		}
		Ok(elements)
	}

	fn read_frames(&self, c: &mut Cursor<'r>, targets: &mut LabelTargets) -> Result<Vec<(u32, StackMapFrame)>> {
		let count = c.read_u16_as_usize()?;
		let mut frames = Vec::with_capacity(count.min(c.remaining()));
		let mut previous: i64 = -1;
		for _ in 0..count {
			let frame_pos = c.pos();
			let frame_type = c.read_u8()?;
			let (delta, frame) = match frame_type {
				0..=63 => (frame_type as u16, StackMapFrame::Same),
				64..=127 => (frame_type as u16 - 64, StackMapFrame::SameLocals1StackItem(self.read_verification_type(c, targets)?)),
				247 => {
					let delta = c.read_u16()?;
					(delta, StackMapFrame::SameLocals1StackItem(self.read_verification_type(c, targets)?))
				},
				248..=250 => (c.read_u16()?, StackMapFrame::Chop(251 - frame_type)),
				251 => (c.read_u16()?, StackMapFrame::Same),
				252..=254 => {
					let delta = c.read_u16()?;
					let locals = (0..frame_type - 251)
						.map(|_| self.read_verification_type(c, targets))
						.collect::<Result<Vec<_>>>()?;
					(delta, StackMapFrame::Append(locals))
				},
				255 => {
					let delta = c.read_u16()?;
					let locals = c.read_vec(|c| c.read_u16_as_usize(), |c| self.read_verification_type(c, targets))?;
					let stack = c.read_vec(|c| c.read_u16_as_usize(), |c| self.read_verification_type(c, targets))?;
					(delta, StackMapFrame::Full { locals, stack })
				},
				_ => return Err(ClassFileError::malformed(frame_pos, format!("reserved stack map frame type {frame_type}")).into()),
			};
			let pc = previous + delta as i64 + 1;
			if pc >= self.span.code_len as i64 {
				return Err(ClassFileError::malformed(frame_pos, format!(
					"stack map frame at bytecode offset {pc} out of bounds for code length {}", self.span.code_len
				)).into());
			}
			frames.push((pc as u32, frame));
			previous = pc;
		}
		Ok(frames)
	}

	fn read_verification_type(&self, c: &mut Cursor<'r>, targets: &mut LabelTargets) -> Result<VerificationType> {
		let pos = c.pos();
		Ok(match c.read_u8()? {
			verification_type::TOP => VerificationType::Top,
			verification_type::INTEGER => VerificationType::Integer,
			verification_type::FLOAT => VerificationType::Float,
			verification_type::DOUBLE => VerificationType::Double,
			verification_type::LONG => VerificationType::Long,
			verification_type::NULL => VerificationType::Null,
			verification_type::UNINITIALIZED_THIS => VerificationType::UninitializedThis,
			verification_type::OBJECT => VerificationType::Object(c.read_class_entry()?),
			verification_type::UNINITIALIZED => {
				let offset = targets.create(c.read_u16()? as i64)?;
				VerificationType::Uninitialized(self.label(offset))
			},
			tag => return Err(ClassFileError::malformed(pos, format!("unknown verification type tag {tag}")).into()),
		})
	}
}
