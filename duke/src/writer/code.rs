//! Writing a stream of code elements into a `Code` attribute.
//!
//! Instructions are written in one forward sweep. Labels get bound to the position they appear at, branches to labels
//! write a placeholder and remember a fixup, and all fixups are patched once the sweep is done. This works because the
//! size of every instruction only depends on its own position, never on where its targets end up: branches always use
//! the encoding they were given, and only the padding of switches depends on the position.
//!
//! Code of class files from version 50 on needs stack map frames. The frames passed in are kept if every position
//! needing one has one, otherwise all of them are computed again.
use std::collections::HashSet;
use anyhow::{anyhow, bail, Context, Result};
use log::{debug, trace};
use crate::buf_writer::BufWriter;
use crate::class_constants::{access, attribute, opcode, pool, verification_type};
use crate::descriptor::parse_method_descriptor;
use crate::error::ClassFileError;
use crate::instruction::stack;
use crate::instruction::{switch_padding, Insn, Instruction, InstructionKind, SwitchCase};
use crate::label::{Label, LabelArena};
use crate::model::{CodeElement, LocalVariable, StackMapFrame, VerificationType};
use crate::pool::builder::PoolBuilder;
use crate::pool::PoolEntry;
use crate::writer::frames::{self, Handler, MethodContext};
use crate::writer::ClassContext;

/// A branch offset to patch once all labels are bound.
#[derive(Debug)]
struct Fixup {
	/// The position of the instruction, offsets are relative to it.
	bci: u32,
	/// Where in the code the offset goes.
	at: usize,
	/// `2` or `4`.
	width: usize,
	label: Label,
}

#[derive(Debug)]
struct Catch {
	start: Label,
	end: Label,
	handler: Label,
	catch_type: Option<PoolEntry>,
}

/// Writes code elements into the code array and the tables of a `Code` attribute.
pub struct CodeWriter<'p, 'r> {
	pool: &'p mut PoolBuilder<'r>,
	labels: LabelArena,
	code: BufWriter,
	fixups: Vec<Fixup>,
	catches: Vec<Catch>,
	line_numbers: Vec<(u32, u16)>,
	local_variables: Vec<LocalVariable>,
	local_variable_types: Vec<LocalVariable>,
	frames: Vec<(u32, StackMapFrame)>,
	/// One more than the highest local variable slot used.
	max_slot: u32,
}

impl<'p, 'r> CodeWriter<'p, 'r> {
	pub(crate) fn new(pool: &'p mut PoolBuilder<'r>, labels: LabelArena) -> CodeWriter<'p, 'r> {
		CodeWriter {
			pool,
			labels,
			code: BufWriter::new(),
			fixups: Vec::new(),
			catches: Vec::new(),
			line_numbers: Vec::new(),
			local_variables: Vec::new(),
			local_variable_types: Vec::new(),
			frames: Vec::new(),
			max_slot: 0,
		}
	}

	/// The bytecode offset the next instruction gets written at.
	fn position(&self) -> u32 {
		self.code.len() as u32
	}

	pub(crate) fn write_element(&mut self, element: CodeElement<'r>) -> Result<()> {
		let pos = self.position();
		match element {
			CodeElement::Instruction(insn) => insn.write_to(self)?,
			CodeElement::Label(label) => self.labels.bind(label, pos)?,
			CodeElement::ExceptionCatch { start, end, handler, catch_type } => {
				for label in [start, end, handler] {
					self.labels.check(label)?;
				}
				self.catches.push(Catch { start, end, handler, catch_type });
			},
			CodeElement::LineNumber(line) => self.line_numbers.push((pos, line)),
			CodeElement::LocalVariable(variable) => {
				self.labels.check(variable.start)?;
				self.labels.check(variable.end)?;
				self.local_variables.push(variable);
			},
			CodeElement::LocalVariableType(variable) => {
				self.labels.check(variable.start)?;
				self.labels.check(variable.end)?;
				self.local_variable_types.push(variable);
			},
			CodeElement::Frame(frame) => {
				if self.frames.last().is_some_and(|&(last, _)| last == pos) {
					bail!("two stack map frames at bytecode offset {pos}");
				}
				self.frames.push((pos, frame));
			},
		}
		Ok(())
	}

	/// Writes an instruction at the current position.
	///
	/// Bound instructions are copied byte by byte if they have no labels and their pool entry is usable as it is.
	pub fn write_instruction(&mut self, insn: &Insn<'r>) -> Result<()> {
		let pos = self.position();
		let result = match insn {
			Insn::Bound(bound) if bound.can_copy_into(self.pool)? => {
				if matches!(bound.kind(), InstructionKind::Load | InstructionKind::Store | InstructionKind::Increment | InstructionKind::Discontinued) {
					self.track_locals(&bound.decode()?)?;
				}
				self.code.write_bytes(bound.bytes());
				Ok(())
			},
			Insn::Bound(bound) => {
				trace!("writing {bound:?} symbolically");
				self.write_unbound(pos, &bound.decode()?)
			},
			Insn::Unbound(instruction) => self.write_unbound(pos, instruction),
		};
		result.with_context(|| anyhow!("failed to write {insn:?} at bytecode offset {pos}"))
	}

	fn use_slot(&mut self, slot: u16, size: u16) {
		self.max_slot = self.max_slot.max(slot as u32 + size as u32);
	}

	fn track_locals(&mut self, instruction: &Instruction) -> Result<()> {
		match *instruction {
			Instruction::Load { kind, slot } | Instruction::Store { kind, slot } => self.use_slot(slot, kind.slot_size()),
			Instruction::Increment { slot, .. } | Instruction::Ret { slot } => self.use_slot(slot, 1),
			_ => {},
		}
		Ok(())
	}

	fn write_unbound(&mut self, pos: u32, instruction: &Instruction) -> Result<()> {
		let start = self.code.len();
		// the opcode of ldc depends on the index the entry gets in this pool
		let resolved;
		let instruction = match instruction {
			Instruction::ConstantLoad { entry } => {
				resolved = Instruction::ConstantLoad { entry: self.pool.maybe_clone(entry)? };
				&resolved
			},
			instruction => instruction,
		};
		self.track_locals(instruction)?;
		self.encode(pos, instruction)?;
		debug_assert_eq!(
			(self.code.len() - start) as u32, instruction.size_in_bytes(pos),
			"written size of {instruction:?} at {pos} differs from its computed size"
		);
		Ok(())
	}

	fn branch_placeholder(&mut self, bci: u32, width: usize, label: Label) -> Result<()> {
		self.labels.check(label)?;
		self.fixups.push(Fixup { bci, at: self.code.len(), width, label });
		if width == 4 {
			self.code.write_i32(0);
		} else {
			self.code.write_i16(0);
		}
		Ok(())
	}

	fn write_padding(&mut self, pos: u32) {
		for _ in 0..switch_padding(pos) {
			self.code.write_u8(0);
		}
	}

	fn encode(&mut self, pos: u32, instruction: &Instruction) -> Result<()> {
		let op = instruction.opcode();
		match instruction {
			&Instruction::Load { slot, .. } | &Instruction::Store { slot, .. } | &Instruction::Ret { slot } => {
				if instruction.is_wide() {
					self.code.write_u8(opcode::WIDE);
					self.code.write_u8(op);
					self.code.write_u16(slot);
				} else if op == opcode::RET || slot > 3 {
					self.code.write_u8(op);
					self.code.write_u8(slot as u8);
				} else {
					self.code.write_u8(op);
				}
			},
			&Instruction::Increment { slot, constant } => {
				if instruction.is_wide() {
					self.code.write_u8(opcode::WIDE);
					self.code.write_u8(op);
					self.code.write_u16(slot);
					self.code.write_i16(constant);
				} else {
					self.code.write_u8(op);
					self.code.write_u8(slot as u8);
					self.code.write_i8(constant as i8);
				}
			},
			&Instruction::Branch { opcode, target } => {
				if !matches!(opcode, opcode::IFEQ..=opcode::JSR | opcode::IFNULL..=opcode::JSR_W) {
					bail!("opcode {opcode:#x} isn't a branch");
				}
				self.code.write_u8(opcode);
				let width = if matches!(opcode, opcode::GOTO_W | opcode::JSR_W) { 4 } else { 2 };
				self.branch_placeholder(pos, width, target)?;
			},
			Instruction::LookupSwitch { default, cases } => {
				let mut cases = cases.clone();
				cases.sort_by_key(|case| case.value);
				if let Some(pair) = cases.windows(2).find(|pair| pair[0].value == pair[1].value) {
					bail!("lookupswitch has two cases for the value {}", pair[0].value);
				}
				let npairs = i32::try_from(cases.len())
					.map_err(|_| ClassFileError::IndexOverflow { what: "lookupswitch pairs", value: cases.len() as i64 })?;

				self.code.write_u8(op);
				self.write_padding(pos);
				self.branch_placeholder(pos, 4, *default)?;
				self.code.write_i32(npairs);
				for case in cases {
					self.code.write_i32(case.value);
					self.branch_placeholder(pos, 4, case.target)?;
				}
			},
			&Instruction::TableSwitch { low, high, default, ref cases } => {
				let targets = table_switch_targets(low, high, default, cases)?;

				self.code.write_u8(op);
				self.write_padding(pos);
				self.branch_placeholder(pos, 4, default)?;
				self.code.write_i32(low);
				self.code.write_i32(high);
				for target in targets {
					self.branch_placeholder(pos, 4, target)?;
				}
			},
			Instruction::Return { .. } | Instruction::Throw | Instruction::ArrayLoad { .. } | Instruction::ArrayStore { .. } |
			Instruction::Convert { .. } | Instruction::Operator { .. } | Instruction::Stack { .. } |
			Instruction::ConstantIntrinsic { .. } | Instruction::Monitor { .. } | Instruction::Nop => {
				self.code.write_u8(op);
			},
			Instruction::Field { field, .. } => {
				self.code.write_u8(op);
				self.code.write_index(self.pool, field)?.expect_tag(pool::FIELD_REF)?;
			},
			Instruction::Invoke { method, .. } => {
				self.code.write_u8(op);
				let method = self.code.write_index(self.pool, method)?;
				if op == opcode::INVOKEINTERFACE {
					let count = parse_method_descriptor(method.member_descriptor()?)?.arguments_size() + 1;
					let count = u8::try_from(count)
						.map_err(|_| ClassFileError::IndexOverflow { what: "invokeinterface count", value: count as i64 })?;
					self.code.write_u8(count);
					self.code.write_u8(0);
				}
			},
			Instruction::InvokeDynamic { entry } => {
				self.code.write_u8(op);
				self.code.write_index(self.pool, entry)?.expect_tag(pool::INVOKE_DYNAMIC)?;
				self.code.write_u16(0);
			},
			Instruction::NewObject { class } | Instruction::NewReferenceArray { class } | Instruction::TypeCheck { class, .. } => {
				self.code.write_u8(op);
				self.code.write_index(self.pool, class)?.expect_tag(pool::CLASS)?;
			},
			&Instruction::NewPrimitiveArray { array_type } => {
				self.code.write_u8(op);
				self.code.write_u8(array_type);
			},
			&Instruction::NewMultiArray { ref class, dimensions } => {
				if dimensions == 0 {
					bail!("multianewarray needs at least one dimension");
				}
				self.code.write_u8(op);
				self.code.write_index(self.pool, class)?.expect_tag(pool::CLASS)?;
				self.code.write_u8(dimensions);
			},
			&Instruction::ConstantArgument { opcode, value } => {
				self.code.write_u8(opcode);
				if opcode == opcode::BIPUSH {
					let value = i8::try_from(value)
						.map_err(|_| ClassFileError::IndexOverflow { what: "bipush value", value: value as i64 })?;
					self.code.write_i8(value);
				} else {
					self.code.write_i16(value);
				}
			},
			Instruction::ConstantLoad { entry } => {
				if !entry.is_loadable() {
					bail!("can't load the constant {entry:?}");
				}
				self.code.write_u8(op);
				if op == opcode::LDC {
					self.code.write_u8(entry.index() as u8);
				} else {
					self.code.write_u16(entry.index());
				}
			},
		}
		Ok(())
	}

	/// Resolves all labels and writes the whole `Code` attribute.
	///
	/// `max_stack` and `max_locals` are the values of the code this was read from, if any. The stack depth is always
	/// computed again, the old value is only used if that fails.
	pub(crate) fn finish(
		self,
		buf: &mut BufWriter,
		class: &ClassContext,
		method: &MethodContext,
		max_stack: Option<u16>,
		max_locals: Option<u16>,
	) -> Result<()> {
		let CodeWriter {
			pool,
			mut labels,
			mut code,
			fixups,
			catches,
			line_numbers,
			local_variables,
			local_variable_types,
			mut frames,
			max_slot,
		} = self;

		let code_len = code.len();
		if code_len == 0 {
			bail!("code must contain at least one instruction");
		}
		if code_len > u16::MAX as usize {
			return Err(ClassFileError::IndexOverflow { what: "code length", value: code_len as i64 }.into());
		}

		for fixup in &fixups {
			let target = labels.try_get(fixup.label)?;
			let offset = target as i64 - fixup.bci as i64;
			if fixup.width == 2 && i16::try_from(offset).is_err() {
				return Err(ClassFileError::BranchOffsetOverflow { bci: fixup.bci, offset }.into());
			}
			code.patch_int(fixup.at, fixup.width, offset)?;
		}

		let mut handlers = Vec::with_capacity(catches.len());
		for catch in catches {
			let start = labels.try_get(catch.start)?;
			let end = labels.try_get(catch.end)?;
			let handler = labels.try_get(catch.handler)?;
			if start >= end {
				debug!("dropping exception table entry with the empty range {start}..{end}");
				continue;
			}
			handlers.push(Handler { start, end, handler, catch_type: catch.catch_type });
		}

		// replaced unreachable code starts with an exception on the stack, like a handler
		let mut dead_code = Vec::new();
		if class.generates_stack_maps() {
			let required = frames::required_frames(code.as_slice(), &handlers)?;
			let given: HashSet<u32> = frames.iter().map(|&(pos, _)| pos).collect();
			if let Some((pos, reason)) = required.iter().find(|(pos, _)| !given.contains(pos)) {
				debug!("computing stack map frames, the {reason} at bytecode offset {pos} has none");
				let generated = frames::generate(&mut code, handlers, method, class.options.patch_dead_code, pool, &mut labels)
					.context("failed to compute stack map frames")?;
				frames = generated.frames;
				handlers = generated.handlers;
				dead_code = generated.dead_code;
			}
		}

		let mut exception_table = BufWriter::new();
		exception_table.write_list("exception table length", &handlers, |buf, handler| {
			buf.write_u16(handler.start as u16);
			buf.write_u16(handler.end as u16);
			buf.write_u16(handler.handler as u16);
			buf.write_index_or_zero(pool, handler.catch_type.as_ref())
		})?;

		let entry_points: Vec<u32> = handlers.iter().map(|handler| handler.handler).chain(dead_code).collect();
		let max_stack = match stack::analyze(code.as_slice(), &entry_points, &*pool) {
			Ok(analysis) => analysis.max_stack,
			Err(error) => match max_stack {
				Some(max_stack) => {
					debug!("keeping max stack of {max_stack}, failed to compute it: {error:#}");
					max_stack
				},
				None => return Err(error.context("failed to compute the max stack")),
			},
		};

		let arguments = parse_method_descriptor(method.descriptor)?.arguments_size() as u32;
		let receiver = if method.flags & access::STATIC == 0 { 1 } else { 0 };
		let max_locals = max_slot.max(arguments + receiver).max(max_locals.unwrap_or(0) as u32);
		let max_locals = u16::try_from(max_locals)
			.map_err(|_| ClassFileError::IndexOverflow { what: "max locals", value: max_locals as i64 })?;

		let mut attributes = BufWriter::new();
		let mut attributes_count = 0;

		let line_numbers: Vec<_> = line_numbers.into_iter()
			.filter(|&(pos, _)| (pos as usize) < code_len)
			.collect();
		if !line_numbers.is_empty() {
			let mut table = BufWriter::new();
			table.write_list("line number table length", &line_numbers, |buf, &(pos, line)| {
				buf.write_u16(pos as u16);
				buf.write_u16(line);
				Ok(())
			})?;
			write_table(&mut attributes, pool, attribute::LINE_NUMBER_TABLE, table)?;
			attributes_count += 1;
		}

		for (name, variables) in [
			(attribute::LOCAL_VARIABLE_TABLE, &local_variables),
			(attribute::LOCAL_VARIABLE_TYPE_TABLE, &local_variable_types),
		] {
			if variables.is_empty() {
				continue;
			}
			let mut table = BufWriter::new();
			table.write_list("local variable table length", variables, |buf, variable| {
				let start = labels.try_get(variable.start)?;
				let end = labels.try_get(variable.end)?;
				let length = end.checked_sub(start)
					.with_context(|| anyhow!("local variable {:?} ends at {end} before it starts at {start}", variable.name))?;
				buf.write_u16(start as u16);
				buf.write_u16(length as u16);
				buf.write_index(pool, &variable.name)?;
				buf.write_index(pool, &variable.descriptor)?;
				buf.write_u16(variable.slot);
				Ok(())
			})?;
			write_table(&mut attributes, pool, name, table)?;
			attributes_count += 1;
		}

		if !frames.is_empty() {
			let mut table = BufWriter::new();
			table.write_usize_as_u16("stack map frames count", frames.len())?;
			let mut previous: i64 = -1;
			for (pos, frame) in &frames {
				if *pos as usize >= code_len {
					bail!("stack map frame at bytecode offset {pos} isn't followed by an instruction");
				}
				let delta = *pos as i64 - previous - 1;
				write_frame(&mut table, pool, &labels, delta as u16, frame)
					.with_context(|| anyhow!("failed to write stack map frame at bytecode offset {pos}"))?;
				previous = *pos as i64;
			}
			write_table(&mut attributes, pool, attribute::STACK_MAP_TABLE, table)?;
			attributes_count += 1;
		}

		let name = pool.utf8(attribute::CODE)?;
		buf.write_index(pool, &name)?;
		buf.write_length_prefixed(|buf| {
			buf.write_u16(max_stack);
			buf.write_u16(max_locals);
			buf.write_usize_as_u32("code length", code_len)?;
			buf.write_bytes(code.as_slice());
			buf.write_bytes(exception_table.as_slice());
			buf.write_usize_as_u16("code attributes count", attributes_count)?;
			buf.write_bytes(attributes.as_slice());
			Ok(())
		})
	}
}

/// The jump targets of a `tableswitch`, one for each value in `low..=high`.
fn table_switch_targets(low: i32, high: i32, default: Label, cases: &[SwitchCase]) -> Result<Vec<Label>> {
	if low > high {
		bail!("tableswitch low {low} is greater than high {high}");
	}
	let count = high as i64 - low as i64 + 1;
	// each target takes four bytes, more wouldn't fit into a code array
	if count > u16::MAX as i64 / 4 {
		return Err(ClassFileError::IndexOverflow { what: "tableswitch range", value: count }.into());
	}
	let mut targets: Vec<Option<Label>> = vec![None; count as usize];
	for case in cases {
		if case.value < low || case.value > high {
			bail!("tableswitch case {} outside of its range {low}..={high}", case.value);
		}
		let slot = &mut targets[(case.value as i64 - low as i64) as usize];
		if slot.is_some() {
			bail!("tableswitch has two cases for the value {}", case.value);
		}
		*slot = Some(case.target);
	}
	Ok(targets.into_iter().map(|target| target.unwrap_or(default)).collect())
}

fn write_table(attributes: &mut BufWriter, pool: &mut PoolBuilder, name: &str, table: BufWriter) -> Result<()> {
	let name = pool.utf8(name)?;
	attributes.write_index(pool, &name)?;
	attributes.write_usize_as_u32("attribute length", table.len())?;
	attributes.write_bytes(table.as_slice());
	Ok(())
}

fn write_verification_type(buf: &mut BufWriter, pool: &mut PoolBuilder, labels: &LabelArena, value: &VerificationType) -> Result<()> {
	match value {
		VerificationType::Top => buf.write_u8(verification_type::TOP),
		VerificationType::Integer => buf.write_u8(verification_type::INTEGER),
		VerificationType::Float => buf.write_u8(verification_type::FLOAT),
		VerificationType::Double => buf.write_u8(verification_type::DOUBLE),
		VerificationType::Long => buf.write_u8(verification_type::LONG),
		VerificationType::Null => buf.write_u8(verification_type::NULL),
		VerificationType::UninitializedThis => buf.write_u8(verification_type::UNINITIALIZED_THIS),
		VerificationType::Object(class) => {
			buf.write_u8(verification_type::OBJECT);
			buf.write_index(pool, class)?.expect_tag(pool::CLASS)?;
		},
		&VerificationType::Uninitialized(label) => {
			buf.write_u8(verification_type::UNINITIALIZED);
			buf.write_u16(labels.try_get(label)? as u16);
		},
	}
	Ok(())
}

fn write_frame(buf: &mut BufWriter, pool: &mut PoolBuilder, labels: &LabelArena, delta: u16, frame: &StackMapFrame) -> Result<()> {
	match frame {
		StackMapFrame::Same if delta <= 63 => buf.write_u8(delta as u8),
		StackMapFrame::Same => {
			buf.write_u8(251);
			buf.write_u16(delta);
		},
		StackMapFrame::SameLocals1StackItem(stack) => {
			if delta <= 63 {
				buf.write_u8(64 + delta as u8);
			} else {
				buf.write_u8(247);
				buf.write_u16(delta);
			}
			write_verification_type(buf, pool, labels, stack)?;
		},
		&StackMapFrame::Chop(count) => {
			if !(1..=3).contains(&count) {
				bail!("can only chop 1 to 3 locals, not {count}");
			}
			buf.write_u8(251 - count);
			buf.write_u16(delta);
		},
		StackMapFrame::Append(locals) => {
			if !(1..=3).contains(&locals.len()) {
				bail!("can only append 1 to 3 locals, not {}", locals.len());
			}
			buf.write_u8(251 + locals.len() as u8);
			buf.write_u16(delta);
			for local in locals {
				write_verification_type(buf, pool, labels, local)?;
			}
		},
		StackMapFrame::Full { locals, stack } => {
			buf.write_u8(255);
			buf.write_u16(delta);
			buf.write_list("frame locals count", locals, |buf, local| write_verification_type(buf, pool, labels, local))?;
			buf.write_list("frame stack count", stack, |buf, item| write_verification_type(buf, pool, labels, item))?;
		},
	}
	Ok(())
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use java_string::JavaStr;
	use pretty_assertions::assert_eq;
	use crate::buf_writer::BufWriter;
	use crate::class_constants::{access, opcode, version};
	use crate::error::ClassFileError;
	use crate::instruction::decode::{branch_targets, read_instruction};
	use crate::instruction::{switch_padding, Instruction, SwitchCase, TypeKind};
	use crate::label::LabelArena;
	use crate::model::CodeElement;
	use crate::options::ParseOptions;
	use crate::pool::builder::PoolBuilder;
	use crate::writer::code::CodeWriter;
	use crate::writer::frames::MethodContext;
	use crate::writer::ClassContext;

	/// Writes the elements as the `Code` attribute of a `static void()` method in a class of the given version.
	fn write_attribute(elements: Vec<CodeElement<'static>>, labels: LabelArena, major_version: u16) -> Result<Vec<u8>> {
		let options = ParseOptions::default();
		let class = ClassContext { this_class: JavaStr::from_str("Written"), major_version, options: &options };
		let method = MethodContext {
			this_class: class.this_class,
			flags: access::STATIC,
			name: JavaStr::from_str("run"),
			descriptor: JavaStr::from_str("()V"),
		};
		let mut pool = PoolBuilder::new();
		let mut writer = CodeWriter::new(&mut pool, labels);
		for element in elements {
			writer.write_element(element)?;
		}
		let mut buf = BufWriter::new();
		writer.finish(&mut buf, &class, &method, None, None)?;
		Ok(buf.into_bytes())
	}

	/// Writes the elements as the code of a `static void()` method, returning `max_stack`, `max_locals` and the code.
	///
	/// The class has version 49, so no stack map frames get in the way of comparing the code.
	fn write(elements: Vec<CodeElement<'static>>, labels: LabelArena) -> Result<(u16, u16, Vec<u8>)> {
		let bytes = write_attribute(elements, labels, version::V1_6 - 1)?;
		let max_stack = u16::from_be_bytes([bytes[6], bytes[7]]);
		let max_locals = u16::from_be_bytes([bytes[8], bytes[9]]);
		let code_len = u32::from_be_bytes([bytes[10], bytes[11], bytes[12], bytes[13]]) as usize;
		Ok((max_stack, max_locals, bytes[14..14 + code_len].to_vec()))
	}

	/// The absolute targets of all branching instructions, with their positions.
	fn targets(code: &[u8]) -> Result<Vec<(u32, Vec<i64>)>> {
		let mut result = Vec::new();
		let mut pos = 0;
		while (pos as usize) < code.len() {
			let raw = read_instruction(code, pos)?;
			let targets = branch_targets(code, pos, &raw)?;
			if !targets.is_empty() {
				result.push((pos, targets));
			}
			pos += raw.size;
		}
		Ok(result)
	}

	#[test]
	fn branch_offsets() -> Result<()> {
		let mut labels = LabelArena::new();
		let top = labels.new_label();
		let end = labels.new_label();
		let elements = vec![
			CodeElement::Label(top),
			Instruction::ConstantIntrinsic { opcode: opcode::ICONST_0 }.into(),
			Instruction::branch(opcode::IFNE, end).into(),
			Instruction::goto(top).into(),
			Instruction::branch(opcode::GOTO_W, top).into(),
			CodeElement::Label(end),
			Instruction::return_void().into(),
		];
		let (max_stack, max_locals, code) = write(elements, labels)?;
		assert_eq!(code, vec![
			opcode::ICONST_0,
			opcode::IFNE, 0, 11,
			opcode::GOTO, 0xff, 0xfc,
			opcode::GOTO_W, 0xff, 0xff, 0xff, 0xf9,
			opcode::RETURN,
		]);
		assert_eq!(max_stack, 1);
		assert_eq!(max_locals, 0);
		Ok(())
	}

	#[test]
	fn missing_label() -> Result<()> {
		let mut labels = LabelArena::new();
		let nowhere = labels.new_label();
		let elements = vec![Instruction::goto(nowhere).into(), Instruction::return_void().into()];
		let error = write(elements, labels).unwrap_err();
		assert_eq!(ClassFileError::find(&error), Some(&ClassFileError::MissingLabelTarget { label: nowhere }));
		Ok(())
	}

	#[test]
	fn foreign_label() {
		let mut other = LabelArena::new();
		let foreign = other.new_label();
		let elements = vec![CodeElement::Label(foreign), Instruction::return_void().into()];
		let error = write(elements, LabelArena::new()).unwrap_err();
		assert_eq!(ClassFileError::find(&error), Some(&ClassFileError::ForeignLabel { label: foreign }));
	}

	#[test]
	fn branch_overflow() {
		let mut labels = LabelArena::new();
		let end = labels.new_label();
		let mut elements = vec![Instruction::goto(end).into()];
		elements.extend((0..40_000).map(|_| CodeElement::from(Instruction::Nop)));
		elements.push(CodeElement::Label(end));
		elements.push(Instruction::return_void().into());

		let error = write(elements, labels).unwrap_err();
		assert_eq!(ClassFileError::find(&error), Some(&ClassFileError::BranchOffsetOverflow { bci: 0, offset: 40_003 }));
	}

	#[test]
	fn switches_at_every_padding() -> Result<()> {
		for nops in 0..4u32 {
			let mut labels = LabelArena::new();
			let one = labels.new_label();
			let default = labels.new_label();
			let mut elements: Vec<CodeElement> = (0..nops).map(|_| Instruction::Nop.into()).collect();
			elements.push(Instruction::ConstantIntrinsic { opcode: opcode::ICONST_1 }.into());
			elements.push(Instruction::TableSwitch {
				low: 0,
				high: 2,
				default,
				cases: vec![SwitchCase { value: 1, target: one }],
			}.into());
			elements.push(CodeElement::Label(one));
			elements.push(Instruction::ConstantIntrinsic { opcode: opcode::ICONST_1 }.into());
			elements.push(Instruction::LookupSwitch {
				default,
				cases: vec![SwitchCase { value: 7, target: default }, SwitchCase { value: -3, target: default }],
			}.into());
			elements.push(CodeElement::Label(default));
			elements.push(Instruction::return_void().into());

			let (_, _, code) = write(elements, labels)?;

			let table = nops + 1;
			let table_size = 1 + switch_padding(table) + 12 + 3 * 4;
			let lookup = table + table_size + 1;
			let lookup_size = 1 + switch_padding(lookup) + 8 + 2 * 8;
			let end = (lookup + lookup_size) as i64;
			assert_eq!(code.len() as i64, end + 1);
			assert_eq!(targets(&code)?, vec![
				(table, vec![end, end, (table + table_size) as i64, end]),
				(lookup, vec![end, end, end]),
			]);
			// lookupswitch keys are sorted
			let keys_at = (lookup + 1 + switch_padding(lookup) + 8) as usize;
			assert_eq!(i32::from_be_bytes([code[keys_at], code[keys_at + 1], code[keys_at + 2], code[keys_at + 3]]), -3);
		}
		Ok(())
	}

	#[test]
	fn bad_switches() {
		let mut labels = LabelArena::new();
		let default = labels.new_label();
		let elements = vec![
			Instruction::ConstantIntrinsic { opcode: opcode::ICONST_0 }.into(),
			Instruction::TableSwitch { low: 0, high: 1, default, cases: vec![SwitchCase { value: 5, target: default }] }.into(),
			CodeElement::Label(default),
			Instruction::return_void().into(),
		];
		assert!(write(elements, labels).is_err());

		let mut labels = LabelArena::new();
		let default = labels.new_label();
		let case = SwitchCase { value: 5, target: default };
		let elements = vec![
			Instruction::ConstantIntrinsic { opcode: opcode::ICONST_0 }.into(),
			Instruction::LookupSwitch { default, cases: vec![case, case] }.into(),
			CodeElement::Label(default),
			Instruction::return_void().into(),
		];
		assert!(write(elements, labels).is_err());
	}

	#[test]
	fn wide_locals() -> Result<()> {
		let elements = vec![
			Instruction::load(TypeKind::Long, 300).into(),
			Instruction::store(TypeKind::Long, 2).into(),
			Instruction::increment(7, 1000).into(),
			Instruction::return_void().into(),
		];
		let (max_stack, max_locals, code) = write(elements, LabelArena::new())?;
		assert_eq!(code, vec![
			opcode::WIDE, opcode::LLOAD, 1, 44,
			opcode::LSTORE_2,
			opcode::WIDE, opcode::IINC, 0, 7, 0x03, 0xe8,
			opcode::RETURN,
		]);
		assert_eq!(max_stack, 2);
		assert_eq!(max_locals, 302);
		Ok(())
	}

	#[test]
	fn frames_for_branches() -> Result<()> {
		let elements = |labels: &mut LabelArena| {
			let end = labels.new_label();
			vec![
				Instruction::ConstantIntrinsic { opcode: opcode::ICONST_0 }.into(),
				Instruction::branch(opcode::IFEQ, end).into(),
				Instruction::Nop.into(),
				CodeElement::Label(end),
				Instruction::return_void().into(),
			]
		};

		let mut labels = LabelArena::new();
		let bytes = write_attribute(elements(&mut labels), labels, version::V1_8)?;
		// code length, then the empty exception table and one attribute
		assert_eq!(&bytes[10..14], &[0, 0, 0, 6]);
		assert_eq!(&bytes[20..24], &[0, 0, 0, 1]);
		// a StackMapTable of 3 bytes, holding one same frame at bytecode offset 5
		assert_eq!(&bytes[26..33], &[0, 0, 0, 3, 0, 1, 5]);

		let mut labels = LabelArena::new();
		let bytes = write_attribute(elements(&mut labels), labels, version::V1_6 - 1)?;
		assert_eq!(&bytes[20..24], &[0, 0, 0, 0]);
		Ok(())
	}

	#[test]
	fn empty_code() {
		assert!(write(Vec::new(), LabelArena::new()).is_err());
	}
}
