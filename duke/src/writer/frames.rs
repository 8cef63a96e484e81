//! Computing the `StackMapTable` of written code.
//!
//! Every path through the code is followed while tracking the types of the local variables and of the operand stack.
//! Where paths meet, their types are merged. There is no class hierarchy at hand, so two different reference types
//! merge to `java/lang/Object`.
//!
//! The verifier also wants a frame for code no path reaches. Such code gets replaced by `nop`s ending in `athrow`, with
//! a frame holding just a `java/lang/Throwable` on the stack, and exception table ranges are split around it.
use std::collections::{BTreeMap, HashMap};
use anyhow::{anyhow, bail, Context, Result};
use java_string::{JavaStr, JavaString};
use log::debug;
use crate::buf_writer::BufWriter;
use crate::class_constants::{access, array_type, opcode};
use crate::descriptor::{parse_field_descriptor, parse_method_descriptor, Type};
use crate::instruction::decode::{self, RawInstruction};
use crate::label::{Label, LabelArena};
use crate::model::{StackMapFrame, VerificationType};
use crate::pool::builder::PoolBuilder;
use crate::pool::{ConstantPool, EntryValue, PoolEntry};

const OBJECT: &str = "java/lang/Object";
const THROWABLE: &str = "java/lang/Throwable";

/// A resolved entry of the exception table.
#[derive(Debug, Clone)]
pub(crate) struct Handler {
	pub(crate) start: u32,
	pub(crate) end: u32,
	pub(crate) handler: u32,
	pub(crate) catch_type: Option<PoolEntry>,
}

impl Handler {
	fn covers(&self, pos: u32) -> bool {
		self.start <= pos && pos < self.end
	}
}

/// The method some code belongs to.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MethodContext<'a> {
	pub(crate) this_class: &'a JavaStr,
	pub(crate) flags: u16,
	pub(crate) name: &'a JavaStr,
	pub(crate) descriptor: &'a JavaStr,
}

/// The type of a local variable or a stack entry.
///
/// `long` and `double` take one stack entry, but two local variable slots, the second one holding [`Value::Top`].
#[derive(Debug, Clone, PartialEq)]
enum Value {
	Top,
	Integer,
	Float,
	Long,
	Double,
	Null,
	UninitializedThis,
	/// Created by the `new` at this bytecode offset.
	Uninitialized(u32),
	/// Named like a class entry names it: arrays by their descriptor, everything else by the internal name.
	Reference(JavaString),
}

impl Value {
	fn reference(name: &str) -> Value {
		Value::Reference(JavaString::from(name))
	}

	fn from_type(value: &Type) -> Value {
		match value {
			Type::B | Type::C | Type::I | Type::S | Type::Z => Value::Integer,
			Type::F => Value::Float,
			Type::J => Value::Long,
			Type::D => Value::Double,
			Type::Object(name) => Value::Reference(name.clone()),
			array @ Type::Array(..) => Value::Reference(array.to_descriptor()),
		}
	}

	fn from_descriptor(descriptor: &JavaStr) -> Result<Value> {
		Ok(Value::from_type(&parse_field_descriptor(descriptor)?))
	}

	fn is_wide(&self) -> bool {
		matches!(self, Value::Long | Value::Double)
	}

	fn merge(&self, other: &Value) -> Value {
		match (self, other) {
			(a, b) if a == b => a.clone(),
			(Value::Null, reference @ Value::Reference(_)) | (reference @ Value::Reference(_), Value::Null) => reference.clone(),
			(Value::Reference(_), Value::Reference(_)) => Value::reference(OBJECT),
			_ => Value::Top,
		}
	}

	/// The type of the elements of an array of this type.
	fn component(&self) -> Value {
		match self {
			Value::Reference(name) => match name.strip_prefix('[') {
				Some(component) if component.starts_with('[') => Value::Reference(component.to_owned()),
				Some(component) => component.strip_prefix('L')
					.and_then(|component| component.strip_suffix(';'))
					.map_or_else(|| Value::reference(OBJECT), |name| Value::Reference(name.to_owned())),
				None => Value::reference(OBJECT),
			},
			Value::Null => Value::Null,
			_ => Value::reference(OBJECT),
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
struct Frame {
	/// One entry per slot.
	locals: Vec<Value>,
	/// One entry per value.
	stack: Vec<Value>,
}

impl Frame {
	fn initial(method: &MethodContext) -> Result<Frame> {
		let mut frame = Frame { locals: Vec::new(), stack: Vec::new() };
		if method.flags & access::STATIC == 0 {
			frame.locals.push(if method.name == "<init>" && method.this_class != OBJECT {
				Value::UninitializedThis
			} else {
				Value::Reference(method.this_class.to_owned())
			});
		}
		for parameter in parse_method_descriptor(method.descriptor)?.parameters {
			let value = Value::from_type(&parameter);
			let wide = value.is_wide();
			frame.locals.push(value);
			if wide {
				frame.locals.push(Value::Top);
			}
		}
		Ok(frame)
	}

	fn push(&mut self, value: Value) {
		self.stack.push(value);
	}

	fn pop(&mut self) -> Result<Value> {
		self.stack.pop().ok_or_else(|| anyhow!("stack underflow"))
	}

	fn pop_many(&mut self, count: usize) -> Result<()> {
		for _ in 0..count {
			self.pop()?;
		}
		Ok(())
	}

	fn load(&self, slot: u16) -> Value {
		self.locals.get(slot as usize).cloned().unwrap_or(Value::Top)
	}

	fn store(&mut self, slot: u16, value: Value) {
		let slot = slot as usize;
		let size = if value.is_wide() { 2 } else { 1 };
		if self.locals.len() < slot + size {
			self.locals.resize(slot + size, Value::Top);
		}
		// the second half of a long or double being overwritten
		if slot > 0 && self.locals[slot - 1].is_wide() {
			self.locals[slot - 1] = Value::Top;
		}
		self.locals[slot] = value;
		if size == 2 {
			self.locals[slot + 1] = Value::Top;
		}
	}

	/// Replaces every occurrence of an uninitialized object by the initialized one.
	fn initialize(&mut self, uninitialized: &Value, initialized: Value) {
		for value in self.locals.iter_mut().chain(self.stack.iter_mut()) {
			if value == uninitialized {
				*value = initialized.clone();
			}
		}
	}

	/// Merges `other` into this frame, returning whether this frame changed.
	fn merge(&mut self, other: &Frame) -> Result<bool> {
		if self.stack.len() != other.stack.len() {
			bail!("inconsistent stack heights {} and {}", self.stack.len(), other.stack.len());
		}
		let mut changed = false;
		for (value, other) in self.stack.iter_mut().zip(&other.stack) {
			if value.is_wide() != other.is_wide() {
				bail!("inconsistent stack entries {value:?} and {other:?}");
			}
			let merged = value.merge(other);
			if merged != *value {
				*value = merged;
				changed = true;
			}
		}
		if other.locals.len() < self.locals.len() {
			self.locals.truncate(other.locals.len());
			changed = true;
		}
		for (value, other) in self.locals.iter_mut().zip(&other.locals) {
			let merged = value.merge(other);
			if merged != *value {
				*value = merged;
				changed = true;
			}
		}
		Ok(changed)
	}

	/// The locals as a frame lists them: `long` and `double` take one entry, and trailing unusable slots are left out.
	fn frame_locals(&self) -> Vec<Value> {
		let mut locals = Vec::with_capacity(self.locals.len());
		let mut slots = self.locals.iter();
		while let Some(value) = slots.next() {
			if value.is_wide() {
				slots.next();
			}
			locals.push(value.clone());
		}
		while locals.last() == Some(&Value::Top) {
			locals.pop();
		}
		locals
	}
}

/// Follows all paths through some code.
struct Analysis<'a> {
	code: &'a [u8],
	pool: &'a dyn ConstantPool,
	method: &'a MethodContext<'a>,
	handlers: &'a [Handler],
	/// The frame before each instruction, [`None`] where no path leads.
	frames: Vec<Option<Frame>>,
	worklist: Vec<u32>,
}

impl<'a> Analysis<'a> {
	fn run(code: &'a [u8], pool: &'a dyn ConstantPool, method: &'a MethodContext<'a>, handlers: &'a [Handler]) -> Result<Vec<Option<Frame>>> {
		let mut analysis = Analysis { code, pool, method, handlers, frames: vec![None; code.len()], worklist: Vec::new() };
		analysis.enter(0, Frame::initial(method)?, 0)?;
		while let Some(pos) = analysis.worklist.pop() {
			analysis.step(pos)
				.with_context(|| anyhow!("failed to compute the frame after bytecode offset {pos}"))?;
		}
		Ok(analysis.frames)
	}

	fn enter(&mut self, pos: i64, frame: Frame, from: u32) -> Result<()> {
		if pos < 0 || pos >= self.code.len() as i64 {
			bail!("jump from bytecode offset {from} to {pos} out of bounds for code length {}", self.code.len());
		}
		let pos = pos as usize;
		let changed = match &mut self.frames[pos] {
			Some(known) => known.merge(&frame)
				.with_context(|| anyhow!("paths meeting at bytecode offset {pos} don't agree"))?,
			slot @ None => {
				*slot = Some(frame);
				true
			},
		};
		if changed {
			self.worklist.push(pos as u32);
		}
		Ok(())
	}

	fn step(&mut self, pos: u32) -> Result<()> {
		let Some(before) = self.frames[pos as usize].clone() else { return Ok(()) };
		let (code, handlers) = (self.code, self.handlers);
		let raw = decode::read_instruction(code, pos)?;
		let mut after = before.clone();
		self.execute(&mut after, pos, &raw)?;

		for handler in handlers.iter().filter(|handler| handler.covers(pos)) {
			let exception = match &handler.catch_type {
				Some(catch_type) => Value::Reference(catch_type.as_class_name()?.to_owned()),
				None => Value::reference(THROWABLE),
			};
			for locals in [&before.locals, &after.locals] {
				let frame = Frame { locals: locals.clone(), stack: vec![exception.clone()] };
				self.enter(handler.handler as i64, frame, pos)?;
			}
		}
		for target in decode::branch_targets(code, pos, &raw)? {
			self.enter(target, after.clone(), pos)?;
		}
		if !decode::ends_flow(raw.opcode) {
			let next = pos + raw.size;
			if next as usize >= code.len() {
				bail!("execution falls off the end of the code after bytecode offset {pos}");
			}
			self.enter(next as i64, after, pos)?;
		}
		Ok(())
	}

	fn entry(&self, pos: u32, raw: &RawInstruction) -> Result<PoolEntry> {
		let index = decode::pool_index(self.code, pos, raw)?
			.with_context(|| anyhow!("instruction at bytecode offset {pos} has no constant pool index"))?;
		self.pool.entry_by_index(index)
	}

	fn class_name(&self, pos: u32, raw: &RawInstruction) -> Result<JavaString> {
		Ok(self.entry(pos, raw)?.as_class_name()?.to_owned())
	}

	fn execute(&self, frame: &mut Frame, pos: u32, raw: &RawInstruction) -> Result<()> {
		let op = raw.opcode;
		match op {
			opcode::NOP | opcode::IINC | opcode::GOTO | opcode::GOTO_W | opcode::RETURN => {},
			opcode::ACONST_NULL => frame.push(Value::Null),
			opcode::ICONST_M1..=opcode::ICONST_5 | opcode::BIPUSH | opcode::SIPUSH => frame.push(Value::Integer),
			opcode::LCONST_0 | opcode::LCONST_1 => frame.push(Value::Long),
			opcode::FCONST_0..=opcode::FCONST_2 => frame.push(Value::Float),
			opcode::DCONST_0 | opcode::DCONST_1 => frame.push(Value::Double),
			opcode::LDC..=opcode::LDC2_W => {
				let entry = self.entry(pos, raw)?;
				frame.push(match entry.value() {
					EntryValue::Integer(_) => Value::Integer,
					EntryValue::Float(_) => Value::Float,
					EntryValue::Long(_) => Value::Long,
					EntryValue::Double(_) => Value::Double,
					EntryValue::String { .. } => Value::reference("java/lang/String"),
					EntryValue::Class { .. } => Value::reference("java/lang/Class"),
					EntryValue::MethodType { .. } => Value::reference("java/lang/invoke/MethodType"),
					EntryValue::MethodHandle { .. } => Value::reference("java/lang/invoke/MethodHandle"),
					EntryValue::Dynamic { .. } => Value::from_descriptor(entry.member_descriptor()?)?,
					_ => bail!("can't load the constant {entry:?}"),
				});
			},
			opcode::ILOAD..=opcode::ALOAD | opcode::ILOAD_0..=opcode::ALOAD_3 => {
				let ordinal = if op <= opcode::ALOAD { op - opcode::ILOAD } else { (op - opcode::ILOAD_0) / 4 };
				let slot = decode::local_slot(self.code, pos, raw)?
					.with_context(|| anyhow!("load at bytecode offset {pos} has no local variable"))?;
				frame.push(match ordinal {
					0 => Value::Integer,
					1 => Value::Long,
					2 => Value::Float,
					3 => Value::Double,
					_ => frame.load(slot),
				});
			},
			opcode::ISTORE..=opcode::ASTORE | opcode::ISTORE_0..=opcode::ASTORE_3 => {
				let slot = decode::local_slot(self.code, pos, raw)?
					.with_context(|| anyhow!("store at bytecode offset {pos} has no local variable"))?;
				let value = frame.pop()?;
				frame.store(slot, value);
			},
			opcode::IALOAD..=opcode::SALOAD => {
				frame.pop()?;
				let array = frame.pop()?;
				frame.push(match op {
					opcode::LALOAD => Value::Long,
					opcode::FALOAD => Value::Float,
					opcode::DALOAD => Value::Double,
					opcode::AALOAD => array.component(),
					_ => Value::Integer,
				});
			},
			opcode::IASTORE..=opcode::SASTORE => frame.pop_many(3)?,
			opcode::POP => {
				frame.pop()?;
			},
			opcode::POP2 => {
				if !frame.pop()?.is_wide() {
					frame.pop()?;
				}
			},
			opcode::DUP..=opcode::SWAP => duplicate(frame, op)?,
			opcode::IADD..=opcode::DNEG => {
				let operands = if op >= opcode::INEG { 1 } else { 2 };
				frame.pop_many(operands)?;
				frame.push(match (op - opcode::IADD) % 4 {
					0 => Value::Integer,
					1 => Value::Long,
					2 => Value::Float,
					_ => Value::Double,
				});
			},
			opcode::ISHL..=opcode::LXOR => {
				frame.pop_many(2)?;
				frame.push(if (op - opcode::ISHL) % 2 == 0 { Value::Integer } else { Value::Long });
			},
			opcode::I2L..=opcode::I2S => {
				frame.pop()?;
				frame.push(match op {
					opcode::I2L | opcode::F2L | opcode::D2L => Value::Long,
					opcode::I2F | opcode::L2F | opcode::D2F => Value::Float,
					opcode::I2D | opcode::L2D | opcode::F2D => Value::Double,
					_ => Value::Integer,
				});
			},
			opcode::LCMP..=opcode::DCMPG => {
				frame.pop_many(2)?;
				frame.push(Value::Integer);
			},
			opcode::IFEQ..=opcode::IFLE | opcode::IFNULL | opcode::IFNONNULL => {
				frame.pop()?;
			},
			opcode::IF_ICMPEQ..=opcode::IF_ACMPNE => frame.pop_many(2)?,
			opcode::JSR | opcode::JSR_W | opcode::RET => bail!("can't compute frames for code using jsr and ret"),
			opcode::TABLESWITCH | opcode::LOOKUPSWITCH | opcode::IRETURN..=opcode::ARETURN | opcode::ATHROW |
			opcode::MONITORENTER | opcode::MONITOREXIT => {
				frame.pop()?;
			},
			opcode::GETSTATIC..=opcode::PUTFIELD => {
				let entry = self.entry(pos, raw)?;
				let value = Value::from_descriptor(entry.member_descriptor()?)?;
				match op {
					opcode::GETSTATIC => frame.push(value),
					opcode::PUTSTATIC => frame.pop_many(1)?,
					opcode::GETFIELD => {
						frame.pop()?;
						frame.push(value);
					},
					_ => frame.pop_many(2)?,
				}
			},
			opcode::INVOKEVIRTUAL..=opcode::INVOKEDYNAMIC => {
				let entry = self.entry(pos, raw)?;
				let descriptor = parse_method_descriptor(entry.member_descriptor()?)?;
				frame.pop_many(descriptor.parameters.len())?;
				if !matches!(op, opcode::INVOKESTATIC | opcode::INVOKEDYNAMIC) {
					let receiver = frame.pop()?;
					if op == opcode::INVOKESPECIAL && entry.as_member_ref()?.1 == "<init>" {
						let initialized = match receiver {
							Value::UninitializedThis => Value::Reference(self.method.this_class.to_owned()),
							Value::Uninitialized(new) => {
								let raw = decode::read_instruction(self.code, new)?;
								Value::Reference(self.class_name(new, &raw)?)
							},
							_ => bail!("constructor called on the initialized {receiver:?}"),
						};
						frame.initialize(&receiver, initialized);
					}
				}
				if let Some(return_type) = &descriptor.return_type {
					frame.push(Value::from_type(return_type));
				}
			},
			opcode::NEW => frame.push(Value::Uninitialized(pos)),
			opcode::NEWARRAY => {
				frame.pop()?;
				let descriptor = match decode::u8_at(self.code, pos + 1)? {
					array_type::T_BOOLEAN => "[Z",
					array_type::T_CHAR => "[C",
					array_type::T_FLOAT => "[F",
					array_type::T_DOUBLE => "[D",
					array_type::T_BYTE => "[B",
					array_type::T_SHORT => "[S",
					array_type::T_INT => "[I",
					array_type::T_LONG => "[J",
					x => bail!("unknown newarray type {x}"),
				};
				frame.push(Value::reference(descriptor));
			},
			opcode::ANEWARRAY => {
				frame.pop()?;
				let class = self.class_name(pos, raw)?;
				let mut array = JavaString::from("[");
				if class.starts_with('[') {
					array.push_java_str(&class);
				} else {
					array.push('L');
					array.push_java_str(&class);
					array.push(';');
				}
				frame.push(Value::Reference(array));
			},
			opcode::ARRAYLENGTH | opcode::INSTANCEOF => {
				frame.pop()?;
				frame.push(Value::Integer);
			},
			opcode::CHECKCAST => {
				frame.pop()?;
				frame.push(Value::Reference(self.class_name(pos, raw)?));
			},
			opcode::MULTIANEWARRAY => {
				frame.pop_many(decode::u8_at(self.code, pos + 3)? as usize)?;
				frame.push(Value::Reference(self.class_name(pos, raw)?));
			},
			x => bail!("unknown opcode {x:#x} at bytecode offset {pos}"),
		}
		Ok(())
	}
}

/// The `dup`, `pop` and `swap` forms, which depend on whether the values taken are `long` or `double`.
fn duplicate(frame: &mut Frame, op: u8) -> Result<()> {
	let first = frame.pop()?;
	match op {
		opcode::DUP => {
			frame.push(first.clone());
			frame.push(first);
		},
		opcode::DUP_X1 => {
			let second = frame.pop()?;
			frame.stack.extend([first.clone(), second, first]);
		},
		opcode::DUP_X2 => {
			let second = frame.pop()?;
			if second.is_wide() {
				frame.stack.extend([first.clone(), second, first]);
			} else {
				let third = frame.pop()?;
				frame.stack.extend([first.clone(), third, second, first]);
			}
		},
		opcode::DUP2 if first.is_wide() => {
			frame.push(first.clone());
			frame.push(first);
		},
		opcode::DUP2 => {
			let second = frame.pop()?;
			frame.stack.extend([second.clone(), first.clone(), second, first]);
		},
		opcode::DUP2_X1 if first.is_wide() => {
			let second = frame.pop()?;
			frame.stack.extend([first.clone(), second, first]);
		},
		opcode::DUP2_X1 => {
			let second = frame.pop()?;
			let third = frame.pop()?;
			frame.stack.extend([second.clone(), first.clone(), third, second, first]);
		},
		opcode::DUP2_X2 if first.is_wide() => {
			let second = frame.pop()?;
			if second.is_wide() {
				frame.stack.extend([first.clone(), second, first]);
			} else {
				let third = frame.pop()?;
				frame.stack.extend([first.clone(), third, second, first]);
			}
		},
		opcode::DUP2_X2 => {
			let second = frame.pop()?;
			let third = frame.pop()?;
			if third.is_wide() {
				frame.stack.extend([second.clone(), first.clone(), third, second, first]);
			} else {
				let fourth = frame.pop()?;
				frame.stack.extend([second.clone(), first.clone(), fourth, third, second, first]);
			}
		},
		_ => {
			let second = frame.pop()?;
			frame.stack.extend([first, second]);
		},
	}
	Ok(())
}

/// Where the verifier needs a stack map frame in some code, and why.
///
/// These are the targets of branches and switches, the exception handlers, and the start of each run of instructions
/// no path reaches. Handlers are only reached from instructions they cover which are reached themselves.
pub(crate) fn required_frames(code: &[u8], handlers: &[Handler]) -> Result<BTreeMap<u32, &'static str>> {
	let instructions = instructions(code)?;
	let reached = reachable(code, &instructions, handlers)?;
	let mut required = BTreeMap::new();
	let mut previous_reached = true;
	for (&pos, raw) in &instructions {
		for target in decode::branch_targets(code, pos, raw)? {
			required.insert(target as u32, "branch target");
		}
		let is_reached = reached.get(&pos).copied().unwrap_or(false);
		if !is_reached && previous_reached {
			required.insert(pos, "unreachable code");
		}
		previous_reached = is_reached;
	}
	for handler in handlers {
		if reached.get(&handler.handler).copied().unwrap_or(false) {
			required.insert(handler.handler, "exception handler");
		}
	}
	Ok(required)
}

/// All instructions by their bytecode offset.
fn instructions(code: &[u8]) -> Result<BTreeMap<u32, RawInstruction>> {
	let mut instructions = BTreeMap::new();
	let mut pos = 0;
	while (pos as usize) < code.len() {
		let raw = decode::read_instruction(code, pos)?;
		let size = raw.size;
		instructions.insert(pos, raw);
		pos += size;
	}
	Ok(instructions)
}

/// Whether each instruction is reached on some path.
fn reachable(code: &[u8], instructions: &BTreeMap<u32, RawInstruction>, handlers: &[Handler]) -> Result<HashMap<u32, bool>> {
	let mut reached: HashMap<u32, bool> = instructions.keys().map(|&pos| (pos, false)).collect();
	let mut worklist = vec![0];
	while let Some(pos) = worklist.pop() {
		match reached.get_mut(&pos) {
			Some(true) => continue,
			Some(seen) => *seen = true,
			None => bail!("bytecode offset {pos} isn't the start of an instruction"),
		}
		let raw = &instructions[&pos];
		for target in decode::branch_targets(code, pos, raw)? {
			worklist.push(u32::try_from(target).map_err(|_| anyhow!("branch target {target} out of bounds"))?);
		}
		if !decode::ends_flow(raw.opcode) && ((pos + raw.size) as usize) < code.len() {
			worklist.push(pos + raw.size);
		}
		worklist.extend(handlers.iter().filter(|handler| handler.covers(pos)).map(|handler| handler.handler));
	}
	Ok(reached)
}

/// Frames computed for some code.
#[derive(Debug)]
pub(crate) struct Generated {
	pub(crate) frames: Vec<(u32, StackMapFrame)>,
	/// The exception table, without the unreachable code.
	pub(crate) handlers: Vec<Handler>,
	/// Where unreachable code got replaced, each starting with a `java/lang/Throwable` on the stack.
	pub(crate) dead_code: Vec<u32>,
}

/// Computes the stack map frames of `code`, replacing unreachable code unless `patch_dead_code` is off.
///
/// New `Uninitialized` verification types get labels of `labels`, bound to the `new` instruction.
pub(crate) fn generate(
	code: &mut BufWriter,
	handlers: Vec<Handler>,
	method: &MethodContext,
	patch_dead_code: bool,
	pool: &mut PoolBuilder,
	labels: &mut LabelArena,
) -> Result<Generated> {
	let frames = Analysis::run(code.as_slice(), &*pool, method, &handlers)?;
	let instructions = instructions(code.as_slice())?;

	// runs of unreachable instructions, as start and end
	let mut dead_blocks: Vec<(u32, u32)> = Vec::new();
	for (&pos, raw) in &instructions {
		if frames[pos as usize].is_some() {
			continue;
		}
		match dead_blocks.last_mut() {
			Some((_, end)) if *end == pos => *end = pos + raw.size,
			_ => dead_blocks.push((pos, pos + raw.size)),
		}
	}
	if let Some(&(start, _)) = dead_blocks.first() {
		if !patch_dead_code {
			bail!("unreachable code at bytecode offset {start}");
		}
	}
	for &(start, end) in &dead_blocks {
		debug!("replacing unreachable code at {start}..{end}");
		for pos in start..end - 1 {
			code.patch_int(pos as usize, 1, opcode::NOP as i64)?;
		}
		code.patch_int((end - 1) as usize, 1, opcode::ATHROW as i64)?;
	}
	let handlers = split_around(handlers, &dead_blocks);

	let code = code.as_slice();
	let required = required_frames(code, &handlers)?;
	let initial = Frame::initial(method)?;
	let mut previous = initial.frame_locals();
	let mut uninitialized = HashMap::new();
	let mut result = Vec::with_capacity(required.len());
	for &pos in required.keys() {
		let frame = match &frames[pos as usize] {
			Some(frame) => frame.clone(),
			None => Frame { locals: Vec::new(), stack: vec![Value::reference(THROWABLE)] },
		};
		let locals = frame.frame_locals();
		let compressed = compress(&previous, &locals, &frame.stack);
		let mut converter = Converter { pool: &mut *pool, labels: &mut *labels, uninitialized: &mut uninitialized };
		result.push((pos, converter.frame(compressed)?));
		previous = locals;
	}

	Ok(Generated {
		frames: result,
		handlers,
		dead_code: dead_blocks.iter().map(|&(start, _)| start).collect(),
	})
}

/// Removes the unreachable code from the ranges of the exception table.
fn split_around(handlers: Vec<Handler>, dead_blocks: &[(u32, u32)]) -> Vec<Handler> {
	let mut result = Vec::with_capacity(handlers.len());
	for handler in handlers {
		let mut start = handler.start;
		for &(dead_start, dead_end) in dead_blocks {
			if dead_end <= start || dead_start >= handler.end {
				continue;
			}
			if start < dead_start {
				result.push(Handler { start, end: dead_start, ..handler.clone() });
			}
			start = dead_end;
		}
		if start < handler.end {
			result.push(Handler { start, ..handler });
		}
	}
	result
}

/// A frame in its compressed form, still using [`Value`]s.
enum Compressed<'a> {
	Same,
	SameLocals1StackItem(&'a Value),
	Chop(u8),
	Append(&'a [Value]),
	Full { locals: &'a [Value], stack: &'a [Value] },
}

/// Picks the shortest form of a frame, relative to the locals of the frame before.
fn compress<'a>(previous: &[Value], locals: &'a [Value], stack: &'a [Value]) -> Compressed<'a> {
	if locals == previous {
		match stack {
			[] => return Compressed::Same,
			[item] => return Compressed::SameLocals1StackItem(item),
			_ => {},
		}
	}
	if stack.is_empty() {
		if locals.len() < previous.len() && previous.len() - locals.len() <= 3 && previous.starts_with(locals) {
			return Compressed::Chop((previous.len() - locals.len()) as u8);
		}
		if locals.len() > previous.len() && locals.len() - previous.len() <= 3 && locals.starts_with(previous) {
			return Compressed::Append(&locals[previous.len()..]);
		}
	}
	Compressed::Full { locals, stack }
}

/// Turns [`Value`]s into [`VerificationType`]s, adding the class entries and labels they need.
struct Converter<'c, 'r> {
	pool: &'c mut PoolBuilder<'r>,
	labels: &'c mut LabelArena,
	/// The label of each `new` instruction referenced so far.
	uninitialized: &'c mut HashMap<u32, Label>,
}

impl Converter<'_, '_> {
	fn frame(&mut self, frame: Compressed) -> Result<StackMapFrame> {
		Ok(match frame {
			Compressed::Same => StackMapFrame::Same,
			Compressed::SameLocals1StackItem(item) => StackMapFrame::SameLocals1StackItem(self.value(item)?),
			Compressed::Chop(count) => StackMapFrame::Chop(count),
			Compressed::Append(locals) => StackMapFrame::Append(self.values(locals)?),
			Compressed::Full { locals, stack } => StackMapFrame::Full {
				locals: self.values(locals)?,
				stack: self.values(stack)?,
			},
		})
	}

	fn values(&mut self, values: &[Value]) -> Result<Vec<VerificationType>> {
		values.iter().map(|value| self.value(value)).collect()
	}

	fn value(&mut self, value: &Value) -> Result<VerificationType> {
		Ok(match value {
			Value::Top => VerificationType::Top,
			Value::Integer => VerificationType::Integer,
			Value::Float => VerificationType::Float,
			Value::Long => VerificationType::Long,
			Value::Double => VerificationType::Double,
			Value::Null => VerificationType::Null,
			Value::UninitializedThis => VerificationType::UninitializedThis,
			&Value::Uninitialized(new) => {
				let label = match self.uninitialized.get(&new) {
					Some(&label) => label,
					None => {
						let label = self.labels.new_label();
						self.labels.bind(label, new)?;
						self.uninitialized.insert(new, label);
						label
					},
				};
				VerificationType::Uninitialized(label)
			},
			Value::Reference(name) => {
				let name = self.pool.utf8_entry(name)?;
				VerificationType::Object(self.pool.class_entry(&name)?)
			},
		})
	}
}
