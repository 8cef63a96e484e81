//! Helpers shared by the integration tests: an assembler for raw class files, and an interpreter for methods that
//! only work with `int`s.
#![allow(dead_code)]

use std::collections::HashMap;
use anyhow::{anyhow, bail, Context, Result};
use java_string::JavaStr;
use duke::class_constants::opcode;
use duke::descriptor::parse_method_descriptor;
use duke::instruction::{Insn, Instruction, TypeKind};
use duke::model::{ClassModel, CodeElement};
use duke::options::ParseOptions;
use duke::pool::EntryValue;

/// Assembles a class file byte by byte. Constant pool entries are not deduplicated.
pub struct Assembler {
	pool: Vec<u8>,
	pool_count: u16,
	methods: Vec<u8>,
	methods_count: u16,
	attributes: Vec<u8>,
	attributes_count: u16,
}

fn u16(buf: &mut Vec<u8>, value: u16) {
	buf.extend_from_slice(&value.to_be_bytes());
}

fn u32(buf: &mut Vec<u8>, value: u32) {
	buf.extend_from_slice(&value.to_be_bytes());
}

impl Assembler {
	pub fn new() -> Assembler {
		Assembler {
			pool: Vec::new(),
			pool_count: 1,
			methods: Vec::new(),
			methods_count: 0,
			attributes: Vec::new(),
			attributes_count: 0,
		}
	}

	fn entry(&mut self, tag: u8, body: &[u8], width: u16) -> u16 {
		let index = self.pool_count;
		self.pool.push(tag);
		self.pool.extend_from_slice(body);
		self.pool_count += width;
		index
	}

	pub fn utf8(&mut self, value: &str) -> u16 {
		let mut body = Vec::new();
		u16(&mut body, value.len() as u16);
		body.extend_from_slice(value.as_bytes());
		self.entry(1, &body, 1)
	}

	pub fn int(&mut self, value: i32) -> u16 {
		self.entry(3, &value.to_be_bytes(), 1)
	}

	pub fn long(&mut self, value: i64) -> u16 {
		self.entry(5, &value.to_be_bytes(), 2)
	}

	pub fn class(&mut self, name: &str) -> u16 {
		let name = self.utf8(name);
		self.entry(7, &name.to_be_bytes(), 1)
	}

	pub fn string(&mut self, value: &str) -> u16 {
		let value = self.utf8(value);
		self.entry(8, &value.to_be_bytes(), 1)
	}

	pub fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
		let name = self.utf8(name);
		let descriptor = self.utf8(descriptor);
		let mut body = Vec::new();
		u16(&mut body, name);
		u16(&mut body, descriptor);
		self.entry(12, &body, 1)
	}

	fn member_ref(&mut self, tag: u8, owner: &str, name: &str, descriptor: &str) -> u16 {
		let class = self.class(owner);
		let name_and_type = self.name_and_type(name, descriptor);
		let mut body = Vec::new();
		u16(&mut body, class);
		u16(&mut body, name_and_type);
		self.entry(tag, &body, 1)
	}

	pub fn field_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
		self.member_ref(9, owner, name, descriptor)
	}

	pub fn method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
		self.member_ref(10, owner, name, descriptor)
	}

	/// Adds a method with a `Code` attribute. Exception table entries are `(start, end, handler, catch_type)`.
	pub fn method(
		&mut self,
		flags: u16,
		name: &str,
		descriptor: &str,
		max_stack: u16,
		max_locals: u16,
		code: &[u8],
		exceptions: &[(u16, u16, u16, u16)],
	) -> &mut Self {
		let name = self.utf8(name);
		let descriptor = self.utf8(descriptor);
		let code_name = self.utf8("Code");

		u16(&mut self.methods, flags);
		u16(&mut self.methods, name);
		u16(&mut self.methods, descriptor);
		u16(&mut self.methods, 1);
		u16(&mut self.methods, code_name);
		u32(&mut self.methods, 12 + code.len() as u32 + 8 * exceptions.len() as u32);
		u16(&mut self.methods, max_stack);
		u16(&mut self.methods, max_locals);
		u32(&mut self.methods, code.len() as u32);
		self.methods.extend_from_slice(code);
		u16(&mut self.methods, exceptions.len() as u16);
		for &(start, end, handler, catch_type) in exceptions {
			u16(&mut self.methods, start);
			u16(&mut self.methods, end);
			u16(&mut self.methods, handler);
			u16(&mut self.methods, catch_type);
		}
		self.methods_count += 1;
		self
	}

	/// Adds a class attribute with the given body.
	pub fn attribute(&mut self, name: &str, body: &[u8]) -> &mut Self {
		let name = self.utf8(name);
		u16(&mut self.attributes, name);
		u32(&mut self.attributes, body.len() as u32);
		self.attributes.extend_from_slice(body);
		self.attributes_count += 1;
		self
	}

	/// A public class of version 52.0 extending `java/lang/Object`.
	pub fn finish(mut self, this_class: &str) -> Vec<u8> {
		let this_class = self.class(this_class);
		let super_class = self.class("java/lang/Object");

		let mut buf = Vec::new();
		u32(&mut buf, 0xCAFE_BABE);
		u16(&mut buf, 0);
		u16(&mut buf, 52);
		u16(&mut buf, self.pool_count);
		buf.extend_from_slice(&self.pool);
		u16(&mut buf, 0x0021);
		u16(&mut buf, this_class);
		u16(&mut buf, super_class);
		u16(&mut buf, 0); // interfaces
		u16(&mut buf, 0); // fields
		u16(&mut buf, self.methods_count);
		buf.extend_from_slice(&self.methods);
		u16(&mut buf, self.attributes_count);
		buf.extend_from_slice(&self.attributes);
		buf
	}
}

/// Runs a static method taking and returning `int`s.
///
/// Supports `int` constants, locals and arithmetic, branches, switches, `ireturn` and `invokestatic` of methods of
/// the same class.
pub fn run(bytes: &[u8], name: &str, descriptor: &str, arguments: &[i32]) -> Result<i32> {
	let model = ClassModel::new(bytes.to_vec(), ParseOptions::default())?;
	let mut interpreter = Interpreter { model: &model, steps: 0 };
	interpreter.invoke(JavaStr::from_str(name), JavaStr::from_str(descriptor), arguments)
}

struct Interpreter<'m> {
	model: &'m ClassModel,
	steps: u32,
}

impl Interpreter<'_> {
	fn invoke(&mut self, name: &JavaStr, descriptor: &JavaStr, arguments: &[i32]) -> Result<i32> {
		let method = self.model.methods()?.into_iter()
			.find(|method| {
				method.name().as_utf8().is_ok_and(|found| found == name) &&
					method.descriptor().as_utf8().is_ok_and(|found| found == descriptor)
			})
			.with_context(|| anyhow!("no method {name:?}{descriptor:?}"))?;
		let code = method.code()?.with_context(|| anyhow!("method {name:?}{descriptor:?} has no code"))?;

		let mut instructions = Vec::new();
		for element in code.elements()? {
			if let CodeElement::Instruction(Insn::Bound(instruction)) = element {
				instructions.push((instruction.bci(), instruction.decode()?));
			}
		}
		let by_bci: HashMap<u32, usize> = instructions.iter().enumerate().map(|(i, &(bci, _))| (bci, i)).collect();
		let jump = |label: duke::label::Label| -> Result<usize> {
			label.original_bci()
				.and_then(|bci| by_bci.get(&bci).copied())
				.with_context(|| anyhow!("no instruction at {label:?}"))
		};

		let mut locals = vec![0; code.max_locals().unwrap_or(0) as usize];
		locals[..arguments.len()].copy_from_slice(arguments);
		let mut stack: Vec<i32> = Vec::new();

		let mut i = 0;
		loop {
			self.steps += 1;
			if self.steps > 1_000_000 {
				bail!("too many steps");
			}
			let (bci, instruction) = instructions.get(i).with_context(|| anyhow!("fell off the end of {name:?}"))?;
			let mut next = i + 1;
			match instruction {
				Instruction::Nop => {},
				&Instruction::ConstantIntrinsic { opcode } => stack.push(opcode as i32 - opcode::ICONST_0 as i32),
				&Instruction::ConstantArgument { value, .. } => stack.push(value as i32),
				Instruction::ConstantLoad { entry } => match entry.value() {
					&EntryValue::Integer(value) => stack.push(value),
					value => bail!("can't load {value:?}"),
				},
				&Instruction::Load { kind: TypeKind::Int, slot } => stack.push(locals[slot as usize]),
				&Instruction::Store { kind: TypeKind::Int, slot } => locals[slot as usize] = pop(&mut stack)?,
				&Instruction::Increment { slot, constant } => {
					locals[slot as usize] = locals[slot as usize].wrapping_add(constant as i32);
				},
				&Instruction::Stack { opcode: opcode::POP } => {
					pop(&mut stack)?;
				},
				&Instruction::Stack { opcode: opcode::DUP } => {
					let value = pop(&mut stack)?;
					stack.push(value);
					stack.push(value);
				},
				&Instruction::Stack { opcode: opcode::SWAP } => {
					let a = pop(&mut stack)?;
					let b = pop(&mut stack)?;
					stack.push(a);
					stack.push(b);
				},
				&Instruction::Operator { opcode: opcode::INEG } => {
					let value = pop(&mut stack)?;
					stack.push(value.wrapping_neg());
				},
				&Instruction::Operator { opcode } => {
					let b = pop(&mut stack)?;
					let a = pop(&mut stack)?;
					stack.push(match opcode {
						opcode::IADD => a.wrapping_add(b),
						opcode::ISUB => a.wrapping_sub(b),
						opcode::IMUL => a.wrapping_mul(b),
						opcode::IDIV => a.checked_div(b).context("division by zero")?,
						opcode::IREM => a.checked_rem(b).context("division by zero")?,
						opcode => bail!("unsupported operator {opcode:#x} at {bci}"),
					});
				},
				&Instruction::Branch { opcode, target } => {
					let taken = match opcode {
						opcode::GOTO | opcode::GOTO_W => true,
						opcode::IFEQ..=opcode::IFLE => {
							let value = pop(&mut stack)?;
							compare(opcode - opcode::IFEQ, value, 0)
						},
						opcode::IF_ICMPEQ..=opcode::IF_ICMPLE => {
							let b = pop(&mut stack)?;
							let a = pop(&mut stack)?;
							compare(opcode - opcode::IF_ICMPEQ, a, b)
						},
						opcode => bail!("unsupported branch {opcode:#x} at {bci}"),
					};
					if taken {
						next = jump(target)?;
					}
				},
				Instruction::TableSwitch { default, cases, .. } => {
					let value = pop(&mut stack)?;
					let target = cases.iter()
						.find(|case| case.value == value)
						.map_or(*default, |case| case.target);
					next = jump(target)?;
				},
				Instruction::LookupSwitch { default, cases } => {
					let value = pop(&mut stack)?;
					let target = cases.iter()
						.find(|case| case.value == value)
						.map_or(*default, |case| case.target);
					next = jump(target)?;
				},
				Instruction::Return { kind: Some(TypeKind::Int) } => return pop(&mut stack),
				Instruction::Invoke { opcode: opcode::INVOKESTATIC, method } => {
					let (_, name, descriptor) = method.as_member_ref()?;
					let count = parse_method_descriptor(descriptor)?.parameters.len();
					let split = stack.len().checked_sub(count).context("stack underflow")?;
					let arguments = stack.split_off(split);
					let result = self.invoke(name, descriptor, &arguments)?;
					stack.push(result);
				},
				instruction => bail!("unsupported instruction {instruction:?} at {bci}"),
			}
			i = next;
		}
	}
}

fn compare(condition: u8, a: i32, b: i32) -> bool {
	match condition {
		0 => a == b,
		1 => a != b,
		2 => a < b,
		3 => a >= b,
		4 => a > b,
		_ => a <= b,
	}
}

fn pop(stack: &mut Vec<i32>) -> Result<i32> {
	stack.pop().context("stack underflow")
}
