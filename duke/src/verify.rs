//! A structural check of class files.
//!
//! This doesn't check types. It checks that a class file can be read completely, that descriptors are valid, that
//! members are unique, and that code stays within the `max_stack` and `max_locals` it declares, with consistent stack
//! depths on all paths. From version 50 on, every branch target, exception handler and piece of unreachable code must
//! have a stack map frame.
use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use anyhow::Result;
use log::debug;
use crate::class_constants::{access, opcode, version};
use crate::descriptor::{parse_field_descriptor, parse_method_descriptor, Type};
use crate::instruction::{stack, Insn, Instruction, TypeKind};
use crate::model::{ClassModel, CodeElement, MethodModel};
use crate::options::{ParseOptions, StackMapsOption};
use crate::writer::frames::{required_frames, Handler};

/// One problem found by [`verify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyError {
	/// Name and descriptor of the method the problem is in.
	pub method: Option<String>,
	pub bci: Option<u32>,
	pub message: String,
}

impl Display for VerifyError {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		if let Some(method) = &self.method {
			write!(f, "in method {method}")?;
			if let Some(bci) = self.bci {
				write!(f, " at bytecode offset {bci}")?;
			}
			f.write_str(": ")?;
		}
		f.write_str(&self.message)
	}
}

struct Findings {
	method: Option<String>,
	errors: Vec<VerifyError>,
}

impl Findings {
	fn report(&mut self, bci: Option<u32>, message: impl Into<String>) {
		self.errors.push(VerifyError { method: self.method.clone(), bci, message: message.into() });
	}

	fn check<T>(&mut self, result: Result<T>) -> Option<T> {
		match result {
			Ok(value) => Some(value),
			Err(error) => {
				self.report(None, format!("{error:#}"));
				None
			},
		}
	}
}

/// Checks the structure of a class file. An empty list means nothing was found.
pub fn verify(bytes: &[u8]) -> Vec<VerifyError> {
	verify_with(bytes, &ParseOptions::default())
}

/// Like [`verify`], reading the class file with `options`.
///
/// Stack map frames are only checked if they are read and [`ParseOptions::verify_stack_maps`] is set.
pub fn verify_with(bytes: &[u8], options: &ParseOptions) -> Vec<VerifyError> {
	let mut findings = Findings { method: None, errors: Vec::new() };
	if let Some(model) = findings.check(ClassModel::new(bytes.to_vec(), options.clone())) {
		verify_class(&model, &mut findings);
	}
	debug!("verification found {} problems", findings.errors.len());
	findings.errors
}

fn verify_class(model: &ClassModel, findings: &mut Findings) {
	let flags = model.access_flags();
	if flags & access::INTERFACE != 0 && flags & access::ABSTRACT == 0 {
		findings.report(None, "interface isn't abstract");
	}

	if let Some(this_class) = findings.check(model.this_class()) {
		let is_object = this_class.as_class_name().is_ok_and(|name| name == "java/lang/Object");
		match findings.check(model.super_class()) {
			Some(None) if !is_object && !model.reader().is_module_info() => findings.report(None, "class has no superclass"),
			Some(Some(_)) if is_object => findings.report(None, "java/lang/Object has a superclass"),
			_ => {},
		}
	}
	findings.check(model.interfaces());
	findings.check(model.attributes());

	if let Some(fields) = findings.check(model.fields()) {
		let mut seen = HashSet::new();
		for field in &fields {
			let (Ok(name), Ok(descriptor)) = (field.name().as_utf8(), field.descriptor().as_utf8()) else { continue };
			if !seen.insert((name.to_owned(), descriptor.to_owned())) {
				findings.report(None, format!("duplicate field {name}:{descriptor}"));
			}
			if let Err(error) = parse_field_descriptor(descriptor) {
				findings.report(None, format!("field {name}: {error:#}"));
			}
		}
	}

	if let Some(methods) = findings.check(model.methods()) {
		let mut seen = HashSet::new();
		for method in &methods {
			let (Ok(name), Ok(descriptor)) = (method.name().as_utf8(), method.descriptor().as_utf8()) else { continue };
			if !seen.insert((name.to_owned(), descriptor.to_owned())) {
				findings.report(None, format!("duplicate method {name}{descriptor}"));
			}
			findings.method = Some(format!("{name}{descriptor}"));
			verify_method(method, findings);
			findings.method = None;
		}
	}
}

fn verify_method(method: &MethodModel, findings: &mut Findings) {
	let Some(descriptor) = findings.check(method.descriptor().as_utf8().and_then(parse_method_descriptor)) else { return };
	let Some(code) = findings.check(method.code()) else { return };

	let flags = method.flags();
	let code = match code {
		Some(_) if flags & (access::ABSTRACT | access::NATIVE) != 0 => {
			findings.report(None, "abstract or native method has code");
			return;
		},
		None if flags & (access::ABSTRACT | access::NATIVE) == 0 => {
			findings.report(None, "method has no code");
			return;
		},
		None => return,
		Some(code) => code,
	};
	let (Some(max_stack), Some(max_locals), Some(bound)) = (code.max_stack(), code.max_locals(), code.bound()) else {
		return;
	};

	let receiver = if flags & access::STATIC == 0 { 1 } else { 0 };
	let arguments = descriptor.arguments_size() as u32 + receiver;
	if arguments > max_locals as u32 {
		findings.report(None, format!("max locals {max_locals} is too small for the {arguments} slots of the arguments"));
	}

	let Some(elements) = findings.check(code.elements()) else { return };
	let mut handlers = Vec::new();
	let mut ranges = Vec::new();
	// the bytecode offsets of the instructions following frames
	let mut framed = HashSet::new();
	let mut frame_pending = false;
	for element in &elements {
		match element {
			CodeElement::ExceptionCatch { start, end, handler, .. } => {
				let (Some(start), Some(end), Some(handler)) = (start.original_bci(), end.original_bci(), handler.original_bci()) else {
					continue;
				};
				if start >= end {
					findings.report(Some(start), format!("exception handler range {start}..{end} is empty"));
				}
				handlers.push(handler);
				ranges.push(Handler { start, end, handler, catch_type: None });
			},
			CodeElement::Frame(_) => frame_pending = true,
			CodeElement::Instruction(Insn::Bound(instruction)) => {
				let bci = instruction.bci();
				if frame_pending {
					framed.insert(bci);
					frame_pending = false;
				}
				let Some(decoded) = findings.check(instruction.decode()) else { continue };
				if let Some(end) = slot_end(&decoded) {
					if end > max_locals as u32 {
						findings.report(Some(bci), format!("local variable slot {} isn't below max locals {max_locals}", end - 1));
					}
				}
				if let Instruction::Return { kind } = decoded {
					if kind != return_kind(descriptor.return_type.as_ref()) {
						findings.report(Some(bci), "return instruction doesn't match the return type of the method");
					}
				}
				let discontinued = matches!(instruction.opcode(), opcode::JSR | opcode::JSR_W | opcode::RET);
				if discontinued && bound.reader().major_version() >= version::V1_7 {
					findings.report(Some(bci), "jsr and ret aren't allowed in class files of version 51 and above");
				}
			},
			_ => {},
		}
	}

	match stack::analyze(bound.span.code(), &handlers, bound.reader()) {
		Ok(analysis) => {
			if analysis.max_stack > max_stack {
				findings.report(None, format!("max stack {max_stack} is too small, the code needs {}", analysis.max_stack));
			}
		},
		Err(error) => {
			findings.report(None, format!("{error:#}"));
			return;
		},
	}

	let options = bound.reader().options();
	let needs_frames = bound.reader().major_version() >= version::V1_6
		&& options.verify_stack_maps
		&& options.stack_maps == StackMapsOption::Keep;
	if needs_frames {
		if let Some(required) = findings.check(required_frames(bound.span.code(), &ranges)) {
			for (pos, reason) in required {
				if !framed.contains(&pos) {
					findings.report(Some(pos), format!("{reason} has no stack map frame"));
				}
			}
		}
	}
}

/// One more than the highest local variable slot the instruction uses.
fn slot_end(instruction: &Instruction) -> Option<u32> {
	match *instruction {
		Instruction::Load { kind, slot } | Instruction::Store { kind, slot } => Some(slot as u32 + kind.slot_size() as u32),
		Instruction::Increment { slot, .. } | Instruction::Ret { slot } => Some(slot as u32 + 1),
		_ => None,
	}
}

fn return_kind(return_type: Option<&Type>) -> Option<TypeKind> {
	return_type.map(|return_type| match return_type {
		Type::B | Type::C | Type::I | Type::S | Type::Z => TypeKind::Int,
		Type::J => TypeKind::Long,
		Type::F => TypeKind::Float,
		Type::D => TypeKind::Double,
		Type::Object(_) | Type::Array(..) => TypeKind::Reference,
	})
}
