//! Parsing of field and method descriptors.
//!
//! The code writer and the verifier only need to know how many slots the values of a descriptor take up, but the full
//! structure is exposed anyway.
use std::iter::Peekable;
use anyhow::{anyhow, bail, Context, Result};
use java_string::{Chars, JavaCodePoint, JavaStr, JavaString};

/// Represents a type.
///
/// In case of an array, use the [`Type::Array`] variant. Its dimension is never zero.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Type {
	/// A `byte`.
	B,
	/// A `char`.
	C,
	/// A `double`.
	D,
	/// A `float`.
	F,
	/// An `int`.
	I,
	/// A `long`.
	J,
	/// A `short`.
	S,
	/// A `boolean`.
	Z,
	/// An instance of the class with the given internal name.
	Object(JavaString),
	/// An array type, represented by the dimension and the inner [`ArrayType`].
	Array(u8, ArrayType),
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ArrayType {
	B,
	C,
	D,
	F,
	I,
	J,
	S,
	Z,
	Object(JavaString),
}

impl Type {
	/// The number of local variable slots (or operand stack entries) a value of this type takes up.
	pub fn slot_size(&self) -> u16 {
		match self {
			Type::D | Type::J => 2,
			_ => 1,
		}
	}

	/// Writes this type as a field descriptor.
	pub fn to_descriptor(&self) -> JavaString {
		let mut s = JavaString::new();
		match self {
			Type::B => s.push('B'),
			Type::C => s.push('C'),
			Type::D => s.push('D'),
			Type::F => s.push('F'),
			Type::I => s.push('I'),
			Type::J => s.push('J'),
			Type::S => s.push('S'),
			Type::Z => s.push('Z'),
			Type::Object(name) => {
				s.push('L');
				s.push_java_str(name);
				s.push(';');
			},
			Type::Array(dimension, array_type) => {
				for _ in 0..*dimension {
					s.push('[');
				}
				match array_type {
					ArrayType::B => s.push('B'),
					ArrayType::C => s.push('C'),
					ArrayType::D => s.push('D'),
					ArrayType::F => s.push('F'),
					ArrayType::I => s.push('I'),
					ArrayType::J => s.push('J'),
					ArrayType::S => s.push('S'),
					ArrayType::Z => s.push('Z'),
					ArrayType::Object(name) => {
						s.push('L');
						s.push_java_str(name);
						s.push(';');
					},
				}
			},
		}
		s
	}
}

fn read_class_name(chars: &mut Peekable<Chars>) -> Result<JavaString> {
	let mut s = JavaString::new();

	let mut char = chars.next().ok_or_else(|| anyhow!("unexpected abrupt ending of descriptor"))?;
	while char != ';' {
		s.push_java(char);

		char = chars.next().ok_or_else(|| anyhow!("unexpected abrupt ending of descriptor"))?;
	}

	if s.is_empty() {
		bail!("empty class name in descriptor");
	}
	Ok(s)
}

// The grammar for descriptors is:
//   FieldDescriptor:
//     FieldType
//
//   MethodDescriptor:
//     "(" FieldType* ")" ReturnDescriptor
//
//   ReturnDescriptor:
//     FieldType | "V"
//
//   FieldType:
//     "B" | "C" | "D" | "F" | "I" | "J" | "S" | "Z" |
//     "L" ClassName ";" |
//     "[" FieldType
fn read_field_type(chars: &mut Peekable<Chars>) -> Result<Type> {
	const B: JavaCodePoint = JavaCodePoint::from_char('B');
	const C: JavaCodePoint = JavaCodePoint::from_char('C');
	const D: JavaCodePoint = JavaCodePoint::from_char('D');
	const F: JavaCodePoint = JavaCodePoint::from_char('F');
	const I: JavaCodePoint = JavaCodePoint::from_char('I');
	const J: JavaCodePoint = JavaCodePoint::from_char('J');
	const L: JavaCodePoint = JavaCodePoint::from_char('L');
	const S: JavaCodePoint = JavaCodePoint::from_char('S');
	const Z: JavaCodePoint = JavaCodePoint::from_char('Z');

	let mut array_dimension: u32 = 0;
	while chars.next_if_eq(&'[').is_some() {
		array_dimension += 1;
	}
	let array_dimension = u8::try_from(array_dimension)
		.map_err(|_| anyhow!("array dimension {array_dimension} is larger than 255"))?;

	let char = chars.next().ok_or_else(|| anyhow!("unexpected abrupt ending of descriptor"))?;
	if array_dimension == 0 {
		Ok(match char {
			B => Type::B,
			C => Type::C,
			D => Type::D,
			F => Type::F,
			I => Type::I,
			J => Type::J,
			S => Type::S,
			Z => Type::Z,
			L => Type::Object(read_class_name(chars)?),
			x => bail!("unexpected char {x:?} in descriptor"),
		})
	} else {
		let array_type = match char {
			B => ArrayType::B,
			C => ArrayType::C,
			D => ArrayType::D,
			F => ArrayType::F,
			I => ArrayType::I,
			J => ArrayType::J,
			S => ArrayType::S,
			Z => ArrayType::Z,
			L => ArrayType::Object(read_class_name(chars)?),
			x => bail!("unexpected char {x:?} in descriptor"),
		};
		Ok(Type::Array(array_dimension, array_type))
	}
}

/// A parsed method descriptor.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct MethodDescriptor {
	pub parameters: Vec<Type>,
	/// [`None`] for `void`.
	pub return_type: Option<Type>,
}

impl MethodDescriptor {
	/// The number of slots the arguments take up, without the implicit `this` argument.
	pub fn arguments_size(&self) -> u16 {
		self.parameters.iter().map(Type::slot_size).sum()
	}

	pub fn return_size(&self) -> u16 {
		self.return_type.as_ref().map_or(0, Type::slot_size)
	}
}

/// Attempts to parse a field descriptor.
///
/// A field descriptor is defined by the [grammar](https://docs.oracle.com/javase/specs/jvms/se22/html/jvms-4.html#jvms-4.3.2) in the
/// Java Virtual Machine Specification.
pub fn parse_field_descriptor(descriptor: &JavaStr) -> Result<Type> {
	let mut chars = descriptor.chars().peekable();

	let field_type = read_field_type(&mut chars)
		.with_context(|| anyhow!("failed to read field descriptor {descriptor:?}"))?;

	if chars.peek().is_some() {
		bail!("expected end of field descriptor {descriptor:?}, got {:?} remaining", JavaString::from_iter(chars));
	}

	Ok(field_type)
}

pub fn parse_method_descriptor(descriptor: &JavaStr) -> Result<MethodDescriptor> {
	let mut chars = descriptor.chars().peekable();

	if chars.next_if_eq(&'(').is_none() {
		bail!("method descriptor {descriptor:?} doesn't start with '('");
	}

	let mut parameters = Vec::new();
	loop {
		if chars.next_if_eq(&')').is_some() {
			break;
		}

		let parameter = read_field_type(&mut chars)
			.with_context(|| anyhow!("failed to read parameter descriptor of {descriptor:?}"))?;
		parameters.push(parameter);
	}

	let return_type = if chars.next_if_eq(&'V').is_some() {
		None
	} else {
		let return_type = read_field_type(&mut chars)
			.with_context(|| anyhow!("failed to read return descriptor of {descriptor:?}"))?;

		Some(return_type)
	};

	if chars.peek().is_some() {
		bail!("expected end of method descriptor {descriptor:?}, got {} remaining", JavaString::from_iter(chars));
	}

	Ok(MethodDescriptor { parameters, return_type })
}
