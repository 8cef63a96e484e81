//! Parsing of generic signatures, as found in the `Signature` attribute.
//!
//! The grammar is the one of [JVMS 4.7.9.1](https://docs.oracle.com/javase/specs/jvms/se22/html/jvms-4.html#jvms-4.7.9.1).
use std::fmt::{Display, Formatter};
use std::iter::Peekable;
use anyhow::{anyhow, bail, Context, Result};
use java_string::{Chars, JavaCodePoint, JavaStr, JavaString};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseType {
	B,
	C,
	D,
	F,
	I,
	J,
	S,
	Z,
}

/// A `JavaTypeSignature`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeSignature {
	Base(BaseType),
	Class(ClassTypeSignature),
	TypeVariable(JavaString),
	Array(Box<TypeSignature>),
}

/// A class type, possibly with type arguments, and possibly an inner class of another class type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassTypeSignature {
	/// The outermost class first. Its name includes the package, like `java/util/Map`, the names of the inner classes
	/// don't, like `Entry`.
	pub classes: Vec<SimpleClassTypeSignature>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleClassTypeSignature {
	pub name: JavaString,
	pub arguments: Vec<TypeArgument>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeArgument {
	/// `*`
	Any,
	/// `+`, for `? extends`
	Extends(TypeSignature),
	/// `-`, for `? super`
	Super(TypeSignature),
	Exact(TypeSignature),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeParameter {
	pub name: JavaString,
	pub class_bound: Option<TypeSignature>,
	pub interface_bounds: Vec<TypeSignature>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassSignature {
	pub type_parameters: Vec<TypeParameter>,
	pub superclass: ClassTypeSignature,
	pub interfaces: Vec<ClassTypeSignature>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSignature {
	pub type_parameters: Vec<TypeParameter>,
	pub parameters: Vec<TypeSignature>,
	/// [`None`] for `void`.
	pub return_type: Option<TypeSignature>,
	pub throws: Vec<TypeSignature>,
}

fn next(chars: &mut Peekable<Chars>) -> Result<JavaCodePoint> {
	chars.next().ok_or_else(|| anyhow!("unexpected abrupt ending of signature"))
}

fn expect(chars: &mut Peekable<Chars>, expected: char) -> Result<()> {
	let char = next(chars)?;
	if char != expected {
		bail!("expected {expected:?} in signature, got {char:?}");
	}
	Ok(())
}

fn is_identifier_char(char: &JavaCodePoint) -> bool {
	!['.', ';', '[', '/', '<', '>', ':'].iter().any(|x| char == x)
}

fn read_identifier(chars: &mut Peekable<Chars>) -> Result<JavaString> {
	let mut s = JavaString::new();
	while let Some(char) = chars.next_if(is_identifier_char) {
		s.push_java(char);
	}
	if s.is_empty() {
		bail!("empty identifier in signature, found {:?}", chars.peek());
	}
	Ok(s)
}

fn read_type_arguments(chars: &mut Peekable<Chars>) -> Result<Vec<TypeArgument>> {
	let mut arguments = Vec::new();
	if chars.next_if_eq(&'<').is_none() {
		return Ok(arguments);
	}
	loop {
		if chars.next_if_eq(&'>').is_some() {
			break;
		}
		let argument = if chars.next_if_eq(&'*').is_some() {
			TypeArgument::Any
		} else if chars.next_if_eq(&'+').is_some() {
			TypeArgument::Extends(read_reference_type(chars)?)
		} else if chars.next_if_eq(&'-').is_some() {
			TypeArgument::Super(read_reference_type(chars)?)
		} else {
			TypeArgument::Exact(read_reference_type(chars)?)
		};
		arguments.push(argument);
	}
	if arguments.is_empty() {
		bail!("empty type arguments in signature");
	}
	Ok(arguments)
}

/// Reads a class type signature, after the `L`.
fn read_class_type_rest(chars: &mut Peekable<Chars>) -> Result<ClassTypeSignature> {
	let mut name = read_identifier(chars)?;
	while chars.next_if_eq(&'/').is_some() {
		name.push_java(JavaCodePoint::from_char('/'));
		for char in read_identifier(chars)?.chars() {
			name.push_java(char);
		}
	}
	let arguments = read_type_arguments(chars)?;
	let mut classes = vec![SimpleClassTypeSignature { name, arguments }];

	while chars.next_if_eq(&'.').is_some() {
		let name = read_identifier(chars)?;
		let arguments = read_type_arguments(chars)?;
		classes.push(SimpleClassTypeSignature { name, arguments });
	}
	expect(chars, ';')?;

	Ok(ClassTypeSignature { classes })
}

fn read_class_type(chars: &mut Peekable<Chars>) -> Result<ClassTypeSignature> {
	expect(chars, 'L')?;
	read_class_type_rest(chars)
}

fn read_type(chars: &mut Peekable<Chars>) -> Result<TypeSignature> {
	const B: JavaCodePoint = JavaCodePoint::from_char('B');
	const C: JavaCodePoint = JavaCodePoint::from_char('C');
	const D: JavaCodePoint = JavaCodePoint::from_char('D');
	const F: JavaCodePoint = JavaCodePoint::from_char('F');
	const I: JavaCodePoint = JavaCodePoint::from_char('I');
	const J: JavaCodePoint = JavaCodePoint::from_char('J');
	const S: JavaCodePoint = JavaCodePoint::from_char('S');
	const Z: JavaCodePoint = JavaCodePoint::from_char('Z');
	const L: JavaCodePoint = JavaCodePoint::from_char('L');
	const T: JavaCodePoint = JavaCodePoint::from_char('T');
	const ARRAY: JavaCodePoint = JavaCodePoint::from_char('[');

	Ok(match next(chars)? {
		B => TypeSignature::Base(BaseType::B),
		C => TypeSignature::Base(BaseType::C),
		D => TypeSignature::Base(BaseType::D),
		F => TypeSignature::Base(BaseType::F),
		I => TypeSignature::Base(BaseType::I),
		J => TypeSignature::Base(BaseType::J),
		S => TypeSignature::Base(BaseType::S),
		Z => TypeSignature::Base(BaseType::Z),
		L => TypeSignature::Class(read_class_type_rest(chars)?),
		T => {
			let name = read_identifier(chars)?;
			expect(chars, ';')?;
			TypeSignature::TypeVariable(name)
		},
		ARRAY => TypeSignature::Array(Box::new(read_type(chars)?)),
		x => bail!("unexpected char {x:?} in signature"),
	})
}

fn read_reference_type(chars: &mut Peekable<Chars>) -> Result<TypeSignature> {
	let signature = read_type(chars)?;
	if let TypeSignature::Base(base) = signature {
		bail!("expected a reference type in signature, got {base:?}");
	}
	Ok(signature)
}

fn read_type_parameters(chars: &mut Peekable<Chars>) -> Result<Vec<TypeParameter>> {
	let mut parameters = Vec::new();
	if chars.next_if_eq(&'<').is_none() {
		return Ok(parameters);
	}
	loop {
		if chars.next_if_eq(&'>').is_some() {
			break;
		}
		let name = read_identifier(chars)?;
		expect(chars, ':')?;
		let class_bound = match chars.peek() {
			Some(char) if *char == ':' || *char == '>' => None,
			_ => Some(read_reference_type(chars)?),
		};
		let mut interface_bounds = Vec::new();
		while chars.next_if_eq(&':').is_some() {
			interface_bounds.push(read_reference_type(chars)?);
		}
		parameters.push(TypeParameter { name, class_bound, interface_bounds });
	}
	if parameters.is_empty() {
		bail!("empty type parameters in signature");
	}
	Ok(parameters)
}

fn expect_end(chars: &mut Peekable<Chars>, signature: &JavaStr) -> Result<()> {
	if chars.peek().is_some() {
		bail!("expected end of signature {signature:?}, got {:?} remaining", JavaString::from_iter(chars));
	}
	Ok(())
}

pub fn parse_class_signature(signature: &JavaStr) -> Result<ClassSignature> {
	let mut chars = signature.chars().peekable();
	let parse = |chars: &mut Peekable<Chars>| -> Result<ClassSignature> {
		let type_parameters = read_type_parameters(chars)?;
		let superclass = read_class_type(chars)?;
		let mut interfaces = Vec::new();
		while chars.peek().is_some() {
			interfaces.push(read_class_type(chars)?);
		}
		Ok(ClassSignature { type_parameters, superclass, interfaces })
	};
	let class_signature = parse(&mut chars)
		.with_context(|| anyhow!("failed to read class signature {signature:?}"))?;
	expect_end(&mut chars, signature)?;
	Ok(class_signature)
}

pub fn parse_method_signature(signature: &JavaStr) -> Result<MethodSignature> {
	let mut chars = signature.chars().peekable();
	let parse = |chars: &mut Peekable<Chars>| -> Result<MethodSignature> {
		let type_parameters = read_type_parameters(chars)?;
		expect(chars, '(')?;
		let mut parameters = Vec::new();
		while chars.next_if_eq(&')').is_none() {
			parameters.push(read_type(chars)?);
		}
		let return_type = if chars.next_if_eq(&'V').is_some() {
			None
		} else {
			Some(read_type(chars)?)
		};
		let mut throws = Vec::new();
		while chars.next_if_eq(&'^').is_some() {
			let thrown = read_reference_type(chars)?;
			if let TypeSignature::Array(_) = thrown {
				bail!("can't throw an array type");
			}
			throws.push(thrown);
		}
		Ok(MethodSignature { type_parameters, parameters, return_type, throws })
	};
	let method_signature = parse(&mut chars)
		.with_context(|| anyhow!("failed to read method signature {signature:?}"))?;
	expect_end(&mut chars, signature)?;
	Ok(method_signature)
}

/// Parses the signature of a field, a record component or a local variable.
pub fn parse_field_signature(signature: &JavaStr) -> Result<TypeSignature> {
	let mut chars = signature.chars().peekable();
	let field_signature = read_reference_type(&mut chars)
		.with_context(|| anyhow!("failed to read field signature {signature:?}"))?;
	expect_end(&mut chars, signature)?;
	Ok(field_signature)
}

impl Display for BaseType {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.write_str(match self {
			BaseType::B => "B",
			BaseType::C => "C",
			BaseType::D => "D",
			BaseType::F => "F",
			BaseType::I => "I",
			BaseType::J => "J",
			BaseType::S => "S",
			BaseType::Z => "Z",
		})
	}
}

impl Display for TypeSignature {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			TypeSignature::Base(base) => base.fmt(f),
			TypeSignature::Class(class) => class.fmt(f),
			TypeSignature::TypeVariable(name) => write!(f, "T{name};"),
			TypeSignature::Array(component) => write!(f, "[{component}"),
		}
	}
}

impl Display for ClassTypeSignature {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.write_str("L")?;
		for (i, class) in self.classes.iter().enumerate() {
			if i != 0 {
				f.write_str(".")?;
			}
			write!(f, "{}", class.name)?;
			if !class.arguments.is_empty() {
				f.write_str("<")?;
				for argument in &class.arguments {
					match argument {
						TypeArgument::Any => f.write_str("*")?,
						TypeArgument::Extends(bound) => write!(f, "+{bound}")?,
						TypeArgument::Super(bound) => write!(f, "-{bound}")?,
						TypeArgument::Exact(argument) => write!(f, "{argument}")?,
					}
				}
				f.write_str(">")?;
			}
		}
		f.write_str(";")
	}
}

fn fmt_type_parameters(f: &mut Formatter<'_>, type_parameters: &[TypeParameter]) -> std::fmt::Result {
	if type_parameters.is_empty() {
		return Ok(());
	}
	f.write_str("<")?;
	for parameter in type_parameters {
		write!(f, "{}:", parameter.name)?;
		if let Some(bound) = &parameter.class_bound {
			write!(f, "{bound}")?;
		}
		for bound in &parameter.interface_bounds {
			write!(f, ":{bound}")?;
		}
	}
	f.write_str(">")
}

impl Display for ClassSignature {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		fmt_type_parameters(f, &self.type_parameters)?;
		write!(f, "{}", self.superclass)?;
		for interface in &self.interfaces {
			write!(f, "{interface}")?;
		}
		Ok(())
	}
}

impl Display for MethodSignature {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		fmt_type_parameters(f, &self.type_parameters)?;
		f.write_str("(")?;
		for parameter in &self.parameters {
			write!(f, "{parameter}")?;
		}
		f.write_str(")")?;
		match &self.return_type {
			Some(return_type) => write!(f, "{return_type}")?,
			None => f.write_str("V")?,
		}
		for thrown in &self.throws {
			write!(f, "^{thrown}")?;
		}
		Ok(())
	}
}
