//! The contents of annotation attributes: annotations, their element values, and the targets of type annotations.
use anyhow::Result;
use crate::buf_writer::BufWriter;
use crate::class_constants::pool;
use crate::class_reader::Cursor;
use crate::error::ClassFileError;
use crate::pool::PoolEntry;
use crate::pool::builder::PoolBuilder;

#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
	/// The field descriptor of the annotation interface, a Utf8 entry.
	pub type_descriptor: PoolEntry,
	pub elements: Vec<ElementValuePair>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementValuePair {
	pub name: PoolEntry,
	pub value: ElementValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElementValue {
	/// A primitive or string constant, `tag` is one of `BCDFIJSZs`.
	Constant { tag: u8, value: PoolEntry },
	Enum { type_descriptor: PoolEntry, constant_name: PoolEntry },
	/// A class literal, given by its return descriptor, so `V` stands for `void.class`.
	Class { return_descriptor: PoolEntry },
	Annotation(Annotation),
	Array(Vec<ElementValue>),
}

/// A type annotation of a class, field or method.
///
/// Targets inside of code keep the bytecode offsets they were read with.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeAnnotation {
	pub target: TypeAnnotationTarget,
	pub target_path: Vec<TypePathEntry>,
	pub annotation: Annotation,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeAnnotationTarget {
	/// A type parameter of a class (`0x00`) or method (`0x01`).
	TypeParameter { target_type: u8, index: u8 },
	/// A superclass (index `0xffff`) or an interface.
	Supertype { index: u16 },
	/// A bound of a type parameter of a class (`0x11`) or method (`0x12`).
	TypeParameterBound { target_type: u8, type_parameter: u8, bound: u8 },
	/// A field type (`0x13`), return type (`0x14`) or receiver type (`0x15`).
	Empty { target_type: u8 },
	FormalParameter { index: u8 },
	Throws { index: u16 },
	/// A local variable (`0x40`) or resource variable (`0x41`).
	LocalVariable { target_type: u8, table: Vec<LocalVariableTarget> },
	Catch { exception_table_index: u16 },
	/// `instanceof`, `new` or a method reference (`0x43` to `0x46`).
	Offset { target_type: u8, offset: u16 },
	/// A type argument of a cast, constructor, method call or method reference (`0x47` to `0x4b`).
	TypeArgument { target_type: u8, offset: u16, index: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalVariableTarget {
	pub start: u16,
	pub length: u16,
	pub index: u16,
}

/// One step of a `type_path`, `kind` is the step and `argument_index` the type argument for kind `3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypePathEntry {
	pub kind: u8,
	pub argument_index: u8,
}

/// The kind of pool entry the constant of an element value with `tag` references.
fn constant_entry_tag(tag: u8) -> Option<u8> {
	match tag {
		b'B' | b'C' | b'I' | b'S' | b'Z' => Some(pool::INTEGER),
		b'D' => Some(pool::DOUBLE),
		b'F' => Some(pool::FLOAT),
		b'J' => Some(pool::LONG),
		b's' => Some(pool::UTF8),
		_ => None,
	}
}

impl Annotation {
	pub(crate) fn read(c: &mut Cursor) -> Result<Annotation> {
		Ok(Annotation {
			type_descriptor: c.read_utf8_entry()?,
			elements: c.read_vec(|c| c.read_u16_as_usize(), |c| Ok(ElementValuePair {
				name: c.read_utf8_entry()?,
				value: ElementValue::read(c)?,
			}))?,
		})
	}

	pub(crate) fn write_to(&self, buf: &mut BufWriter, pool: &mut PoolBuilder) -> Result<()> {
		buf.write_index(pool, &self.type_descriptor)?;
		buf.write_list("number of element value pairs", &self.elements, |buf, pair| {
			buf.write_index(pool, &pair.name)?;
			pair.value.write_to(buf, pool)
		})
	}
}

impl ElementValue {
	pub(crate) fn read(c: &mut Cursor) -> Result<ElementValue> {
		let pos = c.pos();
		Ok(match c.read_u8()? {
			b'e' => ElementValue::Enum { type_descriptor: c.read_utf8_entry()?, constant_name: c.read_utf8_entry()? },
			b'c' => ElementValue::Class { return_descriptor: c.read_utf8_entry()? },
			b'@' => ElementValue::Annotation(Annotation::read(c)?),
			b'[' => ElementValue::Array(c.read_vec(|c| c.read_u16_as_usize(), ElementValue::read)?),
			tag => {
				let Some(entry_tag) = constant_entry_tag(tag) else {
					return Err(ClassFileError::malformed(pos, format!("unknown element value tag {tag:#04x}")).into());
				};
				let value = c.read_entry()?;
				value.expect_tag(entry_tag)?;
				ElementValue::Constant { tag, value }
			},
		})
	}

	pub(crate) fn write_to(&self, buf: &mut BufWriter, pool: &mut PoolBuilder) -> Result<()> {
		match self {
			ElementValue::Constant { tag, value } => {
				buf.write_u8(*tag);
				buf.write_index(pool, value)?;
			},
			ElementValue::Enum { type_descriptor, constant_name } => {
				buf.write_u8(b'e');
				buf.write_index(pool, type_descriptor)?;
				buf.write_index(pool, constant_name)?;
			},
			ElementValue::Class { return_descriptor } => {
				buf.write_u8(b'c');
				buf.write_index(pool, return_descriptor)?;
			},
			ElementValue::Annotation(annotation) => {
				buf.write_u8(b'@');
				annotation.write_to(buf, pool)?;
			},
			ElementValue::Array(values) => {
				buf.write_u8(b'[');
				buf.write_list("number of array values", values, |buf, value| value.write_to(buf, pool))?;
			},
		}
		Ok(())
	}
}

impl TypeAnnotationTarget {
	pub fn target_type(&self) -> u8 {
		match self {
			&TypeAnnotationTarget::TypeParameter { target_type, .. } |
			&TypeAnnotationTarget::TypeParameterBound { target_type, .. } |
			&TypeAnnotationTarget::Empty { target_type } |
			&TypeAnnotationTarget::LocalVariable { target_type, .. } |
			&TypeAnnotationTarget::Offset { target_type, .. } |
			&TypeAnnotationTarget::TypeArgument { target_type, .. } => target_type,
			TypeAnnotationTarget::Supertype { .. } => 0x10,
			TypeAnnotationTarget::FormalParameter { .. } => 0x16,
			TypeAnnotationTarget::Throws { .. } => 0x17,
			TypeAnnotationTarget::Catch { .. } => 0x42,
		}
	}

	fn read(c: &mut Cursor) -> Result<TypeAnnotationTarget> {
		let pos = c.pos();
		Ok(match c.read_u8()? {
			target_type @ (0x00 | 0x01) => TypeAnnotationTarget::TypeParameter { target_type, index: c.read_u8()? },
			0x10 => TypeAnnotationTarget::Supertype { index: c.read_u16()? },
			target_type @ (0x11 | 0x12) => TypeAnnotationTarget::TypeParameterBound {
				target_type,
				type_parameter: c.read_u8()?,
				bound: c.read_u8()?,
			},
			target_type @ 0x13..=0x15 => TypeAnnotationTarget::Empty { target_type },
			0x16 => TypeAnnotationTarget::FormalParameter { index: c.read_u8()? },
			0x17 => TypeAnnotationTarget::Throws { index: c.read_u16()? },
			target_type @ (0x40 | 0x41) => TypeAnnotationTarget::LocalVariable {
				target_type,
				table: c.read_vec(|c| c.read_u16_as_usize(), |c| Ok(LocalVariableTarget {
					start: c.read_u16()?,
					length: c.read_u16()?,
					index: c.read_u16()?,
				}))?,
			},
			0x42 => TypeAnnotationTarget::Catch { exception_table_index: c.read_u16()? },
			target_type @ 0x43..=0x46 => TypeAnnotationTarget::Offset { target_type, offset: c.read_u16()? },
			target_type @ 0x47..=0x4b => TypeAnnotationTarget::TypeArgument {
				target_type,
				offset: c.read_u16()?,
				index: c.read_u8()?,
			},
			target_type => {
				return Err(ClassFileError::malformed(pos, format!("unknown type annotation target {target_type:#04x}")).into());
			},
		})
	}

	fn write_to(&self, buf: &mut BufWriter) -> Result<()> {
		buf.write_u8(self.target_type());
		match self {
			&TypeAnnotationTarget::TypeParameter { index, .. } | &TypeAnnotationTarget::FormalParameter { index } => {
				buf.write_u8(index);
			},
			&TypeAnnotationTarget::Supertype { index } | &TypeAnnotationTarget::Throws { index } => buf.write_u16(index),
			&TypeAnnotationTarget::TypeParameterBound { type_parameter, bound, .. } => {
				buf.write_u8(type_parameter);
				buf.write_u8(bound);
			},
			TypeAnnotationTarget::Empty { .. } => {},
			TypeAnnotationTarget::LocalVariable { table, .. } => {
				buf.write_list("local variable target table length", table, |buf, local| {
					buf.write_u16(local.start);
					buf.write_u16(local.length);
					buf.write_u16(local.index);
					Ok(())
				})?;
			},
			&TypeAnnotationTarget::Catch { exception_table_index } => buf.write_u16(exception_table_index),
			&TypeAnnotationTarget::Offset { offset, .. } => buf.write_u16(offset),
			&TypeAnnotationTarget::TypeArgument { offset, index, .. } => {
				buf.write_u16(offset);
				buf.write_u8(index);
			},
		}
		Ok(())
	}
}

impl TypeAnnotation {
	pub(crate) fn read(c: &mut Cursor) -> Result<TypeAnnotation> {
		let target = TypeAnnotationTarget::read(c)?;
		let target_path = c.read_vec(|c| Ok(c.read_u8()? as usize), |c| Ok(TypePathEntry {
			kind: c.read_u8()?,
			argument_index: c.read_u8()?,
		}))?;
		let annotation = Annotation::read(c)?;
		Ok(TypeAnnotation { target, target_path, annotation })
	}

	pub(crate) fn write_to(&self, buf: &mut BufWriter, pool: &mut PoolBuilder) -> Result<()> {
		self.target.write_to(buf)?;
		let length = u8::try_from(self.target_path.len())
			.map_err(|_| ClassFileError::IndexOverflow { what: "type path length", value: self.target_path.len() as i64 })?;
		buf.write_u8(length);
		for entry in &self.target_path {
			buf.write_u8(entry.kind);
			buf.write_u8(entry.argument_index);
		}
		self.annotation.write_to(buf, pool)
	}
}

pub(crate) fn read_annotations(c: &mut Cursor) -> Result<Vec<Annotation>> {
	c.read_vec(|c| c.read_u16_as_usize(), Annotation::read)
}

pub(crate) fn write_annotations(buf: &mut BufWriter, pool: &mut PoolBuilder, annotations: &[Annotation]) -> Result<()> {
	buf.write_list("number of annotations", annotations, |buf, annotation| annotation.write_to(buf, pool))
}

/// Reads the annotations of each parameter, the parameter count is a single byte.
pub(crate) fn read_parameter_annotations(c: &mut Cursor) -> Result<Vec<Vec<Annotation>>> {
	c.read_vec(|c| Ok(c.read_u8()? as usize), read_annotations)
}

pub(crate) fn write_parameter_annotations(
	buf: &mut BufWriter,
	pool: &mut PoolBuilder,
	parameters: &[Vec<Annotation>],
) -> Result<()> {
	let count = u8::try_from(parameters.len())
		.map_err(|_| ClassFileError::IndexOverflow { what: "number of annotated parameters", value: parameters.len() as i64 })?;
	buf.write_u8(count);
	for annotations in parameters {
		write_annotations(buf, pool, annotations)?;
	}
	Ok(())
}

pub(crate) fn read_type_annotations(c: &mut Cursor) -> Result<Vec<TypeAnnotation>> {
	c.read_vec(|c| c.read_u16_as_usize(), TypeAnnotation::read)
}

pub(crate) fn write_type_annotations(buf: &mut BufWriter, pool: &mut PoolBuilder, annotations: &[TypeAnnotation]) -> Result<()> {
	buf.write_list("number of type annotations", annotations, |buf, annotation| annotation.write_to(buf, pool))
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use crate::attribute::annotation::{
		Annotation, ElementValue, ElementValuePair, TypeAnnotation, TypeAnnotationTarget, TypePathEntry,
	};
	use crate::buf_writer::BufWriter;
	use crate::error::ClassFileError;
	use crate::pool::builder::PoolBuilder;

	#[test]
	fn element_values_bytes() -> Result<()> {
		let mut pool = PoolBuilder::new();
		let type_descriptor = pool.utf8("LRetry;")?;
		let name = pool.utf8("times")?;
		let value = pool.int_entry(3)?;
		let annotation = Annotation {
			type_descriptor: type_descriptor.clone(),
			elements: vec![ElementValuePair {
				name: name.clone(),
				value: ElementValue::Array(vec![ElementValue::Constant { tag: b'I', value: value.clone() }]),
			}],
		};
		let mut buf = BufWriter::new();
		annotation.write_to(&mut buf, &mut pool)?;

		let [type_high, type_low] = type_descriptor.index().to_be_bytes();
		let [name_high, name_low] = name.index().to_be_bytes();
		let [value_high, value_low] = value.index().to_be_bytes();
		assert_eq!(buf.as_slice(), &[
			type_high, type_low,
			0, 1,
			name_high, name_low,
			b'[', 0, 1,
			b'I', value_high, value_low,
		]);
		Ok(())
	}

	#[test]
	fn type_annotation_bytes() -> Result<()> {
		let mut pool = PoolBuilder::new();
		let type_descriptor = pool.utf8("LNonNull;")?;
		let annotation = TypeAnnotation {
			target: TypeAnnotationTarget::TypeParameterBound { target_type: 0x12, type_parameter: 1, bound: 0 },
			target_path: vec![TypePathEntry { kind: 3, argument_index: 0 }],
			annotation: Annotation { type_descriptor: type_descriptor.clone(), elements: Vec::new() },
		};
		let mut buf = BufWriter::new();
		annotation.write_to(&mut buf, &mut pool)?;

		let [type_high, type_low] = type_descriptor.index().to_be_bytes();
		assert_eq!(buf.as_slice(), &[
			0x12, 1, 0,
			1, 3, 0,
			type_high, type_low,
			0, 0,
		]);
		assert_eq!(TypeAnnotationTarget::Catch { exception_table_index: 0 }.target_type(), 0x42);
		Ok(())
	}

	#[test]
	fn type_path_length_is_one_byte() -> Result<()> {
		let mut pool = PoolBuilder::new();
		let annotation = TypeAnnotation {
			target: TypeAnnotationTarget::Empty { target_type: 0x13 },
			target_path: vec![TypePathEntry { kind: 0, argument_index: 0 }; 256],
			annotation: Annotation { type_descriptor: pool.utf8("LA;")?, elements: Vec::new() },
		};
		let error = annotation.write_to(&mut BufWriter::new(), &mut pool).unwrap_err();
		assert!(matches!(ClassFileError::find(&error), Some(ClassFileError::IndexOverflow { .. })));
		Ok(())
	}
}
