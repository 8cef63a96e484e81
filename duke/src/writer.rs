//! Writing classes, fields and methods from their elements.
//!
//! Bound fields, methods and code are copied byte for byte if the pool written to can use the indices of the pool
//! they were read from, and if nothing was dropped while reading them. Everything else is written again from its
//! elements, cloning the pool entries it refers to.
use anyhow::{anyhow, bail, Context, Result};
use log::{debug, trace};
use crate::buf_writer::BufWriter;
use crate::class_constants::{attribute, version, MAGIC};
use crate::class_reader::ClassReader;
use java_string::JavaStr;
use crate::model::{ClassElement, CodeModel, FieldElement, FieldModel, MethodElement, MethodModel};
use crate::options::ParseOptions;
use crate::pool::builder::PoolBuilder;
use crate::pool::{ConstantPool, PoolEntry};

pub(crate) mod code;
pub(crate) mod frames;

use code::CodeWriter;
use frames::MethodContext;

/// What writing code needs to know about the class it's in.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ClassContext<'a> {
	pub(crate) this_class: &'a JavaStr,
	pub(crate) major_version: u16,
	pub(crate) options: &'a ParseOptions,
}

impl ClassContext<'_> {
	/// Whether code needs a `StackMapTable`, and duke should compute it if the frames given don't suffice.
	pub(crate) fn generates_stack_maps(&self) -> bool {
		self.major_version >= version::V1_6 && self.options.generate_stack_maps
	}
}

/// Whether the bytes of something read by `reader` may be copied into a class using `pool`.
fn can_copy(pool: &PoolBuilder, reader: &ClassReader) -> bool {
	pool.can_write_direct(reader.id()) && reader.options().is_lossless()
}

/// Writes a whole class file.
///
/// Missing elements get defaults: no access flags, version 52.0, no superclass, no interfaces. The `options` decide
/// how stack map frames of rewritten code are computed.
pub(crate) fn write_class<'r>(
	pool: &mut PoolBuilder<'r>,
	this_class: &PoolEntry,
	elements: Vec<ClassElement<'r>>,
	options: &ParseOptions,
) -> Result<Vec<u8>> {
	let mut flags = 0;
	let mut major = version::V1_8;
	let mut minor = 0;
	// code written before the version element still depends on it
	for element in &elements {
		if let &ClassElement::Version { major: value_major, .. } = element {
			major = value_major;
		}
	}
	let class = ClassContext { this_class: this_class.as_class_name()?, major_version: major, options };
	let mut super_class = None;
	let mut interfaces = Vec::new();

	let mut fields = BufWriter::new();
	let mut fields_count = 0;
	let mut methods = BufWriter::new();
	let mut methods_count = 0;
	let mut attributes = BufWriter::new();
	let mut attributes_count = 0;

	for element in elements {
		match element {
			ClassElement::AccessFlags(value) => flags = value,
			ClassElement::Version { major: value_major, minor: value_minor } => {
				major = value_major;
				minor = value_minor;
			},
			ClassElement::Superclass(entry) => super_class = Some(entry),
			ClassElement::Interfaces(entries) => interfaces = entries,
			ClassElement::Field(field) => {
				write_field(&mut fields, pool, &field)
					.with_context(|| anyhow!("failed to write field {:?}:{:?}", field.name(), field.descriptor()))?;
				fields_count += 1;
			},
			ClassElement::Method(method) => {
				write_method(&mut methods, pool, &class, &method)
					.with_context(|| anyhow!("failed to write method {:?}{:?}", method.name(), method.descriptor()))?;
				methods_count += 1;
			},
			ClassElement::Attribute(attribute) => {
				attribute.write_to(&mut attributes, pool)?;
				attributes_count += 1;
			},
		}
	}

	let mut head = BufWriter::with_capacity(8 + 2 * interfaces.len());
	head.write_u16(flags);
	head.write_index(pool, this_class)?;
	head.write_index_or_zero(pool, super_class.as_ref())?;
	head.write_list("interfaces count", &interfaces, |buf, interface| {
		buf.write_index(pool, interface)?;
		Ok(())
	})?;

	// the bootstrap methods are only complete once everything else is written
	let mut bootstrap_methods = BufWriter::new();
	if pool.write_bootstrap_methods(&mut bootstrap_methods)? {
		let name = pool.utf8(attribute::BOOTSTRAP_METHODS)?;
		attributes.write_index(pool, &name)?;
		attributes.write_usize_as_u32("attribute length", bootstrap_methods.len())?;
		attributes.write_bytes(bootstrap_methods.as_slice());
		attributes_count += 1;
	}

	let mut buf = BufWriter::with_capacity(
		pool.parent().map_or(0, |parent| parent.bytes().len()) + fields.len() + methods.len() + attributes.len()
	);
	buf.write_u32(MAGIC);
	buf.write_u16(minor);
	buf.write_u16(major);
	pool.write_to(&mut buf)?;
	buf.write_bytes(head.as_slice());
	buf.write_usize_as_u16("fields count", fields_count)?;
	buf.write_bytes(fields.as_slice());
	buf.write_usize_as_u16("methods count", methods_count)?;
	buf.write_bytes(methods.as_slice());
	buf.write_usize_as_u16("attributes count", attributes_count)?;
	buf.write_bytes(attributes.as_slice());

	debug!("wrote class {:?} with {} pool entries, {} bytes", this_class, pool.entry_count(), buf.len());
	Ok(buf.into_bytes())
}

fn write_field<'r>(buf: &mut BufWriter, pool: &mut PoolBuilder<'r>, field: &FieldModel<'r>) -> Result<()> {
	if let Some((reader, bytes)) = field.bound_bytes() {
		if can_copy(pool, reader) {
			trace!("copying field {:?} directly", field.name());
			buf.write_bytes(bytes);
			return Ok(());
		}
	}

	let elements = field.elements()?;
	let mut flags = field.flags();
	let mut attributes = Vec::new();
	for element in elements {
		match element {
			FieldElement::AccessFlags(value) => flags = value,
			FieldElement::Attribute(attribute) => attributes.push(attribute),
		}
	}

	buf.write_u16(flags);
	buf.write_index(pool, field.name())?;
	buf.write_index(pool, field.descriptor())?;
	buf.write_list("attributes count", &attributes, |buf, attribute| attribute.write_to(buf, pool))
}

fn write_method<'r>(buf: &mut BufWriter, pool: &mut PoolBuilder<'r>, class: &ClassContext, method: &MethodModel<'r>) -> Result<()> {
	if let Some((reader, bytes)) = method.bound_bytes() {
		if can_copy(pool, reader) {
			trace!("copying method {:?}{:?} directly", method.name(), method.descriptor());
			buf.write_bytes(bytes);
			return Ok(());
		}
	}

	let elements = method.elements()?;
	let mut flags = method.flags();
	let mut code = None;
	let mut attributes = Vec::new();
	for element in elements {
		match element {
			MethodElement::AccessFlags(value) => flags = value,
			MethodElement::Code(model) => {
				if code.is_some() {
					bail!("method has more than one code attribute");
				}
				code = Some(model);
			},
			MethodElement::Attribute(attribute) => attributes.push(attribute),
		}
	}

	buf.write_u16(flags);
	buf.write_index(pool, method.name())?;
	buf.write_index(pool, method.descriptor())?;
	let count = attributes.len() + usize::from(code.is_some());
	buf.write_usize_as_u16("attributes count", count)?;
	if let Some(code) = code {
		let context = MethodContext {
			this_class: class.this_class,
			flags,
			name: method.name().as_utf8()?,
			descriptor: method.descriptor().as_utf8()?,
		};
		write_code(buf, pool, class, context, code)?;
	}
	for attribute in &attributes {
		attribute.write_to(buf, pool)?;
	}
	Ok(())
}

fn write_code<'r>(
	buf: &mut BufWriter,
	pool: &mut PoolBuilder<'r>,
	class: &ClassContext,
	method: MethodContext,
	code: CodeModel<'r>,
) -> Result<()> {
	if let Some(bound) = code.bound() {
		if can_copy(pool, bound.reader()) {
			trace!("copying code directly");
			buf.write_bytes(bound.attribute_bytes());
			return Ok(());
		}
	}

	let max_stack = code.max_stack();
	let max_locals = code.max_locals();
	let (elements, labels) = code.into_parts()?;
	let mut writer = CodeWriter::new(pool, labels);
	for element in elements {
		writer.write_element(element)?;
	}
	writer.finish(buf, class, &method, max_stack, max_locals)
		.with_context(|| anyhow!("failed to write code"))
}
