//! Models of a class and its members, and the elements they are made of.
//!
//! A model hands out its contents as a list of elements, in the order of the class file. Transforms consume these
//! elements and pass them (or others) on to a builder. Models are either read from a class file, in which case they
//! borrow its [`ClassReader`], or buffered, when an earlier transform stage built them.
use anyhow::{anyhow, Context, Result};
use log::debug;
use crate::attribute::{Attribute, BoundAttribute};
use crate::builder::ClassBuilder;
use crate::class_constants::attribute;
use crate::class_reader::{ClassReader, MemberSpan};
use crate::options::{ParseOptions, UnknownAttributesOption};
use crate::pool::builder::PoolBuilder;
use crate::pool::PoolEntry;
use crate::transform::ClassTransform;
use crate::writer;

pub(crate) mod code;

pub use code::{CodeElement, CodeModel, LocalVariable, StackMapFrame, VerificationType};

/// An element of a class.
#[derive(Debug, Clone)]
pub enum ClassElement<'r> {
	AccessFlags(u16),
	Version {
		major: u16,
		minor: u16,
	},
	/// Absent for `java/lang/Object` and `module-info`.
	Superclass(PoolEntry),
	Interfaces(Vec<PoolEntry>),
	Field(FieldModel<'r>),
	Method(MethodModel<'r>),
	/// Any class attribute except `BootstrapMethods`, which is part of the constant pool.
	Attribute(Attribute<'r>),
}

#[derive(Debug, Clone)]
pub enum FieldElement<'r> {
	AccessFlags(u16),
	Attribute(Attribute<'r>),
}

#[derive(Debug, Clone)]
pub enum MethodElement<'r> {
	AccessFlags(u16),
	Code(CodeModel<'r>),
	/// Any method attribute except `Code`.
	Attribute(Attribute<'r>),
}

/// The bound attributes at `pos`, without the ones named in `skip` and, depending on the options, unknown ones.
fn read_attributes<'r>(reader: &'r ClassReader, pos: usize, skip: &[&str]) -> Result<Vec<Attribute<'r>>> {
	let mut attributes = Vec::new();
	for span in reader.attributes(pos)? {
		if skip.iter().any(|&name| span.is(name)) {
			continue;
		}
		let attribute = BoundAttribute::new(reader, span);
		if !attribute.is_known() && reader.options().unknown_attributes == UnknownAttributesOption::Drop {
			debug!("dropping unknown attribute {:?}", attribute.name());
			continue;
		}
		attributes.push(Attribute::Bound(attribute));
	}
	Ok(attributes)
}

#[derive(Debug, Clone)]
enum Source<'r, E> {
	Bound {
		reader: &'r ClassReader,
		span: MemberSpan,
	},
	Buffered(Vec<E>),
}

impl<'r, E> Source<'r, E> {
	fn bound_bytes(&self) -> Option<(&'r ClassReader, &'r [u8])> {
		match *self {
			Source::Bound { reader, span } => Some((reader, &reader.bytes()[span.start..span.end])),
			Source::Buffered(_) => None,
		}
	}
}

/// The `access_flags`, `name_index` and `descriptor_index` items of a field or method.
fn read_member_header(reader: &ClassReader, span: MemberSpan) -> Result<(u16, PoolEntry, PoolEntry)> {
	Ok((
		reader.read_u16(span.start)?,
		reader.read_utf8_entry(span.start + 2)?,
		reader.read_utf8_entry(span.start + 4)?,
	))
}

#[derive(Debug, Clone)]
pub struct FieldModel<'r> {
	flags: u16,
	name: PoolEntry,
	descriptor: PoolEntry,
	source: Source<'r, FieldElement<'r>>,
}

impl<'r> FieldModel<'r> {
	fn read(reader: &'r ClassReader, span: MemberSpan) -> Result<FieldModel<'r>> {
		let (flags, name, descriptor) = read_member_header(reader, span)?;
		Ok(FieldModel { flags, name, descriptor, source: Source::Bound { reader, span } })
	}

	pub(crate) fn buffered(name: PoolEntry, descriptor: PoolEntry, elements: Vec<FieldElement<'r>>) -> FieldModel<'r> {
		let flags = elements.iter()
			.filter_map(|element| match element {
				&FieldElement::AccessFlags(flags) => Some(flags),
				_ => None,
			})
			.last()
			.unwrap_or(0);
		FieldModel { flags, name, descriptor, source: Source::Buffered(elements) }
	}

	pub fn flags(&self) -> u16 {
		self.flags
	}

	pub fn name(&self) -> &PoolEntry {
		&self.name
	}

	pub fn descriptor(&self) -> &PoolEntry {
		&self.descriptor
	}

	/// Whether `name()` and `descriptor()` are the given strings.
	pub fn is(&self, name: &str, descriptor: &str) -> bool {
		self.name.as_utf8().is_ok_and(|found| found == name) &&
			self.descriptor.as_utf8().is_ok_and(|found| found == descriptor)
	}

	pub(crate) fn bound_bytes(&self) -> Option<(&'r ClassReader, &'r [u8])> {
		self.source.bound_bytes()
	}

	pub fn elements(&self) -> Result<Vec<FieldElement<'r>>> {
		match &self.source {
			&Source::Bound { reader, span } => {
				let mut elements = vec![FieldElement::AccessFlags(self.flags)];
				let attributes = read_attributes(reader, span.attributes_pos, &[])
					.with_context(|| anyhow!("failed to read attributes of field {:?}", self.name))?;
				elements.extend(attributes.into_iter().map(FieldElement::Attribute));
				Ok(elements)
			},
			Source::Buffered(elements) => Ok(elements.clone()),
		}
	}

	pub(crate) fn into_elements(self) -> Result<Vec<FieldElement<'r>>> {
		match self.source {
			Source::Buffered(elements) => Ok(elements),
			Source::Bound { .. } => self.elements(),
		}
	}
}

#[derive(Debug, Clone)]
pub struct MethodModel<'r> {
	flags: u16,
	name: PoolEntry,
	descriptor: PoolEntry,
	source: Source<'r, MethodElement<'r>>,
}

impl<'r> MethodModel<'r> {
	fn read(reader: &'r ClassReader, span: MemberSpan) -> Result<MethodModel<'r>> {
		let (flags, name, descriptor) = read_member_header(reader, span)?;
		Ok(MethodModel { flags, name, descriptor, source: Source::Bound { reader, span } })
	}

	pub(crate) fn buffered(name: PoolEntry, descriptor: PoolEntry, elements: Vec<MethodElement<'r>>) -> MethodModel<'r> {
		let flags = elements.iter()
			.filter_map(|element| match element {
				&MethodElement::AccessFlags(flags) => Some(flags),
				_ => None,
			})
			.last()
			.unwrap_or(0);
		MethodModel { flags, name, descriptor, source: Source::Buffered(elements) }
	}

	pub fn flags(&self) -> u16 {
		self.flags
	}

	pub fn name(&self) -> &PoolEntry {
		&self.name
	}

	pub fn descriptor(&self) -> &PoolEntry {
		&self.descriptor
	}

	/// Whether `name()` and `descriptor()` are the given strings.
	pub fn is(&self, name: &str, descriptor: &str) -> bool {
		self.name.as_utf8().is_ok_and(|found| found == name) &&
			self.descriptor.as_utf8().is_ok_and(|found| found == descriptor)
	}

	pub(crate) fn bound_bytes(&self) -> Option<(&'r ClassReader, &'r [u8])> {
		self.source.bound_bytes()
	}

	/// The code of this method, [`None`] for abstract and native methods.
	pub fn code(&self) -> Result<Option<CodeModel<'r>>> {
		match &self.source {
			&Source::Bound { reader, span } => {
				for attribute in reader.attributes(span.attributes_pos)? {
					if attribute.is(attribute::CODE) {
						return CodeModel::read(reader, attribute).map(Some);
					}
				}
				Ok(None)
			},
			Source::Buffered(elements) => Ok(elements.iter().find_map(|element| match element {
				MethodElement::Code(code) => Some(code.clone()),
				_ => None,
			})),
		}
	}

	pub fn elements(&self) -> Result<Vec<MethodElement<'r>>> {
		match &self.source {
			&Source::Bound { reader, span } => {
				let mut elements = vec![MethodElement::AccessFlags(self.flags)];
				if let Some(code) = self.code()
					.with_context(|| anyhow!("failed to read code of method {:?}{:?}", self.name, self.descriptor))? {
					elements.push(MethodElement::Code(code));
				}
				let attributes = read_attributes(reader, span.attributes_pos, &[attribute::CODE])
					.with_context(|| anyhow!("failed to read attributes of method {:?}{:?}", self.name, self.descriptor))?;
				elements.extend(attributes.into_iter().map(MethodElement::Attribute));
				Ok(elements)
			},
			Source::Buffered(elements) => Ok(elements.clone()),
		}
	}

	pub(crate) fn into_elements(self) -> Result<Vec<MethodElement<'r>>> {
		match self.source {
			Source::Buffered(elements) => Ok(elements),
			Source::Bound { .. } => self.elements(),
		}
	}
}

/// A parsed class file.
///
/// Owns the bytes. Fields, methods, code and attributes borrow them.
#[derive(Debug)]
pub struct ClassModel {
	reader: ClassReader,
}

impl ClassModel {
	pub fn new(bytes: Vec<u8>, options: ParseOptions) -> Result<ClassModel> {
		Ok(ClassModel { reader: ClassReader::new(bytes, options)? })
	}

	pub(crate) fn from_reader(reader: ClassReader) -> ClassModel {
		ClassModel { reader }
	}

	pub fn reader(&self) -> &ClassReader {
		&self.reader
	}

	pub fn this_class(&self) -> Result<PoolEntry> {
		self.reader.this_class()
	}

	pub fn super_class(&self) -> Result<Option<PoolEntry>> {
		self.reader.super_class()
	}

	pub fn interfaces(&self) -> Result<Vec<PoolEntry>> {
		self.reader.interfaces()
	}

	pub fn access_flags(&self) -> u16 {
		self.reader.access_flags()
	}

	pub fn fields(&self) -> Result<Vec<FieldModel<'_>>> {
		self.reader.fields().iter()
			.map(|&span| FieldModel::read(&self.reader, span)
				.with_context(|| anyhow!("failed to read field at position {}", span.start)))
			.collect()
	}

	pub fn methods(&self) -> Result<Vec<MethodModel<'_>>> {
		self.reader.methods().iter()
			.map(|&span| MethodModel::read(&self.reader, span)
				.with_context(|| anyhow!("failed to read method at position {}", span.start)))
			.collect()
	}

	/// The class attributes, except for `BootstrapMethods`.
	pub fn attributes(&self) -> Result<Vec<Attribute<'_>>> {
		read_attributes(&self.reader, self.reader.attributes_pos(), &[attribute::BOOTSTRAP_METHODS])
			.with_context(|| anyhow!("failed to read class attributes"))
	}

	pub fn elements(&self) -> Result<Vec<ClassElement<'_>>> {
		let mut elements = vec![
			ClassElement::AccessFlags(self.reader.access_flags()),
			ClassElement::Version { major: self.reader.major_version(), minor: self.reader.minor_version() },
		];
		if let Some(super_class) = self.super_class()? {
			elements.push(ClassElement::Superclass(super_class));
		}
		elements.push(ClassElement::Interfaces(self.interfaces()?));
		elements.extend(self.fields()?.into_iter().map(ClassElement::Field));
		elements.extend(self.methods()?.into_iter().map(ClassElement::Method));
		elements.extend(self.attributes()?.into_iter().map(ClassElement::Attribute));
		Ok(elements)
	}

	/// Runs all elements of this class through `transform`, and writes the result.
	///
	/// The constant pool of the new class starts out as a copy of the pool of this one, so that everything the
	/// transform passes on unchanged can be copied as it is.
	pub fn transform(&self, mut transform: impl ClassTransform) -> Result<Vec<u8>> {
		let this_class = self.this_class()?;
		debug!("transforming class {:?}", this_class);

		let mut pool = PoolBuilder::with_parent(&self.reader);
		let mut elements = Vec::new();
		let mut builder = ClassBuilder::new(&mut pool, &mut elements);
		for element in self.elements()? {
			transform.accept(&mut builder, element)?;
		}
		transform.at_end(&mut builder)?;

		writer::write_class(&mut pool, &this_class, elements, self.reader.options())
			.with_context(|| anyhow!("failed to write transformed class {:?}", this_class))
	}
}
