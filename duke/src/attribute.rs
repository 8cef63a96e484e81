//! Attributes of classes, fields and methods.
//!
//! An [`Attribute`] is either bound to the bytes of a class file that was read, or an [`UnboundAttribute`] holding
//! its values. Both write themselves into a [`PoolBuilder`]. The attributes of the `Code` attribute aren't modeled
//! here, they turn into elements of the code (see [`crate::model::CodeElement`]).
use std::fmt::{Debug, Formatter};
use std::sync::OnceLock;
use anyhow::{anyhow, Context, Result};
use java_string::{JavaStr, JavaString};
use log::trace;
use crate::buf_writer::BufWriter;
use crate::class_constants::{attribute, pool};
use crate::class_reader::{AttributeSpan, ClassReader, Cursor};
use crate::error::ClassFileError;
use crate::pool::{ConstantPool, EntryValue, PoolEntry, PoolId};
use crate::pool::builder::PoolBuilder;
use crate::signature::{parse_class_signature, parse_field_signature, parse_method_signature, ClassSignature, MethodSignature, TypeSignature};

pub mod annotation;

pub use annotation::{
	Annotation, ElementValue, ElementValuePair, LocalVariableTarget, TypeAnnotation, TypeAnnotationTarget, TypePathEntry,
};

/// The names of the attributes that are decoded into something other than [`UnboundAttribute::Unknown`].
const KNOWN: [&str; 23] = [
	attribute::SOURCE_FILE,
	attribute::SIGNATURE,
	attribute::CONSTANT_VALUE,
	attribute::EXCEPTIONS,
	attribute::INNER_CLASSES,
	attribute::ENCLOSING_METHOD,
	attribute::NEST_HOST,
	attribute::NEST_MEMBERS,
	attribute::PERMITTED_SUBCLASSES,
	attribute::DEPRECATED,
	attribute::SYNTHETIC,
	attribute::SOURCE_DEBUG_EXTENSION,
	attribute::METHOD_PARAMETERS,
	attribute::MODULE,
	attribute::MODULE_PACKAGES,
	attribute::MODULE_MAIN_CLASS,
	attribute::RUNTIME_VISIBLE_ANNOTATIONS,
	attribute::RUNTIME_INVISIBLE_ANNOTATIONS,
	attribute::RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS,
	attribute::RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS,
	attribute::RUNTIME_VISIBLE_TYPE_ANNOTATIONS,
	attribute::RUNTIME_INVISIBLE_TYPE_ANNOTATIONS,
	attribute::ANNOTATION_DEFAULT,
];

#[derive(Debug, Clone, PartialEq)]
pub struct InnerClass {
	pub inner_class: PoolEntry,
	pub outer_class: Option<PoolEntry>,
	pub inner_name: Option<PoolEntry>,
	pub flags: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodParameter {
	pub name: Option<PoolEntry>,
	pub flags: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModuleRequires {
	pub module: PoolEntry,
	pub flags: u16,
	pub version: Option<PoolEntry>,
}

/// An `exports` or `opens` item of the `Module` attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleExports {
	pub package: PoolEntry,
	pub flags: u16,
	/// The modules the package is exported or opened to, empty for all modules.
	pub to: Vec<PoolEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModuleProvides {
	pub service: PoolEntry,
	pub with: Vec<PoolEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModuleAttribute {
	pub name: PoolEntry,
	pub flags: u16,
	pub version: Option<PoolEntry>,
	pub requires: Vec<ModuleRequires>,
	pub exports: Vec<ModuleExports>,
	pub opens: Vec<ModuleExports>,
	pub uses: Vec<PoolEntry>,
	pub provides: Vec<ModuleProvides>,
}

/// An attribute with its contents as values.
#[derive(Debug, Clone, PartialEq)]
pub enum UnboundAttribute {
	SourceFile { source_file: PoolEntry },
	Signature { signature: PoolEntry },
	ConstantValue { value: PoolEntry },
	Exceptions { exceptions: Vec<PoolEntry> },
	InnerClasses { classes: Vec<InnerClass> },
	EnclosingMethod { class: PoolEntry, method: Option<PoolEntry> },
	NestHost { host: PoolEntry },
	NestMembers { members: Vec<PoolEntry> },
	PermittedSubclasses { subclasses: Vec<PoolEntry> },
	Deprecated,
	Synthetic,
	SourceDebugExtension { bytes: Vec<u8> },
	MethodParameters { parameters: Vec<MethodParameter> },
	Module(ModuleAttribute),
	ModulePackages { packages: Vec<PoolEntry> },
	ModuleMainClass { main_class: PoolEntry },
	RuntimeVisibleAnnotations { annotations: Vec<Annotation> },
	RuntimeInvisibleAnnotations { annotations: Vec<Annotation> },
	/// The annotations of each parameter.
	RuntimeVisibleParameterAnnotations { parameters: Vec<Vec<Annotation>> },
	RuntimeInvisibleParameterAnnotations { parameters: Vec<Vec<Annotation>> },
	RuntimeVisibleTypeAnnotations { annotations: Vec<TypeAnnotation> },
	RuntimeInvisibleTypeAnnotations { annotations: Vec<TypeAnnotation> },
	/// The default value of an element of an annotation interface.
	AnnotationDefault { value: ElementValue },
	/// Any other attribute. Its bytes may contain constant pool indices, so if it was read from a class file (`origin`
	/// is set) it can only be written into a pool compatible with that one.
	Unknown { name: JavaString, bytes: Vec<u8>, origin: Option<PoolId> },
}

impl UnboundAttribute {
	pub fn source_file(pool: &mut PoolBuilder, source_file: &str) -> Result<UnboundAttribute> {
		Ok(UnboundAttribute::SourceFile { source_file: pool.utf8(source_file)? })
	}

	pub fn signature(pool: &mut PoolBuilder, signature: &str) -> Result<UnboundAttribute> {
		Ok(UnboundAttribute::Signature { signature: pool.utf8(signature)? })
	}

	/// An attribute this crate doesn't know, that may be written into any constant pool.
	pub fn unknown(name: &str, bytes: Vec<u8>) -> UnboundAttribute {
		UnboundAttribute::Unknown { name: JavaStr::from_str(name).to_owned(), bytes, origin: None }
	}

	pub fn name(&self) -> &JavaStr {
		JavaStr::from_str(match self {
			UnboundAttribute::SourceFile { .. } => attribute::SOURCE_FILE,
			UnboundAttribute::Signature { .. } => attribute::SIGNATURE,
			UnboundAttribute::ConstantValue { .. } => attribute::CONSTANT_VALUE,
			UnboundAttribute::Exceptions { .. } => attribute::EXCEPTIONS,
			UnboundAttribute::InnerClasses { .. } => attribute::INNER_CLASSES,
			UnboundAttribute::EnclosingMethod { .. } => attribute::ENCLOSING_METHOD,
			UnboundAttribute::NestHost { .. } => attribute::NEST_HOST,
			UnboundAttribute::NestMembers { .. } => attribute::NEST_MEMBERS,
			UnboundAttribute::PermittedSubclasses { .. } => attribute::PERMITTED_SUBCLASSES,
			UnboundAttribute::Deprecated => attribute::DEPRECATED,
			UnboundAttribute::Synthetic => attribute::SYNTHETIC,
			UnboundAttribute::SourceDebugExtension { .. } => attribute::SOURCE_DEBUG_EXTENSION,
			UnboundAttribute::MethodParameters { .. } => attribute::METHOD_PARAMETERS,
			UnboundAttribute::Module(_) => attribute::MODULE,
			UnboundAttribute::ModulePackages { .. } => attribute::MODULE_PACKAGES,
			UnboundAttribute::ModuleMainClass { .. } => attribute::MODULE_MAIN_CLASS,
			UnboundAttribute::RuntimeVisibleAnnotations { .. } => attribute::RUNTIME_VISIBLE_ANNOTATIONS,
			UnboundAttribute::RuntimeInvisibleAnnotations { .. } => attribute::RUNTIME_INVISIBLE_ANNOTATIONS,
			UnboundAttribute::RuntimeVisibleParameterAnnotations { .. } => attribute::RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS,
			UnboundAttribute::RuntimeInvisibleParameterAnnotations { .. } => attribute::RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS,
			UnboundAttribute::RuntimeVisibleTypeAnnotations { .. } => attribute::RUNTIME_VISIBLE_TYPE_ANNOTATIONS,
			UnboundAttribute::RuntimeInvisibleTypeAnnotations { .. } => attribute::RUNTIME_INVISIBLE_TYPE_ANNOTATIONS,
			UnboundAttribute::AnnotationDefault { .. } => attribute::ANNOTATION_DEFAULT,
			UnboundAttribute::Unknown { name, .. } => return name.as_java_str(),
		})
	}

	fn signature_string(&self) -> Result<&JavaStr> {
		match self {
			UnboundAttribute::Signature { signature } => signature.as_utf8(),
			other => Err(anyhow!("expected a `Signature` attribute, got {:?}", other.name())),
		}
	}

	/// Parses the contents of a `Signature` attribute of a class.
	pub fn class_signature(&self) -> Result<ClassSignature> {
		parse_class_signature(self.signature_string()?)
	}

	pub fn method_signature(&self) -> Result<MethodSignature> {
		parse_method_signature(self.signature_string()?)
	}

	pub fn field_signature(&self) -> Result<TypeSignature> {
		parse_field_signature(self.signature_string()?)
	}

	fn check_portable(&self, pool: &PoolBuilder) -> Result<()> {
		if let UnboundAttribute::Unknown { name, origin: Some(origin), .. } = self {
			if !pool.can_write_direct(*origin) {
				return Err(ClassFileError::IncompatiblePool { what: format!("unknown attribute {name:?}") }.into());
			}
		}
		Ok(())
	}

	pub fn write_to(&self, buf: &mut BufWriter, pool: &mut PoolBuilder) -> Result<()> {
		self.check_portable(pool)?;
		let name = pool.utf8_entry(self.name())?;
		buf.write_index(pool, &name)?;
		buf.write_length_prefixed(|buf| self.write_body(buf, pool))
			.with_context(|| anyhow!("failed to write attribute {:?}", self.name()))
	}

	fn write_body(&self, buf: &mut BufWriter, pool: &mut PoolBuilder) -> Result<()> {
		fn write_entries(buf: &mut BufWriter, pool: &mut PoolBuilder, what: &'static str, entries: &[PoolEntry]) -> Result<()> {
			buf.write_list(what, entries, |buf, entry| {
				buf.write_index(pool, entry)?;
				Ok(())
			})
		}

		match self {
			UnboundAttribute::SourceFile { source_file: entry } |
			UnboundAttribute::Signature { signature: entry } |
			UnboundAttribute::ConstantValue { value: entry } |
			UnboundAttribute::NestHost { host: entry } |
			UnboundAttribute::ModuleMainClass { main_class: entry } => {
				buf.write_index(pool, entry)?;
			},
			UnboundAttribute::Exceptions { exceptions } => write_entries(buf, pool, "number of exceptions", exceptions)?,
			UnboundAttribute::InnerClasses { classes } => {
				buf.write_list("number of inner classes", classes, |buf, class| {
					buf.write_index(pool, &class.inner_class)?;
					buf.write_index_or_zero(pool, class.outer_class.as_ref())?;
					buf.write_index_or_zero(pool, class.inner_name.as_ref())?;
					buf.write_u16(class.flags);
					Ok(())
				})?;
			},
			UnboundAttribute::EnclosingMethod { class, method } => {
				buf.write_index(pool, class)?;
				buf.write_index_or_zero(pool, method.as_ref())?;
			},
			UnboundAttribute::NestMembers { members } => write_entries(buf, pool, "number of nest members", members)?,
			UnboundAttribute::PermittedSubclasses { subclasses } =>
				write_entries(buf, pool, "number of permitted subclasses", subclasses)?,
			UnboundAttribute::Deprecated | UnboundAttribute::Synthetic => {},
			UnboundAttribute::SourceDebugExtension { bytes } => buf.write_bytes(bytes),
			UnboundAttribute::MethodParameters { parameters } => {
				let count = u8::try_from(parameters.len())
					.map_err(|_| ClassFileError::IndexOverflow { what: "number of method parameters", value: parameters.len() as i64 })?;
				buf.write_u8(count);
				for parameter in parameters {
					buf.write_index_or_zero(pool, parameter.name.as_ref())?;
					buf.write_u16(parameter.flags);
				}
			},
			UnboundAttribute::Module(module) => {
				buf.write_index(pool, &module.name)?;
				buf.write_u16(module.flags);
				buf.write_index_or_zero(pool, module.version.as_ref())?;
				buf.write_list("number of requires", &module.requires, |buf, requires| {
					buf.write_index(pool, &requires.module)?;
					buf.write_u16(requires.flags);
					buf.write_index_or_zero(pool, requires.version.as_ref())
				})?;
				for (what, list) in [("number of exports", &module.exports), ("number of opens", &module.opens)] {
					buf.write_list(what, list, |buf, exports| {
						buf.write_index(pool, &exports.package)?;
						buf.write_u16(exports.flags);
						write_entries(buf, pool, "number of modules exported to", &exports.to)
					})?;
				}
				write_entries(buf, pool, "number of uses", &module.uses)?;
				buf.write_list("number of provides", &module.provides, |buf, provides| {
					buf.write_index(pool, &provides.service)?;
					write_entries(buf, pool, "number of implementations", &provides.with)
				})?;
			},
			UnboundAttribute::ModulePackages { packages } => write_entries(buf, pool, "number of packages", packages)?,
			UnboundAttribute::RuntimeVisibleAnnotations { annotations } |
			UnboundAttribute::RuntimeInvisibleAnnotations { annotations } =>
				annotation::write_annotations(buf, pool, annotations)?,
			UnboundAttribute::RuntimeVisibleParameterAnnotations { parameters } |
			UnboundAttribute::RuntimeInvisibleParameterAnnotations { parameters } =>
				annotation::write_parameter_annotations(buf, pool, parameters)?,
			UnboundAttribute::RuntimeVisibleTypeAnnotations { annotations } |
			UnboundAttribute::RuntimeInvisibleTypeAnnotations { annotations } =>
				annotation::write_type_annotations(buf, pool, annotations)?,
			UnboundAttribute::AnnotationDefault { value } => value.write_to(buf, pool)?,
			UnboundAttribute::Unknown { bytes, .. } => buf.write_bytes(bytes),
		}
		Ok(())
	}
}

fn read_tagged(cursor: &mut Cursor, tag: u8) -> Result<PoolEntry> {
	let entry = cursor.read_entry()?;
	entry.expect_tag(tag)?;
	Ok(entry)
}

fn read_tagged_or_none(cursor: &mut Cursor, tag: u8) -> Result<Option<PoolEntry>> {
	let entry = cursor.read_entry_or_none()?;
	if let Some(entry) = &entry {
		entry.expect_tag(tag)?;
	}
	Ok(entry)
}

fn read_tagged_list(cursor: &mut Cursor, tag: u8) -> Result<Vec<PoolEntry>> {
	cursor.read_vec(|c| c.read_u16_as_usize(), |c| read_tagged(c, tag))
}

fn read_module(c: &mut Cursor) -> Result<ModuleAttribute> {
	let name = read_tagged(c, pool::MODULE)?;
	let flags = c.read_u16()?;
	let version = read_tagged_or_none(c, pool::UTF8)?;
	let requires = c.read_vec(|c| c.read_u16_as_usize(), |c| Ok(ModuleRequires {
		module: read_tagged(c, pool::MODULE)?,
		flags: c.read_u16()?,
		version: read_tagged_or_none(c, pool::UTF8)?,
	}))?;
	fn read_exports(c: &mut Cursor) -> Result<Vec<ModuleExports>> {
		c.read_vec(|c| c.read_u16_as_usize(), |c| Ok(ModuleExports {
			package: read_tagged(c, pool::PACKAGE)?,
			flags: c.read_u16()?,
			to: read_tagged_list(c, pool::MODULE)?,
		}))
	}

	let exports = read_exports(c)?;
	let opens = read_exports(c)?;
	let uses = read_tagged_list(c, pool::CLASS)?;
	let provides = c.read_vec(|c| c.read_u16_as_usize(), |c| Ok(ModuleProvides {
		service: read_tagged(c, pool::CLASS)?,
		with: read_tagged_list(c, pool::CLASS)?,
	}))?;
	Ok(ModuleAttribute { name, flags, version, requires, exports, opens, uses, provides })
}

fn read_attribute(reader: &ClassReader, span: &AttributeSpan) -> Result<UnboundAttribute> {
	let mut c = Cursor::new(reader, span.pos, span.len);
	let c = &mut c;

	let attribute = match KNOWN.iter().copied().find(|&known| span.is(known)) {
		Some(attribute::SOURCE_FILE) => UnboundAttribute::SourceFile { source_file: c.read_utf8_entry()? },
		Some(attribute::SIGNATURE) => UnboundAttribute::Signature { signature: c.read_utf8_entry()? },
		Some(attribute::CONSTANT_VALUE) => {
			let value = c.read_entry()?;
			if !matches!(value.value(),
				EntryValue::Integer(_) | EntryValue::Float(_) | EntryValue::Long(_) | EntryValue::Double(_) | EntryValue::String { .. }
			) {
				return Err(ClassFileError::WrongEntryKind {
					index: value.index(),
					found: value.value().kind_name(),
					expected: "Integer, Float, Long, Double or String",
				}.into());
			}
			UnboundAttribute::ConstantValue { value }
		},
		Some(attribute::EXCEPTIONS) => UnboundAttribute::Exceptions { exceptions: read_tagged_list(c, pool::CLASS)? },
		Some(attribute::INNER_CLASSES) => UnboundAttribute::InnerClasses {
			classes: c.read_vec(|c| c.read_u16_as_usize(), |c| Ok(InnerClass {
				inner_class: c.read_class_entry()?,
				outer_class: read_tagged_or_none(c, pool::CLASS)?,
				inner_name: read_tagged_or_none(c, pool::UTF8)?,
				flags: c.read_u16()?,
			}))?,
		},
		Some(attribute::ENCLOSING_METHOD) => UnboundAttribute::EnclosingMethod {
			class: c.read_class_entry()?,
			method: read_tagged_or_none(c, pool::NAME_AND_TYPE)?,
		},
		Some(attribute::NEST_HOST) => UnboundAttribute::NestHost { host: c.read_class_entry()? },
		Some(attribute::NEST_MEMBERS) => UnboundAttribute::NestMembers { members: read_tagged_list(c, pool::CLASS)? },
		Some(attribute::PERMITTED_SUBCLASSES) =>
			UnboundAttribute::PermittedSubclasses { subclasses: read_tagged_list(c, pool::CLASS)? },
		Some(attribute::DEPRECATED) => UnboundAttribute::Deprecated,
		Some(attribute::SYNTHETIC) => UnboundAttribute::Synthetic,
		Some(attribute::SOURCE_DEBUG_EXTENSION) =>
			UnboundAttribute::SourceDebugExtension { bytes: c.read_bytes(span.len)?.to_vec() },
		Some(attribute::METHOD_PARAMETERS) => UnboundAttribute::MethodParameters {
			parameters: c.read_vec(|c| Ok(c.read_u8()? as usize), |c| Ok(MethodParameter {
				name: read_tagged_or_none(c, pool::UTF8)?,
				flags: c.read_u16()?,
			}))?,
		},
		Some(attribute::MODULE) => UnboundAttribute::Module(read_module(c)?),
		Some(attribute::MODULE_PACKAGES) => UnboundAttribute::ModulePackages { packages: read_tagged_list(c, pool::PACKAGE)? },
		Some(attribute::MODULE_MAIN_CLASS) => UnboundAttribute::ModuleMainClass { main_class: c.read_class_entry()? },
		Some(attribute::RUNTIME_VISIBLE_ANNOTATIONS) =>
			UnboundAttribute::RuntimeVisibleAnnotations { annotations: annotation::read_annotations(c)? },
		Some(attribute::RUNTIME_INVISIBLE_ANNOTATIONS) =>
			UnboundAttribute::RuntimeInvisibleAnnotations { annotations: annotation::read_annotations(c)? },
		Some(attribute::RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS) =>
			UnboundAttribute::RuntimeVisibleParameterAnnotations { parameters: annotation::read_parameter_annotations(c)? },
		Some(attribute::RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS) =>
			UnboundAttribute::RuntimeInvisibleParameterAnnotations { parameters: annotation::read_parameter_annotations(c)? },
		Some(attribute::RUNTIME_VISIBLE_TYPE_ANNOTATIONS) =>
			UnboundAttribute::RuntimeVisibleTypeAnnotations { annotations: annotation::read_type_annotations(c)? },
		Some(attribute::RUNTIME_INVISIBLE_TYPE_ANNOTATIONS) =>
			UnboundAttribute::RuntimeInvisibleTypeAnnotations { annotations: annotation::read_type_annotations(c)? },
		Some(attribute::ANNOTATION_DEFAULT) => UnboundAttribute::AnnotationDefault { value: ElementValue::read(c)? },
		_ => UnboundAttribute::Unknown {
			name: span.name.as_utf8()?.to_owned(),
			bytes: c.read_bytes(span.len)?.to_vec(),
			origin: Some(reader.id()),
		},
	};

	if c.remaining() != 0 {
		return Err(ClassFileError::malformed(c.pos(), format!(
			"attribute {:?} has {} bytes left after its contents", attribute.name(), c.remaining()
		)).into());
	}
	Ok(attribute)
}

/// An attribute of a class file that was read.
///
/// The decoded form is computed on first use and cached.
#[derive(Clone)]
pub struct BoundAttribute<'r> {
	reader: &'r ClassReader,
	span: AttributeSpan,
	decoded: OnceLock<UnboundAttribute>,
}

impl Debug for BoundAttribute<'_> {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("BoundAttribute")
			.field("name", &self.name())
			.field("pos", &self.span.pos)
			.field("len", &self.span.len)
			.finish()
	}
}

impl<'r> BoundAttribute<'r> {
	pub(crate) fn new(reader: &'r ClassReader, span: AttributeSpan) -> BoundAttribute<'r> {
		BoundAttribute { reader, span, decoded: OnceLock::new() }
	}

	pub fn name(&self) -> &JavaStr {
		// the class reader only creates spans with utf8 names
		match self.span.name.value() {
			EntryValue::Utf8(name) => name.as_java_str(),
			_ => JavaStr::from_str(""),
		}
	}

	pub fn is_known(&self) -> bool {
		KNOWN.iter().any(|&known| self.span.is(known))
	}

	/// The bytes of the attribute body, without name and length.
	pub fn bytes(&self) -> &'r [u8] {
		&self.reader.bytes()[self.span.pos..self.span.end()]
	}

	pub fn decode(&self) -> Result<&UnboundAttribute> {
		if let Some(decoded) = self.decoded.get() {
			return Ok(decoded);
		}
		let decoded = read_attribute(self.reader, &self.span)
			.with_context(|| anyhow!("failed to read attribute {:?} at position {}", self.name(), self.span.start))?;
		Ok(self.decoded.get_or_init(|| decoded))
	}

	pub fn write_to(&self, buf: &mut BufWriter, pool: &mut PoolBuilder) -> Result<()> {
		if pool.can_write_direct(self.reader.id()) {
			trace!("copying attribute {:?} directly", self.name());
			buf.write_index(pool, &self.span.name)?;
			buf.write_usize_as_u32("attribute length", self.span.len)?;
			buf.write_bytes(self.bytes());
			Ok(())
		} else {
			self.decode()?.write_to(buf, pool)
		}
	}
}

/// An attribute, either bound to a class file or with explicit values.
#[derive(Debug, Clone)]
pub enum Attribute<'r> {
	Bound(BoundAttribute<'r>),
	Unbound(UnboundAttribute),
}

impl From<UnboundAttribute> for Attribute<'_> {
	fn from(value: UnboundAttribute) -> Self {
		Attribute::Unbound(value)
	}
}

impl<'r> Attribute<'r> {
	pub fn name(&self) -> &JavaStr {
		match self {
			Attribute::Bound(bound) => bound.name(),
			Attribute::Unbound(unbound) => unbound.name(),
		}
	}

	/// Gets the contents as values. For bound attributes, this is cached.
	pub fn decode(&self) -> Result<&UnboundAttribute> {
		match self {
			Attribute::Bound(bound) => bound.decode(),
			Attribute::Unbound(unbound) => Ok(unbound),
		}
	}

	pub fn write_to(&self, buf: &mut BufWriter, pool: &mut PoolBuilder) -> Result<()> {
		match self {
			Attribute::Bound(bound) => bound.write_to(buf, pool),
			Attribute::Unbound(unbound) => unbound.write_to(buf, pool),
		}
	}
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use java_string::JavaStr;
	use pretty_assertions::assert_eq;
	use crate::attribute::{InnerClass, UnboundAttribute};
	use crate::buf_writer::BufWriter;
	use crate::error::ClassFileError;
	use crate::pool::builder::PoolBuilder;
	use crate::pool::PoolId;
	use crate::signature::TypeSignature;

	#[test]
	fn inner_classes_bytes() -> Result<()> {
		let mut pool = PoolBuilder::new();
		let inner_class = pool.class("a/B$C")?;
		let outer_class = pool.class("a/B")?;
		let attribute = UnboundAttribute::InnerClasses {
			classes: vec![InnerClass { inner_class: inner_class.clone(), outer_class: Some(outer_class.clone()), inner_name: None, flags: 0x0008 }],
		};
		let mut buf = BufWriter::new();
		attribute.write_to(&mut buf, &mut pool)?;

		let [name_high, name_low] = pool.utf8("InnerClasses")?.index().to_be_bytes();
		let [inner_high, inner_low] = inner_class.index().to_be_bytes();
		let [outer_high, outer_low] = outer_class.index().to_be_bytes();
		assert_eq!(buf.as_slice(), &[
			name_high, name_low,
			0, 0, 0, 10,
			0, 1,
			inner_high, inner_low,
			outer_high, outer_low,
			0, 0,
			0, 8,
		]);
		Ok(())
	}

	#[test]
	fn unknown_attributes_need_their_pool() -> Result<()> {
		let mut pool = PoolBuilder::new();
		let mut buf = BufWriter::new();

		UnboundAttribute::unknown("Custom", vec![1, 2, 3]).write_to(&mut buf, &mut pool)?;
		assert_eq!(&buf.as_slice()[2..], &[0, 0, 0, 3, 1, 2, 3]);

		let read = UnboundAttribute::Unknown {
			name: JavaStr::from_str("Custom").to_owned(),
			bytes: vec![0, 1],
			origin: Some(PoolId::next()),
		};
		let error = read.write_to(&mut buf, &mut pool).unwrap_err();
		assert!(matches!(ClassFileError::find(&error), Some(ClassFileError::IncompatiblePool { .. })));
		Ok(())
	}

	#[test]
	fn signature_views() -> Result<()> {
		let mut pool = PoolBuilder::new();
		let attribute = UnboundAttribute::signature(&mut pool, "Ljava/util/List<Ljava/lang/String;>;")?;
		assert!(matches!(attribute.field_signature()?, TypeSignature::Class(_)));
		assert!(attribute.method_signature().is_err());

		let broken = UnboundAttribute::signature(&mut pool, "Ljava/util/List<")?;
		assert!(broken.field_signature().is_err());
		assert!(UnboundAttribute::Deprecated.class_signature().is_err());
		Ok(())
	}

	#[test]
	fn method_parameters_count_is_one_byte() -> Result<()> {
		let mut pool = PoolBuilder::new();
		let attribute = UnboundAttribute::MethodParameters {
			parameters: vec![crate::attribute::MethodParameter { name: None, flags: 0 }; 256],
		};
		let error = attribute.write_to(&mut BufWriter::new(), &mut pool).unwrap_err();
		assert!(matches!(ClassFileError::find(&error), Some(ClassFileError::IndexOverflow { .. })));
		Ok(())
	}
}
