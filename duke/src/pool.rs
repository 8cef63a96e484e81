//! Constant pool entries, shared by the pool of a class that was read and by [`PoolBuilder`].
//!
//! A [`PoolEntry`] is a handle carrying the [`PoolId`] of the pool it belongs to, its index there, and its resolved
//! value. Composite entries hold their constituents as [`PoolEntry`]s of the same (or an index compatible) pool.
pub mod builder;

use std::fmt::{Debug, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use anyhow::Result;
use java_string::JavaStr;
use crate::class_constants::pool;
use crate::error::ClassFileError;

pub use builder::PoolBuilder;

static NEXT_POOL: AtomicU32 = AtomicU32::new(1);

/// Identifies one constant pool instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolId(u32);

impl PoolId {
	pub(crate) fn next() -> PoolId {
		PoolId(NEXT_POOL.fetch_add(1, Ordering::Relaxed))
	}
}

/// Read access to a constant pool, implemented by both [`crate::class_reader::ClassReader`] and [`PoolBuilder`].
pub trait ConstantPool {
	fn id(&self) -> PoolId;

	/// Gets the entry at `index`.
	///
	/// Fails with [`ClassFileError::InvalidIndex`] for `0`, indices `>= entry_count()`, and the upper half of a long
	/// or double.
	fn entry_by_index(&self, index: u16) -> Result<PoolEntry>;

	/// The value of the `constant_pool_count` item, one more than the largest index in use.
	fn entry_count(&self) -> u16;

	fn bootstrap_method_entry(&self, index: u16) -> Result<BootstrapMethod>;

	fn bootstrap_method_count(&self) -> u16;

	/// Like [`ConstantPool::entry_by_index`], but maps the index `0` to [`None`].
	fn entry_by_index_or_none(&self, index: u16) -> Result<Option<PoolEntry>> {
		if index == 0 {
			Ok(None)
		} else {
			self.entry_by_index(index).map(Some)
		}
	}
}

/// A `bootstrap_methods` item of the `BootstrapMethods` attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BootstrapMethod {
	pub handle: PoolEntry,
	pub arguments: Vec<PoolEntry>,
}

/// The value of a constant pool entry.
#[derive(Debug, Clone)]
pub enum EntryValue {
	Utf8(java_string::JavaString),
	Integer(i32),
	Float(f32),
	Long(i64),
	Double(f64),
	Class { name: PoolEntry },
	String { string: PoolEntry },
	FieldRef { class: PoolEntry, name_and_type: PoolEntry },
	MethodRef { class: PoolEntry, name_and_type: PoolEntry },
	InterfaceMethodRef { class: PoolEntry, name_and_type: PoolEntry },
	NameAndType { name: PoolEntry, descriptor: PoolEntry },
	MethodHandle { reference_kind: u8, reference: PoolEntry },
	MethodType { descriptor: PoolEntry },
	/// `bootstrap_method` is the index into the `BootstrapMethods` attribute of the owning pool, `bootstrap` is the
	/// bootstrap method found there.
	Dynamic { bootstrap_method: u16, bootstrap: BootstrapMethod, name_and_type: PoolEntry },
	InvokeDynamic { bootstrap_method: u16, bootstrap: BootstrapMethod, name_and_type: PoolEntry },
	Module { name: PoolEntry },
	Package { name: PoolEntry },
}

impl EntryValue {
	pub fn tag(&self) -> u8 {
		match self {
			EntryValue::Utf8(_) => pool::UTF8,
			EntryValue::Integer(_) => pool::INTEGER,
			EntryValue::Float(_) => pool::FLOAT,
			EntryValue::Long(_) => pool::LONG,
			EntryValue::Double(_) => pool::DOUBLE,
			EntryValue::Class { .. } => pool::CLASS,
			EntryValue::String { .. } => pool::STRING,
			EntryValue::FieldRef { .. } => pool::FIELD_REF,
			EntryValue::MethodRef { .. } => pool::METHOD_REF,
			EntryValue::InterfaceMethodRef { .. } => pool::INTERFACE_METHOD_REF,
			EntryValue::NameAndType { .. } => pool::NAME_AND_TYPE,
			EntryValue::MethodHandle { .. } => pool::METHOD_HANDLE,
			EntryValue::MethodType { .. } => pool::METHOD_TYPE,
			EntryValue::Dynamic { .. } => pool::DYNAMIC,
			EntryValue::InvokeDynamic { .. } => pool::INVOKE_DYNAMIC,
			EntryValue::Module { .. } => pool::MODULE,
			EntryValue::Package { .. } => pool::PACKAGE,
		}
	}

	pub fn kind_name(&self) -> &'static str {
		tag_name(self.tag())
	}

	/// Long and double entries take up two slots.
	pub fn width(&self) -> u16 {
		match self {
			EntryValue::Long(_) | EntryValue::Double(_) => 2,
			_ => 1,
		}
	}
}

pub(crate) fn tag_name(tag: u8) -> &'static str {
	match tag {
		pool::UTF8 => "Utf8",
		pool::INTEGER => "Integer",
		pool::FLOAT => "Float",
		pool::LONG => "Long",
		pool::DOUBLE => "Double",
		pool::CLASS => "Class",
		pool::STRING => "String",
		pool::FIELD_REF => "FieldRef",
		pool::METHOD_REF => "MethodRef",
		pool::INTERFACE_METHOD_REF => "InterfaceMethodRef",
		pool::NAME_AND_TYPE => "NameAndType",
		pool::METHOD_HANDLE => "MethodHandle",
		pool::METHOD_TYPE => "MethodType",
		pool::DYNAMIC => "Dynamic",
		pool::INVOKE_DYNAMIC => "InvokeDynamic",
		pool::MODULE => "Module",
		pool::PACKAGE => "Package",
		_ => "unknown entry",
	}
}

struct EntryInner {
	pool: PoolId,
	index: u16,
	value: EntryValue,
}

/// A constant pool entry.
///
/// Two entries are equal if they are the same slot of the same pool. Use [`PoolEntry::value`] to compare contents.
#[derive(Clone)]
pub struct PoolEntry(Arc<EntryInner>);

impl PoolEntry {
	pub(crate) fn new(pool: PoolId, index: u16, value: EntryValue) -> PoolEntry {
		PoolEntry(Arc::new(EntryInner { pool, index, value }))
	}

	pub fn pool(&self) -> PoolId {
		self.0.pool
	}

	pub fn index(&self) -> u16 {
		self.0.index
	}

	pub fn value(&self) -> &EntryValue {
		&self.0.value
	}

	pub fn tag(&self) -> u8 {
		self.0.value.tag()
	}

	/// Whether `ldc` and friends can load this entry.
	pub fn is_loadable(&self) -> bool {
		matches!(self.value(),
			EntryValue::Integer(_) | EntryValue::Float(_) | EntryValue::Long(_) | EntryValue::Double(_) |
			EntryValue::Class { .. } | EntryValue::String { .. } | EntryValue::MethodHandle { .. } |
			EntryValue::MethodType { .. } | EntryValue::Dynamic { .. }
		)
	}

	/// Whether loading this entry pushes a `long` or `double`, which takes `ldc2_w` and two stack slots.
	///
	/// Besides long and double entries, this holds for dynamic constants with the descriptor `J` or `D`.
	pub fn is_wide_constant(&self) -> bool {
		match self.value() {
			EntryValue::Long(_) | EntryValue::Double(_) => true,
			EntryValue::Dynamic { .. } => self.member_descriptor()
				.is_ok_and(|descriptor| descriptor == "J" || descriptor == "D"),
			_ => false,
		}
	}

	fn wrong_kind(&self, expected: &'static str) -> anyhow::Error {
		ClassFileError::WrongEntryKind { index: self.index(), found: self.value().kind_name(), expected }.into()
	}

	/// Checks that this entry has the given tag.
	pub fn expect_tag(&self, tag: u8) -> Result<&PoolEntry> {
		if self.tag() == tag {
			Ok(self)
		} else {
			Err(self.wrong_kind(tag_name(tag)))
		}
	}

	pub fn as_utf8(&self) -> Result<&JavaStr> {
		let EntryValue::Utf8(string) = self.value() else {
			return Err(self.wrong_kind("Utf8"));
		};
		Ok(string.as_java_str())
	}

	pub fn as_int(&self) -> Result<i32> {
		let &EntryValue::Integer(value) = self.value() else {
			return Err(self.wrong_kind("Integer"));
		};
		Ok(value)
	}

	/// The internal name of a `Class` entry.
	pub fn as_class_name(&self) -> Result<&JavaStr> {
		let EntryValue::Class { name } = self.value() else {
			return Err(self.wrong_kind("Class"));
		};
		name.as_utf8()
	}

	/// The name and descriptor of a `NameAndType` entry.
	pub fn as_name_and_type(&self) -> Result<(&JavaStr, &JavaStr)> {
		let EntryValue::NameAndType { name, descriptor } = self.value() else {
			return Err(self.wrong_kind("NameAndType"));
		};
		Ok((name.as_utf8()?, descriptor.as_utf8()?))
	}

	/// The owner, name and descriptor of a `FieldRef`, `MethodRef` or `InterfaceMethodRef` entry.
	pub fn as_member_ref(&self) -> Result<(&JavaStr, &JavaStr, &JavaStr)> {
		match self.value() {
			EntryValue::FieldRef { class, name_and_type } |
			EntryValue::MethodRef { class, name_and_type } |
			EntryValue::InterfaceMethodRef { class, name_and_type } => {
				let (name, descriptor) = name_and_type.as_name_and_type()?;
				Ok((class.as_class_name()?, name, descriptor))
			},
			_ => Err(self.wrong_kind("FieldRef, MethodRef or InterfaceMethodRef")),
		}
	}

	/// The descriptor of member references, `Dynamic` and `InvokeDynamic` entries.
	pub fn member_descriptor(&self) -> Result<&JavaStr> {
		match self.value() {
			EntryValue::FieldRef { name_and_type, .. } |
			EntryValue::MethodRef { name_and_type, .. } |
			EntryValue::InterfaceMethodRef { name_and_type, .. } |
			EntryValue::Dynamic { name_and_type, .. } |
			EntryValue::InvokeDynamic { name_and_type, .. } => Ok(name_and_type.as_name_and_type()?.1),
			_ => Err(self.wrong_kind("an entry with a descriptor")),
		}
	}
}

impl PartialEq for PoolEntry {
	fn eq(&self, other: &Self) -> bool {
		self.pool() == other.pool() && self.index() == other.index()
	}
}

impl Eq for PoolEntry {}

impl Hash for PoolEntry {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.pool().hash(state);
		self.index().hash(state);
	}
}

impl Debug for PoolEntry {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self.value() {
			EntryValue::Utf8(string) => write!(f, "#{} {string:?}", self.index()),
			EntryValue::Integer(value) => write!(f, "#{} int {value}", self.index()),
			EntryValue::Float(value) => write!(f, "#{} float {value}", self.index()),
			EntryValue::Long(value) => write!(f, "#{} long {value}", self.index()),
			EntryValue::Double(value) => write!(f, "#{} double {value}", self.index()),
			EntryValue::Class { name } => write!(f, "#{} class {name:?}", self.index()),
			EntryValue::String { string } => write!(f, "#{} string {string:?}", self.index()),
			value => write!(f, "#{} {}", self.index(), value.kind_name()),
		}
	}
}

/// The structural identity of an entry, used for deduplication.
///
/// Constituents are represented by their indices, which must already be valid in the pool the key is used with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum EntryKey {
	Utf8(java_string::JavaString),
	Integer(i32),
	Float(u32),
	Long(i64),
	Double(u64),
	Class(u16),
	String(u16),
	FieldRef(u16, u16),
	MethodRef(u16, u16),
	InterfaceMethodRef(u16, u16),
	NameAndType(u16, u16),
	MethodHandle(u8, u16),
	MethodType(u16),
	Dynamic(u16, u16),
	InvokeDynamic(u16, u16),
	Module(u16),
	Package(u16),
}

impl EntryKey {
	pub(crate) fn of(value: &EntryValue) -> EntryKey {
		match value {
			EntryValue::Utf8(string) => EntryKey::Utf8(string.clone()),
			&EntryValue::Integer(value) => EntryKey::Integer(value),
			&EntryValue::Float(value) => EntryKey::Float(value.to_bits()),
			&EntryValue::Long(value) => EntryKey::Long(value),
			&EntryValue::Double(value) => EntryKey::Double(value.to_bits()),
			EntryValue::Class { name } => EntryKey::Class(name.index()),
			EntryValue::String { string } => EntryKey::String(string.index()),
			EntryValue::FieldRef { class, name_and_type } => EntryKey::FieldRef(class.index(), name_and_type.index()),
			EntryValue::MethodRef { class, name_and_type } => EntryKey::MethodRef(class.index(), name_and_type.index()),
			EntryValue::InterfaceMethodRef { class, name_and_type } =>
				EntryKey::InterfaceMethodRef(class.index(), name_and_type.index()),
			EntryValue::NameAndType { name, descriptor } => EntryKey::NameAndType(name.index(), descriptor.index()),
			EntryValue::MethodHandle { reference_kind, reference } => EntryKey::MethodHandle(*reference_kind, reference.index()),
			EntryValue::MethodType { descriptor } => EntryKey::MethodType(descriptor.index()),
			EntryValue::Dynamic { bootstrap_method, name_and_type, .. } =>
				EntryKey::Dynamic(*bootstrap_method, name_and_type.index()),
			EntryValue::InvokeDynamic { bootstrap_method, name_and_type, .. } =>
				EntryKey::InvokeDynamic(*bootstrap_method, name_and_type.index()),
			EntryValue::Module { name } => EntryKey::Module(name.index()),
			EntryValue::Package { name } => EntryKey::Package(name.index()),
		}
	}
}
