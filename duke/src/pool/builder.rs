use std::collections::hash_map::Entry;
use std::collections::HashMap;
use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use java_string::JavaStr;
use log::{trace, warn};
use crate::buf_writer::BufWriter;
use crate::class_constants::pool;
use crate::class_reader::ClassReader;
use crate::error::ClassFileError;
use crate::jstring;
use crate::pool::{BootstrapMethod, ConstantPool, EntryKey, EntryValue, PoolEntry, PoolId};

/// A bootstrap method with its handle and arguments as pool indices.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BootstrapKey {
	handle: u16,
	arguments: Vec<u16>,
}

impl BootstrapKey {
	fn of(bootstrap: &BootstrapMethod) -> BootstrapKey {
		BootstrapKey {
			handle: bootstrap.handle.index(),
			arguments: bootstrap.arguments.iter().map(PoolEntry::index).collect(),
		}
	}
}

/// A constant pool that can be added to, deduplicating entries.
///
/// A builder created with [`PoolBuilder::with_parent`] starts out containing exactly the entries (and bootstrap
/// methods) of the parent, at the same indices. Entries of the parent can therefore be used without cloning, and
/// bytes referencing the parent pool can be copied as they are.
#[derive(Debug)]
pub struct PoolBuilder<'r> {
	id: PoolId,
	parent: Option<&'r ClassReader>,
	/// The first index not taken by the parent, `1` without a parent.
	parent_count: u16,
	/// The value written as `constant_pool_count`.
	///
	/// Incremented twice for [`EntryValue::Long`] and [`EntryValue::Double`].
	count: u16,

	/// The entries of the parent, keyed by their structure. Only filled once deduplication needs it.
	parent_map: Option<HashMap<EntryKey, PoolEntry>>,
	/// The entries added to this builder, in index order.
	own: IndexMap<EntryKey, PoolEntry>,
	/// From `index - parent_count` to the entry, with [`None`] for the upper halves of longs and doubles.
	by_index: Vec<Option<PoolEntry>>,

	/// For writing the bootstrap methods attribute. The parent's bootstrap methods are copied in on first need.
	bootstrap_methods: Vec<BootstrapMethod>,
	bootstrap_map: HashMap<BootstrapKey, u16>,
	bootstrap_inflated: bool,
}

impl Default for PoolBuilder<'_> {
	fn default() -> Self {
		PoolBuilder::new()
	}
}

impl<'r> PoolBuilder<'r> {
	/// Creates an empty pool. The first index given out is `1`.
	pub fn new() -> PoolBuilder<'r> {
		PoolBuilder {
			id: PoolId::next(),
			parent: None,
			parent_count: 1,
			count: 1,
			parent_map: None,
			own: IndexMap::new(),
			by_index: Vec::new(),
			bootstrap_methods: Vec::new(),
			bootstrap_map: HashMap::new(),
			bootstrap_inflated: true,
		}
	}

	/// Creates a pool extending the pool of `parent`.
	pub fn with_parent(parent: &'r ClassReader) -> PoolBuilder<'r> {
		let count = parent.entry_count();
		PoolBuilder {
			id: PoolId::next(),
			parent: Some(parent),
			parent_count: count,
			count,
			parent_map: None,
			own: IndexMap::new(),
			by_index: Vec::new(),
			bootstrap_methods: Vec::new(),
			bootstrap_map: HashMap::new(),
			bootstrap_inflated: false,
		}
	}

	pub fn parent(&self) -> Option<&'r ClassReader> {
		self.parent
	}

	/// Whether bytes containing indices into the pool `other` can be copied into a class using this pool.
	pub fn can_write_direct(&self, other: PoolId) -> bool {
		other == self.id || self.parent.is_some_and(|parent| parent.id() == other)
	}

	fn inflate_parent(&mut self) {
		if self.parent_map.is_some() {
			return;
		}
		let mut map = HashMap::new();
		if let Some(parent) = self.parent {
			trace!("inflating {} parent pool entries for deduplication", parent.entry_count() - 1);
			let mut index = 1;
			while index < self.parent_count {
				match parent.entry_by_index(index) {
					Ok(entry) => {
						index += entry.value().width();
						// a pool may contain duplicates, the first one wins
						map.entry(EntryKey::of(entry.value())).or_insert(entry);
					},
					Err(error) => {
						warn!("skipping parent constant pool entry {index} for deduplication: {error:#}");
						index += 1;
					},
				}
			}
		}
		self.parent_map = Some(map);
	}

	fn put(&mut self, value: EntryValue) -> Result<PoolEntry> {
		let key = EntryKey::of(&value);

		self.inflate_parent();
		if let Some(entry) = self.parent_map.as_ref().and_then(|map| map.get(&key)) {
			return Ok(entry.clone());
		}
		if let Some(entry) = self.own.get(&key) {
			return Ok(entry.clone());
		}

		let index = self.count;
		let width = value.width();
		self.count = self.count.checked_add(width)
			.ok_or(ClassFileError::IndexOverflow { what: "constant pool count", value: index as i64 + width as i64 })
			.with_context(|| anyhow!("pool count overflowed while adding pool entry {key:?} to pool at index {index}"))?;

		let entry = PoolEntry::new(self.id, index, value);
		self.by_index.push(Some(entry.clone()));
		if width == 2 {
			self.by_index.push(None);
		}
		self.own.insert(key, entry.clone());
		Ok(entry)
	}

	/// Makes `entry` usable in this pool.
	///
	/// Entries of this pool or its parent are returned as they are. Any other entry is deep cloned into this pool,
	/// reusing structurally equal entries.
	pub fn maybe_clone(&mut self, entry: &PoolEntry) -> Result<PoolEntry> {
		if self.can_write_direct(entry.pool()) {
			return Ok(entry.clone());
		}
		match entry.value() {
			EntryValue::Utf8(string) => self.utf8_entry(string),
			&EntryValue::Integer(value) => self.int_entry(value),
			&EntryValue::Float(value) => self.float_entry(value),
			&EntryValue::Long(value) => self.long_entry(value),
			&EntryValue::Double(value) => self.double_entry(value),
			EntryValue::Class { name } => self.class_entry(name),
			EntryValue::String { string } => self.string_entry(string),
			EntryValue::FieldRef { class, name_and_type } => self.field_ref_entry(class, name_and_type),
			EntryValue::MethodRef { class, name_and_type } => self.method_ref_entry(class, name_and_type),
			EntryValue::InterfaceMethodRef { class, name_and_type } => self.interface_method_ref_entry(class, name_and_type),
			EntryValue::NameAndType { name, descriptor } => self.name_and_type_entry(name, descriptor),
			&EntryValue::MethodHandle { reference_kind, ref reference } => self.method_handle_entry(reference_kind, reference),
			EntryValue::MethodType { descriptor } => self.method_type_entry(descriptor),
			EntryValue::Dynamic { bootstrap, name_and_type, .. } => self.constant_dynamic_entry(bootstrap, name_and_type),
			EntryValue::InvokeDynamic { bootstrap, name_and_type, .. } => self.invoke_dynamic_entry(bootstrap, name_and_type),
			EntryValue::Module { name } => self.module_entry(name),
			EntryValue::Package { name } => self.package_entry(name),
		}
			.with_context(|| anyhow!("failed to clone constant pool entry {entry:?} into another pool"))
	}

	fn clone_with_tag(&mut self, entry: &PoolEntry, tag: u8) -> Result<PoolEntry> {
		let entry = self.maybe_clone(entry)?;
		entry.expect_tag(tag)?;
		Ok(entry)
	}

	pub fn utf8_entry(&mut self, value: &JavaStr) -> Result<PoolEntry> {
		self.put(EntryValue::Utf8(value.to_owned()))
	}

	pub fn utf8(&mut self, value: &str) -> Result<PoolEntry> {
		self.utf8_entry(JavaStr::from_str(value))
	}

	pub fn int_entry(&mut self, value: i32) -> Result<PoolEntry> {
		self.put(EntryValue::Integer(value))
	}

	pub fn float_entry(&mut self, value: f32) -> Result<PoolEntry> {
		self.put(EntryValue::Float(value))
	}

	pub fn long_entry(&mut self, value: i64) -> Result<PoolEntry> {
		self.put(EntryValue::Long(value))
	}

	pub fn double_entry(&mut self, value: f64) -> Result<PoolEntry> {
		self.put(EntryValue::Double(value))
	}

	pub fn class_entry(&mut self, name: &PoolEntry) -> Result<PoolEntry> {
		let name = self.clone_with_tag(name, pool::UTF8)?;
		self.put(EntryValue::Class { name })
	}

	/// A `Class` entry for the given internal name.
	pub fn class(&mut self, name: &str) -> Result<PoolEntry> {
		let name = self.utf8(name)?;
		self.class_entry(&name)
	}

	pub fn string_entry(&mut self, string: &PoolEntry) -> Result<PoolEntry> {
		let string = self.clone_with_tag(string, pool::UTF8)?;
		self.put(EntryValue::String { string })
	}

	pub fn string(&mut self, value: &str) -> Result<PoolEntry> {
		let string = self.utf8(value)?;
		self.string_entry(&string)
	}

	pub fn name_and_type_entry(&mut self, name: &PoolEntry, descriptor: &PoolEntry) -> Result<PoolEntry> {
		let name = self.clone_with_tag(name, pool::UTF8)?;
		let descriptor = self.clone_with_tag(descriptor, pool::UTF8)?;
		self.put(EntryValue::NameAndType { name, descriptor })
	}

	pub fn name_and_type(&mut self, name: &str, descriptor: &str) -> Result<PoolEntry> {
		let name = self.utf8(name)?;
		let descriptor = self.utf8(descriptor)?;
		self.name_and_type_entry(&name, &descriptor)
	}

	fn member(&mut self, class: &PoolEntry, name_and_type: &PoolEntry) -> Result<(PoolEntry, PoolEntry)> {
		let class = self.clone_with_tag(class, pool::CLASS)?;
		let name_and_type = self.clone_with_tag(name_and_type, pool::NAME_AND_TYPE)?;
		Ok((class, name_and_type))
	}

	pub fn field_ref_entry(&mut self, class: &PoolEntry, name_and_type: &PoolEntry) -> Result<PoolEntry> {
		let (class, name_and_type) = self.member(class, name_and_type)?;
		self.put(EntryValue::FieldRef { class, name_and_type })
	}

	pub fn field_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<PoolEntry> {
		let class = self.class(owner)?;
		let name_and_type = self.name_and_type(name, descriptor)?;
		self.field_ref_entry(&class, &name_and_type)
	}

	pub fn method_ref_entry(&mut self, class: &PoolEntry, name_and_type: &PoolEntry) -> Result<PoolEntry> {
		let (class, name_and_type) = self.member(class, name_and_type)?;
		self.put(EntryValue::MethodRef { class, name_and_type })
	}

	pub fn method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<PoolEntry> {
		let class = self.class(owner)?;
		let name_and_type = self.name_and_type(name, descriptor)?;
		self.method_ref_entry(&class, &name_and_type)
	}

	pub fn interface_method_ref_entry(&mut self, class: &PoolEntry, name_and_type: &PoolEntry) -> Result<PoolEntry> {
		let (class, name_and_type) = self.member(class, name_and_type)?;
		self.put(EntryValue::InterfaceMethodRef { class, name_and_type })
	}

	pub fn interface_method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<PoolEntry> {
		let class = self.class(owner)?;
		let name_and_type = self.name_and_type(name, descriptor)?;
		self.interface_method_ref_entry(&class, &name_and_type)
	}

	pub fn method_handle_entry(&mut self, reference_kind: u8, reference: &PoolEntry) -> Result<PoolEntry> {
		use crate::class_constants::pool::method_handle_reference as kind;

		let expected = match reference_kind {
			kind::GET_FIELD..=kind::PUT_STATIC => &[pool::FIELD_REF][..],
			kind::INVOKE_VIRTUAL | kind::NEW_INVOKE_SPECIAL => &[pool::METHOD_REF][..],
			kind::INVOKE_STATIC | kind::INVOKE_SPECIAL => &[pool::METHOD_REF, pool::INTERFACE_METHOD_REF][..],
			kind::INVOKE_INTERFACE => &[pool::INTERFACE_METHOD_REF][..],
			_ => return Err(anyhow!("invalid method handle reference kind {reference_kind}")),
		};
		let reference = self.maybe_clone(reference)?;
		if !expected.contains(&reference.tag()) {
			reference.expect_tag(expected[0])?;
		}
		self.put(EntryValue::MethodHandle { reference_kind, reference })
	}

	pub fn method_type_entry(&mut self, descriptor: &PoolEntry) -> Result<PoolEntry> {
		let descriptor = self.clone_with_tag(descriptor, pool::UTF8)?;
		self.put(EntryValue::MethodType { descriptor })
	}

	pub fn constant_dynamic_entry(&mut self, bootstrap: &BootstrapMethod, name_and_type: &PoolEntry) -> Result<PoolEntry> {
		let bootstrap_method = self.bootstrap_method_entry_for(&bootstrap.handle, &bootstrap.arguments)?;
		let bootstrap = self.bootstrap_method_entry(bootstrap_method)?;
		let name_and_type = self.clone_with_tag(name_and_type, pool::NAME_AND_TYPE)?;
		self.put(EntryValue::Dynamic { bootstrap_method, bootstrap, name_and_type })
	}

	pub fn invoke_dynamic_entry(&mut self, bootstrap: &BootstrapMethod, name_and_type: &PoolEntry) -> Result<PoolEntry> {
		let bootstrap_method = self.bootstrap_method_entry_for(&bootstrap.handle, &bootstrap.arguments)?;
		let bootstrap = self.bootstrap_method_entry(bootstrap_method)?;
		let name_and_type = self.clone_with_tag(name_and_type, pool::NAME_AND_TYPE)?;
		self.put(EntryValue::InvokeDynamic { bootstrap_method, bootstrap, name_and_type })
	}

	pub fn module_entry(&mut self, name: &PoolEntry) -> Result<PoolEntry> {
		let name = self.clone_with_tag(name, pool::UTF8)?;
		self.put(EntryValue::Module { name })
	}

	pub fn package_entry(&mut self, name: &PoolEntry) -> Result<PoolEntry> {
		let name = self.clone_with_tag(name, pool::UTF8)?;
		self.put(EntryValue::Package { name })
	}

	fn inflate_bootstrap_methods(&mut self) -> Result<()> {
		if self.bootstrap_inflated {
			return Ok(());
		}
		if let Some(parent) = self.parent {
			for index in 0..parent.bootstrap_method_count() {
				let bootstrap = parent.bootstrap_method_entry(index)
					.with_context(|| anyhow!("failed to copy bootstrap method {index} of the parent pool"))?;
				// duplicates keep their position, so that indices stay compatible with the parent
				self.bootstrap_map.entry(BootstrapKey::of(&bootstrap)).or_insert(index);
				self.bootstrap_methods.push(bootstrap);
			}
		}
		self.bootstrap_inflated = true;
		Ok(())
	}

	/// Puts a bootstrap method into the `BootstrapMethods` attribute of this pool, deduplicating it.
	///
	/// Returns the index inside that attribute.
	pub fn bootstrap_method_entry_for(&mut self, handle: &PoolEntry, arguments: &[PoolEntry]) -> Result<u16> {
		self.inflate_bootstrap_methods()?;

		let handle = self.clone_with_tag(handle, pool::METHOD_HANDLE)?;
		let mut cloned = Vec::with_capacity(arguments.len());
		for argument in arguments {
			let argument = self.maybe_clone(argument)?;
			if !argument.is_loadable() {
				return Err(ClassFileError::WrongEntryKind {
					index: argument.index(),
					found: argument.value().kind_name(),
					expected: "a loadable entry",
				}.into());
			}
			cloned.push(argument);
		}
		let bootstrap = BootstrapMethod { handle, arguments: cloned };

		match self.bootstrap_map.entry(BootstrapKey::of(&bootstrap)) {
			Entry::Occupied(entry) => Ok(*entry.get()),
			Entry::Vacant(entry) => {
				let index = self.bootstrap_methods.len();
				let index = u16::try_from(index)
					.map_err(|_| ClassFileError::IndexOverflow { what: "bootstrap methods count", value: index as i64 })?;
				self.bootstrap_methods.push(bootstrap);
				entry.insert(index);
				Ok(index)
			},
		}
	}

	/// Writes the `constant_pool_count` and all entries.
	///
	/// The entries of the parent are copied as they are.
	pub fn write_to(&self, buf: &mut BufWriter) -> Result<()> {
		buf.write_u16(self.count);

		if let Some(parent) = self.parent {
			buf.write_bytes(parent.pool_bytes());
		}

		for entry in self.own.values() {
			buf.write_u8(entry.tag());
			match entry.value() {
				EntryValue::Utf8(string) => {
					let bytes = jstring::to_bytes(string);
					buf.write_usize_as_u16("utf8 length", bytes.len())
						.with_context(|| anyhow!("failed to write length of string {string:?}"))?;
					buf.write_bytes(&bytes);
				},
				&EntryValue::Integer(value) => buf.write_i32(value),
				&EntryValue::Float(value) => buf.write_u32(value.to_bits()),
				&EntryValue::Long(value) => buf.write_u64(value as u64),
				&EntryValue::Double(value) => buf.write_u64(value.to_bits()),
				EntryValue::Class { name: index } |
				EntryValue::String { string: index } |
				EntryValue::MethodType { descriptor: index } |
				EntryValue::Module { name: index } |
				EntryValue::Package { name: index } => buf.write_u16(index.index()),
				EntryValue::FieldRef { class, name_and_type } |
				EntryValue::MethodRef { class, name_and_type } |
				EntryValue::InterfaceMethodRef { class, name_and_type } => {
					buf.write_u16(class.index());
					buf.write_u16(name_and_type.index());
				},
				EntryValue::NameAndType { name, descriptor } => {
					buf.write_u16(name.index());
					buf.write_u16(descriptor.index());
				},
				EntryValue::MethodHandle { reference_kind, reference } => {
					buf.write_u8(*reference_kind);
					buf.write_u16(reference.index());
				},
				EntryValue::Dynamic { bootstrap_method, name_and_type, .. } |
				EntryValue::InvokeDynamic { bootstrap_method, name_and_type, .. } => {
					buf.write_u16(*bootstrap_method);
					buf.write_u16(name_and_type.index());
				},
			}
		}
		Ok(())
	}

	/// Writes the body of the `BootstrapMethods` attribute, if there are any bootstrap methods.
	pub(crate) fn write_bootstrap_methods(&mut self, buf: &mut BufWriter) -> Result<bool> {
		self.inflate_bootstrap_methods()?;
		if self.bootstrap_methods.is_empty() {
			return Ok(false);
		}
		buf.write_list("bootstrap methods count", &self.bootstrap_methods, |buf, bootstrap| {
			buf.write_u16(bootstrap.handle.index());
			buf.write_list("bootstrap arguments count", &bootstrap.arguments, |buf, argument| {
				buf.write_u16(argument.index());
				Ok(())
			})
		})?;
		Ok(true)
	}
}

impl ConstantPool for PoolBuilder<'_> {
	fn id(&self) -> PoolId {
		self.id
	}

	fn entry_by_index(&self, index: u16) -> Result<PoolEntry> {
		if index == 0 || index >= self.count {
			return Err(ClassFileError::InvalidIndex { index }.into());
		}
		if index < self.parent_count {
			if let Some(parent) = self.parent {
				return parent.entry_by_index(index);
			}
		}
		self.by_index.get((index - self.parent_count) as usize)
			.cloned()
			.flatten()
			.ok_or_else(|| ClassFileError::InvalidIndex { index }.into())
	}

	fn entry_count(&self) -> u16 {
		self.count
	}

	fn bootstrap_method_entry(&self, index: u16) -> Result<BootstrapMethod> {
		if !self.bootstrap_inflated {
			if let Some(parent) = self.parent {
				return parent.bootstrap_method_entry(index);
			}
		}
		self.bootstrap_methods.get(index as usize)
			.cloned()
			.with_context(|| anyhow!("no bootstrap method at index {index}, there are only {}", self.bootstrap_methods.len()))
	}

	fn bootstrap_method_count(&self) -> u16 {
		if !self.bootstrap_inflated {
			if let Some(parent) = self.parent {
				return parent.bootstrap_method_count();
			}
		}
		self.bootstrap_methods.len() as u16
	}
}

#[cfg(test)]
mod testing {
	use anyhow::{bail, Result};
	use pretty_assertions::assert_eq;
	use crate::error::ClassFileError;
	use crate::pool::{ConstantPool, EntryValue};
	use crate::pool::builder::PoolBuilder;

	#[test]
	fn deduplicates() -> Result<()> {
		let mut pool = PoolBuilder::new();

		let a = pool.utf8("hello")?;
		let b = pool.utf8("hello")?;
		assert_eq!(a.index(), 1);
		assert_eq!(a, b);
		assert_eq!(pool.entry_count(), 2);

		let c = pool.int_entry(13)?;
		let d = pool.int_entry(13)?;
		assert_eq!(c.index(), d.index());
		assert_eq!(pool.entry_count(), 3);

		let class = pool.class("java/lang/Object")?;
		assert_eq!(pool.entry_count(), 5);
		assert_eq!(pool.class("java/lang/Object")?.index(), class.index());
		assert_eq!(pool.entry_count(), 5);
		Ok(())
	}

	#[test]
	fn long_and_double_take_two_slots() -> Result<()> {
		let mut pool = PoolBuilder::new();
		let long = pool.long_entry(1)?;
		let double = pool.double_entry(1.0)?;
		let int = pool.int_entry(1)?;
		assert_eq!((long.index(), double.index(), int.index()), (1, 3, 5));
		assert_eq!(pool.entry_count(), 6);

		assert_eq!(pool.long_entry(1)?.index(), 1);
		assert_eq!(pool.entry_count(), 6);

		let error = pool.entry_by_index(2).unwrap_err();
		assert_eq!(ClassFileError::find(&error), Some(&ClassFileError::InvalidIndex { index: 2 }));
		assert!(pool.entry_by_index(0).is_err());
		assert!(pool.entry_by_index(6).is_err());
		assert_eq!(pool.entry_by_index(3)?, double);
		Ok(())
	}

	#[test]
	fn float_deduplication_is_bitwise() -> Result<()> {
		let mut pool = PoolBuilder::new();
		let nan = pool.float_entry(f32::NAN)?;
		assert_eq!(pool.float_entry(f32::NAN)?, nan);
		let zero = pool.float_entry(0.0)?;
		let negative_zero = pool.float_entry(-0.0)?;
		assert_ne!(zero, negative_zero);
		Ok(())
	}

	#[test]
	fn cross_pool_clone_reuses_index() -> Result<()> {
		let mut a = PoolBuilder::new();
		let method = a.method_ref("java/io/PrintStream", "println", "(I)V")?;

		let mut b = PoolBuilder::new();
		b.utf8("something else first")?;
		let first = b.maybe_clone(&method)?;
		let count = b.entry_count();
		let second = b.maybe_clone(&method)?;

		assert_eq!(first, second);
		assert_eq!(b.entry_count(), count);
		assert_ne!(first.pool(), method.pool());
		let (owner, name, descriptor) = first.as_member_ref()?;
		assert_eq!((owner.to_string(), name.to_string(), descriptor.to_string()), (
			"java/io/PrintStream".to_owned(), "println".to_owned(), "(I)V".to_owned(),
		));

		// cloning into the same pool is a no-op
		assert_eq!(a.maybe_clone(&method)?, method);
		Ok(())
	}

	#[test]
	fn wrong_constituent_kind() -> Result<()> {
		let mut pool = PoolBuilder::new();
		let int = pool.int_entry(3)?;
		let error = pool.class_entry(&int).unwrap_err();
		assert!(matches!(ClassFileError::find(&error), Some(ClassFileError::WrongEntryKind { expected: "Utf8", .. })));
		Ok(())
	}

	#[test]
	fn bootstrap_methods_deduplicate() -> Result<()> {
		let mut pool = PoolBuilder::new();
		let factory = pool.method_ref("java/lang/invoke/LambdaMetafactory", "metafactory", "()V")?;
		let handle = pool.method_handle_entry(6, &factory)?;
		let argument = pool.string("x")?;

		let first = pool.bootstrap_method_entry_for(&handle, &[argument.clone()])?;
		let second = pool.bootstrap_method_entry_for(&handle, &[argument.clone()])?;
		let third = pool.bootstrap_method_entry_for(&handle, &[])?;
		assert_eq!((first, second, third), (0, 0, 1));
		assert_eq!(pool.bootstrap_method_count(), 2);

		let bootstrap = pool.bootstrap_method_entry(0)?;
		let name_and_type = pool.name_and_type("run", "()Ljava/lang/Runnable;")?;
		let indy = pool.invoke_dynamic_entry(&bootstrap, &name_and_type)?;
		let EntryValue::InvokeDynamic { bootstrap_method, .. } = indy.value() else {
			bail!("not an invokedynamic entry: {indy:?}");
		};
		assert_eq!(*bootstrap_method, 0);

		// an invokedynamic cloned into another pool brings its bootstrap method along
		let mut other = PoolBuilder::new();
		let cloned = other.maybe_clone(&indy)?;
		assert_eq!(other.bootstrap_method_count(), 1);
		assert_eq!(cloned.member_descriptor()?.to_string(), "()Ljava/lang/Runnable;");
		Ok(())
	}

	#[test]
	fn pool_overflow() -> Result<()> {
		let mut pool = PoolBuilder::new();
		for i in 0..65534 {
			pool.int_entry(i)?;
		}
		assert_eq!(pool.entry_count(), 65535);
		let error = pool.int_entry(-1).unwrap_err();
		assert!(matches!(ClassFileError::find(&error), Some(ClassFileError::IndexOverflow { .. })));
		// existing entries are still found
		assert_eq!(pool.int_entry(7)?.index(), 8);
		Ok(())
	}
}
