//! A positional view over the bytes of a class file.
//!
//! [`ClassReader::new`] walks the whole structure once, validating all counts and lengths, and remembers where the
//! constant pool entries, the fields, the methods and the attributes are. Everything else is read on demand from
//! these positions. Constant pool entries are resolved on first use and cached.
use std::fmt::{Debug, Formatter};
use std::sync::OnceLock;
use anyhow::{anyhow, Context, Result};
use log::debug;
use crate::class_constants::{access, attribute, pool, MAGIC};
use crate::error::ClassFileError;
use crate::jstring;
use crate::options::ParseOptions;
use crate::pool::{BootstrapMethod, ConstantPool, EntryValue, PoolEntry, PoolId};

pub(crate) mod labels;

/// Constant pool entries referencing each other can't be nested deeper than this.
const MAX_RESOLVE_DEPTH: u8 = 16;

fn truncated(bytes: &[u8], pos: usize, n: usize) -> ClassFileError {
	ClassFileError::malformed(pos, format!("unexpected end of class file: can't read {n} bytes, only {} bytes present", bytes.len()))
}

fn read_array<const N: usize>(bytes: &[u8], pos: usize) -> Result<[u8; N], ClassFileError> {
	pos.checked_add(N)
		.and_then(|end| bytes.get(pos..end))
		.and_then(|slice| <[u8; N]>::try_from(slice).ok())
		.ok_or_else(|| truncated(bytes, pos, N))
}

fn read_u16_at(bytes: &[u8], pos: usize) -> Result<u16, ClassFileError> {
	read_array(bytes, pos).map(u16::from_be_bytes)
}

fn read_u32_at(bytes: &[u8], pos: usize) -> Result<u32, ClassFileError> {
	read_array(bytes, pos).map(u32::from_be_bytes)
}

/// Checks that `n` bytes starting at `pos` are present, and returns the position after them.
fn advance(bytes: &[u8], pos: usize, n: usize) -> Result<usize, ClassFileError> {
	pos.checked_add(n)
		.filter(|&end| end <= bytes.len())
		.ok_or_else(|| truncated(bytes, pos, n))
}

/// Skips the `attributes_count` and `attributes` items starting at `pos`.
fn skip_attributes(bytes: &[u8], pos: usize) -> Result<usize, ClassFileError> {
	let attributes_count = read_u16_at(bytes, pos)?;
	let mut pos = pos + 2;
	for _ in 0..attributes_count {
		let attribute_length = read_u32_at(bytes, pos + 2)?;
		pos = advance(bytes, pos + 6, attribute_length as usize)?;
	}
	Ok(pos)
}

/// Where a field or method is located.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MemberSpan {
	/// The position of the `access_flags` item.
	pub(crate) start: usize,
	/// The position of the `attributes_count` item.
	pub(crate) attributes_pos: usize,
	/// The position after the last attribute.
	pub(crate) end: usize,
}

/// An attribute inside of an attribute holder.
#[derive(Debug, Clone)]
pub(crate) struct AttributeSpan {
	pub(crate) name: PoolEntry,
	/// The position of the `attribute_name_index` item.
	pub(crate) start: usize,
	/// The position of the first byte of the attribute body.
	pub(crate) pos: usize,
	pub(crate) len: usize,
}

impl AttributeSpan {
	pub(crate) fn end(&self) -> usize {
		self.pos + self.len
	}

	pub(crate) fn is(&self, name: &str) -> bool {
		self.name.as_utf8().is_ok_and(|found| found == name)
	}
}

/// The bytes of a class file, together with the positions of all its structures.
///
/// The reader is also the constant pool of the class file. [`PoolEntry`]s handed out by it carry its [`PoolId`].
pub struct ClassReader {
	id: PoolId,
	bytes: Vec<u8>,
	options: ParseOptions,

	minor_version: u16,
	major_version: u16,

	/// From pool index to the position of the `tag` of the entry, `0` for invalid indices.
	pool_offsets: Vec<u32>,
	entries: Vec<OnceLock<PoolEntry>>,
	/// The position of the `access_flags` item.
	pool_end: usize,

	access_flags: u16,
	interfaces_pos: usize,
	fields: Vec<MemberSpan>,
	methods: Vec<MemberSpan>,
	attributes_pos: usize,

	/// Position and length of the body of the `BootstrapMethods` attribute.
	bootstrap_methods: Option<(usize, usize)>,
	bootstrap_offsets: OnceLock<Result<Vec<u32>, ClassFileError>>,
}

impl Debug for ClassReader {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ClassReader")
			.field("id", &self.id)
			.field("length", &self.bytes.len())
			.field("version", &(self.major_version, self.minor_version))
			.field("pool_count", &self.pool_offsets.len())
			.field("fields", &self.fields.len())
			.field("methods", &self.methods.len())
			.finish()
	}
}

impl ClassReader {
	/// Validates the structure of the class file in `bytes`.
	///
	/// Fails with [`ClassFileError::Malformed`] if any count or length would read past the end of the bytes, if there
	/// are bytes after the class file, or if a constant pool tag is invalid.
	pub fn new(bytes: Vec<u8>, options: ParseOptions) -> Result<ClassReader> {
		let magic = read_u32_at(&bytes, 0)?;
		if magic != MAGIC {
			return Err(ClassFileError::malformed(0, format!("wrong magic: got {magic:#x}, expected 0xCAFEBABE")).into());
		}
		let minor_version = read_u16_at(&bytes, 4)?;
		let major_version = read_u16_at(&bytes, 6)?;

		let pool_count = read_u16_at(&bytes, 8)?;
		if pool_count == 0 {
			return Err(ClassFileError::malformed(8, "`constant_pool_count` must be at least 1").into());
		}
		let mut pool_offsets = vec![0; pool_count as usize];
		let mut pos = 10;
		let mut index = 1;
		while index < pool_count as usize {
			pool_offsets[index] = pos as u32;
			let (size, width) = match bytes.get(pos).copied().ok_or_else(|| truncated(&bytes, pos, 1))? {
				pool::UTF8 => (3 + read_u16_at(&bytes, pos + 1)? as usize, 1),
				pool::INTEGER | pool::FLOAT => (5, 1),
				pool::LONG | pool::DOUBLE => (9, 2),
				pool::CLASS | pool::STRING | pool::METHOD_TYPE | pool::MODULE | pool::PACKAGE => (3, 1),
				pool::FIELD_REF | pool::METHOD_REF | pool::INTERFACE_METHOD_REF | pool::NAME_AND_TYPE |
				pool::DYNAMIC | pool::INVOKE_DYNAMIC => (5, 1),
				pool::METHOD_HANDLE => (4, 1),
				tag => {
					return Err(ClassFileError::malformed(pos, format!("invalid constant pool tag {tag} for entry {index}")).into());
				},
			};
			pos = advance(&bytes, pos, size)?;
			index += width;
		}
		let pool_end = pos;

		let access_flags = read_u16_at(&bytes, pool_end)?;
		let interfaces_pos = pool_end + 6;
		let interfaces_count = read_u16_at(&bytes, interfaces_pos)?;
		let mut pos = advance(&bytes, interfaces_pos + 2, interfaces_count as usize * 2)?;

		let read_members = |pos: &mut usize| -> Result<Vec<MemberSpan>, ClassFileError> {
			let count = read_u16_at(&bytes, *pos)?;
			*pos += 2;
			let mut members = Vec::with_capacity(count as usize);
			for _ in 0..count {
				let start = *pos;
				let attributes_pos = advance(&bytes, start, 6)?;
				let end = skip_attributes(&bytes, attributes_pos)?;
				members.push(MemberSpan { start, attributes_pos, end });
				*pos = end;
			}
			Ok(members)
		};
		let fields = read_members(&mut pos)?;
		let methods = read_members(&mut pos)?;

		let attributes_pos = pos;
		let end = skip_attributes(&bytes, attributes_pos)?;
		if end != bytes.len() {
			return Err(ClassFileError::malformed(end, format!("{} extra bytes after the end of the class file", bytes.len() - end)).into());
		}

		let entries = (0..pool_count).map(|_| OnceLock::new()).collect();

		let mut reader = ClassReader {
			id: PoolId::next(),
			bytes,
			options,
			minor_version,
			major_version,
			pool_offsets,
			entries,
			pool_end,
			access_flags,
			interfaces_pos,
			fields,
			methods,
			attributes_pos,
			bootstrap_methods: None,
			bootstrap_offsets: OnceLock::new(),
		};
		reader.bootstrap_methods = reader.find_bootstrap_methods()?;

		debug!(
			"read class file version {major_version}.{minor_version} with {} pool slots, {} fields and {} methods",
			pool_count, reader.fields.len(), reader.methods.len()
		);

		Ok(reader)
	}

	/// Locates the `BootstrapMethods` attribute by comparing the raw bytes of the attribute names.
	fn find_bootstrap_methods(&self) -> Result<Option<(usize, usize)>> {
		let count = self.read_u16(self.attributes_pos)?;
		let mut pos = self.attributes_pos + 2;
		for _ in 0..count {
			let name_index = self.read_u16(pos)?;
			let len = self.read_u32(pos + 2)? as usize;
			if self.raw_utf8(name_index) == Some(attribute::BOOTSTRAP_METHODS.as_bytes()) {
				return Ok(Some((pos + 6, len)));
			}
			pos += 6 + len;
		}
		Ok(None)
	}

	fn raw_utf8(&self, index: u16) -> Option<&[u8]> {
		let pos = *self.pool_offsets.get(index as usize).filter(|&&offset| offset != 0)? as usize;
		if self.bytes[pos] != pool::UTF8 {
			return None;
		}
		let len = read_u16_at(&self.bytes, pos + 1).ok()? as usize;
		self.bytes.get(pos + 3..pos + 3 + len)
	}

	pub fn options(&self) -> &ParseOptions {
		&self.options
	}

	pub fn bytes(&self) -> &[u8] {
		&self.bytes
	}

	pub fn minor_version(&self) -> u16 {
		self.minor_version
	}

	pub fn major_version(&self) -> u16 {
		self.major_version
	}

	pub fn access_flags(&self) -> u16 {
		self.access_flags
	}

	pub fn is_module_info(&self) -> bool {
		self.access_flags & access::MODULE != 0
	}

	pub fn this_class(&self) -> Result<PoolEntry> {
		self.read_class_entry(self.pool_end + 2)
			.with_context(|| anyhow!("failed to read `this_class`"))
	}

	/// The super class, [`None`] for `java/lang/Object` and `module-info`.
	pub fn super_class(&self) -> Result<Option<PoolEntry>> {
		let entry = self.read_entry_or_none(self.pool_end + 4)?;
		if let Some(entry) = &entry {
			entry.expect_tag(pool::CLASS)
				.with_context(|| anyhow!("failed to read `super_class`"))?;
		}
		Ok(entry)
	}

	pub fn interfaces(&self) -> Result<Vec<PoolEntry>> {
		let count = self.read_u16(self.interfaces_pos)?;
		(0..count as usize)
			.map(|i| self.read_class_entry(self.interfaces_pos + 2 + 2 * i))
			.collect::<Result<_>>()
			.with_context(|| anyhow!("failed to read interfaces"))
	}

	pub(crate) fn fields(&self) -> &[MemberSpan] {
		&self.fields
	}

	pub(crate) fn methods(&self) -> &[MemberSpan] {
		&self.methods
	}

	pub(crate) fn attributes_pos(&self) -> usize {
		self.attributes_pos
	}

	/// The raw bytes of all the constant pool entries, without the `constant_pool_count`.
	pub(crate) fn pool_bytes(&self) -> &[u8] {
		&self.bytes[10..self.pool_end]
	}

	fn read_n<const N: usize>(&self, pos: usize) -> Result<[u8; N]> {
		Ok(read_array(&self.bytes, pos)?)
	}

	pub fn read_u8(&self, pos: usize) -> Result<u8> {
		Ok(u8::from_be_bytes(self.read_n(pos)?))
	}
	pub fn read_u16(&self, pos: usize) -> Result<u16> {
		Ok(u16::from_be_bytes(self.read_n(pos)?))
	}
	pub fn read_u32(&self, pos: usize) -> Result<u32> {
		Ok(u32::from_be_bytes(self.read_n(pos)?))
	}
	pub fn read_i8(&self, pos: usize) -> Result<i8> {
		Ok(i8::from_be_bytes(self.read_n(pos)?))
	}
	pub fn read_i16(&self, pos: usize) -> Result<i16> {
		Ok(i16::from_be_bytes(self.read_n(pos)?))
	}
	pub fn read_i32(&self, pos: usize) -> Result<i32> {
		Ok(i32::from_be_bytes(self.read_n(pos)?))
	}

	pub fn read_bytes(&self, pos: usize, len: usize) -> Result<&[u8]> {
		let end = advance(&self.bytes, pos, len)?;
		Ok(&self.bytes[pos..end])
	}

	/// Reads the pool index at `pos` and gets the entry for it.
	pub fn read_entry(&self, pos: usize) -> Result<PoolEntry> {
		self.entry_by_index(self.read_u16(pos)?)
	}

	pub fn read_entry_or_none(&self, pos: usize) -> Result<Option<PoolEntry>> {
		self.entry_by_index_or_none(self.read_u16(pos)?)
	}

	pub fn read_class_entry(&self, pos: usize) -> Result<PoolEntry> {
		let entry = self.read_entry(pos)?;
		entry.expect_tag(pool::CLASS)?;
		Ok(entry)
	}

	pub fn read_utf8_entry(&self, pos: usize) -> Result<PoolEntry> {
		let entry = self.read_entry(pos)?;
		entry.expect_tag(pool::UTF8)?;
		Ok(entry)
	}

	/// Skips an `attributes_count` item and the attributes following it, returning the position after them.
	pub fn skip_attribute_holder(&self, pos: usize) -> Result<usize> {
		Ok(skip_attributes(&self.bytes, pos)?)
	}

	/// Lists the attributes of the attribute holder with the `attributes_count` item at `pos`.
	pub(crate) fn attributes(&self, pos: usize) -> Result<Vec<AttributeSpan>> {
		let count = self.read_u16(pos)?;
		let mut pos = pos + 2;
		let mut attributes = Vec::with_capacity(count as usize);
		for _ in 0..count {
			let name = self.read_utf8_entry(pos)
				.with_context(|| anyhow!("failed to read attribute name at position {pos}"))?;
			let len = self.read_u32(pos + 2)? as usize;
			attributes.push(AttributeSpan { name, start: pos, pos: pos + 6, len });
			pos = advance(&self.bytes, pos + 6, len)?;
		}
		Ok(attributes)
	}

	fn constituent(&self, pos: usize, tag: u8, depth: u8) -> Result<PoolEntry> {
		let entry = self.resolve(self.read_u16(pos)?, depth + 1)?;
		entry.expect_tag(tag)?;
		Ok(entry)
	}

	fn resolve(&self, index: u16, depth: u8) -> Result<PoolEntry> {
		let offset = self.pool_offsets.get(index as usize)
			.copied()
			.filter(|&offset| offset != 0)
			.ok_or(ClassFileError::InvalidIndex { index })?;
		let cell = &self.entries[index as usize];
		if let Some(entry) = cell.get() {
			return Ok(entry.clone());
		}
		if depth > MAX_RESOLVE_DEPTH {
			return Err(ClassFileError::malformed(offset as usize, format!("constant pool entry {index} nests too deeply")).into());
		}

		let pos = offset as usize;
		let value = match self.read_u8(pos)? {
			pool::UTF8 => {
				let len = self.read_u16(pos + 1)? as usize;
				EntryValue::Utf8(jstring::from_bytes(self.read_bytes(pos + 3, len)?)?)
			},
			pool::INTEGER => EntryValue::Integer(self.read_i32(pos + 1)?),
			pool::FLOAT => EntryValue::Float(f32::from_bits(self.read_u32(pos + 1)?)),
			pool::LONG => EntryValue::Long(i64::from_be_bytes(self.read_n(pos + 1)?)),
			pool::DOUBLE => EntryValue::Double(f64::from_bits(u64::from_be_bytes(self.read_n(pos + 1)?))),
			pool::CLASS => EntryValue::Class { name: self.constituent(pos + 1, pool::UTF8, depth)? },
			pool::STRING => EntryValue::String { string: self.constituent(pos + 1, pool::UTF8, depth)? },
			pool::FIELD_REF => EntryValue::FieldRef {
				class: self.constituent(pos + 1, pool::CLASS, depth)?,
				name_and_type: self.constituent(pos + 3, pool::NAME_AND_TYPE, depth)?,
			},
			pool::METHOD_REF => EntryValue::MethodRef {
				class: self.constituent(pos + 1, pool::CLASS, depth)?,
				name_and_type: self.constituent(pos + 3, pool::NAME_AND_TYPE, depth)?,
			},
			pool::INTERFACE_METHOD_REF => EntryValue::InterfaceMethodRef {
				class: self.constituent(pos + 1, pool::CLASS, depth)?,
				name_and_type: self.constituent(pos + 3, pool::NAME_AND_TYPE, depth)?,
			},
			pool::NAME_AND_TYPE => EntryValue::NameAndType {
				name: self.constituent(pos + 1, pool::UTF8, depth)?,
				descriptor: self.constituent(pos + 3, pool::UTF8, depth)?,
			},
			pool::METHOD_HANDLE => {
				let reference_kind = self.read_u8(pos + 1)?;
				let reference = self.resolve(self.read_u16(pos + 2)?, depth + 1)?;
				if !(1..=9).contains(&reference_kind) ||
					!matches!(reference.tag(), pool::FIELD_REF | pool::METHOD_REF | pool::INTERFACE_METHOD_REF) {
					return Err(ClassFileError::malformed(pos, format!(
						"invalid method handle: reference kind {reference_kind} with {reference:?}"
					)).into());
				}
				EntryValue::MethodHandle { reference_kind, reference }
			},
			pool::METHOD_TYPE => EntryValue::MethodType { descriptor: self.constituent(pos + 1, pool::UTF8, depth)? },
			tag @ (pool::DYNAMIC | pool::INVOKE_DYNAMIC) => {
				let bootstrap_method = self.read_u16(pos + 1)?;
				let bootstrap = self.bootstrap_method(bootstrap_method, depth + 1)
					.with_context(|| anyhow!("failed to resolve bootstrap method of constant pool entry {index}"))?;
				let name_and_type = self.constituent(pos + 3, pool::NAME_AND_TYPE, depth)?;
				if tag == pool::DYNAMIC {
					EntryValue::Dynamic { bootstrap_method, bootstrap, name_and_type }
				} else {
					EntryValue::InvokeDynamic { bootstrap_method, bootstrap, name_and_type }
				}
			},
			pool::MODULE => EntryValue::Module { name: self.constituent(pos + 1, pool::UTF8, depth)? },
			pool::PACKAGE => EntryValue::Package { name: self.constituent(pos + 1, pool::UTF8, depth)? },
			tag => return Err(ClassFileError::malformed(pos, format!("invalid constant pool tag {tag}")).into()),
		};

		let entry = PoolEntry::new(self.id, index, value);
		Ok(cell.get_or_init(|| entry).clone())
	}

	fn compute_bootstrap_offsets(&self) -> Result<Vec<u32>, ClassFileError> {
		let Some((pos, len)) = self.bootstrap_methods else {
			return Ok(Vec::new());
		};
		let end = pos + len;
		let count = read_u16_at(&self.bytes, pos)?;
		let mut offsets = Vec::with_capacity(count as usize);
		let mut pos = pos + 2;
		for _ in 0..count {
			offsets.push(pos as u32);
			let arguments_count = read_u16_at(&self.bytes, pos + 2)?;
			pos += 4 + 2 * arguments_count as usize;
			if pos > end {
				return Err(ClassFileError::malformed(pos, "bootstrap method reaches past the end of the `BootstrapMethods` attribute"));
			}
		}
		Ok(offsets)
	}

	fn bootstrap_offsets(&self) -> Result<&[u32]> {
		self.bootstrap_offsets.get_or_init(|| self.compute_bootstrap_offsets())
			.as_deref()
			.map_err(|error| error.clone().into())
	}

	fn bootstrap_method(&self, index: u16, depth: u8) -> Result<BootstrapMethod> {
		let offsets = self.bootstrap_offsets()?;
		let pos = *offsets.get(index as usize)
			.with_context(|| anyhow!("no bootstrap method at index {index}, there are only {}", offsets.len()))? as usize;

		let handle = self.constituent(pos, pool::METHOD_HANDLE, depth)?;
		let arguments_count = self.read_u16(pos + 2)?;
		let arguments = (0..arguments_count as usize)
			.map(|i| self.resolve(self.read_u16(pos + 4 + 2 * i)?, depth + 1))
			.collect::<Result<_>>()?;
		Ok(BootstrapMethod { handle, arguments })
	}
}

impl ConstantPool for ClassReader {
	fn id(&self) -> PoolId {
		self.id
	}

	fn entry_by_index(&self, index: u16) -> Result<PoolEntry> {
		self.resolve(index, 0)
	}

	fn entry_count(&self) -> u16 {
		self.pool_offsets.len() as u16
	}

	fn bootstrap_method_entry(&self, index: u16) -> Result<BootstrapMethod> {
		self.bootstrap_method(index, 0)
	}

	fn bootstrap_method_count(&self) -> u16 {
		self.bootstrap_offsets().map_or(0, |offsets| offsets.len() as u16)
	}
}

/// Reads through the body of an attribute, never reading past its end.
#[derive(Debug, Clone)]
pub(crate) struct Cursor<'r> {
	reader: &'r ClassReader,
	pos: usize,
	limit: usize,
}

impl<'r> Cursor<'r> {
	pub(crate) fn new(reader: &'r ClassReader, pos: usize, len: usize) -> Cursor<'r> {
		Cursor { reader, pos, limit: pos + len }
	}

	pub(crate) fn pos(&self) -> usize {
		self.pos
	}

	pub(crate) fn remaining(&self) -> usize {
		self.limit.saturating_sub(self.pos)
	}

	fn take(&mut self, n: usize) -> Result<usize> {
		let pos = self.pos;
		if n > self.remaining() {
			return Err(ClassFileError::malformed(pos, format!("can't read {n} bytes, the attribute ends at {}", self.limit)).into());
		}
		self.pos += n;
		Ok(pos)
	}

	pub(crate) fn skip(&mut self, n: usize) -> Result<()> {
		self.take(n).map(|_| ())
	}

	pub(crate) fn read_u8(&mut self) -> Result<u8> {
		let pos = self.take(1)?;
		self.reader.read_u8(pos)
	}
	pub(crate) fn read_u16(&mut self) -> Result<u16> {
		let pos = self.take(2)?;
		self.reader.read_u16(pos)
	}
	pub(crate) fn read_u32(&mut self) -> Result<u32> {
		let pos = self.take(4)?;
		self.reader.read_u32(pos)
	}
	pub(crate) fn read_u16_as_usize(&mut self) -> Result<usize> {
		Ok(self.read_u16()? as usize)
	}

	pub(crate) fn read_bytes(&mut self, n: usize) -> Result<&'r [u8]> {
		let pos = self.take(n)?;
		self.reader.read_bytes(pos, n)
	}

	pub(crate) fn read_entry(&mut self) -> Result<PoolEntry> {
		let pos = self.take(2)?;
		self.reader.read_entry(pos)
	}

	pub(crate) fn read_entry_or_none(&mut self) -> Result<Option<PoolEntry>> {
		let pos = self.take(2)?;
		self.reader.read_entry_or_none(pos)
	}

	pub(crate) fn read_class_entry(&mut self) -> Result<PoolEntry> {
		let pos = self.take(2)?;
		self.reader.read_class_entry(pos)
	}

	pub(crate) fn read_utf8_entry(&mut self) -> Result<PoolEntry> {
		let pos = self.take(2)?;
		self.reader.read_utf8_entry(pos)
	}

	pub(crate) fn read_vec<T, S, E>(&mut self, get_size: S, mut get_element: E) -> Result<Vec<T>>
		where
			S: FnOnce(&mut Self) -> Result<usize>,
			E: FnMut(&mut Self) -> Result<T>
	{
		let size = get_size(self)?;
		let mut vec = Vec::with_capacity(size.min(self.remaining()));
		for _ in 0..size {
			vec.push(get_element(self)?);
		}
		Ok(vec)
	}
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use crate::buf_writer::BufWriter;
	use crate::class_constants::pool;
	use crate::class_reader::ClassReader;
	use crate::error::ClassFileError;
	use crate::options::ParseOptions;
	use crate::pool::{ConstantPool, EntryValue};

	/// `class A extends java/lang/Object`, with a long in the pool and one empty field.
	fn small_class() -> Vec<u8> {
		let mut buf = BufWriter::new();
		buf.write_u32(0xCAFE_BABE);
		buf.write_u16(0);
		buf.write_u16(52);
		buf.write_u16(9);
		buf.write_u8(pool::UTF8); // 1
		buf.write_u16(1);
		buf.write_bytes(b"A");
		buf.write_u8(pool::CLASS); // 2
		buf.write_u16(1);
		buf.write_u8(pool::UTF8); // 3
		buf.write_u16(16);
		buf.write_bytes(b"java/lang/Object");
		buf.write_u8(pool::CLASS); // 4
		buf.write_u16(3);
		buf.write_u8(pool::LONG); // 5 and 6
		buf.write_u64(0x1_0000_0002);
		buf.write_u8(pool::UTF8); // 7
		buf.write_u16(1);
		buf.write_bytes(b"f");
		buf.write_u8(pool::UTF8); // 8
		buf.write_u16(1);
		buf.write_bytes(b"I");
		buf.write_u16(0x0021);
		buf.write_u16(2);
		buf.write_u16(4);
		buf.write_u16(0); // interfaces
		buf.write_u16(1); // fields
		buf.write_u16(0x0002);
		buf.write_u16(7);
		buf.write_u16(8);
		buf.write_u16(0);
		buf.write_u16(0); // methods
		buf.write_u16(0); // attributes
		buf.into_bytes()
	}

	#[test]
	fn read_structure() -> Result<()> {
		let reader = ClassReader::new(small_class(), ParseOptions::default())?;
		assert_eq!(reader.major_version(), 52);
		assert_eq!(reader.entry_count(), 9);
		assert_eq!(reader.this_class()?.as_class_name()?, "A");
		assert_eq!(reader.super_class()?.map(|class| class.index()), Some(4));
		assert_eq!(reader.fields().len(), 1);
		assert_eq!(reader.methods().len(), 0);
		assert!(reader.interfaces()?.is_empty());
		assert!(matches!(reader.entry_by_index(5)?.value(), EntryValue::Long(0x1_0000_0002)));
		assert_eq!(reader.bootstrap_method_count(), 0);
		Ok(())
	}

	#[test]
	fn entries_are_cached() -> Result<()> {
		let reader = ClassReader::new(small_class(), ParseOptions::default())?;
		let a = reader.entry_by_index(2)?;
		let b = reader.entry_by_index(2)?;
		assert_eq!(a, b);
		assert!(std::ptr::eq(a.value(), b.value()));
		Ok(())
	}

	#[test]
	fn invalid_indices() -> Result<()> {
		let reader = ClassReader::new(small_class(), ParseOptions::default())?;
		for index in [0, 6, 9, 200] {
			let error = reader.entry_by_index(index).unwrap_err();
			assert_eq!(ClassFileError::find(&error), Some(&ClassFileError::InvalidIndex { index }));
		}
		Ok(())
	}

	#[test]
	fn wrong_magic() {
		let mut bytes = small_class();
		bytes[0] = 0xBE;
		let error = ClassReader::new(bytes, ParseOptions::default()).unwrap_err();
		assert!(matches!(ClassFileError::find(&error), Some(ClassFileError::Malformed { pos: 0, .. })));
	}

	#[test]
	fn every_truncation_is_malformed() {
		let bytes = small_class();
		for len in 0..bytes.len() {
			let error = ClassReader::new(bytes[..len].to_vec(), ParseOptions::default()).unwrap_err();
			assert!(
				matches!(ClassFileError::find(&error), Some(ClassFileError::Malformed { .. })),
				"truncation to {len} bytes gave {error:?}"
			);
		}
	}

	#[test]
	fn bad_pool_tag() {
		let mut bytes = small_class();
		bytes[10] = 2;
		let error = ClassReader::new(bytes, ParseOptions::default()).unwrap_err();
		assert!(matches!(ClassFileError::find(&error), Some(ClassFileError::Malformed { pos: 10, .. })));
	}

	#[test]
	fn trailing_bytes() {
		let mut bytes = small_class();
		bytes.push(0);
		assert!(ClassReader::new(bytes, ParseOptions::default()).is_err());
	}
}
