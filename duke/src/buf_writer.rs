//! A growable byte sink with support for patching already written bytes.
use anyhow::{anyhow, Context, Result};
use crate::error::ClassFileError;
use crate::pool::PoolEntry;
use crate::pool::builder::PoolBuilder;

const INITIAL_CAPACITY: usize = 64;

/// An append-only byte buffer, writing everything in big endian.
///
/// Lengths and offsets that are only known after the fact can be filled in later with [`BufWriter::patch_int`].
#[derive(Debug, Clone, Default)]
pub struct BufWriter {
	bytes: Vec<u8>,
}

impl BufWriter {
	pub fn new() -> BufWriter {
		BufWriter { bytes: Vec::with_capacity(INITIAL_CAPACITY) }
	}

	pub fn with_capacity(capacity: usize) -> BufWriter {
		BufWriter { bytes: Vec::with_capacity(capacity.max(INITIAL_CAPACITY)) }
	}

	pub fn len(&self) -> usize {
		self.bytes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.bytes.is_empty()
	}

	pub fn as_slice(&self) -> &[u8] {
		&self.bytes
	}

	pub fn into_bytes(self) -> Vec<u8> {
		self.bytes
	}

	/// Ensures the next `n` bytes can be written without a reallocation.
	///
	/// The capacity is doubled until it's large enough.
	pub fn reserve(&mut self, n: usize) {
		let needed = self.bytes.len() + n;
		let mut capacity = self.bytes.capacity().max(INITIAL_CAPACITY);
		if needed <= self.bytes.capacity() {
			return;
		}
		while capacity < needed {
			capacity *= 2;
		}
		self.bytes.reserve_exact(capacity - self.bytes.len());
	}

	pub fn write_u8(&mut self, value: u8) {
		self.write_bytes(&[value]);
	}
	pub fn write_u16(&mut self, value: u16) {
		self.write_bytes(&value.to_be_bytes());
	}
	pub fn write_u32(&mut self, value: u32) {
		self.write_bytes(&value.to_be_bytes());
	}
	pub fn write_u64(&mut self, value: u64) {
		self.write_bytes(&value.to_be_bytes());
	}
	pub fn write_i8(&mut self, value: i8) {
		self.write_bytes(&value.to_be_bytes());
	}
	pub fn write_i16(&mut self, value: i16) {
		self.write_bytes(&value.to_be_bytes());
	}
	pub fn write_i32(&mut self, value: i32) {
		self.write_bytes(&value.to_be_bytes());
	}

	pub fn write_bytes(&mut self, bytes: &[u8]) {
		self.reserve(bytes.len());
		self.bytes.extend_from_slice(bytes);
	}

	pub fn write_usize_as_u16(&mut self, what: &'static str, value: usize) -> Result<()> {
		let value = u16::try_from(value)
			.map_err(|_| ClassFileError::IndexOverflow { what, value: value as i64 })
			.with_context(|| anyhow!("failed to convert {value} to u16 for writing: value too large"))?;
		self.write_u16(value);
		Ok(())
	}

	pub fn write_usize_as_u32(&mut self, what: &'static str, value: usize) -> Result<()> {
		let value = u32::try_from(value)
			.map_err(|_| ClassFileError::IndexOverflow { what, value: value as i64 })
			.with_context(|| anyhow!("failed to convert {value} to u32 for writing: value too large"))?;
		self.write_u32(value);
		Ok(())
	}

	/// Overwrites `width` bytes at `offset` with the big endian encoding of `value`, truncated to that width.
	pub fn patch_int(&mut self, offset: usize, width: usize, value: i64) -> Result<()> {
		if !matches!(width, 1 | 2 | 4) {
			return Err(anyhow!("can only patch 1, 2 or 4 bytes, got width {width}"));
		}
		let end = offset.checked_add(width)
			.filter(|&end| end <= self.bytes.len())
			.ok_or_else(|| anyhow!("can't patch {width} bytes at offset {offset}: only {} bytes written", self.bytes.len()))?;

		let encoded = (value as u32).to_be_bytes();
		self.bytes[offset..end].copy_from_slice(&encoded[4 - width..]);
		Ok(())
	}

	/// Writes the index of `entry` in `pool`, cloning the entry into the pool first if it comes from a different one.
	///
	/// Returns the entry as it exists in `pool`.
	pub fn write_index(&mut self, pool: &mut PoolBuilder, entry: &PoolEntry) -> Result<PoolEntry> {
		let entry = pool.maybe_clone(entry)?;
		let index = entry.index();
		if index == 0 {
			return Err(ClassFileError::InvalidIndex { index }.into());
		}
		self.write_u16(index);
		Ok(entry)
	}

	/// Like [`BufWriter::write_index`], but writes a zero for [`None`].
	pub fn write_index_or_zero(&mut self, pool: &mut PoolBuilder, entry: Option<&PoolEntry>) -> Result<()> {
		match entry {
			Some(entry) => {
				self.write_index(pool, entry)?;
			},
			None => self.write_u16(0),
		}
		Ok(())
	}

	/// Writes a `u16` count followed by all the elements.
	pub fn write_list<T>(
		&mut self,
		what: &'static str,
		list: &[T],
		mut write_element: impl FnMut(&mut BufWriter, &T) -> Result<()>,
	) -> Result<()> {
		self.write_usize_as_u16(what, list.len())?;
		for element in list {
			write_element(self, element)?;
		}
		Ok(())
	}

	/// Reserves a `u32` length, calls `f`, and patches the length with the number of bytes `f` wrote.
	pub fn write_length_prefixed(&mut self, f: impl FnOnce(&mut BufWriter) -> Result<()>) -> Result<()> {
		let length_pos = self.len();
		self.write_u32(0);
		f(self)?;
		let length = self.len() - length_pos - 4;
		let length = u32::try_from(length)
			.map_err(|_| ClassFileError::IndexOverflow { what: "attribute length", value: length as i64 })?;
		self.patch_int(length_pos, 4, length as i64)
	}
}
