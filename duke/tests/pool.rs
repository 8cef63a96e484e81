use anyhow::Result;
use pretty_assertions::assert_eq;
use duke::buf_writer::BufWriter;
use duke::class_constants::pool as tag;
use duke::options::ParseOptions;
use duke::pool::builder::PoolBuilder;
use duke::pool::{ConstantPool, EntryValue};
use duke::ClassFileError;

mod common;
use common::Assembler;

fn invalid_index(result: Result<impl std::fmt::Debug>) -> Option<u16> {
	match result {
		Err(error) => match ClassFileError::find(&error) {
			Some(&ClassFileError::InvalidIndex { index }) => Some(index),
			_ => None,
		},
		Ok(_) => None,
	}
}

#[test]
fn entries_are_deduplicated() -> Result<()> {
	let mut pool = PoolBuilder::new();
	let hello = pool.utf8("hello")?;
	assert_eq!(hello.index(), 1);
	assert_eq!(pool.utf8("hello")?.index(), 1);

	let int = pool.int_entry(42)?;
	assert_eq!(pool.int_entry(42)?.index(), int.index());
	assert_ne!(pool.int_entry(43)?.index(), int.index());

	// The class reuses the name entry.
	let class = pool.class("hello")?;
	assert_eq!(pool.class("hello")?.index(), class.index());
	assert_eq!(pool.entry_count(), 5);
	assert!(matches!(class.value(), EntryValue::Class { name } if name.index() == hello.index()));
	Ok(())
}

#[test]
fn longs_take_two_slots() -> Result<()> {
	let mut pool = PoolBuilder::new();
	let long = pool.long_entry(1 << 40)?;
	let next = pool.int_entry(2)?;
	assert_eq!(long.index(), 1);
	assert_eq!(next.index(), 3);
	assert_eq!(pool.entry_count(), 4);
	assert_eq!(pool.long_entry(1 << 40)?.index(), 1);

	assert_eq!(invalid_index(pool.entry_by_index(2)), Some(2));
	assert_eq!(invalid_index(pool.entry_by_index(0)), Some(0));
	assert_eq!(invalid_index(pool.entry_by_index(4)), Some(4));
	assert_eq!(pool.entry_by_index(3)?.as_int()?, 2);
	Ok(())
}

#[test]
fn read_pool_indices() -> Result<()> {
	let mut a = Assembler::new();
	let long = a.long(-1);
	let int = a.int(7);
	let bytes = a.finish("Longs");
	let model = duke::parse(bytes, ParseOptions::default())?;
	let reader = model.reader();

	assert!(matches!(reader.entry_by_index(long)?.value(), EntryValue::Long(-1)));
	assert_eq!(reader.entry_by_index(int)?.as_int()?, 7);
	assert_eq!(invalid_index(reader.entry_by_index(0)), Some(0));
	assert_eq!(invalid_index(reader.entry_by_index(long + 1)), Some(long + 1));
	let count = reader.entry_count();
	assert_eq!(invalid_index(reader.entry_by_index(count)), Some(count));

	let error = reader.entry_by_index(long)?.as_int().unwrap_err();
	assert!(matches!(ClassFileError::find(&error), Some(ClassFileError::WrongEntryKind { .. })), "{error:?}");
	let error = reader.entry_by_index(int)?.expect_tag(tag::UTF8).map(|_| ()).unwrap_err();
	assert!(matches!(ClassFileError::find(&error), Some(ClassFileError::WrongEntryKind { .. })), "{error:?}");
	Ok(())
}

#[test]
fn entries_from_other_pools_are_cloned_once() -> Result<()> {
	let mut a = Assembler::new();
	let string = a.string("some text");
	let method = a.method_ref("Other", "run", "(J)V");
	let bytes = a.finish("Source");
	let model = duke::parse(bytes, ParseOptions::default())?;
	let reader = model.reader();

	let mut pool = PoolBuilder::new();
	let first = pool.maybe_clone(&reader.entry_by_index(string)?)?;
	let second = pool.maybe_clone(&reader.entry_by_index(string)?)?;
	assert_eq!(first.index(), second.index());
	assert_eq!(first.pool(), pool.id());
	assert_ne!(first.pool(), reader.id());

	let cloned = pool.maybe_clone(&reader.entry_by_index(method)?)?;
	let (owner, name, descriptor) = cloned.as_member_ref()?;
	assert_eq!((owner.to_string(), name.to_string(), descriptor.to_string()), (
		"Other".to_owned(), "run".to_owned(), "(J)V".to_owned(),
	));
	assert_eq!(pool.method_ref("Other", "run", "(J)V")?.index(), cloned.index());

	// Writing an index clones it as well.
	let mut buf = BufWriter::new();
	buf.write_index(&mut pool, &reader.entry_by_index(string)?)?;
	assert_eq!(buf.as_slice(), &first.index().to_be_bytes());
	Ok(())
}

#[test]
fn a_child_pool_reuses_its_parent() -> Result<()> {
	let mut a = Assembler::new();
	let text = a.utf8("text");
	let bytes = a.finish("Parent");
	let model = duke::parse(bytes, ParseOptions::default())?;
	let reader = model.reader();

	let mut pool = PoolBuilder::with_parent(reader);
	assert_eq!(pool.entry_count(), reader.entry_count());
	assert!(pool.can_write_direct(reader.id()));

	let entry = reader.entry_by_index(text)?;
	assert_eq!(pool.maybe_clone(&entry)?.index(), text);
	assert_eq!(pool.utf8("text")?.index(), text);

	let added = pool.utf8("not in the parent")?;
	assert_eq!(added.index(), reader.entry_count());
	assert_eq!(pool.entry_count(), reader.entry_count() + 1);
	Ok(())
}
