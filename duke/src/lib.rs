//! Reading, transforming and writing Java class files.
//!
//! A class file is read into a [`ClassModel`], which hands out its contents as elements. Elements read from a class
//! file stay bound to its bytes, and get copied as they are when written into a class using the same constant pool.
//! Transforms rewrite the elements of a model into a new class file, and builders create class files from scratch.
//!
//! ```ignore
//! let model = duke::parse(bytes, ParseOptions::default())?;
//! let copy = model.transform(class_fn(|builder, element| {
//!     builder.with(element);
//!     Ok(())
//! }))?;
//! ```
use anyhow::{anyhow, Context, Result};
use log::debug;
use crate::builder::ClassBuilder;
use crate::class_constants::{access, version};
use crate::model::ClassModel;
use crate::options::ParseOptions;
use crate::pool::builder::PoolBuilder;

#[macro_use]
mod macros;

pub mod attribute;
pub mod buf_writer;
pub mod builder;
pub mod class_constants;
pub mod class_reader;
pub mod descriptor;
mod error;
pub mod instruction;
pub(crate) mod jstring;
pub mod label;
pub mod model;
pub mod options;
pub mod pool;
pub mod signature;
pub mod transform;
pub mod verify;
pub(crate) mod writer;


pub use error::ClassFileError;
pub use verify::{verify, verify_with, VerifyError};

/// Reads a class file.
///
/// The structure of the whole class file is checked right away. Member contents, code and attributes are only read
/// when asked for.
pub fn parse(bytes: Vec<u8>, options: ParseOptions) -> Result<ClassModel> {
	ClassModel::new(bytes, options)
}

/// Builds a new class file named `this_class`.
///
/// The class starts out as a public class of version 52.0, extending `java/lang/Object`, which `shaper` may
/// change by passing on other elements. Pass a `pool` to build with the constant pool of an existing class, so that
/// its members can be copied directly.
pub fn build<'r>(
	this_class: &str,
	pool: Option<PoolBuilder<'r>>,
	shaper: impl FnOnce(&mut ClassBuilder<'_, 'r>) -> Result<()>,
) -> Result<Vec<u8>> {
	build_with(this_class, pool, &ParseOptions::default(), shaper)
}

/// Like [`build`], with `options` deciding whether stack map frames are computed and unreachable code is replaced.
pub fn build_with<'r>(
	this_class: &str,
	pool: Option<PoolBuilder<'r>>,
	options: &ParseOptions,
	shaper: impl FnOnce(&mut ClassBuilder<'_, 'r>) -> Result<()>,
) -> Result<Vec<u8>> {
	let mut pool = pool.unwrap_or_default();
	let this_class_entry = pool.class(this_class)?;
	debug!("building class {this_class:?}");

	let mut elements = Vec::new();
	let mut builder = ClassBuilder::new(&mut pool, &mut elements);
	builder.with_version(version::V1_8, 0)
		.with_flags(access::PUBLIC | access::SUPER)
		.with_superclass("java/lang/Object")?;
	shaper(&mut builder)
		.with_context(|| anyhow!("failed to build class {this_class:?}"))?;

	writer::write_class(&mut pool, &this_class_entry, elements, options)
		.with_context(|| anyhow!("failed to write class {this_class:?}"))
}
