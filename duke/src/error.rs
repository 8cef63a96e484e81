use thiserror::Error;
use crate::label::Label;

/// The kinds of failures a caller may want to tell apart.
///
/// All functions of this crate return [`anyhow::Result`]. When one of these kinds is the reason of a failure, it is
/// the root of the error chain, and can be recovered with [`anyhow::Error::downcast_ref`], even if context was added
/// on the way up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassFileError {
	/// The input is not a well-formed class file.
	#[error("malformed class file at position {pos}: {message}")]
	Malformed {
		pos: usize,
		message: String,
	},
	/// A constant pool index outside of `[1, entry_count)`, or pointing at the upper half of a long or double.
	#[error("invalid constant pool index {index}")]
	InvalidIndex {
		index: u16,
	},
	/// A constant pool entry was of the wrong kind for its use.
	#[error("constant pool entry {index} is a {found}, expected {expected}")]
	WrongEntryKind {
		index: u16,
		found: &'static str,
		expected: &'static str,
	},
	/// A label that was used as a target was never bound to a bytecode offset.
	#[error("missing label target for {label:?}")]
	MissingLabelTarget {
		label: Label,
	},
	/// A label was bound twice inside one code body.
	#[error("label {label:?} is already bound to bytecode offset {bci}")]
	LabelAlreadyBound {
		label: Label,
		bci: u32,
	},
	/// A label created by one code builder was handed to another one.
	#[error("label {label:?} belongs to a different code builder")]
	ForeignLabel {
		label: Label,
	},
	/// A value didn't fit the width it's encoded with.
	#[error("{what} overflowed: {value} doesn't fit")]
	IndexOverflow {
		what: &'static str,
		value: i64,
	},
	/// A 16 bit branch offset can't reach its target.
	#[error("branch offset {offset} at bytecode offset {bci} doesn't fit into 16 bits")]
	BranchOffsetOverflow {
		bci: u32,
		offset: i64,
	},
	/// Raw bytes referencing a constant pool were written into a pool they're not compatible with.
	#[error("{what} can only be written into the constant pool it was read from or built with")]
	IncompatiblePool {
		what: String,
	},
}

impl ClassFileError {
	pub(crate) fn malformed(pos: usize, message: impl Into<String>) -> ClassFileError {
		ClassFileError::Malformed { pos, message: message.into() }
	}

	/// Finds the [`ClassFileError`] in the chain of the given error, if there's one.
	pub fn find(error: &anyhow::Error) -> Option<&ClassFileError> {
		error.chain().find_map(|cause| cause.downcast_ref::<ClassFileError>())
	}
}
