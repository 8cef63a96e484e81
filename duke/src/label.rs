//! Symbolic jump targets.
//!
//! A [`Label`] is a small handle. It belongs to a *label context*: either a code attribute that was read, where the
//! label just is the bytecode offset it stands for, or a code builder, where the label is an index into the
//! builder's [`LabelArena`].
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicU32, Ordering};
use anyhow::Result;
use crate::error::ClassFileError;

static NEXT_CONTEXT: AtomicU32 = AtomicU32::new(1);

fn next_context_id() -> u32 {
	NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) enum LabelContext {
	Read(u32),
	Write(u32),
}

impl LabelContext {
	pub(crate) fn new_read() -> LabelContext {
		LabelContext::Read(next_context_id())
	}
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label {
	context: LabelContext,
	id: u32,
}

impl Label {
	/// The label standing for the bytecode offset `bci` in a code attribute that was read.
	pub(crate) fn read(context: LabelContext, bci: u32) -> Label {
		Label { context, id: bci }
	}

	/// If this label comes from a code attribute that was read, the bytecode offset it stands for there.
	pub fn original_bci(&self) -> Option<u32> {
		match self.context {
			LabelContext::Read(_) => Some(self.id),
			LabelContext::Write(_) => None,
		}
	}
}

impl Debug for Label {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self.context {
			LabelContext::Read(context) => write!(f, "L{}@r{context}", self.id),
			LabelContext::Write(context) => write!(f, "L{}@w{context}", self.id),
		}
	}
}

/// The label slots of one code builder.
///
/// Labels created by [`LabelArena::new_label`] index into `slots`. Labels from read contexts get their slot on first
/// use. Labels of any other code builder are rejected.
#[derive(Debug, Clone)]
pub(crate) struct LabelArena {
	context: LabelContext,
	slots: Vec<Option<u32>>,
	adopted: HashMap<Label, Option<u32>>,
}

impl LabelArena {
	pub(crate) fn new() -> LabelArena {
		LabelArena {
			context: LabelContext::Write(next_context_id()),
			slots: Vec::new(),
			adopted: HashMap::new(),
		}
	}

	pub(crate) fn new_label(&mut self) -> Label {
		let id = self.slots.len() as u32;
		self.slots.push(None);
		Label { context: self.context, id }
	}

	fn slot(&mut self, label: Label) -> Result<&mut Option<u32>> {
		match label.context {
			LabelContext::Write(_) if label.context == self.context => {
				self.slots.get_mut(label.id as usize)
					.ok_or_else(|| ClassFileError::ForeignLabel { label }.into())
			},
			LabelContext::Write(_) => Err(ClassFileError::ForeignLabel { label }.into()),
			LabelContext::Read(_) => Ok(self.adopted.entry(label).or_insert(None)),
		}
	}

	/// Binds `label` to `bci`. Every label can only be bound once.
	pub(crate) fn bind(&mut self, label: Label, bci: u32) -> Result<()> {
		let slot = self.slot(label)?;
		if let Some(bci) = *slot {
			return Err(ClassFileError::LabelAlreadyBound { label, bci }.into());
		}
		*slot = Some(bci);
		Ok(())
	}

	/// Checks that a label may be used here, without binding it.
	pub(crate) fn check(&mut self, label: Label) -> Result<()> {
		self.slot(label).map(|_| ())
	}

	pub(crate) fn get(&self, label: Label) -> Option<u32> {
		match label.context {
			LabelContext::Write(_) if label.context == self.context => self.slots.get(label.id as usize).copied().flatten(),
			LabelContext::Write(_) => None,
			LabelContext::Read(_) => self.adopted.get(&label).copied().flatten(),
		}
	}

	pub(crate) fn try_get(&self, label: Label) -> Result<u32> {
		self.get(label).ok_or_else(|| ClassFileError::MissingLabelTarget { label }.into())
	}
}
