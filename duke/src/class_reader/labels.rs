use anyhow::{bail, Result};

/// A helper struct for collecting the bytecode offsets that need a label target element when reading code.
#[derive(Debug, Clone)]
pub(crate) struct LabelTargets {
	code_length: u32,
	/// One more than the code length, for labels at the end of the code.
	targets: Vec<bool>,
}

impl LabelTargets {
	pub(crate) fn new(code_length: u32) -> LabelTargets {
		LabelTargets {
			code_length,
			targets: vec![false; code_length as usize + 1],
		}
	}

	/// Marks a target inside of the code.
	pub(crate) fn create(&mut self, pc: i64) -> Result<u32> {
		if pc < 0 || pc >= self.code_length as i64 {
			bail!("label for bytecode offset {pc:?} out of bounds for code length {:?}", self.code_length);
		}
		self.targets[pc as usize] = true;
		Ok(pc as u32)
	}

	/// Marks a target that may also be the end of the code, for exclusive ends of ranges.
	pub(crate) fn create_exclusive(&mut self, pc: i64) -> Result<u32> {
		if pc < 0 || pc > self.code_length as i64 {
			bail!("label for bytecode offset {pc:?} out of bounds for code length {:?}", self.code_length);
		}
		self.targets[pc as usize] = true;
		Ok(pc as u32)
	}

	pub(crate) fn is_target(&self, pc: u32) -> bool {
		self.targets.get(pc as usize).copied().unwrap_or(false)
	}
}
