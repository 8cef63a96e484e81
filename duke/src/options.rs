/// What to do with the `StackMapTable` attribute of code that gets re-emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StackMapsOption {
	/// Frames are read as elements, and written again with their bytecode offsets relocated.
	#[default]
	Keep,
	/// Frames are neither read nor written.
	Drop,
}

/// What to do with attributes this crate doesn't know.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownAttributesOption {
	/// Hand them out as [`crate::attribute::UnboundAttribute::Unknown`] elements.
	#[default]
	Pass,
	Drop,
}

/// Options for parsing a class file.
///
/// The options decide which elements the models hand out, and therefore what a transform writes again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
	pub stack_maps: StackMapsOption,
	/// Whether the `LocalVariableTable` and `LocalVariableTypeTable` are read.
	pub debug_elements: bool,
	/// Whether the `LineNumberTable` is read.
	pub line_numbers: bool,
	pub unknown_attributes: UnknownAttributesOption,
	/// Whether stack map frames are computed for code written into a class of version 50 or above.
	///
	/// Frames are only computed if the code doesn't already come with a frame at every branch target and exception
	/// handler. The frames handed in with the code are replaced then. Without this, frames are written as given.
	pub generate_stack_maps: bool,
	/// Whether unreachable code is replaced by `nop`s ending in `athrow` while computing frames. Without this,
	/// unreachable code makes computing the frames fail.
	pub patch_dead_code: bool,
	/// Whether [`crate::verify_with`] reports branch targets and exception handlers without a stack map frame.
	pub verify_stack_maps: bool,
}

impl Default for ParseOptions {
	fn default() -> Self {
		ParseOptions {
			stack_maps: StackMapsOption::Keep,
			debug_elements: true,
			line_numbers: true,
			unknown_attributes: UnknownAttributesOption::Pass,
			generate_stack_maps: true,
			patch_dead_code: true,
			verify_stack_maps: true,
		}
	}
}

impl ParseOptions {
	/// Whether models hand out everything of the class file, so that bound members can be copied as they are.
	///
	/// Only the options about reading matter here, the others are about writing and verifying.
	pub fn is_lossless(&self) -> bool {
		self.stack_maps == StackMapsOption::Keep &&
			self.debug_elements &&
			self.line_numbers &&
			self.unknown_attributes == UnknownAttributesOption::Pass
	}

	pub fn with_stack_maps(mut self, stack_maps: StackMapsOption) -> Self {
		self.stack_maps = stack_maps;
		self
	}

	pub fn with_debug_elements(mut self, debug_elements: bool) -> Self {
		self.debug_elements = debug_elements;
		self
	}

	pub fn with_line_numbers(mut self, line_numbers: bool) -> Self {
		self.line_numbers = line_numbers;
		self
	}

	pub fn with_unknown_attributes(mut self, unknown_attributes: UnknownAttributesOption) -> Self {
		self.unknown_attributes = unknown_attributes;
		self
	}

	pub fn with_generate_stack_maps(mut self, generate_stack_maps: bool) -> Self {
		self.generate_stack_maps = generate_stack_maps;
		self
	}

	pub fn with_patch_dead_code(mut self, patch_dead_code: bool) -> Self {
		self.patch_dead_code = patch_dead_code;
		self
	}

	pub fn with_verify_stack_maps(mut self, verify_stack_maps: bool) -> Self {
		self.verify_stack_maps = verify_stack_maps;
		self
	}
}
