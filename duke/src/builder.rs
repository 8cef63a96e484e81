//! Builders collecting the elements of a class, field, method or code.
//!
//! A builder is handed to a transform together with each element. Whatever the transform passes on to the builder
//! ends up in the output, in the order it was passed on. Nested members are built right away into buffered models,
//! which later transform stages can look into again.
use anyhow::{anyhow, Context, Result};
use crate::attribute::Attribute;
use crate::class_constants::opcode;
use crate::instruction::{Instruction, SwitchCase, TypeKind};
use crate::label::{Label, LabelArena};
use crate::model::{ClassElement, CodeElement, CodeModel, FieldElement, FieldModel, MethodElement, MethodModel};
use crate::pool::builder::PoolBuilder;
use crate::pool::PoolEntry;
use crate::transform::{CodeTransform, FieldTransform, MethodTransform};

pub struct ClassBuilder<'b, 'r> {
	pool: &'b mut PoolBuilder<'r>,
	elements: &'b mut Vec<ClassElement<'r>>,
}

impl<'b, 'r> ClassBuilder<'b, 'r> {
	pub(crate) fn new(pool: &'b mut PoolBuilder<'r>, elements: &'b mut Vec<ClassElement<'r>>) -> ClassBuilder<'b, 'r> {
		ClassBuilder { pool, elements }
	}

	/// The constant pool of the class being built.
	pub fn pool(&mut self) -> &mut PoolBuilder<'r> {
		self.pool
	}

	/// A builder over the same pool, writing into `elements`.
	pub(crate) fn stage<'s>(&'s mut self, elements: &'s mut Vec<ClassElement<'r>>) -> ClassBuilder<'s, 'r> {
		ClassBuilder { pool: self.pool, elements }
	}

	pub fn with(&mut self, element: ClassElement<'r>) -> &mut Self {
		self.elements.push(element);
		self
	}

	pub fn with_flags(&mut self, flags: u16) -> &mut Self {
		self.with(ClassElement::AccessFlags(flags))
	}

	pub fn with_version(&mut self, major: u16, minor: u16) -> &mut Self {
		self.with(ClassElement::Version { major, minor })
	}

	pub fn with_superclass(&mut self, name: &str) -> Result<&mut Self> {
		let class = self.pool.class(name)?;
		Ok(self.with(ClassElement::Superclass(class)))
	}

	pub fn with_interfaces(&mut self, names: &[&str]) -> Result<&mut Self> {
		let interfaces = names.iter()
			.map(|name| self.pool.class(name))
			.collect::<Result<Vec<_>>>()?;
		Ok(self.with(ClassElement::Interfaces(interfaces)))
	}

	pub fn with_attribute(&mut self, attribute: impl Into<Attribute<'r>>) -> &mut Self {
		self.with(ClassElement::Attribute(attribute.into()))
	}

	/// Adds a field, with the elements `f` passes to the field builder.
	pub fn with_field(
		&mut self,
		name: &str,
		descriptor: &str,
		flags: u16,
		f: impl FnOnce(&mut FieldBuilder<'_, 'r>) -> Result<()>,
	) -> Result<&mut Self> {
		let name = self.pool.utf8(name)?;
		let descriptor = self.pool.utf8(descriptor)?;
		let mut elements = vec![FieldElement::AccessFlags(flags)];
		f(&mut FieldBuilder::new(self.pool, &mut elements))
			.with_context(|| anyhow!("failed to build field {name:?}"))?;
		Ok(self.with(ClassElement::Field(FieldModel::buffered(name, descriptor, elements))))
	}

	/// Adds a method, with the elements `f` passes to the method builder.
	pub fn with_method(
		&mut self,
		name: &str,
		descriptor: &str,
		flags: u16,
		f: impl FnOnce(&mut MethodBuilder<'_, 'r>) -> Result<()>,
	) -> Result<&mut Self> {
		let name = self.pool.utf8(name)?;
		let descriptor = self.pool.utf8(descriptor)?;
		let mut elements = vec![MethodElement::AccessFlags(flags)];
		f(&mut MethodBuilder::new(self.pool, &mut elements))
			.with_context(|| anyhow!("failed to build method {name:?}{descriptor:?}"))?;
		Ok(self.with(ClassElement::Method(MethodModel::buffered(name, descriptor, elements))))
	}

	/// Adds `field`, with its elements run through `transform`.
	pub fn transform_field(&mut self, field: FieldModel<'r>, transform: &mut dyn FieldTransform) -> Result<&mut Self> {
		let name = field.name().clone();
		let descriptor = field.descriptor().clone();
		let mut elements = Vec::new();
		let mut builder = FieldBuilder::new(self.pool, &mut elements);
		for element in field.into_elements()? {
			transform.accept(&mut builder, element)?;
		}
		transform.at_end(&mut builder)?;
		Ok(self.with(ClassElement::Field(FieldModel::buffered(name, descriptor, elements))))
	}

	/// Adds `method`, with its elements run through `transform`.
	pub fn transform_method(&mut self, method: MethodModel<'r>, transform: &mut dyn MethodTransform) -> Result<&mut Self> {
		let name = method.name().clone();
		let descriptor = method.descriptor().clone();
		let mut elements = Vec::new();
		let mut builder = MethodBuilder::new(self.pool, &mut elements);
		for element in method.into_elements()? {
			transform.accept(&mut builder, element)
				.with_context(|| anyhow!("failed to transform method {name:?}{descriptor:?}"))?;
		}
		transform.at_end(&mut builder)?;
		Ok(self.with(ClassElement::Method(MethodModel::buffered(name, descriptor, elements))))
	}
}

pub struct FieldBuilder<'b, 'r> {
	pool: &'b mut PoolBuilder<'r>,
	elements: &'b mut Vec<FieldElement<'r>>,
}

impl<'b, 'r> FieldBuilder<'b, 'r> {
	pub(crate) fn new(pool: &'b mut PoolBuilder<'r>, elements: &'b mut Vec<FieldElement<'r>>) -> FieldBuilder<'b, 'r> {
		FieldBuilder { pool, elements }
	}

	pub fn pool(&mut self) -> &mut PoolBuilder<'r> {
		self.pool
	}

	pub(crate) fn stage<'s>(&'s mut self, elements: &'s mut Vec<FieldElement<'r>>) -> FieldBuilder<'s, 'r> {
		FieldBuilder { pool: self.pool, elements }
	}

	pub fn with(&mut self, element: FieldElement<'r>) -> &mut Self {
		self.elements.push(element);
		self
	}

	pub fn with_flags(&mut self, flags: u16) -> &mut Self {
		self.with(FieldElement::AccessFlags(flags))
	}

	pub fn with_attribute(&mut self, attribute: impl Into<Attribute<'r>>) -> &mut Self {
		self.with(FieldElement::Attribute(attribute.into()))
	}
}

pub struct MethodBuilder<'b, 'r> {
	pool: &'b mut PoolBuilder<'r>,
	elements: &'b mut Vec<MethodElement<'r>>,
}

impl<'b, 'r> MethodBuilder<'b, 'r> {
	pub(crate) fn new(pool: &'b mut PoolBuilder<'r>, elements: &'b mut Vec<MethodElement<'r>>) -> MethodBuilder<'b, 'r> {
		MethodBuilder { pool, elements }
	}

	pub fn pool(&mut self) -> &mut PoolBuilder<'r> {
		self.pool
	}

	pub(crate) fn stage<'s>(&'s mut self, elements: &'s mut Vec<MethodElement<'r>>) -> MethodBuilder<'s, 'r> {
		MethodBuilder { pool: self.pool, elements }
	}

	pub fn with(&mut self, element: MethodElement<'r>) -> &mut Self {
		self.elements.push(element);
		self
	}

	pub fn with_flags(&mut self, flags: u16) -> &mut Self {
		self.with(MethodElement::AccessFlags(flags))
	}

	pub fn with_attribute(&mut self, attribute: impl Into<Attribute<'r>>) -> &mut Self {
		self.with(MethodElement::Attribute(attribute.into()))
	}

	/// Adds code, with the elements `f` passes to the code builder.
	///
	/// `max_stack` and `max_locals` are computed when the code is written.
	pub fn with_code(&mut self, f: impl FnOnce(&mut CodeBuilder<'_, 'r>) -> Result<()>) -> Result<&mut Self> {
		let mut labels = LabelArena::new();
		let mut elements = Vec::new();
		f(&mut CodeBuilder::new(self.pool, &mut elements, &mut labels))?;
		Ok(self.with(MethodElement::Code(CodeModel::buffered(elements, labels, None, None))))
	}

	/// Adds `code`, with its elements run through `transform`.
	pub fn transform_code(&mut self, code: CodeModel<'r>, transform: &mut dyn CodeTransform) -> Result<&mut Self> {
		let max_stack = code.max_stack();
		let max_locals = code.max_locals();
		let (input, mut labels) = code.into_parts()?;
		let mut elements = Vec::with_capacity(input.len());
		let mut builder = CodeBuilder::new(self.pool, &mut elements, &mut labels);
		for element in input {
			transform.accept(&mut builder, element)?;
		}
		transform.at_end(&mut builder)?;
		Ok(self.with(MethodElement::Code(CodeModel::buffered(elements, labels, max_stack, max_locals))))
	}
}

/// Collects the elements of code.
///
/// Labels created with [`CodeBuilder::new_label`] belong to this code. Passing them to another code builder fails
/// when the code is written.
pub struct CodeBuilder<'b, 'r> {
	pool: &'b mut PoolBuilder<'r>,
	elements: &'b mut Vec<CodeElement<'r>>,
	labels: &'b mut LabelArena,
}

impl<'b, 'r> CodeBuilder<'b, 'r> {
	pub(crate) fn new(
		pool: &'b mut PoolBuilder<'r>,
		elements: &'b mut Vec<CodeElement<'r>>,
		labels: &'b mut LabelArena,
	) -> CodeBuilder<'b, 'r> {
		CodeBuilder { pool, elements, labels }
	}

	pub fn pool(&mut self) -> &mut PoolBuilder<'r> {
		self.pool
	}

	pub(crate) fn stage<'s>(&'s mut self, elements: &'s mut Vec<CodeElement<'r>>) -> CodeBuilder<'s, 'r> {
		CodeBuilder { pool: self.pool, elements, labels: self.labels }
	}

	pub fn with(&mut self, element: CodeElement<'r>) -> &mut Self {
		self.elements.push(element);
		self
	}

	pub fn with_instruction(&mut self, instruction: Instruction) -> &mut Self {
		self.with(instruction.into())
	}

	pub fn new_label(&mut self) -> Label {
		self.labels.new_label()
	}

	/// Binds `label` to the position of the next instruction.
	pub fn label_here(&mut self, label: Label) -> &mut Self {
		self.with(CodeElement::Label(label))
	}

	/// Creates a label bound to the position of the next instruction.
	pub fn new_bound_label(&mut self) -> Label {
		let label = self.new_label();
		self.label_here(label);
		label
	}

	pub fn load(&mut self, kind: TypeKind, slot: u16) -> &mut Self {
		self.with_instruction(Instruction::load(kind, slot))
	}

	pub fn store(&mut self, kind: TypeKind, slot: u16) -> &mut Self {
		self.with_instruction(Instruction::store(kind, slot))
	}

	pub fn increment(&mut self, slot: u16, constant: i16) -> &mut Self {
		self.with_instruction(Instruction::increment(slot, constant))
	}

	pub fn int_constant(&mut self, value: i32) -> Result<&mut Self> {
		let instruction = Instruction::int_constant(self.pool, value)?;
		Ok(self.with_instruction(instruction))
	}

	/// Loads a string constant with `ldc`.
	pub fn string_constant(&mut self, value: &str) -> Result<&mut Self> {
		let entry = self.pool.string(value)?;
		Ok(self.with_instruction(Instruction::ConstantLoad { entry }))
	}

	pub fn constant_load(&mut self, entry: PoolEntry) -> &mut Self {
		self.with_instruction(Instruction::ConstantLoad { entry })
	}

	pub fn branch(&mut self, opcode: u8, target: Label) -> &mut Self {
		self.with_instruction(Instruction::branch(opcode, target))
	}

	pub fn goto(&mut self, target: Label) -> &mut Self {
		self.with_instruction(Instruction::goto(target))
	}

	pub fn table_switch(&mut self, low: i32, high: i32, default: Label, cases: Vec<SwitchCase>) -> &mut Self {
		self.with_instruction(Instruction::TableSwitch { low, high, default, cases })
	}

	pub fn lookup_switch(&mut self, default: Label, cases: Vec<SwitchCase>) -> &mut Self {
		self.with_instruction(Instruction::LookupSwitch { default, cases })
	}

	pub fn return_value(&mut self, kind: TypeKind) -> &mut Self {
		self.with_instruction(Instruction::return_value(kind))
	}

	pub fn return_void(&mut self) -> &mut Self {
		self.with_instruction(Instruction::return_void())
	}

	pub fn athrow(&mut self) -> &mut Self {
		self.with_instruction(Instruction::Throw)
	}

	pub fn operator(&mut self, opcode: u8) -> &mut Self {
		self.with_instruction(Instruction::Operator { opcode })
	}

	pub fn stack(&mut self, opcode: u8) -> &mut Self {
		self.with_instruction(Instruction::Stack { opcode })
	}

	pub fn nop(&mut self) -> &mut Self {
		self.with_instruction(Instruction::Nop)
	}

	/// `getstatic`, `putstatic`, `getfield` or `putfield`.
	pub fn field_access(&mut self, opcode: u8, owner: &str, name: &str, descriptor: &str) -> Result<&mut Self> {
		let field = self.pool.field_ref(owner, name, descriptor)?;
		Ok(self.with_instruction(Instruction::Field { opcode, field }))
	}

	pub fn get_static(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<&mut Self> {
		self.field_access(opcode::GETSTATIC, owner, name, descriptor)
	}

	pub fn put_static(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<&mut Self> {
		self.field_access(opcode::PUTSTATIC, owner, name, descriptor)
	}

	pub fn invoke_static(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<&mut Self> {
		let method = self.pool.method_ref(owner, name, descriptor)?;
		Ok(self.with_instruction(Instruction::Invoke { opcode: opcode::INVOKESTATIC, method }))
	}

	pub fn invoke_virtual(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<&mut Self> {
		let method = self.pool.method_ref(owner, name, descriptor)?;
		Ok(self.with_instruction(Instruction::Invoke { opcode: opcode::INVOKEVIRTUAL, method }))
	}

	pub fn invoke_special(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<&mut Self> {
		let method = self.pool.method_ref(owner, name, descriptor)?;
		Ok(self.with_instruction(Instruction::Invoke { opcode: opcode::INVOKESPECIAL, method }))
	}

	pub fn invoke_interface(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<&mut Self> {
		let method = self.pool.interface_method_ref(owner, name, descriptor)?;
		Ok(self.with_instruction(Instruction::Invoke { opcode: opcode::INVOKEINTERFACE, method }))
	}

	pub fn new_object(&mut self, class: &str) -> Result<&mut Self> {
		let class = self.pool.class(class)?;
		Ok(self.with_instruction(Instruction::NewObject { class }))
	}

	/// Adds an exception table entry. A `catch_type` of [`None`] catches everything.
	pub fn exception_catch(&mut self, start: Label, end: Label, handler: Label, catch_type: Option<&str>) -> Result<&mut Self> {
		let catch_type = catch_type.map(|name| self.pool.class(name)).transpose()?;
		Ok(self.with(CodeElement::ExceptionCatch { start, end, handler, catch_type }))
	}

	pub fn line_number(&mut self, line: u16) -> &mut Self {
		self.with(CodeElement::LineNumber(line))
	}
}
