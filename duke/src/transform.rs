//! Transforms, which rewrite the elements of a model.
//!
//! A transform is handed each element of a model together with a builder. It may pass the element on unchanged,
//! replace it, drop it, or add new elements. Transforms compose with `and_then`.
//!
//! ```ignore
//! let bytes = model.transform(transforming_code(code_fn(|builder, element| {
//!     builder.with(element);
//!     Ok(())
//! })))?;
//! ```
use anyhow::Result;
use crate::builder::{ClassBuilder, CodeBuilder, FieldBuilder, MethodBuilder};
use crate::model::{ClassElement, CodeElement, FieldElement, MethodElement};

make_transform! {
	/// Rewrites the elements of a class.
	ClassTransform for ClassElement into ClassBuilder;
	/// A closure as a [`ClassTransform`], see [`class_fn`].
	class_fn -> ClassFn;
	/// Several [`ClassTransform`]s one after another.
	ClassPipeline;
}

make_transform! {
	/// Rewrites the elements of a field.
	FieldTransform for FieldElement into FieldBuilder;
	field_fn -> FieldFn;
	FieldPipeline;
}

make_transform! {
	/// Rewrites the elements of a method.
	MethodTransform for MethodElement into MethodBuilder;
	method_fn -> MethodFn;
	MethodPipeline;
}

make_transform! {
	/// Rewrites the elements of code.
	///
	/// Labels of the code that was read stay valid in the output. New labels come from [`CodeBuilder::new_label`].
	CodeTransform for CodeElement into CodeBuilder;
	code_fn -> CodeFn;
	/// Several [`CodeTransform`]s one after another.
	///
	/// All stages share the labels of the code they run on.
	CodePipeline;
}

/// A [`ClassTransform`] running each method through the given [`MethodTransform`].
pub struct TransformingMethods<T>(T);

pub fn transforming_methods<T: MethodTransform>(transform: T) -> TransformingMethods<T> {
	TransformingMethods(transform)
}

impl<T: MethodTransform> ClassTransform for TransformingMethods<T> {
	fn accept<'r>(&mut self, builder: &mut ClassBuilder<'_, 'r>, element: ClassElement<'r>) -> Result<()> {
		match element {
			ClassElement::Method(method) => {
				builder.transform_method(method, &mut self.0)?;
			},
			element => {
				builder.with(element);
			},
		}
		Ok(())
	}
}

/// A [`ClassTransform`] running each field through the given [`FieldTransform`].
pub struct TransformingFields<T>(T);

pub fn transforming_fields<T: FieldTransform>(transform: T) -> TransformingFields<T> {
	TransformingFields(transform)
}

impl<T: FieldTransform> ClassTransform for TransformingFields<T> {
	fn accept<'r>(&mut self, builder: &mut ClassBuilder<'_, 'r>, element: ClassElement<'r>) -> Result<()> {
		match element {
			ClassElement::Field(field) => {
				builder.transform_field(field, &mut self.0)?;
			},
			element => {
				builder.with(element);
			},
		}
		Ok(())
	}
}

/// A [`MethodTransform`] running the code of the method through the given [`CodeTransform`].
pub struct MethodTransformingCode<T>(T);

pub fn method_transforming_code<T: CodeTransform>(transform: T) -> MethodTransformingCode<T> {
	MethodTransformingCode(transform)
}

impl<T: CodeTransform> MethodTransform for MethodTransformingCode<T> {
	fn accept<'r>(&mut self, builder: &mut MethodBuilder<'_, 'r>, element: MethodElement<'r>) -> Result<()> {
		match element {
			MethodElement::Code(code) => {
				builder.transform_code(code, &mut self.0)?;
			},
			element => {
				builder.with(element);
			},
		}
		Ok(())
	}
}

/// A [`ClassTransform`] running the code of each method through the given [`CodeTransform`].
///
/// Methods without code are passed on unchanged.
pub fn transforming_code<T: CodeTransform>(transform: T) -> TransformingMethods<MethodTransformingCode<T>> {
	transforming_methods(method_transforming_code(transform))
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use crate::builder::CodeBuilder;
	use crate::class_constants::opcode;
	use crate::instruction::{Insn, Instruction};
	use crate::label::LabelArena;
	use crate::model::CodeElement;
	use crate::pool::builder::PoolBuilder;
	use crate::transform::{code_fn, CodeTransform};

	fn replace_int(from: i32, to: i32) -> impl CodeTransform {
		code_fn(move |builder, element| {
			if let CodeElement::Instruction(insn) = &element {
				if insn.as_int_constant() == Some(from) {
					builder.int_constant(to)?;
					return Ok(());
				}
			}
			builder.with(element);
			Ok(())
		})
	}

	struct AppendAtEnd(Instruction);

	impl CodeTransform for AppendAtEnd {
		fn accept<'r>(&mut self, builder: &mut CodeBuilder<'_, 'r>, element: CodeElement<'r>) -> Result<()> {
			builder.with(element);
			Ok(())
		}

		fn at_end<'r>(&mut self, builder: &mut CodeBuilder<'_, 'r>) -> Result<()> {
			builder.with_instruction(self.0.clone());
			Ok(())
		}
	}

	fn run(transform: &mut dyn CodeTransform, input: Vec<CodeElement<'static>>) -> Result<Vec<Instruction>> {
		let mut pool = PoolBuilder::new();
		let mut labels = LabelArena::new();
		let mut output = Vec::new();
		let mut builder = CodeBuilder::new(&mut pool, &mut output, &mut labels);
		for element in input {
			transform.accept(&mut builder, element)?;
		}
		transform.at_end(&mut builder)?;
		output.into_iter()
			.map(|element| match element {
				CodeElement::Instruction(Insn::Unbound(instruction)) => Ok(instruction),
				element => anyhow::bail!("unexpected element {element:?}"),
			})
			.collect()
	}

	fn bipush(value: i16) -> Instruction {
		Instruction::ConstantArgument { opcode: opcode::BIPUSH, value }
	}

	#[test]
	fn stages_run_in_order() -> Result<()> {
		let input: Vec<CodeElement> = vec![bipush(13).into(), Instruction::Nop.into(), bipush(7).into()];

		let mut pipeline = replace_int(13, 7).and_then(replace_int(7, 13));
		assert_eq!(run(&mut pipeline, input.clone())?, vec![bipush(13), Instruction::Nop, bipush(13)]);

		let mut pipeline = replace_int(7, 13).and_then(replace_int(13, 7));
		assert_eq!(run(&mut pipeline, input)?, vec![bipush(7), Instruction::Nop, bipush(7)]);
		Ok(())
	}

	#[test]
	fn at_end_output_goes_through_later_stages() -> Result<()> {
		let mut pipeline = AppendAtEnd(bipush(13))
			.and_then(replace_int(13, 7))
			.and_then(AppendAtEnd(Instruction::return_void()));

		assert_eq!(run(&mut pipeline, vec![Instruction::Nop.into()])?, vec![
			Instruction::Nop,
			bipush(7),
			Instruction::return_void(),
		]);
		Ok(())
	}
}
