use anyhow::Result;
use pretty_assertions::assert_eq;
use duke::class_constants::{access, opcode};
use duke::model::{ClassElement, CodeElement};
use duke::options::ParseOptions;
use duke::transform::{class_fn, code_fn, transforming_code, ClassTransform, CodeTransform};

mod common;
use common::{run, Assembler};

fn answer() -> Vec<u8> {
	let mut a = Assembler::new();
	let value = a.method_ref("Answer", "value", "()I");
	let [high, low] = value.to_be_bytes();
	a.method(access::STATIC, "value", "()I", 1, 0, &[opcode::BIPUSH, 13, opcode::IRETURN], &[]);
	a.method(access::STATIC, "doubled", "()I", 2, 0, &[
		opcode::INVOKESTATIC, high, low, opcode::ICONST_2, opcode::IMUL, opcode::IRETURN,
	], &[]);
	a.finish("Answer")
}

fn replace(from: i32, to: i32) -> impl CodeTransform {
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

fn transform(bytes: Vec<u8>, transform: impl ClassTransform) -> Result<Vec<u8>> {
	duke::parse(bytes, ParseOptions::default())?.transform(transform)
}

#[test]
fn replaces_a_constant() -> Result<()> {
	let bytes = answer();
	assert_eq!(run(&bytes, "value", "()I", &[])?, 13);

	let rewritten = transform(bytes, transforming_code(replace(13, 7)))?;
	assert_eq!(run(&rewritten, "value", "()I", &[])?, 7);
	assert_eq!(run(&rewritten, "doubled", "()I", &[])?, 14);
	assert!(duke::verify(&rewritten).is_empty());
	Ok(())
}

#[test]
fn chained_code_transforms() -> Result<()> {
	let rewritten = transform(answer(), transforming_code(replace(13, 7).and_then(replace(7, 13))))?;
	assert_eq!(run(&rewritten, "value", "()I", &[])?, 13);

	let rewritten = transform(answer(), transforming_code(replace(7, 13).and_then(replace(13, 7))))?;
	assert_eq!(run(&rewritten, "value", "()I", &[])?, 7);
	Ok(())
}

#[test]
fn chained_class_transforms() -> Result<()> {
	let pipeline = transforming_code(replace(13, 7)).and_then(transforming_code(replace(7, 13)));
	let rewritten = transform(answer(), pipeline)?;
	assert_eq!(run(&rewritten, "value", "()I", &[])?, 13);
	assert_eq!(run(&rewritten, "doubled", "()I", &[])?, 26);
	Ok(())
}

#[test]
fn transforms_applied_one_after_another() -> Result<()> {
	let once = transform(answer(), transforming_code(replace(13, 7)))?;
	let twice = transform(once, transforming_code(replace(7, 1000)))?;
	assert_eq!(run(&twice, "value", "()I", &[])?, 1000);
	assert_eq!(run(&twice, "doubled", "()I", &[])?, 2000);
	Ok(())
}

#[test]
fn dropping_a_method() -> Result<()> {
	let rewritten = transform(answer(), class_fn(|builder, element| {
		if let ClassElement::Method(method) = &element {
			if method.is("doubled", "()I") {
				return Ok(());
			}
		}
		builder.with(element);
		Ok(())
	}))?;

	let model = duke::parse(rewritten.clone(), ParseOptions::default())?;
	assert_eq!(model.methods()?.len(), 1);
	assert_eq!(run(&rewritten, "value", "()I", &[])?, 13);
	assert!(run(&rewritten, "doubled", "()I", &[]).is_err());
	Ok(())
}

#[test]
fn adding_a_method() -> Result<()> {
	let rewritten = transform(answer(), class_fn(|builder, element| {
		builder.with(element);
		Ok(())
	}).and_then(AddMethod))?;
	assert_eq!(run(&rewritten, "triple", "(I)I", &[5])?, 15);
	assert_eq!(run(&rewritten, "value", "()I", &[])?, 13);
	assert!(duke::verify(&rewritten).is_empty(), "{:?}", duke::verify(&rewritten));
	Ok(())
}

struct AddMethod;

impl ClassTransform for AddMethod {
	fn accept<'r>(&mut self, builder: &mut duke::builder::ClassBuilder<'_, 'r>, element: ClassElement<'r>) -> Result<()> {
		builder.with(element);
		Ok(())
	}

	fn at_end<'r>(&mut self, builder: &mut duke::builder::ClassBuilder<'_, 'r>) -> Result<()> {
		builder.with_method("triple", "(I)I", access::STATIC, |method| {
			method.with_code(|code| {
				code.load(duke::instruction::TypeKind::Int, 0)
					.int_constant(3)?
					.operator(opcode::IMUL)
					.return_value(duke::instruction::TypeKind::Int);
				Ok(())
			})?;
			Ok(())
		})?;
		Ok(())
	}
}
