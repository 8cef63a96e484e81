use anyhow::Result;
use pretty_assertions::assert_eq;
use duke::class_constants::{access, opcode};
use duke::instruction::TypeKind;

mod common;
use common::Assembler;

fn built() -> Result<Vec<u8>> {
	duke::build("Checked", None, |class| {
		class.with_field("counter", "I", access::PRIVATE | access::STATIC, |_| Ok(()))?;
		class.with_method("add", "(II)I", access::PUBLIC | access::STATIC, |method| {
			method.with_code(|code| {
				code.load(TypeKind::Int, 0)
					.load(TypeKind::Int, 1)
					.operator(opcode::IADD)
					.return_value(TypeKind::Int);
				Ok(())
			})?;
			Ok(())
		})?;
		class.with_method("run", "()V", access::PUBLIC | access::ABSTRACT, |_| Ok(()))?;
		Ok(())
	})
}

#[test]
fn built_class_is_clean() -> Result<()> {
	let bytes = built()?;
	let errors = duke::verify(&bytes);
	assert!(errors.is_empty(), "{errors:?}");
	Ok(())
}

#[test]
fn tampered_max_stack() -> Result<()> {
	let mut a = Assembler::new();
	a.method(access::STATIC, "add", "(II)I", 1, 2, &[opcode::ILOAD_0, opcode::ILOAD_1, opcode::IADD, opcode::IRETURN], &[]);
	let errors = duke::verify(&a.finish("Tampered"));
	assert_eq!(errors.len(), 1, "{errors:?}");
	assert_eq!(errors[0].method.as_deref(), Some("add(II)I"));
	assert_eq!(errors[0].to_string(), "in method add(II)I: max stack 1 is too small, the code needs 2");
	Ok(())
}

#[test]
fn too_few_locals_for_the_arguments() {
	let mut a = Assembler::new();
	a.method(access::STATIC, "first", "(JI)I", 1, 2, &[opcode::ILOAD_2, opcode::IRETURN], &[]);
	let errors = duke::verify(&a.finish("Tampered"));
	let messages: Vec<_> = errors.iter().map(|error| error.message.as_str()).collect();
	assert_eq!(messages, vec![
		"max locals 2 is too small for the 3 slots of the arguments",
		"local variable slot 2 isn't below max locals 2",
	]);
}

#[test]
fn duplicate_methods() {
	let mut a = Assembler::new();
	a.method(access::STATIC, "same", "()V", 0, 0, &[opcode::RETURN], &[]);
	a.method(access::STATIC, "same", "()V", 0, 0, &[opcode::RETURN], &[]);
	let errors = duke::verify(&a.finish("Twice"));
	assert_eq!(errors.len(), 1, "{errors:?}");
	assert_eq!(errors[0].message, "duplicate method same()V");
}

#[test]
fn empty_exception_range() {
	let mut a = Assembler::new();
	a.method(access::STATIC, "empty", "()V", 1, 0, &[opcode::NOP, opcode::RETURN, opcode::ATHROW], &[(1, 1, 2, 0)]);
	let errors = duke::verify(&a.finish("Handlers"));
	let found: Vec<_> = errors.iter().map(|error| (error.bci, error.message.as_str())).collect();
	assert_eq!(found, vec![
		(Some(1), "exception handler range 1..1 is empty"),
		// nothing the handler covers is ever executed
		(Some(2), "unreachable code has no stack map frame"),
	]);
}
