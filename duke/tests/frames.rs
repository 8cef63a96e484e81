use anyhow::{Context, Result};
use pretty_assertions::assert_eq;
use duke::builder::{ClassBuilder, CodeBuilder};
use duke::class_constants::{access, opcode};
use duke::instruction::{Insn, Instruction, TypeKind};
use duke::model::{CodeElement, StackMapFrame, VerificationType};
use duke::options::{ParseOptions, StackMapsOption};
use duke::transform::{code_fn, transforming_code};

mod common;
use common::run;

/// A class with one static method, built with `options`.
fn build(
	name: &str,
	descriptor: &str,
	options: &ParseOptions,
	code: impl FnOnce(&mut CodeBuilder<'_, 'static>) -> Result<()>,
) -> Result<Vec<u8>> {
	duke::build_with("Frames", None, options, |class: &mut ClassBuilder<'_, 'static>| {
		class.with_method(name, descriptor, access::STATIC, |method| {
			method.with_code(code)?;
			Ok(())
		})?;
		Ok(())
	})
}

/// `static void check(int[] a) { if (a.length != 0) {} }`, as `aload_0; arraylength; ifeq L; nop; L: return`.
fn check(options: &ParseOptions) -> Result<Vec<u8>> {
	build("check", "([I)V", options, |code| {
		let end = code.new_label();
		code.load(TypeKind::Reference, 0)
			.operator(opcode::ARRAYLENGTH)
			.branch(opcode::IFEQ, end)
			.nop()
			.label_here(end)
			.return_void();
		Ok(())
	})
}

/// `iconst_1; ireturn; iconst_2; ireturn`, the second return can't be reached.
fn two_returns(options: &ParseOptions) -> Result<Vec<u8>> {
	build("twoReturns", "()I", options, |code| {
		code.int_constant(1)?
			.return_value(TypeKind::Int)
			.int_constant(2)?
			.return_value(TypeKind::Int);
		Ok(())
	})
}

fn verification_type(value: &VerificationType) -> Result<String> {
	Ok(match value {
		VerificationType::Top => "top".to_owned(),
		VerificationType::Integer => "int".to_owned(),
		VerificationType::Float => "float".to_owned(),
		VerificationType::Double => "double".to_owned(),
		VerificationType::Long => "long".to_owned(),
		VerificationType::Null => "null".to_owned(),
		VerificationType::UninitializedThis => "uninitialized this".to_owned(),
		VerificationType::Object(class) => class.as_class_name()?.to_string(),
		VerificationType::Uninitialized(label) => format!("uninitialized {:?}", label.original_bci()),
	})
}

fn verification_types(values: &[VerificationType]) -> Result<String> {
	Ok(values.iter().map(verification_type).collect::<Result<Vec<_>>>()?.join(", "))
}

fn describe(frame: &StackMapFrame) -> Result<String> {
	Ok(match frame {
		StackMapFrame::Same => "same".to_owned(),
		StackMapFrame::SameLocals1StackItem(item) => format!("same locals, stack {}", verification_type(item)?),
		StackMapFrame::Chop(count) => format!("chop {count}"),
		StackMapFrame::Append(locals) => format!("append {}", verification_types(locals)?),
		StackMapFrame::Full { locals, stack } => {
			format!("full [{}] [{}]", verification_types(locals)?, verification_types(stack)?)
		},
	})
}

/// The frames of the only method, with the bytecode offset they apply to.
fn frames(bytes: &[u8], options: ParseOptions) -> Result<Vec<(u32, String)>> {
	let model = duke::parse(bytes.to_vec(), options)?;
	let code = model.methods()?[0].code()?.context("no code")?;
	let mut frames = Vec::new();
	let mut pending = None;
	for element in code.elements()? {
		match element {
			CodeElement::Frame(frame) => pending = Some(describe(&frame)?),
			CodeElement::Instruction(Insn::Bound(instruction)) => {
				if let Some(frame) = pending.take() {
					frames.push((instruction.bci(), frame));
				}
			},
			_ => {},
		}
	}
	Ok(frames)
}

/// The instructions of the only method.
fn instructions(bytes: &[u8]) -> Result<Vec<Instruction>> {
	let model = duke::parse(bytes.to_vec(), ParseOptions::default())?;
	let code = model.methods()?[0].code()?.context("no code")?;
	let mut instructions = Vec::new();
	for element in code.elements()? {
		if let CodeElement::Instruction(Insn::Bound(instruction)) = element {
			instructions.push(instruction.decode()?);
		}
	}
	Ok(instructions)
}

#[test]
fn branch_target_gets_a_frame() -> Result<()> {
	let bytes = check(&ParseOptions::default())?;
	assert!(duke::verify(&bytes).is_empty(), "{:?}", duke::verify(&bytes));
	assert_eq!(frames(&bytes, ParseOptions::default())?, vec![(6, "same".to_owned())]);
	Ok(())
}

#[test]
fn loop_appends_a_local() -> Result<()> {
	// int count(int n) { int i = 0; while (i < n) i++; return i; }
	let bytes = build("count", "(I)I", &ParseOptions::default(), |code| {
		code.int_constant(0)?.store(TypeKind::Int, 1);
		let head = code.new_bound_label();
		let end = code.new_label();
		code.load(TypeKind::Int, 1)
			.load(TypeKind::Int, 0)
			.branch(opcode::IF_ICMPGE, end)
			.increment(1, 1)
			.goto(head)
			.label_here(end)
			.load(TypeKind::Int, 1)
			.return_value(TypeKind::Int);
		Ok(())
	})?;
	assert!(duke::verify(&bytes).is_empty(), "{:?}", duke::verify(&bytes));
	assert_eq!(run(&bytes, "count", "(I)I", &[3])?, 3);
	// 0: iconst_0, 1: istore_1, 2: iload_1, 3: iload_0, 4: if_icmpge, 7: iinc, 10: goto, 13: iload_1
	assert_eq!(frames(&bytes, ParseOptions::default())?, vec![
		(2, "append int".to_owned()),
		(13, "same".to_owned()),
	]);
	Ok(())
}

#[test]
fn exception_handler_gets_a_frame() -> Result<()> {
	let bytes = build("guarded", "()I", &ParseOptions::default(), |code| {
		let start = code.new_bound_label();
		let end = code.new_label();
		let handler = code.new_label();
		code.int_constant(1)?
			.label_here(end)
			.return_value(TypeKind::Int)
			.label_here(handler)
			.stack(opcode::POP)
			.int_constant(2)?
			.return_value(TypeKind::Int)
			.exception_catch(start, end, handler, Some("java/lang/RuntimeException"))?;
		Ok(())
	})?;
	assert!(duke::verify(&bytes).is_empty(), "{:?}", duke::verify(&bytes));
	assert_eq!(frames(&bytes, ParseOptions::default())?, vec![
		(2, "same locals, stack java/lang/RuntimeException".to_owned()),
	]);
	Ok(())
}

#[test]
fn unreachable_code_is_replaced() -> Result<()> {
	let bytes = two_returns(&ParseOptions::default())?;
	assert!(duke::verify(&bytes).is_empty(), "{:?}", duke::verify(&bytes));
	assert_eq!(run(&bytes, "twoReturns", "()I", &[])?, 1);
	assert_eq!(instructions(&bytes)?, vec![
		Instruction::ConstantIntrinsic { opcode: opcode::ICONST_1 },
		Instruction::Return { kind: Some(TypeKind::Int) },
		Instruction::Nop,
		Instruction::Throw,
	]);
	assert_eq!(frames(&bytes, ParseOptions::default())?, vec![
		(2, "same locals, stack java/lang/Throwable".to_owned()),
	]);
	Ok(())
}

#[test]
fn unreachable_code_fails_without_patching() -> Result<()> {
	let error = two_returns(&ParseOptions::default().with_patch_dead_code(false)).unwrap_err();
	assert!(format!("{error:#}").contains("unreachable code at bytecode offset 2"), "{error:#}");
	Ok(())
}

#[test]
fn generation_can_be_turned_off() -> Result<()> {
	let bytes = check(&ParseOptions::default().with_generate_stack_maps(false))?;
	assert_eq!(frames(&bytes, ParseOptions::default())?, Vec::new());

	let errors = duke::verify(&bytes);
	assert_eq!(errors.len(), 1, "{errors:?}");
	assert_eq!(errors[0].method.as_deref(), Some("check([I)V"));
	assert_eq!(errors[0].bci, Some(6));
	assert_eq!(errors[0].message, "branch target has no stack map frame");
	Ok(())
}

#[test]
fn old_versions_need_no_frames() -> Result<()> {
	let bytes = duke::build("Old", None, |class| {
		class.with_version(49, 0);
		class.with_method("check", "([I)V", access::STATIC, |method| {
			method.with_code(|code| {
				let end = code.new_label();
				code.load(TypeKind::Reference, 0)
					.operator(opcode::ARRAYLENGTH)
					.branch(opcode::IFEQ, end)
					.nop()
					.label_here(end)
					.return_void();
				Ok(())
			})?;
			Ok(())
		})?;
		Ok(())
	})?;
	assert!(duke::verify(&bytes).is_empty(), "{:?}", duke::verify(&bytes));
	assert_eq!(frames(&bytes, ParseOptions::default())?, Vec::new());
	Ok(())
}

#[test]
fn rewritten_code_keeps_or_computes_frames() -> Result<()> {
	let bytes = check(&ParseOptions::default())?;
	let expected = frames(&bytes, ParseOptions::default())?;

	// frames read with the code are written again as they are
	let kept = duke::parse(bytes.clone(), ParseOptions::default())?
		.transform(transforming_code(code_fn(|builder, element| {
			builder.with(element);
			Ok(())
		})))?;
	assert_eq!(frames(&kept, ParseOptions::default())?, expected);

	// frames dropped while reading are computed again
	let options = ParseOptions::default().with_stack_maps(StackMapsOption::Drop);
	let computed = duke::parse(bytes, options)?
		.transform(transforming_code(code_fn(|builder, element| {
			builder.with(element);
			Ok(())
		})))?;
	assert!(duke::verify(&computed).is_empty(), "{:?}", duke::verify(&computed));
	assert_eq!(frames(&computed, ParseOptions::default())?, expected);
	Ok(())
}
