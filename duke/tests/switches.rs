use anyhow::{bail, Context, Result};
use pretty_assertions::assert_eq;
use duke::builder::CodeBuilder;
use duke::class_constants::access;
use duke::instruction::{Insn, Instruction, SwitchCase, TypeKind};
use duke::label::Label;
use duke::model::CodeElement;
use duke::options::ParseOptions;

mod common;
use common::run;

/// Builds a class with a single static method `pick(I)I` or `pick(II)I`.
fn pick(descriptor: &str, body: impl FnOnce(&mut CodeBuilder<'_, 'static>) -> Result<()>) -> Result<Vec<u8>> {
	duke::build("Switches", None, |class| {
		class.with_method("pick", descriptor, access::STATIC, |method| {
			method.with_code(body)?;
			Ok(())
		})?;
		Ok(())
	})
}

/// Returns `value` at `label`.
fn returning(code: &mut CodeBuilder<'_, '_>, label: Label, value: i32) -> Result<()> {
	code.label_here(label).int_constant(value)?.return_value(TypeKind::Int);
	Ok(())
}

fn switch_of(bytes: Vec<u8>) -> Result<Instruction> {
	let model = duke::parse(bytes, ParseOptions::default())?;
	let code = model.methods()?[0].code()?.context("no code")?;
	for element in code.elements()? {
		if let CodeElement::Instruction(Insn::Bound(instruction)) = element {
			let instruction = instruction.decode()?;
			if matches!(instruction, Instruction::TableSwitch { .. } | Instruction::LookupSwitch { .. }) {
				return Ok(instruction);
			}
		}
	}
	bail!("no switch");
}

fn table(leading_nops: usize) -> Result<Vec<u8>> {
	pick("(I)I", |code| {
		for _ in 0..leading_nops {
			code.nop();
		}
		let default = code.new_label();
		let targets: Vec<_> = (0..4).map(|_| code.new_label()).collect();
		let cases = targets.iter().enumerate()
			.map(|(value, &target)| SwitchCase { value: value as i32, target })
			.collect();
		code.load(TypeKind::Int, 0).table_switch(0, 3, default, cases);
		for (value, &target) in targets.iter().enumerate() {
			returning(code, target, value as i32 * 10 + 1)?;
		}
		returning(code, default, -1)
	})
}

fn lookup(leading_nops: usize) -> Result<Vec<u8>> {
	pick("(I)I", |code| {
		for _ in 0..leading_nops {
			code.nop();
		}
		let default = code.new_label();
		let targets: Vec<_> = (0..3).map(|_| code.new_label()).collect();
		let cases = [123_456, -1000, 7].into_iter().zip(&targets)
			.map(|(value, &target)| SwitchCase { value, target })
			.collect();
		code.load(TypeKind::Int, 0).lookup_switch(default, cases);
		for (i, &target) in targets.iter().enumerate() {
			returning(code, target, i as i32 + 1)?;
		}
		returning(code, default, 0)
	})
}

#[test]
fn padding() -> Result<()> {
	for leading_nops in 0..=4 {
		let bytes = table(leading_nops)?;
		assert!(duke::verify(&bytes).is_empty(), "{leading_nops}: {:?}", duke::verify(&bytes));
		let results = (-1..=4)
			.map(|input| run(&bytes, "pick", "(I)I", &[input]))
			.collect::<Result<Vec<_>>>()?;
		assert_eq!(results, vec![-1, 1, 11, 21, 31, -1], "{leading_nops}");

		let bytes = lookup(leading_nops)?;
		assert!(duke::verify(&bytes).is_empty(), "{leading_nops}: {:?}", duke::verify(&bytes));
		let results = [-1000, 7, 123_456, 0, 8]
			.into_iter()
			.map(|input| run(&bytes, "pick", "(I)I", &[input]))
			.collect::<Result<Vec<_>>>()?;
		assert_eq!(results, vec![2, 3, 1, 0, 0], "{leading_nops}");
	}
	Ok(())
}

#[test]
fn lookup_cases_are_sorted() -> Result<()> {
	let Instruction::LookupSwitch { cases, .. } = switch_of(lookup(1)?)? else { bail!("not a lookupswitch") };
	let values: Vec<_> = cases.iter().map(|case| case.value).collect();
	assert_eq!(values, vec![-1000, 7, 123_456]);
	Ok(())
}

/// Case `2` jumps to the default target.
fn with_default_case() -> Result<Vec<u8>> {
	pick("(I)I", |code| {
		let default = code.new_label();
		let zero = code.new_label();
		let one = code.new_label();
		let three = code.new_label();
		code.load(TypeKind::Int, 0).table_switch(0, 3, default, vec![
			SwitchCase { value: 0, target: zero },
			SwitchCase { value: 1, target: one },
			SwitchCase { value: 2, target: default },
			SwitchCase { value: 3, target: three },
		]);
		returning(code, zero, 100)?;
		returning(code, one, 101)?;
		returning(code, three, 103)?;
		returning(code, default, -1)
	})
}

fn targets(instruction: &Instruction) -> Result<(Option<u32>, Vec<(i32, Option<u32>)>)> {
	let Instruction::TableSwitch { default, cases, .. } = instruction else { bail!("not a tableswitch") };
	Ok((default.original_bci(), cases.iter().map(|case| (case.value, case.target.original_bci())).collect()))
}

#[test]
fn cases_to_the_default_are_left_out() -> Result<()> {
	let bytes = with_default_case()?;
	assert_eq!(run(&bytes, "pick", "(I)I", &[2])?, -1);
	assert_eq!(run(&bytes, "pick", "(I)I", &[3])?, 103);

	let first = switch_of(bytes.clone())?;
	let Instruction::TableSwitch { low, high, ref cases, .. } = first else { bail!("not a tableswitch") };
	assert_eq!((low, high), (0, 3));
	assert_eq!(cases.iter().map(|case| case.value).collect::<Vec<_>>(), vec![0, 1, 3]);

	// Rebuilt with a fresh constant pool, the switch comes out the same.
	let model = duke::parse(bytes, ParseOptions::default())?;
	let rebuilt = duke::build("Switches", None, |class| {
		for element in model.elements()? {
			class.with(element);
		}
		Ok(())
	})?;
	let second = switch_of(rebuilt)?;
	assert_eq!(targets(&second)?, targets(&first)?);
	Ok(())
}

/// `pick(x, y)`: the outer switch on `x` leads to inner switches on `y`, each at a different alignment.
fn nested() -> Result<Vec<u8>> {
	pick("(II)I", |code| {
		let default = code.new_label();
		let inner: Vec<_> = (0..3).map(|_| code.new_label()).collect();
		let results: Vec<_> = (0..5).map(|_| code.new_label()).collect();

		let cases = inner.iter().enumerate()
			.map(|(value, &target)| SwitchCase { value: value as i32, target })
			.collect();
		code.load(TypeKind::Int, 0).table_switch(0, 2, default, cases);

		code.label_here(inner[0]).nop().load(TypeKind::Int, 1).lookup_switch(default, vec![
			SwitchCase { value: 1, target: results[0] },
			SwitchCase { value: 2, target: results[1] },
		]);
		code.label_here(inner[1]).nop().nop().load(TypeKind::Int, 1).table_switch(0, 1, default, vec![
			SwitchCase { value: 0, target: results[2] },
			SwitchCase { value: 1, target: results[3] },
		]);
		code.label_here(inner[2]).nop().nop().nop().load(TypeKind::Int, 1).lookup_switch(default, vec![
			SwitchCase { value: 5, target: results[4] },
		]);

		for (i, &result) in results.iter().enumerate() {
			returning(code, result, (i as i32 + 1) * 11)?;
		}
		returning(code, default, -1)
	})
}

#[test]
fn nested_switches() -> Result<()> {
	let bytes = nested()?;
	assert!(duke::verify(&bytes).is_empty(), "{:?}", duke::verify(&bytes));

	let expected = |x: i32, y: i32| match (x, y) {
		(0, 1) => 11,
		(0, 2) => 22,
		(1, 0) => 33,
		(1, 1) => 44,
		(2, 5) => 55,
		_ => -1,
	};
	for x in -1..=3 {
		for y in -1..=6 {
			assert_eq!(run(&bytes, "pick", "(II)I", &[x, y])?, expected(x, y), "pick({x}, {y})");
		}
	}

	// A transform that rewrites all code doesn't change the behaviour either.
	let model = duke::parse(bytes.clone(), ParseOptions::default())?;
	let rewritten = model.transform(duke::transform::transforming_code(duke::transform::code_fn(|builder, element| {
		builder.with(element);
		Ok(())
	})))?;
	for x in -1..=3 {
		for y in -1..=6 {
			assert_eq!(run(&rewritten, "pick", "(II)I", &[x, y])?, expected(x, y), "pick({x}, {y})");
		}
	}
	Ok(())
}
