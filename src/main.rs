use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use log::{debug, info, LevelFilter};
use duke::model::{ClassModel, CodeElement, MethodElement};
use duke::instruction::Insn;
use duke::options::{ParseOptions, StackMapsOption, UnknownAttributesOption};
use duke::transform::{class_fn, code_fn, transforming_code};

#[derive(Debug, Parser)]
struct Cli {
	/// Be verbose.
	#[arg(short = 'v', long = "verbose")]
	verbose: bool,

	#[command(flatten)]
	options: Options,

	#[command(subcommand)]
	command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
	/// Prints the contents of a class file
	Dump {
		input: PathBuf,
	},
	/// Reads a class file and writes it out again without changes
	Roundtrip {
		input: PathBuf,
		output: PathBuf,
	},
	/// Checks the structure of class files, failing if any problems are found
	Verify {
		#[arg(required = true)]
		inputs: Vec<PathBuf>,
	},
	/// Replaces every load of one int constant by a load of another
	RewriteInt {
		#[arg(long)]
		from: i32,
		#[arg(long)]
		to: i32,
		input: PathBuf,
		output: PathBuf,
	},
}

/// What to read from class files, and how to write and verify them.
///
/// Anything left out while reading is missing from the written class files too.
#[derive(Debug, clap::Args)]
struct Options {
	/// Don't read stack map frames.
	#[arg(long, global = true)]
	drop_stack_maps: bool,
	/// Don't read local variable tables.
	#[arg(long, global = true)]
	drop_debug_elements: bool,
	/// Don't read line numbers.
	#[arg(long, global = true)]
	drop_line_numbers: bool,
	/// Don't read attributes unknown to duke.
	#[arg(long, global = true)]
	drop_unknown_attributes: bool,
	/// Don't compute stack map frames for code that lacks them.
	#[arg(long, global = true)]
	no_frame_generation: bool,
	/// Fail on unreachable code instead of replacing it by `nop`s and an `athrow`.
	#[arg(long, global = true)]
	keep_dead_code: bool,
	/// Don't report branch targets without a stack map frame when verifying.
	#[arg(long, global = true)]
	skip_frame_verification: bool,
}

impl Options {
	fn parse_options(&self) -> ParseOptions {
		ParseOptions::default()
			.with_stack_maps(if self.drop_stack_maps { StackMapsOption::Drop } else { StackMapsOption::Keep })
			.with_debug_elements(!self.drop_debug_elements)
			.with_line_numbers(!self.drop_line_numbers)
			.with_unknown_attributes(if self.drop_unknown_attributes {
				UnknownAttributesOption::Drop
			} else {
				UnknownAttributesOption::Pass
			})
			.with_generate_stack_maps(!self.no_frame_generation)
			.with_patch_dead_code(!self.keep_dead_code)
			.with_verify_stack_maps(!self.skip_frame_verification)
	}
}

fn setup_logging(verbose: bool) -> Result<()> {
	fern::Dispatch::new()
		.format(|out, message, record| {
			out.finish(format_args!("[{} {}] {}", record.level(), record.target(), message))
		})
		.level(if verbose { LevelFilter::Debug } else { LevelFilter::Info })
		.chain(std::io::stderr())
		.apply()
		.context("failed to set up logging")
}

fn read(path: &Path) -> Result<Vec<u8>> {
	let mut bytes = Vec::new();
	File::open(path)
		.and_then(|mut file| file.read_to_end(&mut bytes))
		.with_context(|| anyhow!("failed to read {path:?}"))?;
	Ok(bytes)
}

fn write(path: &Path, bytes: &[u8]) -> Result<()> {
	File::create(path)
		.and_then(|mut file| file.write_all(bytes))
		.with_context(|| anyhow!("failed to write {path:?}"))
}

fn parse(path: &Path, options: &ParseOptions) -> Result<ClassModel> {
	duke::parse(read(path)?, options.clone())
		.with_context(|| anyhow!("failed to parse class file {path:?}"))
}

fn main() -> Result<()> {
	let Cli { verbose, options, command } = Cli::parse();
	setup_logging(verbose)?;
	debug!("running {command:?}");
	let options = options.parse_options();

	match command {
		Command::Dump { input } => dump(&parse(&input, &options)?),
		Command::Roundtrip { input, output } => {
			let model = parse(&input, &options)?;
			let bytes = model.transform(class_fn(|builder, element| {
				builder.with(element);
				Ok(())
			}))?;
			if bytes == model.reader().bytes() {
				info!("{input:?} was written out unchanged");
			} else {
				info!("{input:?} changed while being written out");
			}
			write(&output, &bytes)
		},
		Command::Verify { inputs } => {
			let mut failed = 0;
			for input in &inputs {
				let errors = duke::verify_with(&read(input)?, &options);
				for error in &errors {
					println!("{}: {error}", input.display());
				}
				if !errors.is_empty() {
					failed += 1;
				}
			}
			if failed > 0 {
				bail!("{failed} of {} class files failed verification", inputs.len());
			}
			info!("all {} class files passed verification", inputs.len());
			Ok(())
		},
		Command::RewriteInt { from, to, input, output } => {
			let model = parse(&input, &options)?;
			let mut replaced = 0;
			let bytes = model.transform(transforming_code(code_fn(|builder, element| {
				if let CodeElement::Instruction(insn) = &element {
					if insn.as_int_constant() == Some(from) {
						builder.int_constant(to)?;
						replaced += 1;
						return Ok(());
					}
				}
				builder.with(element);
				Ok(())
			})))?;
			info!("replaced {replaced} loads of {from} by {to}");
			write(&output, &bytes)
		},
	}
}

fn dump(model: &ClassModel) -> Result<()> {
	let reader = model.reader();
	println!("class {:?}", model.this_class()?.as_class_name()?);
	println!("  version {}.{}", reader.major_version(), reader.minor_version());
	println!("  flags {:#06x}", model.access_flags());
	if let Some(super_class) = model.super_class()? {
		println!("  extends {:?}", super_class.as_class_name()?);
	}
	for interface in model.interfaces()? {
		println!("  implements {:?}", interface.as_class_name()?);
	}

	for field in model.fields()? {
		println!();
		println!("field {:?} {:?}", field.name().as_utf8()?, field.descriptor().as_utf8()?);
		println!("  flags {:#06x}", field.flags());
	}

	for method in model.methods()? {
		println!();
		println!("method {:?}{:?}", method.name().as_utf8()?, method.descriptor().as_utf8()?);
		println!("  flags {:#06x}", method.flags());
		for element in method.elements()? {
			match element {
				MethodElement::AccessFlags(_) => {},
				MethodElement::Attribute(attribute) => println!("  attribute {attribute:?}"),
				MethodElement::Code(code) => {
					println!("  code, max stack {:?}, max locals {:?}", code.max_stack(), code.max_locals());
					for element in code.elements()? {
						match element {
							CodeElement::Instruction(Insn::Bound(instruction)) => {
								println!("    {:>5}: {:?}", instruction.bci(), instruction.decode()?);
							},
							element => println!("           {element:?}"),
						}
					}
				},
			}
		}
	}

	let attributes = model.attributes()?;
	if !attributes.is_empty() {
		println!();
	}
	for attribute in attributes {
		println!("attribute {attribute:?}");
	}
	Ok(())
}
