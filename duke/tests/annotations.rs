use anyhow::{bail, Context, Result};
use pretty_assertions::assert_eq;
use duke::attribute::{
	Annotation, Attribute, ElementValue, ElementValuePair, TypeAnnotation, TypeAnnotationTarget, TypePathEntry,
	UnboundAttribute,
};
use duke::class_constants::access;
use duke::model::{ClassModel, MethodElement};
use duke::options::ParseOptions;
use duke::pool::EntryValue;

/// `@interface Retry { int times() default 3; }`, annotated with `@Documented` and its method with
/// `@Deprecated(since = "1.2")`, the single parameter of `retry` annotated with `@Named(value = @Tag(LOUD))`.
fn annotated() -> Result<Vec<u8>> {
	duke::build("Retry", None, |class| {
		// pushes the entries to indices a fresh pool doesn't use
		class.pool().utf8("filler")?;
		class.pool().long_entry(1)?;
		class.with_flags(access::PUBLIC | access::INTERFACE | access::ABSTRACT | access::ANNOTATION)
			.with_interfaces(&["java/lang/annotation/Annotation"])?;

		let documented = Annotation { type_descriptor: class.pool().utf8("Ljava/lang/annotation/Documented;")?, elements: Vec::new() };
		class.with_attribute(UnboundAttribute::RuntimeVisibleAnnotations { annotations: vec![documented] });
		let type_annotation = TypeAnnotation {
			target: TypeAnnotationTarget::Supertype { index: 0 },
			target_path: vec![TypePathEntry { kind: 3, argument_index: 0 }],
			annotation: Annotation { type_descriptor: class.pool().utf8("LNonNull;")?, elements: Vec::new() },
		};
		class.with_attribute(UnboundAttribute::RuntimeInvisibleTypeAnnotations { annotations: vec![type_annotation] });

		class.with_method("times", "()I", access::PUBLIC | access::ABSTRACT, |method| {
			let value = ElementValue::Constant { tag: b'I', value: method.pool().int_entry(3)? };
			method.with_attribute(UnboundAttribute::AnnotationDefault { value });
			let deprecated = Annotation {
				type_descriptor: method.pool().utf8("Ljava/lang/Deprecated;")?,
				elements: vec![ElementValuePair {
					name: method.pool().utf8("since")?,
					value: ElementValue::Constant { tag: b's', value: method.pool().utf8("1.2")? },
				}],
			};
			method.with_attribute(UnboundAttribute::RuntimeVisibleAnnotations { annotations: vec![deprecated] });
			Ok(())
		})?;
		class.with_method("retry", "(Ljava/lang/String;)V", access::PUBLIC | access::ABSTRACT, |method| {
			let tag = Annotation {
				type_descriptor: method.pool().utf8("LTag;")?,
				elements: vec![ElementValuePair {
					name: method.pool().utf8("value")?,
					value: ElementValue::Enum {
						type_descriptor: method.pool().utf8("LVolume;")?,
						constant_name: method.pool().utf8("LOUD")?,
					},
				}],
			};
			let named = Annotation {
				type_descriptor: method.pool().utf8("LNamed;")?,
				elements: vec![ElementValuePair {
					name: method.pool().utf8("value")?,
					value: ElementValue::Array(vec![
						ElementValue::Annotation(tag),
						ElementValue::Class { return_descriptor: method.pool().utf8("V")? },
					]),
				}],
			};
			method.with_attribute(UnboundAttribute::RuntimeInvisibleParameterAnnotations { parameters: vec![vec![named]] });
			Ok(())
		})?;
		Ok(())
	})
}

fn utf8(entry: &duke::pool::PoolEntry) -> Result<String> {
	Ok(entry.as_utf8()?.to_string())
}

fn describe_value(value: &ElementValue) -> Result<String> {
	Ok(match value {
		ElementValue::Constant { tag: b's', value } => format!("s{:?}", utf8(value)?),
		ElementValue::Constant { tag, value } => match value.value() {
			EntryValue::Integer(value) => format!("{}{value}", *tag as char),
			other => bail!("unexpected constant {other:?}"),
		},
		ElementValue::Enum { type_descriptor, constant_name } => format!("{}.{}", utf8(type_descriptor)?, utf8(constant_name)?),
		ElementValue::Class { return_descriptor } => format!("{}.class", utf8(return_descriptor)?),
		ElementValue::Annotation(annotation) => describe(annotation)?,
		ElementValue::Array(values) => {
			format!("[{}]", values.iter().map(describe_value).collect::<Result<Vec<_>>>()?.join(", "))
		},
	})
}

fn describe(annotation: &Annotation) -> Result<String> {
	let elements = annotation.elements.iter()
		.map(|pair| Ok(format!("{} = {}", utf8(&pair.name)?, describe_value(&pair.value)?)))
		.collect::<Result<Vec<_>>>()?;
	Ok(format!("@{}({})", utf8(&annotation.type_descriptor)?, elements.join(", ")))
}

fn describe_attribute(attribute: &Attribute) -> Result<String> {
	let all = |annotations: &[Annotation]| -> Result<String> {
		Ok(annotations.iter().map(describe).collect::<Result<Vec<_>>>()?.join(" "))
	};
	Ok(match attribute.decode()? {
		UnboundAttribute::RuntimeVisibleAnnotations { annotations } => format!("visible {}", all(annotations)?),
		UnboundAttribute::RuntimeInvisibleParameterAnnotations { parameters } => {
			let parameters = parameters.iter().map(|annotations| all(annotations)).collect::<Result<Vec<_>>>()?;
			format!("invisible parameters [{}]", parameters.join("; "))
		},
		UnboundAttribute::RuntimeInvisibleTypeAnnotations { annotations } => {
			let annotations = annotations.iter()
				.map(|annotation| Ok(format!(
					"{:?} {:?} {}", annotation.target, annotation.target_path, describe(&annotation.annotation)?,
				)))
				.collect::<Result<Vec<_>>>()?;
			format!("invisible types {}", annotations.join(" "))
		},
		UnboundAttribute::AnnotationDefault { value } => format!("default {}", describe_value(value)?),
		other => bail!("unexpected attribute {:?}", other.name()),
	})
}

/// All annotation attributes, class ones first, then those of each method in order.
fn annotations_of(model: &ClassModel) -> Result<Vec<String>> {
	let mut found = Vec::new();
	for attribute in model.attributes()? {
		found.push(describe_attribute(&attribute)?);
	}
	for method in model.methods()? {
		for element in method.elements()? {
			if let MethodElement::Attribute(attribute) = element {
				found.push(format!("{}: {}", method.name().as_utf8()?, describe_attribute(&attribute)?));
			}
		}
	}
	Ok(found)
}

#[test]
fn annotations_are_read() -> Result<()> {
	let model = duke::parse(annotated()?, ParseOptions::default())?;
	assert_eq!(annotations_of(&model)?, vec![
		"visible @Ljava/lang/annotation/Documented;()".to_owned(),
		"invisible types Supertype { index: 0 } [TypePathEntry { kind: 3, argument_index: 0 }] @LNonNull;()".to_owned(),
		"times: default I3".to_owned(),
		"times: visible @Ljava/lang/Deprecated;(since = s\"1.2\")".to_owned(),
		"retry: invisible parameters [@LNamed;(value = [@LTag;(value = LVolume;.LOUD), V.class])]".to_owned(),
	]);
	Ok(())
}

#[test]
fn annotations_survive_a_fresh_pool() -> Result<()> {
	let bytes = annotated()?;
	let model = duke::parse(bytes.clone(), ParseOptions::default())?;
	let copy = duke::build("Retry", None, |class| {
		for element in model.elements()? {
			class.with(element);
		}
		Ok(())
	})?;
	assert_ne!(copy, bytes);

	let copied = duke::parse(copy, ParseOptions::default())?;
	assert_eq!(annotations_of(&copied)?, annotations_of(&model)?);
	let default = copied.methods()?.into_iter()
		.find(|method| method.is("times", "()I"))
		.context("no method times()I")?;
	for element in default.elements()? {
		if let MethodElement::Attribute(Attribute::Bound(bound)) = element {
			assert!(bound.is_known(), "{:?} isn't known", bound.name());
		}
	}
	Ok(())
}

#[test]
fn unknown_element_value_tag_fails() -> Result<()> {
	let bytes = duke::build("Broken", None, |class| {
		let name = class.pool().utf8("LBroken;")?;
		let [high, low] = name.index().to_be_bytes();
		// one annotation, with one element whose value has the tag `x`
		let body = vec![0, 1, high, low, 0, 1, high, low, b'x', 0, 0];
		class.with_attribute(UnboundAttribute::unknown("RuntimeVisibleAnnotations", body));
		Ok(())
	})?;
	let model = duke::parse(bytes, ParseOptions::default())?;
	let attributes = model.attributes()?;
	let error = attributes[0].decode().unwrap_err();
	assert!(format!("{error:#}").contains("unknown element value tag 0x78"), "{error:#}");
	Ok(())
}
