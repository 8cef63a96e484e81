//! Methods for converting the string format used in the Java Virtual Machine Specification to and from
//! rust strings.
//!
//! The Java Virtual Machine Specification's string format is using a 2x3-format and storing `\0`
//! using two bytes.
//!
//! See <https://docs.oracle.com/javase/specs/jvms/se22/html/jvms-4.html#jvms-4.4.7> for the complete specification of
//! the string format used in the Java Virtual Machine Specification.

use std::borrow::Cow;
use anyhow::{anyhow, Context, Result};
use java_string::{JavaStr, JavaString};

/// Reads the contents of an `CONSTANT_Utf8_info` into a [`JavaString`].
pub(crate) fn from_bytes(bytes: &[u8]) -> Result<JavaString> {
	JavaString::from_modified_utf8(bytes.to_vec())
		.with_context(|| anyhow!("invalid java utf8 contents"))
}

/// Encodes a string the way `CONSTANT_Utf8_info` stores it.
pub(crate) fn to_bytes(string: &JavaStr) -> Cow<[u8]> {
	string.to_modified_utf8()
}
