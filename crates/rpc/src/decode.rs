//! Coercion of binary strings into text.
//!
//! Some peers transmit every string as raw bytes. When an [`Encoding`] is configured the
//! [`StringDecoder`] walks an inbound value tree and turns each [`Value::Binary`] leaf, map keys
//! included, into a [`Value::String`]. Without an encoding values pass through untouched.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Text encodings binary strings can be decoded with.
///
/// Serialized as its canonical [name](Self::name); deserialized through [`FromStr`], so config
/// files accept every spelling `parse` does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum Encoding {
	/// UTF-8.
	#[serde(rename = "utf-8")]
	Utf8,
	/// ISO-8859-1, every byte maps to the code point of the same value.
	#[serde(rename = "latin-1")]
	Latin1,
	/// 7-bit ASCII.
	#[serde(rename = "ascii")]
	Ascii,
}

impl Encoding {
	/// Canonical name of the encoding.
	pub const fn name(self) -> &'static str {
		match self {
			Self::Utf8 => "utf-8",
			Self::Latin1 => "latin-1",
			Self::Ascii => "ascii",
		}
	}

	/// Decodes `bytes`, failing or substituting U+FFFD on invalid input depending on `errors`.
	pub fn decode(self, bytes: Vec<u8>, errors: DecodeErrors) -> Result<String, DecodeError> {
		match self {
			Self::Utf8 => match String::from_utf8(bytes) {
				Ok(s) => Ok(s),
				Err(e) => match errors {
					DecodeErrors::Strict => Err(DecodeError {
						encoding: self,
						position: e.utf8_error().valid_up_to(),
						bytes: e.into_bytes(),
					}),
					DecodeErrors::Replace => Ok(String::from_utf8_lossy(e.as_bytes()).into_owned()),
				},
			},
			Self::Latin1 => Ok(bytes.iter().copied().map(char::from).collect()),
			Self::Ascii => match bytes.iter().position(|b| !b.is_ascii()) {
				None => Ok(bytes.iter().copied().map(char::from).collect()),
				Some(position) => match errors {
					DecodeErrors::Strict => Err(DecodeError {
						encoding: self,
						position,
						bytes,
					}),
					DecodeErrors::Replace => Ok(bytes
						.iter()
						.map(|&b| if b.is_ascii() { char::from(b) } else { char::REPLACEMENT_CHARACTER })
						.collect()),
				},
			},
		}
	}
}

impl fmt::Display for Encoding {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

impl FromStr for Encoding {
	type Err = UnknownEncoding;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().replace('_', "-").as_str() {
			"utf-8" | "utf8" => Ok(Self::Utf8),
			"latin-1" | "latin1" | "iso-8859-1" | "iso8859-1" => Ok(Self::Latin1),
			"ascii" | "us-ascii" => Ok(Self::Ascii),
			_ => Err(UnknownEncoding(s.to_owned())),
		}
	}
}

impl TryFrom<String> for Encoding {
	type Error = UnknownEncoding;

	fn try_from(s: String) -> Result<Self, Self::Error> {
		s.parse()
	}
}

/// An encoding name [`Encoding::from_str`] does not know.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown encoding `{0}`")]
pub struct UnknownEncoding(pub String);

/// Handling of bytes that are invalid in the configured encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodeErrors {
	/// Fail the decode.
	#[default]
	Strict,
	/// Substitute U+FFFD.
	Replace,
}

/// A binary string that is invalid in the configured encoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot decode {} bytes as {encoding}: invalid byte at position {position}", .bytes.len())]
pub struct DecodeError {
	/// Encoding that was attempted.
	pub encoding: Encoding,
	/// Offset of the first invalid byte.
	pub position: usize,
	/// The undecodable bytes.
	pub bytes: Vec<u8>,
}

/// Recursive binary-to-text converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StringDecoder {
	encoding: Option<Encoding>,
	decode_strings: bool,
	errors: DecodeErrors,
}

impl StringDecoder {
	/// Creates a decoder. `decode_strings` is the default used when callers pass no override.
	pub const fn new(encoding: Option<Encoding>, decode_strings: bool, errors: DecodeErrors) -> Self {
		Self {
			encoding,
			decode_strings,
			errors,
		}
	}

	/// Configured encoding.
	pub const fn encoding(&self) -> Option<Encoding> {
		self.encoding
	}

	/// Replaces the encoding, keeping the default flag.
	pub fn set_encoding(&mut self, encoding: Option<Encoding>) {
		self.encoding = encoding;
	}

	/// Returns true when values are coerced under the default flag.
	pub const fn is_active(&self) -> bool {
		self.encoding.is_some() && self.decode_strings
	}

	/// Decodes `value` with the default flag, or with `decode_strings` when given.
	pub fn decode(&self, value: Value, decode_strings: Option<bool>) -> Result<Value, DecodeError> {
		match self.encoding {
			Some(encoding) if decode_strings.unwrap_or(self.decode_strings) => decode_tree(value, encoding, self.errors),
			_ => Ok(value),
		}
	}
}

fn decode_tree(value: Value, encoding: Encoding, errors: DecodeErrors) -> Result<Value, DecodeError> {
	Ok(match value {
		Value::Binary(bytes) => Value::String(encoding.decode(bytes, errors)?),
		Value::Array(items) => Value::Array(
			items
				.into_iter()
				.map(|item| decode_tree(item, encoding, errors))
				.collect::<Result<_, _>>()?,
		),
		Value::Map(entries) => Value::Map(
			entries
				.into_iter()
				.map(|(k, v)| Ok((decode_tree(k, encoding, errors)?, decode_tree(v, encoding, errors)?)))
				.collect::<Result<_, DecodeError>>()?,
		),
		other => other,
	})
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	fn bin(b: &[u8]) -> Value {
		Value::from(b)
	}

	#[test]
	fn passthrough_without_encoding() {
		let decoder = StringDecoder::new(None, true, DecodeErrors::Strict);
		let value = Value::Array(vec![bin(b"x")]);
		assert_eq!(decoder.decode(value.clone(), None).unwrap(), value);
		assert_eq!(decoder.decode(value.clone(), Some(true)).unwrap(), value);
	}

	#[test]
	fn binary_leaves_become_text_and_scalars_stay() {
		let decoder = StringDecoder::new(Some(Encoding::Utf8), true, DecodeErrors::Strict);
		let value = Value::Array(vec![
			bin(b"hi"),
			Value::from(3i64),
			Value::from(1.5),
			Value::from(false),
			Value::Nil,
			Value::Map(vec![(bin(b"key"), Value::Array(vec![bin("\u{e9}".as_bytes())]))]),
		]);
		let expected = Value::Array(vec![
			Value::from("hi"),
			Value::from(3i64),
			Value::from(1.5),
			Value::from(false),
			Value::Nil,
			Value::Map(vec![(Value::from("key"), Value::Array(vec![Value::from("\u{e9}")]))]),
		]);
		assert_eq!(decoder.decode(value, None).unwrap(), expected);
	}

	#[test]
	fn per_call_flag_overrides_default() {
		let off = StringDecoder::new(Some(Encoding::Utf8), false, DecodeErrors::Strict);
		assert_eq!(off.decode(bin(b"a"), None).unwrap(), bin(b"a"));
		assert_eq!(off.decode(bin(b"a"), Some(true)).unwrap(), Value::from("a"));

		let on = StringDecoder::new(Some(Encoding::Utf8), true, DecodeErrors::Strict);
		assert_eq!(on.decode(bin(b"a"), Some(false)).unwrap(), bin(b"a"));
	}

	#[test]
	fn strict_errors_report_position() {
		let decoder = StringDecoder::new(Some(Encoding::Utf8), true, DecodeErrors::Strict);
		let err = decoder.decode(Value::Array(vec![bin(b"ok\xffno")]), None).unwrap_err();
		assert_eq!(err.position, 2);
		assert_eq!(err.encoding, Encoding::Utf8);

		let err = Encoding::Ascii.decode(b"a\x80".to_vec(), DecodeErrors::Strict).unwrap_err();
		assert_eq!(err.position, 1);
	}

	#[test]
	fn replace_mode_substitutes() {
		assert_eq!(Encoding::Utf8.decode(b"a\xffb".to_vec(), DecodeErrors::Replace).unwrap(), "a\u{fffd}b");
		assert_eq!(Encoding::Ascii.decode(b"a\xffb".to_vec(), DecodeErrors::Replace).unwrap(), "a\u{fffd}b");
	}

	#[test]
	fn latin1_maps_every_byte() {
		assert_eq!(Encoding::Latin1.decode(vec![0x63, 0x61, 0x66, 0xe9], DecodeErrors::Strict).unwrap(), "caf\u{e9}");
	}

	#[test]
	fn encoding_names_parse() {
		assert_eq!("UTF-8".parse::<Encoding>(), Ok(Encoding::Utf8));
		assert_eq!("latin1".parse::<Encoding>(), Ok(Encoding::Latin1));
		assert_eq!("iso_8859_1".parse::<Encoding>(), Ok(Encoding::Latin1));
		assert_eq!("us-ascii".parse::<Encoding>(), Ok(Encoding::Ascii));
		assert!("koi8-r".parse::<Encoding>().is_err());
	}

	#[test]
	fn serde_accepts_the_same_names_as_parse() {
		#[derive(Deserialize)]
		struct Named {
			encoding: Encoding,
		}

		for (name, expected) in [
			("UTF-8", Encoding::Utf8),
			("utf8", Encoding::Utf8),
			("iso_8859_1", Encoding::Latin1),
			("iso8859-1", Encoding::Latin1),
			("US-ASCII", Encoding::Ascii),
		] {
			let named: Named = toml::from_str(&format!("encoding = \"{name}\"")).unwrap();
			assert_eq!(named.encoding, expected, "{name}");
			assert_eq!(name.parse::<Encoding>(), Ok(expected));
		}

		let err = toml::from_str::<Named>("encoding = \"koi8-r\"").err().unwrap();
		assert!(err.to_string().contains("unknown encoding `koi8-r`"), "{err}");
	}

	#[test]
	fn serializes_canonical_name() {
		#[derive(Serialize)]
		struct Named {
			encoding: Encoding,
		}

		let text = toml::to_string(&Named { encoding: Encoding::Latin1 }).unwrap();
		assert_eq!(text.trim(), "encoding = \"latin-1\"");
	}
}
