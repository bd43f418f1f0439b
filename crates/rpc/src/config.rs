//! Router configuration.

use serde::{Deserialize, Serialize};

use crate::decode::{DecodeErrors, Encoding, StringDecoder};

/// Configuration for a [`crate::MessageRouter`].
///
/// All fields have defaults so the struct can be embedded in a larger config file:
///
/// ```toml
/// encoding = "utf-8"
/// decode_strings = true
/// decode_errors = "replace"
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RouterConfig {
	/// Encoding used to coerce inbound binary strings. `None` disables coercion entirely.
	pub encoding: Option<Encoding>,
	/// Whether inbound values are coerced by default. Individual calls to
	/// [`crate::MessageRouter::decode_value`] may override it.
	pub decode_strings: bool,
	/// What to do with bytes that are invalid in `encoding`.
	pub decode_errors: DecodeErrors,
}

impl RouterConfig {
	/// Configuration decoding every inbound binary string with `encoding`.
	pub const fn decoding(encoding: Encoding) -> Self {
		Self {
			encoding: Some(encoding),
			decode_strings: true,
			decode_errors: DecodeErrors::Strict,
		}
	}

	/// Sets the invalid-input policy.
	pub const fn decode_errors(mut self, errors: DecodeErrors) -> Self {
		self.decode_errors = errors;
		self
	}

	pub(crate) const fn decoder(&self) -> StringDecoder {
		StringDecoder::new(self.encoding, self.decode_strings, self.decode_errors)
	}
}
