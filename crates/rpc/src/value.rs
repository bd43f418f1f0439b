//! Dynamically typed MessagePack values.

use std::fmt;

use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A decoded MessagePack value.
///
/// Text and binary strings are kept apart: peers that predate the `str`/`bin` split send text
/// as [`Value::Binary`], which [`crate::StringDecoder`] can coerce after the fact.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
	/// `nil`.
	#[default]
	Nil,
	/// A boolean.
	Boolean(bool),
	/// Any integer representable as `i64`.
	Integer(i64),
	/// Unsigned integers above `i64::MAX`.
	UInteger(u64),
	/// A 32 or 64 bit float, widened to `f64`.
	Float(f64),
	/// A UTF-8 text string.
	String(String),
	/// A raw byte string.
	Binary(Vec<u8>),
	/// An array.
	Array(Vec<Value>),
	/// A map, in wire order. Keys may be any value.
	Map(Vec<(Value, Value)>),
	/// An extension type: application-defined tag and opaque payload. Editors use these for
	/// object handles such as buffers and windows.
	Ext(i8, Vec<u8>),
}

impl Value {
	/// Returns true for [`Value::Nil`].
	pub const fn is_nil(&self) -> bool {
		matches!(self, Self::Nil)
	}

	/// Returns the value as `u64` if it is a non-negative integer.
	pub fn as_u64(&self) -> Option<u64> {
		match *self {
			Self::Integer(i) => u64::try_from(i).ok(),
			Self::UInteger(u) => Some(u),
			_ => None,
		}
	}

	/// Returns the value as `i64` if it is an integer that fits.
	pub fn as_i64(&self) -> Option<i64> {
		match *self {
			Self::Integer(i) => Some(i),
			Self::UInteger(u) => i64::try_from(u).ok(),
			_ => None,
		}
	}

	/// Returns the text of a [`Value::String`].
	pub fn as_str(&self) -> Option<&str> {
		match self {
			Self::String(s) => Some(s),
			_ => None,
		}
	}

	/// Returns the bytes of a [`Value::Binary`].
	pub fn as_bytes(&self) -> Option<&[u8]> {
		match self {
			Self::Binary(b) => Some(b),
			_ => None,
		}
	}

	/// Returns the tag and payload of a [`Value::Ext`].
	pub fn as_ext(&self) -> Option<(i8, &[u8])> {
		match self {
			Self::Ext(tag, data) => Some((*tag, data)),
			_ => None,
		}
	}

	/// Returns the elements of a [`Value::Array`].
	pub fn as_array(&self) -> Option<&[Value]> {
		match self {
			Self::Array(items) => Some(items),
			_ => None,
		}
	}
}

impl fmt::Display for Value {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Nil => f.write_str("nil"),
			Self::Boolean(b) => write!(f, "{b}"),
			Self::Integer(i) => write!(f, "{i}"),
			Self::UInteger(u) => write!(f, "{u}"),
			Self::Float(x) => write!(f, "{x}"),
			Self::String(s) => write!(f, "{s:?}"),
			Self::Binary(b) => write!(f, "b\"{}\"", b.escape_ascii()),
			Self::Array(items) => {
				f.write_str("[")?;
				for (i, item) in items.iter().enumerate() {
					if i > 0 {
						f.write_str(", ")?;
					}
					write!(f, "{item}")?;
				}
				f.write_str("]")
			}
			Self::Map(entries) => {
				f.write_str("{")?;
				for (i, (k, v)) in entries.iter().enumerate() {
					if i > 0 {
						f.write_str(", ")?;
					}
					write!(f, "{k}: {v}")?;
				}
				f.write_str("}")
			}
			Self::Ext(tag, data) => write!(f, "ext({tag}, b\"{}\")", data.escape_ascii()),
		}
	}
}

impl From<bool> for Value {
	fn from(b: bool) -> Self {
		Self::Boolean(b)
	}
}

impl From<i64> for Value {
	fn from(i: i64) -> Self {
		Self::Integer(i)
	}
}

impl From<i32> for Value {
	fn from(i: i32) -> Self {
		Self::Integer(i64::from(i))
	}
}

impl From<u32> for Value {
	fn from(u: u32) -> Self {
		Self::Integer(i64::from(u))
	}
}

impl From<u64> for Value {
	fn from(u: u64) -> Self {
		i64::try_from(u).map_or(Self::UInteger(u), Self::Integer)
	}
}

impl From<f64> for Value {
	fn from(x: f64) -> Self {
		Self::Float(x)
	}
}

impl From<&str> for Value {
	fn from(s: &str) -> Self {
		Self::String(s.to_owned())
	}
}

impl From<String> for Value {
	fn from(s: String) -> Self {
		Self::String(s)
	}
}

impl From<&[u8]> for Value {
	fn from(b: &[u8]) -> Self {
		Self::Binary(b.to_vec())
	}
}

impl From<Vec<u8>> for Value {
	fn from(b: Vec<u8>) -> Self {
		Self::Binary(b)
	}
}

impl From<Vec<Value>> for Value {
	fn from(items: Vec<Value>) -> Self {
		Self::Array(items)
	}
}

impl<T: Into<Value>> From<Option<T>> for Value {
	fn from(v: Option<T>) -> Self {
		v.map_or(Self::Nil, Into::into)
	}
}

impl Serialize for Value {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		match self {
			Self::Nil => serializer.serialize_unit(),
			Self::Boolean(b) => serializer.serialize_bool(*b),
			Self::Integer(i) => serializer.serialize_i64(*i),
			Self::UInteger(u) => serializer.serialize_u64(*u),
			Self::Float(x) => serializer.serialize_f64(*x),
			Self::String(s) => serializer.serialize_str(s),
			Self::Binary(b) => serializer.serialize_bytes(b),
			Self::Array(items) => {
				let mut seq = serializer.serialize_seq(Some(items.len()))?;
				for item in items {
					seq.serialize_element(item)?;
				}
				seq.end()
			}
			Self::Map(entries) => {
				let mut map = serializer.serialize_map(Some(entries.len()))?;
				for (k, v) in entries {
					map.serialize_entry(k, v)?;
				}
				map.end()
			}
			Self::Ext(tag, data) => serializer.serialize_newtype_struct(EXT_STRUCT_NAME, &(tag, RawBytes(data))),
		}
	}
}

/// Newtype name rmp-serde maps to and from MessagePack ext types.
const EXT_STRUCT_NAME: &str = "_ExtStruct";

/// Serializes as a byte string rather than a sequence.
struct RawBytes<'a>(&'a [u8]);

impl Serialize for RawBytes<'_> {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_bytes(self.0)
	}
}

/// Reads the `(tag, payload)` pair rmp-serde presents for an ext type.
struct ExtVisitor;

impl<'de> Visitor<'de> for ExtVisitor {
	type Value = Value;

	fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("a MessagePack ext tag and payload")
	}

	fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
		let Some(tag) = seq.next_element::<i8>()? else {
			return Err(de::Error::invalid_length(0, &self));
		};
		match seq.next_element()? {
			Some(Value::Binary(data)) => Ok(Value::Ext(tag, data)),
			Some(other) => Err(de::Error::invalid_type(de::Unexpected::Other(&other.to_string()), &self)),
			None => Err(de::Error::invalid_length(1, &self)),
		}
	}
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
	type Value = Value;

	fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("any MessagePack value")
	}

	fn visit_unit<E>(self) -> Result<Value, E> {
		Ok(Value::Nil)
	}

	fn visit_none<E>(self) -> Result<Value, E> {
		Ok(Value::Nil)
	}

	fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Value, D::Error> {
		Value::deserialize(deserializer)
	}

	fn visit_bool<E>(self, b: bool) -> Result<Value, E> {
		Ok(Value::Boolean(b))
	}

	fn visit_i64<E>(self, i: i64) -> Result<Value, E> {
		Ok(Value::Integer(i))
	}

	fn visit_u64<E>(self, u: u64) -> Result<Value, E> {
		Ok(Value::from(u))
	}

	fn visit_f32<E>(self, x: f32) -> Result<Value, E> {
		Ok(Value::Float(f64::from(x)))
	}

	fn visit_f64<E>(self, x: f64) -> Result<Value, E> {
		Ok(Value::Float(x))
	}

	fn visit_str<E>(self, s: &str) -> Result<Value, E> {
		Ok(Value::String(s.to_owned()))
	}

	fn visit_string<E>(self, s: String) -> Result<Value, E> {
		Ok(Value::String(s))
	}

	fn visit_bytes<E>(self, b: &[u8]) -> Result<Value, E> {
		Ok(Value::Binary(b.to_vec()))
	}

	fn visit_byte_buf<E>(self, b: Vec<u8>) -> Result<Value, E> {
		Ok(Value::Binary(b))
	}

	fn visit_newtype_struct<D: Deserializer<'de>>(self, deserializer: D) -> Result<Value, D::Error> {
		deserializer.deserialize_any(ExtVisitor)
	}

	fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
		let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0).min(4096));
		while let Some(item) = seq.next_element()? {
			items.push(item);
		}
		Ok(Value::Array(items))
	}

	fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Value, A::Error> {
		let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0).min(4096));
		while let Some(entry) = map.next_entry()? {
			entries.push(entry);
		}
		Ok(Value::Map(entries))
	}
}

impl<'de> Deserialize<'de> for Value {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		deserializer.deserialize_any(ValueVisitor)
	}
}
