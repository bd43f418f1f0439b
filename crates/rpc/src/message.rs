//! Wire messages and their mapping to and from [`Value`] arrays.

use std::fmt;

use crate::error::ProtocolError;
use crate::value::Value;

/// Kind tag carried in the first slot of every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
	/// `[0, id, method, args]`
	Request = 0,
	/// `[1, id, error, result]`
	Response = 1,
	/// `[2, event, args]`
	Notification = 2,
}

impl MessageKind {
	/// Parses a kind tag.
	pub fn from_tag(tag: &Value) -> Option<Self> {
		match tag.as_u64()? {
			0 => Some(Self::Request),
			1 => Some(Self::Response),
			2 => Some(Self::Notification),
			_ => None,
		}
	}

	const fn arity(self) -> usize {
		match self {
			Self::Request | Self::Response => 4,
			Self::Notification => 3,
		}
	}

	pub(crate) const fn as_str(self) -> &'static str {
		match self {
			Self::Request => "request",
			Self::Response => "response",
			Self::Notification => "notification",
		}
	}
}

impl fmt::Display for MessageKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// An outgoing or incoming call expecting exactly one [`Response`].
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
	/// Correlation id, unique among the sender's outstanding requests.
	pub id: u64,
	/// Method name.
	pub method: String,
	/// Positional arguments.
	pub args: Vec<Value>,
}

/// The answer to a [`Request`]. At most one of `error` and `result` is set.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
	/// Id of the request being answered.
	pub id: u64,
	/// Error payload, if the call failed.
	pub error: Option<Value>,
	/// Result payload. Absent for failed calls and for calls returning `nil`.
	pub result: Option<Value>,
}

impl Response {
	/// Creates a successful response.
	#[must_use]
	pub const fn ok(id: u64, result: Value) -> Self {
		Self {
			id,
			error: None,
			result: Some(result),
		}
	}

	/// Creates an error response.
	#[must_use]
	pub const fn err(id: u64, error: Value) -> Self {
		Self {
			id,
			error: Some(error),
			result: None,
		}
	}
}

/// A one-way event.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
	/// Event name.
	pub event: String,
	/// Positional arguments.
	pub args: Vec<Value>,
}

/// A classified RPC message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
	/// An incoming or outgoing request.
	Request(Request),
	/// A response to an earlier request.
	Response(Response),
	/// A notification.
	Notification(Notification),
}

impl Message {
	/// Returns the kind tag of this message.
	pub const fn kind(&self) -> MessageKind {
		match self {
			Self::Request(_) => MessageKind::Request,
			Self::Response(_) => MessageKind::Response,
			Self::Notification(_) => MessageKind::Notification,
		}
	}
}

impl From<Request> for Message {
	fn from(req: Request) -> Self {
		Self::Request(req)
	}
}

impl From<Response> for Message {
	fn from(resp: Response) -> Self {
		Self::Response(resp)
	}
}

impl From<Notification> for Message {
	fn from(notif: Notification) -> Self {
		Self::Notification(notif)
	}
}

impl From<Message> for Value {
	fn from(msg: Message) -> Self {
		let kind = Value::Integer(msg.kind() as i64);
		let fields = match msg {
			Message::Request(Request { id, method, args }) => {
				vec![kind, Value::from(id), Value::String(method), Value::Array(args)]
			}
			Message::Response(Response { id, error, result }) => {
				vec![kind, Value::from(id), Value::from(error), Value::from(result)]
			}
			Message::Notification(Notification { event, args }) => {
				vec![kind, Value::String(event), Value::Array(args)]
			}
		};
		Value::Array(fields)
	}
}

impl TryFrom<Value> for Message {
	type Error = ProtocolError;

	fn try_from(value: Value) -> Result<Self, Self::Error> {
		let Value::Array(fields) = value else {
			return Err(ProtocolError::NotAnArray(value));
		};
		let Some(kind) = fields.first().and_then(MessageKind::from_tag) else {
			return Err(ProtocolError::InvalidKind(fields.into_iter().next().unwrap_or_default()));
		};
		if fields.len() != kind.arity() {
			return Err(ProtocolError::Arity {
				kind,
				len: fields.len(),
				expected: kind.arity(),
			});
		}

		let mut fields = fields.into_iter().skip(1);
		let mut next = || fields.next().unwrap_or_default();
		let msg = match kind {
			MessageKind::Request => Self::Request(Request {
				id: id_field(kind, next())?,
				method: name_field(kind, "method", next())?,
				args: args_field(kind, next())?,
			}),
			MessageKind::Response => Self::Response(Response {
				id: id_field(kind, next())?,
				error: optional(next()),
				result: optional(next()),
			}),
			MessageKind::Notification => Self::Notification(Notification {
				event: name_field(kind, "event", next())?,
				args: args_field(kind, next())?,
			}),
		};
		Ok(msg)
	}
}

fn id_field(kind: MessageKind, value: Value) -> Result<u64, ProtocolError> {
	value.as_u64().ok_or(ProtocolError::InvalidField {
		kind,
		field: "id",
		value,
	})
}

/// Names not already coerced to text by the string decoder are read as UTF-8.
fn name_field(kind: MessageKind, field: &'static str, value: Value) -> Result<String, ProtocolError> {
	match value {
		Value::String(s) => Ok(s),
		Value::Binary(bytes) => String::from_utf8(bytes).map_err(|e| ProtocolError::InvalidField {
			kind,
			field,
			value: Value::Binary(e.into_bytes()),
		}),
		value => Err(ProtocolError::InvalidField { kind, field, value }),
	}
}

fn args_field(kind: MessageKind, value: Value) -> Result<Vec<Value>, ProtocolError> {
	match value {
		Value::Array(args) => Ok(args),
		value => Err(ProtocolError::InvalidField {
			kind,
			field: "args",
			value,
		}),
	}
}

fn optional(value: Value) -> Option<Value> {
	(!value.is_nil()).then_some(value)
}
