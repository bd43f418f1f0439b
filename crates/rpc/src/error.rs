//! Error types shared by the router and its message codec.

use crate::decode::DecodeError;
use crate::message::MessageKind;
use crate::transport::TransportError;
use crate::value::Value;

/// A convenient type alias for `Result` with `E` = [`enum@crate::Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Possible errors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// The peer sent something that is not a well-formed RPC message.
	#[error("protocol error: {0}")]
	Protocol(#[from] ProtocolError),
	/// A binary string could not be converted with the configured encoding.
	#[error("{0}")]
	Decode(#[from] DecodeError),
	/// The underlying channel failed to send or receive.
	#[error("{0}")]
	Transport(#[from] TransportError),
	/// The peer closed the connection while requests were still awaiting a response. Their
	/// callbacks will never run.
	#[error("peer closed the connection with {pending} request(s) awaiting a response")]
	PeerClosed {
		/// Number of unanswered outgoing requests.
		pending: usize,
	},
}

/// Violations of the message shape.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProtocolError {
	/// Messages are arrays; this was some other value.
	#[error("message is not an array: {0}")]
	NotAnArray(Value),
	/// The leading kind tag is missing or not one of request, response or notification.
	#[error("received invalid message kind {0}")]
	InvalidKind(Value),
	/// The array has the wrong number of elements for its kind.
	#[error("{kind} message has {len} elements, expected {expected}")]
	Arity {
		/// Kind of the malformed message.
		kind: MessageKind,
		/// Number of elements received.
		len: usize,
		/// Number of elements the kind requires.
		expected: usize,
	},
	/// A field has the wrong type.
	#[error("{kind} message field `{field}` is invalid: {value}")]
	InvalidField {
		/// Kind of the malformed message.
		kind: MessageKind,
		/// Name of the offending field.
		field: &'static str,
		/// The value found in its place.
		value: Value,
	},
}
