//! Interruptible duplex channels carrying decoded [`Value`]s.

use std::io;

use tracing::Dispatch;

use crate::value::Value;

mod inbox;
mod memory;
mod stream;

pub use inbox::Inbox;
pub use memory::MemoryTransport;
pub use stream::StreamTransport;

/// Outcome of a blocking [`Transport::recv`].
#[derive(Debug, Clone, PartialEq)]
pub enum Recv {
	/// A decoded message arrived.
	Message(Value),
	/// [`Transport::interrupt`] woke the receiver without a message.
	Interrupted,
	/// [`Transport::request_stop`] woke the receiver without a message.
	Stopped,
	/// The peer closed the channel and every queued message has been delivered.
	Closed,
}

/// Errors raised by a transport.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum TransportError {
	/// Reading or writing the byte stream failed.
	#[error("transport i/o error: {0}")]
	Io(#[from] io::Error),
	/// A value could not be encoded.
	#[error("failed to encode message: {0}")]
	Encode(#[from] rmp_serde::encode::Error),
	/// The byte stream did not contain a valid value.
	#[error("failed to decode message: {0}")]
	Decode(#[from] rmp_serde::decode::Error),
	/// The channel is closed.
	#[error("transport closed")]
	Closed,
}

/// A duplex message channel whose blocking receive can be interrupted from other threads.
///
/// Implementations must be usable concurrently: `send`, `interrupt` and `request_stop` are
/// called from arbitrary threads while another thread is parked in `recv`.
pub trait Transport: Send + Sync {
	/// Writes one message.
	fn send(&self, message: Value) -> Result<(), TransportError>;

	/// Blocks until a message arrives, the receiver is woken, or the channel ends.
	///
	/// A wake-up requested while nobody is receiving is reported by the next call, ahead of any
	/// queued message.
	fn recv(&self) -> Result<Recv, TransportError>;

	/// Wakes a pending or the next `recv` with [`Recv::Interrupted`].
	fn interrupt(&self);

	/// Wakes a pending or the next `recv` with [`Recv::Stopped`].
	fn request_stop(&self);

	/// Routes the transport's own log events, including those of any background threads, to
	/// `dispatch`. Called by [`crate::MessageRouter::with_logger`]. Transports that do not log
	/// keep the default no-op.
	fn attach_logger(&self, dispatch: &Dispatch) {
		let _ = dispatch;
	}
}
