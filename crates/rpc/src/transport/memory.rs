//! In-process transport pairs.

use std::sync::Arc;

use super::{Inbox, Recv, Transport, TransportError};
use crate::value::Value;

/// One end of an in-process transport pair.
///
/// Values sent on one end are received, unencoded, on the other. Closing or dropping an end
/// closes both directions: the peer sees [`Recv::Closed`] once its queue drains and its sends
/// fail with [`TransportError::Closed`].
#[derive(Debug)]
pub struct MemoryTransport {
	inbox: Arc<Inbox>,
	peer: Arc<Inbox>,
}

impl MemoryTransport {
	/// Creates two connected ends.
	#[must_use]
	pub fn pair() -> (Self, Self) {
		let a = Arc::new(Inbox::new());
		let b = Arc::new(Inbox::new());
		(
			Self {
				inbox: Arc::clone(&a),
				peer: Arc::clone(&b),
			},
			Self { inbox: b, peer: a },
		)
	}

	/// Closes both directions.
	pub fn close(&self) {
		self.peer.close();
		self.inbox.close();
	}
}

impl Transport for MemoryTransport {
	fn send(&self, message: Value) -> Result<(), TransportError> {
		if self.peer.push(message) {
			Ok(())
		} else {
			Err(TransportError::Closed)
		}
	}

	fn recv(&self) -> Result<Recv, TransportError> {
		self.inbox.recv()
	}

	fn interrupt(&self) {
		self.inbox.interrupt();
	}

	fn request_stop(&self) {
		self.inbox.request_stop();
	}
}

impl Drop for MemoryTransport {
	fn drop(&mut self) {
		self.close();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn values_cross_the_pair() {
		let (a, b) = MemoryTransport::pair();
		a.send(Value::from("ping")).unwrap();
		b.send(Value::from("pong")).unwrap();
		assert_eq!(b.recv().unwrap(), Recv::Message(Value::from("ping")));
		assert_eq!(a.recv().unwrap(), Recv::Message(Value::from("pong")));
	}

	#[test]
	fn dropping_an_end_closes_the_other() {
		let (a, b) = MemoryTransport::pair();
		a.send(Value::Nil).unwrap();
		drop(a);
		assert_eq!(b.recv().unwrap(), Recv::Message(Value::Nil));
		assert_eq!(b.recv().unwrap(), Recv::Closed);
	}

	#[test]
	fn sending_to_a_closed_peer_fails() {
		let (a, b) = MemoryTransport::pair();
		b.close();
		assert!(matches!(a.send(Value::Nil), Err(TransportError::Closed)));
	}
}
