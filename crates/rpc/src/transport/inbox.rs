//! Blocking mailbox behind the bundled transports' `recv`.

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

use super::{Recv, TransportError};
use crate::value::Value;

#[derive(Default)]
struct InboxState {
	queue: VecDeque<Value>,
	interrupted: bool,
	stop_requested: bool,
	closed: bool,
	failure: Option<TransportError>,
}

/// Blocking receive side shared by the bundled transports.
///
/// Producers push decoded values; a single consumer parks in [`Inbox::recv`]. Wake-up requests
/// are sticky until reported and take priority over queued values.
#[derive(Default)]
pub struct Inbox {
	state: Mutex<InboxState>,
	ready: Condvar,
}

impl std::fmt::Debug for Inbox {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let state = self.state.lock();
		f.debug_struct("Inbox")
			.field("queued", &state.queue.len())
			.field("interrupted", &state.interrupted)
			.field("stop_requested", &state.stop_requested)
			.field("closed", &state.closed)
			.finish_non_exhaustive()
	}
}

impl Inbox {
	/// Creates an empty, open inbox.
	pub fn new() -> Self {
		Self::default()
	}

	/// Queues a value. Returns false if the inbox is closed and the value was dropped.
	pub fn push(&self, value: Value) -> bool {
		let mut state = self.state.lock();
		if state.closed {
			return false;
		}
		state.queue.push_back(value);
		drop(state);
		self.ready.notify_one();
		true
	}

	/// Requests that the receiver return [`Recv::Interrupted`].
	pub fn interrupt(&self) {
		self.state.lock().interrupted = true;
		self.ready.notify_one();
	}

	/// Requests that the receiver return [`Recv::Stopped`].
	pub fn request_stop(&self) {
		self.state.lock().stop_requested = true;
		self.ready.notify_one();
	}

	/// Closes the inbox. Queued values are still delivered before [`Recv::Closed`].
	pub fn close(&self) {
		self.state.lock().closed = true;
		self.ready.notify_one();
	}

	/// Closes the inbox with an error, reported once after the queued values.
	pub fn fail(&self, error: TransportError) {
		let mut state = self.state.lock();
		state.closed = true;
		state.failure = Some(error);
		drop(state);
		self.ready.notify_one();
	}

	/// Returns true once [`Inbox::close`] or [`Inbox::fail`] was called.
	pub fn is_closed(&self) -> bool {
		self.state.lock().closed
	}

	/// Blocks until something can be reported.
	pub fn recv(&self) -> Result<Recv, TransportError> {
		let mut state = self.state.lock();
		loop {
			if std::mem::take(&mut state.stop_requested) {
				return Ok(Recv::Stopped);
			}
			if std::mem::take(&mut state.interrupted) {
				return Ok(Recv::Interrupted);
			}
			if let Some(value) = state.queue.pop_front() {
				return Ok(Recv::Message(value));
			}
			if let Some(error) = state.failure.take() {
				return Err(error);
			}
			if state.closed {
				return Ok(Recv::Closed);
			}
			self.ready.wait(&mut state);
		}
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;
	use std::thread;
	use std::time::Duration;

	use super::*;

	#[test]
	fn interrupt_preempts_queued_messages() {
		let inbox = Inbox::new();
		assert!(inbox.push(Value::from(1i64)));
		inbox.interrupt();
		assert_eq!(inbox.recv().unwrap(), Recv::Interrupted);
		assert_eq!(inbox.recv().unwrap(), Recv::Message(Value::from(1i64)));
	}

	#[test]
	fn stop_is_reported_before_interrupt() {
		let inbox = Inbox::new();
		inbox.interrupt();
		inbox.request_stop();
		assert_eq!(inbox.recv().unwrap(), Recv::Stopped);
		assert_eq!(inbox.recv().unwrap(), Recv::Interrupted);
	}

	#[test]
	fn close_drains_queue_first() {
		let inbox = Inbox::new();
		inbox.push(Value::from("a"));
		assert!(!inbox.is_closed());
		inbox.close();
		assert!(inbox.is_closed());
		assert!(!inbox.push(Value::from("b")));
		assert_eq!(inbox.recv().unwrap(), Recv::Message(Value::from("a")));
		assert_eq!(inbox.recv().unwrap(), Recv::Closed);
		assert_eq!(inbox.recv().unwrap(), Recv::Closed);
	}

	#[test]
	fn failure_is_reported_once() {
		let inbox = Inbox::new();
		inbox.fail(TransportError::Closed);
		assert!(matches!(inbox.recv(), Err(TransportError::Closed)));
		assert_eq!(inbox.recv().unwrap(), Recv::Closed);
	}

	#[test]
	fn interrupt_wakes_blocked_receiver() {
		let inbox = Arc::new(Inbox::new());
		let receiver = {
			let inbox = Arc::clone(&inbox);
			thread::spawn(move || inbox.recv().unwrap())
		};
		thread::sleep(Duration::from_millis(20));
		inbox.interrupt();
		assert_eq!(receiver.join().unwrap(), Recv::Interrupted);
	}
}
