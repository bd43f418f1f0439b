//! Request correlation and the blocking dispatch loop.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use tracing::{Dispatch, debug, error, info, warn};

use crate::config::RouterConfig;
use crate::decode::{DecodeError, Encoding, StringDecoder};
use crate::logger;
use crate::message::{Message, Notification, Request, Response};
use crate::reply::ReplyEmitter;
use crate::transport::{Recv, Transport};
use crate::value::Value;
use crate::{Error, Result};

/// Callback receiving `(error, result)` of an outgoing request.
pub type ResponseCallback = Box<dyn FnOnce(Option<Value>, Option<Value>) + Send>;

/// Application side of the dispatch loop.
///
/// All methods run inline on the thread driving [`MessageRouter::run_loop`], one message at a
/// time.
pub trait Handler {
	/// The peer called `method`. Answer through `reply`, now or later.
	fn on_request(&mut self, method: String, args: Vec<Value>, reply: ReplyEmitter);

	/// The peer sent a notification, or one was [posted](MessageRouter::post) locally.
	fn on_notification(&mut self, event: String, args: Vec<Value>);

	/// The loop failed and is about to return.
	fn on_error(&mut self, error: Error);
}

/// [`Handler`] built from three closures, see [`handler_fn`].
pub struct FnHandler<R, N, E> {
	on_request: R,
	on_notification: N,
	on_error: E,
}

/// Creates a [`Handler`] from closures.
pub fn handler_fn<R, N, E>(on_request: R, on_notification: N, on_error: E) -> FnHandler<R, N, E>
where
	R: FnMut(String, Vec<Value>, ReplyEmitter),
	N: FnMut(String, Vec<Value>),
	E: FnMut(Error),
{
	FnHandler {
		on_request,
		on_notification,
		on_error,
	}
}

impl<R, N, E> Handler for FnHandler<R, N, E>
where
	R: FnMut(String, Vec<Value>, ReplyEmitter),
	N: FnMut(String, Vec<Value>),
	E: FnMut(Error),
{
	fn on_request(&mut self, method: String, args: Vec<Value>, reply: ReplyEmitter) {
		(self.on_request)(method, args, reply);
	}

	fn on_notification(&mut self, event: String, args: Vec<Value>) {
		(self.on_notification)(event, args);
	}

	fn on_error(&mut self, error: Error) {
		(self.on_error)(error);
	}
}

impl<R, N, E> fmt::Debug for FnHandler<R, N, E> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("FnHandler").finish_non_exhaustive()
	}
}

struct PostedNotification {
	event: String,
	args: Vec<Value>,
}

/// Multiplexes requests, responses and notifications over one [`Transport`].
///
/// The router is `Send + Sync`; share it through an [`Arc`] so other threads can
/// [`send`](Self::send), [`post`](Self::post) and [`stop`](Self::stop) while one thread blocks in
/// [`run_loop`](Self::run_loop).
pub struct MessageRouter {
	transport: Arc<dyn Transport>,
	decoder: RwLock<StringDecoder>,
	/// Next outgoing request id. Starts at 1, never reused.
	next_request_id: AtomicU64,
	/// Outgoing requests awaiting their response.
	pending: Mutex<HashMap<u64, ResponseCallback>>,
	/// Locally posted notifications, delivered ahead of the next receive.
	posted: Mutex<VecDeque<PostedNotification>>,
	/// Set while the loop is inside `Transport::recv`.
	running: AtomicBool,
	stopped: AtomicBool,
	logger: Option<Dispatch>,
}

impl MessageRouter {
	/// Creates a router that passes inbound values through undecoded.
	pub fn new(transport: impl Transport + 'static) -> Self {
		Self::with_config(transport, RouterConfig::default())
	}

	/// Creates a router with explicit configuration.
	pub fn with_config(transport: impl Transport + 'static, config: RouterConfig) -> Self {
		Self::from_shared(Arc::new(transport), config)
	}

	/// Creates a router over a transport that is shared with other owners.
	pub fn from_shared(transport: Arc<dyn Transport>, config: RouterConfig) -> Self {
		Self {
			transport,
			decoder: RwLock::new(config.decoder()),
			next_request_id: AtomicU64::new(1),
			pending: Mutex::new(HashMap::new()),
			posted: Mutex::new(VecDeque::new()),
			running: AtomicBool::new(false),
			stopped: AtomicBool::new(false),
			logger: None,
		}
	}

	/// Routes this router's log events to `dispatch` instead of the global subscriber.
	///
	/// The dispatch also covers the [`ReplyEmitter`]s the router hands out and, through
	/// [`Transport::attach_logger`], the transport.
	#[must_use]
	pub fn with_logger(mut self, dispatch: Dispatch) -> Self {
		self.transport.attach_logger(&dispatch);
		self.logger = Some(dispatch);
		self
	}

	/// The underlying transport.
	pub fn transport(&self) -> &Arc<dyn Transport> {
		&self.transport
	}

	/// Sets or clears the encoding used to coerce inbound binary strings.
	///
	/// Typically called once the peer has reported its encoding.
	pub fn set_encoding(&self, encoding: Option<Encoding>) {
		self.decoder.write().set_encoding(encoding);
	}

	/// Applies the configured string coercion to `value`, overriding the default flag when
	/// `decode_strings` is given.
	pub fn decode_value(&self, value: Value, decode_strings: Option<bool>) -> Result<Value, DecodeError> {
		self.decoder.read().decode(value, decode_strings)
	}

	/// Returns true while the loop is blocked in a receive.
	pub fn is_running(&self) -> bool {
		self.running.load(Ordering::SeqCst)
	}

	/// Number of outgoing requests still awaiting a response.
	pub fn pending_requests(&self) -> usize {
		self.pending.lock().len()
	}

	/// Sends a request and registers `callback` for its response. Returns the request id.
	///
	/// `callback` runs on the loop thread, exactly once, when the matching response arrives.
	pub fn send(
		&self,
		method: impl Into<String>,
		args: Vec<Value>,
		callback: impl FnOnce(Option<Value>, Option<Value>) + Send + 'static,
	) -> Result<u64> {
		self.logged(|| {
			let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
			let method = method.into();
			debug!(id, method = %method, "rpc.send.request");

			// Registered before writing so a fast response always finds its entry.
			assert!(self.pending.lock().insert(id, Box::new(callback)).is_none());
			if let Err(e) = self.transport.send(Message::Request(Request { id, method, args }).into()) {
				self.pending.lock().remove(&id);
				return Err(e.into());
			}
			Ok(id)
		})
	}

	/// Sends a notification to the peer.
	pub fn notify(&self, event: impl Into<String>, args: Vec<Value>) -> Result<()> {
		self.logged(|| {
			let event = event.into();
			debug!(event = %event, "rpc.send.notification");
			self.transport.send(Message::Notification(Notification { event, args }).into())?;
			Ok(())
		})
	}

	/// Queues a notification for local delivery through [`Handler::on_notification`] and wakes
	/// the loop if it is blocked in a receive.
	pub fn post(&self, event: impl Into<String>, args: Vec<Value>) {
		self.logged(|| {
			let event = event.into();
			debug!(event = %event, "rpc.post");
			self.posted.lock().push_back(PostedNotification { event, args });
			self.transport.interrupt();
		});
	}

	/// Asks the loop to return before its next dispatch. Idempotent.
	///
	/// A callback that is already running is not interrupted.
	pub fn stop(&self) {
		self.logged(|| {
			self.stopped.store(true, Ordering::SeqCst);
			if self.running.load(Ordering::SeqCst) {
				debug!("rpc.loop.stop_requested");
				self.transport.request_stop();
			}
		});
	}

	/// Runs the dispatch loop until [`stop`](Self::stop) is called, the peer closes the
	/// transport, or an error is passed to [`Handler::on_error`].
	///
	/// A peer that closes while requests are still awaiting responses is reported as
	/// [`Error::PeerClosed`]; a close with nothing outstanding ends the loop quietly.
	pub fn run_loop<H: Handler + ?Sized>(&self, handler: &mut H) {
		self.logged(|| {
			self.stopped.store(false, Ordering::SeqCst);
			debug!("rpc.loop.start");
			while !self.stopped.load(Ordering::SeqCst) {
				match self.step(handler) {
					ControlFlow::Continue(()) => {}
					ControlFlow::Break(Ok(())) => break,
					ControlFlow::Break(Err(e)) => {
						error!(error = %e, "rpc.loop.failed");
						handler.on_error(e);
						break;
					}
				}
			}
			debug!("rpc.loop.exit");
		});
	}

	fn step<H: Handler + ?Sized>(&self, handler: &mut H) -> ControlFlow<Result<()>> {
		let posted = self.posted.lock().pop_front();
		if let Some(PostedNotification { event, args }) = posted {
			handler.on_notification(event, args);
			return ControlFlow::Continue(());
		}

		// Paired with `stop`: either the stop flag is seen here or `stop` sees `running`.
		self.running.store(true, Ordering::SeqCst);
		if self.stopped.load(Ordering::SeqCst) {
			self.running.store(false, Ordering::SeqCst);
			return ControlFlow::Break(Ok(()));
		}
		let received = self.transport.recv();
		self.running.store(false, Ordering::SeqCst);

		match received {
			Ok(Recv::Message(value)) => match self.dispatch(value, handler) {
				Ok(()) => ControlFlow::Continue(()),
				Err(e) => ControlFlow::Break(Err(e)),
			},
			Ok(Recv::Interrupted | Recv::Stopped) => ControlFlow::Continue(()),
			Ok(Recv::Closed) => match self.pending_requests() {
				0 => {
					info!("rpc.loop.peer_closed");
					ControlFlow::Break(Ok(()))
				}
				pending => ControlFlow::Break(Err(Error::PeerClosed { pending })),
			},
			Err(e) => ControlFlow::Break(Err(e.into())),
		}
	}

	/// Classifies an inbound value and hands it to the matching callback.
	fn dispatch<H: Handler + ?Sized>(&self, value: Value, handler: &mut H) -> Result<()> {
		let value = self.decoder.read().decode(value, None)?;
		match Message::try_from(value)? {
			Message::Request(Request { id, method, args }) => {
				debug!(id, method = %method, "rpc.recv.request");
				let reply = ReplyEmitter::new(id, Arc::clone(&self.transport), self.logger.clone());
				handler.on_request(method, args, reply);
			}
			Message::Response(Response { id, error, result }) => {
				let callback = self.pending.lock().remove(&id);
				match callback {
					Some(callback) => {
						debug!(id, is_error = error.is_some(), "rpc.recv.response");
						callback(error, result);
					}
					None => warn!(id, "rpc.recv.unmatched_response"),
				}
			}
			Message::Notification(Notification { event, args }) => {
				debug!(event = %event, "rpc.recv.notification");
				handler.on_notification(event, args);
			}
		}
		Ok(())
	}

	fn logged<T>(&self, f: impl FnOnce() -> T) -> T {
		logger::scoped(self.logger.as_ref(), f)
	}
}

impl fmt::Debug for MessageRouter {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("MessageRouter")
			.field("decoder", &*self.decoder.read())
			.field("next_request_id", &self.next_request_id)
			.field("pending", &self.pending_requests())
			.field("posted", &self.posted.lock().len())
			.field("running", &self.running)
			.field("stopped", &self.stopped)
			.finish_non_exhaustive()
	}
}
