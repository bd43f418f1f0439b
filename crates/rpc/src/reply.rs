//! Single-use handle answering one inbound request.

use std::fmt;
use std::sync::Arc;

use tracing::Dispatch;

use crate::Result;
use crate::logger;
use crate::message::{Message, Response};
use crate::transport::Transport;
use crate::value::Value;

/// Answers the inbound request it was created for.
///
/// Every reply method consumes the emitter, so a request is answered at most once. The emitter
/// is `Send` and may be stashed and answered later from any thread. Dropping it unanswered
/// leaves the peer waiting forever; this is logged. Log events go to the router's logger on
/// whichever thread the emitter ends up on.
pub struct ReplyEmitter {
	id: u64,
	transport: Arc<dyn Transport>,
	logger: Option<Dispatch>,
	replied: bool,
}

impl ReplyEmitter {
	pub(crate) fn new(id: u64, transport: Arc<dyn Transport>, logger: Option<Dispatch>) -> Self {
		Self {
			id,
			transport,
			logger,
			replied: false,
		}
	}

	/// Id of the request this emitter answers.
	pub const fn request_id(&self) -> u64 {
		self.id
	}

	/// Sends `[1, id, nil, value]`.
	pub fn reply(self, value: Value) -> Result<()> {
		self.respond(Ok(value))
	}

	/// Sends `[1, id, value, nil]`.
	pub fn reply_error(self, value: Value) -> Result<()> {
		self.respond(Err(value))
	}

	/// Sends a success or error response.
	pub fn respond(mut self, outcome: std::result::Result<Value, Value>) -> Result<()> {
		self.replied = true;
		let response = match outcome {
			Ok(result) => Response::ok(self.id, result),
			Err(error) => Response::err(self.id, error),
		};
		logger::scoped(self.logger.as_ref(), || {
			tracing::debug!(id = self.id, is_error = response.error.is_some(), "rpc.reply");
			self.transport.send(Message::Response(response).into())
		})?;
		Ok(())
	}
}

impl fmt::Debug for ReplyEmitter {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ReplyEmitter")
			.field("id", &self.id)
			.field("replied", &self.replied)
			.finish_non_exhaustive()
	}
}

impl Drop for ReplyEmitter {
	fn drop(&mut self) {
		if !self.replied {
			logger::scoped(self.logger.as_ref(), || {
				tracing::warn!(id = self.id, "rpc.reply.dropped_unanswered");
			});
		}
	}
}
