//! Per-instance log routing.
//!
//! A router can be given its own [`Dispatch`]. Everything that logs on its behalf, on whichever
//! thread, runs inside [`scoped`] so events reach that dispatch instead of the global one.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::Dispatch;

/// Runs `f` with `logger` as the default subscriber, or with the global one when `None`.
pub(crate) fn scoped<T>(logger: Option<&Dispatch>, f: impl FnOnce() -> T) -> T {
	match logger {
		Some(dispatch) => tracing::dispatcher::with_default(dispatch, f),
		None => f(),
	}
}

/// A logger that can be attached after the owner started threads that log.
#[derive(Debug, Clone, Default)]
pub(crate) struct SharedLogger(Arc<RwLock<Option<Dispatch>>>);

impl SharedLogger {
	pub(crate) fn set(&self, dispatch: Dispatch) {
		*self.0.write() = Some(dispatch);
	}

	pub(crate) fn scoped<T>(&self, f: impl FnOnce() -> T) -> T {
		let dispatch = self.0.read().clone();
		scoped(dispatch.as_ref(), f)
	}
}
