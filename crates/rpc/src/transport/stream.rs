//! MessagePack over byte streams: pipes, sockets and child processes.

use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use tracing::{Dispatch, debug, error};

use super::{Inbox, Recv, Transport, TransportError};
use crate::logger::SharedLogger;
use crate::value::Value;

/// MessagePack over a pair of byte streams.
///
/// Writes happen on the caller's thread under a lock. A dedicated reader thread decodes
/// values back to back and queues them, which is what makes `recv` interruptible even though
/// the underlying read is not.
///
/// Socket-backed transports shut the connection down when dropped, which also ends the reader
/// thread. For other streams the reader thread lives until its stream reports EOF.
pub struct StreamTransport {
	writer: Mutex<BufWriter<Box<dyn Write + Send>>>,
	inbox: Arc<Inbox>,
	logger: SharedLogger,
	shutdown: Option<Box<dyn Fn() + Send + Sync>>,
}

impl std::fmt::Debug for StreamTransport {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("StreamTransport").field("inbox", &self.inbox).finish_non_exhaustive()
	}
}

impl StreamTransport {
	/// Wraps a reader and writer, spawning the reader thread.
	pub fn new(reader: impl Read + Send + 'static, writer: impl Write + Send + 'static) -> io::Result<Self> {
		let inbox = Arc::new(Inbox::new());
		let logger = SharedLogger::default();
		let reader_inbox = Arc::clone(&inbox);
		let reader_logger = logger.clone();
		thread::Builder::new()
			.name("mpack-rpc-reader".into())
			.spawn(move || read_loop(reader, &reader_inbox, &reader_logger))?;
		Ok(Self {
			writer: Mutex::new(BufWriter::new(Box::new(writer))),
			inbox,
			logger,
			shutdown: None,
		})
	}

	/// Routes this transport's log events to `dispatch`. See [`Transport::attach_logger`].
	#[must_use]
	pub fn with_logger(self, dispatch: Dispatch) -> Self {
		self.logger.set(dispatch);
		self
	}

	/// Connects to a TCP listener.
	pub fn connect_tcp(addr: impl ToSocketAddrs) -> io::Result<Self> {
		Self::from_tcp(TcpStream::connect(addr)?)
	}

	/// Wraps an established TCP connection, e.g. one returned by `TcpListener::accept`.
	pub fn from_tcp(stream: TcpStream) -> io::Result<Self> {
		stream.set_nodelay(true)?;
		let reader = stream.try_clone()?;
		let handle = stream.try_clone()?;
		let mut this = Self::new(reader, stream)?;
		this.shutdown = Some(Box::new(move || {
			let _ = handle.shutdown(Shutdown::Both);
		}));
		Ok(this)
	}

	/// Connects to a unix domain socket.
	#[cfg(unix)]
	pub fn connect_unix(path: impl AsRef<std::path::Path>) -> io::Result<Self> {
		Self::from_unix(std::os::unix::net::UnixStream::connect(path)?)
	}

	/// Wraps an established unix domain socket connection.
	#[cfg(unix)]
	pub fn from_unix(stream: std::os::unix::net::UnixStream) -> io::Result<Self> {
		let reader = stream.try_clone()?;
		let handle = stream.try_clone()?;
		let mut this = Self::new(reader, stream)?;
		this.shutdown = Some(Box::new(move || {
			let _ = handle.shutdown(Shutdown::Both);
		}));
		Ok(this)
	}

	/// Spawns `command` with piped stdio and talks to it over stdin/stdout.
	///
	/// The child handle is returned so the caller decides when to wait on or kill it.
	pub fn spawn(command: &mut Command) -> io::Result<(Self, Child)> {
		let mut child = command.stdin(Stdio::piped()).stdout(Stdio::piped()).spawn()?;
		let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
			return Err(io::Error::other("child process stdio is not piped"));
		};
		debug!(pid = child.id(), "rpc.transport.spawned");
		Ok((Self::new(stdout, stdin)?, child))
	}
}

fn read_loop(reader: impl Read, inbox: &Inbox, logger: &SharedLogger) {
	let mut reader = BufReader::new(reader);
	loop {
		// EOF is only clean on a message boundary.
		match reader.fill_buf() {
			Ok([]) => {
				logger.scoped(|| debug!("rpc.transport.eof"));
				inbox.close();
				break;
			}
			Ok(_) => {}
			Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
			Err(e) => {
				logger.scoped(|| error!(error = %e, "rpc.transport.read_failed"));
				inbox.fail(e.into());
				break;
			}
		}
		match rmp_serde::from_read::<_, Value>(&mut reader) {
			Ok(value) => {
				if !inbox.push(value) {
					break;
				}
			}
			Err(e) => {
				logger.scoped(|| error!(error = %e, "rpc.transport.decode_failed"));
				inbox.fail(e.into());
				break;
			}
		}
	}
}

impl Transport for StreamTransport {
	fn send(&self, message: Value) -> Result<(), TransportError> {
		let mut writer = self.writer.lock();
		rmp_serde::encode::write(&mut *writer, &message)?;
		writer.flush()?;
		Ok(())
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

	fn attach_logger(&self, dispatch: &Dispatch) {
		self.logger.set(dispatch.clone());
	}
}

impl Drop for StreamTransport {
	fn drop(&mut self) {
		if let Some(shutdown) = &self.shutdown {
			self.logger.scoped(|| debug!("rpc.transport.shutdown"));
			shutdown();
		}
	}
}
