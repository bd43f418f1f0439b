//! End-to-end tests: two routers talking MessagePack over real sockets.

#![cfg(unix)]

use std::os::unix::net::{UnixListener, UnixStream};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use mpack_rpc::{Error, MessageRouter, ReplyEmitter, StreamTransport, Value, handler_fn};
use pretty_assertions::assert_eq;

const TIMEOUT: Duration = Duration::from_secs(5);

fn serve(router: Arc<MessageRouter>) -> thread::JoinHandle<()> {
	thread::spawn(move || {
		let mut handler = handler_fn(
			|method: String, args: Vec<Value>, reply: ReplyEmitter| {
				let outcome = match method.as_str() {
					"echo" => Ok(args.into_iter().next().unwrap_or_default()),
					"sum" => Ok(Value::from(args.iter().filter_map(Value::as_i64).sum::<i64>())),
					_ => Err(Value::from(format!("no method {method}"))),
				};
				reply.respond(outcome).unwrap();
			},
			|_: String, _: Vec<Value>| {},
			|e: Error| panic!("server loop failed: {e}"),
		);
		router.run_loop(&mut handler);
	})
}

/// Runs a client loop; the thread returns the errors the loop reported.
fn drive(router: Arc<MessageRouter>) -> thread::JoinHandle<Vec<Error>> {
	thread::spawn(move || {
		let mut errors = Vec::new();
		let mut handler = handler_fn(
			|_: String, _: Vec<Value>, _: ReplyEmitter| panic!("client received a request"),
			|_: String, _: Vec<Value>| {},
			|e: Error| errors.push(e),
		);
		router.run_loop(&mut handler);
		drop(handler);
		errors
	})
}

#[test]
fn requests_round_trip_over_a_socket_pair() {
	let (a, b) = UnixStream::pair().unwrap();
	let client = Arc::new(MessageRouter::new(StreamTransport::from_unix(a).unwrap()));
	let server = Arc::new(MessageRouter::new(StreamTransport::from_unix(b).unwrap()));
	let server_thread = serve(Arc::clone(&server));
	let client_thread = drive(Arc::clone(&client));

	let (tx, rx) = mpsc::channel();
	for (method, args) in [
		("echo", vec![Value::from("hi")]),
		("sum", vec![Value::from(2i64), Value::from(40i64)]),
		("missing", vec![]),
	] {
		let tx = tx.clone();
		client.send(method, args, move |error, result| tx.send((error, result)).unwrap()).unwrap();
	}

	let responses: Vec<_> = (0..3).map(|_| rx.recv_timeout(TIMEOUT).unwrap()).collect();
	assert_eq!(
		responses,
		vec![
			(None, Some(Value::from("hi"))),
			(None, Some(Value::from(42i64))),
			(Some(Value::from("no method missing")), None),
		]
	);
	assert_eq!(client.pending_requests(), 0);

	client.stop();
	server.stop();
	assert!(client_thread.join().unwrap().is_empty());
	server_thread.join().unwrap();
}

#[test]
fn notification_reaches_a_listening_router() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("rpc.sock");
	let listener = UnixListener::bind(&path).unwrap();

	let (tx, rx) = mpsc::channel();
	let server_thread = thread::spawn(move || {
		let (stream, _) = listener.accept().unwrap();
		let server = Arc::new(MessageRouter::new(StreamTransport::from_unix(stream).unwrap()));
		let stopper = Arc::clone(&server);
		let mut handler = handler_fn(
			|_: String, _: Vec<Value>, _: ReplyEmitter| {},
			move |event: String, args: Vec<Value>| {
				tx.send((event, args)).unwrap();
				stopper.stop();
			},
			|e: Error| panic!("server loop failed: {e}"),
		);
		server.run_loop(&mut handler);
	});

	let client = MessageRouter::new(StreamTransport::connect_unix(&path).unwrap());
	client.notify("buffer_changed", vec![Value::from(3i64)]).unwrap();

	assert_eq!(
		rx.recv_timeout(TIMEOUT).unwrap(),
		("buffer_changed".to_owned(), vec![Value::from(3i64)])
	);
	server_thread.join().unwrap();
}

#[test]
fn dropping_the_peer_fails_outstanding_requests() {
	let (a, b) = UnixStream::pair().unwrap();
	let client = Arc::new(MessageRouter::new(StreamTransport::from_unix(a).unwrap()));
	let server = MessageRouter::new(StreamTransport::from_unix(b).unwrap());

	client.send("never_answered", vec![], |_, _| panic!("no response expected")).unwrap();
	let client_thread = drive(Arc::clone(&client));
	drop(server);

	let errors = client_thread.join().unwrap();
	assert!(matches!(errors.as_slice(), [Error::PeerClosed { pending: 1 }]), "{errors:?}");
	assert!(!client.is_running());
	assert_eq!(client.pending_requests(), 1);
}

#[test]
fn dropping_an_idle_peer_ends_the_loop_quietly() {
	let (a, b) = UnixStream::pair().unwrap();
	let client = Arc::new(MessageRouter::new(StreamTransport::from_unix(a).unwrap()));
	let server = MessageRouter::new(StreamTransport::from_unix(b).unwrap());

	let client_thread = drive(Arc::clone(&client));
	drop(server);

	assert!(client_thread.join().unwrap().is_empty());
}

#[test]
fn tcp_connection_carries_requests() {
	let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
	let addr = listener.local_addr().unwrap();
	let accept = thread::spawn(move || {
		let (stream, _) = listener.accept().unwrap();
		Arc::new(MessageRouter::new(StreamTransport::from_tcp(stream).unwrap()))
	});

	let client = Arc::new(MessageRouter::new(StreamTransport::connect_tcp(addr).unwrap()));
	let server = accept.join().unwrap();
	let server_thread = serve(Arc::clone(&server));
	let client_thread = drive(Arc::clone(&client));

	let (tx, rx) = mpsc::channel();
	client
		.send("echo", vec![Value::Binary(b"raw".to_vec())], move |error, result| {
			tx.send((error, result)).unwrap();
		})
		.unwrap();
	assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), (None, Some(Value::Binary(b"raw".to_vec()))));

	client.stop();
	server.stop();
	assert!(client_thread.join().unwrap().is_empty());
	server_thread.join().unwrap();
}
