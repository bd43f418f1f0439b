//! Blocking MessagePack-RPC message loop.
//!
//! This crate multiplexes three traffic classes over one duplex channel: outgoing requests
//! awaiting replies, incoming requests that must be answered, and notifications in both
//! directions.
//! * [`MessageRouter`]: request-id allocation, pending-reply correlation, posted notifications
//!   and the dispatch loop
//! * [`ReplyEmitter`]: single-use handle answering one inbound request
//! * [`Transport`]: interruptible duplex channel carrying decoded [`Value`]s
//! * [`StringDecoder`]: optional coercion of binary strings into text
//!
//! Two transports are provided: [`MemoryTransport`] for in-process pairs and
//! [`StreamTransport`] for MessagePack over byte streams (pipes, sockets, child processes).

#![warn(missing_docs)]

pub mod config;
pub mod decode;
pub mod error;
mod logger;
pub mod message;
pub mod reply;
pub mod router;
pub mod transport;
pub mod value;

pub use config::RouterConfig;
pub use decode::{DecodeError, DecodeErrors, Encoding, StringDecoder};
pub use error::{Error, ProtocolError, Result};
pub use message::{Message, MessageKind, Notification, Request, Response};
pub use reply::ReplyEmitter;
pub use router::{FnHandler, Handler, MessageRouter, ResponseCallback, handler_fn};
pub use transport::{Inbox, MemoryTransport, Recv, StreamTransport, Transport, TransportError};
pub use value::Value;
