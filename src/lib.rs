//! wiremq - a brokerless messaging core in pure async Rust.
//!
//! The crate provides the coordination machinery of a socket-pattern
//! messaging library: a prefix-matching subscription trie, the socket
//! state machine marshalling user calls against an asynchronous command
//! mailbox, the in-process rendezvous that wires two sockets back-to-back
//! through a bounded pipe pair, and the pub/sub forwarding semantics that
//! carry subscriptions upstream and filter traffic downstream.
//!
//! Routing is entirely endpoint-local; there is no broker. Stream and
//! multicast transports are external collaborators and are not part of this
//! build: the `inproc`/`sys` schemes are fully functional, while `tcp`/`ipc`
//! endpoints validate, pick an I/O worker, and then report the missing
//! engine.

/// The `Context`: entry point for creating sockets, owner of the I/O worker
/// pool, the endpoint registry, and the reaper.
pub mod context;
/// Error types used throughout the library.
pub mod error;
/// Message representation (frames, flags, opaque byte strings).
pub mod message;
/// Core async runtime primitives: mailboxes, commands, pipes, workers.
pub(crate) mod runtime;
/// Socket types, options, patterns, and the coordinator.
pub mod socket;
/// Endpoint parsing and the built-in in-process transport.
pub(crate) mod transport;

pub use context::{context, Context};
pub use error::{MqError, MqResult};
pub use message::{Blob, Msg, MsgFlags, PollEvents};
pub use socket::types::{RecvFlags, SendFlags, Socket, SocketType};

/// Major version number of the library.
const VERSION_MAJOR: i32 = 0;
/// Minor version number of the library.
const VERSION_MINOR: i32 = 1;
/// Patch version number of the library.
const VERSION_PATCH: i32 = 0;

/// Returns the library version as a tuple (major, minor, patch).
pub fn version() -> (i32, i32, i32) {
  (VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH)
}
