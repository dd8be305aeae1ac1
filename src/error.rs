use std::io;
use thiserror::Error;

/// Errors surfaced by the public socket and context APIs.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum MqError {
  // --- I/O Errors ---
  #[error("I/O error: {0}")]
  Io(#[from] io::Error),

  // --- Retryable ---
  /// A non-blocking or timed operation could not make progress before its
  /// deadline (high-water mark reached, no message available, or the
  /// configured timeout expired).
  #[error("Operation would block")]
  WouldBlock,
  #[error("Blocking operation was interrupted")]
  Interrupted,

  // --- Argument / option errors ---
  #[error("Invalid argument provided: {0}")]
  InvalidArgument(String),
  #[error("Invalid endpoint format: {0}")]
  InvalidEndpoint(String),
  #[error("Invalid socket option ID: {0}")]
  InvalidOption(i32),
  #[error("Invalid value provided for option ID {0}")]
  InvalidOptionValue(i32),

  // --- Endpoint / connection errors ---
  #[error("Address already in use: {0}")]
  AddrInUse(String),
  #[error("Connection refused by peer: {0}")]
  ConnectionRefused(String),
  #[error("Connection closed by peer")]
  ConnectionClosed,

  // --- State / capability errors ---
  /// The operation does not apply to this socket type (e.g. `recv` on PUB).
  #[error("Operation not supported by this socket type: {0}")]
  UnsupportedOperation(&'static str),
  /// The operation is valid for the type but not in the current state
  /// (e.g. two sends in a row on REQ).
  #[error("Operation is invalid for the current socket state: {0}")]
  InvalidState(&'static str),
  #[error("Socket option not supported: {0}")]
  UnsupportedOption(i32),

  // --- Transport errors ---
  /// Scheme unknown, or known but not compiled into this build.
  #[error("Transport scheme not supported or enabled: {0}")]
  UnsupportedTransport(String),
  /// Multicast scheme paired with a bidirectional socket type.
  #[error("Transport scheme incompatible with socket type: {0}")]
  IncompatibleTransport(String),
  /// The affinity mask left no I/O worker eligible.
  #[error("No I/O thread available for the requested affinity")]
  NoIoThread,

  // --- Lifecycle ---
  /// The owning context is shutting down, or the socket was closed.
  #[error("Context was terminated")]
  Terminated,

  // --- Internal ---
  #[error("Internal library error: {0}")]
  Internal(String),
}

/// Convenience alias used across the crate.
pub type MqResult<T> = Result<T, MqError>;
