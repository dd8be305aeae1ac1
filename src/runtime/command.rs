use crate::message::Blob;
use crate::runtime::mailbox::{MailboxReceiver, MailboxSender};
use crate::runtime::pipe::Pipe;

/// Messages exchanged between actors (socket cores, the reaper, I/O
/// workers). Each command is delivered to exactly one destination mailbox
/// and processed on the destination's own task.
#[derive(Debug)]
pub(crate) enum Command {
  // --- Lifecycle ---
  /// Sent by the context to every socket when the context terminates.
  Stop,
  /// Sent by the public `close()` API; initiates the termination cascade.
  UserClose,
  /// Hands a finished socket's residue to the reaper for final drain.
  Reap {
    socket_handle: usize,
    residual: MailboxReceiver,
  },

  // --- Pipe attachment (inproc rendezvous, binder side) ---
  /// Carries the remote end of a freshly created pipe pair to the peer
  /// socket, together with the connector's identity.
  AttachPipe { pipe: Pipe, peer_identity: Blob },

  // --- Pipe events ---
  /// The peer wrote into a previously empty queue; the named pipe is
  /// readable again.
  ActivateRead { pipe_id: usize },
  /// The peer drained a previously full queue; the named pipe is writable
  /// again.
  ActivateWrite { pipe_id: usize },
  /// The underlying connection dropped and discarded in-flight messages;
  /// pattern state tied to the named pipe must resynchronize.
  PipeHiccup { pipe_id: usize },

  // --- Two-phase pipe termination ---
  /// The peer asks this socket to release the named pipe. `ack_to` routes
  /// the acknowledgement back even after this socket forgot the pipe.
  PipeTerm {
    pipe_id: usize,
    ack_to: MailboxSender,
    ack_pipe_id: usize,
  },
  /// The peer released its end; one outstanding termination ack resolved.
  PipeTermAck { pipe_id: usize },
}

impl Command {
  /// Returns the command variant's name. Useful for logging.
  pub(crate) fn variant_name(&self) -> &'static str {
    match self {
      Command::Stop => "Stop",
      Command::UserClose => "UserClose",
      Command::Reap { .. } => "Reap",
      Command::AttachPipe { .. } => "AttachPipe",
      Command::ActivateRead { .. } => "ActivateRead",
      Command::ActivateWrite { .. } => "ActivateWrite",
      Command::PipeHiccup { .. } => "PipeHiccup",
      Command::PipeTerm { .. } => "PipeTerm",
      Command::PipeTermAck { .. } => "PipeTermAck",
    }
  }
}
