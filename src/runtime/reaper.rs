use crate::context::ContextInner;
use crate::runtime::command::Command;
use crate::runtime::mailbox::{mailbox, MailboxReceiver, MailboxSender};
use crate::runtime::pipe::Pipe;

use std::sync::Weak;

/// Spawns the reaper task for a context and returns its mailbox.
///
/// Sockets hand themselves over with `Command::Reap` once their termination
/// acks are in. The reaper owns the socket during its final moments: it
/// drains whatever raced into the socket's mailbox (answering stray
/// termination requests so late-closing peers do not hang), then reports the
/// socket as destroyed to the context.
pub(crate) fn spawn_reaper(ctx: Weak<ContextInner>) -> MailboxSender {
  let (tx, rx) = mailbox();
  tokio::spawn(run_reaper(ctx, rx));
  tx
}

async fn run_reaper(ctx: Weak<ContextInner>, rx: MailboxReceiver) {
  tracing::debug!("Reaper started");
  while let Ok(cmd) = rx.recv().await {
    match cmd {
      Command::Reap { socket_handle, residual } => {
        finalize_socket(socket_handle, residual);
        if let Some(inner) = ctx.upgrade() {
          inner.socket_reaped(socket_handle);
        }
      }
      Command::Stop => break,
      other => {
        tracing::trace!(command = other.variant_name(), "Reaper ignoring command");
      }
    }
  }
  tracing::debug!("Reaper stopped");
}

fn finalize_socket(socket_handle: usize, residual: MailboxReceiver) {
  // Closing first makes the subsequent drain exhaustive: no sender can slip a
  // command in after the last try_recv.
  residual.close();
  let mut drained = 0usize;
  while let Ok(cmd) = residual.try_recv() {
    drained += 1;
    if let Command::PipeTerm { ack_to, ack_pipe_id, .. } = cmd {
      Pipe::ack_terminate(&ack_to, ack_pipe_id);
    }
  }
  tracing::debug!(socket_handle, drained, "Socket finalized by reaper");
}
