//! In-process rendezvous: wiring two sockets back-to-back through a pipe
//! pair with composed high-water marks.

use crate::error::{MqError, MqResult};
use crate::message::Blob;
use crate::runtime::pipe::pipepair;
use crate::runtime::Command;
use crate::socket::core::SocketCore;
use crate::socket::ISocket;

use std::sync::Arc;

/// Combined capacity for one direction of an inproc connection: the sum of
/// the writer's send bound and the reader's receive bound. Either side
/// declaring 0 ("unbounded") makes the whole direction unbounded.
fn composed_hwm(writer_sndhwm: usize, reader_rcvhwm: usize) -> usize {
  if writer_sndhwm == 0 || reader_rcvhwm == 0 {
    0
  } else {
    writer_sndhwm + reader_rcvhwm
  }
}

/// Connects `core` to the socket bound at `uri`: creates the pipe pair,
/// attaches the local end directly, and command-sends the remote end to the
/// binder together with the connector's identity.
pub(crate) async fn connect_inproc(
  core: &Arc<SocketCore>,
  logic: &Arc<dyn ISocket>,
  uri: &str,
) -> MqResult<()> {
  let Some(peer) = core.context.inner().find_endpoint(uri) else {
    return Err(MqError::ConnectionRefused(uri.to_string()));
  };

  let (out_hwm, in_hwm, local_identity, delay_local) = {
    let state = core.core_state.read();
    (
      composed_hwm(state.options.sndhwm, peer.options.rcvhwm),
      composed_hwm(peer.options.sndhwm, state.options.rcvhwm),
      state.options.identity.clone().unwrap_or_default(),
      state.options.delay_on_disconnect,
    )
  };

  let local_id = core.context.inner().next_handle();
  let remote_id = core.context.inner().next_handle();
  let (local_end, remote_end) = pipepair(
    (local_id, remote_id),
    (core.command_sender(), peer.mailbox.clone()),
    (out_hwm, in_hwm),
    (delay_local, peer.options.delay_on_close),
  );
  tracing::debug!(
    handle = core.handle,
    endpoint = %uri,
    out_hwm,
    in_hwm,
    "Inproc connection pipes created"
  );

  // Attach the local end to this socket; the binder's identity comes from
  // its bind-time options snapshot.
  let binder_identity = peer.options.identity.clone().unwrap_or_default();
  core.attach_pipe(logic, local_end, binder_identity).await;

  // Hand the remote end to the binder. Frames the local attach already
  // wrote (replayed subscriptions) raced their activation ahead of this
  // command; the binder's attach-time backlog check picks them up.
  let attach = Command::AttachPipe {
    pipe: remote_end,
    peer_identity: local_identity,
  };
  if peer.mailbox.send(attach).await.is_err() {
    // Binder terminated between registry lookup and hand-off; drop our end.
    core.core_state.write().pipes.remove(&local_id);
    logic.pipe_terminated(local_id).await;
    return Err(MqError::ConnectionRefused(uri.to_string()));
  }
  tracing::info!(handle = core.handle, endpoint = %uri, "Inproc connection established");
  Ok(())
}
