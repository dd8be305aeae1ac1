use crate::error::{MqError, MqResult};
use crate::message::{Blob, Msg};
use crate::socket::core::{apply_send_flags, SocketCore};
use crate::socket::patterns::{Distributor, FairQueue, Mtrie};
use crate::socket::types::{RecvFlags, SendFlags};
use crate::socket::xpub_socket::{SUBSCRIBE_OP, UNSUBSCRIBE_OP};
use crate::socket::ISocket;

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

/// Sentinel id standing for this socket itself in its own subscription
/// table. Real pipe ids are context handles and start at 1.
const LOCAL: usize = 0;

#[derive(Debug, Default)]
struct RecvState {
  /// Pipe of the message in progress. A frame from another pipe means the
  /// previous message's source died mid-message; its state is stale.
  active_pipe: Option<usize>,
  /// Mid-message: remaining frames ride the first frame's verdict.
  more: bool,
  /// Mid-message on a filtered-out message: frames are consumed silently.
  dropping: bool,
}

/// XSUB: the subscribing side of the pub/sub pattern. Keeps a table of the
/// socket's own outgoing subscriptions so they can be replayed to newly
/// attached upstream peers; forwards whatever the user sends (control bytes
/// included) to every peer. When the socket type enables filtering (SUB),
/// inbound messages that match no table entry are dropped.
#[derive(Debug)]
pub(crate) struct XSubSocket {
  core: Arc<SocketCore>,
  fq: FairQueue,
  dist: Distributor,
  subscriptions: Mutex<Mtrie>,
  recv_state: Mutex<RecvState>,
}

impl XSubSocket {
  pub(crate) fn new(core: Arc<SocketCore>) -> Self {
    Self {
      core,
      fq: FairQueue::new(),
      dist: Distributor::new(),
      subscriptions: Mutex::new(Mtrie::new()),
      recv_state: Mutex::new(RecvState::default()),
    }
  }

  fn matches(&self, data: &[u8]) -> bool {
    self.subscriptions.lock().matches(data, 1, |_| {}) != 0
  }
}

#[async_trait]
impl ISocket for XSubSocket {
  fn core(&self) -> &Arc<SocketCore> {
    &self.core
  }

  async fn send(&self, msg: Msg, flags: SendFlags) -> MqResult<()> {
    self.core.ensure_alive()?;
    let msg = apply_send_flags(msg, flags);

    // Opcode-prefixed frames maintain the local table; everything is
    // forwarded upstream either way.
    if let Some((&op, prefix)) = msg.data().unwrap_or_default().split_first() {
      match op {
        SUBSCRIBE_OP => {
          self.subscriptions.lock().add(prefix, LOCAL);
        }
        UNSUBSCRIBE_OP => {
          self.subscriptions.lock().rm(prefix, LOCAL);
        }
        _ => {}
      }
    }

    let state = self.core.core_state.read();
    self.dist.send(&state.pipes, &msg, || state.pipes.keys().copied().collect());
    Ok(())
  }

  async fn recv(&self, flags: RecvFlags) -> MqResult<Msg> {
    self.core.ensure_alive()?;
    let filter = self.core.core_state.read().options.filter;
    let (dont_block, deadline) = self.core.recv_deadline(flags);
    loop {
      let got = {
        let state = self.core.core_state.read();
        self.fq.try_recv(&state.pipes)
      };
      match got {
        Some((pipe_id, msg)) => {
          let mut rs = self.recv_state.lock();
          let continues = msg.is_more() || msg.is_label();
          if rs.active_pipe.is_some() && rs.active_pipe != Some(pipe_id) {
            // The previous message's pipe went away mid-message.
            rs.more = false;
            rs.dropping = false;
          }
          rs.active_pipe = continues.then_some(pipe_id);
          if rs.dropping {
            rs.dropping = continues;
            continue;
          }
          if rs.more {
            rs.more = continues;
            return Ok(msg);
          }
          // Message start: the first frame decides for the whole message.
          if !filter || self.matches(msg.data().unwrap_or_default()) {
            rs.more = continues;
            return Ok(msg);
          }
          rs.dropping = continues;
        }
        None => {
          if dont_block {
            return Err(MqError::WouldBlock);
          }
          self.core.wait_for(self.fq.notify_handle(), &deadline).await?;
          self.core.ensure_alive()?;
        }
      }
    }
  }

  fn has_in(&self) -> bool {
    self.core.any_pipe_readable()
  }

  fn has_out(&self) -> bool {
    true
  }

  async fn attach_pipe(&self, pipe_id: usize, _peer_identity: &Blob) {
    // Replay the full subscription table to the new upstream peer.
    let mut control: Vec<Msg> = Vec::new();
    self.subscriptions.lock().for_each(|prefix| {
      let mut body = Vec::with_capacity(1 + prefix.len());
      body.push(SUBSCRIBE_OP);
      body.extend_from_slice(prefix);
      control.push(Msg::from_vec(body));
    });
    if control.is_empty() {
      return;
    }
    let state = self.core.core_state.read();
    let Some(pipe) = state.pipes.get(&pipe_id) else {
      return;
    };
    for msg in control {
      if pipe.write(msg).is_err() {
        tracing::warn!(
          handle = self.core.handle,
          pipe_id,
          "Could not replay subscriptions to new peer"
        );
        break;
      }
    }
  }

  async fn pipe_terminated(&self, pipe_id: usize) {
    self.fq.remove(pipe_id);
    self.dist.remove(pipe_id);
  }

  async fn read_activated(&self, pipe_id: usize) {
    self.fq.activate(pipe_id);
  }
}
