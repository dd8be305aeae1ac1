use crate::error::{MqError, MqResult};
use crate::message::{Blob, Msg, MsgFlags};
use crate::socket::core::{apply_send_flags, SocketCore};
use crate::socket::patterns::FairQueue;
use crate::socket::types::{RecvFlags, SendFlags};
use crate::socket::ISocket;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct PeerMap {
  pipe_to_identity: HashMap<usize, Blob>,
  identity_to_pipe: HashMap<Blob, usize>,
}

#[derive(Debug, Default)]
struct InState {
  /// First body frame held back while its identity label is delivered.
  stashed: Option<Msg>,
  /// Pipe of the message in progress; frames from it pass through without a
  /// new identity prefix. A frame from another pipe means that source died
  /// mid-message and the next message starts fresh.
  more_pipe: Option<usize>,
}

#[derive(Debug, Default)]
struct OutState {
  /// Destination pipe of the message being sent (identity consumed).
  current: Option<usize>,
  /// Discarding the body of an unroutable message.
  dropping: bool,
}

/// ROUTER (XREP): addressable request/reply hub. Incoming messages are
/// prefixed with the originating peer's identity as a label frame; outgoing
/// messages consume a leading identity frame to pick the destination pipe.
/// Messages to unknown identities are dropped silently, and a connection
/// whose identity collides with a live peer is rejected.
#[derive(Debug)]
pub(crate) struct RouterSocket {
  core: Arc<SocketCore>,
  fq: FairQueue,
  peers: Mutex<PeerMap>,
  in_state: Mutex<InState>,
  out_state: Mutex<OutState>,
  out_notify: Notify,
}

impl RouterSocket {
  pub(crate) fn new(core: Arc<SocketCore>) -> Self {
    Self {
      core,
      fq: FairQueue::new(),
      peers: Mutex::new(PeerMap::default()),
      in_state: Mutex::new(InState::default()),
      out_state: Mutex::new(OutState::default()),
      out_notify: Notify::new(),
    }
  }
}

#[async_trait]
impl ISocket for RouterSocket {
  fn core(&self) -> &Arc<SocketCore> {
    &self.core
  }

  async fn send(&self, msg: Msg, flags: SendFlags) -> MqResult<()> {
    self.core.ensure_alive()?;
    let msg = apply_send_flags(msg, flags);
    let continues = msg.is_more() || msg.is_label();

    let destination = {
      let mut out = self.out_state.lock();
      if out.dropping {
        if !continues {
          out.dropping = false;
        }
        return Ok(());
      }
      match out.current {
        Some(pipe_id) => pipe_id,
        None => {
          // Message start: this frame is the destination identity.
          let identity = Blob::from(msg.data().unwrap_or_default());
          match self.peers.lock().identity_to_pipe.get(&identity).copied() {
            Some(pipe_id) => {
              if continues {
                out.current = Some(pipe_id);
              }
            }
            None => {
              tracing::debug!(handle = self.core.handle, "Dropping message to unknown identity");
              out.dropping = continues;
            }
          }
          return Ok(());
        }
      }
    };

    let (dont_block, deadline) = self.core.send_deadline(flags);
    self
      .core
      .send_to_pipe(destination, msg, dont_block, &deadline, &self.out_notify)
      .await?;
    if !continues {
      self.out_state.lock().current = None;
    }
    Ok(())
  }

  async fn recv(&self, flags: RecvFlags) -> MqResult<Msg> {
    self.core.ensure_alive()?;
    if let Some(msg) = self.in_state.lock().stashed.take() {
      return Ok(msg);
    }
    let (dont_block, deadline) = self.core.recv_deadline(flags);
    loop {
      let got = {
        let state = self.core.core_state.read();
        self.fq.try_recv(&state.pipes)
      };
      match got {
        Some((pipe_id, msg)) => {
          let mut in_state = self.in_state.lock();
          let continues = msg.is_more() || msg.is_label();
          if in_state.more_pipe == Some(pipe_id) {
            in_state.more_pipe = continues.then_some(pipe_id);
            return Ok(msg);
          }
          // Message start: deliver the peer's identity first, hold the
          // frame itself back for the next receive.
          let identity = self
            .peers
            .lock()
            .pipe_to_identity
            .get(&pipe_id)
            .cloned()
            .unwrap_or_default();
          let mut identity_frame = Msg::from_vec(identity.to_vec());
          identity_frame.set_flags(MsgFlags::LABEL);
          in_state.more_pipe = continues.then_some(pipe_id);
          in_state.stashed = Some(msg);
          return Ok(identity_frame);
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
    self.in_state.lock().stashed.is_some() || self.core.any_pipe_readable()
  }

  fn has_out(&self) -> bool {
    self.core.any_pipe_writable()
  }

  async fn attach_pipe(&self, pipe_id: usize, peer_identity: &Blob) {
    let mut peers = self.peers.lock();
    if peers.identity_to_pipe.contains_key(peer_identity) {
      tracing::warn!(
        handle = self.core.handle,
        pipe_id,
        "Peer identity already in use; rejecting the newer connection"
      );
      drop(peers);
      self.core.initiate_pipe_term(pipe_id);
      return;
    }
    peers.pipe_to_identity.insert(pipe_id, peer_identity.clone());
    peers.identity_to_pipe.insert(peer_identity.clone(), pipe_id);
  }

  async fn pipe_terminated(&self, pipe_id: usize) {
    self.fq.remove(pipe_id);
    {
      let mut peers = self.peers.lock();
      if let Some(identity) = peers.pipe_to_identity.remove(&pipe_id) {
        peers.identity_to_pipe.remove(&identity);
      }
    }
    let mut out = self.out_state.lock();
    if out.current == Some(pipe_id) {
      // Remaining frames of the in-flight message have nowhere to go.
      out.current = None;
      out.dropping = true;
    }
    drop(out);
    self.out_notify.notify_one();
  }

  async fn read_activated(&self, pipe_id: usize) {
    // A pipe rejected for an identity collision stays silent while its
    // teardown runs.
    if self.peers.lock().pipe_to_identity.contains_key(&pipe_id) {
      self.fq.activate(pipe_id);
    }
  }

  async fn write_activated(&self, _pipe_id: usize) {
    self.out_notify.notify_one();
  }
}
