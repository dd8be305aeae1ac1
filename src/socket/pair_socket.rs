use crate::error::MqResult;
use crate::message::{Blob, Msg};
use crate::socket::core::SocketCore;
use crate::socket::patterns::{FairQueue, LoadBalancer};
use crate::socket::types::{RecvFlags, SendFlags};
use crate::socket::ISocket;

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

/// PAIR: an exclusive one-to-one link. Exactly one pipe may be attached;
/// later connection attempts are rejected by terminating their pipe.
#[derive(Debug)]
pub(crate) struct PairSocket {
  core: Arc<SocketCore>,
  lb: LoadBalancer,
  fq: FairQueue,
  peer: Mutex<Option<usize>>,
}

impl PairSocket {
  pub(crate) fn new(core: Arc<SocketCore>) -> Self {
    Self {
      core,
      lb: LoadBalancer::new(),
      fq: FairQueue::new(),
      peer: Mutex::new(None),
    }
  }
}

#[async_trait]
impl ISocket for PairSocket {
  fn core(&self) -> &Arc<SocketCore> {
    &self.core
  }

  async fn send(&self, msg: Msg, flags: SendFlags) -> MqResult<()> {
    self.core.send_via_lb(&self.lb, msg, flags).await.map(|_| ())
  }

  async fn recv(&self, flags: RecvFlags) -> MqResult<Msg> {
    self.core.recv_via_fq(&self.fq, flags).await.map(|(_, msg)| msg)
  }

  fn has_in(&self) -> bool {
    self.core.any_pipe_readable()
  }

  fn has_out(&self) -> bool {
    self.core.any_pipe_writable()
  }

  async fn attach_pipe(&self, pipe_id: usize, _peer_identity: &Blob) {
    let mut peer = self.peer.lock();
    if peer.is_some() {
      tracing::warn!(
        handle = self.core.handle,
        pipe_id,
        "PAIR already linked; rejecting additional connection"
      );
      drop(peer);
      self.core.initiate_pipe_term(pipe_id);
      return;
    }
    *peer = Some(pipe_id);
    drop(peer);
    self.lb.activate(pipe_id);
  }

  async fn pipe_terminated(&self, pipe_id: usize) {
    let mut peer = self.peer.lock();
    if *peer == Some(pipe_id) {
      *peer = None;
    }
    drop(peer);
    self.lb.remove(pipe_id);
    self.fq.remove(pipe_id);
  }

  async fn read_activated(&self, pipe_id: usize) {
    // Rejected extra connections stay silent while their teardown runs.
    if *self.peer.lock() == Some(pipe_id) {
      self.fq.activate(pipe_id);
    }
  }

  async fn write_activated(&self, pipe_id: usize) {
    if *self.peer.lock() == Some(pipe_id) {
      self.lb.activate(pipe_id);
    }
  }
}
