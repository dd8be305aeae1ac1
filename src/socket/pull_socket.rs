use crate::error::{MqError, MqResult};
use crate::message::{Blob, Msg};
use crate::socket::core::SocketCore;
use crate::socket::patterns::FairQueue;
use crate::socket::types::{RecvFlags, SendFlags};
use crate::socket::ISocket;

use std::sync::Arc;

use async_trait::async_trait;

/// PULL: fair-queues incoming messages from the connected PUSH peers.
/// Never sends.
#[derive(Debug)]
pub(crate) struct PullSocket {
  core: Arc<SocketCore>,
  fq: FairQueue,
}

impl PullSocket {
  pub(crate) fn new(core: Arc<SocketCore>) -> Self {
    Self {
      core,
      fq: FairQueue::new(),
    }
  }
}

#[async_trait]
impl ISocket for PullSocket {
  fn core(&self) -> &Arc<SocketCore> {
    &self.core
  }

  async fn send(&self, _msg: Msg, _flags: SendFlags) -> MqResult<()> {
    Err(MqError::UnsupportedOperation("PULL sockets cannot send"))
  }

  async fn recv(&self, flags: RecvFlags) -> MqResult<Msg> {
    self.core.recv_via_fq(&self.fq, flags).await.map(|(_, msg)| msg)
  }

  fn has_in(&self) -> bool {
    self.core.any_pipe_readable()
  }

  async fn attach_pipe(&self, _pipe_id: usize, _peer_identity: &Blob) {}

  async fn pipe_terminated(&self, pipe_id: usize) {
    self.fq.remove(pipe_id);
  }

  async fn read_activated(&self, pipe_id: usize) {
    self.fq.activate(pipe_id);
  }
}
