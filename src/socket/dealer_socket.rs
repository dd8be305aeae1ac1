use crate::error::MqResult;
use crate::message::{Blob, Msg};
use crate::socket::core::SocketCore;
use crate::socket::patterns::{FairQueue, LoadBalancer};
use crate::socket::types::{RecvFlags, SendFlags};
use crate::socket::ISocket;

use std::sync::Arc;

use async_trait::async_trait;

/// DEALER (XREQ): asynchronous request/reply leg. Outgoing messages are
/// load-balanced over the peers, incoming replies are fair-queued; no
/// lockstep is enforced and envelope frames pass through untouched.
#[derive(Debug)]
pub(crate) struct DealerSocket {
  core: Arc<SocketCore>,
  lb: LoadBalancer,
  fq: FairQueue,
}

impl DealerSocket {
  pub(crate) fn new(core: Arc<SocketCore>) -> Self {
    Self {
      core,
      lb: LoadBalancer::new(),
      fq: FairQueue::new(),
    }
  }
}

#[async_trait]
impl ISocket for DealerSocket {
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
    self.lb.has_ready()
  }

  async fn attach_pipe(&self, pipe_id: usize, _peer_identity: &Blob) {
    self.lb.activate(pipe_id);
  }

  async fn pipe_terminated(&self, pipe_id: usize) {
    self.lb.remove(pipe_id);
    self.fq.remove(pipe_id);
  }

  async fn read_activated(&self, pipe_id: usize) {
    self.fq.activate(pipe_id);
  }

  async fn write_activated(&self, pipe_id: usize) {
    self.lb.activate(pipe_id);
  }
}
