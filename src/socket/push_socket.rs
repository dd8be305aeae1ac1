use crate::error::{MqError, MqResult};
use crate::message::{Blob, Msg};
use crate::socket::core::SocketCore;
use crate::socket::patterns::LoadBalancer;
use crate::socket::types::{RecvFlags, SendFlags};
use crate::socket::ISocket;

use std::sync::Arc;

use async_trait::async_trait;

/// PUSH: load-balances outgoing messages over the connected PULL workers.
/// Never receives.
#[derive(Debug)]
pub(crate) struct PushSocket {
  core: Arc<SocketCore>,
  lb: LoadBalancer,
}

impl PushSocket {
  pub(crate) fn new(core: Arc<SocketCore>) -> Self {
    Self {
      core,
      lb: LoadBalancer::new(),
    }
  }
}

#[async_trait]
impl ISocket for PushSocket {
  fn core(&self) -> &Arc<SocketCore> {
    &self.core
  }

  async fn send(&self, msg: Msg, flags: SendFlags) -> MqResult<()> {
    self.core.send_via_lb(&self.lb, msg, flags).await.map(|_| ())
  }

  async fn recv(&self, _flags: RecvFlags) -> MqResult<Msg> {
    Err(MqError::UnsupportedOperation("PUSH sockets cannot receive"))
  }

  fn has_out(&self) -> bool {
    self.lb.has_ready()
  }

  async fn attach_pipe(&self, pipe_id: usize, _peer_identity: &Blob) {
    self.lb.activate(pipe_id);
  }

  async fn pipe_terminated(&self, pipe_id: usize) {
    self.lb.remove(pipe_id);
  }

  async fn write_activated(&self, pipe_id: usize) {
    self.lb.activate(pipe_id);
  }
}
