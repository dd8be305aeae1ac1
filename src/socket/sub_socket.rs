use crate::error::{MqError, MqResult};
use crate::message::{Blob, Msg};
use crate::socket::core::SocketCore;
use crate::socket::options::{SUBSCRIBE, UNSUBSCRIBE};
use crate::socket::types::{RecvFlags, SendFlags};
use crate::socket::xpub_socket::{SUBSCRIBE_OP, UNSUBSCRIBE_OP};
use crate::socket::xsub_socket::XSubSocket;
use crate::socket::ISocket;

use std::sync::Arc;

use async_trait::async_trait;

/// SUB: the XSUB machinery with filtering switched on and the control
/// channel driven through `SUBSCRIBE`/`UNSUBSCRIBE` options instead of
/// explicit sends. Application sends are refused.
#[derive(Debug)]
pub(crate) struct SubSocket {
  inner: XSubSocket,
}

impl SubSocket {
  pub(crate) fn new(core: Arc<SocketCore>) -> Self {
    Self {
      inner: XSubSocket::new(core),
    }
  }

  fn control_message(op: u8, prefix: &[u8]) -> Msg {
    let mut body = Vec::with_capacity(1 + prefix.len());
    body.push(op);
    body.extend_from_slice(prefix);
    Msg::from_vec(body)
  }
}

#[async_trait]
impl ISocket for SubSocket {
  fn core(&self) -> &Arc<SocketCore> {
    self.inner.core()
  }

  async fn send(&self, _msg: Msg, _flags: SendFlags) -> MqResult<()> {
    Err(MqError::UnsupportedOperation("SUB sockets cannot send"))
  }

  async fn recv(&self, flags: RecvFlags) -> MqResult<Msg> {
    self.inner.recv(flags).await
  }

  async fn xsetsockopt(&self, option: i32, value: &[u8]) -> MqResult<()> {
    match option {
      // Build the control message and push it down the XSUB send path: the
      // table is updated and every connected publisher is informed.
      SUBSCRIBE => self.inner.send(Self::control_message(SUBSCRIBE_OP, value), SendFlags::empty()).await,
      UNSUBSCRIBE => {
        self
          .inner
          .send(Self::control_message(UNSUBSCRIBE_OP, value), SendFlags::empty())
          .await
      }
      _ => self.core().set_base_option(option, value),
    }
  }

  fn has_in(&self) -> bool {
    self.inner.has_in()
  }

  async fn attach_pipe(&self, pipe_id: usize, peer_identity: &Blob) {
    self.inner.attach_pipe(pipe_id, peer_identity).await;
  }

  async fn pipe_terminated(&self, pipe_id: usize) {
    self.inner.pipe_terminated(pipe_id).await;
  }

  async fn read_activated(&self, pipe_id: usize) {
    self.inner.read_activated(pipe_id).await;
  }
}
