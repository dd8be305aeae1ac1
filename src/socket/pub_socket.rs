use crate::error::{MqError, MqResult};
use crate::message::{Blob, Msg};
use crate::socket::core::SocketCore;
use crate::socket::types::{RecvFlags, SendFlags};
use crate::socket::xpub_socket::XPubSocket;
use crate::socket::ISocket;

use std::sync::Arc;

use async_trait::async_trait;

/// PUB: the XPUB machinery with subscription traffic absorbed silently.
/// Subscriptions still drive the match trie; they are just never surfaced,
/// and receiving is refused outright.
#[derive(Debug)]
pub(crate) struct PubSocket {
  inner: XPubSocket,
}

impl PubSocket {
  pub(crate) fn new(core: Arc<SocketCore>) -> Self {
    Self {
      inner: XPubSocket::new(core, true),
    }
  }
}

#[async_trait]
impl ISocket for PubSocket {
  fn core(&self) -> &Arc<SocketCore> {
    self.inner.core()
  }

  async fn send(&self, msg: Msg, flags: SendFlags) -> MqResult<()> {
    self.inner.send(msg, flags).await
  }

  async fn recv(&self, _flags: RecvFlags) -> MqResult<Msg> {
    Err(MqError::UnsupportedOperation("PUB sockets cannot receive"))
  }

  async fn xgetsockopt(&self, option: i32, input: &[u8]) -> MqResult<Vec<u8>> {
    self.inner.xgetsockopt(option, input).await
  }

  fn has_out(&self) -> bool {
    self.inner.has_out()
  }

  fn has_subs(&self, prefix: &[u8]) -> usize {
    self.inner.has_subs(prefix)
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
