//! Socket machinery: the capability trait, the coordinator, per-pattern
//! implementations, options, and helper patterns.

pub(crate) mod core;
pub mod options;
pub(crate) mod patterns;
pub mod types;

pub(crate) mod dealer_socket;
pub(crate) mod pair_socket;
pub(crate) mod pub_socket;
pub(crate) mod pull_socket;
pub(crate) mod push_socket;
pub(crate) mod rep_socket;
pub(crate) mod req_socket;
pub(crate) mod router_socket;
pub(crate) mod sub_socket;
pub(crate) mod xpub_socket;
pub(crate) mod xsub_socket;

use crate::context::Context;
use crate::error::MqResult;
use crate::message::{Blob, Msg, PollEvents};
use crate::runtime::{mailbox, MailboxSender};
use crate::socket::core::SocketCore;
use crate::socket::options::SocketOptions;
use crate::socket::types::{RecvFlags, SendFlags};

use std::sync::Arc;

use async_trait::async_trait;

pub use types::{Socket, SocketType};

/// The capability set a socket pattern supplies. Operations a pattern does
/// not override keep their defaults: sends and receives that do not apply
/// fail in the concrete types, readiness probes report not-ready, and pipe
/// events are ignored.
#[async_trait]
pub(crate) trait ISocket: Send + Sync + 'static {
  /// The coordinator carrying shared state for this socket.
  fn core(&self) -> &Arc<SocketCore>;

  /// Pattern-specific send.
  async fn send(&self, msg: Msg, flags: SendFlags) -> MqResult<()>;

  /// Pattern-specific receive.
  async fn recv(&self, flags: RecvFlags) -> MqResult<Msg>;

  /// Option write with pattern overrides; the default is the generic parser.
  async fn xsetsockopt(&self, option: i32, value: &[u8]) -> MqResult<()> {
    self.core().set_base_option(option, value)
  }

  /// Option read with pattern overrides. `EVENTS` never blocks: it reports
  /// the OR of POLLIN/POLLOUT from the readiness probes.
  async fn xgetsockopt(&self, option: i32, input: &[u8]) -> MqResult<Vec<u8>> {
    let _ = input;
    match option {
      options::EVENTS => {
        self.core().ensure_alive()?;
        Ok(events_value(self.has_in(), self.has_out()))
      }
      _ => self.core().get_base_option(option),
    }
  }

  /// True when a receive could currently succeed.
  fn has_in(&self) -> bool {
    false
  }

  /// True when a send could currently succeed.
  fn has_out(&self) -> bool {
    false
  }

  /// Number of pipes subscribed at exactly the given prefix (PUB/XPUB).
  fn has_subs(&self, _prefix: &[u8]) -> usize {
    0
  }

  /// A new pipe was attached; `peer_identity` is the peer's identity, auto
  /// assigned when the peer supplied none.
  async fn attach_pipe(&self, pipe_id: usize, peer_identity: &Blob);

  /// The pipe finished its termination handshake and is gone.
  async fn pipe_terminated(&self, _pipe_id: usize) {}

  /// The pipe became readable (empty -> non-empty edge).
  async fn read_activated(&self, _pipe_id: usize) {}

  /// The pipe became writable again (full -> not-full edge).
  async fn write_activated(&self, _pipe_id: usize) {}

  /// In-flight messages on the pipe were discarded by the transport.
  async fn hiccuped(&self, _pipe_id: usize) {}
}

/// Encodes the `EVENTS` option value.
pub(crate) fn events_value(has_in: bool, has_out: bool) -> Vec<u8> {
  let mut events = PollEvents::empty();
  if has_in {
    events |= PollEvents::POLLIN;
  }
  if has_out {
    events |= PollEvents::POLLOUT;
  }
  events.bits().to_ne_bytes().to_vec()
}

/// Builds the coordinator and pattern logic for one socket and spawns its
/// command loop. Called by `Context::socket`.
pub(crate) fn create_socket(
  handle: usize,
  ctx: Context,
  socket_type: SocketType,
) -> (Arc<dyn ISocket>, MailboxSender) {
  let (command_tx, command_rx) = mailbox();
  let options = SocketOptions {
    filter: socket_type == SocketType::Sub,
    ..SocketOptions::default()
  };
  let core = Arc::new(SocketCore::new(handle, ctx, socket_type, options, command_tx.clone()));

  let logic: Arc<dyn ISocket> = match socket_type {
    SocketType::Pair => Arc::new(pair_socket::PairSocket::new(core.clone())),
    SocketType::Pub => Arc::new(pub_socket::PubSocket::new(core.clone())),
    SocketType::Sub => Arc::new(sub_socket::SubSocket::new(core.clone())),
    SocketType::Req => Arc::new(req_socket::ReqSocket::new(core.clone())),
    SocketType::Rep => Arc::new(rep_socket::RepSocket::new(core.clone())),
    SocketType::Dealer => Arc::new(dealer_socket::DealerSocket::new(core.clone())),
    SocketType::Router => Arc::new(router_socket::RouterSocket::new(core.clone())),
    SocketType::Pull => Arc::new(pull_socket::PullSocket::new(core.clone())),
    SocketType::Push => Arc::new(push_socket::PushSocket::new(core.clone())),
    SocketType::XPub => Arc::new(xpub_socket::XPubSocket::new(core.clone(), false)),
    SocketType::XSub => Arc::new(xsub_socket::XSubSocket::new(core.clone())),
  };

  tokio::spawn(core.run_command_loop(command_rx, logic.clone()));
  (logic, command_tx)
}
