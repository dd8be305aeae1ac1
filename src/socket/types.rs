use crate::error::MqResult;
use crate::message::Msg;
use crate::socket::ISocket;

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;

bitflags! {
  /// Per-call modifiers for [`Socket::send_with`].
  #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
  pub struct SendFlags: u8 {
    /// Fail with `WouldBlock` instead of waiting, regardless of SNDTIMEO.
    const DONT_WAIT = 0b001;
    /// More frames of this message follow.
    const SEND_MORE = 0b010;
    /// This frame is an administrative label, not user payload.
    const SEND_LABEL = 0b100;
  }
}

bitflags! {
  /// Per-call modifiers for [`Socket::recv_with`].
  #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
  pub struct RecvFlags: u8 {
    /// Fail with `WouldBlock` instead of waiting, regardless of RCVTIMEO.
    const DONT_WAIT = 0b001;
  }
}

/// The messaging pattern a socket implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketType {
  /// Exclusive one-to-one link between two peers.
  Pair,
  /// Publishes to every matching subscriber; absorbs subscription traffic
  /// and never receives.
  Pub,
  /// Subscribes by byte prefix and filters inbound messages locally.
  Sub,
  /// Strictly alternating request/reply client.
  Req,
  /// Strictly alternating request/reply service.
  Rep,
  /// Extended REQ: load-balances requests, fair-queues replies, no
  /// lockstep. Also known as XREQ.
  Dealer,
  /// Extended REP: addresses peers by identity for explicit routing. Also
  /// known as XREP.
  Router,
  /// Fair-queues from a pool of upstream PUSH peers.
  Pull,
  /// Load-balances to a pool of downstream PULL peers.
  Push,
  /// Low-level PUB: surfaces inbound (un)subscription messages to the user.
  XPub,
  /// Low-level SUB: subscription traffic is sent explicitly, nothing is
  /// filtered.
  XSub,
}

impl SocketType {
  /// Legacy alias for [`SocketType::Dealer`].
  pub const XREQ: SocketType = SocketType::Dealer;
  /// Legacy alias for [`SocketType::Router`].
  pub const XREP: SocketType = SocketType::Router;

  /// Wire-level type code, matching the classic C API numbering.
  pub(crate) fn to_raw(self) -> i32 {
    match self {
      SocketType::Pair => 0,
      SocketType::Pub => 1,
      SocketType::Sub => 2,
      SocketType::Req => 3,
      SocketType::Rep => 4,
      SocketType::Dealer => 5,
      SocketType::Router => 6,
      SocketType::Pull => 7,
      SocketType::Push => 8,
      SocketType::XPub => 9,
      SocketType::XSub => 10,
    }
  }
}

/// The public handle for one socket.
///
/// Handles are cheaply cloneable and shareable across tasks; operations are
/// delegated to the pattern logic and the socket's coordinator. After
/// [`Socket::close`] every operation fails with `Terminated`.
#[derive(Clone)]
pub struct Socket {
  pub(crate) inner: Arc<dyn ISocket>,
}

impl Socket {
  pub(crate) fn new(inner: Arc<dyn ISocket>) -> Self {
    Self { inner }
  }

  /// Binds the socket to listen on a local endpoint
  /// (e.g. `inproc://service`).
  pub async fn bind(&self, endpoint: &str) -> MqResult<()> {
    self.inner.core().bind(endpoint).await
  }

  /// Connects the socket to a peer endpoint.
  pub async fn connect(&self, endpoint: &str) -> MqResult<()> {
    let core = self.inner.core().clone();
    core.connect(&self.inner, endpoint).await
  }

  /// Sends a message according to the socket's pattern, honoring SNDTIMEO.
  pub async fn send(&self, msg: Msg) -> MqResult<()> {
    self.send_with(msg, SendFlags::empty()).await
  }

  /// Sends with per-call flags (`DONT_WAIT`, `SEND_MORE`, `SEND_LABEL`).
  pub async fn send_with(&self, msg: Msg, flags: SendFlags) -> MqResult<()> {
    self.inner.send(msg, flags).await
  }

  /// Receives the next message part, honoring RCVTIMEO. The LABEL/MORE bits
  /// of the delivered part are exposed through the `RCVLABEL`/`RCVMORE`
  /// options and stripped from the message itself.
  pub async fn recv(&self) -> MqResult<Msg> {
    self.recv_with(RecvFlags::empty()).await
  }

  /// Receives with per-call flags (`DONT_WAIT`).
  pub async fn recv_with(&self, flags: RecvFlags) -> MqResult<Msg> {
    let mut msg = self.inner.recv(flags).await?;
    self.inner.core().record_recv_flags(&mut msg);
    Ok(msg)
  }

  /// Sets a socket option from its raw byte encoding.
  pub async fn set_option(&self, option: i32, value: &[u8]) -> MqResult<()> {
    self.inner.xsetsockopt(option, value).await
  }

  /// Reads a socket option in its raw byte encoding.
  pub async fn get_option(&self, option: i32) -> MqResult<Vec<u8>> {
    self.inner.xgetsockopt(option, &[]).await
  }

  /// Reads an option that takes an input argument. The only such option is
  /// `SUBSCRIBE` on PUB/XPUB: `input` supplies a prefix and the result is
  /// the number of pipes subscribed at exactly that prefix.
  pub async fn get_option_with(&self, option: i32, input: &[u8]) -> MqResult<Vec<u8>> {
    self.inner.xgetsockopt(option, input).await
  }

  /// Hands the socket to the reaper and returns immediately. Destruction
  /// completes once all attached pipes finish their termination handshake.
  pub async fn close(&self) -> MqResult<()> {
    self.inner.core().close();
    Ok(())
  }
}

impl fmt::Debug for Socket {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Socket").finish_non_exhaustive()
  }
}
