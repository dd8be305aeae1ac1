use crate::error::{MqError, MqResult};
use crate::message::{Blob, Msg};
use crate::socket::core::{apply_send_flags, SocketCore};
use crate::socket::options;
use crate::socket::patterns::{Distributor, Mtrie};
use crate::socket::types::{RecvFlags, SendFlags};
use crate::socket::{events_value, ISocket};

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

/// Subscription control opcodes, the first byte of a control message.
pub(crate) const SUBSCRIBE_OP: u8 = 0x01;
pub(crate) const UNSUBSCRIBE_OP: u8 = 0x00;

/// XPUB: publishes to the pipes whose subscription prefixes match, and
/// surfaces inbound (un)subscription messages through `recv` so devices can
/// propagate them upstream. With `absorb` set (the PUB personality) control
/// messages update the trie silently and `recv` is refused.
#[derive(Debug)]
pub(crate) struct XPubSocket {
  core: Arc<SocketCore>,
  /// Subscription prefixes -> subscribed pipes.
  subscriptions: Mutex<Mtrie>,
  dist: Distributor,
  /// Control messages applied to the trie but not yet read by the user.
  /// Unbounded if the user never drains.
  pending: Mutex<VecDeque<Msg>>,
  pending_notify: Notify,
  absorb: bool,
}

impl XPubSocket {
  pub(crate) fn new(core: Arc<SocketCore>, absorb: bool) -> Self {
    Self {
      core,
      subscriptions: Mutex::new(Mtrie::new()),
      dist: Distributor::new(),
      pending: Mutex::new(VecDeque::new()),
      pending_notify: Notify::new(),
      absorb,
    }
  }

  /// Applies one inbound control message from a subscriber pipe to the trie.
  /// Only edges (first subscriber at a prefix, last one gone) are queued for
  /// the user; duplicates are absorbed unconditionally.
  fn apply_control(&self, pipe_id: usize, msg: Msg) {
    let Some(data) = msg.data() else {
      return;
    };
    let Some((&op, prefix)) = data.split_first() else {
      return;
    };
    let is_edge = match op {
      SUBSCRIBE_OP => self.subscriptions.lock().add(prefix, pipe_id),
      UNSUBSCRIBE_OP => self.subscriptions.lock().rm(prefix, pipe_id),
      _ => {
        tracing::trace!(handle = self.core.handle, pipe_id, op, "Dropping unknown control message");
        return;
      }
    };
    if is_edge && !self.absorb {
      self.pending.lock().push_back(msg);
      self.pending_notify.notify_one();
    }
  }
}

#[async_trait]
impl ISocket for XPubSocket {
  fn core(&self) -> &Arc<SocketCore> {
    &self.core
  }

  async fn send(&self, msg: Msg, flags: SendFlags) -> MqResult<()> {
    self.core.ensure_alive()?;
    let msg = apply_send_flags(msg, flags);
    let state = self.core.core_state.read();
    // The matched set is computed on the first frame and pinned by the
    // distributor until the last one. A subscriber at its high-water mark
    // misses the message; publishing never blocks.
    let subscriptions = &self.subscriptions;
    self.dist.send(&state.pipes, &msg, || {
      let mut matched = HashSet::new();
      let body = msg.data().unwrap_or_default();
      subscriptions.lock().matches(body, 0, |pipe| {
        matched.insert(pipe);
      });
      matched
    });
    Ok(())
  }

  async fn recv(&self, flags: RecvFlags) -> MqResult<Msg> {
    if self.absorb {
      return Err(MqError::UnsupportedOperation("PUB sockets cannot receive"));
    }
    self.core.ensure_alive()?;
    let (dont_block, deadline) = self.core.recv_deadline(flags);
    loop {
      if let Some(msg) = self.pending.lock().pop_front() {
        return Ok(msg);
      }
      if dont_block {
        return Err(MqError::WouldBlock);
      }
      self.core.wait_for(&self.pending_notify, &deadline).await?;
      self.core.ensure_alive()?;
    }
  }

  async fn xgetsockopt(&self, option: i32, input: &[u8]) -> MqResult<Vec<u8>> {
    match option {
      // Overloaded query: input supplies a prefix, the result is the number
      // of pipes subscribed at exactly that prefix.
      options::SUBSCRIBE => {
        self.core.ensure_alive()?;
        Ok((self.has_subs(input) as i32).to_ne_bytes().to_vec())
      }
      options::EVENTS => {
        self.core.ensure_alive()?;
        Ok(events_value(self.has_in(), self.has_out()))
      }
      _ => self.core.get_base_option(option),
    }
  }

  fn has_in(&self) -> bool {
    !self.absorb && !self.pending.lock().is_empty()
  }

  fn has_out(&self) -> bool {
    true
  }

  fn has_subs(&self, prefix: &[u8]) -> usize {
    self.subscriptions.lock().has(prefix)
  }

  async fn attach_pipe(&self, _pipe_id: usize, _peer_identity: &Blob) {
    // Nothing to announce; the pipe matters once it subscribes.
  }

  async fn pipe_terminated(&self, pipe_id: usize) {
    // Sweep the trie; prefixes this pipe was the last subscriber of turn
    // into synthetic unsubscriptions for the user.
    let mut emptied: Vec<Msg> = Vec::new();
    self.subscriptions.lock().rm_pipe(pipe_id, |prefix| {
      let mut body = Vec::with_capacity(1 + prefix.len());
      body.push(UNSUBSCRIBE_OP);
      body.extend_from_slice(prefix);
      emptied.push(Msg::from_vec(body));
    });
    if !self.absorb && !emptied.is_empty() {
      let mut pending = self.pending.lock();
      for msg in emptied {
        pending.push_back(msg);
      }
      drop(pending);
      self.pending_notify.notify_one();
    }
    self.dist.remove(pipe_id);
  }

  async fn read_activated(&self, pipe_id: usize) {
    // Subscribers only ever send control messages; drain them all.
    loop {
      let next = {
        let state = self.core.core_state.read();
        match state.pipes.get(&pipe_id) {
          Some(pipe) => pipe.read(),
          None => return,
        }
      };
      match next {
        Ok(Some(msg)) => self.apply_control(pipe_id, msg),
        Ok(None) | Err(_) => return,
      }
    }
  }
}
