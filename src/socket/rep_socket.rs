use crate::error::{MqError, MqResult};
use crate::message::{Blob, Msg};
use crate::socket::core::{apply_send_flags, SocketCore};
use crate::socket::patterns::FairQueue;
use crate::socket::types::{RecvFlags, SendFlags};
use crate::socket::ISocket;

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct RepState {
  /// Label frames (routing identities plus the empty delimiter) that opened
  /// the request in hand; replayed in front of the reply.
  envelope: Vec<Msg>,
  /// How many envelope frames of the current reply are already written.
  envelope_sent: usize,
  /// Pipe the request arrived on; `None` once the requester disappeared
  /// (the reply is then dropped, as the wire would have done).
  reply_pipe: Option<usize>,
  /// Request fully received; a reply may be sent and receives are refused.
  reply_pending: bool,
}

/// REP: lockstep request/reply service. Requests are fair-queued; the label
/// envelope that precedes each request body is saved and replayed in front
/// of the reply so it finds its way back through intermediary hops.
#[derive(Debug)]
pub(crate) struct RepSocket {
  core: Arc<SocketCore>,
  fq: FairQueue,
  state: Mutex<RepState>,
  out_notify: Notify,
}

impl RepSocket {
  pub(crate) fn new(core: Arc<SocketCore>) -> Self {
    Self {
      core,
      fq: FairQueue::new(),
      state: Mutex::new(RepState::default()),
      out_notify: Notify::new(),
    }
  }
}

#[async_trait]
impl ISocket for RepSocket {
  fn core(&self) -> &Arc<SocketCore> {
    &self.core
  }

  async fn send(&self, msg: Msg, flags: SendFlags) -> MqResult<()> {
    self.core.ensure_alive()?;
    let reply_pipe = {
      let state = self.state.lock();
      if !state.reply_pending {
        return Err(MqError::InvalidState("no request pending; receive one first"));
      }
      state.reply_pipe
    };
    let (dont_block, deadline) = self.core.send_deadline(flags);

    // Replay the saved envelope ahead of the first body frame.
    loop {
      let frame = {
        let state = self.state.lock();
        state.envelope.get(state.envelope_sent).cloned()
      };
      let Some(frame) = frame else { break };
      match reply_pipe {
        Some(pipe_id) => {
          self
            .core
            .send_to_pipe(pipe_id, frame, dont_block, &deadline, &self.out_notify)
            .await?
        }
        None => {}
      }
      self.state.lock().envelope_sent += 1;
    }

    let final_frame = !(flags.contains(SendFlags::SEND_MORE) || msg.is_more());
    let msg = apply_send_flags(msg, flags);
    if let Some(pipe_id) = reply_pipe {
      self
        .core
        .send_to_pipe(pipe_id, msg, dont_block, &deadline, &self.out_notify)
        .await?;
    }

    if final_frame {
      let mut state = self.state.lock();
      state.reply_pending = false;
      state.reply_pipe = None;
      state.envelope.clear();
      state.envelope_sent = 0;
    }
    Ok(())
  }

  async fn recv(&self, flags: RecvFlags) -> MqResult<Msg> {
    self.core.ensure_alive()?;
    if self.state.lock().reply_pending {
      return Err(MqError::InvalidState("a reply is pending; send it before receiving again"));
    }
    let (dont_block, deadline) = self.core.recv_deadline(flags);
    loop {
      let got = {
        let state = self.core.core_state.read();
        self.fq.try_recv(&state.pipes)
      };
      match got {
        Some((pipe_id, msg)) => {
          let mut state = self.state.lock();
          if state.reply_pipe != Some(pipe_id) {
            // A new source: any envelope collected from a peer that died
            // mid-request is stale.
            state.envelope.clear();
          }
          state.reply_pipe = Some(pipe_id);
          if msg.is_label() {
            // Envelope frame: saved for the reply, not delivered.
            state.envelope.push(msg);
            continue;
          }
          if !msg.is_more() {
            state.reply_pending = true;
          }
          return Ok(msg);
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
    !self.state.lock().reply_pending && self.core.any_pipe_readable()
  }

  fn has_out(&self) -> bool {
    self.state.lock().reply_pending
  }

  async fn attach_pipe(&self, _pipe_id: usize, _peer_identity: &Blob) {}

  async fn pipe_terminated(&self, pipe_id: usize) {
    self.fq.remove(pipe_id);
    let mut state = self.state.lock();
    if state.reply_pipe == Some(pipe_id) {
      // Requester is gone; the reply in progress is quietly dropped.
      state.reply_pipe = None;
    }
    drop(state);
    self.out_notify.notify_one();
  }

  async fn read_activated(&self, pipe_id: usize) {
    self.fq.activate(pipe_id);
  }

  async fn write_activated(&self, _pipe_id: usize) {
    self.out_notify.notify_one();
  }
}
