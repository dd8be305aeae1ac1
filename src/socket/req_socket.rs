use crate::error::{MqError, MqResult};
use crate::message::{Blob, Msg, MsgFlags};
use crate::socket::core::SocketCore;
use crate::socket::patterns::{FairQueue, LoadBalancer};
use crate::socket::types::{RecvFlags, SendFlags};
use crate::socket::ISocket;

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

#[derive(Debug, Default)]
struct ReqState {
  /// A request is out; sends are refused until its reply is consumed.
  awaiting_reply: bool,
  /// Multipart request in progress (delimiter already sent).
  mid_send: bool,
  /// Pipe carrying the outstanding request; replies arriving on any other
  /// pipe are stale and dropped.
  current_pipe: Option<usize>,
  /// Reply delimiter consumed; body frames are being delivered.
  receiving_body: bool,
  /// Consuming the remaining frames of a stale or malformed reply.
  dropping_stale: bool,
}

/// REQ: lockstep request/reply client. Each request is prefixed with an
/// empty delimiter label and load-balanced to one peer; the reply must be
/// consumed before the next request. A hiccup on the request's pipe resets
/// the lockstep so the requester can start over.
#[derive(Debug)]
pub(crate) struct ReqSocket {
  core: Arc<SocketCore>,
  lb: LoadBalancer,
  fq: FairQueue,
  state: Mutex<ReqState>,
}

impl ReqSocket {
  pub(crate) fn new(core: Arc<SocketCore>) -> Self {
    Self {
      core,
      lb: LoadBalancer::new(),
      fq: FairQueue::new(),
      state: Mutex::new(ReqState::default()),
    }
  }

  fn reset_request(state: &mut ReqState) {
    state.awaiting_reply = false;
    state.mid_send = false;
    state.current_pipe = None;
    state.receiving_body = false;
  }
}

#[async_trait]
impl ISocket for ReqSocket {
  fn core(&self) -> &Arc<SocketCore> {
    &self.core
  }

  async fn send(&self, msg: Msg, flags: SendFlags) -> MqResult<()> {
    self.core.ensure_alive()?;
    let start_message = {
      let state = self.state.lock();
      if state.awaiting_reply {
        return Err(MqError::InvalidState(
          "a reply is pending; receive it before sending again",
        ));
      }
      !state.mid_send
    };

    if start_message {
      // The empty delimiter label opens the request envelope; its LABEL
      // flag also pins the load balancer to one pipe for the whole message.
      let mut delimiter = Msg::new();
      delimiter.set_flags(MsgFlags::LABEL);
      let pipe_id = self.core.send_via_lb(&self.lb, delimiter, SendFlags::empty()).await?;
      let mut state = self.state.lock();
      state.current_pipe = Some(pipe_id);
      state.mid_send = true;
    }

    let final_frame = !(flags.contains(SendFlags::SEND_MORE) || msg.is_more());
    self.core.send_via_lb(&self.lb, msg, flags).await?;

    let mut state = self.state.lock();
    if final_frame {
      state.awaiting_reply = true;
      state.mid_send = false;
    }
    Ok(())
  }

  async fn recv(&self, flags: RecvFlags) -> MqResult<Msg> {
    self.core.ensure_alive()?;
    if !self.state.lock().awaiting_reply {
      return Err(MqError::InvalidState("no request in flight"));
    }
    let (dont_block, deadline) = self.core.recv_deadline(flags);
    loop {
      // A hiccup may have reset the lockstep while we waited.
      if !self.state.lock().awaiting_reply {
        return Err(MqError::InvalidState("request was interrupted"));
      }
      let got = {
        let state = self.core.core_state.read();
        self.fq.try_recv(&state.pipes)
      };
      match got {
        Some((pipe_id, msg)) => {
          let mut state = self.state.lock();
          let continues = msg.is_more() || msg.is_label();
          if state.dropping_stale {
            state.dropping_stale = continues;
            continue;
          }
          if state.current_pipe != Some(pipe_id) && !state.receiving_body {
            // Reply from an earlier, superseded connection.
            state.dropping_stale = continues;
            continue;
          }
          if !state.receiving_body {
            if msg.is_label() && msg.size() == 0 {
              state.receiving_body = true;
              continue;
            }
            // A reply without the delimiter is malformed; discard it.
            state.dropping_stale = continues;
            continue;
          }
          if !continues {
            Self::reset_request(&mut state);
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
    self.state.lock().awaiting_reply && self.core.any_pipe_readable()
  }

  fn has_out(&self) -> bool {
    !self.state.lock().awaiting_reply && self.core.any_pipe_writable()
  }

  async fn attach_pipe(&self, pipe_id: usize, _peer_identity: &Blob) {
    self.lb.activate(pipe_id);
  }

  async fn pipe_terminated(&self, pipe_id: usize) {
    self.lb.remove(pipe_id);
    self.fq.remove(pipe_id);
    let mut state = self.state.lock();
    if state.current_pipe == Some(pipe_id) {
      // The peer carrying the outstanding request is gone; the reply will
      // never arrive.
      Self::reset_request(&mut state);
      drop(state);
      self.fq.kick();
    }
  }

  async fn read_activated(&self, pipe_id: usize) {
    self.fq.activate(pipe_id);
  }

  async fn write_activated(&self, pipe_id: usize) {
    self.lb.activate(pipe_id);
  }

  async fn hiccuped(&self, pipe_id: usize) {
    let mut state = self.state.lock();
    if state.current_pipe == Some(pipe_id) && state.awaiting_reply {
      tracing::debug!(
        handle = self.core.handle,
        pipe_id,
        "Connection hiccup discarded the outstanding request; resetting lockstep"
      );
      Self::reset_request(&mut state);
      drop(state);
      self.fq.kick();
    }
  }
}

#[cfg(test)]
mod tests {
  use crate::{Context, Msg, MqError, RecvFlags, SocketType};
  use std::time::Duration;

  #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
  async fn hiccup_resets_the_lockstep() -> Result<(), MqError> {
    let ctx = Context::new()?;
    let rep = ctx.socket(SocketType::Rep)?;
    let req = ctx.socket(SocketType::Req)?;
    let endpoint = "inproc://req-hiccup-resync";
    rep.bind(endpoint).await?;
    req.connect(endpoint).await?;

    req.send(Msg::from_static(b"lost request")).await?;
    assert!(matches!(
      req.send(Msg::from_static(b"too soon")).await,
      Err(MqError::InvalidState(_))
    ));

    // The transport reconnected and dropped the in-flight request.
    {
      let core = req.inner.core();
      let state = core.core_state.read();
      state.pipes.values().next().expect("request pipe attached").hiccup();
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Lockstep is back at the sending state; the reply will never come and
    // a waiting receive reports the interruption.
    assert!(matches!(
      req.recv_with(RecvFlags::DONT_WAIT).await,
      Err(MqError::InvalidState(_))
    ));
    req.send(Msg::from_static(b"retried request")).await?;

    ctx.term().await?;
    Ok(())
  }
}
