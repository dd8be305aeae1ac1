use crate::context::{Context, EndpointEntry};
use crate::error::{MqError, MqResult};
use crate::message::{Blob, Msg, MsgFlags};
use crate::runtime::pipe::Pipe;
use crate::runtime::{Command, MailboxReceiver, MailboxSender};
use crate::socket::options::{self, SocketOptions};
use crate::socket::patterns::{FairQueue, LbError, LoadBalancer};
use crate::socket::types::{RecvFlags, SendFlags, SocketType};
use crate::socket::ISocket;
use crate::transport::endpoint::{check_protocol, parse_endpoint, Scheme};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::Notify;

/// Upper bound on commands the loop processes before yielding, so one busy
/// mailbox cannot monopolize a worker and command latency stays bounded
/// independent of queue growth.
pub(crate) const MAX_COMMANDS_PER_BATCH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SocketState {
  Active,
  Terminating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopAction {
  Continue,
  Exit,
}

/// Mutable state shared between the user-facing calls and the command loop.
/// The lock is never held across an await.
#[derive(Debug)]
pub(crate) struct CoreState {
  pub(crate) options: SocketOptions,
  pub(crate) socket_type: SocketType,
  pub(crate) pipes: HashMap<usize, Pipe>,
  pub(crate) state: SocketState,
  /// Set when the context broadcast `Stop`; every user call except close
  /// fails `Terminated` from then on.
  pub(crate) ctx_terminated: bool,
  /// Set synchronously by `close()` so calls racing the close observe it.
  pub(crate) closing: bool,
  /// Termination acks still outstanding before the socket may be destroyed.
  pub(crate) pending_term_acks: usize,
  /// LABEL/MORE flags of the most recently delivered message, surfaced via
  /// the RCVLABEL/RCVMORE options.
  pub(crate) rcvmore: bool,
  pub(crate) rcvlabel: bool,
}

/// The coordinator behind one socket: owns the option record, the attached
/// pipes, and the command mailbox, and runs the termination state machine.
pub(crate) struct SocketCore {
  pub(crate) handle: usize,
  pub(crate) context: Context,
  command_sender: MailboxSender,
  pub(crate) core_state: parking_lot::RwLock<CoreState>,
  /// Wakes callers blocked in a timed send/recv when the socket leaves
  /// normal operation, so they observe `Terminated` instead of sleeping on.
  term_notify: Notify,
}

impl SocketCore {
  pub(crate) fn new(
    handle: usize,
    context: Context,
    socket_type: SocketType,
    options: SocketOptions,
    command_sender: MailboxSender,
  ) -> Self {
    Self {
      handle,
      context,
      command_sender,
      core_state: parking_lot::RwLock::new(CoreState {
        options,
        socket_type,
        pipes: HashMap::new(),
        state: SocketState::Active,
        ctx_terminated: false,
        closing: false,
        pending_term_acks: 0,
        rcvmore: false,
        rcvlabel: false,
      }),
      term_notify: Notify::new(),
    }
  }

  pub(crate) fn command_sender(&self) -> MailboxSender {
    self.command_sender.clone()
  }

  /// Fails with `Terminated` once the socket left normal operation.
  pub(crate) fn ensure_alive(&self) -> MqResult<()> {
    let state = self.core_state.read();
    if state.ctx_terminated || state.closing || state.state != SocketState::Active {
      return Err(MqError::Terminated);
    }
    Ok(())
  }

  // --- Endpoint operations -------------------------------------------------

  /// Binds the socket to a local endpoint.
  pub(crate) async fn bind(&self, endpoint: &str) -> MqResult<()> {
    self.ensure_alive()?;
    let ep = parse_endpoint(endpoint)?;
    let socket_type = self.core_state.read().socket_type;
    check_protocol(&ep, socket_type)?;

    match ep.scheme {
      Scheme::Inproc | Scheme::Sys => {
        let entry = EndpointEntry {
          socket_handle: self.handle,
          mailbox: self.command_sender(),
          options: self.core_state.read().options.clone(),
        };
        self.context.inner().register_endpoint(ep.uri.clone(), entry)?;
        tracing::info!(handle = self.handle, endpoint = %ep.uri, "Socket bound");
        Ok(())
      }
      Scheme::Tcp | Scheme::Ipc => {
        let affinity = self.core_state.read().options.affinity;
        let io_thread = self
          .context
          .inner()
          .choose_io_thread(affinity)
          .ok_or(MqError::NoIoThread)?;
        tracing::debug!(
          handle = self.handle,
          address = %ep.address,
          io_thread = io_thread.id,
          "No stream listener engine in this build"
        );
        Err(MqError::UnsupportedTransport(ep.uri))
      }
      // Multicast bind is interchangeable with connect; check_protocol has
      // already rejected it in this build.
      Scheme::Pgm | Scheme::Epgm => Err(MqError::UnsupportedTransport(ep.uri)),
    }
  }

  /// Connects the socket to a remote endpoint.
  pub(crate) async fn connect(self: &Arc<Self>, logic: &Arc<dyn ISocket>, endpoint: &str) -> MqResult<()> {
    self.ensure_alive()?;
    let ep = parse_endpoint(endpoint)?;
    let socket_type = self.core_state.read().socket_type;
    check_protocol(&ep, socket_type)?;

    match ep.scheme {
      Scheme::Inproc | Scheme::Sys => crate::transport::inproc::connect_inproc(self, logic, &ep.uri).await,
      Scheme::Tcp | Scheme::Ipc => {
        let affinity = self.core_state.read().options.affinity;
        let _io_thread = self
          .context
          .inner()
          .choose_io_thread(affinity)
          .ok_or(MqError::NoIoThread)?;
        // A connecter session would be launched on the chosen worker here
        // (pre-creating its pipe pair when immediate_connect is set).
        Err(MqError::UnsupportedTransport(ep.uri))
      }
      Scheme::Pgm | Scheme::Epgm => Err(MqError::UnsupportedTransport(ep.uri)),
    }
  }

  /// Hands the socket to the reaper. Returns immediately; the command loop
  /// runs the termination cascade.
  pub(crate) fn close(&self) {
    self.core_state.write().closing = true;
    self.notify_terminating();
    let _ = self.command_sender.try_send(Command::UserClose);
    tracing::debug!(handle = self.handle, "Socket close requested");
  }

  fn notify_terminating(&self) {
    self.term_notify.notify_waiters();
    // Waiters not yet registered pick up the stored permit.
    self.term_notify.notify_one();
  }

  /// Blocks until `notify` fires, the socket starts terminating, or the
  /// deadline passes (`WouldBlock`). Callers re-check their condition and
  /// `ensure_alive` after every wakeup.
  pub(crate) async fn wait_for(&self, notify: &Notify, deadline: &Deadline) -> MqResult<()> {
    let wake = async {
      tokio::select! {
        _ = notify.notified() => {}
        _ = self.term_notify.notified() => {}
      }
    };
    match deadline {
      Deadline::Infinite => {
        wake.await;
        Ok(())
      }
      Deadline::At(instant) => match tokio::time::timeout_at(*instant, wake).await {
        Ok(()) => Ok(()),
        Err(_) => Err(MqError::WouldBlock),
      },
    }
  }

  // --- Pipe attachment -----------------------------------------------------

  /// Registers a new pipe and introduces it to the pattern logic. An empty
  /// peer identity is replaced with a fresh auto-assigned one. Pipes that
  /// arrive while the socket is already terminating are told to terminate
  /// straight away.
  pub(crate) async fn attach_pipe(&self, logic: &Arc<dyn ISocket>, pipe: Pipe, peer_identity: Blob) {
    let pipe_id = pipe.id();
    let identity = if peer_identity.is_empty() {
      generate_identity()
    } else {
      peer_identity
    };
    let already_terminating = {
      let mut state = self.core_state.write();
      state.pipes.insert(pipe_id, pipe);
      state.state == SocketState::Terminating
    };
    tracing::debug!(handle = self.handle, pipe_id, "Pipe attached");
    logic.attach_pipe(pipe_id, &identity).await;

    // The peer may have written (e.g. replayed subscriptions) before this
    // side attached; the empty->non-empty edge for those frames fired into
    // the void. A level check here recovers them.
    let has_backlog = {
      let state = self.core_state.read();
      state.pipes.get(&pipe_id).map(|p| p.check_read()).unwrap_or(false)
    };
    if has_backlog {
      logic.read_activated(pipe_id).await;
    }

    if already_terminating {
      let mut state = self.core_state.write();
      if let Some(p) = state.pipes.get(&pipe_id) {
        if p.terminate() {
          state.pending_term_acks += 1;
        } else {
          state.pipes.remove(&pipe_id);
        }
      }
    }
  }

  /// Asks one attached pipe to terminate (used by patterns that reject a
  /// connection, e.g. an identity collision on ROUTER).
  pub(crate) fn initiate_pipe_term(&self, pipe_id: usize) {
    let mut state = self.core_state.write();
    if let Some(pipe) = state.pipes.get(&pipe_id) {
      if pipe.terminate() {
        state.pending_term_acks += 1;
      } else {
        state.pipes.remove(&pipe_id);
      }
    }
  }

  // --- Options -------------------------------------------------------------

  pub(crate) fn set_base_option(&self, option: i32, value: &[u8]) -> MqResult<()> {
    self.ensure_alive()?;
    let mut state = self.core_state.write();
    match option {
      options::SNDHWM => state.options.sndhwm = options::parse_hwm_option(value, option)?,
      options::RCVHWM => state.options.rcvhwm = options::parse_hwm_option(value, option)?,
      options::SNDTIMEO => state.options.sndtimeo = options::parse_timeout_option(value, option)?,
      options::RCVTIMEO => state.options.rcvtimeo = options::parse_timeout_option(value, option)?,
      options::LINGER => state.options.linger = options::parse_linger_option(value)?,
      options::AFFINITY => state.options.affinity = options::parse_affinity_option(value)?,
      options::IDENTITY => state.options.identity = Some(options::parse_identity_option(value)?),
      options::DELAY_ON_CLOSE => state.options.delay_on_close = options::parse_bool_option(value, option)?,
      options::DELAY_ON_DISCONNECT => {
        state.options.delay_on_disconnect = options::parse_bool_option(value, option)?
      }
      options::IMMEDIATE_CONNECT => state.options.immediate_connect = options::parse_bool_option(value, option)?,
      // Pattern options land here only when the type did not claim them.
      options::SUBSCRIBE | options::UNSUBSCRIBE => return Err(MqError::UnsupportedOption(option)),
      // Read-only introspection options.
      options::TYPE | options::RCVMORE | options::RCVLABEL | options::EVENTS => {
        return Err(MqError::InvalidOption(option))
      }
      _ => return Err(MqError::InvalidOption(option)),
    }
    Ok(())
  }

  pub(crate) fn get_base_option(&self, option: i32) -> MqResult<Vec<u8>> {
    self.ensure_alive()?;
    let state = self.core_state.read();
    let int = |v: i32| v.to_ne_bytes().to_vec();
    let timeout = |t: Option<Duration>| match t {
      None => int(-1),
      Some(d) => int(d.as_millis() as i32),
    };
    match option {
      options::TYPE => Ok(int(state.socket_type.to_raw())),
      options::RCVMORE => Ok(int(state.rcvmore as i32)),
      options::RCVLABEL => Ok(int(state.rcvlabel as i32)),
      options::SNDHWM => Ok(int(state.options.sndhwm as i32)),
      options::RCVHWM => Ok(int(state.options.rcvhwm as i32)),
      options::SNDTIMEO => Ok(timeout(state.options.sndtimeo)),
      options::RCVTIMEO => Ok(timeout(state.options.rcvtimeo)),
      options::LINGER => Ok(timeout(state.options.linger)),
      options::AFFINITY => Ok(state.options.affinity.to_ne_bytes().to_vec()),
      options::IDENTITY => Ok(state.options.identity.as_ref().map(|b| b.to_vec()).unwrap_or_default()),
      options::DELAY_ON_CLOSE => Ok(int(state.options.delay_on_close as i32)),
      options::DELAY_ON_DISCONNECT => Ok(int(state.options.delay_on_disconnect as i32)),
      options::IMMEDIATE_CONNECT => Ok(int(state.options.immediate_connect as i32)),
      _ => Err(MqError::InvalidOption(option)),
    }
  }

  /// Stores the delivered message's LABEL/MORE bits for the RCVLABEL/RCVMORE
  /// options and strips them from the message handed to the user.
  pub(crate) fn record_recv_flags(&self, msg: &mut Msg) {
    let label = msg.is_label();
    let more = msg.is_more() || label;
    {
      let mut state = self.core_state.write();
      state.rcvlabel = label;
      state.rcvmore = more;
    }
    msg.reset_flags(MsgFlags::MORE | MsgFlags::LABEL);
  }

  // --- Readiness probes ----------------------------------------------------

  pub(crate) fn any_pipe_readable(&self) -> bool {
    self.core_state.read().pipes.values().any(|p| p.check_read())
  }

  pub(crate) fn any_pipe_writable(&self) -> bool {
    self.core_state.read().pipes.values().any(|p| p.check_write())
  }

  // --- Deadline helpers ----------------------------------------------------

  pub(crate) fn send_deadline(&self, flags: SendFlags) -> (bool, Deadline) {
    let timeout = self.core_state.read().options.sndtimeo;
    let dont_block = flags.contains(SendFlags::DONT_WAIT) || timeout == Some(Duration::ZERO);
    (dont_block, Deadline::new(timeout))
  }

  pub(crate) fn recv_deadline(&self, flags: RecvFlags) -> (bool, Deadline) {
    let timeout = self.core_state.read().options.rcvtimeo;
    let dont_block = flags.contains(RecvFlags::DONT_WAIT) || timeout == Some(Duration::ZERO);
    (dont_block, Deadline::new(timeout))
  }

  /// Load-balanced send with the socket's timeout discipline. Shared by the
  /// PUSH/DEALER/REQ/PAIR family. Returns the pipe the frame went to.
  pub(crate) async fn send_via_lb(&self, lb: &LoadBalancer, msg: Msg, flags: SendFlags) -> MqResult<usize> {
    self.ensure_alive()?;
    let mut msg = apply_send_flags(msg, flags);
    let (dont_block, deadline) = self.send_deadline(flags);
    loop {
      let attempt = {
        let state = self.core_state.read();
        lb.try_send(&state.pipes, msg)
      };
      match attempt {
        Ok(pipe_id) => return Ok(pipe_id),
        Err(LbError::WouldBlock(m)) => {
          if dont_block {
            return Err(MqError::WouldBlock);
          }
          msg = m;
          self.wait_for(lb.notify_handle(), &deadline).await?;
          self.ensure_alive()?;
        }
      }
    }
  }

  /// Fair-queued receive with the socket's timeout discipline. Shared by the
  /// PULL/DEALER/REP/ROUTER/PAIR family. Returns the source pipe id.
  pub(crate) async fn recv_via_fq(&self, fq: &FairQueue, flags: RecvFlags) -> MqResult<(usize, Msg)> {
    self.ensure_alive()?;
    let (dont_block, deadline) = self.recv_deadline(flags);
    loop {
      let got = {
        let state = self.core_state.read();
        fq.try_recv(&state.pipes)
      };
      if let Some(pair) = got {
        return Ok(pair);
      }
      if dont_block {
        return Err(MqError::WouldBlock);
      }
      self.wait_for(fq.notify_handle(), &deadline).await?;
      self.ensure_alive()?;
    }
  }

  /// Writes one frame to a specific pipe with the socket's timeout
  /// discipline. A pipe that is gone or closes mid-wait swallows the frame
  /// silently, the way the wire would have dropped it. Used by the
  /// addressed-reply patterns (REP, ROUTER).
  pub(crate) async fn send_to_pipe(
    &self,
    pipe_id: usize,
    msg: Msg,
    dont_block: bool,
    deadline: &Deadline,
    notify: &Notify,
  ) -> MqResult<()> {
    let mut msg = msg;
    loop {
      let attempt = {
        let state = self.core_state.read();
        match state.pipes.get(&pipe_id) {
          None => return Ok(()),
          Some(pipe) => pipe.write(msg),
        }
      };
      match attempt {
        Ok(()) => return Ok(()),
        Err(crate::runtime::pipe::PipeWriteError::Full(m)) => {
          if dont_block {
            return Err(MqError::WouldBlock);
          }
          msg = m;
          self.wait_for(notify, deadline).await?;
          self.ensure_alive()?;
        }
        Err(crate::runtime::pipe::PipeWriteError::Closed(_)) => return Ok(()),
      }
    }
  }

  // --- Command loop --------------------------------------------------------

  pub(crate) async fn run_command_loop(self: Arc<Self>, rx: MailboxReceiver, logic: Arc<dyn ISocket>) {
    tracing::debug!(handle = self.handle, "Socket command loop started");
    'outer: loop {
      let cmd = match rx.recv().await {
        Ok(cmd) => cmd,
        Err(_) => break,
      };
      if self.process_command(&logic, cmd).await == LoopAction::Exit {
        break;
      }
      let mut processed = 1usize;
      while processed < MAX_COMMANDS_PER_BATCH {
        match rx.try_recv() {
          Ok(cmd) => {
            processed += 1;
            if self.process_command(&logic, cmd).await == LoopAction::Exit {
              break 'outer;
            }
          }
          Err(_) => continue 'outer,
        }
      }
      tokio::task::yield_now().await;
    }

    // Ownership of the residue transfers to the reaper.
    let reaper = self.context.inner().reaper_mailbox();
    let _ = reaper.try_send(Command::Reap {
      socket_handle: self.handle,
      residual: rx.clone(),
    });
    tracing::debug!(handle = self.handle, "Socket command loop ended");
  }

  async fn process_command(&self, logic: &Arc<dyn ISocket>, cmd: Command) -> LoopAction {
    tracing::trace!(handle = self.handle, command = cmd.variant_name(), "Processing command");
    match cmd {
      Command::Stop => {
        self.core_state.write().ctx_terminated = true;
        self.begin_termination(logic).await
      }
      Command::UserClose => self.begin_termination(logic).await,
      Command::AttachPipe { pipe, peer_identity } => {
        self.attach_pipe(logic, pipe, peer_identity).await;
        LoopAction::Continue
      }
      Command::ActivateRead { pipe_id } => {
        logic.read_activated(pipe_id).await;
        LoopAction::Continue
      }
      Command::ActivateWrite { pipe_id } => {
        logic.write_activated(pipe_id).await;
        LoopAction::Continue
      }
      Command::PipeHiccup { pipe_id } => {
        logic.hiccuped(pipe_id).await;
        LoopAction::Continue
      }
      Command::PipeTerm {
        pipe_id,
        ack_to,
        ack_pipe_id,
      } => {
        let removed = self.core_state.write().pipes.remove(&pipe_id);
        if removed.is_some() {
          logic.pipe_terminated(pipe_id).await;
        }
        // Acked unconditionally: crossing terminations must both resolve.
        Pipe::ack_terminate(&ack_to, ack_pipe_id);
        LoopAction::Continue
      }
      Command::PipeTermAck { pipe_id } => {
        let (removed, done) = {
          let mut state = self.core_state.write();
          let removed = state.pipes.remove(&pipe_id).is_some();
          // Acks also resolve single-pipe terminations requested while the
          // socket was still active (e.g. a rejected connection).
          if state.pending_term_acks > 0 {
            state.pending_term_acks -= 1;
          }
          let done = state.state == SocketState::Terminating && state.pending_term_acks == 0;
          (removed, done)
        };
        if removed {
          logic.pipe_terminated(pipe_id).await;
        }
        if done {
          LoopAction::Exit
        } else {
          LoopAction::Continue
        }
      }
      Command::Reap { .. } => {
        tracing::warn!(handle = self.handle, "Socket received a reaper command; ignoring");
        LoopAction::Continue
      }
    }
  }

  /// Enters the terminating state: unregisters inproc endpoints, asks every
  /// attached pipe to terminate, and counts the acks destruction must wait
  /// for.
  async fn begin_termination(&self, logic: &Arc<dyn ISocket>) -> LoopAction {
    {
      let mut state = self.core_state.write();
      if state.state == SocketState::Terminating {
        return LoopAction::Continue;
      }
      state.state = SocketState::Terminating;
    }
    tracing::info!(handle = self.handle, "Socket terminating");
    self.notify_terminating();
    self.context.inner().unregister_endpoints(self.handle);

    let mut requested = 0usize;
    let mut dead = Vec::new();
    {
      let state = self.core_state.read();
      for (&pipe_id, pipe) in &state.pipes {
        if pipe.delay() && pipe.out_queue_len() > 0 {
          tracing::debug!(
            handle = self.handle,
            pipe_id,
            queued = pipe.out_queue_len(),
            "Terminating pipe with undrained messages; the peer may drain until it acknowledges"
          );
        }
        if pipe.terminate() {
          requested += 1;
        } else {
          dead.push(pipe_id);
        }
      }
    }
    let pending = {
      let mut state = self.core_state.write();
      for pipe_id in &dead {
        state.pipes.remove(pipe_id);
      }
      state.pending_term_acks += requested;
      state.pending_term_acks
    };
    for pipe_id in dead {
      logic.pipe_terminated(pipe_id).await;
    }
    if pending == 0 {
      LoopAction::Exit
    } else {
      LoopAction::Continue
    }
  }
}

impl std::fmt::Debug for SocketCore {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("SocketCore").field("handle", &self.handle).finish_non_exhaustive()
  }
}

/// Applies the per-call send flags onto the message's own flag bits.
pub(crate) fn apply_send_flags(mut msg: Msg, flags: SendFlags) -> Msg {
  let mut bits = msg.flags();
  if flags.contains(SendFlags::SEND_MORE) {
    bits |= MsgFlags::MORE;
  }
  if flags.contains(SendFlags::SEND_LABEL) {
    bits |= MsgFlags::LABEL;
  }
  msg.set_flags(bits);
  msg
}

/// Auto-assigned connection identity: 17 bytes, zero first byte (the
/// reserved prefix distinguishing generated identities from user ones).
pub(crate) fn generate_identity() -> Blob {
  let mut bytes = vec![0u8; 17];
  rand::rng().fill(&mut bytes[1..]);
  Blob::from(bytes)
}

/// A send/recv deadline derived from SNDTIMEO/RCVTIMEO.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Deadline {
  Infinite,
  At(tokio::time::Instant),
}

impl Deadline {
  pub(crate) fn new(timeout: Option<Duration>) -> Self {
    match timeout {
      Some(d) if d > Duration::ZERO => Deadline::At(tokio::time::Instant::now() + d),
      // Zero is the non-blocking marker; callers short-circuit before
      // waiting, so it never reaches a timer.
      _ => Deadline::Infinite,
    }
  }
}
