use crate::message::Msg;
use crate::runtime::command::Command;
use crate::runtime::mailbox::MailboxSender;

use std::fmt;
use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::Arc;

use async_channel::{TryRecvError, TrySendError};

/// Outcome of a non-blocking pipe write.
#[derive(Debug)]
pub(crate) enum PipeWriteError {
  /// High-water mark reached; the message is returned to the caller.
  Full(Msg),
  /// The peer end is gone; the message is returned to the caller.
  Closed(Msg),
}

/// Outcome of a non-blocking pipe read that found no message.
#[derive(Debug)]
pub(crate) enum PipeReadError {
  /// The peer end is gone and the queue is drained.
  Closed,
}

/// One end of a bidirectional pipe pair.
///
/// Each end owns the sending half of one bounded queue and the receiving
/// half of the other. Queue depth is tracked with a shared counter per
/// direction so that the empty->non-empty and full->not-full transitions can
/// be raised as `ActivateRead` / `ActivateWrite` commands on the peer's
/// mailbox. A message written is either delivered or returned; it is never
/// duplicated.
pub(crate) struct Pipe {
  id: usize,
  peer_id: usize,
  tx: async_channel::Sender<Msg>,
  rx: async_channel::Receiver<Msg>,
  /// Depth of the queue this end writes to (shared with the peer's reader).
  out_depth: Arc<AtomicIsize>,
  /// Depth of the queue this end reads from (shared with the peer's writer).
  in_depth: Arc<AtomicIsize>,
  /// Capacity of the inbound queue; 0 means unbounded.
  in_capacity: usize,
  local_mailbox: MailboxSender,
  peer_mailbox: MailboxSender,
  delay: bool,
}

impl Pipe {
  /// The id this end is known by in its owning socket.
  pub(crate) fn id(&self) -> usize {
    self.id
  }

  /// The id the peer socket knows its end by.
  pub(crate) fn peer_id(&self) -> usize {
    self.peer_id
  }

  /// Whether teardown should wait for in-flight messages to drain.
  pub(crate) fn delay(&self) -> bool {
    self.delay
  }

  /// Attempts to enqueue a message toward the peer without blocking.
  /// Raises `ActivateRead` on the peer when the queue was previously empty.
  pub(crate) fn write(&self, msg: Msg) -> Result<(), PipeWriteError> {
    match self.tx.try_send(msg) {
      Ok(()) => {
        let prev = self.out_depth.fetch_add(1, Ordering::AcqRel);
        if prev <= 0 {
          let _ = self.peer_mailbox.try_send(Command::ActivateRead { pipe_id: self.peer_id });
        }
        Ok(())
      }
      Err(TrySendError::Full(m)) => Err(PipeWriteError::Full(m)),
      Err(TrySendError::Closed(m)) => Err(PipeWriteError::Closed(m)),
    }
  }

  /// Attempts to dequeue the next inbound message without blocking.
  /// Raises `ActivateWrite` on the peer when the queue leaves the full state.
  pub(crate) fn read(&self) -> Result<Option<Msg>, PipeReadError> {
    match self.rx.try_recv() {
      Ok(msg) => {
        let prev = self.in_depth.fetch_sub(1, Ordering::AcqRel);
        if self.in_capacity != 0 && prev >= self.in_capacity as isize {
          let _ = self.peer_mailbox.try_send(Command::ActivateWrite { pipe_id: self.peer_id });
        }
        Ok(Some(msg))
      }
      Err(TryRecvError::Empty) => Ok(None),
      Err(TryRecvError::Closed) => Err(PipeReadError::Closed),
    }
  }

  /// True when a write would currently be accepted.
  pub(crate) fn check_write(&self) -> bool {
    !self.tx.is_closed() && !self.tx.is_full()
  }

  /// True when at least one inbound message is queued.
  pub(crate) fn check_read(&self) -> bool {
    !self.rx.is_empty()
  }

  /// Number of messages waiting toward the peer.
  pub(crate) fn out_queue_len(&self) -> usize {
    self.tx.len()
  }

  /// Requests the first phase of the termination handshake: the peer is asked
  /// to release its end and acknowledge back to this socket's mailbox.
  ///
  /// Returns false when the peer is already gone; the caller must then not
  /// wait for an acknowledgement.
  pub(crate) fn terminate(&self) -> bool {
    self
      .peer_mailbox
      .try_send(Command::PipeTerm {
        pipe_id: self.peer_id,
        ack_to: self.local_mailbox.clone(),
        ack_pipe_id: self.id,
      })
      .is_ok()
  }

  /// Acknowledges a received termination request toward the initiator.
  pub(crate) fn ack_terminate(ack_to: &MailboxSender, ack_pipe_id: usize) {
    let _ = ack_to.try_send(Command::PipeTermAck { pipe_id: ack_pipe_id });
  }

  /// Notifies the owning socket that in-flight messages on this pipe were
  /// discarded by the transport. Pattern state (e.g. an outstanding request)
  /// must be resynchronized.
  pub(crate) fn hiccup(&self) {
    let _ = self.local_mailbox.try_send(Command::PipeHiccup { pipe_id: self.id });
  }
}

impl fmt::Debug for Pipe {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Pipe")
      .field("id", &self.id)
      .field("peer_id", &self.peer_id)
      .field("in_capacity", &self.in_capacity)
      .finish()
  }
}

fn data_channel(hwm: usize) -> (async_channel::Sender<Msg>, async_channel::Receiver<Msg>) {
  if hwm == 0 {
    async_channel::unbounded()
  } else {
    async_channel::bounded(hwm)
  }
}

/// Builds a cross-linked pipe pair.
///
/// `ids.0`/`mailboxes.0`/`delays.0` describe the first end (returned first),
/// `ids.1`/... the second. `hwms.0` bounds the queue written by the first end,
/// `hwms.1` the queue written by the second; 0 means unbounded.
pub(crate) fn pipepair(
  ids: (usize, usize),
  mailboxes: (MailboxSender, MailboxSender),
  hwms: (usize, usize),
  delays: (bool, bool),
) -> (Pipe, Pipe) {
  let (tx_ab, rx_ab) = data_channel(hwms.0);
  let (tx_ba, rx_ba) = data_channel(hwms.1);
  let depth_ab = Arc::new(AtomicIsize::new(0));
  let depth_ba = Arc::new(AtomicIsize::new(0));

  let a = Pipe {
    id: ids.0,
    peer_id: ids.1,
    tx: tx_ab,
    rx: rx_ba,
    out_depth: depth_ab.clone(),
    in_depth: depth_ba.clone(),
    in_capacity: hwms.1,
    local_mailbox: mailboxes.0.clone(),
    peer_mailbox: mailboxes.1.clone(),
    delay: delays.0,
  };
  let b = Pipe {
    id: ids.1,
    peer_id: ids.0,
    tx: tx_ba,
    rx: rx_ab,
    out_depth: depth_ba,
    in_depth: depth_ab,
    in_capacity: hwms.0,
    local_mailbox: mailboxes.1,
    peer_mailbox: mailboxes.0,
    delay: delays.1,
  };
  (a, b)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::runtime::mailbox::mailbox;

  fn pair_with_mailboxes(
    hwms: (usize, usize),
  ) -> (Pipe, Pipe, crate::runtime::mailbox::MailboxReceiver, crate::runtime::mailbox::MailboxReceiver) {
    let (tx_a, rx_a) = mailbox();
    let (tx_b, rx_b) = mailbox();
    let (a, b) = pipepair((1, 2), (tx_a, tx_b), hwms, (false, false));
    (a, b, rx_a, rx_b)
  }

  #[test]
  fn write_then_read_preserves_order() {
    let (a, b, _rx_a, _rx_b) = pair_with_mailboxes((4, 4));
    a.write(Msg::from_static(b"one")).unwrap();
    a.write(Msg::from_static(b"two")).unwrap();
    assert_eq!(b.read().unwrap().unwrap().data().unwrap(), b"one");
    assert_eq!(b.read().unwrap().unwrap().data().unwrap(), b"two");
    assert!(b.read().unwrap().is_none());
  }

  #[test]
  fn first_write_activates_reader() {
    let (a, _b, _rx_a, rx_b) = pair_with_mailboxes((4, 4));
    a.write(Msg::new()).unwrap();
    a.write(Msg::new()).unwrap();
    // Only the empty->non-empty transition raises an event.
    let cmd = rx_b.try_recv().unwrap();
    assert!(matches!(cmd, Command::ActivateRead { pipe_id: 2 }));
    assert!(rx_b.try_recv().is_err());
  }

  #[test]
  fn full_pipe_rejects_and_drain_activates_writer() {
    let (a, b, rx_a, _rx_b) = pair_with_mailboxes((2, 2));
    a.write(Msg::new()).unwrap();
    a.write(Msg::new()).unwrap();
    assert!(matches!(a.write(Msg::new()), Err(PipeWriteError::Full(_))));
    assert!(!a.check_write());

    b.read().unwrap().unwrap();
    let cmd = rx_a.try_recv().unwrap();
    assert!(matches!(cmd, Command::ActivateWrite { pipe_id: 1 }));
    assert!(a.check_write());
  }

  #[test]
  fn zero_hwm_is_unbounded() {
    let (a, _b, _rx_a, _rx_b) = pair_with_mailboxes((0, 0));
    for _ in 0..4096 {
      a.write(Msg::new()).unwrap();
    }
    assert!(a.check_write());
  }

  #[test]
  fn terminate_routes_request_and_ack() {
    let (a, _b, rx_a, rx_b) = pair_with_mailboxes((1, 1));
    assert!(a.terminate());
    match rx_b.try_recv().unwrap() {
      Command::PipeTerm {
        pipe_id,
        ack_to,
        ack_pipe_id,
      } => {
        assert_eq!(pipe_id, 2);
        Pipe::ack_terminate(&ack_to, ack_pipe_id);
      }
      other => panic!("unexpected command {}", other.variant_name()),
    }
    assert!(matches!(rx_a.try_recv().unwrap(), Command::PipeTermAck { pipe_id: 1 }));
  }
}
