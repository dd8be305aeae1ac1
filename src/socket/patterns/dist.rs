use crate::message::Msg;
use crate::runtime::pipe::{Pipe, PipeWriteError};

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

/// Fans one message out to a set of matched pipes.
///
/// A pipe that is at its high-water mark simply misses the message;
/// distribution never blocks the publisher. The matched set is computed on
/// the first frame of a message and pinned until the last frame, so every
/// part of a multipart message reaches the same recipients. Duplicate match
/// reports for one pipe (a pipe subscribed at several prefixes of the same
/// message) collapse into a single delivery.
#[derive(Debug, Default)]
pub(crate) struct Distributor {
  pinned: Mutex<Option<HashSet<usize>>>,
}

impl Distributor {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  /// Distributes one frame. `matched` is consulted only at the start of a
  /// message. Returns the pipes found closed so the caller can drop them.
  pub(crate) fn send<F>(&self, pipes: &HashMap<usize, Pipe>, msg: &Msg, matched: F) -> Vec<usize>
  where
    F: FnOnce() -> HashSet<usize>,
  {
    let mut pinned = self.pinned.lock();
    let set = pinned.get_or_insert_with(matched);

    let mut closed = Vec::new();
    for &pipe_id in set.iter() {
      let Some(pipe) = pipes.get(&pipe_id) else {
        closed.push(pipe_id);
        continue;
      };
      match pipe.write(msg.clone()) {
        Ok(()) => {}
        Err(PipeWriteError::Full(_)) => {
          tracing::trace!(pipe_id, "Distributor dropping frame (high-water mark reached)");
        }
        Err(PipeWriteError::Closed(_)) => closed.push(pipe_id),
      }
    }
    for pipe_id in &closed {
      set.remove(pipe_id);
    }
    if !msg.is_more() && !msg.is_label() {
      *pinned = None;
    }
    closed
  }

  /// Drops a detached pipe from the pinned set, if a message is in flight.
  pub(crate) fn remove(&self, pipe_id: usize) {
    if let Some(set) = self.pinned.lock().as_mut() {
      set.remove(&pipe_id);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::message::MsgFlags;
  use crate::runtime::mailbox::mailbox;
  use crate::runtime::pipe::pipepair;

  #[test]
  fn multipart_fanout_pins_the_matched_set() {
    let (tx_a, _rx_a) = mailbox();
    let (tx_b, _rx_b) = mailbox();
    let (w1, r1) = pipepair((1, 2), (tx_a.clone(), tx_b.clone()), (8, 8), (false, false));
    let (w2, r2) = pipepair((3, 4), (tx_a, tx_b), (8, 8), (false, false));
    let mut pipes = HashMap::new();
    pipes.insert(w1.id(), w1);
    pipes.insert(w2.id(), w2);

    let dist = Distributor::new();
    let mut head = Msg::from_static(b"head");
    head.set_flags(MsgFlags::MORE);
    dist.send(&pipes, &head, || HashSet::from([1, 3]));
    // The tail goes to the pinned set even though the closure would now
    // match nothing.
    dist.send(&pipes, &Msg::from_static(b"tail"), HashSet::new);

    for reader in [&r1, &r2] {
      assert_eq!(reader.read().unwrap().unwrap().data().unwrap(), b"head");
      assert_eq!(reader.read().unwrap().unwrap().data().unwrap(), b"tail");
    }
  }

  #[test]
  fn full_subscriber_misses_the_frame_without_blocking() {
    let (tx_a, _rx_a) = mailbox();
    let (tx_b, _rx_b) = mailbox();
    let (w, r) = pipepair((1, 2), (tx_a, tx_b), (1, 1), (false, false));
    let mut pipes = HashMap::new();
    pipes.insert(w.id(), w);

    let dist = Distributor::new();
    dist.send(&pipes, &Msg::from_static(b"first"), || HashSet::from([1]));
    dist.send(&pipes, &Msg::from_static(b"lost"), || HashSet::from([1]));
    dist.send(&pipes, &Msg::from_static(b"also lost"), || HashSet::from([1]));

    assert_eq!(r.read().unwrap().unwrap().data().unwrap(), b"first");
    assert!(r.read().unwrap().is_none());
  }
}
