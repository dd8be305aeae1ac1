use crate::message::Msg;
use crate::runtime::pipe::Pipe;

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use tokio::sync::Notify;

/// Rotates reads over the set of currently readable pipes.
///
/// A pipe enters the ready set when its `ActivateRead` event is processed and
/// leaves it when a read finds it empty (the next write re-activates it).
/// While a multipart message is being consumed the source pipe is sticky:
/// remaining frames are taken from it before any rotation resumes.
#[derive(Debug, Default)]
pub(crate) struct FairQueue {
  inner: Mutex<Inner>,
  notify: Notify,
}

#[derive(Debug, Default)]
struct Inner {
  ready: VecDeque<usize>,
  /// Pipe a partially consumed message is pinned to.
  current: Option<usize>,
}

impl FairQueue {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  /// Marks a pipe readable. Idempotent; wakes one blocked consumer.
  pub(crate) fn activate(&self, pipe_id: usize) {
    let mut inner = self.inner.lock();
    if inner.current == Some(pipe_id) || inner.ready.contains(&pipe_id) {
      drop(inner);
      self.notify.notify_one();
      return;
    }
    inner.ready.push_back(pipe_id);
    drop(inner);
    self.notify.notify_one();
  }

  /// Forgets a detached pipe. Wakes consumers so they can observe the loss.
  pub(crate) fn remove(&self, pipe_id: usize) {
    let mut inner = self.inner.lock();
    if let Some(pos) = inner.ready.iter().position(|&p| p == pipe_id) {
      inner.ready.remove(pos);
    }
    if inner.current == Some(pipe_id) {
      inner.current = None;
    }
    drop(inner);
    self.notify.notify_one();
  }

  pub(crate) fn notify_handle(&self) -> &Notify {
    &self.notify
  }

  /// Wakes one blocked consumer without changing the ready set (used when
  /// external state a consumer is polling, e.g. request state, changed).
  pub(crate) fn kick(&self) {
    self.notify.notify_one();
  }

  /// Attempts one fair-queued read across the ready pipes.
  ///
  /// Returns the source pipe id with the frame. `None` means nothing is
  /// readable right now (including mid-message, when the pinned pipe has not
  /// yet produced its next frame).
  pub(crate) fn try_recv(&self, pipes: &HashMap<usize, Pipe>) -> Option<(usize, Msg)> {
    loop {
      let (pipe_id, pinned) = {
        let mut inner = self.inner.lock();
        match inner.current {
          Some(p) => (p, true),
          None => match inner.ready.pop_front() {
            Some(p) => (p, false),
            None => return None,
          },
        }
      };

      let Some(pipe) = pipes.get(&pipe_id) else {
        // Pipe vanished between activation and read.
        self.remove(pipe_id);
        continue;
      };
      match pipe.read() {
        Ok(Some(msg)) => {
          let mut inner = self.inner.lock();
          if msg.is_more() || msg.is_label() {
            inner.current = Some(pipe_id);
          } else {
            inner.current = None;
            if !inner.ready.contains(&pipe_id) {
              inner.ready.push_back(pipe_id);
            }
          }
          return Some((pipe_id, msg));
        }
        Ok(None) => {
          if pinned {
            // The rest of the message has not arrived yet; hold position.
            return None;
          }
          // Drained; the next write re-activates it.
        }
        Err(_) => {
          self.remove(pipe_id);
        }
      }
    }
  }
}
