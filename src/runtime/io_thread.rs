use crate::runtime::command::Command;
use crate::runtime::mailbox::{mailbox, MailboxReceiver, MailboxSender};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Handle to one I/O worker task.
///
/// Workers host transport sessions and listeners. This build ships no stream
/// transport engines, so the pool only participates in placement decisions
/// and the context shutdown cascade; the seam is what `bind`/`connect` for
/// network schemes go through before a concrete engine would be launched.
#[derive(Debug, Clone)]
pub(crate) struct IoThread {
  pub(crate) id: usize,
  load: Arc<AtomicUsize>,
  mailbox: MailboxSender,
}

impl IoThread {
  /// Number of objects currently placed on this worker.
  pub(crate) fn load(&self) -> usize {
    self.load.load(Ordering::Relaxed)
  }
}

/// Fixed pool of I/O worker tasks owned by a context.
#[derive(Debug)]
pub(crate) struct IoThreadPool {
  threads: Vec<IoThread>,
}

impl IoThreadPool {
  /// Spawns `count` worker tasks. Must run inside an async runtime.
  pub(crate) fn spawn(count: usize) -> Self {
    let mut threads = Vec::with_capacity(count);
    for id in 0..count {
      let (tx, rx) = mailbox();
      tokio::spawn(run_io_thread(id, rx));
      threads.push(IoThread {
        id,
        load: Arc::new(AtomicUsize::new(0)),
        mailbox: tx,
      });
    }
    Self { threads }
  }

  /// Selects the least-loaded worker eligible under the caller's affinity
  /// mask (bit `i` set makes worker `i` eligible; 0 means no preference).
  /// Returns `None` when the mask leaves no worker, surfaced to users as
  /// `MqError::NoIoThread`.
  pub(crate) fn choose(&self, affinity: u64) -> Option<&IoThread> {
    self
      .threads
      .iter()
      .filter(|t| affinity == 0 || (t.id < 64 && affinity & (1u64 << t.id) != 0))
      .min_by_key(|t| t.load())
  }

  /// Sends `Stop` to every worker. Called once during context termination.
  pub(crate) fn stop(&self) {
    for t in &self.threads {
      let _ = t.mailbox.try_send(Command::Stop);
    }
  }
}

async fn run_io_thread(id: usize, rx: MailboxReceiver) {
  tracing::debug!(io_thread = id, "I/O worker started");
  while let Ok(cmd) = rx.recv().await {
    match cmd {
      Command::Stop => break,
      other => {
        tracing::trace!(io_thread = id, command = other.variant_name(), "I/O worker ignoring command");
      }
    }
  }
  tracing::debug!(io_thread = id, "I/O worker stopped");
}
