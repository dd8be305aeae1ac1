use crate::error::MqError;
use crate::runtime::io_thread::{IoThread, IoThreadPool};
use crate::runtime::reaper::spawn_reaper;
use crate::runtime::{Command, MailboxSender};
use crate::socket::options::SocketOptions;
use crate::socket::types::{Socket, SocketType};

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

/// Default number of I/O worker tasks per context.
pub const DEFAULT_IO_THREADS: usize = 1;

/// An endpoint registered for in-process rendezvous: the route to the binder
/// plus a snapshot of its options taken at bind time (connectors compose
/// high-water marks and read the binder's identity from the snapshot, not
/// from live state).
#[derive(Debug, Clone)]
pub(crate) struct EndpointEntry {
  pub(crate) socket_handle: usize,
  pub(crate) mailbox: MailboxSender,
  pub(crate) options: SocketOptions,
}

/// Internal state shared by all handles to one context.
pub(crate) struct ContextInner {
  /// Source of unique handle ids for sockets, pipes, and endpoints.
  next_handle: AtomicUsize,
  /// Command mailboxes of the live sockets, by handle.
  sockets: parking_lot::RwLock<HashMap<usize, MailboxSender>>,
  /// Process-wide rendezvous registry for the inproc/sys schemes.
  endpoints: parking_lot::RwLock<HashMap<String, EndpointEntry>>,
  io_threads: IoThreadPool,
  reaper: MailboxSender,
  shutdown_initiated: AtomicBool,
  shutdown_notify: Notify,
  active_sockets: AtomicUsize,
}

impl ContextInner {
  /// Generates the next unique handle id.
  pub(crate) fn next_handle(&self) -> usize {
    self.next_handle.fetch_add(1, Ordering::Relaxed)
  }

  pub(crate) fn register_socket(&self, handle: usize, mailbox: MailboxSender) {
    self.sockets.write().insert(handle, mailbox);
    self.active_sockets.fetch_add(1, Ordering::AcqRel);
    tracing::debug!(socket_handle = handle, "Socket registered");
  }

  /// Called by the reaper once a socket is fully destroyed.
  pub(crate) fn socket_reaped(&self, handle: usize) {
    if self.sockets.write().remove(&handle).is_some() {
      let prev = self.active_sockets.fetch_sub(1, Ordering::AcqRel);
      tracing::debug!(socket_handle = handle, remaining = prev - 1, "Socket reaped");
      if prev == 1 {
        self.shutdown_notify.notify_waiters();
      }
    } else {
      tracing::warn!(socket_handle = handle, "Reaped socket was not registered");
    }
  }

  pub(crate) fn reaper_mailbox(&self) -> MailboxSender {
    self.reaper.clone()
  }

  /// Registers an inproc/sys endpoint. Keys are unique.
  pub(crate) fn register_endpoint(&self, uri: String, entry: EndpointEntry) -> Result<(), MqError> {
    let mut registry = self.endpoints.write();
    if registry.contains_key(&uri) {
      return Err(MqError::AddrInUse(uri));
    }
    tracing::debug!(endpoint = %uri, socket_handle = entry.socket_handle, "Registered endpoint");
    registry.insert(uri, entry);
    Ok(())
  }

  pub(crate) fn find_endpoint(&self, uri: &str) -> Option<EndpointEntry> {
    self.endpoints.read().get(uri).cloned()
  }

  /// Removes every endpoint bound by the given socket. Run when the socket
  /// terminates so no new inproc pipes can reach it.
  pub(crate) fn unregister_endpoints(&self, socket_handle: usize) {
    let mut registry = self.endpoints.write();
    registry.retain(|uri, entry| {
      let keep = entry.socket_handle != socket_handle;
      if !keep {
        tracing::debug!(endpoint = %uri, socket_handle, "Unregistered endpoint");
      }
      keep
    });
  }

  /// Selects an I/O worker according to the caller's affinity preference.
  pub(crate) fn choose_io_thread(&self, affinity: u64) -> Option<IoThread> {
    self.io_threads.choose(affinity).cloned()
  }

  /// Broadcasts `Stop` to every live socket. Idempotent.
  fn shutdown(&self) {
    if self
      .shutdown_initiated
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .is_err()
    {
      tracing::debug!("Context shutdown already initiated");
      return;
    }
    tracing::info!("Context shutdown initiated");
    let mailboxes: Vec<_> = self.sockets.read().values().cloned().collect();
    for mailbox in mailboxes {
      // A socket that already terminated has a closed mailbox; ignore.
      let _ = mailbox.try_send(Command::Stop);
    }
    self.io_threads.stop();
  }

  /// Waits until the reaper has finalized every socket.
  async fn wait_for_termination(&self) {
    loop {
      if self.active_sockets.load(Ordering::Acquire) == 0 {
        tracing::info!("Context termination complete");
        return;
      }
      tokio::select! {
        _ = self.shutdown_notify.notified() => {}
        _ = tokio::time::sleep(Duration::from_secs(5)) => {
          tracing::warn!(
            active_sockets = self.active_sockets.load(Ordering::Acquire),
            "Still waiting for sockets to terminate"
          );
        }
      }
    }
  }

  pub(crate) fn is_shutting_down(&self) -> bool {
    self.shutdown_initiated.load(Ordering::Acquire)
  }
}

impl fmt::Debug for ContextInner {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ContextInner")
      .field("active_sockets", &self.active_sockets.load(Ordering::Relaxed))
      .finish_non_exhaustive()
  }
}

/// A handle to a messaging context: the factory for sockets and the owner of
/// the I/O worker pool, the endpoint registry, and the reaper.
/// Handles are cheaply cloneable and shareable across tasks.
///
/// Must be created from within an async runtime; the background tasks are
/// spawned at construction.
#[derive(Clone)]
pub struct Context {
  inner: Arc<ContextInner>,
}

impl Context {
  /// Creates a new, independent context with the default I/O worker pool.
  pub fn new() -> Result<Self, MqError> {
    Self::with_io_threads(DEFAULT_IO_THREADS)
  }

  /// Creates a context with a fixed pool of `io_threads` workers. A pool of
  /// zero is legal; network binds and connects then fail with
  /// [`MqError::NoIoThread`].
  pub fn with_io_threads(io_threads: usize) -> Result<Self, MqError> {
    tracing::debug!(io_threads, "Creating new context");
    let inner = Arc::new_cyclic(|weak| ContextInner {
      next_handle: AtomicUsize::new(1),
      sockets: parking_lot::RwLock::new(HashMap::new()),
      endpoints: parking_lot::RwLock::new(HashMap::new()),
      io_threads: IoThreadPool::spawn(io_threads),
      reaper: spawn_reaper(weak.clone()),
      shutdown_initiated: AtomicBool::new(false),
      shutdown_notify: Notify::new(),
      active_sockets: AtomicUsize::new(0),
    });
    Ok(Self { inner })
  }

  /// Creates a socket of the specified type associated with this context.
  pub fn socket(&self, socket_type: SocketType) -> Result<Socket, MqError> {
    if self.inner.is_shutting_down() {
      return Err(MqError::Terminated);
    }
    let handle = self.inner.next_handle();
    tracing::debug!(socket_type = ?socket_type, handle, "Creating socket");
    let (logic, mailbox) = crate::socket::create_socket(handle, self.clone(), socket_type);
    self.inner.register_socket(handle, mailbox);
    Ok(Socket::new(logic))
  }

  /// Initiates background shutdown of all sockets created by this context
  /// and returns immediately.
  pub fn shutdown(&self) {
    self.inner.shutdown();
  }

  /// Shuts down all sockets and waits for their clean termination.
  pub async fn term(&self) -> Result<(), MqError> {
    self.inner.shutdown();
    self.inner.wait_for_termination().await;
    Ok(())
  }

  pub(crate) fn inner(&self) -> &Arc<ContextInner> {
    &self.inner
  }
}

impl fmt::Debug for Context {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Context").finish_non_exhaustive()
  }
}

/// Creates a new library context. Convenience for [`Context::new`].
pub fn context() -> Result<Context, MqError> {
  Context::new()
}
