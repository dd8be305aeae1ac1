//! Type aliases for actor command channels based on `async-channel`.

use crate::runtime::command::Command;

/// The sending end of an actor's mailbox.
/// Cloneable, allowing pipes, peer sockets, and the context to enqueue
/// commands for the same destination.
pub(crate) type MailboxSender = async_channel::Sender<Command>;

/// The receiving end of an actor's mailbox.
/// Only the owning actor task receives, so commands addressed to one
/// destination are processed strictly in enqueue order.
pub(crate) type MailboxReceiver = async_channel::Receiver<Command>;

/// Creates a new mailbox channel pair.
///
/// Mailboxes are unbounded: activation and termination commands are
/// edge-triggered, and a socket that lost one would never wake again. Data
/// never travels through mailboxes, only through bounded pipes, so growth is
/// bounded by the number of attached pipes in practice.
pub(crate) fn mailbox() -> (MailboxSender, MailboxReceiver) {
  async_channel::unbounded()
}
