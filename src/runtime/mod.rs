//! Core asynchronous runtime primitives: command mailboxes, pipe pairs, the
//! I/O worker pool, and the reaper.

pub(crate) mod command;
pub(crate) mod io_thread;
pub(crate) mod mailbox;
pub(crate) mod pipe;
pub(crate) mod reaper;

pub(crate) use command::Command;
pub(crate) use mailbox::{mailbox, MailboxReceiver, MailboxSender};
