//! Message representation: frames, flags, and opaque byte strings.

mod blob;
mod flags;
mod msg;

pub use blob::Blob;
pub use flags::{MsgFlags, PollEvents};
pub use msg::Msg;
