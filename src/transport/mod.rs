//! Endpoint parsing/validation and the transports compiled into this build.
//! Stream and multicast engines are external collaborators; only the
//! in-process transport is provided here.

pub(crate) mod endpoint;
pub(crate) mod inproc;
