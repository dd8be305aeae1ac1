use bitflags::bitflags;

bitflags! {
  /// Flags associated with a `Msg` indicating its role or attributes.
  #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
  pub struct MsgFlags: u8 {
    /// More message parts follow this one.
    const MORE = 0b01;
    /// Administrative frame (routing envelope), not user payload.
    const LABEL = 0b10;
  }
}

bitflags! {
  /// Readiness bits reported by the `EVENTS` socket option.
  #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
  pub struct PollEvents: i32 {
    /// At least one message can be received without blocking.
    const POLLIN = 0b01;
    /// At least one message can be sent without blocking.
    const POLLOUT = 0b10;
  }
}
