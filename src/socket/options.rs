use std::time::Duration;

use crate::error::MqError;
use crate::message::Blob;

// Option ids follow the libzmq numbering where an equivalent exists.
pub const AFFINITY: i32 = 4;
pub const IDENTITY: i32 = 5;
pub const SUBSCRIBE: i32 = 6;
pub const UNSUBSCRIBE: i32 = 7;
pub const RCVMORE: i32 = 13;
pub const EVENTS: i32 = 15;
pub const TYPE: i32 = 16;
pub const LINGER: i32 = 17;
pub const SNDHWM: i32 = 23;
pub const RCVHWM: i32 = 24;
pub const RCVTIMEO: i32 = 27;
pub const SNDTIMEO: i32 = 28;
pub const RCVLABEL: i32 = 29;
pub const DELAY_ON_CLOSE: i32 = 30;
pub const DELAY_ON_DISCONNECT: i32 = 31;
pub const IMMEDIATE_CONNECT: i32 = 32;

/// Holds parsed and validated socket options.
#[derive(Debug, Clone)]
pub(crate) struct SocketOptions {
  /// High water marks; 0 means unbounded.
  pub sndhwm: usize,
  pub rcvhwm: usize,
  // Timeouts: None = infinite, Some(ZERO) = non-blocking, Some(>0) = deadline.
  pub sndtimeo: Option<Duration>,
  pub rcvtimeo: Option<Duration>,
  pub linger: Option<Duration>,
  /// I/O worker eligibility mask for network endpoints; 0 = no preference.
  pub affinity: u64,
  /// User-assigned identity; auto-assigned per-connection when empty.
  pub identity: Option<Blob>,
  pub delay_on_close: bool,
  pub delay_on_disconnect: bool,
  /// Pre-create pipes for network connects before the link is up.
  pub immediate_connect: bool,
  /// Inbound messages are matched against the local subscription table and
  /// dropped on mismatch. Set by the socket type (SUB), not by users.
  pub filter: bool,
}

impl Default for SocketOptions {
  fn default() -> Self {
    Self {
      sndhwm: 1000,
      rcvhwm: 1000,
      sndtimeo: None,
      rcvtimeo: None,
      linger: Some(Duration::ZERO),
      affinity: 0,
      identity: None,
      delay_on_close: false,
      delay_on_disconnect: false,
      immediate_connect: true,
      filter: false,
    }
  }
}

// --- Helper functions for parsing option values ---

/// Parses a byte slice representing an integer option (like HWM, linger).
pub(crate) fn parse_i32_option(value: &[u8], option_id: i32) -> Result<i32, MqError> {
  let arr: [u8; 4] = value.try_into().map_err(|_| MqError::InvalidOptionValue(option_id))?;
  // Native endianness, consistent with how the C API shipped option values.
  Ok(i32::from_ne_bytes(arr))
}

/// Parses a boolean option (0 or 1).
pub(crate) fn parse_bool_option(value: &[u8], option_id: i32) -> Result<bool, MqError> {
  match parse_i32_option(value, option_id)? {
    0 => Ok(false),
    1 => Ok(true),
    _ => Err(MqError::InvalidOptionValue(option_id)),
  }
}

/// Parses a high-water mark: non-negative, 0 meaning unbounded.
pub(crate) fn parse_hwm_option(value: &[u8], option_id: i32) -> Result<usize, MqError> {
  let val = parse_i32_option(value, option_id)?;
  if val < 0 {
    return Err(MqError::InvalidOptionValue(option_id));
  }
  Ok(val as usize)
}

/// Parses a timeout in milliseconds: -1 infinite, 0 non-blocking, >0 deadline.
pub(crate) fn parse_timeout_option(value: &[u8], option_id: i32) -> Result<Option<Duration>, MqError> {
  match parse_i32_option(value, option_id)? {
    -1 => Ok(None),
    0 => Ok(Some(Duration::ZERO)),
    ms @ 1.. => Ok(Some(Duration::from_millis(ms as u64))),
    _ => Err(MqError::InvalidOptionValue(option_id)),
  }
}

/// Parses linger in milliseconds: -1 infinite, otherwise a duration.
pub(crate) fn parse_linger_option(value: &[u8]) -> Result<Option<Duration>, MqError> {
  match parse_i32_option(value, LINGER)? {
    -1 => Ok(None),
    ms @ 0.. => Ok(Some(Duration::from_millis(ms as u64))),
    _ => Err(MqError::InvalidOptionValue(LINGER)),
  }
}

/// Parses the 64-bit affinity mask.
pub(crate) fn parse_affinity_option(value: &[u8]) -> Result<u64, MqError> {
  let arr: [u8; 8] = value.try_into().map_err(|_| MqError::InvalidOptionValue(AFFINITY))?;
  Ok(u64::from_ne_bytes(arr))
}

/// Parses a user-assigned identity: 1..=255 bytes, leading byte non-zero
/// (the zero prefix is reserved for auto-assigned identities).
pub(crate) fn parse_identity_option(value: &[u8]) -> Result<Blob, MqError> {
  if value.is_empty() || value.len() > 255 || value[0] == 0 {
    return Err(MqError::InvalidOptionValue(IDENTITY));
  }
  Ok(Blob::from(value))
}
