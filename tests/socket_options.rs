// tests/socket_options.rs

use wiremq::socket::options::{
  DELAY_ON_CLOSE, DELAY_ON_DISCONNECT, IDENTITY, IMMEDIATE_CONNECT, SNDHWM,
};
use wiremq::{MqError, SocketType};

mod common;

fn int_option(raw: Vec<u8>) -> i32 {
  i32::from_ne_bytes(raw.try_into().expect("option is an i32"))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn delay_and_immediate_options_round_trip() -> Result<(), MqError> {
  let ctx = common::test_context();
  let socket = ctx.socket(SocketType::Pair)?;

  // Defaults: both delay flags off, immediate connect on.
  assert_eq!(int_option(socket.get_option(DELAY_ON_CLOSE).await?), 0);
  assert_eq!(int_option(socket.get_option(DELAY_ON_DISCONNECT).await?), 0);
  assert_eq!(int_option(socket.get_option(IMMEDIATE_CONNECT).await?), 1);

  socket.set_option(DELAY_ON_CLOSE, &1i32.to_ne_bytes()).await?;
  socket.set_option(DELAY_ON_DISCONNECT, &1i32.to_ne_bytes()).await?;
  socket.set_option(IMMEDIATE_CONNECT, &0i32.to_ne_bytes()).await?;

  assert_eq!(int_option(socket.get_option(DELAY_ON_CLOSE).await?), 1);
  assert_eq!(int_option(socket.get_option(DELAY_ON_DISCONNECT).await?), 1);
  assert_eq!(int_option(socket.get_option(IMMEDIATE_CONNECT).await?), 0);

  // Boolean options accept only 0 or 1.
  assert!(matches!(
    socket.set_option(DELAY_ON_CLOSE, &2i32.to_ne_bytes()).await,
    Err(MqError::InvalidOptionValue(DELAY_ON_CLOSE))
  ));

  ctx.term().await?;
  Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn identity_and_hwm_round_trip() -> Result<(), MqError> {
  let ctx = common::test_context();
  let socket = ctx.socket(SocketType::Dealer)?;

  assert!(socket.get_option(IDENTITY).await?.is_empty());
  socket.set_option(IDENTITY, b"node-a").await?;
  assert_eq!(socket.get_option(IDENTITY).await?, b"node-a");
  // The zero prefix is reserved for auto-assigned identities.
  assert!(matches!(
    socket.set_option(IDENTITY, &[0u8, 1, 2]).await,
    Err(MqError::InvalidOptionValue(IDENTITY))
  ));

  socket.set_option(SNDHWM, &42i32.to_ne_bytes()).await?;
  assert_eq!(int_option(socket.get_option(SNDHWM).await?), 42);

  ctx.term().await?;
  Ok(())
}
