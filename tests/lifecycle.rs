// tests/lifecycle.rs

use wiremq::socket::options::{EVENTS, RCVTIMEO, TYPE};
use wiremq::{Context, Msg, MqError, PollEvents, RecvFlags, SendFlags, SocketType};

use std::time::Duration;

mod common;

const LONG_TIMEOUT: Duration = Duration::from_secs(2);

fn int_option(raw: Vec<u8>) -> i32 {
  i32::from_ne_bytes(raw.try_into().expect("option is an i32"))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn closed_socket_refuses_everything() -> Result<(), MqError> {
  let ctx = common::test_context();
  let socket = ctx.socket(SocketType::Pair)?;
  let endpoint = common::unique_inproc_endpoint();
  socket.bind(&endpoint).await?;

  socket.close().await?;
  assert!(matches!(socket.send(Msg::new()).await, Err(MqError::Terminated)));
  assert!(matches!(
    socket.recv_with(RecvFlags::DONT_WAIT).await,
    Err(MqError::Terminated)
  ));
  assert!(matches!(socket.bind(&endpoint).await, Err(MqError::Terminated)));
  assert!(matches!(socket.get_option(EVENTS).await, Err(MqError::Terminated)));

  ctx.term().await?;
  Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn endpoint_frees_when_binder_closes() -> Result<(), MqError> {
  let ctx = common::test_context();
  let endpoint = common::unique_inproc_endpoint();

  let first = ctx.socket(SocketType::Pull)?;
  first.bind(&endpoint).await?;

  let second = ctx.socket(SocketType::Pull)?;
  assert!(matches!(second.bind(&endpoint).await, Err(MqError::AddrInUse(_))));

  first.close().await?;
  common::settle().await;
  second.bind(&endpoint).await?;

  ctx.term().await?;
  Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn term_tears_down_connected_sockets() -> Result<(), MqError> {
  let ctx = common::test_context();
  let endpoint = common::unique_inproc_endpoint();
  let pull = ctx.socket(SocketType::Pull)?;
  let push = ctx.socket(SocketType::Push)?;
  pull.bind(&endpoint).await?;
  push.connect(&endpoint).await?;
  push.send(Msg::from_static(b"in flight")).await?;

  // Both sockets are still open; term must run the full handshake cascade.
  tokio::time::timeout(Duration::from_secs(5), ctx.term())
    .await
    .expect("context termination timed out")?;

  assert!(matches!(push.send(Msg::new()).await, Err(MqError::Terminated)));
  Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn endpoint_error_taxonomy() -> Result<(), MqError> {
  let ctx = common::test_context();
  let req = ctx.socket(SocketType::Req)?;

  assert!(matches!(req.bind("no-scheme").await, Err(MqError::InvalidEndpoint(_))));
  assert!(matches!(req.bind("inproc://").await, Err(MqError::InvalidEndpoint(_))));
  assert!(matches!(
    req.bind("quic://somewhere").await,
    Err(MqError::UnsupportedTransport(_))
  ));
  assert!(matches!(
    req.connect("inproc://nobody-bound-this").await,
    Err(MqError::ConnectionRefused(_))
  ));
  // Multicast cannot carry a bidirectional pattern.
  assert!(matches!(
    req.connect("pgm://eth0;239.0.0.1:7500").await,
    Err(MqError::IncompatibleTransport(_))
  ));
  // No stream engines are compiled into this build.
  assert!(matches!(
    req.bind("tcp://127.0.0.1:5555").await,
    Err(MqError::UnsupportedTransport(_))
  ));

  ctx.term().await?;
  Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn empty_io_pool_surfaces_no_io_thread() -> Result<(), MqError> {
  common::test_context(); // tracing only
  let ctx = Context::with_io_threads(0)?;
  let push = ctx.socket(SocketType::Push)?;
  assert!(matches!(
    push.bind("tcp://127.0.0.1:5556").await,
    Err(MqError::NoIoThread)
  ));
  assert!(matches!(
    push.connect("tcp://127.0.0.1:5556").await,
    Err(MqError::NoIoThread)
  ));
  ctx.term().await?;
  Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sys_scheme_rendezvous_works_like_inproc() -> Result<(), MqError> {
  let ctx = common::test_context();
  let pull = ctx.socket(SocketType::Pull)?;
  let push = ctx.socket(SocketType::Push)?;

  pull.bind("sys://diagnostics").await?;
  push.connect("sys://diagnostics").await?;
  push.send(Msg::from_static(b"log line")).await?;
  assert_eq!(common::recv_timeout(&pull, LONG_TIMEOUT).await?.data().unwrap(), b"log line");

  ctx.term().await?;
  Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn events_option_reports_readiness_without_blocking() -> Result<(), MqError> {
  let ctx = common::test_context();
  let pull = ctx.socket(SocketType::Pull)?;
  let push = ctx.socket(SocketType::Push)?;
  let endpoint = common::unique_inproc_endpoint();
  pull.bind(&endpoint).await?;
  push.connect(&endpoint).await?;
  common::settle().await;

  let push_events = PollEvents::from_bits_truncate(int_option(push.get_option(EVENTS).await?));
  assert!(push_events.contains(PollEvents::POLLOUT));
  let pull_events = PollEvents::from_bits_truncate(int_option(pull.get_option(EVENTS).await?));
  assert!(!pull_events.contains(PollEvents::POLLIN));

  push.send(Msg::from_static(b"wake")).await?;
  common::settle().await;
  let pull_events = PollEvents::from_bits_truncate(int_option(pull.get_option(EVENTS).await?));
  assert!(pull_events.contains(PollEvents::POLLIN));

  ctx.term().await?;
  Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rcvtimeo_bounds_a_blocked_recv() -> Result<(), MqError> {
  let ctx = common::test_context();
  let pull = ctx.socket(SocketType::Pull)?;
  pull.bind(&common::unique_inproc_endpoint()).await?;
  pull.set_option(RCVTIMEO, &100i32.to_ne_bytes()).await?;

  let start = std::time::Instant::now();
  assert!(matches!(pull.recv().await, Err(MqError::WouldBlock)));
  assert!(start.elapsed() >= Duration::from_millis(90));
  assert!(start.elapsed() < Duration::from_secs(1));

  ctx.term().await?;
  Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pair_is_exclusive_and_bidirectional() -> Result<(), MqError> {
  let ctx = common::test_context();
  let left = ctx.socket(SocketType::Pair)?;
  let right = ctx.socket(SocketType::Pair)?;
  let third = ctx.socket(SocketType::Pair)?;
  let endpoint = common::unique_inproc_endpoint();

  left.bind(&endpoint).await?;
  right.connect(&endpoint).await?;

  right.send(Msg::from_static(b"to-left")).await?;
  assert_eq!(common::recv_timeout(&left, LONG_TIMEOUT).await?.data().unwrap(), b"to-left");
  left.send(Msg::from_static(b"to-right")).await?;
  assert_eq!(common::recv_timeout(&right, LONG_TIMEOUT).await?.data().unwrap(), b"to-right");

  // A second connection is rejected by the binder.
  third.connect(&endpoint).await?;
  common::settle().await;
  assert!(matches!(
    third.send_with(Msg::from_static(b"x"), SendFlags::DONT_WAIT).await,
    Err(MqError::WouldBlock)
  ));

  assert_eq!(int_option(left.get_option(TYPE).await?), 0);
  ctx.term().await?;
  Ok(())
}
