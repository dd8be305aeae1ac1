// tests/pub_sub.rs

use wiremq::socket::options::{SUBSCRIBE, UNSUBSCRIBE};
use wiremq::{Msg, MqError, RecvFlags, Socket, SocketType};

use std::time::Duration;

mod common;

const SHORT_TIMEOUT: Duration = Duration::from_millis(200);
const LONG_TIMEOUT: Duration = Duration::from_secs(2);

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pub_sub_basic_filtering() -> Result<(), MqError> {
  let ctx = common::test_context();
  let publisher = ctx.socket(SocketType::Pub)?;
  let subscriber = ctx.socket(SocketType::Sub)?;
  let endpoint = common::unique_inproc_endpoint();

  publisher.bind(&endpoint).await?;
  subscriber.connect(&endpoint).await?;
  subscriber.set_option(SUBSCRIBE, b"TopicA").await?;
  common::settle().await;

  publisher.send(Msg::from_static(b"TopicB ignored")).await?;
  publisher.send(Msg::from_static(b"TopicA delivered")).await?;

  let received = common::recv_timeout(&subscriber, LONG_TIMEOUT).await?;
  assert_eq!(received.data().unwrap(), b"TopicA delivered");

  // TopicB was filtered out; nothing further arrives.
  assert!(matches!(
    common::recv_timeout(&subscriber, SHORT_TIMEOUT).await,
    Err(MqError::WouldBlock)
  ));

  ctx.term().await?;
  Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pub_refuses_recv_and_sub_refuses_send() -> Result<(), MqError> {
  let ctx = common::test_context();
  let publisher = ctx.socket(SocketType::Pub)?;
  let subscriber = ctx.socket(SocketType::Sub)?;

  assert!(matches!(
    publisher.recv_with(RecvFlags::DONT_WAIT).await,
    Err(MqError::UnsupportedOperation(_))
  ));
  assert!(matches!(
    subscriber.send(Msg::new()).await,
    Err(MqError::UnsupportedOperation(_))
  ));

  ctx.term().await?;
  Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn subscriptions_replay_to_later_publishers() -> Result<(), MqError> {
  let ctx = common::test_context();
  let subscriber = ctx.socket(SocketType::Sub)?;
  let publisher = ctx.socket(SocketType::Pub)?;
  let endpoint = common::unique_inproc_endpoint();

  // Subscribe before any connection exists; the table replays on attach.
  subscriber.set_option(SUBSCRIBE, b"news").await?;
  publisher.bind(&endpoint).await?;
  subscriber.connect(&endpoint).await?;
  common::settle().await;

  publisher.send(Msg::from_static(b"news: late binding works")).await?;
  let received = common::recv_timeout(&subscriber, LONG_TIMEOUT).await?;
  assert_eq!(received.data().unwrap(), b"news: late binding works");

  ctx.term().await?;
  Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn xpub_surfaces_subscription_edges_only() -> Result<(), MqError> {
  let ctx = common::test_context();
  let xpub = ctx.socket(SocketType::XPub)?;
  let sub_a = ctx.socket(SocketType::Sub)?;
  let sub_b = ctx.socket(SocketType::Sub)?;
  let endpoint = common::unique_inproc_endpoint();

  xpub.bind(&endpoint).await?;
  sub_a.connect(&endpoint).await?;
  sub_b.connect(&endpoint).await?;

  sub_a.set_option(SUBSCRIBE, b"T").await?;
  common::settle().await;
  // Second subscriber at the same prefix: not a first-subscription edge.
  sub_b.set_option(SUBSCRIBE, b"T").await?;
  common::settle().await;

  let control = common::recv_timeout(&xpub, LONG_TIMEOUT).await?;
  assert_eq!(control.data().unwrap(), b"\x01T");
  assert!(matches!(
    common::recv_timeout(&xpub, SHORT_TIMEOUT).await,
    Err(MqError::WouldBlock)
  ));

  // Both unsubscribe; only the last one empties the prefix.
  sub_a.set_option(UNSUBSCRIBE, b"T").await?;
  common::settle().await;
  sub_b.set_option(UNSUBSCRIBE, b"T").await?;
  common::settle().await;

  let control = common::recv_timeout(&xpub, LONG_TIMEOUT).await?;
  assert_eq!(control.data().unwrap(), b"\x00T");
  assert!(matches!(
    common::recv_timeout(&xpub, SHORT_TIMEOUT).await,
    Err(MqError::WouldBlock)
  ));

  ctx.term().await?;
  Ok(())
}

/// Drains pending messages from one device leg and forwards them out the
/// other, the classic proxy pump.
async fn pump(from: &Socket, to: &Socket) -> Result<(), MqError> {
  loop {
    match from.recv_with(RecvFlags::DONT_WAIT).await {
      Ok(msg) => to.send(msg).await?,
      Err(MqError::WouldBlock) => return Ok(()),
      Err(e) => return Err(e),
    }
  }
}

fn count_option(raw: Vec<u8>) -> i32 {
  i32::from_ne_bytes(raw.try_into().expect("count option is an i32"))
}

/// Fanout through an XSUB/XPUB device: pub <- xsub | xpub <- {sub, subl2a,
/// subl2b}, with subl1a attached upstream directly to the pub.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn forwarding_through_xsub_xpub_device() -> Result<(), MqError> {
  let ctx = common::test_context();
  let publisher = ctx.socket(SocketType::Pub)?;
  let xsub = ctx.socket(SocketType::XSub)?;
  let xpub = ctx.socket(SocketType::XPub)?;
  let sub = ctx.socket(SocketType::Sub)?;
  let subl1a = ctx.socket(SocketType::Sub)?;
  let subl2a = ctx.socket(SocketType::Sub)?;
  let subl2b = ctx.socket(SocketType::Sub)?;

  let upstream = common::unique_inproc_endpoint();
  let downstream = common::unique_inproc_endpoint();

  publisher.bind(&upstream).await?;
  xsub.connect(&upstream).await?;
  xpub.bind(&downstream).await?;
  for s in [&sub, &subl2a, &subl2b] {
    s.connect(&downstream).await?;
  }
  subl1a.connect(&upstream).await?;

  sub.set_option(SUBSCRIBE, b"").await?;
  subl2a.set_option(SUBSCRIBE, b"B").await?;
  subl2b.set_option(SUBSCRIBE, b"BOO").await?;
  subl1a.set_option(SUBSCRIBE, b"BO").await?;
  common::settle().await;
  // Propagate the downstream subscriptions upstream through the device.
  pump(&xpub, &xsub).await?;
  common::settle().await;

  // Exact-prefix subscriber counts, observable via the overloaded
  // SUBSCRIBE query. The device collapses its three downstream
  // subscriptions into one pipe at the publisher.
  assert_eq!(count_option(publisher.get_option_with(SUBSCRIBE, b"").await?), 1);
  assert_eq!(count_option(publisher.get_option_with(SUBSCRIBE, b"B").await?), 1);
  assert_eq!(count_option(publisher.get_option_with(SUBSCRIBE, b"BO").await?), 1);
  assert_eq!(count_option(publisher.get_option_with(SUBSCRIBE, b"BOO").await?), 1);
  assert_eq!(count_option(xpub.get_option_with(SUBSCRIBE, b"B").await?), 1);
  assert_eq!(count_option(xpub.get_option_with(SUBSCRIBE, b"BOO").await?), 1);
  // No exact registration: descendants do not aggregate upward.
  assert_eq!(count_option(xpub.get_option_with(SUBSCRIBE, b"BO").await?), 0);

  // Publish "BOOP": every subscriber matches some prefix of it.
  publisher.send(Msg::from_static(b"BOOP")).await?;
  common::settle().await;
  pump(&xsub, &xpub).await?;

  for s in [&sub, &subl1a, &subl2a, &subl2b] {
    let m = common::recv_timeout(s, LONG_TIMEOUT).await?;
    assert_eq!(m.data().unwrap(), b"BOOP");
  }

  // After the only empty-prefix subscriber cancels, coverage narrows.
  sub.set_option(UNSUBSCRIBE, b"").await?;
  common::settle().await;
  pump(&xpub, &xsub).await?;
  common::settle().await;
  assert_eq!(count_option(publisher.get_option_with(SUBSCRIBE, b"").await?), 0);

  publisher.send(Msg::from_static(b"BOOP")).await?;
  common::settle().await;
  pump(&xsub, &xpub).await?;
  for s in [&subl1a, &subl2a, &subl2b] {
    let m = common::recv_timeout(s, LONG_TIMEOUT).await?;
    assert_eq!(m.data().unwrap(), b"BOOP");
  }
  assert!(matches!(
    common::recv_timeout(&sub, SHORT_TIMEOUT).await,
    Err(MqError::WouldBlock)
  ));

  // An empty publication matches nobody left subscribed to "".
  publisher.send(Msg::new()).await?;
  common::settle().await;
  pump(&xsub, &xpub).await?;
  for s in [&sub, &subl1a, &subl2a, &subl2b] {
    assert!(matches!(
      common::recv_timeout(s, SHORT_TIMEOUT).await,
      Err(MqError::WouldBlock)
    ));
  }

  // "BO" reaches only the "B" and "BO" subscribers.
  publisher.send(Msg::from_static(b"BO")).await?;
  common::settle().await;
  pump(&xsub, &xpub).await?;
  for s in [&subl1a, &subl2a] {
    let m = common::recv_timeout(s, LONG_TIMEOUT).await?;
    assert_eq!(m.data().unwrap(), b"BO");
  }
  for s in [&sub, &subl2b] {
    assert!(matches!(
      common::recv_timeout(s, SHORT_TIMEOUT).await,
      Err(MqError::WouldBlock)
    ));
  }

  ctx.term().await?;
  Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn multipart_rides_the_first_frame_verdict() -> Result<(), MqError> {
  use wiremq::socket::options::RCVMORE;
  use wiremq::SendFlags;

  let ctx = common::test_context();
  let publisher = ctx.socket(SocketType::Pub)?;
  let subscriber = ctx.socket(SocketType::Sub)?;
  let endpoint = common::unique_inproc_endpoint();

  publisher.bind(&endpoint).await?;
  subscriber.connect(&endpoint).await?;
  subscriber.set_option(SUBSCRIBE, b"match").await?;
  common::settle().await;

  publisher
    .send_with(Msg::from_static(b"miss-head"), SendFlags::SEND_MORE)
    .await?;
  publisher.send(Msg::from_static(b"miss-tail")).await?;
  publisher
    .send_with(Msg::from_static(b"match-head"), SendFlags::SEND_MORE)
    .await?;
  publisher.send(Msg::from_static(b"match-tail")).await?;

  let head = common::recv_timeout(&subscriber, LONG_TIMEOUT).await?;
  assert_eq!(head.data().unwrap(), b"match-head");
  assert_eq!(count_option(subscriber.get_option(RCVMORE).await?), 1);
  let tail = common::recv_timeout(&subscriber, LONG_TIMEOUT).await?;
  assert_eq!(tail.data().unwrap(), b"match-tail");
  assert_eq!(count_option(subscriber.get_option(RCVMORE).await?), 0);

  ctx.term().await?;
  Ok(())
}
