// tests/common.rs
#![allow(dead_code)]

use wiremq::{Context, Msg, MqError, Socket};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Once;
use std::time::Duration;

use tokio::time::timeout;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

static INPROC_ENDPOINT_COUNTER: AtomicUsize = AtomicUsize::new(0);
static TRACING_INIT: Once = Once::new();

fn setup_tracing() {
  TRACING_INIT.call_once(|| {
    let default_filter = "wiremq=debug,warn";
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let subscriber = FmtSubscriber::builder()
      .with_env_filter(env_filter)
      .with_target(true)
      .with_test_writer()
      .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
  });
}

/// Creates a context with tracing initialized.
pub fn test_context() -> Context {
  setup_tracing();
  Context::new().expect("Failed to create test context")
}

/// Generates unique inproc endpoints so parallel tests never collide.
pub fn unique_inproc_endpoint() -> String {
  let pid = std::process::id();
  let count = INPROC_ENDPOINT_COUNTER.fetch_add(1, Ordering::Relaxed);
  format!("inproc://wiremq_test_{}_{}", pid, count)
}

/// Receive with an outer timeout, mapping expiry to `WouldBlock`.
pub async fn recv_timeout(socket: &Socket, duration: Duration) -> Result<Msg, MqError> {
  match timeout(duration, socket.recv()).await {
    Ok(result) => result,
    Err(_) => Err(MqError::WouldBlock),
  }
}

/// Let in-flight commands (attachments, subscriptions) settle.
pub async fn settle() {
  tokio::time::sleep(Duration::from_millis(50)).await;
}
