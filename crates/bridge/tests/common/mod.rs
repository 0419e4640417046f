//! Common test utilities for bridge integration tests

#![allow(dead_code)]

use bridge::engine::MockEngine;
use bridge::{ClientOptions, Producer};
use std::future::Future;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Install a test subscriber honouring `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Options with a short poll interval so delivery reports arrive quickly.
pub fn test_options() -> ClientOptions {
    let mut options = ClientOptions::with_brokers(["localhost:9092"]);
    options.client_id = Some("bridge-tests".to_string());
    options.bridge.poll_interval_ms = 10;
    options.bridge.disconnect_timeout_ms = 500;
    options
}

/// A producer over `engine`, already connected.
pub async fn connected_producer(engine: &MockEngine) -> Producer<MockEngine> {
    init_tracing();
    let producer = Producer::new(engine.clone(), test_options());
    producer.connect().await.expect("mock producer should connect");
    producer
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Run `future` with a generous upper bound so a hang fails the test.
pub async fn bounded<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("operation did not settle in time")
}
