//! Common test utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use ignite_client::{ClientConfig, ClientConfigBuilder, ClientSession};
use ignite_test_utils::MockServer;

static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

pub fn unique_name(prefix: &str) -> String {
    let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("{}-{}-{}", prefix, std::process::id(), id)
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub async fn start_server() -> MockServer {
    MockServer::start().await.expect("failed to start mock server")
}

/// Returns an address nothing listens on.
pub async fn unused_address() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

pub fn config_for(addresses: &[SocketAddr]) -> ClientConfigBuilder {
    ClientConfigBuilder::new()
        .addresses(addresses.iter().copied())
        .connection_timeout(Duration::from_secs(2))
        .request_timeout(Duration::from_secs(5))
        .network(|n| n.heartbeat_interval(Duration::ZERO))
        .retry(|r| r.jitter(0.0))
}

pub fn default_config(address: SocketAddr) -> ClientConfig {
    config_for(&[address]).build().expect("failed to build config")
}

pub async fn connect(address: SocketAddr) -> ClientSession {
    ClientSession::connect(default_config(address))
        .await
        .expect("failed to connect session")
}

/// Polls `condition` until it holds or five seconds pass.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
