//! Async Rust thin client for Apache Ignite.
//!
//! The client talks the Ignite thin-client binary protocol over TCP. A
//! [`ClientSession`] keeps a small pool of handshaken connections, correlates
//! concurrent requests with their responses on each one, and fails over to
//! another endpoint when a connection is lost.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use ignite_client::{ClientConfig, ClientSession};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::builder()
//!         .add_address("127.0.0.1:10800".parse()?)
//!         .build()?;
//!     let session = ClientSession::connect(config).await?;
//!
//!     let cache = session.get_or_create_cache::<i32, String>("people").await?;
//!     cache.put(&1, &"x".to_string()).await?;
//!     println!("{:?}", cache.get(&1).await?); // Some("x")
//!
//!     session.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Failover
//!
//! Requests that never reached the wire are retried on the next available
//! endpoint. Requests that were written before the connection dropped are
//! retried only for idempotent operations, at most
//! [`RetryConfig::max_failover_retries`] times. Failing endpoints back off
//! exponentially with jitter and can be watched through
//! [`ClientSession::subscribe_connection_events`].
//!
//! # Configuration
//!
//! ```rust,no_run
//! use ignite_client::ClientConfig;
//! use std::time::Duration;
//!
//! let config = ClientConfig::builder()
//!     .add_address("10.0.0.1:10800".parse().unwrap())
//!     .add_address("10.0.0.2:10800".parse().unwrap())
//!     .connection_timeout(Duration::from_secs(10))
//!     .credentials("ignite", "ignite")
//!     .retry(|r| r
//!         .initial_backoff(Duration::from_millis(100))
//!         .max_backoff(Duration::from_secs(30))
//!         .multiplier(2.0)
//!         .max_failover_retries(2))
//!     .build()
//!     .expect("invalid config");
//! ```

#![warn(missing_docs)]

pub mod cache;
pub mod config;
pub mod connection;
pub mod listener;
mod session;

pub use cache::Cache;
pub use config::{
    ClientConfig, ClientConfigBuilder, ConfigError, NetworkConfig, NetworkConfigBuilder,
    RetryConfig, RetryConfigBuilder, SecurityConfig, SecurityConfigBuilder, DEFAULT_PORT,
};
pub use connection::{
    ClusterDiscovery, ConnectionEvent, ConnectionId, ConnectionManager, Endpoint, EndpointHealth,
    EndpointOrigin, SessionState, StaticAddressDiscovery,
};
pub use ignite_core as core;
pub use ignite_core::{IgniteError, Result};
pub use listener::LifecycleEvent;
pub use session::ClientSession;
