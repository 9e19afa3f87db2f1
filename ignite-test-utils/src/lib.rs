//! Test harness for the Ignite thin client.
//!
//! - [`mock_server`]: an in-process server speaking the thin-client protocol,
//!   with hooks for injecting faults.
//! - [`launcher`]: starting and stopping real or mock server nodes.
//! - [`fs`]: locating test configuration and cleaning up after servers.

#![warn(missing_docs)]

pub mod error;
pub mod fs;
pub mod launcher;
pub mod mock_server;

pub use error::{Result, TestUtilsError};
pub use launcher::{
    cross_platform_config_name, JvmProcessLauncher, MockServerLauncher, ServerConfig, ServerHandle,
    ServerLauncher,
};
pub use mock_server::{MockServer, MockServerBuilder};
