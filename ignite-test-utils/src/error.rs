//! Errors raised by the test harness.

use thiserror::Error;

/// Failure while starting, driving or stopping a test server.
#[derive(Debug, Error)]
pub enum TestUtilsError {
    /// I/O failure on a socket, file or child process.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The harness could not be configured from the environment.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A server process exited or could not be started.
    #[error("server process error: {0}")]
    Process(String),
}

/// Result alias for harness operations.
pub type Result<T> = std::result::Result<T, TestUtilsError>;
