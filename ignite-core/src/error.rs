//! Error types for thin-client operations.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Failure while encoding or decoding a [`BinaryValue`](crate::BinaryValue).
///
/// Every variant describes a corrupt or unsupported stream. Decoding never
/// substitutes a default value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The type tag is not part of the wire type table.
    #[error("unknown type tag {tag} at offset {offset}")]
    UnknownTag {
        /// The offending tag byte.
        tag: u8,
        /// Offset of the tag in the input.
        offset: usize,
    },

    /// The buffer ended before the value was complete.
    #[error("truncated buffer at offset {offset}: need {needed} bytes, have {available}")]
    Truncated {
        /// Offset where the read was attempted.
        offset: usize,
        /// Bytes required.
        needed: usize,
        /// Bytes left in the buffer.
        available: usize,
    },

    /// A length or count prefix was negative.
    #[error("negative length {length} at offset {offset}")]
    NegativeLength {
        /// The decoded length.
        length: i32,
        /// Offset of the length prefix.
        offset: usize,
    },

    /// A string payload was not valid UTF-8.
    #[error("invalid UTF-8 string at offset {offset}")]
    InvalidUtf8 {
        /// Offset of the string payload.
        offset: usize,
    },

    /// A boolean byte was neither 0 nor 1.
    #[error("invalid boolean byte {value} at offset {offset}")]
    InvalidBool {
        /// The byte read.
        value: u8,
        /// Offset of the byte.
        offset: usize,
    },

    /// Collections or objects were nested deeper than the decoder allows.
    #[error("nesting depth exceeds {limit}")]
    DepthExceeded {
        /// The configured nesting limit.
        limit: usize,
    },

    /// A decoded value had a different type than the caller asked for.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// The requested type.
        expected: &'static str,
        /// The type actually decoded.
        found: &'static str,
    },

    /// A value is too large to be represented with an `i32` length prefix.
    #[error("value too large to encode: {0} bytes or elements")]
    TooLarge(usize),
}

/// The I/O failure class of a [`IgniteError::Transport`] error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    /// The peer reset or aborted the connection.
    ConnectionReset,
    /// Connecting or reading did not complete in time.
    Timeout,
    /// The stream ended in the middle of a frame.
    PartialFrame,
    /// A length prefix exceeded the configured maximum frame size.
    FrameTooLarge,
    /// Any other I/O failure.
    Io,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ConnectionReset => "connection reset",
            Self::Timeout => "timeout",
            Self::PartialFrame => "partial frame at eof",
            Self::FrameTooLarge => "frame too large",
            Self::Io => "i/o",
        };
        f.write_str(name)
    }
}

impl TransportErrorKind {
    /// Classifies a standard I/O error.
    pub fn from_io(err: &std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::NotConnected => Self::ConnectionReset,
            ErrorKind::TimedOut => Self::Timeout,
            ErrorKind::UnexpectedEof => Self::PartialFrame,
            _ => Self::Io,
        }
    }
}

/// The main error type for thin-client operations.
#[derive(Debug, Error)]
pub enum IgniteError {
    /// Malformed or unsupported payload. Fatal to the one decode, never retried.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The server rejected the handshake or speaks no mutually supported version.
    #[error("handshake with {endpoint} failed: {reason}")]
    Handshake {
        /// The endpoint that rejected the handshake.
        endpoint: String,
        /// Why the handshake failed.
        reason: String,
    },

    /// I/O failure on a connection.
    #[error("transport error on {endpoint} ({kind}): {message}")]
    Transport {
        /// The endpoint of the failed connection.
        endpoint: String,
        /// The failure class.
        kind: TransportErrorKind,
        /// Details from the underlying error.
        message: String,
    },

    /// A request did not receive a response within its timeout.
    #[error("request {request_id} (opcode {opcode}) to {endpoint} timed out after {timeout:?}")]
    Timeout {
        /// The endpoint the request was sent to.
        endpoint: String,
        /// The request opcode.
        opcode: u16,
        /// The request id.
        request_id: i64,
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The connection closed while the request was outstanding.
    #[error("connection to {endpoint} closed{}", fmt_request_id(.request_id))]
    ConnectionClosed {
        /// The endpoint of the closed connection.
        endpoint: String,
        /// The affected request, when one was assigned.
        request_id: Option<i64>,
    },

    /// Every known endpoint is in backoff or permanently failed.
    #[error("no available endpoint: {0}")]
    NoAvailableEndpoint(String),

    /// The session was closed explicitly.
    #[error("session closed")]
    SessionClosed,

    /// The server processed the request and reported an error status.
    #[error("server error {status} for request {request_id} (opcode {opcode}) on {endpoint}: {message}")]
    Server {
        /// The endpoint that answered.
        endpoint: String,
        /// The request opcode.
        opcode: u16,
        /// The request id.
        request_id: i64,
        /// The non-zero status code.
        status: i32,
        /// The server's error message.
        message: String,
    },

    /// A message violated the protocol layout.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}

fn fmt_request_id(request_id: &Option<i64>) -> String {
    match request_id {
        Some(id) => format!(" with request {} outstanding", id),
        None => String::new(),
    }
}

impl IgniteError {
    /// Builds a transport error from an I/O error.
    pub fn transport(endpoint: impl ToString, err: &std::io::Error) -> Self {
        Self::Transport {
            endpoint: endpoint.to_string(),
            kind: TransportErrorKind::from_io(err),
            message: err.to_string(),
        }
    }

    /// Returns `true` if the failure is connection-level and the failover
    /// manager should move to another endpoint.
    pub fn triggers_failover(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::ConnectionClosed { .. } | Self::Handshake { .. }
        )
    }
}

/// A specialized `Result` type for thin-client operations.
pub type Result<T> = std::result::Result<T, IgniteError>;
