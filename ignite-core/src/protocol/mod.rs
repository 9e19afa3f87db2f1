//! Thin-client binary protocol.
//!
//! Framing, request/response headers, handshake messages and operation
//! codes. Nothing here performs I/O; connections live in the client crate.

pub mod constants;
mod frame;
mod handshake;
mod message;

pub use constants::*;
pub use frame::{frame, FrameCodec, FrameError};
pub use handshake::{HandshakeRequest, HandshakeResponse, ProtocolVersion, SUPPORTED_VERSIONS};
pub use message::{
    cache_body_writer, cache_id, encode_request, RequestHeader, Response, ResponseBuilder,
    TopologyHint,
};
