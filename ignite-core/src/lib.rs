//! Core types and protocol for the Ignite thin client.
//!
//! This crate holds the pieces that do not need a runtime: the error
//! taxonomy, the tagged binary codec and the message layouts.

#![warn(missing_docs)]

pub mod error;
pub mod protocol;
pub mod serialization;

pub use error::{CodecError, IgniteError, Result, TransportErrorKind};
pub use protocol::{OpCode, ProtocolVersion};
pub use serialization::{BinaryObject, BinaryValue, FromBinary, ToBinary};
