//! Request and response payload layouts.
//!
//! Requests are `[request_id i64][opcode u16][body]`. Responses are
//! `[request_id i64][status i32][flags u16]`, optionally followed by a
//! topology hint, then the body.

use bytes::{Buf, Bytes};

use super::constants::*;
use crate::error::{CodecError, IgniteError, Result};
use crate::serialization::{read_value, BinaryReader, BinaryValue, BinaryWriter};

/// Encodes a full request payload (without the frame length prefix).
pub fn encode_request(request_id: i64, opcode: OpCode, body: &[u8]) -> Bytes {
    let mut writer = BinaryWriter::with_capacity(REQUEST_HEADER_SIZE + body.len());
    writer.write_i64(request_id);
    writer.write_u16(opcode.code());
    writer.write_bytes(body);
    writer.freeze()
}

/// Header of an inbound request, as seen by a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    /// Correlation id chosen by the client.
    pub request_id: i64,
    /// Requested operation.
    pub opcode: OpCode,
}

impl RequestHeader {
    /// Splits a request payload into its header and body.
    pub fn decode(mut payload: Bytes) -> Result<(Self, Bytes)> {
        if payload.len() < REQUEST_HEADER_SIZE {
            return Err(IgniteError::Protocol(format!(
                "request of {} bytes is shorter than its header",
                payload.len()
            )));
        }
        let request_id = payload.get_i64_le();
        let code = payload.get_u16_le();
        let opcode = OpCode::from_code(code)
            .ok_or_else(|| IgniteError::Protocol(format!("unknown opcode {}", code)))?;
        Ok((Self { request_id, opcode }, payload))
    }
}

/// Topology advertisement piggybacked on a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyHint {
    /// Monotonic topology version.
    pub version: i64,
    /// Advertised `host:port` endpoints.
    pub endpoints: Vec<String>,
}

/// A decoded response payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Id of the request this answers.
    pub request_id: i64,
    /// Zero for success.
    pub status: i32,
    /// Header flags.
    pub flags: u16,
    /// Topology hint when `FLAG_TOPOLOGY_CHANGED` is set.
    pub topology: Option<TopologyHint>,
    /// Operation-specific body.
    pub body: Bytes,
}

impl Response {
    /// Reads the request id leading a response payload without consuming it.
    pub fn peek_request_id(payload: &[u8]) -> Option<i64> {
        let bytes: [u8; REQUEST_ID_SIZE] = payload.get(..REQUEST_ID_SIZE)?.try_into().ok()?;
        Some(i64::from_le_bytes(bytes))
    }

    /// Decodes a response payload.
    pub fn decode(payload: Bytes) -> Result<Self> {
        if payload.len() < RESPONSE_HEADER_SIZE {
            return Err(IgniteError::Protocol(format!(
                "response of {} bytes is shorter than its header",
                payload.len()
            )));
        }

        let mut reader = BinaryReader::new(&payload);
        let request_id = reader.read_i64()?;
        let status = reader.read_i32()?;
        let flags = reader.read_u16()?;

        let topology = if flags & FLAG_TOPOLOGY_CHANGED != 0 {
            let version = reader.read_i64()?;
            let endpoints = match read_value(&mut reader)? {
                BinaryValue::Collection(items) => items
                    .into_iter()
                    .map(|item| match item {
                        BinaryValue::String(s) => Ok(s),
                        other => Err(CodecError::TypeMismatch {
                            expected: "string",
                            found: other.type_name(),
                        }),
                    })
                    .collect::<std::result::Result<Vec<_>, _>>()?,
                other => {
                    return Err(CodecError::TypeMismatch {
                        expected: "collection",
                        found: other.type_name(),
                    }
                    .into())
                }
            };
            Some(TopologyHint { version, endpoints })
        } else {
            None
        };

        let body = payload.slice(reader.position()..);
        Ok(Self {
            request_id,
            status,
            flags,
            topology,
            body,
        })
    }

    /// Returns `true` if the server reported success.
    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }

    /// Reads the error message carried by a failed response.
    pub fn error_message(&self) -> String {
        match crate::serialization::decode(&self.body) {
            Ok((BinaryValue::String(message), _)) => message,
            Ok((BinaryValue::Null, _)) | Err(_) => format!("status {}", self.status),
            Ok((other, _)) => format!("status {} ({})", self.status, other.type_name()),
        }
    }
}

/// Builds response payloads; used by servers and tests.
#[derive(Debug, Clone)]
pub struct ResponseBuilder {
    request_id: i64,
    status: i32,
    topology: Option<TopologyHint>,
}

impl ResponseBuilder {
    /// Starts a successful response to `request_id`.
    pub fn new(request_id: i64) -> Self {
        Self {
            request_id,
            status: STATUS_SUCCESS,
            topology: None,
        }
    }

    /// Sets a non-zero status.
    pub fn status(mut self, status: i32) -> Self {
        self.status = status;
        self
    }

    /// Attaches a topology hint.
    pub fn topology(mut self, hint: TopologyHint) -> Self {
        self.topology = Some(hint);
        self
    }

    /// Encodes the payload with `body` appended.
    pub fn build(self, body: &[u8]) -> std::result::Result<Bytes, CodecError> {
        let mut writer = BinaryWriter::with_capacity(RESPONSE_HEADER_SIZE + body.len());
        writer.write_i64(self.request_id);
        writer.write_i32(self.status);
        match &self.topology {
            Some(hint) => {
                writer.write_u16(FLAG_TOPOLOGY_CHANGED);
                writer.write_i64(hint.version);
                let endpoints = BinaryValue::Collection(
                    hint.endpoints.iter().cloned().map(BinaryValue::String).collect(),
                );
                crate::serialization::write_value(&mut writer, &endpoints)?;
            }
            None => writer.write_u16(0),
        }
        writer.write_bytes(body);
        Ok(writer.freeze())
    }

    /// Encodes an error response carrying `message`.
    pub fn build_error(self, message: &str) -> std::result::Result<Bytes, CodecError> {
        let body = crate::serialization::encode(&BinaryValue::String(message.to_string()))?;
        self.build(&body)
    }
}

/// Computes the cache id for a cache name.
///
/// Uses the 31-multiplier hash over UTF-16 code units so that ids agree with
/// servers that derive them the same way.
pub fn cache_id(name: &str) -> i32 {
    name.encode_utf16()
        .fold(0i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(unit as i32))
}

/// Starts a cache operation body: `[cache_id i32][flags u8]`.
pub fn cache_body_writer(cache_id: i32) -> BinaryWriter {
    let mut writer = BinaryWriter::new();
    writer.write_i32(cache_id);
    writer.write_u8(CACHE_FLAGS_NONE);
    writer
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_layout() {
        let payload = encode_request(7, OpCode::CacheGet, &[0xAA]);
        assert_eq!(&payload[..8], &7i64.to_le_bytes());
        assert_eq!(&payload[8..10], &1000u16.to_le_bytes());
        assert_eq!(payload[10], 0xAA);

        let (header, body) = RequestHeader::decode(payload).unwrap();
        assert_eq!(header.request_id, 7);
        assert_eq!(header.opcode, OpCode::CacheGet);
        assert_eq!(&body[..], &[0xAA]);
    }

    #[test]
    fn test_request_with_unknown_opcode() {
        let mut raw = 1i64.to_le_bytes().to_vec();
        raw.extend_from_slice(&4242u16.to_le_bytes());
        assert!(matches!(
            RequestHeader::decode(Bytes::from(raw)),
            Err(IgniteError::Protocol(_))
        ));
    }

    #[test]
    fn test_response_without_topology() {
        let payload = ResponseBuilder::new(3).build(&[1, 2]).unwrap();
        let response = Response::decode(payload).unwrap();
        assert_eq!(response.request_id, 3);
        assert!(response.is_success());
        assert!(response.topology.is_none());
        assert_eq!(&response.body[..], &[1, 2]);
    }

    #[test]
    fn test_response_with_topology() {
        let hint = TopologyHint {
            version: 5,
            endpoints: vec!["10.0.0.1:10800".to_string(), "10.0.0.2:10800".to_string()],
        };
        let payload = ResponseBuilder::new(9).topology(hint.clone()).build(&[7]).unwrap();
        let response = Response::decode(payload).unwrap();
        assert_eq!(response.topology, Some(hint));
        assert_eq!(&response.body[..], &[7]);
    }

    #[test]
    fn test_error_response_message() {
        let payload = ResponseBuilder::new(1)
            .status(STATUS_FAILED)
            .build_error("cache missing")
            .unwrap();
        let response = Response::decode(payload).unwrap();
        assert!(!response.is_success());
        assert_eq!(response.error_message(), "cache missing");
    }

    #[test]
    fn test_short_response_rejected() {
        assert!(matches!(
            Response::decode(Bytes::from_static(&[0; 10])),
            Err(IgniteError::Protocol(_))
        ));
    }

    #[test]
    fn test_peek_request_id() {
        assert_eq!(Response::peek_request_id(&42i64.to_le_bytes()), Some(42));
        assert_eq!(Response::peek_request_id(&[1, 2, 3]), None);
    }

    #[test]
    fn test_cache_id_matches_string_hash() {
        assert_eq!(cache_id(""), 0);
        assert_eq!(cache_id("a"), 97);
        assert_eq!(cache_id("ab"), 97 * 31 + 98);
        // overflow wraps
        assert_eq!(cache_id("default-cache-with-a-long-name"), {
            let mut h = 0i32;
            for c in "default-cache-with-a-long-name".chars() {
                h = h.wrapping_mul(31).wrapping_add(c as i32);
            }
            h
        });
    }

    #[test]
    fn test_cache_body_prefix() {
        let writer = cache_body_writer(0x01020304);
        assert_eq!(writer.as_bytes(), &[4, 3, 2, 1, 0]);
    }
}
