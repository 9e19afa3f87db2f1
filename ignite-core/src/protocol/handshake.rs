//! Handshake messages exchanged when a connection opens.

use std::fmt;

use bytes::Bytes;

use super::constants::{HANDSHAKE_CODE, THIN_CLIENT_TYPE};
use crate::error::{CodecError, IgniteError, Result};
use crate::serialization::{read_value, write_value, BinaryReader, BinaryValue, BinaryWriter};

/// A `major.minor.patch` protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProtocolVersion {
    /// Major version.
    pub major: u16,
    /// Minor version.
    pub minor: u16,
    /// Patch version.
    pub patch: u16,
}

impl ProtocolVersion {
    /// Version 1.0.0.
    pub const V1_0_0: Self = Self::new(1, 0, 0);
    /// Version 1.1.0.
    pub const V1_1_0: Self = Self::new(1, 1, 0);
    /// Version 1.2.0.
    pub const V1_2_0: Self = Self::new(1, 2, 0);

    /// Creates a version.
    pub const fn new(major: u16, minor: u16, patch: u16) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    fn write(&self, writer: &mut BinaryWriter) {
        writer.write_u16(self.major);
        writer.write_u16(self.minor);
        writer.write_u16(self.patch);
    }

    fn read(reader: &mut BinaryReader<'_>) -> std::result::Result<Self, CodecError> {
        Ok(Self::new(reader.read_u16()?, reader.read_u16()?, reader.read_u16()?))
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Versions this client can speak, newest first.
pub const SUPPORTED_VERSIONS: [ProtocolVersion; 3] = [
    ProtocolVersion::V1_2_0,
    ProtocolVersion::V1_1_0,
    ProtocolVersion::V1_0_0,
];

/// The opening message of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    /// Version the client proposes.
    pub version: ProtocolVersion,
    /// Optional user name.
    pub username: Option<String>,
    /// Optional password.
    pub password: Option<String>,
}

impl HandshakeRequest {
    /// Creates a request without credentials.
    pub fn new(version: ProtocolVersion) -> Self {
        Self {
            version,
            username: None,
            password: None,
        }
    }

    /// Adds credentials.
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Encodes the request payload.
    pub fn encode(&self) -> std::result::Result<Bytes, CodecError> {
        let mut writer = BinaryWriter::new();
        writer.write_u8(HANDSHAKE_CODE);
        self.version.write(&mut writer);
        writer.write_u8(THIN_CLIENT_TYPE);
        write_optional_string(&mut writer, self.username.as_deref())?;
        write_optional_string(&mut writer, self.password.as_deref())?;
        Ok(writer.freeze())
    }

    /// Decodes a request payload.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut reader = BinaryReader::new(payload);
        let code = reader.read_u8()?;
        if code != HANDSHAKE_CODE {
            return Err(IgniteError::Protocol(format!(
                "expected handshake code {}, got {}",
                HANDSHAKE_CODE, code
            )));
        }
        let version = ProtocolVersion::read(&mut reader)?;
        let client_type = reader.read_u8()?;
        if client_type != THIN_CLIENT_TYPE {
            return Err(IgniteError::Protocol(format!(
                "unsupported client type {}",
                client_type
            )));
        }
        let username = read_optional_string(&mut reader)?;
        let password = read_optional_string(&mut reader)?;
        Ok(Self {
            version,
            username,
            password,
        })
    }
}

/// The server's answer to a [`HandshakeRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeResponse {
    /// The proposed version was accepted.
    Accepted,
    /// The proposal was rejected.
    Rejected {
        /// The version the server would accept.
        server_version: ProtocolVersion,
        /// The server's explanation.
        message: String,
    },
}

impl HandshakeResponse {
    /// Encodes the response payload.
    pub fn encode(&self) -> std::result::Result<Bytes, CodecError> {
        let mut writer = BinaryWriter::new();
        match self {
            Self::Accepted => writer.write_bool(true),
            Self::Rejected {
                server_version,
                message,
            } => {
                writer.write_bool(false);
                server_version.write(&mut writer);
                write_value(&mut writer, &BinaryValue::String(message.clone()))?;
            }
        }
        Ok(writer.freeze())
    }

    /// Decodes a response payload.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut reader = BinaryReader::new(payload);
        if reader.read_bool()? {
            return Ok(Self::Accepted);
        }
        let server_version = ProtocolVersion::read(&mut reader)?;
        let message = read_optional_string(&mut reader)?.unwrap_or_default();
        Ok(Self::Rejected {
            server_version,
            message,
        })
    }
}

fn write_optional_string(
    writer: &mut BinaryWriter,
    value: Option<&str>,
) -> std::result::Result<(), CodecError> {
    let value = match value {
        Some(s) => BinaryValue::String(s.to_string()),
        None => BinaryValue::Null,
    };
    write_value(writer, &value)
}

fn read_optional_string(reader: &mut BinaryReader<'_>) -> std::result::Result<Option<String>, CodecError> {
    match read_value(reader)? {
        BinaryValue::Null => Ok(None),
        BinaryValue::String(s) => Ok(Some(s)),
        other => Err(CodecError::TypeMismatch {
            expected: "string",
            found: other.type_name(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_layout_without_credentials() {
        let bytes = HandshakeRequest::new(ProtocolVersion::V1_2_0).encode().unwrap();
        assert_eq!(&bytes[..], &[1, 1, 0, 2, 0, 0, 0, 2, 101, 101]);
    }

    #[test]
    fn test_request_with_credentials_decodes() {
        let request = HandshakeRequest::new(ProtocolVersion::V1_1_0).with_credentials("ignite", "secret");
        let decoded = HandshakeRequest::decode(&request.encode().unwrap()).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_accepted_response() {
        let bytes = HandshakeResponse::Accepted.encode().unwrap();
        assert_eq!(&bytes[..], &[1]);
        assert_eq!(HandshakeResponse::decode(&bytes).unwrap(), HandshakeResponse::Accepted);
    }

    #[test]
    fn test_rejected_response() {
        let response = HandshakeResponse::Rejected {
            server_version: ProtocolVersion::new(2, 0, 0),
            message: "unsupported version".to_string(),
        };
        let decoded = HandshakeResponse::decode(&response.encode().unwrap()).unwrap();
        assert_eq!(decoded, response);
    }

    #[test]
    fn test_truncated_response_fails() {
        assert!(matches!(
            HandshakeResponse::decode(&[0, 1, 0]),
            Err(IgniteError::Codec(CodecError::Truncated { .. }))
        ));
    }

    #[test]
    fn test_bad_handshake_code() {
        assert!(matches!(
            HandshakeRequest::decode(&[9, 1, 0, 0, 0, 0, 0, 2, 101, 101]),
            Err(IgniteError::Protocol(_))
        ));
    }

    #[test]
    fn test_version_ordering_and_display() {
        assert!(ProtocolVersion::V1_2_0 > ProtocolVersion::V1_1_0);
        assert_eq!(ProtocolVersion::V1_1_0.to_string(), "1.1.0");
    }
}
