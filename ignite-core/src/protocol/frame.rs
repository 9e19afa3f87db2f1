//! Length-prefixed framing.
//!
//! Every frame on the wire is a 4-byte little-endian length followed by that
//! many payload bytes. The framing layer never looks inside the payload.

use std::io;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use super::constants::{DEFAULT_MAX_FRAME_LENGTH, SIZE_OF_FRAME_LENGTH_FIELD};

/// Failure while reading or writing frames.
#[derive(Debug, Error)]
pub enum FrameError {
    /// A length prefix exceeded the configured maximum.
    #[error("frame of {length} bytes exceeds maximum of {max}")]
    TooLarge {
        /// The announced payload length.
        length: usize,
        /// The configured maximum.
        max: usize,
    },

    /// The stream ended in the middle of a frame.
    #[error("stream ended with {buffered} bytes of an incomplete frame")]
    PartialFrame {
        /// Bytes received for the incomplete frame, prefix included.
        buffered: usize,
    },

    /// Underlying I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// `tokio_util` codec for length-prefixed frames.
///
/// Decoded items are the raw payloads; encoded items are payloads that get
/// the length prefix prepended.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_length: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCodec {
    /// Creates a codec with the default maximum frame length.
    pub fn new() -> Self {
        Self::with_max_length(DEFAULT_MAX_FRAME_LENGTH)
    }

    /// Creates a codec rejecting payloads longer than `max_frame_length`.
    pub fn with_max_length(max_frame_length: usize) -> Self {
        Self { max_frame_length }
    }

    /// Returns the configured maximum payload length.
    pub fn max_frame_length(&self) -> usize {
        self.max_frame_length
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, FrameError> {
        if src.len() < SIZE_OF_FRAME_LENGTH_FIELD {
            return Ok(None);
        }

        let length = u32::from_le_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if length > self.max_frame_length {
            return Err(FrameError::TooLarge {
                length,
                max: self.max_frame_length,
            });
        }

        let total = SIZE_OF_FRAME_LENGTH_FIELD + length;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(SIZE_OF_FRAME_LENGTH_FIELD);
        Ok(Some(src.split_to(length).freeze()))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, FrameError> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Err(FrameError::PartialFrame {
                buffered: src.len(),
            }),
        }
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), FrameError> {
        write_frame(&item, self.max_frame_length, dst)
    }
}

impl Encoder<&[u8]> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: &[u8], dst: &mut BytesMut) -> Result<(), FrameError> {
        write_frame(item, self.max_frame_length, dst)
    }
}

fn write_frame(payload: &[u8], max: usize, dst: &mut BytesMut) -> Result<(), FrameError> {
    if payload.len() > max || payload.len() > u32::MAX as usize {
        return Err(FrameError::TooLarge {
            length: payload.len(),
            max,
        });
    }
    dst.reserve(SIZE_OF_FRAME_LENGTH_FIELD + payload.len());
    dst.put_u32_le(payload.len() as u32);
    dst.put_slice(payload);
    Ok(())
}

/// Returns `payload` with its length prefix.
pub fn frame(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(SIZE_OF_FRAME_LENGTH_FIELD + payload.len());
    buf.put_u32_le(payload.len() as u32);
    buf.put_slice(payload);
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deframe_returns_payload() {
        for payload in [&b""[..], b"a", b"hello frame", &[0u8; 1024][..]] {
            let mut buf = BytesMut::from(&frame(payload)[..]);
            let decoded = FrameCodec::new().decode(&mut buf).unwrap().unwrap();
            assert_eq!(&decoded[..], payload);
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn test_frame_layout() {
        assert_eq!(&frame(b"ab")[..], &[2, 0, 0, 0, b'a', b'b']);
    }

    #[test]
    fn test_decode_incomplete_length() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&[0x01, 0x02][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn test_partial_then_complete_decode() {
        let mut codec = FrameCodec::new();
        let mut full = BytesMut::from(&frame(b"split me please")[..]);
        let rest = full.split_off(7);

        assert!(codec.decode(&mut full).unwrap().is_none());
        full.unsplit(rest);
        let decoded = codec.decode(&mut full).unwrap().unwrap();
        assert_eq!(&decoded[..], b"split me please");
    }

    #[test]
    fn test_decode_multiple_frames() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(Bytes::from_static(b"one"), &mut buf).unwrap();
        codec.encode(&b"two"[..], &mut buf).unwrap();

        assert_eq!(&codec.decode(&mut buf).unwrap().unwrap()[..], b"one");
        assert_eq!(&codec.decode(&mut buf).unwrap().unwrap()[..], b"two");
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_oversized_length_rejected() {
        let mut codec = FrameCodec::with_max_length(16);
        let mut buf = BytesMut::from(&17u32.to_le_bytes()[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(FrameError::TooLarge { length: 17, max: 16 })
        ));

        let mut out = BytesMut::new();
        assert!(codec.encode(&[0u8; 17][..], &mut out).is_err());
    }

    #[test]
    fn test_eof_inside_frame_is_partial() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&frame(b"abcdef")[..5]);
        assert!(matches!(
            codec.decode_eof(&mut buf),
            Err(FrameError::PartialFrame { buffered: 5 })
        ));
    }

    #[test]
    fn test_eof_on_boundary_is_clean() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
    }
}
