//! Little-endian writer backed by a growable buffer.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::CodecError;

/// Writes primitive values in the protocol's little-endian layout.
#[derive(Debug, Default)]
pub struct BinaryWriter {
    buffer: BytesMut,
}

impl BinaryWriter {
    /// Creates a writer with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(64)
    }

    /// Creates a writer with the given capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    /// Returns the written bytes as a slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Returns the number of bytes written.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns `true` if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Consumes the writer and returns the buffer.
    pub fn into_inner(self) -> BytesMut {
        self.buffer
    }

    /// Consumes the writer and returns frozen bytes.
    pub fn freeze(self) -> Bytes {
        self.buffer.freeze()
    }

    /// Writes an unsigned byte.
    pub fn write_u8(&mut self, v: u8) {
        self.buffer.put_u8(v);
    }

    /// Writes a signed byte.
    pub fn write_i8(&mut self, v: i8) {
        self.buffer.put_i8(v);
    }

    /// Writes a boolean as 0 or 1.
    pub fn write_bool(&mut self, v: bool) {
        self.buffer.put_u8(u8::from(v));
    }

    /// Writes a 16-bit unsigned integer.
    pub fn write_u16(&mut self, v: u16) {
        self.buffer.put_u16_le(v);
    }

    /// Writes a 16-bit signed integer.
    pub fn write_i16(&mut self, v: i16) {
        self.buffer.put_i16_le(v);
    }

    /// Writes a 32-bit signed integer.
    pub fn write_i32(&mut self, v: i32) {
        self.buffer.put_i32_le(v);
    }

    /// Writes a 64-bit signed integer.
    pub fn write_i64(&mut self, v: i64) {
        self.buffer.put_i64_le(v);
    }

    /// Writes a 32-bit float.
    pub fn write_f32(&mut self, v: f32) {
        self.buffer.put_f32_le(v);
    }

    /// Writes a 64-bit float.
    pub fn write_f64(&mut self, v: f64) {
        self.buffer.put_f64_le(v);
    }

    /// Writes a length or count as an `i32` prefix.
    pub fn write_len(&mut self, len: usize) -> Result<(), CodecError> {
        let len = i32::try_from(len).map_err(|_| CodecError::TooLarge(len))?;
        self.write_i32(len);
        Ok(())
    }

    /// Writes raw bytes without a prefix.
    pub fn write_bytes(&mut self, v: &[u8]) {
        self.buffer.put_slice(v);
    }

    /// Writes a length-prefixed UTF-8 string without a type tag.
    pub fn write_raw_string(&mut self, v: &str) -> Result<(), CodecError> {
        self.write_len(v.len())?;
        self.write_bytes(v.as_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_primitives_little_endian() {
        let mut writer = BinaryWriter::new();
        writer.write_u16(0x1234);
        writer.write_i32(-2);
        assert_eq!(writer.as_bytes(), &[0x34, 0x12, 0xFE, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_write_raw_string() {
        let mut writer = BinaryWriter::new();
        writer.write_raw_string("hi").unwrap();
        assert_eq!(writer.as_bytes(), &[2, 0, 0, 0, b'h', b'i']);
    }

    #[test]
    fn test_write_bool() {
        let mut writer = BinaryWriter::new();
        writer.write_bool(true);
        writer.write_bool(false);
        assert_eq!(writer.as_bytes(), &[1, 0]);
    }

    #[test]
    fn test_empty_writer() {
        let writer = BinaryWriter::default();
        assert!(writer.is_empty());
        assert_eq!(writer.len(), 0);
        assert!(writer.freeze().is_empty());
    }
}
