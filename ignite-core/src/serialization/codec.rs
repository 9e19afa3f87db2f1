//! Encoding and decoding of [`BinaryValue`]s.
//!
//! Every value is a one-byte [`TypeCode`] tag followed by its payload:
//! fixed-width little-endian numbers, `i32`-length-prefixed strings and byte
//! arrays, and `i32`-count-prefixed collections, maps and object fields.

use bytes::Bytes;
use uuid::Uuid;

use super::data_input::BinaryReader;
use super::data_output::BinaryWriter;
use super::value::{BinaryObject, BinaryValue, TypeCode};
use crate::error::CodecError;

/// Maximum nesting of collections, maps and objects accepted by the decoder.
pub const MAX_NESTING_DEPTH: usize = 64;

/// Encodes a value into a fresh buffer.
pub fn encode(value: &BinaryValue) -> Result<Bytes, CodecError> {
    let mut writer = BinaryWriter::new();
    write_value(&mut writer, value)?;
    Ok(writer.freeze())
}

/// Decodes exactly one value from the start of `data`.
///
/// Returns the value and the number of bytes it occupied.
pub fn decode(data: &[u8]) -> Result<(BinaryValue, usize), CodecError> {
    let mut reader = BinaryReader::new(data);
    let value = read_value(&mut reader)?;
    Ok((value, reader.position()))
}

/// Appends the encoding of `value` to `writer`.
pub fn write_value(writer: &mut BinaryWriter, value: &BinaryValue) -> Result<(), CodecError> {
    write_nested(writer, value, 0)
}

/// Reads one value from `reader`.
pub fn read_value(reader: &mut BinaryReader<'_>) -> Result<BinaryValue, CodecError> {
    read_nested(reader, 0)
}

fn write_nested(
    writer: &mut BinaryWriter,
    value: &BinaryValue,
    depth: usize,
) -> Result<(), CodecError> {
    if depth > MAX_NESTING_DEPTH {
        return Err(CodecError::DepthExceeded {
            limit: MAX_NESTING_DEPTH,
        });
    }

    writer.write_u8(value.type_code().tag());
    match value {
        BinaryValue::Null => {}
        BinaryValue::Bool(v) => writer.write_bool(*v),
        BinaryValue::Byte(v) => writer.write_i8(*v),
        BinaryValue::Short(v) => writer.write_i16(*v),
        BinaryValue::Int(v) => writer.write_i32(*v),
        BinaryValue::Long(v) => writer.write_i64(*v),
        BinaryValue::Float(v) => writer.write_f32(*v),
        BinaryValue::Double(v) => writer.write_f64(*v),
        BinaryValue::Char(v) => writer.write_u16(*v),
        BinaryValue::String(v) => writer.write_raw_string(v)?,
        BinaryValue::Uuid(v) => {
            let (most, least) = v.as_u64_pair();
            writer.write_i64(most as i64);
            writer.write_i64(least as i64);
        }
        BinaryValue::ByteArray(v) => {
            writer.write_len(v.len())?;
            writer.write_bytes(v);
        }
        BinaryValue::Collection(items) => {
            writer.write_len(items.len())?;
            for item in items {
                write_nested(writer, item, depth + 1)?;
            }
        }
        BinaryValue::Map(entries) => {
            writer.write_len(entries.len())?;
            for (key, val) in entries {
                write_nested(writer, key, depth + 1)?;
                write_nested(writer, val, depth + 1)?;
            }
        }
        BinaryValue::Object(obj) => {
            writer.write_i32(obj.type_id);
            writer.write_len(obj.fields.len())?;
            for (name, val) in &obj.fields {
                writer.write_raw_string(name)?;
                write_nested(writer, val, depth + 1)?;
            }
        }
    }
    Ok(())
}

/// Reads a count prefix and rejects counts that cannot fit in the remaining
/// bytes, assuming each element occupies at least `min_element_size` bytes.
fn read_count(reader: &mut BinaryReader<'_>, min_element_size: usize) -> Result<usize, CodecError> {
    let offset = reader.position();
    let count = reader.read_len()?;
    let needed = count.saturating_mul(min_element_size);
    if needed > reader.remaining() {
        return Err(CodecError::Truncated {
            offset: offset + 4,
            needed,
            available: reader.remaining(),
        });
    }
    Ok(count)
}

fn read_nested(reader: &mut BinaryReader<'_>, depth: usize) -> Result<BinaryValue, CodecError> {
    if depth > MAX_NESTING_DEPTH {
        return Err(CodecError::DepthExceeded {
            limit: MAX_NESTING_DEPTH,
        });
    }

    let offset = reader.position();
    let tag = reader.read_u8()?;
    let code = TypeCode::from_tag(tag).ok_or(CodecError::UnknownTag { tag, offset })?;

    let value = match code {
        TypeCode::Null => BinaryValue::Null,
        TypeCode::Bool => BinaryValue::Bool(reader.read_bool()?),
        TypeCode::Byte => BinaryValue::Byte(reader.read_i8()?),
        TypeCode::Short => BinaryValue::Short(reader.read_i16()?),
        TypeCode::Int => BinaryValue::Int(reader.read_i32()?),
        TypeCode::Long => BinaryValue::Long(reader.read_i64()?),
        TypeCode::Float => BinaryValue::Float(reader.read_f32()?),
        TypeCode::Double => BinaryValue::Double(reader.read_f64()?),
        TypeCode::Char => BinaryValue::Char(reader.read_u16()?),
        TypeCode::String => BinaryValue::String(reader.read_raw_string()?),
        TypeCode::Uuid => {
            let most = reader.read_i64()? as u64;
            let least = reader.read_i64()? as u64;
            BinaryValue::Uuid(Uuid::from_u64_pair(most, least))
        }
        TypeCode::ByteArray => {
            let len = reader.read_len()?;
            BinaryValue::ByteArray(reader.read_bytes(len)?.to_vec())
        }
        TypeCode::Collection => {
            let count = read_count(reader, 1)?;
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(read_nested(reader, depth + 1)?);
            }
            BinaryValue::Collection(items)
        }
        TypeCode::Map => {
            let count = read_count(reader, 2)?;
            let mut entries = Vec::with_capacity(count);
            for _ in 0..count {
                let key = read_nested(reader, depth + 1)?;
                let val = read_nested(reader, depth + 1)?;
                entries.push((key, val));
            }
            BinaryValue::Map(entries)
        }
        TypeCode::Object => {
            let type_id = reader.read_i32()?;
            // name length prefix plus the value tag
            let count = read_count(reader, 5)?;
            let mut fields = Vec::with_capacity(count);
            for _ in 0..count {
                let name = reader.read_raw_string()?;
                let val = read_nested(reader, depth + 1)?;
                fields.push((name, val));
            }
            BinaryValue::Object(BinaryObject { type_id, fields })
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(value: BinaryValue) {
        let bytes = encode(&value).unwrap();
        let (decoded, consumed) = decode(&bytes).unwrap();
        assert_eq!(decoded, value);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn test_roundtrip_every_variant() {
        roundtrip(BinaryValue::Null);
        roundtrip(BinaryValue::Bool(true));
        roundtrip(BinaryValue::Byte(-7));
        roundtrip(BinaryValue::Short(i16::MIN));
        roundtrip(BinaryValue::Int(123_456));
        roundtrip(BinaryValue::Long(i64::MAX));
        roundtrip(BinaryValue::Float(1.5));
        roundtrip(BinaryValue::Double(-0.25));
        roundtrip(BinaryValue::Char(0x263A));
        roundtrip(BinaryValue::String("héllo wörld".to_string()));
        roundtrip(BinaryValue::String(String::new()));
        roundtrip(BinaryValue::Uuid(Uuid::from_u128(
            0x0123_4567_89ab_cdef_fedc_ba98_7654_3210,
        )));
        roundtrip(BinaryValue::ByteArray(vec![0, 1, 2, 255]));
        roundtrip(BinaryValue::Collection(vec![
            BinaryValue::Int(1),
            BinaryValue::Null,
            BinaryValue::String("x".into()),
        ]));
        roundtrip(BinaryValue::Map(vec![
            (BinaryValue::Int(1), BinaryValue::String("one".into())),
            (BinaryValue::String("k".into()), BinaryValue::Collection(vec![])),
        ]));
        roundtrip(BinaryValue::Object(
            BinaryObject::new(42)
                .with_field("id", 7i64)
                .with_field("tags", BinaryValue::Collection(vec!["a".into()])),
        ));
    }

    #[test]
    fn test_int_layout() {
        let bytes = encode(&BinaryValue::Int(1)).unwrap();
        assert_eq!(&bytes[..], &[3, 1, 0, 0, 0]);
    }

    #[test]
    fn test_null_is_single_tag() {
        let bytes = encode(&BinaryValue::Null).unwrap();
        assert_eq!(&bytes[..], &[101]);
    }

    #[test]
    fn test_decode_consumes_only_one_value() {
        let mut data = encode(&BinaryValue::Short(5)).unwrap().to_vec();
        data.extend_from_slice(&encode(&BinaryValue::Bool(false)).unwrap());

        let (first, used) = decode(&data).unwrap();
        assert_eq!(first, BinaryValue::Short(5));
        assert_eq!(used, 3);

        let (second, _) = decode(&data[used..]).unwrap();
        assert_eq!(second, BinaryValue::Bool(false));
    }

    #[test]
    fn test_unknown_tag_fails() {
        assert_eq!(
            decode(&[200, 0, 0]).unwrap_err(),
            CodecError::UnknownTag { tag: 200, offset: 0 }
        );
    }

    #[test]
    fn test_unknown_nested_tag_reports_offset() {
        // collection of one element with a bogus tag
        let data = [24, 1, 0, 0, 0, 99];
        assert_eq!(
            decode(&data).unwrap_err(),
            CodecError::UnknownTag { tag: 99, offset: 5 }
        );
    }

    #[test]
    fn test_truncated_fails() {
        let bytes = encode(&BinaryValue::Long(9)).unwrap();
        let err = decode(&bytes[..5]).unwrap_err();
        assert!(matches!(err, CodecError::Truncated { .. }));

        assert!(matches!(
            decode(&[]).unwrap_err(),
            CodecError::Truncated { offset: 0, .. }
        ));
    }

    #[test]
    fn test_truncated_string_fails() {
        let bytes = encode(&BinaryValue::String("abcdef".into())).unwrap();
        assert!(matches!(
            decode(&bytes[..bytes.len() - 1]).unwrap_err(),
            CodecError::Truncated { .. }
        ));
    }

    #[test]
    fn test_huge_count_rejected_before_allocation() {
        let mut data = vec![24];
        data.extend_from_slice(&i32::MAX.to_le_bytes());
        assert!(matches!(
            decode(&data).unwrap_err(),
            CodecError::Truncated { .. }
        ));
    }

    #[test]
    fn test_negative_collection_count() {
        let mut data = vec![24];
        data.extend_from_slice(&(-1i32).to_le_bytes());
        assert!(matches!(
            decode(&data).unwrap_err(),
            CodecError::NegativeLength { length: -1, .. }
        ));
    }

    #[test]
    fn test_depth_limit() {
        let mut value = BinaryValue::Null;
        for _ in 0..=MAX_NESTING_DEPTH + 1 {
            value = BinaryValue::Collection(vec![value]);
        }
        assert!(matches!(
            encode(&value).unwrap_err(),
            CodecError::DepthExceeded { .. }
        ));

        let mut data = Vec::new();
        for _ in 0..=MAX_NESTING_DEPTH + 1 {
            data.push(24);
            data.extend_from_slice(&1i32.to_le_bytes());
        }
        data.push(101);
        assert!(matches!(
            decode(&data).unwrap_err(),
            CodecError::DepthExceeded { .. }
        ));
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let value = BinaryValue::Map(vec![(1i32.into(), "a".into()), (2i32.into(), "b".into())]);
        assert_eq!(encode(&value).unwrap(), encode(&value).unwrap());
    }
}
