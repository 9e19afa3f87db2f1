//! Conversion traits between Rust types and [`BinaryValue`].

use uuid::Uuid;

use super::value::{BinaryObject, BinaryValue};
use crate::error::CodecError;

/// Types that can be written as a [`BinaryValue`].
pub trait ToBinary {
    /// Converts this value to its wire representation.
    fn to_binary(&self) -> BinaryValue;
}

/// Types that can be read back from a [`BinaryValue`].
pub trait FromBinary: Sized {
    /// Converts a decoded value, failing with [`CodecError::TypeMismatch`]
    /// when the variant does not fit.
    fn from_binary(value: BinaryValue) -> Result<Self, CodecError>;
}

fn mismatch<T>(expected: &'static str, found: &BinaryValue) -> Result<T, CodecError> {
    Err(CodecError::TypeMismatch {
        expected,
        found: found.type_name(),
    })
}

macro_rules! impl_primitive {
    ($ty:ty, $variant:ident, $name:literal) => {
        impl ToBinary for $ty {
            fn to_binary(&self) -> BinaryValue {
                BinaryValue::$variant(*self)
            }
        }

        impl FromBinary for $ty {
            fn from_binary(value: BinaryValue) -> Result<Self, CodecError> {
                match value {
                    BinaryValue::$variant(v) => Ok(v),
                    other => mismatch($name, &other),
                }
            }
        }
    };
}

impl_primitive!(bool, Bool, "bool");
impl_primitive!(i8, Byte, "byte");
impl_primitive!(i16, Short, "short");
impl_primitive!(i32, Int, "int");
impl_primitive!(i64, Long, "long");
impl_primitive!(f32, Float, "float");
impl_primitive!(f64, Double, "double");
impl_primitive!(Uuid, Uuid, "uuid");

impl ToBinary for String {
    fn to_binary(&self) -> BinaryValue {
        BinaryValue::String(self.clone())
    }
}

impl ToBinary for str {
    fn to_binary(&self) -> BinaryValue {
        BinaryValue::String(self.to_string())
    }
}

impl FromBinary for String {
    fn from_binary(value: BinaryValue) -> Result<Self, CodecError> {
        match value {
            BinaryValue::String(v) => Ok(v),
            other => mismatch("string", &other),
        }
    }
}

impl ToBinary for Vec<u8> {
    fn to_binary(&self) -> BinaryValue {
        BinaryValue::ByteArray(self.clone())
    }
}

impl FromBinary for Vec<u8> {
    fn from_binary(value: BinaryValue) -> Result<Self, CodecError> {
        match value {
            BinaryValue::ByteArray(v) => Ok(v),
            other => mismatch("byte array", &other),
        }
    }
}

impl ToBinary for BinaryObject {
    fn to_binary(&self) -> BinaryValue {
        BinaryValue::Object(self.clone())
    }
}

impl FromBinary for BinaryObject {
    fn from_binary(value: BinaryValue) -> Result<Self, CodecError> {
        match value {
            BinaryValue::Object(v) => Ok(v),
            other => mismatch("object", &other),
        }
    }
}

impl ToBinary for BinaryValue {
    fn to_binary(&self) -> BinaryValue {
        self.clone()
    }
}

impl FromBinary for BinaryValue {
    fn from_binary(value: BinaryValue) -> Result<Self, CodecError> {
        Ok(value)
    }
}

impl<T: ToBinary + ?Sized> ToBinary for &T {
    fn to_binary(&self) -> BinaryValue {
        (**self).to_binary()
    }
}

impl<T: ToBinary> ToBinary for Option<T> {
    fn to_binary(&self) -> BinaryValue {
        match self {
            Some(v) => v.to_binary(),
            None => BinaryValue::Null,
        }
    }
}

impl<T: FromBinary> FromBinary for Option<T> {
    fn from_binary(value: BinaryValue) -> Result<Self, CodecError> {
        match value {
            BinaryValue::Null => Ok(None),
            other => T::from_binary(other).map(Some),
        }
    }
}
