//! In-memory representation of values carried by the binary protocol.

use uuid::Uuid;

/// Wire type tags.
///
/// The tag table is closed: any byte not listed here fails to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeCode {
    /// Signed 8-bit integer.
    Byte = 1,
    /// Signed 16-bit integer.
    Short = 2,
    /// Signed 32-bit integer.
    Int = 3,
    /// Signed 64-bit integer.
    Long = 4,
    /// 32-bit float.
    Float = 5,
    /// 64-bit float.
    Double = 6,
    /// UTF-16 code unit.
    Char = 7,
    /// Boolean.
    Bool = 8,
    /// Length-prefixed UTF-8 string.
    String = 9,
    /// 128-bit UUID.
    Uuid = 10,
    /// Length-prefixed byte array.
    ByteArray = 12,
    /// Count-prefixed sequence of values.
    Collection = 24,
    /// Count-prefixed sequence of key/value pairs.
    Map = 25,
    /// The null value.
    Null = 101,
    /// Object with a type id and named fields.
    Object = 103,
}

impl TypeCode {
    /// Maps a tag byte to its type code.
    pub fn from_tag(tag: u8) -> Option<Self> {
        let code = match tag {
            1 => Self::Byte,
            2 => Self::Short,
            3 => Self::Int,
            4 => Self::Long,
            5 => Self::Float,
            6 => Self::Double,
            7 => Self::Char,
            8 => Self::Bool,
            9 => Self::String,
            10 => Self::Uuid,
            12 => Self::ByteArray,
            24 => Self::Collection,
            25 => Self::Map,
            101 => Self::Null,
            103 => Self::Object,
            _ => return None,
        };
        Some(code)
    }

    /// Returns the tag byte written on the wire.
    pub fn tag(self) -> u8 {
        self as u8
    }
}

/// An object value: a numeric type id plus ordered named fields.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BinaryObject {
    /// Type identifier agreed with the server.
    pub type_id: i32,
    /// Fields in declaration order.
    pub fields: Vec<(String, BinaryValue)>,
}

impl BinaryObject {
    /// Creates an empty object of the given type.
    pub fn new(type_id: i32) -> Self {
        Self {
            type_id,
            fields: Vec::new(),
        }
    }

    /// Appends a field and returns the object.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<BinaryValue>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    /// Returns the first field with the given name.
    pub fn field(&self, name: &str) -> Option<&BinaryValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

/// A tagged value as carried on the wire.
///
/// The variant always matches the [`TypeCode`] it is encoded with.
#[derive(Debug, Clone, PartialEq)]
pub enum BinaryValue {
    /// The null value.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed 8-bit integer.
    Byte(i8),
    /// Signed 16-bit integer.
    Short(i16),
    /// Signed 32-bit integer.
    Int(i32),
    /// Signed 64-bit integer.
    Long(i64),
    /// 32-bit float.
    Float(f32),
    /// 64-bit float.
    Double(f64),
    /// UTF-16 code unit.
    Char(u16),
    /// UTF-8 string.
    String(String),
    /// 128-bit UUID.
    Uuid(Uuid),
    /// Raw bytes.
    ByteArray(Vec<u8>),
    /// Ordered sequence of values.
    Collection(Vec<BinaryValue>),
    /// Ordered key/value pairs.
    Map(Vec<(BinaryValue, BinaryValue)>),
    /// Object with named fields.
    Object(BinaryObject),
}

impl BinaryValue {
    /// Returns the wire type code of this value.
    pub fn type_code(&self) -> TypeCode {
        match self {
            Self::Null => TypeCode::Null,
            Self::Bool(_) => TypeCode::Bool,
            Self::Byte(_) => TypeCode::Byte,
            Self::Short(_) => TypeCode::Short,
            Self::Int(_) => TypeCode::Int,
            Self::Long(_) => TypeCode::Long,
            Self::Float(_) => TypeCode::Float,
            Self::Double(_) => TypeCode::Double,
            Self::Char(_) => TypeCode::Char,
            Self::String(_) => TypeCode::String,
            Self::Uuid(_) => TypeCode::Uuid,
            Self::ByteArray(_) => TypeCode::ByteArray,
            Self::Collection(_) => TypeCode::Collection,
            Self::Map(_) => TypeCode::Map,
            Self::Object(_) => TypeCode::Object,
        }
    }

    /// Returns a short name of the variant, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Byte(_) => "byte",
            Self::Short(_) => "short",
            Self::Int(_) => "int",
            Self::Long(_) => "long",
            Self::Float(_) => "float",
            Self::Double(_) => "double",
            Self::Char(_) => "char",
            Self::String(_) => "string",
            Self::Uuid(_) => "uuid",
            Self::ByteArray(_) => "byte array",
            Self::Collection(_) => "collection",
            Self::Map(_) => "map",
            Self::Object(_) => "object",
        }
    }

    /// Returns `true` for [`BinaryValue::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the string slice if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for BinaryValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i8> for BinaryValue {
    fn from(v: i8) -> Self {
        Self::Byte(v)
    }
}

impl From<i16> for BinaryValue {
    fn from(v: i16) -> Self {
        Self::Short(v)
    }
}

impl From<i32> for BinaryValue {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<i64> for BinaryValue {
    fn from(v: i64) -> Self {
        Self::Long(v)
    }
}

impl From<f32> for BinaryValue {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<f64> for BinaryValue {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<String> for BinaryValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for BinaryValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<Uuid> for BinaryValue {
    fn from(v: Uuid) -> Self {
        Self::Uuid(v)
    }
}

impl From<Vec<u8>> for BinaryValue {
    fn from(v: Vec<u8>) -> Self {
        Self::ByteArray(v)
    }
}

impl From<BinaryObject> for BinaryValue {
    fn from(v: BinaryObject) -> Self {
        Self::Object(v)
    }
}
