//! Wire values and wire types.
//!
//! [`Value`] is what a cursor hands back for one column of one row, and what a
//! binder writes into a command parameter. [`WireType`] is the database-level
//! type tag that accompanies a column or a parameter. The two are deliberately
//! distinct from the language-level types described by
//! [`TypeInfo`](crate::types::TypeInfo): coercion between them is the job of
//! the [`TypeRegistry`](crate::registry::TypeRegistry).

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeDelta};
use rust_decimal::prelude::ToPrimitive;
use serde::ser::SerializeSeq;
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

pub use rust_decimal::Decimal;

/// Database-level type tag for a column or parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WireType {
    Boolean,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Single,
    Double,
    Decimal,
    String,
    /// Fixed-length string; used for single characters.
    StringFixedLength,
    Guid,
    DateTime,
    DateTimeOffset,
    /// Time of day or elapsed duration.
    Time,
    Binary,
    /// No specific type known; the driver decides.
    Object,
}

impl WireType {
    /// Stable one-byte tag used when hashing column shapes.
    pub fn tag(self) -> u8 {
        match self {
            WireType::Boolean => 1,
            WireType::Int8 => 2,
            WireType::Int16 => 3,
            WireType::Int32 => 4,
            WireType::Int64 => 5,
            WireType::UInt8 => 6,
            WireType::UInt16 => 7,
            WireType::UInt32 => 8,
            WireType::UInt64 => 9,
            WireType::Single => 10,
            WireType::Double => 11,
            WireType::Decimal => 12,
            WireType::String => 13,
            WireType::StringFixedLength => 14,
            WireType::Guid => 15,
            WireType::DateTime => 16,
            WireType::DateTimeOffset => 17,
            WireType::Time => 18,
            WireType::Binary => 19,
            WireType::Object => 20,
        }
    }
}

impl fmt::Display for WireType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A single wire value.
///
/// `Null` is the "database null" sentinel. `List` only appears on the
/// parameter side, where it is expanded into one parameter per element.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Decimal(Decimal),
    Text(String),
    Char(char),
    Guid(Uuid),
    DateTime(NaiveDateTime),
    DateTimeOffset(DateTime<FixedOffset>),
    Duration(TimeDelta),
    Blob(Vec<u8>),
    List(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The wire type a driver would most naturally use for this value.
    pub fn wire_type(&self) -> WireType {
        match self {
            Value::Null | Value::List(_) => WireType::Object,
            Value::Bool(_) => WireType::Boolean,
            Value::I8(_) => WireType::Int8,
            Value::I16(_) => WireType::Int16,
            Value::I32(_) => WireType::Int32,
            Value::I64(_) => WireType::Int64,
            Value::U8(_) => WireType::UInt8,
            Value::U16(_) => WireType::UInt16,
            Value::U32(_) => WireType::UInt32,
            Value::U64(_) => WireType::UInt64,
            Value::F32(_) => WireType::Single,
            Value::F64(_) => WireType::Double,
            Value::Decimal(_) => WireType::Decimal,
            Value::Text(_) => WireType::String,
            Value::Char(_) => WireType::StringFixedLength,
            Value::Guid(_) => WireType::Guid,
            Value::DateTime(_) => WireType::DateTime,
            Value::DateTimeOffset(_) => WireType::DateTimeOffset,
            Value::Duration(_) => WireType::Time,
            Value::Blob(_) => WireType::Binary,
        }
    }

    /// Human-readable variant name, used in coercion errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::I8(_) => "I8",
            Value::I16(_) => "I16",
            Value::I32(_) => "I32",
            Value::I64(_) => "I64",
            Value::U8(_) => "U8",
            Value::U16(_) => "U16",
            Value::U32(_) => "U32",
            Value::U64(_) => "U64",
            Value::F32(_) => "F32",
            Value::F64(_) => "F64",
            Value::Decimal(_) => "Decimal",
            Value::Text(_) => "Text",
            Value::Char(_) => "Char",
            Value::Guid(_) => "Guid",
            Value::DateTime(_) => "DateTime",
            Value::DateTimeOffset(_) => "DateTimeOffset",
            Value::Duration(_) => "Duration",
            Value::Blob(_) => "Blob",
            Value::List(_) => "List",
        }
    }

    /// Integer view of integral values (and booleans as 0/1).
    pub fn as_i128(&self) -> Option<i128> {
        match *self {
            Value::Bool(b) => Some(b as i128),
            Value::I8(v) => Some(v as i128),
            Value::I16(v) => Some(v as i128),
            Value::I32(v) => Some(v as i128),
            Value::I64(v) => Some(v as i128),
            Value::U8(v) => Some(v as i128),
            Value::U16(v) => Some(v as i128),
            Value::U32(v) => Some(v as i128),
            Value::U64(v) => Some(v as i128),
            _ => None,
        }
    }

    /// Floating-point view of any numeric value.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::F32(v) => Some(*v as f64),
            Value::F64(v) => Some(*v),
            Value::Decimal(d) => d.to_f64(),
            other => other.as_i128().map(|i| i as f64),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::I8(v) => write!(f, "{v}"),
            Value::I16(v) => write!(f, "{v}"),
            Value::I32(v) => write!(f, "{v}"),
            Value::I64(v) => write!(f, "{v}"),
            Value::U8(v) => write!(f, "{v}"),
            Value::U16(v) => write!(f, "{v}"),
            Value::U32(v) => write!(f, "{v}"),
            Value::U64(v) => write!(f, "{v}"),
            Value::F32(v) => write!(f, "{v}"),
            Value::F64(v) => write!(f, "{v}"),
            Value::Decimal(v) => write!(f, "{v}"),
            Value::Text(v) => f.write_str(v),
            Value::Char(v) => write!(f, "{v}"),
            Value::Guid(v) => write!(f, "{v}"),
            Value::DateTime(v) => write!(f, "{}", v.format("%Y-%m-%dT%H:%M:%S%.f")),
            Value::DateTimeOffset(v) => f.write_str(&v.to_rfc3339()),
            Value::Duration(v) => write!(f, "{}ms", v.num_milliseconds()),
            Value::Blob(v) => write!(f, "<{} bytes>", v.len()),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(v) => serializer.serialize_bool(*v),
            Value::I8(v) => serializer.serialize_i8(*v),
            Value::I16(v) => serializer.serialize_i16(*v),
            Value::I32(v) => serializer.serialize_i32(*v),
            Value::I64(v) => serializer.serialize_i64(*v),
            Value::U8(v) => serializer.serialize_u8(*v),
            Value::U16(v) => serializer.serialize_u16(*v),
            Value::U32(v) => serializer.serialize_u32(*v),
            Value::U64(v) => serializer.serialize_u64(*v),
            Value::F32(v) => serializer.serialize_f32(*v),
            Value::F64(v) => serializer.serialize_f64(*v),
            Value::Duration(v) => serializer.serialize_i64(v.num_milliseconds()),
            Value::Blob(bytes) => {
                let mut seq = serializer.serialize_seq(Some(bytes.len()))?;
                for b in bytes {
                    seq.serialize_element(b)?;
                }
                seq.end()
            }
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            other => serializer.collect_str(other),
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

value_from! {
    bool => Bool,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    Decimal => Decimal,
    String => Text,
    char => Char,
    Uuid => Guid,
    NaiveDateTime => DateTime,
    DateTime<FixedOffset> => DateTimeOffset,
    TimeDelta => Duration,
    Vec<u8> => Blob,
    Vec<Value> => List,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_values_compare_numerically() {
        let a = Value::Decimal("1.50".parse().unwrap());
        assert_eq!(a, Value::Decimal("1.5".parse().unwrap()));
        assert_eq!(a.to_string(), "1.50");
        assert_eq!(a.as_f64(), Some(1.5));
    }

    #[test]
    fn value_wire_types() {
        assert_eq!(Value::I32(1).wire_type(), WireType::Int32);
        assert_eq!(Value::Char('x').wire_type(), WireType::StringFixedLength);
        assert_eq!(Value::Null.wire_type(), WireType::Object);
        assert_eq!(Value::Blob(vec![1]).wire_type(), WireType::Binary);
    }

    #[test]
    fn value_serializes_naturally() {
        let values = vec![
            Value::Null,
            Value::I64(3),
            Value::Text("a".into()),
            Value::Decimal("1.25".parse().unwrap()),
            Value::Blob(vec![1, 2]),
        ];
        let json = serde_json::to_string(&values).unwrap();
        assert_eq!(json, r#"[null,3,"a","1.25",[1,2]]"#);
    }

    #[test]
    fn option_into_value() {
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(Value::from(Some(5i32)), Value::I32(5));
    }
}
