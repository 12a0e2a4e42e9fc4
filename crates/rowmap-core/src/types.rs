//! Language-side type descriptors.
//!
//! Rust has no runtime reflection, so every type that can receive a column
//! value or feed a parameter describes itself through [`SqlType::type_info`].
//! The resulting [`TypeInfo`] is what the registry, the materializer and the
//! binder inspect when they compile a plan for a shape.
//!
//! Built-in scalars, `Option<T>`, `Vec<T>` lists and `Vec<u8>` blobs are
//! covered here. User enums opt in through [`sql_enum!`](crate::sql_enum).

use std::any::{type_name, TypeId};

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeDelta, Utc};
use uuid::Uuid;

use crate::convert::integer_value;
use crate::error::CoercionError;
use crate::value::{Decimal, Value, WireType};

/// Built-in scalar kinds, each with one canonical Rust type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Decimal,
    String,
    Char,
    Guid,
    DateTime,
    DateTimeOffset,
    Duration,
    Binary,
    /// Any value; the target is [`Value`] itself.
    Object,
}

impl ScalarKind {
    pub const ALL: [ScalarKind; 20] = [
        ScalarKind::Bool,
        ScalarKind::I8,
        ScalarKind::I16,
        ScalarKind::I32,
        ScalarKind::I64,
        ScalarKind::U8,
        ScalarKind::U16,
        ScalarKind::U32,
        ScalarKind::U64,
        ScalarKind::F32,
        ScalarKind::F64,
        ScalarKind::Decimal,
        ScalarKind::String,
        ScalarKind::Char,
        ScalarKind::Guid,
        ScalarKind::DateTime,
        ScalarKind::DateTimeOffset,
        ScalarKind::Duration,
        ScalarKind::Binary,
        ScalarKind::Object,
    ];

    /// [`TypeId`] of the canonical Rust type for this kind.
    pub fn type_id(self) -> TypeId {
        match self {
            ScalarKind::Bool => TypeId::of::<bool>(),
            ScalarKind::I8 => TypeId::of::<i8>(),
            ScalarKind::I16 => TypeId::of::<i16>(),
            ScalarKind::I32 => TypeId::of::<i32>(),
            ScalarKind::I64 => TypeId::of::<i64>(),
            ScalarKind::U8 => TypeId::of::<u8>(),
            ScalarKind::U16 => TypeId::of::<u16>(),
            ScalarKind::U32 => TypeId::of::<u32>(),
            ScalarKind::U64 => TypeId::of::<u64>(),
            ScalarKind::F32 => TypeId::of::<f32>(),
            ScalarKind::F64 => TypeId::of::<f64>(),
            ScalarKind::Decimal => TypeId::of::<Decimal>(),
            ScalarKind::String => TypeId::of::<String>(),
            ScalarKind::Char => TypeId::of::<char>(),
            ScalarKind::Guid => TypeId::of::<Uuid>(),
            ScalarKind::DateTime => TypeId::of::<NaiveDateTime>(),
            ScalarKind::DateTimeOffset => TypeId::of::<DateTime<FixedOffset>>(),
            ScalarKind::Duration => TypeId::of::<TimeDelta>(),
            ScalarKind::Binary => TypeId::of::<Vec<u8>>(),
            ScalarKind::Object => TypeId::of::<Value>(),
        }
    }

    /// Wire type used for this kind unless a mapping overrides it.
    pub fn default_wire_type(self) -> WireType {
        match self {
            ScalarKind::Bool => WireType::Boolean,
            ScalarKind::I8 => WireType::Int8,
            ScalarKind::I16 => WireType::Int16,
            ScalarKind::I32 => WireType::Int32,
            ScalarKind::I64 => WireType::Int64,
            ScalarKind::U8 => WireType::UInt8,
            ScalarKind::U16 => WireType::UInt16,
            ScalarKind::U32 => WireType::UInt32,
            ScalarKind::U64 => WireType::UInt64,
            ScalarKind::F32 => WireType::Single,
            ScalarKind::F64 => WireType::Double,
            ScalarKind::Decimal => WireType::Decimal,
            ScalarKind::String => WireType::String,
            ScalarKind::Char => WireType::StringFixedLength,
            ScalarKind::Guid => WireType::Guid,
            ScalarKind::DateTime => WireType::DateTime,
            ScalarKind::DateTimeOffset => WireType::DateTimeOffset,
            ScalarKind::Duration => WireType::Time,
            ScalarKind::Binary => WireType::Binary,
            ScalarKind::Object => WireType::Object,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ScalarKind::Bool => "bool",
            ScalarKind::I8 => "i8",
            ScalarKind::I16 => "i16",
            ScalarKind::I32 => "i32",
            ScalarKind::I64 => "i64",
            ScalarKind::U8 => "u8",
            ScalarKind::U16 => "u16",
            ScalarKind::U32 => "u32",
            ScalarKind::U64 => "u64",
            ScalarKind::F32 => "f32",
            ScalarKind::F64 => "f64",
            ScalarKind::Decimal => "Decimal",
            ScalarKind::String => "String",
            ScalarKind::Char => "char",
            ScalarKind::Guid => "Uuid",
            ScalarKind::DateTime => "NaiveDateTime",
            ScalarKind::DateTimeOffset => "DateTime<FixedOffset>",
            ScalarKind::Duration => "TimeDelta",
            ScalarKind::Binary => "Vec<u8>",
            ScalarKind::Object => "Value",
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            ScalarKind::I8
                | ScalarKind::I16
                | ScalarKind::I32
                | ScalarKind::I64
                | ScalarKind::U8
                | ScalarKind::U16
                | ScalarKind::U32
                | ScalarKind::U64
        )
    }
}

/// Enum metadata: underlying integer kind plus `(name, discriminant)` pairs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnumInfo {
    pub underlying: ScalarKind,
    pub variants: &'static [(&'static str, i64)],
}

impl EnumInfo {
    /// Case-insensitive lookup of a variant name.
    pub fn discriminant_of(&self, name: &str) -> Option<i64> {
        self.variants
            .iter()
            .find(|(variant, _)| variant.eq_ignore_ascii_case(name))
            .map(|(_, d)| *d)
    }

    pub fn is_defined(&self, discriminant: i128) -> bool {
        self.variants.iter().any(|(_, d)| *d as i128 == discriminant)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    Scalar(ScalarKind),
    /// `Option<T>`: accepts database null.
    Nullable(Box<TypeInfo>),
    Enum(EnumInfo),
    /// Enumerable parameter value, expanded into one parameter per element.
    List(Box<TypeInfo>),
    /// Unknown to the built-in table; needs a registered mapping or converter.
    Opaque,
}

/// Runtime descriptor of a language type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeInfo {
    pub id: TypeId,
    pub name: &'static str,
    pub kind: TypeKind,
}

impl TypeInfo {
    pub fn new<T: 'static>(kind: TypeKind) -> Self {
        TypeInfo {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
            kind,
        }
    }

    pub fn scalar<T: 'static>(kind: ScalarKind) -> Self {
        TypeInfo::new::<T>(TypeKind::Scalar(kind))
    }

    /// Descriptor for a type with no built-in mapping.
    pub fn opaque<T: 'static>() -> Self {
        TypeInfo::new::<T>(TypeKind::Opaque)
    }

    /// The type with any `Option` wrapper removed.
    pub fn non_nullable(&self) -> &TypeInfo {
        match &self.kind {
            TypeKind::Nullable(inner) => inner.non_nullable(),
            _ => self,
        }
    }

    /// Whether database null is a legal value for this type.
    pub fn accepts_null(&self) -> bool {
        matches!(
            self.kind,
            TypeKind::Nullable(_) | TypeKind::Scalar(ScalarKind::Object)
        )
    }

    /// Whether a single column can fill this type directly.
    pub fn is_scalar_like(&self) -> bool {
        matches!(
            self.non_nullable().kind,
            TypeKind::Scalar(_) | TypeKind::Enum(_)
        )
    }
}

/// A language type that can be read from, or written to, a single wire value.
pub trait SqlType: Sized + Send + Sync + 'static {
    fn type_info() -> TypeInfo;

    /// Builds `Self` from the canonical value produced by
    /// [`RegistrySnapshot::convert`](crate::registry::RegistrySnapshot::convert).
    fn from_value(value: Value) -> Result<Self, CoercionError>;

    fn to_value(&self) -> Value;

    /// What a composite member receives when its column is database null.
    fn null_default() -> Self;
}

/// Marker for types that may appear as elements of a multi-value list.
///
/// `u8` is excluded so that `Vec<u8>` stays a binary blob.
pub trait ListElement: SqlType {}

/// Fieldless enum stored as an integer or as its variant name.
pub trait SqlEnum: Copy + Send + Sync + 'static {
    const VARIANTS: &'static [(&'static str, i64)];

    fn underlying() -> ScalarKind;

    fn from_discriminant(value: i64) -> Option<Self>;

    fn discriminant(self) -> i64;

    fn default_variant() -> Self;
}

/// Scalar kind of a built-in type, `I64` for anything else.
pub fn scalar_kind_of<T: SqlType>() -> ScalarKind {
    match T::type_info().kind {
        TypeKind::Scalar(kind) => kind,
        _ => ScalarKind::I64,
    }
}

pub fn enum_type_info<E: SqlEnum>() -> TypeInfo {
    TypeInfo::new::<E>(TypeKind::Enum(EnumInfo {
        underlying: E::underlying(),
        variants: E::VARIANTS,
    }))
}

pub fn enum_from_value<E: SqlEnum>(value: Value) -> Result<E, CoercionError> {
    let target = type_name::<E>();
    let discriminant = match &value {
        Value::Null => return Err(CoercionError::NullToNonNullable { target }),
        Value::Text(name) => E::VARIANTS
            .iter()
            .find(|(variant, _)| variant.eq_ignore_ascii_case(name))
            .map(|(_, d)| *d as i128)
            .ok_or_else(|| CoercionError::UnknownEnumName {
                name: name.clone(),
                target,
            })?,
        other => other.as_i128().ok_or(CoercionError::Incompatible {
            from: other.type_name(),
            target,
        })?,
    };
    i64::try_from(discriminant)
        .ok()
        .and_then(E::from_discriminant)
        .ok_or(CoercionError::UnknownEnumValue {
            value: discriminant,
            target,
        })
}

pub fn enum_to_value<E: SqlEnum>(value: E) -> Value {
    let d = value.discriminant();
    integer_value(E::underlying(), d as i128).unwrap_or(Value::I64(d))
}

macro_rules! scalar_sql_type {
    ($($ty:ty => $kind:ident, $variant:ident, $default:expr;)*) => {
        $(
            impl SqlType for $ty {
                fn type_info() -> TypeInfo {
                    TypeInfo::scalar::<$ty>(ScalarKind::$kind)
                }

                fn from_value(value: Value) -> Result<Self, CoercionError> {
                    match value {
                        Value::$variant(v) => Ok(v),
                        Value::Null => Err(CoercionError::NullToNonNullable {
                            target: ScalarKind::$kind.name(),
                        }),
                        other => Err(CoercionError::Incompatible {
                            from: other.type_name(),
                            target: ScalarKind::$kind.name(),
                        }),
                    }
                }

                fn to_value(&self) -> Value {
                    Value::$variant(Clone::clone(self))
                }

                fn null_default() -> Self {
                    $default
                }
            }
        )*
    };
}

scalar_sql_type! {
    bool => Bool, Bool, false;
    i8 => I8, I8, 0;
    i16 => I16, I16, 0;
    i32 => I32, I32, 0;
    i64 => I64, I64, 0;
    u8 => U8, U8, 0;
    u16 => U16, U16, 0;
    u32 => U32, U32, 0;
    u64 => U64, U64, 0;
    f32 => F32, F32, 0.0;
    f64 => F64, F64, 0.0;
    Decimal => Decimal, Decimal, Decimal::ZERO;
    String => String, Text, String::new();
    char => Char, Char, '\0';
    Uuid => Guid, Guid, Uuid::nil();
    NaiveDateTime => DateTime, DateTime, NaiveDateTime::default();
    DateTime<FixedOffset> => DateTimeOffset, DateTimeOffset, DateTime::<Utc>::default().fixed_offset();
    TimeDelta => Duration, Duration, TimeDelta::zero();
    Vec<u8> => Binary, Blob, Vec::new();
}

macro_rules! list_element {
    ($($ty:ty),* $(,)?) => {
        $(impl ListElement for $ty {})*
    };
}

list_element!(
    bool,
    i8,
    i16,
    i32,
    i64,
    u16,
    u32,
    u64,
    f32,
    f64,
    Decimal,
    String,
    char,
    Uuid,
    NaiveDateTime,
    DateTime<FixedOffset>,
    TimeDelta,
    Vec<u8>,
);

impl SqlType for Value {
    fn type_info() -> TypeInfo {
        TypeInfo::scalar::<Value>(ScalarKind::Object)
    }

    fn from_value(value: Value) -> Result<Self, CoercionError> {
        Ok(value)
    }

    fn to_value(&self) -> Value {
        self.clone()
    }

    fn null_default() -> Self {
        Value::Null
    }
}

impl<T: SqlType> SqlType for Option<T> {
    fn type_info() -> TypeInfo {
        TypeInfo::new::<Self>(TypeKind::Nullable(Box::new(T::type_info())))
    }

    fn from_value(value: Value) -> Result<Self, CoercionError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Null,
        }
    }

    fn null_default() -> Self {
        None
    }
}

impl<T: ListElement> ListElement for Option<T> {}

impl<T: ListElement> SqlType for Vec<T> {
    fn type_info() -> TypeInfo {
        TypeInfo::new::<Self>(TypeKind::List(Box::new(T::type_info())))
    }

    fn from_value(value: Value) -> Result<Self, CoercionError> {
        match value {
            Value::List(items) => items.into_iter().map(T::from_value).collect(),
            Value::Null => Ok(Vec::new()),
            other => Err(CoercionError::Incompatible {
                from: other.type_name(),
                target: type_name::<Self>(),
            }),
        }
    }

    fn to_value(&self) -> Value {
        Value::List(self.iter().map(SqlType::to_value).collect())
    }

    fn null_default() -> Self {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    crate::sql_enum!(Color: i16 { Red = 1, Green = 2 });

    #[test]
    fn option_type_info_wraps_inner() {
        let info = <Option<i32>>::type_info();
        assert!(info.accepts_null());
        assert_eq!(info.non_nullable(), &i32::type_info());
        assert!(info.is_scalar_like());
    }

    #[test]
    fn blob_is_scalar_not_list() {
        assert_eq!(
            <Vec<u8>>::type_info().kind,
            TypeKind::Scalar(ScalarKind::Binary)
        );
        assert!(matches!(<Vec<i32>>::type_info().kind, TypeKind::List(_)));
    }

    #[test]
    fn scalar_from_wrong_variant_fails() {
        assert_eq!(
            i32::from_value(Value::Text("x".into())),
            Err(CoercionError::Incompatible {
                from: "Text",
                target: "i32"
            })
        );
        assert!(matches!(
            i32::from_value(Value::Null),
            Err(CoercionError::NullToNonNullable { .. })
        ));
        assert_eq!(<Option<i32>>::from_value(Value::Null), Ok(None));
    }

    #[test]
    fn enum_round_trips_through_underlying_kind() {
        assert_eq!(Color::Green.to_value(), Value::I16(2));
        assert_eq!(Color::from_value(Value::I16(1)), Ok(Color::Red));
        assert_eq!(Color::from_value(Value::Text("green".into())), Ok(Color::Green));
        assert!(matches!(
            Color::from_value(Value::I16(9)),
            Err(CoercionError::UnknownEnumValue { value: 9, .. })
        ));
        assert_eq!(Color::null_default(), Color::Red);
    }

    #[test]
    fn enum_info_lookup() {
        let info = match Color::type_info().kind {
            TypeKind::Enum(info) => info,
            other => panic!("expected enum, got {other:?}"),
        };
        assert_eq!(info.underlying, ScalarKind::I16);
        assert_eq!(info.discriminant_of("RED"), Some(1));
        assert!(info.is_defined(2));
        assert!(!info.is_defined(3));
    }
}
