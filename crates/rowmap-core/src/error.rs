//! Error types for rowmap-core.
//!
//! [`CoercionError`] describes why one value could not be turned into one
//! type. [`MapError`] is what the public API returns; per-row failures wrap
//! the underlying [`CoercionError`] as their source instead of replacing it.

use thiserror::Error;

use crate::value::Value;

/// Failure to coerce a single value to a target type.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoercionError {
    #[error("cannot assign database null to non-nullable type {target}")]
    NullToNonNullable { target: &'static str },

    #[error("cannot convert {from} to {target}")]
    Incompatible {
        from: &'static str,
        target: &'static str,
    },

    #[error("value {value} is out of range for {target}")]
    OutOfRange { value: String, target: &'static str },

    #[error("'{text}' is not a valid {target}")]
    Parse { text: String, target: &'static str },

    #[error("'{name}' is not a member of enum {target}")]
    UnknownEnumName { name: String, target: &'static str },

    #[error("{value} is not a defined value of enum {target}")]
    UnknownEnumValue { value: i128, target: &'static str },

    #[error("a single character was expected, got {len} characters")]
    NotSingleChar { len: usize },

    /// Raised by user-registered converters.
    #[error("{0}")]
    Custom(String),
}

/// The kind of a [`MapError`], for callers that branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UnsupportedType,
    NoUsableConstructor,
    ColumnConversion,
    ParameterConversion,
    DuplicateKey,
    UnsupportedParameterSource,
    EmptyShape,
    Driver,
}

/// Errors produced while compiling or running materializers and binders.
#[derive(Debug, Error)]
pub enum MapError {
    /// A member's declared type has no wire mapping and no converter.
    #[error("type {type_name} of member '{member}' has no wire-type mapping or converter")]
    UnsupportedType {
        type_name: &'static str,
        member: String,
    },

    /// Neither a parameterless constructor nor a unique matching one exists.
    #[error(
        "a parameterless constructor or one matching signature {signature} is required for {type_name} materialization"
    )]
    NoUsableConstructor {
        type_name: &'static str,
        signature: String,
    },

    /// One row's value could not be coerced to the member type.
    #[error("error parsing column {index} ({name}={raw} - {}): {source}", .raw.type_name())]
    ColumnConversion {
        index: usize,
        name: String,
        raw: Value,
        #[source]
        source: CoercionError,
    },

    /// A parameter value could not be converted to its wire form.
    #[error("error converting parameter '{name}': {source}")]
    ParameterConversion {
        name: String,
        #[source]
        source: CoercionError,
    },

    #[error("duplicate key: '{key}'")]
    DuplicateKey { key: String },

    #[error("unsupported parameter source: {reason}")]
    UnsupportedParameterSource { reason: String },

    /// Zero-column result sets cannot produce typed rows.
    #[error("no columns were selected; cannot materialize {type_name}")]
    EmptyShape { type_name: &'static str },

    /// Failure reported by the cursor or command owner.
    #[error("driver error: {0}")]
    Driver(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl MapError {
    pub(crate) fn column(index: usize, name: &str, raw: Value, source: CoercionError) -> Self {
        MapError::ColumnConversion {
            index,
            name: name.to_string(),
            raw,
            source,
        }
    }

    pub fn driver(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        MapError::Driver(Box::new(err))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            MapError::UnsupportedType { .. } => ErrorKind::UnsupportedType,
            MapError::NoUsableConstructor { .. } => ErrorKind::NoUsableConstructor,
            MapError::ColumnConversion { .. } => ErrorKind::ColumnConversion,
            MapError::ParameterConversion { .. } => ErrorKind::ParameterConversion,
            MapError::DuplicateKey { .. } => ErrorKind::DuplicateKey,
            MapError::UnsupportedParameterSource { .. } => ErrorKind::UnsupportedParameterSource,
            MapError::EmptyShape { .. } => ErrorKind::EmptyShape,
            MapError::Driver(_) => ErrorKind::Driver,
        }
    }

    /// Only per-row conversion failures may succeed with a relaxed target type.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::ColumnConversion
    }
}

/// Failure to load [`MapperOptions`](crate::options::MapperOptions).
#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("cannot read options file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid options: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn column_conversion_keeps_source() {
        let err = MapError::column(
            2,
            "Age",
            Value::Text("old".into()),
            CoercionError::Parse {
                text: "old".into(),
                target: "i32",
            },
        );
        assert_eq!(err.kind(), ErrorKind::ColumnConversion);
        assert!(err.is_retryable());
        assert_eq!(
            err.to_string(),
            "error parsing column 2 (Age=old - Text): 'old' is not a valid i32"
        );
        let source = err.source().expect("source preserved");
        assert_eq!(source.to_string(), "'old' is not a valid i32");
    }

    #[test]
    fn compile_errors_are_not_retryable() {
        let err = MapError::NoUsableConstructor {
            type_name: "Person",
            signature: "(Id Int64)".into(),
        };
        assert!(!err.is_retryable());
        assert_eq!(err.kind(), ErrorKind::NoUsableConstructor);
    }
}
