//! Built-in value coercion rules.
//!
//! Every function here turns a wire [`Value`] into the canonical value variant
//! of a target kind. The rules are generous where no information is lost
//! (integer widening, numeric text, single-character text) and strict where it
//! would be (out-of-range integers, NaN, multi-character text into `char`):
//!
//! - exact variant match passes through
//! - integer <- any integer or bool (range checked), float/decimal (rounded
//!   ties-to-even, range checked), numeric text
//! - float <- any numeric, numeric text
//! - decimal <- any numeric, numeric text
//! - bool <- integer (non-zero), `true`/`false`/`1`/`0` text
//! - string <- text, char, numbers, guid, date/time
//! - char <- text of exactly one character
//! - guid <- text, 16-byte blob
//! - date/time <- ISO-8601 text
//! - duration <- integer milliseconds
//! - enum <- integer, float/decimal via the underlying integer, variant name

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::RoundingStrategy;
use uuid::Uuid;

use crate::error::CoercionError;
use crate::types::{EnumInfo, ScalarKind};
use crate::value::{Decimal, Value};

const DATE_TIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Builds the canonical integer value of `kind`, checking its range.
pub fn integer_value(kind: ScalarKind, v: i128) -> Result<Value, CoercionError> {
    let out_of_range = || CoercionError::OutOfRange {
        value: v.to_string(),
        target: kind.name(),
    };
    let value = match kind {
        ScalarKind::I8 => Value::I8(i8::try_from(v).map_err(|_| out_of_range())?),
        ScalarKind::I16 => Value::I16(i16::try_from(v).map_err(|_| out_of_range())?),
        ScalarKind::I32 => Value::I32(i32::try_from(v).map_err(|_| out_of_range())?),
        ScalarKind::I64 => Value::I64(i64::try_from(v).map_err(|_| out_of_range())?),
        ScalarKind::U8 => Value::U8(u8::try_from(v).map_err(|_| out_of_range())?),
        ScalarKind::U16 => Value::U16(u16::try_from(v).map_err(|_| out_of_range())?),
        ScalarKind::U32 => Value::U32(u32::try_from(v).map_err(|_| out_of_range())?),
        ScalarKind::U64 => Value::U64(u64::try_from(v).map_err(|_| out_of_range())?),
        _ => {
            return Err(CoercionError::Incompatible {
                from: "integer",
                target: kind.name(),
            })
        }
    };
    Ok(value)
}

fn incompatible(value: &Value, kind: ScalarKind) -> CoercionError {
    CoercionError::Incompatible {
        from: value.type_name(),
        target: kind.name(),
    }
}

fn parse_error(text: &str, kind: ScalarKind) -> CoercionError {
    CoercionError::Parse {
        text: text.to_string(),
        target: kind.name(),
    }
}

fn matches_kind(value: &Value, kind: ScalarKind) -> bool {
    matches!(
        (value, kind),
        (Value::Bool(_), ScalarKind::Bool)
            | (Value::I8(_), ScalarKind::I8)
            | (Value::I16(_), ScalarKind::I16)
            | (Value::I32(_), ScalarKind::I32)
            | (Value::I64(_), ScalarKind::I64)
            | (Value::U8(_), ScalarKind::U8)
            | (Value::U16(_), ScalarKind::U16)
            | (Value::U32(_), ScalarKind::U32)
            | (Value::U64(_), ScalarKind::U64)
            | (Value::F32(_), ScalarKind::F32)
            | (Value::F64(_), ScalarKind::F64)
            | (Value::Decimal(_), ScalarKind::Decimal)
            | (Value::Text(_), ScalarKind::String)
            | (Value::Char(_), ScalarKind::Char)
            | (Value::Guid(_), ScalarKind::Guid)
            | (Value::DateTime(_), ScalarKind::DateTime)
            | (Value::DateTimeOffset(_), ScalarKind::DateTimeOffset)
            | (Value::Duration(_), ScalarKind::Duration)
            | (Value::Blob(_), ScalarKind::Binary)
            | (_, ScalarKind::Object)
    )
}

fn round_to_integer(d: Decimal) -> Option<i128> {
    d.round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven)
        .to_i128()
}

/// Integer view of a value, rounding fractional numbers ties-to-even.
fn integral(value: &Value, kind: ScalarKind) -> Result<i128, CoercionError> {
    if let Some(i) = value.as_i128() {
        return Ok(i);
    }
    match value {
        Value::F32(_) | Value::F64(_) => {
            let f = value.as_f64().unwrap_or(f64::NAN);
            if !f.is_finite() {
                return Err(CoercionError::OutOfRange {
                    value: f.to_string(),
                    target: kind.name(),
                });
            }
            let rounded = f.round_ties_even();
            if rounded.abs() >= 1.7e38 {
                return Err(CoercionError::OutOfRange {
                    value: f.to_string(),
                    target: kind.name(),
                });
            }
            Ok(rounded as i128)
        }
        Value::Decimal(d) => round_to_integer(*d).ok_or(CoercionError::OutOfRange {
            value: d.to_string(),
            target: kind.name(),
        }),
        Value::Text(s) => {
            let trimmed = s.trim();
            if let Ok(i) = trimmed.parse::<i128>() {
                return Ok(i);
            }
            trimmed
                .parse::<Decimal>()
                .ok()
                .and_then(round_to_integer)
                .ok_or_else(|| parse_error(s, kind))
        }
        other => Err(incompatible(other, kind)),
    }
}

/// Coerces a non-null value into the canonical variant for `kind`.
pub fn coerce_scalar(value: &Value, kind: ScalarKind) -> Result<Value, CoercionError> {
    if matches_kind(value, kind) {
        return Ok(value.clone());
    }
    match kind {
        k if k.is_integer() => integer_value(k, integral(value, k)?),
        ScalarKind::F32 | ScalarKind::F64 => {
            let f = match value {
                Value::Text(s) => s.trim().parse::<f64>().map_err(|_| parse_error(s, kind))?,
                other => other.as_f64().ok_or_else(|| incompatible(other, kind))?,
            };
            Ok(if kind == ScalarKind::F32 {
                Value::F32(f as f32)
            } else {
                Value::F64(f)
            })
        }
        ScalarKind::Decimal => {
            let d = match value {
                Value::Text(s) => s.trim().parse::<Decimal>().map_err(|_| parse_error(s, kind))?,
                Value::F32(_) | Value::F64(_) => value
                    .as_f64()
                    .and_then(Decimal::from_f64)
                    .ok_or_else(|| incompatible(value, kind))?,
                other => other
                    .as_i128()
                    .and_then(Decimal::from_i128)
                    .ok_or_else(|| incompatible(other, kind))?,
            };
            Ok(Value::Decimal(d))
        }
        ScalarKind::Bool => match value {
            Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(Value::Bool(true)),
                "false" | "0" => Ok(Value::Bool(false)),
                _ => Err(parse_error(s, kind)),
            },
            other => other
                .as_i128()
                .map(|i| Value::Bool(i != 0))
                .ok_or_else(|| incompatible(other, kind)),
        },
        ScalarKind::String => match value {
            Value::Blob(_) | Value::List(_) => Err(incompatible(value, kind)),
            other => Ok(Value::Text(other.to_string())),
        },
        ScalarKind::Char => match value {
            Value::Text(s) => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(Value::Char(c)),
                    _ => Err(CoercionError::NotSingleChar {
                        len: s.chars().count(),
                    }),
                }
            }
            other => Err(incompatible(other, kind)),
        },
        ScalarKind::Guid => match value {
            Value::Text(s) => Uuid::parse_str(s.trim())
                .map(Value::Guid)
                .map_err(|_| parse_error(s, kind)),
            Value::Blob(bytes) => Uuid::from_slice(bytes)
                .map(Value::Guid)
                .map_err(|_| incompatible(value, kind)),
            other => Err(incompatible(other, kind)),
        },
        ScalarKind::DateTime => match value {
            Value::Text(s) => parse_date_time(s)
                .map(Value::DateTime)
                .ok_or_else(|| parse_error(s, kind)),
            Value::DateTimeOffset(dt) => Ok(Value::DateTime(dt.naive_utc())),
            other => Err(incompatible(other, kind)),
        },
        ScalarKind::DateTimeOffset => match value {
            Value::Text(s) => DateTime::parse_from_rfc3339(s.trim())
                .map(Value::DateTimeOffset)
                .or_else(|_| {
                    parse_date_time(s)
                        .map(|naive| Value::DateTimeOffset(naive.and_utc().fixed_offset()))
                        .ok_or_else(|| parse_error(s, kind))
                }),
            Value::DateTime(naive) => Ok(Value::DateTimeOffset(naive.and_utc().fixed_offset())),
            other => Err(incompatible(other, kind)),
        },
        ScalarKind::Duration => match value.as_i128() {
            Some(ms) => i64::try_from(ms)
                .ok()
                .and_then(TimeDelta::try_milliseconds)
                .map(Value::Duration)
                .ok_or(CoercionError::OutOfRange {
                    value: ms.to_string(),
                    target: kind.name(),
                }),
            None => Err(incompatible(value, kind)),
        },
        ScalarKind::Binary => match value {
            Value::Guid(g) => Ok(Value::Blob(g.as_bytes().to_vec())),
            other => Err(incompatible(other, kind)),
        },
        _ => Err(incompatible(value, kind)),
    }
}

fn parse_date_time(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    DATE_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Coerces a non-null value into an enum's canonical underlying value.
///
/// Text is matched against variant names (case-insensitive) or parsed as a
/// number; floats and decimals go through the underlying integer type first.
pub fn coerce_enum(
    value: &Value,
    info: &EnumInfo,
    target: &'static str,
) -> Result<Value, CoercionError> {
    let underlying = match value {
        Value::Text(name) => match info.discriminant_of(name.trim()) {
            Some(d) => integer_value(info.underlying, d as i128)?,
            None => match name.trim().parse::<i128>() {
                Ok(i) => integer_value(info.underlying, i)?,
                Err(_) => {
                    return Err(CoercionError::UnknownEnumName {
                        name: name.clone(),
                        target,
                    })
                }
            },
        },
        other => coerce_scalar(other, info.underlying)?,
    };
    let discriminant = underlying.as_i128().unwrap_or_default();
    if !info.is_defined(discriminant) {
        return Err(CoercionError::UnknownEnumValue {
            value: discriminant,
            target,
        });
    }
    Ok(underlying)
}
