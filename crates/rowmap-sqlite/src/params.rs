//! Writing bound parameters into SQLite statements.
//!
//! SQLite has five storage classes, so richer values are flattened on the
//! way in: GUIDs as hyphenated text, date/times as ISO-8601 text, durations
//! as whole milliseconds, decimals and chars as text. The core reads all of
//! these back through its ordinary coercions.

use std::collections::HashMap;

use rusqlite::types::Value as SqlValue;
use rusqlite::Statement;

use rowmap_core::bind::clean_name;
use rowmap_core::{Parameter, Value};

use crate::error::DbError;

/// ISO-8601 without offset, as parsed back by the core.
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// SQLite representation of `value`; `None` for values it cannot hold.
pub fn to_sql_value(value: &Value) -> Option<SqlValue> {
    Some(match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::I8(i) => SqlValue::Integer(i64::from(*i)),
        Value::I16(i) => SqlValue::Integer(i64::from(*i)),
        Value::I32(i) => SqlValue::Integer(i64::from(*i)),
        Value::I64(i) => SqlValue::Integer(*i),
        Value::U8(i) => SqlValue::Integer(i64::from(*i)),
        Value::U16(i) => SqlValue::Integer(i64::from(*i)),
        Value::U32(i) => SqlValue::Integer(i64::from(*i)),
        Value::U64(i) => match i64::try_from(*i) {
            Ok(i) => SqlValue::Integer(i),
            Err(_) => SqlValue::Text(i.to_string()),
        },
        Value::F32(f) => SqlValue::Real(f64::from(*f)),
        Value::F64(f) => SqlValue::Real(*f),
        Value::Decimal(d) => SqlValue::Text(d.to_string()),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Char(c) => SqlValue::Text(c.to_string()),
        Value::Guid(g) => SqlValue::Text(g.hyphenated().to_string()),
        Value::DateTime(dt) => SqlValue::Text(dt.format(DATETIME_FORMAT).to_string()),
        Value::DateTimeOffset(dt) => SqlValue::Text(dt.to_rfc3339()),
        Value::Duration(d) => SqlValue::Integer(d.num_milliseconds()),
        Value::Blob(bytes) => SqlValue::Blob(bytes.clone()),
        Value::List(_) => return None,
    })
}

/// Binds `parameters` to `stmt` by name.
///
/// Placeholders are matched case-insensitively with their `:`, `@` or `$`
/// prefix removed. Parameters the statement does not reference are skipped.
pub fn bind_parameters(stmt: &mut Statement<'_>, parameters: &[Parameter]) -> Result<(), DbError> {
    let mut slots = HashMap::new();
    for index in 1..=stmt.parameter_count() {
        if let Some(name) = stmt.parameter_name(index) {
            slots.insert(clean_name(name).to_lowercase(), index);
        }
    }

    for parameter in parameters {
        let Some(index) = slots.get(&clean_name(&parameter.name).to_lowercase()) else {
            tracing::trace!("Statement has no placeholder for '{}'", parameter.name);
            continue;
        };
        let value = to_sql_value(&parameter.value).ok_or_else(|| DbError::Unbindable {
            name: parameter.name.clone(),
            type_name: parameter.value.type_name(),
        })?;
        stmt.raw_bind_parameter(*index, value)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeDelta};
    use rowmap_core::Decimal;
    use uuid::Uuid;

    use super::*;

    #[test]
    fn rich_values_flatten_to_storage_classes() {
        let guid = Uuid::parse_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap();
        let at = NaiveDate::from_ymd_opt(2024, 2, 29)
            .unwrap()
            .and_hms_milli_opt(13, 5, 0, 250)
            .unwrap();
        let cases = [
            (Value::Bool(true), SqlValue::Integer(1)),
            (Value::U64(u64::MAX), SqlValue::Text(u64::MAX.to_string())),
            (Value::Char('x'), SqlValue::Text("x".into())),
            (Value::Guid(guid), SqlValue::Text("67e55044-10b1-426f-9247-bb680e5fe0c8".into())),
            (Value::DateTime(at), SqlValue::Text("2024-02-29T13:05:00.250".into())),
            (Value::Duration(TimeDelta::seconds(2)), SqlValue::Integer(2000)),
            (Value::Decimal(Decimal::new(1250, 2)), SqlValue::Text("12.50".into())),
        ];
        for (value, expected) in cases {
            assert_eq!(to_sql_value(&value), Some(expected), "{value:?}");
        }
        assert_eq!(to_sql_value(&Value::List(vec![])), None);
    }

    #[test]
    fn binds_by_name_ignoring_prefix_and_case() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let mut stmt = conn.prepare("SELECT :A, @b, $c").unwrap();
        let mut a = Parameter::new("a");
        a.value = Value::I32(1);
        let mut b = Parameter::new("@B");
        b.value = Value::from("two");
        let mut unused = Parameter::new("zzz");
        unused.value = Value::Bool(false);
        bind_parameters(&mut stmt, &[a, b, unused]).unwrap();

        let mut rows = stmt.raw_query();
        let row = rows.next().unwrap().unwrap();
        assert_eq!(row.get::<_, i64>(0).unwrap(), 1);
        assert_eq!(row.get::<_, String>(1).unwrap(), "two");
        assert_eq!(row.get::<_, Option<i64>>(2).unwrap(), None);
    }
}
