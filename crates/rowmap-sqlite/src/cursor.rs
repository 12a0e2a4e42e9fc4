//! [`Cursor`] adapter over a running rusqlite statement.

use rusqlite::types::ValueRef;
use rusqlite::{Rows, Statement};
use thiserror::Error;

use rowmap_core::{Column, ColumnShape, Cursor, MapError, RowSource, Value, WireType};

use crate::affinity::wire_type_for_declared;

#[derive(Debug, Error)]
#[error("no current row to read column {column} from")]
struct NotPositioned {
    column: usize,
}

/// Column names and declared types of a prepared statement.
pub fn statement_shape(stmt: &Statement<'_>) -> ColumnShape {
    ColumnShape::new(
        stmt.columns()
            .iter()
            .map(|c| Column::new(c.name(), wire_type_for_declared(c.decl_type()))),
    )
}

/// SQLite storage classes are handed to the core as-is.
pub fn read_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::I64(i),
        ValueRef::Real(f) => Value::F64(f),
        ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
    }
}

/// Forward-only cursor over the rows of one statement execution.
///
/// Each advance copies the current row into an owned buffer so the core can
/// read columns in any order.
pub struct StatementCursor<'stmt> {
    shape: ColumnShape,
    rows: Rows<'stmt>,
    current: Option<Vec<Value>>,
}

impl<'stmt> StatementCursor<'stmt> {
    /// Starts executing `stmt`; parameters must already be bound.
    pub fn new(stmt: &'stmt mut Statement<'_>) -> Self {
        let shape = statement_shape(stmt);
        StatementCursor {
            shape,
            rows: stmt.raw_query(),
            current: None,
        }
    }

    pub fn shape(&self) -> &ColumnShape {
        &self.shape
    }
}

impl RowSource for StatementCursor<'_> {
    fn column_count(&self) -> usize {
        self.shape.len()
    }

    fn column_name(&self, index: usize) -> &str {
        self.shape
            .columns()
            .get(index)
            .map_or("", |c| c.name.as_str())
    }

    fn column_type(&self, index: usize) -> WireType {
        self.shape
            .columns()
            .get(index)
            .map_or(WireType::Object, |c| c.wire_type)
    }

    fn read(&self, index: usize) -> Result<Value, MapError> {
        self.current
            .as_ref()
            .and_then(|row| row.get(index))
            .cloned()
            .ok_or_else(|| MapError::driver(NotPositioned { column: index }))
    }
}

impl Cursor for StatementCursor<'_> {
    fn advance(&mut self) -> Result<bool, MapError> {
        let count = self.shape.len();
        let Some(row) = self.rows.next().map_err(MapError::driver)? else {
            self.current = None;
            return Ok(false);
        };
        let mut values = Vec::with_capacity(count);
        for index in 0..count {
            values.push(read_value(row.get_ref(index).map_err(MapError::driver)?));
        }
        self.current = Some(values);
        Ok(true)
    }
}
