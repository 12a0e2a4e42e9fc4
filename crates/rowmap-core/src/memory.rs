//! In-memory [`Cursor`] implementation.
//!
//! [`MemoryCursor`] serves rows from a vector. It backs the core's own tests
//! and is handy anywhere rows already live in memory (fixtures, replays,
//! results buffered by another driver).

use thiserror::Error;

use crate::error::MapError;
use crate::shape::{ColumnShape, Cursor, RowSource};
use crate::value::{Value, WireType};

#[derive(Debug, Error)]
#[error("no value for column {column}: cursor is not positioned on a row or the row is too short")]
struct NoValue {
    column: usize,
}

/// Forward-only cursor over buffered rows.
#[derive(Debug, Clone)]
pub struct MemoryCursor {
    shape: ColumnShape,
    rows: Vec<Vec<Value>>,
    position: Option<usize>,
}

impl MemoryCursor {
    pub fn new(shape: ColumnShape, rows: Vec<Vec<Value>>) -> Self {
        MemoryCursor {
            shape,
            rows,
            position: None,
        }
    }

    pub fn shape(&self) -> &ColumnShape {
        &self.shape
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

impl RowSource for MemoryCursor {
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
        self.position
            .and_then(|row| self.rows.get(row))
            .and_then(|row| row.get(index))
            .cloned()
            .ok_or_else(|| MapError::driver(NoValue { column: index }))
    }
}

impl Cursor for MemoryCursor {
    fn advance(&mut self) -> Result<bool, MapError> {
        let next = self.position.map_or(0, |p| p + 1);
        self.position = Some(next.min(self.rows.len()));
        Ok(next < self.rows.len())
    }
}
