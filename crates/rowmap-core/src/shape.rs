//! Column shapes and the cursor abstraction they are read from.
//!
//! A [`ColumnShape`] is the ordered list of `(name, wire type)` pairs of one
//! result set. Its [`ShapeHash`] is what the cache compares to decide whether
//! a stored materializer still fits the cursor in hand.
//!
//! # Determinism
//!
//! The hash is a blake3 digest over every column in order, so reordering,
//! renaming or retyping any column changes it. The name is terminated by a
//! zero byte so that `("ab", T)` and `("a", T')` cannot collide by
//! concatenation.

use std::fmt;

use serde::Serialize;
use smallvec::SmallVec;

use crate::error::MapError;
use crate::value::{Value, WireType};

/// One column of a result set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Column {
    pub name: String,
    pub wire_type: WireType,
}

impl Column {
    pub fn new(name: impl Into<String>, wire_type: WireType) -> Self {
        Column {
            name: name.into(),
            wire_type,
        }
    }
}

/// Order-sensitive digest of a [`ColumnShape`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ShapeHash(pub u64);

impl fmt::Display for ShapeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Ordered `(name, wire type)` pairs of one result set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ColumnShape {
    columns: SmallVec<[Column; 8]>,
}

impl ColumnShape {
    pub fn new(columns: impl IntoIterator<Item = Column>) -> Self {
        ColumnShape {
            columns: columns.into_iter().collect(),
        }
    }

    /// Shape from `(name, wire type)` pairs.
    pub fn of(pairs: &[(&str, WireType)]) -> Self {
        ColumnShape::new(pairs.iter().map(|(name, wire)| Column::new(*name, *wire)))
    }

    /// Reads the shape of an open cursor.
    pub fn from_source(source: &dyn RowSource) -> Self {
        ColumnShape::new(
            (0..source.column_count())
                .map(|i| Column::new(source.column_name(i), source.column_type(i))),
        )
    }

    pub fn hash(&self) -> ShapeHash {
        let mut hasher = blake3::Hasher::new();
        for column in &self.columns {
            hasher.update(column.name.as_bytes());
            hasher.update(&[0, column.wire_type.tag()]);
        }
        let digest = hasher.finalize();
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest.as_bytes()[..8]);
        ShapeHash(u64::from_le_bytes(prefix))
    }

    /// Human-readable signature such as `(Id Int64, Name String)`.
    pub fn signature(&self) -> String {
        let parts: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("{} {}", c.name, c.wire_type))
            .collect();
        format!("({})", parts.join(", "))
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Read access to the current row of an open result set.
pub trait RowSource {
    fn column_count(&self) -> usize;

    fn column_name(&self, index: usize) -> &str;

    fn column_type(&self, index: usize) -> WireType;

    /// Wire value of column `index` in the current row.
    fn read(&self, index: usize) -> Result<Value, MapError>;
}

/// A forward-only result set.
pub trait Cursor: RowSource {
    /// Moves to the next row; `false` once the rows are exhausted.
    fn advance(&mut self) -> Result<bool, MapError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn signature_lists_names_and_wire_types() {
        let shape = ColumnShape::of(&[("Id", WireType::Int64), ("Name", WireType::String)]);
        assert_eq!(shape.signature(), "(Id Int64, Name String)");
        assert_eq!(shape.names().collect::<Vec<_>>(), vec!["Id", "Name"]);
    }

    #[test]
    fn hash_is_order_and_type_sensitive() {
        let a = ColumnShape::of(&[("Id", WireType::Int32), ("Name", WireType::String)]);
        let swapped = ColumnShape::of(&[("Name", WireType::String), ("Id", WireType::Int32)]);
        let retyped = ColumnShape::of(&[("Id", WireType::Int64), ("Name", WireType::String)]);
        assert_eq!(a.hash(), a.clone().hash());
        assert_ne!(a.hash(), swapped.hash());
        assert_ne!(a.hash(), retyped.hash());
    }

    #[test]
    fn name_boundaries_do_not_collide() {
        let joined = ColumnShape::of(&[("ab", WireType::Int32)]);
        let split = ColumnShape::of(&[("a", WireType::Int32), ("b", WireType::Int32)]);
        assert_ne!(joined.hash(), split.hash());
    }

    proptest! {
        #[test]
        fn appending_a_column_changes_the_hash(
            names in proptest::collection::vec("[a-z]{1,8}", 0..6),
            extra in "[a-z]{1,8}",
        ) {
            let base = ColumnShape::new(names.iter().map(|n| Column::new(n.as_str(), WireType::String)));
            let mut longer: Vec<Column> = base.columns().to_vec();
            longer.push(Column::new(extra, WireType::String));
            prop_assert_ne!(base.hash(), ColumnShape::new(longer).hash());
        }
    }
}
