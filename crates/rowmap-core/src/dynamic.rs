//! Map-shaped rows for untyped query results.
//!
//! Every [`DynamicRow`] read from one result set points at the same
//! [`DynamicTable`], so the column names are stored once per result set and a
//! row costs one value vector. Adding a key to any row grows the shared
//! table; sibling rows that were built before the growth read the new key as
//! null until they set it themselves.
//!
//! A slot is in one of three states. A *live* slot holds a value the row
//! stored. An *unset* slot (a column the row never stored, from table growth
//! or padding) reads as null and counts as present. A *removed* slot is a
//! tombstone and reads as absent. `insert` only refuses a live slot.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::error::MapError;
use crate::value::Value;

static UNSET: Value = Value::Null;

#[derive(Debug, Default)]
struct Fields {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

/// Column names shared by every row of one result set.
#[derive(Default)]
pub struct DynamicTable {
    fields: RwLock<Fields>,
}

impl DynamicTable {
    /// Builds a table; with duplicate names the first occurrence wins lookups.
    pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        let mut fields = Fields::default();
        for name in names {
            let name = name.into();
            let next = fields.names.len();
            fields.index.entry(name.clone()).or_insert(next);
            fields.names.push(name);
        }
        DynamicTable {
            fields: RwLock::new(fields),
        }
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.read().index.get(name).copied()
    }

    /// Index of `name`, appending it when absent.
    ///
    /// Concurrent callers adding the same name all get the same index.
    pub fn add_field(&self, name: &str) -> usize {
        let mut fields = self.fields.write();
        if let Some(existing) = fields.index.get(name) {
            return *existing;
        }
        let next = fields.names.len();
        fields.names.push(name.to_string());
        fields.index.insert(name.to_string(), next);
        next
    }

    pub fn field_count(&self) -> usize {
        self.fields.read().names.len()
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.read().names.clone()
    }
}

impl fmt::Debug for DynamicTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicTable")
            .field("names", &self.fields.read().names)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Slot {
    Live(Value),
    Unset,
    Removed,
}

/// One untyped row.
#[derive(Debug, Clone)]
pub struct DynamicRow {
    table: Arc<DynamicTable>,
    values: Vec<Slot>,
}

impl DynamicRow {
    pub fn new(table: Arc<DynamicTable>, values: Vec<Value>) -> Self {
        DynamicRow {
            table,
            values: values.into_iter().map(Slot::Live).collect(),
        }
    }

    pub fn table(&self) -> &Arc<DynamicTable> {
        &self.table
    }

    fn slot(&self, index: usize) -> Option<&Value> {
        match self.values.get(index) {
            Some(Slot::Live(value)) => Some(value),
            Some(Slot::Unset) | None => Some(&UNSET),
            Some(Slot::Removed) => None,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.table.index_of(name).and_then(|i| self.slot(i))
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Stores `value` under `name`, growing the shared table for new names.
    ///
    /// With `is_insert`, a value this row already stored under `name` is an
    /// error; unset and removed slots accept the insert.
    pub fn set(&mut self, name: &str, value: Value, is_insert: bool) -> Result<(), MapError> {
        let index = match self.table.index_of(name) {
            Some(index) => index,
            None => self.table.add_field(name),
        };
        if is_insert && matches!(self.values.get(index), Some(Slot::Live(_))) {
            return Err(MapError::DuplicateKey {
                key: name.to_string(),
            });
        }
        self.pad_to(index);
        self.values[index] = Slot::Live(value);
        Ok(())
    }

    pub fn insert(&mut self, name: &str, value: Value) -> Result<(), MapError> {
        self.set(name, value, true)
    }

    /// Tombstones `name` in this row only; the shared table keeps the column.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let index = self.table.index_of(name)?;
        self.pad_to(index);
        match std::mem::replace(&mut self.values[index], Slot::Removed) {
            Slot::Live(value) => Some(value),
            Slot::Unset => Some(Value::Null),
            Slot::Removed => None,
        }
    }

    fn pad_to(&mut self, index: usize) {
        if index >= self.values.len() {
            self.values.resize(index + 1, Slot::Unset);
        }
    }

    /// `(name, value)` pairs in table order, skipping removed slots. Unset
    /// slots appear as null.
    pub fn entries(&self) -> Vec<(String, &Value)> {
        self.table
            .field_names()
            .into_iter()
            .enumerate()
            .filter_map(|(i, name)| self.slot(i).map(|value| (name, value)))
            .collect()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries().into_iter().map(|(name, _)| name).collect()
    }

    pub fn len(&self) -> usize {
        (0..self.table.field_count())
            .filter(|i| self.slot(*i).is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for DynamicRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{DynamicRow")?;
        for (name, value) in self.entries() {
            match value {
                Value::Null => write!(f, ", {name} = NULL")?,
                other => write!(f, ", {name} = '{other}'")?,
            }
        }
        f.write_str("}")
    }
}

impl Serialize for DynamicRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let entries = self.entries();
        let mut map = serializer.serialize_map(Some(entries.len()))?;
        for (name, value) in entries {
            map.serialize_entry(&name, value)?;
        }
        map.end()
    }
}
