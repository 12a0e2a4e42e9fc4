//! Error types for rowmap-sqlite.

use rowmap_core::{ErrorKind, MapError};
use thiserror::Error;

/// Errors produced by [`Database`](crate::Database) operations.
#[derive(Debug, Error)]
pub enum DbError {
    /// The database file could not be opened or configured.
    #[error("cannot open database '{path}': {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },

    /// SQLite rejected a statement or a binding.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Materializing rows or binding parameters failed.
    #[error(transparent)]
    Map(#[from] MapError),

    /// A parameter value has no SQLite representation.
    #[error("parameter '{name}' holds a {type_name} value, which SQLite cannot store")]
    Unbindable { name: String, type_name: &'static str },
}

impl DbError {
    /// Kind of the underlying mapping failure, if this is one.
    pub fn map_kind(&self) -> Option<ErrorKind> {
        match self {
            DbError::Map(err) => Some(err.kind()),
            _ => None,
        }
    }
}
