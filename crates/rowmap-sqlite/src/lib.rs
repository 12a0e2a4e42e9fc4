//! SQLite execution layer for rowmap.
//!
//! Adapts rusqlite statements to the core's [`Cursor`](rowmap_core::Cursor)
//! and [`Command`](rowmap_core::Command) seams and exposes a small
//! query/execute API on [`Database`].
//!
//! # Modules
//!
//! - [`error`]: DbError enum
//! - [`affinity`]: declared column type to wire type
//! - [`cursor`]: StatementCursor over running statements
//! - [`params`]: parameter value encoding and binding
//! - [`database`]: the Database API

pub mod affinity;
pub mod cursor;
pub mod database;
pub mod error;
pub mod params;

// Re-export key types for ergonomic use.
pub use cursor::StatementCursor;
pub use database::Database;
pub use error::DbError;
