//! The [`Database`] query/execute API.
//!
//! A `Database` owns one SQLite connection and a shared [`Mapper`]. Every call
//! builds an [`Identity`] from the SQL text, the target and parameter types,
//! and the database path, so compiled materializers and binders are reused
//! across calls with the same shape.

use std::path::Path;
use std::sync::Arc;

use rusqlite::{CachedStatement, Connection};

use rowmap_core::{
    CommandKind, DynamicRow, Execution, FromRow, Identity, MapError, Mapper, ParameterBuffer,
    Rows, ToParams,
};

use crate::cursor::StatementCursor;
use crate::error::DbError;
use crate::params::bind_parameters;

const IN_MEMORY: &str = ":memory:";

/// A SQLite connection paired with a [`Mapper`].
pub struct Database {
    conn: Connection,
    source: String,
    mapper: Arc<Mapper>,
}

impl Database {
    /// Opens (or creates) a SQLite database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let source = path.as_ref().display().to_string();
        let open_error = |source_err| DbError::Open {
            path: source.clone(),
            source: source_err,
        };
        let conn = Connection::open(path.as_ref()).map_err(open_error)?;
        configure(&conn).map_err(open_error)?;
        tracing::debug!("Opened database {}", source);
        Ok(Database::from_parts(conn, source))
    }

    /// Opens a private in-memory database.
    pub fn in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory().map_err(|source| DbError::Open {
            path: IN_MEMORY.to_string(),
            source,
        })?;
        Ok(Database::from_parts(conn, IN_MEMORY.to_string()))
    }

    fn from_parts(conn: Connection, source: String) -> Self {
        Database {
            conn,
            source,
            mapper: Arc::new(Mapper::default()),
        }
    }

    /// Replaces the mapper, e.g. to share one cache between databases or to
    /// apply custom options and registrations.
    pub fn with_mapper(mut self, mapper: Arc<Mapper>) -> Self {
        self.mapper = mapper;
        self
    }

    pub fn mapper(&self) -> &Mapper {
        &self.mapper
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn identity<T: 'static, P: 'static>(&self, sql: &str) -> Identity {
        Identity::new(sql, CommandKind::Text, &self.source)
            .with_target::<T>()
            .with_parameters::<P>()
    }

    fn bind<P: ToParams>(
        &self,
        execution: &Execution<'_>,
        sql: &str,
        params: &P,
    ) -> Result<ParameterBuffer, DbError> {
        let mut buffer = ParameterBuffer::new(sql);
        execution.bind(&mut buffer, params)?;
        tracing::debug!(
            "Executing '{}' with {} parameter(s)",
            buffer.sql(),
            buffer.parameters().len()
        );
        Ok(buffer)
    }

    /// Runs `sql` and hands the row stream to `f`.
    ///
    /// Each item is one row or the error that row raised. Rows after a
    /// conversion failure are still delivered, so `f` decides whether to
    /// stop, skip or collect.
    pub fn query_with<T, P, R, F>(&self, sql: &str, params: &P, f: F) -> Result<R, DbError>
    where
        T: FromRow,
        P: ToParams,
        F: FnOnce(Rows<'_, T, StatementCursor<'_>>) -> R,
    {
        let identity = self.identity::<T, P>(sql);
        let execution = self.mapper.execution(&identity);
        let buffer = self.bind(&execution, sql, params)?;
        let mut stmt = prepare(&self.conn, &buffer)?;
        if stmt.column_count() == 0 {
            stmt.raw_execute()?;
            return Ok(f(Rows::empty()));
        }
        let mut cursor = StatementCursor::new(&mut stmt);
        let rows = execution.rows(&mut cursor)?;
        Ok(f(rows))
    }

    /// Runs `sql` and maps every row to `T`.
    pub fn query<T: FromRow, P: ToParams>(&self, sql: &str, params: &P) -> Result<Vec<T>, DbError> {
        let rows = self.query_with(sql, params, |rows| rows.collect::<Result<Vec<T>, _>>())?;
        Ok(rows?)
    }

    /// First row mapped to `T`, or `None` when there are no rows.
    pub fn query_first<T: FromRow, P: ToParams>(
        &self,
        sql: &str,
        params: &P,
    ) -> Result<Option<T>, DbError> {
        let first = self.query_with(sql, params, |mut rows| rows.next().transpose())?;
        Ok(first?)
    }

    /// First column of the first row.
    pub fn query_scalar<T: FromRow, P: ToParams>(
        &self,
        sql: &str,
        params: &P,
    ) -> Result<Option<T>, DbError> {
        self.query_first(sql, params)
    }

    pub fn query_dynamic<P: ToParams>(&self, sql: &str, params: &P) -> Result<Vec<DynamicRow>, DbError> {
        self.query(sql, params)
    }

    /// Runs a statement that returns no rows. Returns the affected row count.
    pub fn execute<P: ToParams>(&self, sql: &str, params: &P) -> Result<usize, DbError> {
        let identity = self.identity::<(), P>(sql);
        let buffer = self.bind(&self.mapper.execution(&identity), sql, params)?;
        let mut stmt = prepare(&self.conn, &buffer)?;
        Ok(stmt.raw_execute()?)
    }

    /// Runs `sql` once per element inside one transaction.
    ///
    /// The binder is compiled once for `P` and assumed to fit every element.
    /// Any failure rolls the whole batch back.
    pub fn execute_many<P: ToParams>(&mut self, sql: &str, items: &[P]) -> Result<usize, DbError> {
        if items.is_empty() {
            return Err(MapError::UnsupportedParameterSource {
                reason: "bulk execution needs at least one parameter set".to_string(),
            }
            .into());
        }
        let identity = self.identity::<(), P>(sql);
        let binder = self.mapper.execution(&identity).binder::<P>()?;

        let tx = self.conn.transaction()?;
        let mut affected = 0;
        for item in items {
            let mut buffer = ParameterBuffer::new(sql);
            binder.bind(&mut buffer, item)?;
            let mut stmt = prepare(&tx, &buffer)?;
            affected += stmt.raw_execute()?;
        }
        tx.commit()?;
        tracing::debug!("Executed '{}' for {} parameter set(s)", sql, items.len());
        Ok(affected)
    }

    /// Runs several `;`-separated statements without parameters or results.
    pub fn execute_batch(&self, sql: &str) -> Result<(), DbError> {
        self.conn.execute_batch(sql)?;
        // Cached statements may describe columns of the old schema.
        self.conn.flush_prepared_statement_cache();
        Ok(())
    }
}

fn configure(conn: &Connection) -> Result<(), rusqlite::Error> {
    // WAL gives concurrent readers alongside the single writer.
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

/// Prepares the (possibly rewritten) SQL of `buffer` and binds its parameters.
fn prepare<'c>(conn: &'c Connection, buffer: &ParameterBuffer) -> Result<CachedStatement<'c>, DbError> {
    let mut stmt = conn.prepare_cached(buffer.sql())?;
    bind_parameters(&mut stmt, buffer.parameters())?;
    Ok(stmt)
}

#[cfg(test)]
mod tests {
    use rowmap_core::MapperOptions;

    use super::*;

    #[test]
    fn zero_column_queries_run_and_return_nothing() {
        let db = Database::in_memory().unwrap();
        db.execute_batch("CREATE TABLE t (n INTEGER)").unwrap();
        let rows: Vec<i64> = db.query("INSERT INTO t VALUES (1)", &()).unwrap();
        assert!(rows.is_empty());
        assert_eq!(db.query_scalar::<i64, _>("SELECT count(*) FROM t", &()).unwrap(), Some(1));
        assert_eq!(db.mapper().cache_len(), 2);
    }

    #[test]
    fn execute_many_rejects_an_empty_batch() {
        let mut db = Database::in_memory().unwrap();
        let err = db.execute_many::<()>("SELECT 1", &[]).unwrap_err();
        assert_eq!(
            err.map_kind(),
            Some(rowmap_core::ErrorKind::UnsupportedParameterSource)
        );
    }

    #[test]
    fn one_shot_queries_are_swept() {
        let options = MapperOptions {
            sweep_every_insertions: 10,
            ..MapperOptions::default()
        };
        let db = Database::in_memory()
            .unwrap()
            .with_mapper(Arc::new(Mapper::new(options)));
        let hot = "SELECT 42";
        for _ in 0..2 {
            assert_eq!(db.query::<i64, _>(hot, &()).unwrap(), vec![42]);
        }
        for i in 0..200i64 {
            let rows: Vec<i64> = db.query(&format!("SELECT {i}"), &()).unwrap();
            assert_eq!(rows, vec![i]);
        }
        assert!(db.mapper().cache_len() < 10, "{} slots left", db.mapper().cache_len());
        assert_eq!(db.mapper().hit_count(&db.identity::<i64, ()>(hot)), Some(1));
    }

    #[test]
    fn rows_before_a_bad_value_are_delivered() {
        let db = Database::in_memory().unwrap();
        db.execute_batch("CREATE TABLE t (n); INSERT INTO t VALUES (1), (2), ('x'), (4);")
            .unwrap();
        let rows: Vec<Result<i64, MapError>> = db
            .query_with::<i64, _, _, _>("SELECT n FROM t ORDER BY rowid", &(), |rows| {
                rows.collect()
            })
            .unwrap();
        let ok: Vec<i64> = rows.iter().filter_map(|r| r.as_ref().ok().copied()).collect();
        assert_eq!(ok, vec![1, 2, 4]);
        assert_eq!(
            rows[2].as_ref().err().map(MapError::kind),
            Some(rowmap_core::ErrorKind::ColumnConversion)
        );

        let err = db.query::<i64, _>("SELECT n FROM t ORDER BY rowid", &()).unwrap_err();
        assert_eq!(err.map_kind(), Some(rowmap_core::ErrorKind::ColumnConversion));
    }
}
