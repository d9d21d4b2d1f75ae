//! Native connection management.
//!
//! The `database` module defines [`Database`], the sole owner of a SQLite connection.
//!
//! # Responsibilities
//!
//! - Opening (create + read/write) and closing the connection; both are idempotent.
//! - Running statements that must not produce rows ([`Database::execute_update`]).
//! - Running statements that produce rows ([`Database::execute_query`]), returning the
//!   fully materialized result set.
//!
//! Every access to the connection happens under the database's [`ExclusiveLock`]. The
//! lock is not reentrant: nothing reachable from inside a locked section calls back into
//! the same `Database`.
//!
//! # Example
//! ```rust
//! use shelf::storage::{Database, Query, Value};
//!
//! let db = Database::new(":memory:");
//! db.open().unwrap();
//!
//! db.execute_update(&"CREATE TABLE t (v TEXT);".into()).unwrap();
//! db.execute_update(&Query::new("INSERT INTO t VALUES (?);", vec!["hello".into()]))
//!     .unwrap();
//!
//! let rows = db.execute_query(&"SELECT v FROM t;".into()).unwrap();
//! assert_eq!(rows[0].get("v"), Some(&Value::String("hello".into())));
//! ```
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use rusqlite::{Connection, OpenFlags};

use crate::lock::ExclusiveLock;

use super::{Query, Row, error::StoreError, result::ResultBuilder};

#[derive(Debug)]
pub struct Database {
    path: PathBuf,
    handle: ExclusiveLock<Option<Connection>>,
}

impl Database {
    /// Creates a closed database for `path`. Nothing touches the filesystem until
    /// [`Database::open`] is called.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            handle: ExclusiveLock::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.handle.with_lock(|handle| handle.is_some())
    }

    pub fn open(&self) -> Result<(), StoreError> {
        self.handle.with_lock(|handle| {
            if handle.is_some() {
                return Ok(());
            }

            let flags = OpenFlags::SQLITE_OPEN_CREATE | OpenFlags::SQLITE_OPEN_READ_WRITE;
            let conn = Connection::open_with_flags(&self.path, flags).map_err(|source| {
                StoreError::Open {
                    path: self.path.display().to_string(),
                    source,
                }
            })?;

            info!("opened database at {}", self.path.display());
            *handle = Some(conn);
            Ok(())
        })
    }

    pub fn close(&self) -> Result<(), StoreError> {
        self.handle.with_lock(|handle| {
            let Some(conn) = handle.take() else {
                return Ok(());
            };

            if let Err((conn, source)) = conn.close() {
                *handle = Some(conn);
                return Err(StoreError::Close {
                    path: self.path.display().to_string(),
                    source,
                });
            }

            info!("closed database at {}", self.path.display());
            Ok(())
        })
    }

    /// Runs a statement that is expected to produce no rows (DDL, DML, transaction
    /// control).
    ///
    /// # Panics
    ///
    /// If the statement produces a row. Queries must go through
    /// [`Database::execute_query`]; submitting one here is a programming error.
    pub fn execute_update(&self, update: &Query) -> Result<(), StoreError> {
        self.handle.with_lock(|handle| {
            let conn = handle.as_ref().ok_or(StoreError::Unopened)?;
            let mut stmt = update.prepare(conn)?;
            debug!("running (update): {update}");

            let produced_row = stmt
                .raw_query()
                .next()
                .map_err(StoreError::engine("step"))?
                .is_some();

            if produced_row {
                if let Err(e) = stmt.finalize() {
                    warn!("failed to finalize statement: {e}");
                }
                panic!("update statement produced a row: {}", update.sql());
            }

            stmt.finalize().map_err(StoreError::engine("finalize"))
        })
    }

    /// Runs a statement and returns every row it produced.
    pub fn execute_query(&self, query: &Query) -> Result<Vec<Row>, StoreError> {
        self.handle.with_lock(|handle| {
            let conn = handle.as_ref().ok_or(StoreError::Unopened)?;
            let stmt = query.prepare(conn)?;
            debug!("running (query): {query}");

            ResultBuilder::new(stmt).results()
        })
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("failed to close database: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use tempdir::TempDir;

    use crate::storage::Value;

    use super::*;

    fn memory() -> Database {
        let db = Database::new(":memory:");
        db.open().unwrap();
        db
    }

    #[test]
    fn database_open_close_idempotent() {
        let db = Database::new(":memory:");
        assert!(!db.is_open());

        db.open().unwrap();
        db.open().unwrap();
        assert!(db.is_open());

        db.close().unwrap();
        db.close().unwrap();
        assert!(!db.is_open());
    }

    #[test]
    fn database_creates_file() {
        let temp = TempDir::new("database").unwrap();
        let path = temp.path().join("test.sqlite");

        let db = Database::new(&path);
        db.open().unwrap();
        db.execute_update(&"CREATE TABLE t (v INTEGER);".into())
            .unwrap();
        db.close().unwrap();

        assert!(path.exists());
    }

    #[test]
    #[should_panic(expected = "Open")]
    fn database_open_missing_directory() {
        let temp = TempDir::new("database").unwrap();
        let db = Database::new(temp.path().join("missing").join("test.sqlite"));

        db.open().unwrap();
    }

    #[test]
    #[should_panic(expected = "Unopened")]
    fn database_update_requires_open() {
        let db = Database::new(":memory:");

        db.execute_update(&"CREATE TABLE t (v INTEGER);".into())
            .unwrap();
    }

    #[test]
    #[should_panic(expected = "Unopened")]
    fn database_query_requires_open() {
        let db = Database::new(":memory:");

        db.execute_query(&"SELECT 1;".into()).unwrap();
    }

    #[test]
    #[should_panic(expected = "update statement produced a row")]
    fn database_update_producing_rows() {
        let db = memory();

        let _ = db.execute_update(&"SELECT 1;".into());
    }

    #[test]
    fn database_update_then_query() {
        let db = memory();
        db.execute_update(&"CREATE TABLE t (k TEXT, v BLOB);".into())
            .unwrap();
        db.execute_update(&Query::new(
            "INSERT INTO t VALUES (?, ?);",
            vec!["key".into(), Value::Blob(vec![9, 8, 7])],
        ))
        .unwrap();

        let rows = db
            .execute_query(&Query::new(
                "SELECT v FROM t WHERE k = ?;",
                vec!["key".into()],
            ))
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("v"), Some(&Value::Blob(vec![9, 8, 7])));
    }

    #[test]
    #[should_panic(expected = "Engine")]
    fn database_update_constraint_failure() {
        let db = memory();
        db.execute_update(&"CREATE TABLE t (v INTEGER NOT NULL);".into())
            .unwrap();

        db.execute_update(&Query::new("INSERT INTO t VALUES (?);", vec![Value::Null]))
            .unwrap();
    }

    #[test]
    fn database_usable_after_statement_error() {
        let db = memory();

        assert!(db.execute_query(&"SELECT * FROM missing;".into()).is_err());
        assert!(db.execute_query(&Query::new("SELECT ?;", Vec::new())).is_err());

        let rows = db.execute_query(&"SELECT 1 AS one;".into()).unwrap();
        assert_eq!(rows[0].integer("one"), Some(1));
    }
}
