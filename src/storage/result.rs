//! Row marshaling.
//!
//! A [`ResultBuilder`] takes ownership of a prepared, bound statement, steps it to
//! completion and converts every produced row into a [`Row`]: a mapping from column name
//! to a [`Value`] reconstructed from the column's storage class.
//!
//! The statement is finalized exactly once: after the last row has been read, or when
//! the builder is dropped early (e.g. a marshaling error), whichever comes first.
use std::{collections::BTreeMap, fmt};

use log::warn;
use rusqlite::{
    Statement,
    types::{FromSqlError, Type, ValueRef},
};

use super::{Value, error::StoreError};

/// A materialized result row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row(BTreeMap<String, Value>);

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    pub fn insert(&mut self, column: impl Into<String>, value: Value) {
        self.0.insert(column.into(), value);
    }

    /// Removes a column from the row, returning its value.
    pub fn take(&mut self, column: &str) -> Option<Value> {
        self.0.remove(column)
    }

    pub fn integer(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(Value::as_integer)
    }

    pub fn double(&self, column: &str) -> Option<f64> {
        self.get(column).and_then(Value::as_double)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cells = self
            .0
            .iter()
            .map(|(name, value)| format!("{name}: {value}"))
            .collect::<Vec<String>>();
        write!(f, "{{{}}}", cells.join(", "))
    }
}

pub struct ResultBuilder<'conn> {
    stmt: Option<Statement<'conn>>,
}

impl<'conn> ResultBuilder<'conn> {
    pub fn new(stmt: Statement<'conn>) -> Self {
        Self { stmt: Some(stmt) }
    }

    /// Steps the statement until completion and returns every row it produced.
    pub fn results(mut self) -> Result<Vec<Row>, StoreError> {
        let mut out = Vec::new();

        if let Some(stmt) = self.stmt.as_mut() {
            let names = column_names(stmt)?;
            let mut rows = stmt.raw_query();

            while let Some(row) = rows.next().map_err(StoreError::engine("step"))? {
                out.push(build_row(&names, row)?);
            }
        }

        self.finalize()?;
        Ok(out)
    }

    fn finalize(&mut self) -> Result<(), StoreError> {
        match self.stmt.take() {
            Some(stmt) => stmt.finalize().map_err(StoreError::engine("finalize")),
            None => Ok(()),
        }
    }
}

impl Drop for ResultBuilder<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.finalize() {
            warn!("failed to finalize statement: {e}");
        }
    }
}

/// Resolves every result column name. Names are fixed for the lifetime of a
/// prepared statement.
fn column_names(stmt: &Statement<'_>) -> Result<Vec<String>, StoreError> {
    (0..stmt.column_count())
        .map(|index| match stmt.column_name(index) {
            Ok(name) => Ok(name.to_string()),
            Err(rusqlite::Error::Utf8Error(_)) => Err(StoreError::UnknownColumnFmt { index }),
            Err(_) => Err(StoreError::UnknownColumnName { index }),
        })
        .collect()
}

fn build_row(names: &[String], row: &rusqlite::Row<'_>) -> Result<Row, StoreError> {
    let count = row.as_ref().column_count();
    if count == 0 {
        return Err(StoreError::NullDataInRow);
    }

    let mut out = Row::new();
    for index in 0..count {
        let name = names
            .get(index)
            .ok_or(StoreError::UnknownColumnName { index })?;
        let raw = row
            .get_ref(index)
            .map_err(|_| StoreError::UnknownColumnName { index })?;
        out.insert(name.as_str(), column_value(name, raw)?);
    }

    Ok(out)
}

fn column_value(column: &str, raw: ValueRef<'_>) -> Result<Value, StoreError> {
    let unknown = || StoreError::UnknownType {
        column: column.to_string(),
    };

    match raw.data_type() {
        Type::Null => Ok(Value::Null),
        Type::Integer => raw.as_i64().map(Value::Integer).map_err(|_| unknown()),
        Type::Real => raw.as_f64().map(Value::Double).map_err(|_| unknown()),
        Type::Blob => raw
            .as_blob()
            .map(|b| Value::Blob(b.to_vec()))
            .map_err(|_| StoreError::BlobReadFailure {
                column: column.to_string(),
            }),
        Type::Text => match raw.as_str() {
            Ok(s) => Ok(Value::String(s.to_string())),
            Err(FromSqlError::InvalidType) => Err(StoreError::StringReadFailure {
                column: column.to_string(),
            }),
            Err(_) => Err(StoreError::StringConvertFailure {
                column: column.to_string(),
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;

    use super::*;

    fn results(conn: &Connection, sql: &str) -> Result<Vec<Row>, StoreError> {
        let stmt = conn.prepare(sql).unwrap();
        ResultBuilder::new(stmt).results()
    }

    #[test]
    fn builder_marshals_storage_classes() {
        let conn = Connection::open_in_memory().unwrap();

        let rows = results(
            &conn,
            "SELECT NULL AS n, 42 AS i, 2.5 AS d, x'00ff' AS b, 'text' AS s;",
        )
        .unwrap();

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.len(), 5);
        assert_eq!(row.get("n"), Some(&Value::Null));
        assert_eq!(row.get("i"), Some(&Value::Integer(42)));
        assert_eq!(row.get("d"), Some(&Value::Double(2.5)));
        assert_eq!(row.get("b"), Some(&Value::Blob(vec![0x00, 0xff])));
        assert_eq!(row.get("s"), Some(&Value::String("text".into())));
    }

    #[test]
    fn builder_collects_every_row() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE t (v INTEGER); INSERT INTO t VALUES (1); INSERT INTO t VALUES (2); INSERT INTO t VALUES (3);",
        )
        .unwrap();

        let rows = results(&conn, "SELECT v FROM t ORDER BY v;").unwrap();
        let values = rows
            .iter()
            .map(|r| r.integer("v").unwrap())
            .collect::<Vec<i64>>();

        assert_eq!(values, vec![1, 2, 3]);
    }

    #[test]
    fn builder_empty_result() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (v INTEGER);").unwrap();

        assert!(results(&conn, "SELECT v FROM t;").unwrap().is_empty());
    }

    #[test]
    #[should_panic(expected = "StringConvertFailure")]
    fn builder_rejects_invalid_text() {
        let conn = Connection::open_in_memory().unwrap();

        results(&conn, "SELECT CAST(x'ff' AS TEXT) AS s;").unwrap();
    }

    #[test]
    fn builder_drop_finalizes_unread_statement() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (v INTEGER);").unwrap();

        let stmt = conn.prepare("SELECT v FROM t;").unwrap();
        drop(ResultBuilder::new(stmt));

        conn.execute_batch("DROP TABLE t;").unwrap();
    }

    #[test]
    fn row_display() {
        let mut row = Row::new();
        row.insert("b", Value::Integer(2));
        row.insert("a", Value::String("x".into()));

        assert_eq!(row.to_string(), "{a: 'x', b: 2}");
        assert_eq!(row.columns().collect::<Vec<_>>(), vec!["a", "b"]);
    }
}
