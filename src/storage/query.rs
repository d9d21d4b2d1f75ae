use std::fmt;

use rusqlite::{Connection, Statement};

use super::{Value, error::StoreError};

/// SQL text paired with its positional arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    sql: String,
    args: Vec<Value>,
}

impl Query {
    pub fn new(sql: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            args,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Prepares the query against `conn` and binds every argument in order.
    ///
    /// The number of arguments must equal the number of placeholders in the prepared
    /// statement. On any failure the statement is finalized before the error is
    /// returned.
    pub fn prepare<'conn>(&self, conn: &'conn Connection) -> Result<Statement<'conn>, StoreError> {
        let mut stmt = conn.prepare(&self.sql).map_err(|source| StoreError::Statement {
            sql: self.sql.clone(),
            source,
        })?;

        let expected = stmt.parameter_count();
        if expected != self.args.len() {
            return Err(StoreError::ArgCountMismatch {
                expected,
                actual: self.args.len(),
            });
        }

        for (idx, arg) in self.args.iter().enumerate() {
            arg.bind(idx + 1, &mut stmt)?;
        }

        Ok(stmt)
    }
}

impl From<&str> for Query {
    fn from(sql: &str) -> Self {
        Query::new(sql, Vec::new())
    }
}

impl From<String> for Query {
    fn from(sql: String) -> Self {
        Query::new(sql, Vec::new())
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql)?;
        if !self.args.is_empty() {
            let args = self
                .args
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<String>>();
            write!(f, " [{}]", args.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_binds_arguments() {
        let conn = Connection::open_in_memory().unwrap();
        let query = Query::new("SELECT ?, ?;", vec![Value::Integer(4), "four".into()]);

        let mut stmt = query.prepare(&conn).unwrap();
        let (num, text): (i64, String) = stmt
            .raw_query()
            .next()
            .unwrap()
            .map(|row| (row.get(0).unwrap(), row.get(1).unwrap()))
            .unwrap();

        assert_eq!(num, 4);
        assert_eq!(text, "four");
    }

    #[test]
    #[should_panic(expected = "ArgCountMismatch")]
    fn query_too_few_arguments() {
        let conn = Connection::open_in_memory().unwrap();
        let query = Query::new("SELECT ?, ?;", vec![Value::Integer(4)]);

        query.prepare(&conn).unwrap();
    }

    #[test]
    #[should_panic(expected = "ArgCountMismatch")]
    fn query_too_many_arguments() {
        let conn = Connection::open_in_memory().unwrap();
        let query = Query::new("SELECT 1;", vec![Value::Integer(4)]);

        query.prepare(&conn).unwrap();
    }

    #[test]
    #[should_panic(expected = "Statement")]
    fn query_invalid_sql() {
        let conn = Connection::open_in_memory().unwrap();

        Query::from("SELEC nothing;").prepare(&conn).unwrap();
    }

    #[test]
    fn query_display_lists_arguments() {
        let query = Query::new("SELECT ?;", vec![Value::Blob(vec![1, 2])]);
        assert_eq!(query.to_string(), "SELECT ?; [<2 bytes>]");
        assert_eq!(Query::from("VACUUM;").to_string(), "VACUUM;");
    }
}
