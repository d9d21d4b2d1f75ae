use std::fmt;

use log::trace;
use rusqlite::{Statement, types::Null};

use super::{error::StoreError, header::table::*};

/// A bindable parameter or a fetched column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    String(String),
    Integer(i64),
    Double(f64),
    Blob(Vec<u8>),
}

/// Type tag persisted in the `type` column. The discriminants are part of the file
/// format and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    String = 0,
    Double = 1,
    Blob = 2,
    Integer = 3,
}

impl ValueType {
    /// Schema column holding values of this type.
    pub fn column_name(&self) -> &'static str {
        match self {
            ValueType::String => COLUMN_STRING,
            ValueType::Double => COLUMN_DOUBLE,
            ValueType::Blob => COLUMN_BLOB,
            ValueType::Integer => COLUMN_INTEGER,
        }
    }

    pub fn tag(&self) -> i64 {
        *self as i64
    }
}

impl TryFrom<i64> for ValueType {
    type Error = StoreError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ValueType::String),
            1 => Ok(ValueType::Double),
            2 => Ok(ValueType::Blob),
            3 => Ok(ValueType::Integer),
            _ => Err(StoreError::UnknownType {
                column: COLUMN_TYPE.into(),
            }),
        }
    }
}

impl Value {
    /// Binds this value to the 1-based parameter `index` of `stmt`.
    ///
    /// Text and blobs are copied by the engine during the call.
    pub fn bind(&self, index: usize, stmt: &mut Statement<'_>) -> Result<(), StoreError> {
        trace!("binding parameter {index}: {self}");

        let status = match self {
            Value::Null => stmt.raw_bind_parameter(index, Null),
            Value::String(s) => stmt.raw_bind_parameter(index, s.as_str()),
            Value::Integer(i) => stmt.raw_bind_parameter(index, *i),
            Value::Double(d) => stmt.raw_bind_parameter(index, *d),
            Value::Blob(b) => stmt.raw_bind_parameter(index, b.as_slice()),
        };

        status.map_err(|source| StoreError::Bind { index, source })
    }

    /// Type tag for this value. `None` for `Null`, which is never stored as an entry.
    pub fn value_type(&self) -> Option<ValueType> {
        match self {
            Value::Null => None,
            Value::Blob(_) => Some(ValueType::Blob),
            Value::String(_) => Some(ValueType::String),
            Value::Integer(_) => Some(ValueType::Integer),
            Value::Double(_) => Some(ValueType::Double),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(b) => Some(b),
            _ => None,
        }
    }

    pub fn into_string(self) -> Option<String> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn into_blob(self) -> Option<Vec<u8>> {
        match self {
            Value::Blob(b) => Some(b),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::String(s) => write!(f, "'{s}'"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Double(d) => write!(f, "{d}"),
            Value::Blob(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Integer(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Blob(value)
    }
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Self {
        Value::Blob(value.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use rusqlite::{Connection, types::ValueRef};

    use super::*;

    fn bound(value: Value) -> Value {
        let conn = Connection::open_in_memory().unwrap();
        let mut stmt = conn.prepare("SELECT ?1;").unwrap();
        value.bind(1, &mut stmt).unwrap();

        let mut rows = stmt.raw_query();
        let row = rows.next().unwrap().unwrap();
        match row.get_ref(0).unwrap() {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(d) => Value::Double(d),
            ValueRef::Text(t) => Value::String(String::from_utf8(t.to_vec()).unwrap()),
            ValueRef::Blob(b) => Value::Blob(b.to_vec()),
        }
    }

    #[test]
    fn value_binds_each_variant() {
        let inputs = vec![
            Value::Null,
            Value::String("text".into()),
            Value::Integer(i64::MIN),
            Value::Double(-0.5),
            Value::Blob(vec![0, 1, 2, 255]),
        ];

        for value in inputs {
            assert_eq!(bound(value.clone()), value);
        }
    }

    #[test]
    #[should_panic(expected = "Bind")]
    fn value_bind_out_of_range() {
        let conn = Connection::open_in_memory().unwrap();
        let mut stmt = conn.prepare("SELECT ?1;").unwrap();

        Value::Integer(1).bind(2, &mut stmt).unwrap();
    }

    #[test]
    fn value_type_tags_are_stable() {
        assert_eq!(ValueType::String.tag(), 0);
        assert_eq!(ValueType::Double.tag(), 1);
        assert_eq!(ValueType::Blob.tag(), 2);
        assert_eq!(ValueType::Integer.tag(), 3);

        for tag in 0_i64..4 {
            let value_type: ValueType = tag.try_into().unwrap();
            assert_eq!(value_type.tag(), tag);
        }
        assert!(ValueType::try_from(4_i64).is_err());
    }

    #[test]
    fn value_type_columns() {
        assert_eq!(Value::from("a").value_type().unwrap().column_name(), "str");
        assert_eq!(Value::from(1.5_f64).value_type().unwrap().column_name(), "dbl");
        assert_eq!(Value::from(vec![1_u8]).value_type().unwrap().column_name(), "dat");
        assert_eq!(Value::from(7_i64).value_type().unwrap().column_name(), "itg");
        assert_eq!(Value::Null.value_type(), None);
    }

    #[test]
    fn value_from_bool_and_option() {
        assert_eq!(Value::from(true), Value::Integer(1));
        assert_eq!(Value::from(false), Value::Integer(0));
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::String("x".into()));
    }
}
