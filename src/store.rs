//! Typed key/value store.
//!
//! [`Store`] is the public API of the crate. Values of a closed set of types (string,
//! integer, double, blob, plus codec-encoded objects) are addressed by a key and a scope
//! and persisted as rows of a single SQLite table.
//!
//! # Overview
//!
//! - Keys and scopes are [normalized](crate::normalize::normalize) before they are
//!   stored or looked up. A missing scope means [`DEFAULT_SCOPE`].
//! - Each `(key, scope)` pair holds at most one value. Writing an existing pair
//!   replaces the whole row, including its type.
//! - A value is looked up by key, scope *and* type: a string is never returned for an
//!   integer read.
//! - Every operation holds the store's reentrant lock for its whole duration, so
//!   operations on one store are totally ordered.
//!
//! # Schema
//!
//! ```text
//! store_1(id, key, scope, type, inserted_at, last_read_at, str, dbl, itg, dat)
//!   UNIQUE(key, scope) ON CONFLICT REPLACE
//!   INDEX store_1_type_idx(type), store_1_key_idx(key), store_1_scp_idx(scope)
//! ```
//!
//! # Example
//! ```rust
//! use shelf::Store;
//!
//! let store = Store::memory();
//! store.open().unwrap();
//!
//! store.set_string("dark", "Theme", Some("Settings")).unwrap();
//! assert_eq!(store.string("theme", Some("settings")), Some("dark".to_string()));
//!
//! // Missing numbers read as zero; use `has_value` to tell them apart.
//! assert_eq!(store.integer("launches", None), 0);
//! assert!(!store.has_value("launches", None));
//! ```
use std::{
    fs, io,
    path::PathBuf,
    time::{SystemTime, UNIX_EPOCH},
};

use log::{debug, info};

use crate::{
    codec::{BincodeCodec, ObjectCodec},
    config::StoreConfig,
    lock::ReentrantLock,
    normalize::normalize,
    storage::{
        Database, Query, Row, Value, ValueType, error::StoreError, header::table::*,
    },
};

/// Scope used when none is given.
pub const DEFAULT_SCOPE: &str = "default_scope";

/// A full stored row.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub id: i64,
    pub key: String,
    pub scope: String,
    pub value_type: ValueType,
    /// Unix timestamp, in seconds, of the write that created this row.
    pub inserted_at: f64,
    /// Unix timestamp, in seconds, of the last typed read. `None` until read.
    pub last_read_at: Option<f64>,
    pub value: Value,
}

impl TryFrom<Row> for Entry {
    type Error = StoreError;

    fn try_from(mut row: Row) -> Result<Self, Self::Error> {
        let malformed = |column: &str| StoreError::UnknownType {
            column: column.to_string(),
        };

        let id = row.integer(COLUMN_ID).ok_or(StoreError::InvalidId)?;
        let value_type: ValueType = row
            .integer(COLUMN_TYPE)
            .ok_or_else(|| malformed(COLUMN_TYPE))?
            .try_into()?;
        let inserted_at = row
            .double(COLUMN_INSERTED_AT)
            .ok_or_else(|| malformed(COLUMN_INSERTED_AT))?;
        let last_read_at = row.double(COLUMN_LAST_READ_AT);

        let key = row
            .take(COLUMN_KEY)
            .and_then(Value::into_string)
            .ok_or_else(|| malformed(COLUMN_KEY))?;
        let scope = row
            .take(COLUMN_SCOPE)
            .and_then(Value::into_string)
            .ok_or_else(|| malformed(COLUMN_SCOPE))?;
        let value = row
            .take(value_type.column_name())
            .filter(|v| !v.is_null())
            .ok_or_else(|| malformed(value_type.column_name()))?;

        Ok(Entry {
            id,
            key,
            scope,
            value_type,
            inserted_at,
            last_read_at,
            value,
        })
    }
}

#[derive(Debug)]
pub struct Store {
    config: StoreConfig,
    database: ReentrantLock<Option<Database>>,
}

impl Store {
    /// Creates a closed store. Call [`Store::open`] before use.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            database: ReentrantLock::new(None),
        }
    }

    /// Closed, non-persistent store.
    pub fn memory() -> Self {
        Self::new(StoreConfig::memory())
    }

    /// Closed store persisted under the platform's application data directory.
    pub fn persistent() -> Self {
        Self::new(StoreConfig::persistent())
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Path of the backing database, or the in-memory marker.
    pub fn path(&self) -> Result<PathBuf, StoreError> {
        self.config.database_path()
    }

    pub fn is_open(&self) -> bool {
        self.database
            .with_lock(|database| database.borrow().as_ref().is_some_and(Database::is_open))
    }

    /// Opens the backing database and creates the schema if it is missing. Does
    /// nothing if the store is already open.
    pub fn open(&self) -> Result<(), StoreError> {
        self.database.with_lock(|database| {
            if database.borrow().as_ref().is_some_and(Database::is_open) {
                return Ok(());
            }

            let path = self.config.database_path()?;
            if self.config.is_persistent() {
                fs::create_dir_all(self.config.directory()?)?;
            }

            let db = Database::new(path);
            db.open()?;
            create_schema(&db)?;

            info!("store opened at {}", db.path().display());
            *database.borrow_mut() = Some(db);
            Ok(())
        })
    }

    /// Closes the backing database. Does nothing if the store is not open.
    pub fn close(&self) -> Result<(), StoreError> {
        self.database.with_lock(|database| match database.borrow().as_ref() {
            Some(db) => db.close(),
            None => Ok(()),
        })
    }

    /// Writes `value` for `key` in `scope`, replacing any value stored for the same
    /// identity regardless of its type.
    pub fn set(
        &self,
        value: impl Into<Value>,
        key: &str,
        scope: Option<&str>,
    ) -> Result<(), StoreError> {
        let value = value.into();
        // SQLite stores NaN as NULL, which would leave the entry without a value.
        if matches!(value, Value::Double(d) if d.is_nan()) {
            return Err(StoreError::NotANumber);
        }

        let value_type = value.value_type().ok_or(StoreError::NullValue)?;
        let (key, scope) = identity(key, scope);
        let insert = Query::new(
            format!(
                "INSERT INTO `{TABLE_NAME}` (`{COLUMN_KEY}`, `{COLUMN_SCOPE}`, `{COLUMN_INSERTED_AT}`, `{COLUMN_TYPE}`, `{}`) VALUES (?, ?, ?, ?, ?);",
                value_type.column_name()
            ),
            vec![
                Value::String(key),
                Value::String(scope),
                Value::Double(timestamp()),
                Value::Integer(value_type.tag()),
                value,
            ],
        );

        self.with_database(|db| transaction(db, |db| db.execute_update(&insert)))
    }

    pub fn set_string(&self, value: &str, key: &str, scope: Option<&str>) -> Result<(), StoreError> {
        self.set(value, key, scope)
    }

    pub fn set_blob(&self, value: &[u8], key: &str, scope: Option<&str>) -> Result<(), StoreError> {
        self.set(value, key, scope)
    }

    pub fn set_integer(&self, value: i64, key: &str, scope: Option<&str>) -> Result<(), StoreError> {
        self.set(value, key, scope)
    }

    pub fn set_double(&self, value: f64, key: &str, scope: Option<&str>) -> Result<(), StoreError> {
        self.set(value, key, scope)
    }

    /// Stores `value` as the integer `1` or `0`.
    pub fn set_bool(&self, value: bool, key: &str, scope: Option<&str>) -> Result<(), StoreError> {
        self.set(value, key, scope)
    }

    /// Encodes `value` with [`BincodeCodec`] and stores the bytes as a blob.
    pub fn set_object<T>(&self, value: &T, key: &str, scope: Option<&str>) -> Result<(), StoreError>
    where
        BincodeCodec: ObjectCodec<T>,
    {
        self.set_object_with(&BincodeCodec::new(), value, key, scope)
    }

    pub fn set_object_with<T, C>(
        &self,
        codec: &C,
        value: &T,
        key: &str,
        scope: Option<&str>,
    ) -> Result<(), StoreError>
    where
        C: ObjectCodec<T>,
    {
        let bytes = codec.encode(value)?;
        self.set(bytes, key, scope)
    }

    /// Reads the `value_type` value stored for `key` in `scope`.
    ///
    /// The returned row holds the `id`, `type` and value column. A successful read
    /// stamps the entry's `last_read_at`; failing to stamp it does not fail the read.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if no value of `value_type` is stored for the identity.
    pub fn read(
        &self,
        value_type: ValueType,
        key: &str,
        scope: Option<&str>,
    ) -> Result<Row, StoreError> {
        let (key, scope) = identity(key, scope);
        let select = Query::new(
            format!(
                "SELECT `{COLUMN_ID}`, `{COLUMN_TYPE}`, `{}` FROM `{TABLE_NAME}` WHERE `{COLUMN_KEY}` = ? AND `{COLUMN_SCOPE}` = ? AND `{COLUMN_TYPE}` = ? LIMIT 1;",
                value_type.column_name()
            ),
            vec![
                Value::String(key.clone()),
                Value::String(scope.clone()),
                Value::Integer(value_type.tag()),
            ],
        );

        self.with_database(|db| {
            let Some(row) = db.execute_query(&select)?.into_iter().next() else {
                return Err(StoreError::NotFound {
                    key,
                    scope,
                    value_type: Some(value_type),
                });
            };
            let id = row.integer(COLUMN_ID).ok_or(StoreError::InvalidId)?;

            let touch = Query::new(
                format!("UPDATE `{TABLE_NAME}` SET `{COLUMN_LAST_READ_AT}` = ? WHERE `{COLUMN_ID}` = ?;"),
                vec![Value::Double(timestamp()), Value::Integer(id)],
            );
            if let Err(e) = db.execute_update(&touch) {
                debug!("failed to stamp last read of entry {id}: {e}");
            }

            Ok(row)
        })
    }

    /// Stored string, or `None` if there is none.
    pub fn string(&self, key: &str, scope: Option<&str>) -> Option<String> {
        self.read_value(ValueType::String, key, scope)
            .and_then(Value::into_string)
    }

    /// Stored blob, or `None` if there is none.
    pub fn blob(&self, key: &str, scope: Option<&str>) -> Option<Vec<u8>> {
        self.read_value(ValueType::Blob, key, scope)
            .and_then(Value::into_blob)
    }

    /// Stored integer, or `0` if there is none. See [`Store::has_value`] to tell a
    /// missing value from a stored `0`.
    pub fn integer(&self, key: &str, scope: Option<&str>) -> i64 {
        self.read_value(ValueType::Integer, key, scope)
            .and_then(|v| v.as_integer())
            .unwrap_or(0)
    }

    /// Stored double, or `0.0` if there is none. See [`Store::has_value`] to tell a
    /// missing value from a stored `0.0`.
    pub fn double(&self, key: &str, scope: Option<&str>) -> f64 {
        self.read_value(ValueType::Double, key, scope)
            .and_then(|v| v.as_double())
            .unwrap_or(0.0)
    }

    /// `true` only if the integer `1` is stored.
    pub fn bool(&self, key: &str, scope: Option<&str>) -> bool {
        self.integer(key, scope) == 1
    }

    /// Decodes an object written by [`Store::set_object`]. `None` if nothing is stored
    /// or the bytes do not decode as `T`.
    pub fn object<T>(&self, key: &str, scope: Option<&str>) -> Option<T>
    where
        BincodeCodec: ObjectCodec<T>,
    {
        self.object_with(&BincodeCodec::new(), key, scope)
    }

    pub fn object_with<T, C>(&self, codec: &C, key: &str, scope: Option<&str>) -> Option<T>
    where
        C: ObjectCodec<T>,
    {
        let bytes = self.blob(key, scope)?;
        codec
            .decode(&bytes)
            .inspect_err(|e| debug!("failed to decode object for '{key}': {e}"))
            .ok()
    }

    /// Returns `true` if any value, of any type, is stored for `key` in `scope`.
    ///
    /// Failures (including a closed store) are reported as `false`.
    pub fn has_value(&self, key: &str, scope: Option<&str>) -> bool {
        let (key, scope) = identity(key, scope);
        let count = Query::new(
            format!(
                "SELECT COUNT(*) AS `count` FROM `{TABLE_NAME}` WHERE `{COLUMN_KEY}` = ? AND `{COLUMN_SCOPE}` = ?;"
            ),
            vec![Value::String(key), Value::String(scope)],
        );

        let res = self.with_database(|db| db.execute_query(&count));
        match res {
            Ok(rows) => rows
                .first()
                .and_then(|row| row.integer("count"))
                .is_some_and(|count| count > 0),
            Err(e) => {
                debug!("value lookup failed: {e}");
                false
            }
        }
    }

    /// Returns the whole row stored for `key` in `scope` without marking it as read.
    pub fn entry(&self, key: &str, scope: Option<&str>) -> Result<Entry, StoreError> {
        let (key, scope) = identity(key, scope);
        let select = Query::new(
            format!(
                "SELECT * FROM `{TABLE_NAME}` WHERE `{COLUMN_KEY}` = ? AND `{COLUMN_SCOPE}` = ? LIMIT 1;"
            ),
            vec![Value::String(key.clone()), Value::String(scope.clone())],
        );

        match self
            .with_database(|db| db.execute_query(&select))?
            .into_iter()
            .next()
        {
            Some(row) => row.try_into(),
            None => Err(StoreError::NotFound {
                key,
                scope,
                value_type: None,
            }),
        }
    }

    /// Deletes the value stored for `key` in `scope`.
    pub fn delete_value(&self, key: &str, scope: Option<&str>) -> Result<(), StoreError> {
        let (key, scope) = identity(key, scope);
        let delete = Query::new(
            format!("DELETE FROM `{TABLE_NAME}` WHERE `{COLUMN_KEY}` = ? AND `{COLUMN_SCOPE}` = ?;"),
            vec![Value::String(key), Value::String(scope)],
        );

        self.with_database(|db| db.execute_update(&delete))
    }

    /// Deletes every value in `scope`.
    pub fn delete(&self, scope: &str) -> Result<(), StoreError> {
        let delete = Query::new(
            format!("DELETE FROM `{TABLE_NAME}` WHERE `{COLUMN_SCOPE}` = ?;"),
            vec![Value::String(normalize(scope))],
        );

        self.with_database(|db| db.execute_update(&delete))
    }

    /// Deletes every value in the store.
    ///
    /// Space is not returned to the filesystem until [`Store::cleanup`] runs.
    pub fn delete_all(&self) -> Result<(), StoreError> {
        let delete = Query::from(format!("DELETE FROM `{TABLE_NAME}` WHERE 1 = 1;"));

        self.with_database(|db| db.execute_update(&delete))
    }

    /// Rebuilds the database file into the minimal amount of space (`VACUUM`).
    pub fn cleanup(&self) -> Result<(), StoreError> {
        self.with_database(|db| db.execute_update(&"VACUUM;".into()))
    }

    /// Drops every stored value by deleting the database.
    ///
    /// A persistent store's file is removed from disk. If the store was open it is
    /// reopened with a fresh schema; otherwise it stays closed.
    pub fn hard_reset(&self) -> Result<(), StoreError> {
        // Reentrant: `is_open`, `close` and `open` take the same lock.
        let _guard = self.database.acquire();

        let reopen = self.is_open();
        self.close()?;

        if self.config.is_persistent() {
            let path = self.config.database_path()?;
            match fs::remove_file(&path) {
                Ok(()) => info!("removed database file {}", path.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        if reopen {
            self.open()?;
        }

        info!("store hard reset");
        Ok(())
    }

    fn read_value(&self, value_type: ValueType, key: &str, scope: Option<&str>) -> Option<Value> {
        match self.read(value_type, key, scope) {
            Ok(mut row) => row.take(value_type.column_name()),
            Err(e) => {
                if !e.is_not_found() {
                    debug!("read of '{key}' failed: {e}");
                }
                None
            }
        }
    }

    /// Runs `body` against the open database while holding the store lock.
    fn with_database<R>(
        &self,
        body: impl FnOnce(&Database) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        self.database.with_lock(|database| {
            let database = database.borrow();
            let db = database.as_ref().ok_or(StoreError::Unopened)?;
            body(db)
        })
    }
}

/// Runs `body` inside `BEGIN`/`COMMIT`. If `body` fails the transaction is rolled back
/// and the original error returned; a failing rollback is returned instead. A failed
/// `COMMIT` is rolled back best-effort so no transaction is left open.
fn transaction<R>(
    db: &Database,
    body: impl FnOnce(&Database) -> Result<R, StoreError>,
) -> Result<R, StoreError> {
    db.execute_update(&"BEGIN TRANSACTION;".into())?;

    match body(db) {
        Ok(out) => {
            if let Err(e) = db.execute_update(&"COMMIT TRANSACTION;".into()) {
                if let Err(rollback) = db.execute_update(&"ROLLBACK TRANSACTION;".into()) {
                    debug!("rollback after failed commit failed: {rollback}");
                }
                return Err(e);
            }
            Ok(out)
        }
        Err(e) => {
            db.execute_update(&"ROLLBACK TRANSACTION;".into())?;
            Err(e)
        }
    }
}

fn create_schema(db: &Database) -> Result<(), StoreError> {
    let columns = [
        format!("`{COLUMN_ID}` INTEGER PRIMARY KEY"),
        format!("`{COLUMN_KEY}` TEXT NOT NULL"),
        format!("`{COLUMN_SCOPE}` TEXT NOT NULL"),
        format!("`{COLUMN_TYPE}` INTEGER NOT NULL"),
        format!("`{COLUMN_INSERTED_AT}` REAL NOT NULL"),
        format!("`{COLUMN_LAST_READ_AT}` REAL"),
        format!("`{COLUMN_STRING}` TEXT"),
        format!("`{COLUMN_DOUBLE}` REAL"),
        format!("`{COLUMN_INTEGER}` INTEGER"),
        format!("`{COLUMN_BLOB}` BLOB"),
        format!("UNIQUE(`{COLUMN_KEY}`, `{COLUMN_SCOPE}`) ON CONFLICT REPLACE"),
    ];

    db.execute_update(&Query::from(format!(
        "CREATE TABLE IF NOT EXISTS `{TABLE_NAME}` ({});",
        columns.join(", ")
    )))?;

    for (index, column) in [
        (INDEX_TYPE, COLUMN_TYPE),
        (INDEX_KEY, COLUMN_KEY),
        (INDEX_SCOPE, COLUMN_SCOPE),
    ] {
        db.execute_update(&Query::from(format!(
            "CREATE INDEX IF NOT EXISTS `{index}` ON `{TABLE_NAME}` (`{column}`);"
        )))?;
    }

    Ok(())
}

fn identity(key: &str, scope: Option<&str>) -> (String, String) {
    (normalize(key), normalize(scope.unwrap_or(DEFAULT_SCOPE)))
}

fn timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}
