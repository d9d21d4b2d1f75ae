//! SQLite-backed storage layer.
//!
//! The `storage` module owns everything that touches the native engine: the connection
//! lifecycle ([`Database`]), statement preparation and parameter binding ([`Query`],
//! [`Value`]), and row marshaling ([`ResultBuilder`](result::ResultBuilder)).
//!
//! # Overview
//!
//! A single native connection is held by a [`Database`] behind an exclusive lock. Every
//! statement is prepared, bound, stepped and finalized inside one locked section; no
//! statement handle outlives the call that created it. Query results are fully
//! materialized into [`Row`]s before the lock is released.
//!
//! # See Also
//! - [`Store`](crate::Store): The public key/value API built on this layer.
pub mod database;
pub mod query;
pub mod result;
pub mod value;

pub use database::Database;
pub use query::Query;
pub use result::Row;
pub use value::{Value, ValueType};

pub mod header {
    pub mod table {
        pub(crate) const TABLE_NAME: &str = "store_1";

        pub(crate) const COLUMN_ID: &str = "id";
        pub(crate) const COLUMN_KEY: &str = "key";
        pub(crate) const COLUMN_SCOPE: &str = "scope";
        pub(crate) const COLUMN_TYPE: &str = "type";
        pub(crate) const COLUMN_INSERTED_AT: &str = "inserted_at";
        pub(crate) const COLUMN_LAST_READ_AT: &str = "last_read_at";

        pub(crate) const COLUMN_STRING: &str = "str";
        pub(crate) const COLUMN_DOUBLE: &str = "dbl";
        pub(crate) const COLUMN_INTEGER: &str = "itg";
        pub(crate) const COLUMN_BLOB: &str = "dat";

        pub(crate) const INDEX_TYPE: &str = "store_1_type_idx";
        pub(crate) const INDEX_KEY: &str = "store_1_key_idx";
        pub(crate) const INDEX_SCOPE: &str = "store_1_scp_idx";
    }

    pub mod path {
        pub(crate) const MEMORY_PATH: &str = ":memory:";
        pub(crate) const DATABASE_NAME: &str = "shelf-1.sqlite";
    }
}

pub mod error {
    use std::io;

    use thiserror::Error;

    use crate::{codec::CodecError, storage::ValueType};

    #[derive(Debug, Error)]
    pub enum StoreError {
        #[error("store is not open")]
        Unopened,

        #[error("unable to resolve a directory for the persistent store")]
        MissingPath,

        #[error("[open][{path}]: {source}")]
        Open {
            path: String,
            #[source]
            source: rusqlite::Error,
        },

        #[error("[close][{path}]: {source}")]
        Close {
            path: String,
            #[source]
            source: rusqlite::Error,
        },

        #[error("[engine][{action}]: {source}")]
        Engine {
            action: &'static str,
            #[source]
            source: rusqlite::Error,
        },

        #[error("[statement] failed to prepare '{sql}': {source}")]
        Statement {
            sql: String,
            #[source]
            source: rusqlite::Error,
        },

        #[error("[statement] expected {expected} arguments, received {actual}")]
        ArgCountMismatch { expected: usize, actual: usize },

        #[error("[bind][parameter {index}]: {source}")]
        Bind {
            index: usize,
            #[source]
            source: rusqlite::Error,
        },

        #[error("no value for key '{key}' in scope '{scope}'")]
        NotFound {
            key: String,
            scope: String,
            value_type: Option<ValueType>,
        },

        #[error("matched entry has no valid id")]
        InvalidId,

        #[error("[row] stepped row has no data")]
        NullDataInRow,

        #[error("[row] no name for column {index}")]
        UnknownColumnName { index: usize },

        #[error("[row] name of column {index} is not valid text")]
        UnknownColumnFmt { index: usize },

        #[error("[row] column '{column}' has an unknown storage class")]
        UnknownType { column: String },

        #[error("[row] unable to read blob in column '{column}'")]
        BlobReadFailure { column: String },

        #[error("[row] unable to read text in column '{column}'")]
        StringReadFailure { column: String },

        #[error("[row] text in column '{column}' is not valid utf-8")]
        StringConvertFailure { column: String },

        #[error("null values can not be stored")]
        NullValue,

        #[error("NaN can not be stored")]
        NotANumber,

        #[error("store io error: {0}")]
        Io(#[from] io::Error),

        #[error(transparent)]
        Codec(#[from] CodecError),
    }

    impl StoreError {
        pub(crate) fn engine(action: &'static str) -> impl FnOnce(rusqlite::Error) -> Self {
            move |source| StoreError::Engine { action, source }
        }

        /// Stable numeric code for the error kind. Engine-level failures report `0`;
        /// their native status is available from [`StoreError::engine_code`].
        pub fn code(&self) -> u32 {
            match self {
                StoreError::MissingPath => 1,
                StoreError::Unopened => 2,
                StoreError::Statement { .. } => 3,
                StoreError::ArgCountMismatch { .. } => 4,
                StoreError::NotFound { .. } => 5,
                StoreError::InvalidId => 6,
                StoreError::NullDataInRow => 7,
                StoreError::UnknownColumnName { .. } => 8,
                StoreError::UnknownColumnFmt { .. } => 9,
                StoreError::UnknownType { .. } => 10,
                StoreError::BlobReadFailure { .. } => 11,
                StoreError::StringReadFailure { .. } => 12,
                StoreError::StringConvertFailure { .. } => 13,
                _ => 0,
            }
        }

        /// Extended SQLite result code reported by the engine, if any.
        pub fn engine_code(&self) -> Option<i32> {
            match self {
                StoreError::Open { source, .. }
                | StoreError::Close { source, .. }
                | StoreError::Engine { source, .. }
                | StoreError::Statement { source, .. }
                | StoreError::Bind { source, .. } => match source {
                    rusqlite::Error::SqliteFailure(err, _) => Some(err.extended_code),
                    _ => None,
                },
                _ => None,
            }
        }

        pub fn is_not_found(&self) -> bool {
            matches!(self, StoreError::NotFound { .. })
        }
    }
}
