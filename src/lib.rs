//! A thread-safe, typed key/value store persisted through SQLite.
//!
//! ```rust
//! use shelf::{Store, StoreConfig};
//!
//! let store = Store::new(StoreConfig::memory());
//! store.open().unwrap();
//!
//! store.set_integer(3, "retries", Some("network")).unwrap();
//! assert_eq!(store.integer("Retries", Some("Network")), 3);
//! ```
pub mod codec;
pub mod config;
pub mod lock;
pub mod normalize;
pub mod storage;
pub mod store;

pub use codec::{BincodeCodec, CodecError, ObjectCodec};
pub use config::StoreConfig;
pub use storage::{Database, Query, Row, Value, ValueType, error::StoreError};
pub use store::{DEFAULT_SCOPE, Entry, Store};
