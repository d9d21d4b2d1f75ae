//! Store configuration.
//!
//! A [`StoreConfig`] decides whether a store is persisted and where its database file
//! lives. Non-persistent stores use an in-memory engine instance that disappears when
//! the store is closed.
use std::path::PathBuf;

use crate::storage::{
    error::StoreError,
    header::path::{DATABASE_NAME, MEMORY_PATH},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    persistent: bool,
    directory: Option<PathBuf>,
    file_name: String,
}

impl StoreConfig {
    /// In-memory store.
    pub fn memory() -> Self {
        Self {
            persistent: false,
            directory: None,
            file_name: DATABASE_NAME.to_string(),
        }
    }

    /// Persistent store under the platform's application data directory.
    pub fn persistent() -> Self {
        Self {
            persistent: true,
            directory: None,
            file_name: DATABASE_NAME.to_string(),
        }
    }

    /// Persistent store under `directory`.
    pub fn persistent_in(directory: impl Into<PathBuf>) -> Self {
        Self {
            persistent: true,
            directory: Some(directory.into()),
            file_name: DATABASE_NAME.to_string(),
        }
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    /// Directory holding the database file of a persistent store.
    ///
    /// # Errors
    ///
    /// [`StoreError::MissingPath`] if the store is not persistent or no platform data
    /// directory can be found.
    pub fn directory(&self) -> Result<PathBuf, StoreError> {
        if !self.persistent {
            return Err(StoreError::MissingPath);
        }

        match &self.directory {
            Some(dir) => Ok(dir.clone()),
            None => directories::BaseDirs::new()
                .map(|dirs| dirs.data_dir().to_path_buf())
                .ok_or(StoreError::MissingPath),
        }
    }

    /// Path handed to the engine: the in-memory marker for non-persistent stores,
    /// otherwise the database file.
    pub fn database_path(&self) -> Result<PathBuf, StoreError> {
        if !self.persistent {
            return Ok(PathBuf::from(MEMORY_PATH));
        }
        Ok(self.directory()?.join(&self.file_name))
    }
}
