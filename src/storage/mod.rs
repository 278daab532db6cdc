//! Table storage implementations.
//!
//! A table store holds records addressed by a `(partition_key, sort_key)`
//! pair and can only range-scan a single partition in ascending sort-key
//! order. The chat log is built entirely on that primitive; see [`keys`]
//! for how message order is encoded into the sort key.

use std::sync::Arc;

use tracing::{error, info};

use crate::config::{StorageConfig, StorageType};

pub mod keys;
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod schema;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "dynamo")]
pub mod dynamo;

mod table_store;

pub use memory::MemoryTableStore;
pub use table_store::{RecordResult, TableRecord, TableStore};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteTableStore;

#[cfg(feature = "dynamo")]
pub use dynamo::DynamoTableStore;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Duplicate key: partition={partition_key}, sort={sort_key}")]
    DuplicateKey {
        partition_key: String,
        sort_key: String,
    },

    #[error("Malformed sort key: {0:?}")]
    MalformedKey(String),

    #[error("Malformed record {sort_key:?}: {reason}")]
    MalformedRecord { sort_key: String, reason: String },

    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// How callers should react to a [`StorageError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Availability problem. Retry with backoff.
    Transient,
    /// Insert collided with an existing key. The write already happened.
    Conflict,
    /// Stored data cannot be decoded. Log it and skip the record.
    Corruption,
}

impl StorageError {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::Unavailable(_) => ErrorKind::Transient,
            StorageError::DuplicateKey { .. } => ErrorKind::Conflict,
            StorageError::MalformedKey(_) | StorageError::MalformedRecord { .. } => {
                ErrorKind::Corruption
            }
            #[cfg(feature = "sqlite")]
            StorageError::Database(_) => ErrorKind::Transient,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }

    pub fn is_corruption(&self) -> bool {
        self.kind() == ErrorKind::Corruption
    }

    /// Sort key of the record a corruption error refers to.
    pub fn sort_key(&self) -> Option<&str> {
        match self {
            StorageError::MalformedKey(key) => Some(key),
            StorageError::MalformedRecord { sort_key, .. } => Some(sort_key),
            _ => None,
        }
    }
}

/// Initialize the table store based on configuration.
///
/// The returned store has not had `create_if_absent` called on it yet.
pub async fn init_storage(
    config: &StorageConfig,
) -> std::result::Result<Arc<dyn TableStore>, Box<dyn std::error::Error>> {
    info!(storage_type = ?config.storage_type, table = %config.table, "Storage");

    match config.storage_type {
        StorageType::Memory => Ok(Arc::new(MemoryTableStore::new())),
        #[cfg(feature = "sqlite")]
        StorageType::Sqlite => {
            let pool = sqlite::connect(&config.connection).await?;
            Ok(Arc::new(SqliteTableStore::new(pool, &config.table)))
        }
        #[cfg(not(feature = "sqlite"))]
        StorageType::Sqlite => {
            error!("SQLite storage requested but 'sqlite' feature is not enabled");
            Err("SQLite feature not enabled".into())
        }
        #[cfg(feature = "dynamo")]
        StorageType::Dynamo => {
            let store = DynamoTableStore::connect(
                &config.connection,
                config.region.as_deref(),
                &config.table,
            )
            .await;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "dynamo"))]
        StorageType::Dynamo => {
            error!("DynamoDB storage requested but 'dynamo' feature is not enabled");
            Err("DynamoDB feature not enabled".into())
        }
    }
}
