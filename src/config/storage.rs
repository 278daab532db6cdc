//! Table store configuration types.

use serde::Deserialize;

/// Default table name for chat records.
pub const DEFAULT_TABLE: &str = "chatmessages";

/// Storage type discriminator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    Memory,
    #[default]
    Sqlite,
    Dynamo,
}

/// Table store configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage type discriminator.
    #[serde(rename = "type")]
    pub storage_type: StorageType,
    /// Connection string. A SQLite URL for `sqlite`, an endpoint override
    /// for `dynamo` (empty uses the SDK default), ignored for `memory`.
    pub connection: String,
    /// Table holding the chat records.
    pub table: String,
    /// AWS region override for `dynamo`.
    pub region: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_type: StorageType::default(),
            connection: String::new(),
            table: DEFAULT_TABLE.to_string(),
            region: None,
        }
    }
}

impl StorageConfig {
    /// In-memory storage, used by tests and `Config::for_test`.
    pub fn memory() -> Self {
        Self {
            storage_type: StorageType::Memory,
            ..Default::default()
        }
    }
}
