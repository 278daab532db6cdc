//! TableStore trait definition.

use std::collections::BTreeMap;

use async_trait::async_trait;

use super::Result;

/// A single stored record.
///
/// Properties are flat string attributes; the table store treats them as
/// opaque and never queries by them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRecord {
    pub partition_key: String,
    pub sort_key: String,
    pub properties: BTreeMap<String, String>,
}

impl TableRecord {
    pub fn new(partition_key: impl Into<String>, sort_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key: sort_key.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Builder-style property setter.
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }
}

/// One row of a partition scan.
///
/// A row that cannot be decoded is reported on its own, as a corruption
/// error carrying its sort key, so the rest of the page stays readable.
pub type RecordResult = Result<TableRecord>;

/// Interface for a partitioned, sort-key-ordered record store.
///
/// The `(partition_key, sort_key)` pair is the unique key. The only query
/// is a forward range scan inside one partition.
///
/// Implementations:
/// - `MemoryTableStore`: In-memory store for tests and local runs
/// - `SqliteTableStore`: SQLite storage
/// - `DynamoTableStore`: DynamoDB storage
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Create the backing table if it does not exist. Idempotent.
    async fn create_if_absent(&self) -> Result<()>;

    /// Insert a new record.
    ///
    /// Never overwrites: fails with `StorageError::DuplicateKey` when the
    /// key already exists. Concurrent inserts of the same key resolve to
    /// exactly one stored record.
    async fn insert(&self, record: TableRecord) -> Result<()>;

    /// Fetch one page of a partition in ascending sort-key order.
    ///
    /// Returns at most `limit` records whose sort key is strictly greater
    /// than `after` (or all records from the start when `after` is `None`).
    /// A page shorter than `limit` means the partition is exhausted.
    /// Undecodable rows count toward `limit` and come back as `Err` items;
    /// the outer `Err` means the query itself failed.
    async fn query_partition(
        &self,
        partition_key: &str,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<RecordResult>>;
}
