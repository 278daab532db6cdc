//! In-memory table store for tests and single-process runs.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{RecordResult, Result, StorageError, TableRecord, TableStore};

type Properties = BTreeMap<String, String>;

/// Table store that keeps every partition in a `BTreeMap` keyed by sort key.
#[derive(Default)]
pub struct MemoryTableStore {
    partitions: RwLock<HashMap<String, BTreeMap<String, Properties>>>,
    fail_on_insert: RwLock<bool>,
    fail_on_query: RwLock<bool>,
}

impl MemoryTableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_insert(&self, fail: bool) {
        *self.fail_on_insert.write().await = fail;
    }

    pub async fn set_fail_on_query(&self, fail: bool) {
        *self.fail_on_query.write().await = fail;
    }

    /// Number of records stored in a partition.
    pub async fn record_count(&self, partition_key: &str) -> usize {
        self.partitions
            .read()
            .await
            .get(partition_key)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl TableStore for MemoryTableStore {
    async fn create_if_absent(&self) -> Result<()> {
        Ok(())
    }

    async fn insert(&self, record: TableRecord) -> Result<()> {
        if *self.fail_on_insert.read().await {
            return Err(StorageError::Unavailable(
                "memory store insert disabled".to_string(),
            ));
        }

        let mut partitions = self.partitions.write().await;
        let partition = partitions.entry(record.partition_key.clone()).or_default();
        if partition.contains_key(&record.sort_key) {
            return Err(StorageError::DuplicateKey {
                partition_key: record.partition_key,
                sort_key: record.sort_key,
            });
        }
        partition.insert(record.sort_key, record.properties);
        Ok(())
    }

    async fn query_partition(
        &self,
        partition_key: &str,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<RecordResult>> {
        if *self.fail_on_query.read().await {
            return Err(StorageError::Unavailable(
                "memory store query disabled".to_string(),
            ));
        }

        let partitions = self.partitions.read().await;
        let Some(partition) = partitions.get(partition_key) else {
            return Ok(Vec::new());
        };

        let lower = match after {
            Some(after) => Bound::Excluded(after.to_string()),
            None => Bound::Unbounded,
        };

        Ok(partition
            .range((lower, Bound::Unbounded))
            .take(limit)
            .map(|(sort_key, properties)| {
                Ok(TableRecord {
                    partition_key: partition_key.to_string(),
                    sort_key: sort_key.clone(),
                    properties: properties.clone(),
                })
            })
            .collect())
    }
}
