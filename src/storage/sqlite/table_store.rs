//! SQLite TableStore implementation.

use std::collections::BTreeMap;

use async_trait::async_trait;
use sea_query::{Alias, Expr, Order, Query, SqliteQueryBuilder};
use sqlx::{Row, SqlitePool};

use crate::storage::schema::{create_records_table, Records};
use crate::storage::{RecordResult, Result, StorageError, TableRecord, TableStore};

/// SQLite implementation of TableStore.
///
/// Properties are stored as a JSON object in a single text column.
pub struct SqliteTableStore {
    pool: SqlitePool,
    table: String,
}

impl SqliteTableStore {
    /// Create a new SQLite table store over `table`.
    pub fn new(pool: SqlitePool, table: &str) -> Self {
        Self {
            pool,
            table: table.to_string(),
        }
    }

    fn table(&self) -> Alias {
        Alias::new(self.table.as_str())
    }

    /// Decode one row. A bad properties column fails only this record.
    fn decode(partition_key: &str, sort_key: String, raw: &str) -> RecordResult {
        match serde_json::from_str::<BTreeMap<String, String>>(raw) {
            Ok(properties) => Ok(TableRecord {
                partition_key: partition_key.to_string(),
                sort_key,
                properties,
            }),
            Err(e) => Err(StorageError::MalformedRecord {
                sort_key,
                reason: format!("properties: {}", e),
            }),
        }
    }
}

#[async_trait]
impl TableStore for SqliteTableStore {
    async fn create_if_absent(&self) -> Result<()> {
        sqlx::query(&create_records_table(&self.table))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert(&self, record: TableRecord) -> Result<()> {
        let properties = serde_json::to_string(&record.properties).map_err(|e| {
            StorageError::MalformedRecord {
                sort_key: record.sort_key.clone(),
                reason: e.to_string(),
            }
        })?;

        let query = Query::insert()
            .into_table(self.table())
            .columns([Records::PartitionKey, Records::SortKey, Records::Properties])
            .values_panic([
                record.partition_key.as_str().into(),
                record.sort_key.as_str().into(),
                properties.into(),
            ])
            .to_string(SqliteQueryBuilder);

        match sqlx::query(&query).execute(&self.pool).await {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StorageError::DuplicateKey {
                    partition_key: record.partition_key,
                    sort_key: record.sort_key,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn query_partition(
        &self,
        partition_key: &str,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<RecordResult>> {
        let query = {
            let mut select = Query::select();
            select
                .columns([Records::SortKey, Records::Properties])
                .from(self.table())
                .and_where(Expr::col(Records::PartitionKey).eq(partition_key));
            if let Some(after) = after {
                select.and_where(Expr::col(Records::SortKey).gt(after));
            }
            select
                .order_by(Records::SortKey, Order::Asc)
                .limit(limit as u64)
                .to_string(SqliteQueryBuilder)
        };

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let sort_key: String = row.try_get("sort_key")?;
            let raw: String = row.try_get("properties")?;
            records.push(Self::decode(partition_key, sort_key, &raw));
        }
        Ok(records)
    }
}
