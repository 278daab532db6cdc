//! DynamoDB TableStore implementation.
//!
//! Table schema:
//! - PartitionKey: channel partition (String, HASH)
//! - RowKey: message sort key (String, RANGE)
//! - one String attribute per record property

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, BillingMode, KeySchemaElement, KeyType,
    ScalarAttributeType,
};
use aws_sdk_dynamodb::Client;
use tracing::{debug, info};

use crate::storage::{RecordResult, Result, StorageError, TableRecord, TableStore};

const PARTITION_KEY: &str = "PartitionKey";
const ROW_KEY: &str = "RowKey";

/// DynamoDB implementation of TableStore.
pub struct DynamoTableStore {
    client: Client,
    table_name: String,
}

impl DynamoTableStore {
    /// Create a new DynamoDB table store.
    ///
    /// An empty `endpoint_url` uses the SDK's default endpoint resolution.
    pub async fn connect(endpoint_url: &str, region: Option<&str>, table_name: &str) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region.to_string()));
        }
        let config = loader.load().await;

        let client = if endpoint_url.is_empty() {
            Client::new(&config)
        } else {
            let dynamo_config = aws_sdk_dynamodb::config::Builder::from(&config)
                .endpoint_url(endpoint_url)
                .build();
            Client::from_conf(dynamo_config)
        };

        info!(table = %table_name, "Connected to DynamoDB for chat records");

        Self {
            client,
            table_name: table_name.to_string(),
        }
    }

    fn key_element(name: &str, key_type: KeyType) -> Result<KeySchemaElement> {
        KeySchemaElement::builder()
            .attribute_name(name)
            .key_type(key_type)
            .build()
            .map_err(|e| StorageError::Unavailable(format!("DynamoDB key schema: {}", e)))
    }

    fn string_attribute(name: &str) -> Result<AttributeDefinition> {
        AttributeDefinition::builder()
            .attribute_name(name)
            .attribute_type(ScalarAttributeType::S)
            .build()
            .map_err(|e| StorageError::Unavailable(format!("DynamoDB attribute: {}", e)))
    }

    fn to_record(
        partition_key: &str,
        item: HashMap<String, AttributeValue>,
    ) -> Result<TableRecord> {
        let mut sort_key = None;
        let mut properties = BTreeMap::new();
        for (name, value) in item {
            let AttributeValue::S(s) = value else {
                continue;
            };
            if name == ROW_KEY {
                sort_key = Some(s);
            } else if name != PARTITION_KEY {
                properties.insert(name, s);
            }
        }

        let sort_key = sort_key.ok_or_else(|| StorageError::MalformedRecord {
            sort_key: String::new(),
            reason: "item has no string RowKey".to_string(),
        })?;

        Ok(TableRecord {
            partition_key: partition_key.to_string(),
            sort_key,
            properties,
        })
    }
}

#[async_trait]
impl TableStore for DynamoTableStore {
    async fn create_if_absent(&self) -> Result<()> {
        let result = self
            .client
            .create_table()
            .table_name(&self.table_name)
            .key_schema(Self::key_element(PARTITION_KEY, KeyType::Hash)?)
            .key_schema(Self::key_element(ROW_KEY, KeyType::Range)?)
            .attribute_definitions(Self::string_attribute(PARTITION_KEY)?)
            .attribute_definitions(Self::string_attribute(ROW_KEY)?)
            .billing_mode(BillingMode::PayPerRequest)
            .send()
            .await;

        match result {
            Ok(_) => {
                info!(table = %self.table_name, "Created DynamoDB table");
                Ok(())
            }
            Err(e)
                if e
                    .as_service_error()
                    .map(|se| se.is_resource_in_use_exception())
                    .unwrap_or(false) =>
            {
                debug!(table = %self.table_name, "DynamoDB table already exists");
                Ok(())
            }
            Err(e) => Err(StorageError::Unavailable(format!(
                "DynamoDB create_table failed: {}",
                e
            ))),
        }
    }

    async fn insert(&self, record: TableRecord) -> Result<()> {
        let mut item: HashMap<String, AttributeValue> = record
            .properties
            .iter()
            .map(|(name, value)| (name.clone(), AttributeValue::S(value.clone())))
            .collect();
        item.insert(
            PARTITION_KEY.to_string(),
            AttributeValue::S(record.partition_key.clone()),
        );
        item.insert(
            ROW_KEY.to_string(),
            AttributeValue::S(record.sort_key.clone()),
        );

        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(#sk)")
            .expression_attribute_names("#sk", ROW_KEY)
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e)
                if e
                    .as_service_error()
                    .map(|se| se.is_conditional_check_failed_exception())
                    .unwrap_or(false) =>
            {
                Err(StorageError::DuplicateKey {
                    partition_key: record.partition_key,
                    sort_key: record.sort_key,
                })
            }
            Err(e) => Err(StorageError::Unavailable(format!(
                "DynamoDB put_item failed: {}",
                e
            ))),
        }
    }

    async fn query_partition(
        &self,
        partition_key: &str,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<RecordResult>> {
        let key_condition = if after.is_some() {
            "#pk = :pk AND #sk > :after"
        } else {
            "#pk = :pk"
        };

        let mut records = Vec::with_capacity(limit);
        let mut start_key = None;

        // DynamoDB may return short pages before the partition is exhausted,
        // so keep following LastEvaluatedKey until the page is full.
        while records.len() < limit {
            let remaining = i32::try_from(limit - records.len()).unwrap_or(i32::MAX);

            let mut query = self
                .client
                .query()
                .table_name(&self.table_name)
                .key_condition_expression(key_condition)
                .expression_attribute_names("#pk", PARTITION_KEY)
                .expression_attribute_values(":pk", AttributeValue::S(partition_key.to_string()))
                .scan_index_forward(true)
                .limit(remaining)
                .set_exclusive_start_key(start_key.take());
            if let Some(after) = after {
                query = query
                    .expression_attribute_names("#sk", ROW_KEY)
                    .expression_attribute_values(":after", AttributeValue::S(after.to_string()));
            }

            let output = query.send().await.map_err(|e| {
                StorageError::Unavailable(format!("DynamoDB query failed: {}", e))
            })?;

            for item in output.items.unwrap_or_default() {
                records.push(Self::to_record(partition_key, item));
            }

            match output.last_evaluated_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => break,
            }
        }

        debug!(
            partition = %partition_key,
            count = records.len(),
            "Queried DynamoDB partition"
        );

        records.truncate(limit);
        Ok(records)
    }
}
