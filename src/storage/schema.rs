//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query building.

use sea_query::{Alias, ColumnDef, Iden, Index, SqliteQueryBuilder, Table};

/// Chat record table schema.
///
/// The table name is configurable, so queries use an `Alias` for the table
/// and these identifiers for the columns.
#[derive(Iden)]
pub enum Records {
    #[iden = "partition_key"]
    PartitionKey,
    #[iden = "sort_key"]
    SortKey,
    #[iden = "properties"]
    Properties,
}

/// Work queue table schema. One table holds every named queue.
#[derive(Iden)]
pub enum QueueMessages {
    Table,
    #[iden = "queue"]
    Queue,
    #[iden = "id"]
    Id,
    #[iden = "payload"]
    Payload,
    #[iden = "visible_at"]
    VisibleAt,
    #[iden = "dequeue_count"]
    DequeueCount,
    #[iden = "receipt"]
    Receipt,
}

/// Build the CREATE TABLE statement for a record table.
pub fn create_records_table(table: &str) -> String {
    Table::create()
        .table(Alias::new(table))
        .if_not_exists()
        .col(ColumnDef::new(Records::PartitionKey).text().not_null())
        .col(ColumnDef::new(Records::SortKey).text().not_null())
        .col(ColumnDef::new(Records::Properties).text().not_null())
        .primary_key(
            Index::create()
                .col(Records::PartitionKey)
                .col(Records::SortKey),
        )
        .to_string(SqliteQueryBuilder)
}

/// SQL for creating the work queue table.
pub const CREATE_QUEUE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS queue_messages (
    queue TEXT NOT NULL,
    id TEXT NOT NULL,
    payload TEXT NOT NULL,
    visible_at INTEGER NOT NULL,
    dequeue_count INTEGER NOT NULL DEFAULT 0,
    receipt TEXT,
    PRIMARY KEY (queue, id)
);

CREATE INDEX IF NOT EXISTS idx_queue_messages_visible ON queue_messages(queue, visible_at);
"#;
