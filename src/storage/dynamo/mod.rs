//! DynamoDB storage implementations.

mod table_store;

pub use table_store::DynamoTableStore;
