//! Shared table store integration tests.
//!
//! Tests the TableStore interface against all implementations.
//! Each implementation module imports these test functions and runs them.

pub mod table_store_tests;
