//! TableStore interface tests.
//!
//! These tests verify the contract of the TableStore trait.
//! Each storage implementation should run these tests.

use chrono::{Duration, TimeZone, Utc};
use futures::TryStreamExt;
use std::sync::Arc;
use uuid::Uuid;

use chat_relay::repository::ChatMessageRepository;
use chat_relay::storage::keys::encode_sort_key;
use chat_relay::storage::{TableRecord, TableStore};
use chat_relay::ChatMessage;

/// Create a record with a fresh partition-local sort key.
pub fn make_record(partition: &str, sort_key: &str, body: &str) -> TableRecord {
    TableRecord::new(partition, sort_key)
        .with_property("author", "tester")
        .with_property("body", body)
}

/// Read one page, failing the test on any undecodable row.
pub async fn read_page<S: TableStore + ?Sized>(
    store: &S,
    partition: &str,
    after: Option<&str>,
    limit: usize,
) -> Vec<TableRecord> {
    store
        .query_partition(partition, after, limit)
        .await
        .expect("query should succeed")
        .into_iter()
        .collect::<Result<_, _>>()
        .expect("every row should decode")
}

/// Unique partition per test so backends can be shared between tests.
pub fn partition(name: &str) -> String {
    format!("test_{}_{}", name, Uuid::new_v4())
}

// =============================================================================
// TableStore::create_if_absent tests
// =============================================================================

pub async fn test_create_is_idempotent<S: TableStore>(store: &S) {
    store
        .create_if_absent()
        .await
        .expect("first create should succeed");
    store
        .create_if_absent()
        .await
        .expect("second create should succeed");
}

// =============================================================================
// TableStore::insert tests
// =============================================================================

pub async fn test_insert_and_read_back<S: TableStore>(store: &S) {
    let partition = partition("insert");
    store
        .insert(make_record(&partition, "k1", "hello. world"))
        .await
        .expect("insert should succeed");

    let page = read_page(store, &partition, None, 10).await;
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].partition_key, partition);
    assert_eq!(page[0].sort_key, "k1");
    assert_eq!(page[0].property("body"), Some("hello. world"));
    assert_eq!(page[0].property("author"), Some("tester"));
}

pub async fn test_insert_duplicate_is_rejected<S: TableStore>(store: &S) {
    let partition = partition("duplicate");
    store
        .insert(make_record(&partition, "k1", "first"))
        .await
        .expect("insert should succeed");

    let err = store
        .insert(make_record(&partition, "k1", "second"))
        .await
        .expect_err("duplicate insert should fail");
    assert!(err.is_conflict(), "expected DuplicateKey, got {err:?}");

    let page = read_page(store, &partition, None, 10).await;
    assert_eq!(page.len(), 1, "duplicate must not add a record");
    assert_eq!(page[0].property("body"), Some("first"), "duplicate must not overwrite");
}

pub async fn test_concurrent_duplicate_inserts_store_one<S: TableStore>(store: &S) {
    let partition = partition("race");
    let attempts = (0..8).map(|i| store.insert(make_record(&partition, "k1", &i.to_string())));
    let results = futures::future::join_all(attempts).await;

    let stored = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(stored, 1, "exactly one concurrent insert wins");
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| e.is_conflict()));

    let page = read_page(store, &partition, None, 10).await;
    assert_eq!(page.len(), 1);
}

pub async fn test_same_sort_key_in_other_partition<S: TableStore>(store: &S) {
    let a = partition("iso_a");
    let b = partition("iso_b");
    store.insert(make_record(&a, "k1", "a")).await.unwrap();
    store
        .insert(make_record(&b, "k1", "b"))
        .await
        .expect("same sort key in another partition should succeed");

    let page = read_page(store, &a, None, 10).await;
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].property("body"), Some("a"));
}

// =============================================================================
// TableStore::query_partition tests
// =============================================================================

pub async fn test_query_ascends_by_sort_key<S: TableStore>(store: &S) {
    let partition = partition("order");
    for key in ["k3", "k1", "k5", "k2", "k4"] {
        store.insert(make_record(&partition, key, key)).await.unwrap();
    }

    let page = read_page(store, &partition, None, 10).await;
    let keys: Vec<_> = page.iter().map(|r| r.sort_key.as_str()).collect();
    assert_eq!(keys, ["k1", "k2", "k3", "k4", "k5"]);
}

pub async fn test_query_after_and_limit<S: TableStore>(store: &S) {
    let partition = partition("paging");
    for key in ["k1", "k2", "k3", "k4", "k5"] {
        store.insert(make_record(&partition, key, key)).await.unwrap();
    }

    let first = read_page(store, &partition, None, 2).await;
    assert_eq!(first.len(), 2);
    assert_eq!(first[1].sort_key, "k2");

    let second = read_page(store, &partition, Some("k2"), 2).await;
    let keys: Vec<_> = second.iter().map(|r| r.sort_key.as_str()).collect();
    assert_eq!(keys, ["k3", "k4"]);

    let last = read_page(store, &partition, Some("k4"), 2).await;
    assert_eq!(last.len(), 1, "short page means exhausted");

    let none = read_page(store, &partition, Some("k5"), 2).await;
    assert!(none.is_empty());
}

pub async fn test_query_unknown_partition_is_empty<S: TableStore>(store: &S) {
    let page = read_page(store, &partition("missing"), None, 10).await;
    assert!(page.is_empty());
}

pub async fn test_encoded_keys_sort_chronologically<S: TableStore>(store: &S) {
    let partition = partition("chrono");
    let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let instants = [
        t0 + Duration::seconds(1),
        t0 - Duration::days(20_000),
        t0,
        t0 + Duration::nanoseconds(1),
        t0 + Duration::days(365),
    ];

    for (i, at) in instants.iter().enumerate() {
        let key = encode_sort_key(at, Uuid::new_v4());
        store
            .insert(make_record(&partition, &key, &i.to_string()))
            .await
            .unwrap();
    }

    let page = read_page(store, &partition, None, 10).await;
    let order: Vec<_> = page.iter().filter_map(|r| r.property("body")).collect();
    assert_eq!(order, ["1", "2", "3", "0", "4"]);
}

// =============================================================================
// Repository over TableStore
// =============================================================================

pub async fn test_repository_round_trip<S: TableStore + 'static>(store: Arc<S>) {
    let repository = ChatMessageRepository::with_page_size(store, 3);
    let channel = Uuid::new_v4();
    let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

    let messages: Vec<_> = (0..7)
        .map(|i| {
            ChatMessage::at(
                channel,
                Uuid::new_v4(),
                t0 + Duration::milliseconds(i * 250) + Duration::nanoseconds(7),
                format!("user{i}"),
                format!("message {i}"),
            )
        })
        .collect();

    for m in messages.iter().rev() {
        repository.append(m).await.unwrap();
    }
    assert!(repository.append(&messages[0]).await.unwrap_err().is_conflict());

    let history: Vec<_> = repository.history(channel).try_collect().await.unwrap();
    assert_eq!(history, messages);

    let tail: Vec<_> = repository
        .tail_after(channel, Some(messages[4].message_id))
        .try_collect()
        .await
        .unwrap();
    assert_eq!(tail, messages[5..]);
}

/// Appends of one message from parallel tasks leave exactly one record.
pub async fn test_parallel_duplicate_appends<S: TableStore + 'static>(store: Arc<S>) {
    let repository = ChatMessageRepository::new(store);
    let message = ChatMessage::new(Uuid::new_v4(), "tester", "only once");

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let repository = repository.clone();
            let message = message.clone();
            tokio::spawn(async move { repository.append(&message).await })
        })
        .collect();

    let mut stored = 0;
    for task in tasks {
        match task.await.expect("append task panicked") {
            Ok(()) => stored += 1,
            Err(e) => assert!(e.is_conflict(), "expected DuplicateKey, got {e:?}"),
        }
    }
    assert_eq!(stored, 1);

    let history: Vec<_> = repository
        .history(message.channel_id)
        .try_collect()
        .await
        .unwrap();
    assert_eq!(history, vec![message]);
}

/// Macro to run all TableStore tests against a store instance.
#[macro_export]
macro_rules! run_table_store_tests {
    ($store:expr) => {
        use $crate::storage::table_store_tests::*;

        test_create_is_idempotent($store).await;
        println!("  test_create_is_idempotent: PASSED");

        test_insert_and_read_back($store).await;
        println!("  test_insert_and_read_back: PASSED");

        test_insert_duplicate_is_rejected($store).await;
        println!("  test_insert_duplicate_is_rejected: PASSED");

        test_concurrent_duplicate_inserts_store_one($store).await;
        println!("  test_concurrent_duplicate_inserts_store_one: PASSED");

        test_same_sort_key_in_other_partition($store).await;
        println!("  test_same_sort_key_in_other_partition: PASSED");

        test_query_ascends_by_sort_key($store).await;
        println!("  test_query_ascends_by_sort_key: PASSED");

        test_query_after_and_limit($store).await;
        println!("  test_query_after_and_limit: PASSED");

        test_query_unknown_partition_is_empty($store).await;
        println!("  test_query_unknown_partition_is_empty: PASSED");

        test_encoded_keys_sort_chronologically($store).await;
        println!("  test_encoded_keys_sort_chronologically: PASSED");
    };
}
