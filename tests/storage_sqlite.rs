//! SQLite table store integration tests.
//!
//! Run with: cargo test --test storage_sqlite --features sqlite
//!
//! Uses in-memory database by default, no external dependencies required.

mod storage;

use std::sync::Arc;

use futures::StreamExt;
use uuid::Uuid;

use chat_relay::config::CursorMode;
use chat_relay::repository::ChatMessageRepository;
use chat_relay::storage::{sqlite, SqliteTableStore, TableStore};
use chat_relay::tail::TailReader;
use chat_relay::{channel_id_for_name, ChatMessage};

/// Get SQLite connection string (in-memory for tests)
fn sqlite_uri() -> String {
    std::env::var("SQLITE_URI").unwrap_or_else(|_| "sqlite::memory:".to_string())
}

async fn connect() -> SqliteTableStore {
    let pool = sqlite::connect(&sqlite_uri())
        .await
        .expect("Failed to connect to SQLite");
    let store = SqliteTableStore::new(pool, "chatmessages");
    store
        .create_if_absent()
        .await
        .expect("Failed to create table");
    store
}

#[tokio::test]
async fn test_sqlite_table_store() {
    println!("=== SQLite TableStore Tests ===");
    println!("Connecting to: {}", sqlite_uri());

    let store = connect().await;
    run_table_store_tests!(&store);

    println!("=== All SQLite TableStore tests PASSED ===");
}

#[tokio::test]
async fn test_sqlite_repository() {
    storage::table_store_tests::test_repository_round_trip(Arc::new(connect().await)).await;
}

#[tokio::test]
async fn test_sqlite_file_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite:{}", dir.path().join("chat.db").display());

    {
        let pool = sqlite::connect(&url).await.unwrap();
        let store = SqliteTableStore::new(pool.clone(), "chatmessages");
        store.create_if_absent().await.unwrap();
        store
            .insert(storage::table_store_tests::make_record("p", "k1", "kept"))
            .await
            .unwrap();
        pool.close().await;
    }

    let pool = sqlite::connect(&url).await.unwrap();
    let store = SqliteTableStore::new(pool, "chatmessages");
    store.create_if_absent().await.unwrap();
    let page = storage::table_store_tests::read_page(&store, "p", None, 10).await;
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].property("body"), Some("kept"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sqlite_parallel_duplicate_appends() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite:{}", dir.path().join("race.db").display());
    let store = SqliteTableStore::new(sqlite::connect(&url).await.unwrap(), "chatmessages");
    store.create_if_absent().await.unwrap();

    storage::table_store_tests::test_parallel_duplicate_appends(Arc::new(store)).await;
}

fn bodies(messages: &[ChatMessage]) -> Vec<&str> {
    messages.iter().map(|m| m.body.as_str()).collect()
}

#[tokio::test]
async fn test_sqlite_damaged_row_is_skipped() {
    let pool = sqlite::connect("sqlite::memory:").await.unwrap();
    let store = Arc::new(SqliteTableStore::new(pool.clone(), "chatmessages"));
    store.create_if_absent().await.unwrap();
    // Small pages so the damaged row sits at a page boundary.
    let repository = ChatMessageRepository::with_page_size(store, 3);

    let channel = channel_id_for_name("damaged");
    let t0 = chrono::Utc::now();
    let all: Vec<_> = (0..5)
        .map(|i| {
            ChatMessage::at(
                channel,
                Uuid::new_v4(),
                t0 + chrono::Duration::milliseconds(i),
                "tester",
                format!("m{i}"),
            )
        })
        .collect();

    repository.append(&all[0]).await.unwrap();
    let mut readers = Vec::new();
    for mode in [CursorMode::MessageId, CursorMode::SortKey] {
        let mut reader = TailReader::new(repository.clone(), channel)
            .with_history(1)
            .with_cursor_mode(mode);
        assert_eq!(bodies(&reader.catch_up().await.unwrap()), ["m0"]);
        readers.push(reader);
    }

    for m in &all[1..] {
        repository.append(m).await.unwrap();
    }
    let damaged = ChatMessageRepository::to_record(&all[2]).sort_key;
    let result = sqlx::query("UPDATE chatmessages SET properties = 'not json' WHERE sort_key = ?")
        .bind(damaged.as_str())
        .execute(&pool)
        .await
        .unwrap();
    assert_eq!(result.rows_affected(), 1);

    let items: Vec<_> = repository.history(channel).collect().await;
    assert_eq!(items.len(), 5);
    let err = items[2].as_ref().unwrap_err();
    assert!(err.is_corruption(), "expected corruption, got {err:?}");
    assert_eq!(err.sort_key(), Some(damaged.as_str()));
    let readable: Vec<_> = items.into_iter().filter_map(Result::ok).collect();
    assert_eq!(bodies(&readable), ["m0", "m1", "m3", "m4"]);

    let latest = repository.latest(channel, 10).await.unwrap();
    assert_eq!(bodies(&latest), ["m0", "m1", "m3", "m4"]);

    let mut fresh = TailReader::new(repository.clone(), channel).with_history(3);
    assert_eq!(bodies(&fresh.catch_up().await.unwrap()), ["m1", "m3", "m4"]);

    // Live tails in both cursor modes read past the damaged row.
    for reader in &mut readers {
        assert_eq!(bodies(&reader.poll().await.unwrap()), ["m1", "m3", "m4"]);
        assert!(reader.poll().await.unwrap().is_empty());
    }
}
