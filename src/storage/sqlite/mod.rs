//! SQLite implementations of storage interfaces.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::debug;

mod table_store;

pub use table_store::SqliteTableStore;

/// Open a connection pool for a SQLite URL such as `sqlite:chat.db` or
/// `sqlite::memory:`.
///
/// Missing database files are created. An in-memory database lives only as
/// long as its connection, so the pool is pinned to one connection that is
/// never recycled.
pub async fn connect(url: &str) -> Result<SqlitePool, sqlx::Error> {
    let in_memory = url.contains(":memory:") || url.contains("mode=memory");

    let mut opts = SqliteConnectOptions::from_str(url)?
        .busy_timeout(Duration::from_secs(30))
        .create_if_missing(true);
    if !in_memory {
        opts = opts.journal_mode(SqliteJournalMode::Wal);
    }

    debug!(url, in_memory, "Opening SQLite pool");

    let pool = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await?
    } else {
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await?
    };

    Ok(pool)
}
