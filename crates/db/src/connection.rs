use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

pub type DbPool = sqlx::SqlitePool;

pub async fn connect(database_url: &str) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(database_url, 5, 30).await
}

/// Opens the directory database, creating the file when it does not exist yet.
///
/// Every SQLite in-memory connection is its own database, so in-memory URLs get
/// a single connection that is never recycled.
pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    let in_memory = is_in_memory(database_url);
    let journal_mode = if in_memory { SqliteJournalMode::Memory } else { SqliteJournalMode::Wal };
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5))
        .journal_mode(journal_mode);

    let pool = SqlitePoolOptions::new().acquire_timeout(Duration::from_secs(timeout_secs.max(1)));
    let pool = if in_memory {
        pool.max_connections(1).min_connections(1).idle_timeout(None).max_lifetime(None)
    } else {
        pool.max_connections(max_connections.max(1))
    };
    pool.connect_with(options).await
}

fn is_in_memory(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

#[cfg(test)]
mod tests {
    use super::{connect_with_settings, is_in_memory};

    #[test]
    fn recognises_in_memory_urls() {
        assert!(is_in_memory("sqlite::memory:"));
        assert!(is_in_memory("sqlite://directory?mode=memory&cache=shared"));
        assert!(!is_in_memory("sqlite://courier.db"));
    }

    #[tokio::test]
    async fn in_memory_pool_keeps_state_across_queries() {
        let pool = connect_with_settings("sqlite::memory:", 8, 5).await.expect("connect");

        sqlx::query("CREATE TABLE probe (id INTEGER)").execute(&pool).await.expect("create");
        sqlx::query("INSERT INTO probe (id) VALUES (1)").execute(&pool).await.expect("insert");
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM probe").fetch_one(&pool).await.expect("count");

        assert_eq!(count, 1);
        assert_eq!(pool.size(), 1);
    }

    #[tokio::test]
    async fn file_databases_are_created_on_first_connect() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("directory.db");
        let url = format!("sqlite://{}", path.display());

        let pool = connect_with_settings(&url, 2, 5).await.expect("connect creates the file");
        pool.close().await;

        assert!(path.exists());
    }
}
