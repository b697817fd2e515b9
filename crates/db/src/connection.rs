use std::str::FromStr;
use std::time::Duration;

use sitescope_core::config::DatabaseConfig;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

pub type DbPool = sqlx::SqlitePool;

pub async fn connect(database_url: &str) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(database_url, 5, 30).await
}

pub async fn connect_with_config(database: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(&database.url, database.max_connections, database.timeout_secs).await
}

/// Opens a pool with WAL, foreign keys and a busy timeout on every connection. Reviews
/// racing on the same record wait on the busy timeout instead of failing outright.
///
/// In-memory databases are private to one connection, so their pools hold exactly one.
pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    let database_url = if database_url == ":memory:" { "sqlite::memory:" } else { database_url };
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let max_connections = if is_in_memory(database_url) { 1 } else { max_connections.max(1) };

    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query("PRAGMA busy_timeout = 5000").execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect_with(options)
        .await
}

fn is_in_memory(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

#[cfg(test)]
mod tests {
    use super::{connect_with_settings, is_in_memory};

    #[test]
    fn recognizes_in_memory_urls() {
        assert!(is_in_memory("sqlite::memory:"));
        assert!(is_in_memory("sqlite://:memory:"));
        assert!(is_in_memory("sqlite:file:scoping?mode=memory"));
        assert!(!is_in_memory("sqlite://data/sitescope.db"));
    }

    #[tokio::test]
    async fn in_memory_pool_shares_one_database() {
        let pool = connect_with_settings(":memory:", 4, 5).await.expect("connect");
        assert_eq!(pool.options().get_max_connections(), 1);

        sqlx::query("CREATE TABLE site_marker (id INTEGER PRIMARY KEY)")
            .execute(&pool)
            .await
            .expect("create");
        let lookups: Vec<_> = (0..4)
            .map(|_| {
                let pool = pool.clone();
                tokio::spawn(async move {
                    sqlx::query_scalar::<_, i64>("SELECT COUNT(1) FROM site_marker")
                        .fetch_one(&pool)
                        .await
                })
            })
            .collect();
        for lookup in lookups {
            let count = lookup.await.expect("join").expect("table visible on every acquire");
            assert_eq!(count, 0);
        }
    }
}
