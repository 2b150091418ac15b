use crate::store::CacheStore;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};
use trendlens_core::CacheError;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS cache_entries (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL,
    expires_at INTEGER NOT NULL
)";

/// SQLite-backed store shared by every query of the process.
///
/// The pool is opened on first use and reused afterwards. A failed open is
/// not remembered, so the next call tries again.
#[derive(Debug)]
pub struct SqliteStore {
    database_url: String,
    pool: OnceCell<SqlitePool>,
}

impl SqliteStore {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            pool: OnceCell::new(),
        }
    }

    /// Opens the pool eagerly instead of on first use.
    pub async fn connect(database_url: impl Into<String>) -> Result<Self, CacheError> {
        let store = Self::new(database_url);
        store.pool().await?;
        Ok(store)
    }

    async fn pool(&self) -> Result<&SqlitePool, CacheError> {
        self.pool
            .get_or_try_init(|| async {
                let in_memory = self.database_url.contains(":memory:");
                let options =
                    SqliteConnectOptions::from_str(&self.database_url)?.create_if_missing(true);

                // An in-memory database lives and dies with its connection.
                let pool_options = if in_memory {
                    SqlitePoolOptions::new()
                        .max_connections(1)
                        .idle_timeout(None)
                        .max_lifetime(None)
                } else {
                    SqlitePoolOptions::new().max_connections(4)
                };

                let pool = pool_options.connect_with(options).await?;
                sqlx::query(CREATE_TABLE).execute(&pool).await?;
                info!("Opened cache database at {}", self.database_url);
                Ok(pool)
            })
            .await
    }

    /// Deletes every expired row and returns how many were removed.
    pub async fn purge_expired(&self) -> Result<u64, CacheError> {
        let pool = self.pool().await?;
        let result = sqlx::query("DELETE FROM cache_entries WHERE expires_at <= ?")
            .bind(now_millis())
            .execute(pool)
            .await?;
        debug!("Purged {} expired cache rows", result.rows_affected());
        Ok(result.rows_affected())
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[async_trait]
impl CacheStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let pool = self.pool().await?;
        let value = sqlx::query_scalar::<_, String>(
            "SELECT value FROM cache_entries WHERE key = ? AND expires_at > ?",
        )
        .bind(key)
        .bind(now_millis())
        .fetch_optional(pool)
        .await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let pool = self.pool().await?;
        let ttl_millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = now_millis().saturating_add(ttl_millis);

        sqlx::query(
            "INSERT INTO cache_entries (key, value, expires_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
        )
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let pool = self.pool().await?;
        sqlx::query("DELETE FROM cache_entries WHERE key = ?")
            .bind(key)
            .execute(pool)
            .await?;
        Ok(())
    }

    async fn flush_all(&self) -> Result<(), CacheError> {
        let pool = self.pool().await?;
        sqlx::query("DELETE FROM cache_entries").execute(pool).await?;
        Ok(())
    }
}
