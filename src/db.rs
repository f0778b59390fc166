//! API-key storage in PostgreSQL.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ApiKey {
    pub id: i32,
    pub key: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Lookup used to authenticate requests.
#[async_trait]
pub trait ApiKeyStore: Send + Sync {
    async fn find_active(&self, key: &str) -> Result<Option<ApiKey>, sqlx::Error>;
}

/// Open the pool, backing off between failed attempts while the database starts.
pub async fn connect_db_with_retry(url: &str, max_retries: u32) -> Result<PgPool> {
    let attempts = max_retries.max(1);
    let options = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(10));

    for attempt in 1..=attempts {
        match options.clone().connect(url).await {
            Ok(pool) => {
                info!(attempt, "Connected to PostgreSQL");
                return Ok(pool);
            }
            Err(e) if attempt < attempts => {
                let backoff = retry_backoff(attempt);
                warn!(
                    attempt,
                    "PostgreSQL unavailable ({}), retrying in {:?}", e, backoff
                );
                tokio::time::sleep(backoff).await;
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("PostgreSQL still unreachable after {} attempts", attempts)
                });
            }
        }
    }

    Err(anyhow!("no connection attempt was made"))
}

/// Delay after the given failed attempt: 1s, 2s, 4s, ... capped at 30s.
fn retry_backoff(attempt: u32) -> Duration {
    let secs = 1u64 << attempt.saturating_sub(1).min(5);
    Duration::from_secs(secs.min(30))
}

/// Bring the schema up to date; creates every table on an empty database.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("Failed to run database migrations")?;
    info!("Database migrations completed");
    Ok(())
}

/// 64 hex characters of randomness.
pub fn generate_api_key() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

#[derive(Clone)]
pub struct PgApiKeyStore {
    db: PgPool,
}

impl PgApiKeyStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn find(&self, key: &str) -> Result<Option<ApiKey>, sqlx::Error> {
        sqlx::query_as::<_, ApiKey>(
            "SELECT id, key, is_active, created_at FROM api_keys WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(&self.db)
        .await
    }

    pub async fn insert(&self, key: &str) -> Result<ApiKey, sqlx::Error> {
        sqlx::query_as::<_, ApiKey>(
            r#"
            INSERT INTO api_keys (key, is_active, created_at)
            VALUES ($1, TRUE, NOW())
            RETURNING id, key, is_active, created_at
            "#,
        )
        .bind(key)
        .fetch_one(&self.db)
        .await
    }

    pub async fn list(&self) -> Result<Vec<ApiKey>, sqlx::Error> {
        sqlx::query_as::<_, ApiKey>(
            "SELECT id, key, is_active, created_at FROM api_keys ORDER BY id",
        )
        .fetch_all(&self.db)
        .await
    }

    /// Returns false when no such key exists.
    pub async fn set_active(&self, key: &str, is_active: bool) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE api_keys SET is_active = $2 WHERE key = $1")
            .bind(key)
            .bind(is_active)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Returns false when no such key exists.
    pub async fn delete(&self, key: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM api_keys WHERE key = $1")
            .bind(key)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ApiKeyStore for PgApiKeyStore {
    async fn find_active(&self, key: &str) -> Result<Option<ApiKey>, sqlx::Error> {
        sqlx::query_as::<_, ApiKey>(
            "SELECT id, key, is_active, created_at FROM api_keys WHERE key = $1 AND is_active = TRUE",
        )
        .bind(key)
        .fetch_optional(&self.db)
        .await
    }
}
