// db/db.rs
use std::sync::Arc;
use std::time::Duration;

use redis::aio::ConnectionManager;
use sqlx::{Pool, Postgres, Transaction};

#[derive(Clone)]
pub struct DBClient {
    pub pool: Pool<Postgres>,
    pub redis_client: Option<Arc<ConnectionManager>>,
}

impl std::fmt::Debug for DBClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DBClient")
            .field("pool", &"Pool<Postgres>")
            .field("redis_client", &self.redis_client.is_some())
            .finish()
    }
}

impl DBClient {
    /// Create a new DBClient with PostgreSQL pool only
    pub fn new(pool: Pool<Postgres>) -> Self {
        DBClient {
            pool,
            redis_client: None,
        }
    }

    /// Create a new DBClient with both PostgreSQL and Redis. A Redis failure is not
    /// fatal, the client simply runs without it.
    pub async fn with_redis(pool: Pool<Postgres>, redis_url: &str) -> Self {
        match redis::Client::open(redis_url) {
            Ok(client) => match ConnectionManager::new(client).await {
                Ok(conn) => {
                    tracing::info!("Redis connection established successfully");
                    DBClient {
                        pool,
                        redis_client: Some(Arc::new(conn)),
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to connect to Redis: {}. Continuing without it.", e);
                    DBClient::new(pool)
                }
            },
            Err(e) => {
                tracing::warn!("Failed to create Redis client: {}. Continuing without it.", e);
                DBClient::new(pool)
            }
        }
    }

    pub fn is_redis_available(&self) -> bool {
        self.redis_client.is_some()
    }

    /// Opens a transaction whose row-lock waits give up after `lock_timeout`
    /// instead of blocking indefinitely.
    pub async fn begin_with_lock_timeout(
        &self,
        lock_timeout: Duration,
    ) -> Result<Transaction<'static, Postgres>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let statement = format!("SET LOCAL lock_timeout = '{}ms'", lock_timeout.as_millis());
        sqlx::query(&statement).execute(&mut *tx).await?;

        Ok(tx)
    }
}
