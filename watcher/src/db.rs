use crate::errors::{Error, Result};
use crate::metrics::STORE_FAILURES_TOTAL;
use crate::model::{Subscription, UserId};
use crate::store::SubscriptionStore;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::future::Future;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

const MAX_ATTEMPTS: u32 = 5;

pub async fn make_pool(database_url: &str) -> Result<PgPool> {
    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await?;

    info!("Database connection established");
    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Migrations completed");

    Ok(pool)
}

/// Subscription store backed by the `subscriptions` table.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionStore for PostgresStore {
    async fn find_by_user_and_device(
        &self,
        user_id: UserId,
        device: &str,
    ) -> Result<Option<Subscription>> {
        with_retry("find_by_user_and_device", || {
            sqlx::query_as::<_, Subscription>(
                "SELECT id, user_id, device, watermark FROM subscriptions
                 WHERE user_id = $1 AND device = $2",
            )
            .bind(user_id)
            .bind(device)
            .fetch_optional(&self.pool)
        })
        .await
    }

    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<Subscription>> {
        with_retry("list_by_user", || {
            sqlx::query_as::<_, Subscription>(
                "SELECT id, user_id, device, watermark FROM subscriptions
                 WHERE user_id = $1 ORDER BY device",
            )
            .bind(user_id)
            .fetch_all(&self.pool)
        })
        .await
    }

    async fn list_all(&self) -> Result<Vec<Subscription>> {
        with_retry("list_all", || {
            sqlx::query_as::<_, Subscription>(
                "SELECT id, user_id, device, watermark FROM subscriptions",
            )
            .fetch_all(&self.pool)
        })
        .await
    }

    async fn insert(&self, user_id: UserId, device: &str, watermark: i64) -> Result<Subscription> {
        let id = Uuid::new_v4();
        // The unique (user_id, device) constraint makes the duplicate check
        // part of the insert itself.
        let inserted = with_retry("insert", || {
            sqlx::query_as::<_, Subscription>(
                "INSERT INTO subscriptions (id, user_id, device, watermark)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (user_id, device) DO NOTHING
                 RETURNING id, user_id, device, watermark",
            )
            .bind(id)
            .bind(user_id)
            .bind(device)
            .bind(watermark)
            .fetch_optional(&self.pool)
        })
        .await?;

        inserted.ok_or(Error::DuplicateSubscription)
    }

    async fn delete_by_id(&self, id: Uuid) -> Result<bool> {
        let result = with_retry("delete_by_id", || {
            sqlx::query("DELETE FROM subscriptions WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
        })
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_watermark(&self, id: Uuid, watermark: i64) -> Result<bool> {
        let result = with_retry("update_watermark", || {
            sqlx::query(
                "UPDATE subscriptions SET watermark = $2
                 WHERE id = $1 AND watermark < $2",
            )
            .bind(id)
            .bind(watermark)
            .execute(&self.pool)
        })
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Runs a query, retrying connection-level failures with exponential backoff.
async fn with_retry<T, F, Fut>(op: &str, mut query: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, sqlx::Error>>,
{
    let mut attempts = 0;

    loop {
        attempts += 1;
        match query().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                STORE_FAILURES_TOTAL.inc();
                if attempts >= MAX_ATTEMPTS || !is_transient_error(&e) {
                    error!(
                        "Database {} failed permanently after {} attempts: {}",
                        op, attempts, e
                    );
                    return Err(Error::Database(e));
                }

                let wait_ms = 100 * 2_u64.pow(attempts - 1);
                warn!(
                    "Database {} failed (attempt {}/{}), retrying in {}ms: {}",
                    op, attempts, MAX_ATTEMPTS, wait_ms, e
                );
                tokio::time::sleep(Duration::from_millis(wait_ms)).await;
            }
        }
    }
}

fn is_transient_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::PoolClosed => true,
        sqlx::Error::Database(db_err) => {
            db_err.code().is_some_and(|code| {
                code.starts_with("08") || // connection_exception class
                code == "57P03" || // cannot_connect_now
                code == "53300" // too_many_connections
            })
        }
        _ => false,
    }
}
