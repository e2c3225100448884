//! Postgres-backed store. Schema is fixed (migration-compatibility matters):
//!
//! ```sql
//! metrics(name varchar(255) primary key,
//!         type varchar(40),
//!         value double precision default null,
//!         delta bigint default null)
//! ```

use std::time::Duration;

use sqlx::{PgPool, Postgres, Transaction};
use telemetrix_wire::RetryBudget;

use crate::metric::{Kind, Metric};
use crate::store::{MetricStore, StoreError};

pub struct SqlStore {
    pool: PgPool,
}

impl SqlStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_row(tx: &mut Transaction<'_, Postgres>, metric: &Metric) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO metrics (name, type, value, delta) VALUES ($1, $2, $3, $4)",
        )
        .bind(&metric.id)
        .bind(metric.kind.as_str())
        .bind(metric.value)
        .bind(metric.delta)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn update_row(tx: &mut Transaction<'_, Postgres>, metric: &Metric) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE metrics SET value = $1, delta = $2 WHERE type = $3 AND name = $4",
        )
        .bind(metric.value)
        .bind(metric.delta)
        .bind(metric.kind.as_str())
        .bind(&metric.id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn with_retry<F, Fut, T>(&self, mut attempt: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, StoreError>>,
    {
        let mut budget = RetryBudget::new(3, Duration::from_millis(100));
        loop {
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    let retryable = is_connection_exception(&error);
                    if budget.should_retry_given(retryable).await {
                        tracing::warn!(attempt = budget.attempts(), %error, "retrying database call");
                        continue;
                    }
                    let attempts = budget.attempts();
                    return Err(StoreError::RetriesExhausted {
                        attempts,
                        source: Box::new(error),
                    });
                }
            }
        }
    }
}

/// SQL state class `08` ("Connection Exception") covers connection failures,
/// admin shutdown, and similar transient conditions — the only class this
/// store retries. Anything without a database error code (io errors already
/// wrapped elsewhere, decode errors) is treated as non-retryable.
fn is_connection_exception(error: &StoreError) -> bool {
    match error {
        StoreError::Database(sqlx::Error::Database(db_error)) => {
            db_error.code().is_some_and(|code| code.starts_with("08"))
        }
        _ => false,
    }
}

#[async_trait::async_trait]
impl MetricStore for SqlStore {
    async fn get_all(&self) -> Result<Vec<Metric>, StoreError> {
        let rows: Vec<(String, String, Option<f64>, Option<i64>)> =
            sqlx::query_as("SELECT name, type, value, delta FROM metrics")
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter()
            .map(|(id, kind, value, delta)| {
                let kind = Kind::parse(&kind)?;
                Ok(Metric { id, kind, value, delta })
            })
            .collect()
    }

    async fn create(&self, batch: Vec<Metric>) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        self.with_retry(|| async {
            let mut tx = self.pool.begin().await?;
            for metric in &batch {
                Self::insert_row(&mut tx, metric).await?;
            }
            tx.commit().await?;
            Ok(())
        })
        .await
    }

    async fn update(&self, batch: Vec<Metric>) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        self.with_retry(|| async {
            let mut tx = self.pool.begin().await?;
            for metric in &batch {
                Self::update_row(&mut tx, metric).await?;
            }
            tx.commit().await?;
            Ok(())
        })
        .await
    }

    async fn replace(&self, snapshot: Vec<Metric>) -> Result<(), StoreError> {
        self.with_retry(|| async {
            let mut tx = self.pool.begin().await?;
            sqlx::query("DELETE FROM metrics").execute(&mut *tx).await?;
            for metric in &snapshot {
                Self::insert_row(&mut tx, metric).await?;
            }
            tx.commit().await?;
            Ok(())
        })
        .await
    }
}
