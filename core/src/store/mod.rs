//! The polymorphic store contract shared by the in-memory, file-backed, and
//! SQL backends. `create` and `update` are kept distinct so the SQL backend
//! can issue `INSERT`s and `UPDATE`s without upsert ambiguity; the
//! aggregation service decides which one each metric needs.

mod file;
mod memory;
mod sql;

pub use file::FileStore;
pub use memory::InMemoryStore;
pub use sql::SqlStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::metric::{Metric, MetricError};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("invalid metric: {0}")]
    Metric(#[from] MetricError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("retry budget exhausted after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<StoreError>,
    },
}

#[async_trait]
pub trait MetricStore: Send + Sync {
    /// Full enumeration of store contents. Order is unspecified.
    async fn get_all(&self) -> Result<Vec<Metric>, StoreError>;

    /// Appends brand-new records. Callers guarantee these keys are not
    /// already present.
    async fn create(&self, batch: Vec<Metric>) -> Result<(), StoreError>;

    /// Overwrites existing records in place, matched by `key()`.
    async fn update(&self, batch: Vec<Metric>) -> Result<(), StoreError>;

    /// Wholesale replacement of the store's contents, used by restore paths.
    async fn replace(&self, snapshot: Vec<Metric>) -> Result<(), StoreError>;
}
