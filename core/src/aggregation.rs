//! The semantic heart of the pipeline: turns raw writes into store-level
//! create/update calls, accumulating counters and replacing gauges along
//! the way.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::metric::{Metric, MetricError};
use crate::store::{MetricStore, StoreError};

#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("metric {kind}_{id} not found")]
    NotFound { kind: String, id: String },
    #[error(transparent)]
    Metric(#[from] MetricError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct AggregationService {
    store: Arc<dyn MetricStore>,
}

impl AggregationService {
    pub fn new(store: Arc<dyn MetricStore>) -> Self {
        Self { store }
    }

    pub async fn get(&self, kind: &str, id: &str) -> Result<Metric, AggregationError> {
        let key = format!("{kind}_{id}");
        self.store
            .get_all()
            .await?
            .into_iter()
            .find(|metric| metric.key() == key)
            .ok_or_else(|| AggregationError::NotFound {
                kind: kind.to_string(),
                id: id.to_string(),
            })
    }

    pub async fn get_all(&self) -> Result<Vec<Metric>, AggregationError> {
        Ok(self.store.get_all().await?)
    }

    pub async fn save(&self, metric: Metric) -> Result<(), AggregationError> {
        self.save_batch(vec![metric]).await
    }

    /// Partitions `batch` into creates and updates against the current
    /// snapshot, accumulating duplicate keys within the batch in input
    /// order before either store call is made.
    pub async fn save_batch(&self, batch: Vec<Metric>) -> Result<(), AggregationError> {
        let existing = self.store.get_all().await?;
        let mut by_key: HashMap<String, Metric> = existing
            .into_iter()
            .map(|metric| (metric.key(), metric))
            .collect();

        let mut to_create = Vec::new();
        let mut to_update = Vec::new();

        for metric in batch {
            metric.validate()?;
            let key = metric.key();
            match by_key.get_mut(&key) {
                None => {
                    by_key.insert(key, metric.clone());
                    to_create.push(metric);
                }
                Some(current) => {
                    current.set_value(&metric.as_text())?;
                    to_update.push(current.clone());
                }
            }
        }

        if !to_create.is_empty() {
            self.store.create(to_create).await?;
        }
        if !to_update.is_empty() {
            self.store.update(to_update).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::Kind;
    use crate::store::InMemoryStore;

    fn gauge(id: &str, value: f64) -> Metric {
        Metric {
            id: id.to_string(),
            kind: Kind::Gauge,
            value: Some(value),
            delta: None,
        }
    }

    fn counter(id: &str, delta: i64) -> Metric {
        Metric {
            id: id.to_string(),
            kind: Kind::Counter,
            value: None,
            delta: Some(delta),
        }
    }

    #[tokio::test]
    async fn save_creates_new_metric() {
        let service = AggregationService::new(Arc::new(InMemoryStore::new()));
        service.save(gauge("temp", 1.0)).await.unwrap();
        let metric = service.get("gauge", "temp").await.unwrap();
        assert_eq!(metric.value, Some(1.0));
    }

    #[tokio::test]
    async fn save_batch_accumulates_duplicate_counter_keys_in_batch() {
        let service = AggregationService::new(Arc::new(InMemoryStore::new()));
        service
            .save_batch(vec![counter("hits", 1), counter("hits", 2), counter("hits", 3)])
            .await
            .unwrap();
        let metric = service.get("counter", "hits").await.unwrap();
        assert_eq!(metric.delta, Some(6));
    }

    #[tokio::test]
    async fn save_batch_replaces_gauge_on_second_write() {
        let service = AggregationService::new(Arc::new(InMemoryStore::new()));
        service.save(gauge("temp", 1.0)).await.unwrap();
        service.save(gauge("temp", 9.0)).await.unwrap();
        let metric = service.get("gauge", "temp").await.unwrap();
        assert_eq!(metric.value, Some(9.0));
    }

    #[tokio::test]
    async fn get_unknown_metric_fails() {
        let service = AggregationService::new(Arc::new(InMemoryStore::new()));
        assert!(service.get("gauge", "missing").await.is_err());
    }
}
