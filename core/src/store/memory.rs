use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::metric::Metric;

use super::{MetricStore, StoreError};

/// Ordered sequence of metrics protected by a single lock. No eviction;
/// `update` scans linearly for the matching key.
#[derive(Default)]
pub struct InMemoryStore {
    metrics: RwLock<Vec<Metric>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metrics(metrics: Vec<Metric>) -> Self {
        Self {
            metrics: RwLock::new(metrics),
        }
    }
}

#[async_trait]
impl MetricStore for InMemoryStore {
    async fn get_all(&self) -> Result<Vec<Metric>, StoreError> {
        Ok(self.metrics.read().await.clone())
    }

    async fn create(&self, batch: Vec<Metric>) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        self.metrics.write().await.extend(batch);
        Ok(())
    }

    async fn update(&self, batch: Vec<Metric>) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut metrics = self.metrics.write().await;
        for updated in batch {
            if let Some(slot) = metrics.iter_mut().find(|existing| existing.key() == updated.key()) {
                *slot = updated;
            }
        }
        Ok(())
    }

    async fn replace(&self, snapshot: Vec<Metric>) -> Result<(), StoreError> {
        *self.metrics.write().await = snapshot;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::Kind;

    fn gauge(id: &str, value: f64) -> Metric {
        Metric {
            id: id.to_string(),
            kind: Kind::Gauge,
            value: Some(value),
            delta: None,
        }
    }

    #[tokio::test]
    async fn create_appends_and_update_overwrites() {
        let store = InMemoryStore::new();
        store.create(vec![gauge("temp", 1.0)]).await.unwrap();
        store.update(vec![gauge("temp", 2.0)]).await.unwrap();

        let all = store.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].value, Some(2.0));
    }

    #[tokio::test]
    async fn replace_discards_prior_contents() {
        let store = InMemoryStore::new();
        store.create(vec![gauge("a", 1.0), gauge("b", 2.0)]).await.unwrap();
        store.replace(vec![gauge("c", 3.0)]).await.unwrap();

        let all = store.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, "c");
    }
}
