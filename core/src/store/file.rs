use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::metric::Metric;

use super::{InMemoryStore, MetricStore, StoreError};

/// Composes an in-memory store with restore-on-start and periodic dump to a
/// newline-delimited JSON file. `dump_interval` of zero means dump
/// synchronously after every write-through instead of on a ticker.
pub struct FileStore {
    inner: InMemoryStore,
    path: PathBuf,
    dump_interval: Duration,
}

impl FileStore {
    /// Opens (creating if absent) and, if `restore` is set, replays `path`
    /// into the in-memory store. Malformed lines are skipped and logged, not
    /// fatal; restore errors (the file itself can't be opened) abort startup.
    pub async fn open(path: impl Into<PathBuf>, restore: bool, dump_interval: Duration) -> Result<Self, StoreError> {
        let path = path.into();
        let metrics = if restore {
            Self::restore(&path).await?
        } else {
            Vec::new()
        };

        Ok(Self {
            inner: InMemoryStore::with_metrics(metrics),
            path,
            dump_interval,
        })
    }

    async fn restore(path: &Path) -> Result<Vec<Metric>, StoreError> {
        let file = match tokio::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .await
        {
            Ok(file) => file,
            Err(error) => return Err(StoreError::Io(error)),
        };

        let mut lines = BufReader::new(file).lines();
        let mut metrics = Vec::new();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Metric>(&line) {
                Ok(metric) => metrics.push(metric),
                Err(error) => {
                    tracing::warn!(%error, line, "skipping malformed dump line");
                }
            }
        }
        Ok(metrics)
    }

    /// Serializes every current metric as newline-delimited JSON and rewrites
    /// the dump file. Opened `O_RDWR|O_CREATE` without truncation, preserving
    /// the source's behavior of leaving trailing garbage on shrink.
    pub async fn dump(&self) -> Result<(), StoreError> {
        let metrics = self.inner.get_all().await?;
        let mut file = tokio::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&self.path)
            .await?;
        for metric in &metrics {
            let mut row = serde_json::to_vec(metric)?;
            row.push(b'\n');
            file.write_all(&row).await?;
        }
        file.flush().await?;
        Ok(())
    }

    /// Spawns the background dumper (if `dump_interval > 0`) and the
    /// final-dump-on-cancel task. Dump errors are logged, never surfaced to
    /// the write path.
    pub fn spawn_background_tasks(self: &Arc<Self>, cancel: CancellationToken) {
        if !self.dump_interval.is_zero() {
            let store = Arc::clone(self);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(store.dump_interval);
                ticker.tick().await; // first tick fires immediately; skip it
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = ticker.tick() => {
                            if let Err(error) = store.dump().await {
                                tracing::warn!(%error, "periodic dump failed");
                            }
                        }
                    }
                }
            });
        }

        let store = Arc::clone(self);
        tokio::spawn(async move {
            cancel.cancelled().await;
            if let Err(error) = store.dump().await {
                tracing::warn!(%error, "final dump on shutdown failed");
            }
        });
    }

    pub fn dump_interval(&self) -> Duration {
        self.dump_interval
    }

    pub fn is_synchronous(&self) -> bool {
        self.dump_interval.is_zero()
    }
}

#[async_trait]
impl MetricStore for FileStore {
    async fn get_all(&self) -> Result<Vec<Metric>, StoreError> {
        self.inner.get_all().await
    }

    async fn create(&self, batch: Vec<Metric>) -> Result<(), StoreError> {
        self.inner.create(batch).await?;
        self.dump_if_synchronous().await
    }

    async fn update(&self, batch: Vec<Metric>) -> Result<(), StoreError> {
        self.inner.update(batch).await?;
        self.dump_if_synchronous().await
    }

    async fn replace(&self, snapshot: Vec<Metric>) -> Result<(), StoreError> {
        self.inner.replace(snapshot).await?;
        self.dump_if_synchronous().await
    }
}

impl FileStore {
    async fn dump_if_synchronous(&self) -> Result<(), StoreError> {
        if self.is_synchronous() {
            if let Err(error) = self.dump().await {
                tracing::warn!(%error, "synchronous dump failed");
            }
        }
        Ok(())
    }
}
