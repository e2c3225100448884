//! Periodic sampling of the runtime and host catalogs into the agent's
//! local store. Each tick replaces the store wholesale (`replace`, not
//! merge) — counter accumulation for `PollCount` happens here, in-process,
//! before the snapshot ever reaches the wire; the server accumulates
//! again on receipt, same as every other counter it's sent.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use sysinfo::System;
use telemetrix_core::{Kind, Metric, MetricStore};
use tokio_util::sync::CancellationToken;

use crate::allocator::{AllocatorStats, ALLOCATOR};

/// GC-only fields have no Rust equivalent and are always reported as zero,
/// keeping the catalog's shape stable for anything keying on these names.
const ZEROED_GC_FIELDS: &[&str] = &["NumGC", "PauseTotalNs", "LastGC", "NumForcedGC", "GCCPUFraction", "NextGC"];

pub struct Sampler {
    store: Arc<dyn MetricStore>,
    poll_interval: Duration,
    poll_count: u64,
}

impl Sampler {
    pub fn new(store: Arc<dyn MetricStore>, poll_interval: Duration) -> Self {
        Self {
            store,
            poll_interval,
            poll_count: 0,
        }
    }

    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(error) = self.tick().await {
                        tracing::warn!(%error, "sample tick failed");
                    }
                }
                _ = shutdown.cancelled() => {
                    tracing::info!("sampler stopped");
                    return;
                }
            }
        }
    }

    async fn tick(&mut self) -> Result<(), telemetrix_core::StoreError> {
        self.poll_count += 1;
        let snapshot = build_snapshot(self.poll_count, ALLOCATOR.snapshot());
        self.store.replace(snapshot).await
    }
}

fn build_snapshot(poll_count: u64, allocator: AllocatorStats) -> Vec<Metric> {
    let mut metrics = runtime_catalog(allocator);
    metrics.extend(host_catalog());
    metrics.push(gauge("RandomValue", rand::thread_rng().gen_range(0.0..1.0)));
    metrics.push(counter("PollCount", poll_count as i64));
    metrics
}

fn runtime_catalog(allocator: AllocatorStats) -> Vec<Metric> {
    let live = allocator.live_bytes as f64;
    let total_allocated = allocator.total_allocated_bytes as f64;

    let mut metrics = vec![
        gauge("Alloc", live),
        gauge("TotalAlloc", total_allocated),
        gauge("Mallocs", allocator.alloc_count as f64),
        gauge("Frees", allocator.free_count as f64),
        gauge("HeapAlloc", live),
        gauge("HeapIdle", 0.0),
        gauge("HeapInuse", live),
        gauge("HeapObjects", allocator.alloc_count.saturating_sub(allocator.free_count) as f64),
        gauge("HeapReleased", allocator.total_freed_bytes as f64),
        gauge("HeapSys", live),
        gauge("Lookups", 0.0),
        gauge("MCacheInuse", 0.0),
        gauge("MCacheSys", 0.0),
        gauge("MSpanInuse", 0.0),
        gauge("MSpanSys", 0.0),
        gauge("OtherSys", 0.0),
        gauge("StackInuse", 0.0),
        gauge("StackSys", 0.0),
        gauge("Sys", live),
        gauge("BuckHashSys", 0.0),
        gauge("GCSys", 0.0),
    ];

    for field in ZEROED_GC_FIELDS {
        metrics.push(gauge(field, 0.0));
    }
    metrics
}

fn host_catalog() -> Vec<Metric> {
    let mut system = System::new();
    system.refresh_cpu_usage();
    system.refresh_memory();

    let cpu_utilization = system
        .cpus()
        .first()
        .map(|cpu| cpu.cpu_usage() as f64)
        .unwrap_or(0.0);

    vec![
        gauge("CPUutilization1", cpu_utilization),
        gauge("TotalMemory", system.total_memory() as f64),
        gauge("FreeMemory", system.free_memory() as f64),
    ]
}

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_contains_every_zeroed_gc_field() {
        let snapshot = build_snapshot(1, AllocatorStats::default());
        for field in ZEROED_GC_FIELDS {
            let metric = snapshot.iter().find(|m| m.id == *field).unwrap();
            assert_eq!(metric.value, Some(0.0));
        }
    }

    #[test]
    fn snapshot_carries_poll_count_as_counter() {
        let snapshot = build_snapshot(5, AllocatorStats::default());
        let poll_count = snapshot.iter().find(|m| m.id == "PollCount").unwrap();
        assert_eq!(poll_count.kind, Kind::Counter);
        assert_eq!(poll_count.delta, Some(5));
    }

    #[test]
    fn snapshot_random_value_is_in_unit_range() {
        let snapshot = build_snapshot(1, AllocatorStats::default());
        let random = snapshot.iter().find(|m| m.id == "RandomValue").unwrap();
        let value = random.value.unwrap();
        assert!((0.0..1.0).contains(&value));
    }
}
