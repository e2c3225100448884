//! Global allocator wrapper used as the source for the runtime catalog's
//! allocator-backed gauges (`Alloc`, `TotalAlloc`, `Mallocs`, `Frees`,
//! `HeapAlloc`, ...). Rust has no equivalent of `runtime.ReadMemStats`, so
//! these counters are derived from every allocation/deallocation that
//! passes through this process's global allocator instead.

use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicU64, Ordering};

/// Cumulative and live allocation counters, updated on every alloc/dealloc.
pub struct TrackingAllocator {
    inner: System,
    live_bytes: AtomicU64,
    total_allocated_bytes: AtomicU64,
    total_freed_bytes: AtomicU64,
    alloc_count: AtomicU64,
    free_count: AtomicU64,
}

impl TrackingAllocator {
    pub const fn new() -> Self {
        Self {
            inner: System,
            live_bytes: AtomicU64::new(0),
            total_allocated_bytes: AtomicU64::new(0),
            total_freed_bytes: AtomicU64::new(0),
            alloc_count: AtomicU64::new(0),
            free_count: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> AllocatorStats {
        AllocatorStats {
            live_bytes: self.live_bytes.load(Ordering::Relaxed),
            total_allocated_bytes: self.total_allocated_bytes.load(Ordering::Relaxed),
            total_freed_bytes: self.total_freed_bytes.load(Ordering::Relaxed),
            alloc_count: self.alloc_count.load(Ordering::Relaxed),
            free_count: self.free_count.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AllocatorStats {
    pub live_bytes: u64,
    pub total_allocated_bytes: u64,
    pub total_freed_bytes: u64,
    pub alloc_count: u64,
    pub free_count: u64,
}

unsafe impl GlobalAlloc for TrackingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = self.inner.alloc(layout);
        if !ptr.is_null() {
            let size = layout.size() as u64;
            self.live_bytes.fetch_add(size, Ordering::Relaxed);
            self.total_allocated_bytes.fetch_add(size, Ordering::Relaxed);
            self.alloc_count.fetch_add(1, Ordering::Relaxed);
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        self.inner.dealloc(ptr, layout);
        let size = layout.size() as u64;
        self.live_bytes.fetch_sub(size, Ordering::Relaxed);
        self.total_freed_bytes.fetch_add(size, Ordering::Relaxed);
        self.free_count.fetch_add(1, Ordering::Relaxed);
    }
}

#[global_allocator]
pub static ALLOCATOR: TrackingAllocator = TrackingAllocator::new();

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_a_live_allocation() {
        let before = ALLOCATOR.snapshot();
        let buffer = vec![0u8; 4096];
        let after = ALLOCATOR.snapshot();
        assert!(after.total_allocated_bytes >= before.total_allocated_bytes + 4096);
        assert!(after.alloc_count > before.alloc_count);
        drop(buffer);
    }
}
