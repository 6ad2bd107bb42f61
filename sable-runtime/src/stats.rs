//! Allocator Balance Counters
//!
//! Process-wide counters for every allocation class the runtime manages:
//! heap objects, stack segments, and meta-stack nodes. The counters back
//! the leak-freedom property (every allocation is paired with a free) and
//! the `SABLE_LEAK_CHECK` exit check.
//!
//! Counters are atomics so concurrent test harnesses do not race; the
//! runtime itself is single-threaded.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static OBJECTS_ALLOCATED: AtomicU64 = AtomicU64::new(0);
static OBJECTS_FREED: AtomicU64 = AtomicU64::new(0);
static SEGMENTS_ALLOCATED: AtomicU64 = AtomicU64::new(0);
static SEGMENTS_FREED: AtomicU64 = AtomicU64::new(0);
static NODES_ALLOCATED: AtomicU64 = AtomicU64::new(0);
static NODES_FREED: AtomicU64 = AtomicU64::new(0);
static OBJECT_BYTES_LIVE: AtomicU64 = AtomicU64::new(0);

pub(crate) fn record_object_alloc(bytes: usize) {
    OBJECTS_ALLOCATED.fetch_add(1, Ordering::Relaxed);
    OBJECT_BYTES_LIVE.fetch_add(bytes as u64, Ordering::Relaxed);
}

pub(crate) fn record_object_free(bytes: usize) {
    OBJECTS_FREED.fetch_add(1, Ordering::Relaxed);
    OBJECT_BYTES_LIVE.fetch_sub(bytes as u64, Ordering::Relaxed);
}

pub(crate) fn record_segment_alloc() {
    SEGMENTS_ALLOCATED.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_segment_free() {
    SEGMENTS_FREED.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_node_alloc() {
    NODES_ALLOCATED.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_node_free() {
    NODES_FREED.fetch_add(1, Ordering::Relaxed);
}

/// Snapshot of the runtime's allocation counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryReport {
    /// Heap objects allocated since process start.
    pub objects_allocated: u64,
    /// Heap objects freed since process start.
    pub objects_freed: u64,
    /// Stack segments allocated.
    pub segments_allocated: u64,
    /// Stack segments freed.
    pub segments_freed: u64,
    /// Meta-stack nodes allocated.
    pub nodes_allocated: u64,
    /// Meta-stack nodes freed.
    pub nodes_freed: u64,
    /// Live heap object payload bytes.
    pub object_bytes_live: u64,
}

impl MemoryReport {
    /// Total live allocations across all classes.
    ///
    /// Zero means every allocation has been paired with a free.
    pub fn balance(&self) -> u64 {
        (self.objects_allocated - self.objects_freed)
            + (self.segments_allocated - self.segments_freed)
            + (self.nodes_allocated - self.nodes_freed)
    }
}

impl fmt::Display for MemoryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "objects:  {} allocated, {} freed, {} bytes live",
            self.objects_allocated, self.objects_freed, self.object_bytes_live
        )?;
        writeln!(
            f,
            "segments: {} allocated, {} freed",
            self.segments_allocated, self.segments_freed
        )?;
        write!(
            f,
            "nodes:    {} allocated, {} freed",
            self.nodes_allocated, self.nodes_freed
        )
    }
}

/// Take a snapshot of the allocation counters.
pub fn memory_report() -> MemoryReport {
    MemoryReport {
        objects_allocated: OBJECTS_ALLOCATED.load(Ordering::Relaxed),
        objects_freed: OBJECTS_FREED.load(Ordering::Relaxed),
        segments_allocated: SEGMENTS_ALLOCATED.load(Ordering::Relaxed),
        segments_freed: SEGMENTS_FREED.load(Ordering::Relaxed),
        nodes_allocated: NODES_ALLOCATED.load(Ordering::Relaxed),
        nodes_freed: NODES_FREED.load(Ordering::Relaxed),
        object_bytes_live: OBJECT_BYTES_LIVE.load(Ordering::Relaxed),
    }
}

/// Net number of live allocations (objects + segments + nodes).
pub fn allocator_balance() -> u64 {
    memory_report().balance()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_balance() {
        let report = MemoryReport {
            objects_allocated: 10,
            objects_freed: 10,
            segments_allocated: 4,
            segments_freed: 3,
            nodes_allocated: 4,
            nodes_freed: 3,
            object_bytes_live: 0,
        };
        assert_eq!(report.balance(), 2);
    }

    #[test]
    fn test_report_display_mentions_all_classes() {
        let text = memory_report().to_string();
        assert!(text.contains("objects:"));
        assert!(text.contains("segments:"));
        assert!(text.contains("nodes:"));
    }
}
