//! Per-query context for tracing and log correlation.
//!
//! Every scatter-gather call carries a `QueryContext` so that gate waits,
//! partition outcomes, and the final result or error can all be tied back
//! to one query in the logs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Global monotonic query ID counter.
static GLOBAL_QUERY_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a new unique query ID.
pub fn next_query_id() -> u64 {
    GLOBAL_QUERY_ID.fetch_add(1, Ordering::Relaxed)
}

/// Context carried by one scatter-gather call.
#[derive(Debug, Clone)]
pub struct QueryContext {
    /// Unique per call (monotonic).
    pub query_id: u64,
    /// Size of the partition snapshot this call scatters over.
    pub partition_count: usize,
    /// When the call started.
    pub started_at: Instant,
}

impl QueryContext {
    /// Create a new context with a fresh query ID.
    pub fn new(partition_count: usize) -> Self {
        Self {
            query_id: next_query_id(),
            partition_count,
            started_at: Instant::now(),
        }
    }

    /// Create with an explicit ID (for testing).
    pub fn with_id(query_id: u64, partition_count: usize) -> Self {
        Self {
            query_id,
            partition_count,
            started_at: Instant::now(),
        }
    }

    /// Elapsed time since call start in microseconds.
    pub fn elapsed_us(&self) -> u64 {
        self.started_at.elapsed().as_micros() as u64
    }

    /// Elapsed time since call start in milliseconds.
    pub fn elapsed_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    /// Format as a structured context string for log/error messages.
    /// Example: `"query_id=42, partitions=8"`
    pub fn as_context_str(&self) -> String {
        format!(
            "query_id={}, partitions={}",
            self.query_id, self.partition_count
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_context_new() {
        let ctx = QueryContext::new(8);
        assert!(ctx.query_id > 0);
        assert_eq!(ctx.partition_count, 8);
    }

    #[test]
    fn test_query_ids_are_unique() {
        let a = QueryContext::new(1);
        let b = QueryContext::new(1);
        assert_ne!(a.query_id, b.query_id);
    }

    #[test]
    fn test_next_ids_monotonic() {
        let a = next_query_id();
        let b = next_query_id();
        assert!(b > a);
    }

    #[test]
    fn test_elapsed_increases() {
        let ctx = QueryContext::new(1);
        let t0 = ctx.elapsed_us();
        std::thread::sleep(std::time::Duration::from_millis(1));
        assert!(ctx.elapsed_us() >= t0);
    }

    #[test]
    fn test_as_context_str_format() {
        let ctx = QueryContext::with_id(7, 3);
        let s = ctx.as_context_str();
        assert!(s.contains("query_id=7"));
        assert!(s.contains("partitions=3"));
    }
}
