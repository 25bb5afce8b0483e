//! In-memory partition store with fault injection.
//!
//! Backs the integration tests and the bench harness. Beyond serving rows,
//! a [`MemoryStore`] can simulate the failure modes the executor has to
//! survive:
//!
//! - **Latency**: a configurable delay before each query resolves.
//! - **Fail**: every query errors after the latency elapses.
//! - **Hang**: the query never resolves and parks until cancellation fires.
//!
//! All waits race the caller's [`CancelSignal`], so a cancelled query
//! returns promptly with the cancellation cause instead of serving out its
//! full latency.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use osprey_common::{
    CancelSignal, OspreyError, OspreyResult, PartitionId, PartitionQuery, QueryArg, Record,
};

use crate::store::PartitionStore;

/// How a [`MemoryStore`] misbehaves, if at all.
#[derive(Debug, Clone, Default)]
pub enum FaultPolicy {
    /// Serve rows normally.
    #[default]
    None,
    /// Fail every query with the given reason (after the configured latency).
    Fail { reason: String },
    /// Never resolve. The query parks until the cancel signal fires.
    Hang,
}

/// In-memory store for a single partition.
pub struct MemoryStore {
    partition: PartitionId,
    rows: Vec<Record>,
    latency: Duration,
    policy: FaultPolicy,
    /// Queries that actually reached this store (observability for tests).
    calls: AtomicU64,
}

impl MemoryStore {
    pub fn new(partition: PartitionId) -> Self {
        Self {
            partition,
            rows: Vec::new(),
            latency: Duration::ZERO,
            policy: FaultPolicy::None,
            calls: AtomicU64::new(0),
        }
    }

    pub fn with_rows(mut self, rows: Vec<Record>) -> Self {
        self.rows = rows;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_policy(mut self, policy: FaultPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Number of queries that reached this store.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// The statement text is carried but not parsed. The first bind argument
    /// picks the filter: text matches `name`, int matches `id`, and no
    /// arguments returns every row.
    fn select_rows(&self, query: &PartitionQuery) -> Vec<Record> {
        match query.args.first() {
            Some(QueryArg::Text(name)) => self
                .rows
                .iter()
                .filter(|r| &r.name == name)
                .cloned()
                .collect(),
            Some(QueryArg::Int(id)) => {
                self.rows.iter().filter(|r| r.id == *id).cloned().collect()
            }
            None => self.rows.clone(),
        }
    }

    fn cancel_cause(&self, cancel: &CancelSignal) -> OspreyError {
        cancel
            .cause()
            .unwrap_or_else(|| OspreyError::cancelled("partition query interrupted"))
    }
}

#[async_trait]
impl PartitionStore for MemoryStore {
    async fn execute(
        &self,
        cancel: &CancelSignal,
        query: &PartitionQuery,
    ) -> OspreyResult<Vec<Record>> {
        self.calls.fetch_add(1, Ordering::Relaxed);

        if !self.latency.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(self.latency) => {}
                _ = cancel.cancelled() => return Err(self.cancel_cause(cancel)),
            }
        }

        match &self.policy {
            FaultPolicy::None => Ok(self.select_rows(query)),
            FaultPolicy::Fail { reason } => {
                tracing::debug!(partition = %self.partition, reason = %reason, "injected store failure");
                Err(OspreyError::store(self.partition, reason.clone()))
            }
            FaultPolicy::Hang => {
                tracing::debug!(partition = %self.partition, "store hanging until cancellation");
                cancel.cancelled().await;
                Err(self.cancel_cause(cancel))
            }
        }
    }

    fn partition(&self) -> PartitionId {
        self.partition
    }
}
