//! The scatter-gather executor.
//!
//! One logical query fans out over a snapshot of the partition map. Every
//! partition query runs under a slot from the shared [`AdmissionGate`]; a
//! watcher task holds the slot, merges arriving rows into the shared
//! buffer, and turns the first failure into the query-wide cancellation
//! cause. Once every watcher has joined, the query either returns the
//! merged rows or the recorded cause wrapped as the query error. A failed
//! query never returns partial rows, and plain caller cancellation is
//! reported as an error like any other cause.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use osprey_common::{
    CancelSignal, ExecutorConfig, OspreyError, OspreyResult, PartitionQuery, QueryContext, Record,
};
use osprey_store::PartitionMap;

use crate::gate::AdmissionGate;
use crate::partition::spawn_partition_query;

/// Point-in-time snapshot of executor counters.
///
/// `queries_started` equals `queries_succeeded + queries_failed +
/// queries_pre_cancelled` once no query is in flight.
#[derive(Debug, Clone, Default)]
pub struct ScatterMetrics {
    pub queries_started: u64,
    pub queries_succeeded: u64,
    /// Queries that failed during or after the scatter phase.
    pub queries_failed: u64,
    /// Queries rejected up front because the caller had already cancelled.
    pub queries_pre_cancelled: u64,
    /// Partition tasks actually spawned (admitted through the gate).
    pub partitions_scattered: u64,
    /// Rows handed back across all successful queries.
    pub rows_returned: u64,
}

/// Fans one query out to every partition and gathers the rows.
///
/// Thread-safe; clone the `Arc<ScatterGatherExecutor>` to share across
/// callers. All queries share one admission gate, so the configured
/// capacity bounds partition-query concurrency globally, not per call.
pub struct ScatterGatherExecutor {
    config: ExecutorConfig,
    gate: Arc<AdmissionGate>,
    partitions: RwLock<Arc<PartitionMap>>,

    // Metrics counters
    queries_started: AtomicU64,
    queries_succeeded: AtomicU64,
    queries_failed: AtomicU64,
    queries_pre_cancelled: AtomicU64,
    partitions_scattered: AtomicU64,
    rows_returned: AtomicU64,
}

impl std::fmt::Debug for ScatterGatherExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScatterGatherExecutor")
            .field("capacity", &self.gate.capacity())
            .field("partitions", &self.partitions.read().len())
            .field(
                "queries_started",
                &self.queries_started.load(Ordering::Relaxed),
            )
            .finish()
    }
}

impl ScatterGatherExecutor {
    pub fn new(config: ExecutorConfig, partitions: PartitionMap) -> OspreyResult<Arc<Self>> {
        config.validate()?;
        let gate = AdmissionGate::new(config.max_concurrent_partition_queries)?;
        Ok(Arc::new(Self {
            config,
            gate,
            partitions: RwLock::new(Arc::new(partitions)),
            queries_started: AtomicU64::new(0),
            queries_succeeded: AtomicU64::new(0),
            queries_failed: AtomicU64::new(0),
            queries_pre_cancelled: AtomicU64::new(0),
            partitions_scattered: AtomicU64::new(0),
            rows_returned: AtomicU64::new(0),
        }))
    }

    /// Run one query across every mapped partition and return the gathered
    /// rows. Row order across partitions is unspecified.
    ///
    /// The caller's signal is never fired by the executor; failures travel
    /// on a per-query child signal, so one bad query cannot cancel its
    /// siblings.
    pub async fn query(
        &self,
        parent: &CancelSignal,
        query: PartitionQuery,
    ) -> OspreyResult<Vec<Record>> {
        let snapshot = self.partition_snapshot();
        let qctx = QueryContext::new(snapshot.len());
        self.queries_started.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            query_id = qctx.query_id,
            partitions = qctx.partition_count,
            statement = %query.text,
            "scatter-gather query started"
        );

        // A caller that already gave up gets its answer without touching
        // any store.
        if parent.is_cancelled() {
            self.queries_pre_cancelled.fetch_add(1, Ordering::Relaxed);
            let cause = parent
                .cause()
                .unwrap_or_else(|| OspreyError::cancelled("query cancelled before scatter"));
            return Err(self.wrap_failure(&qctx, cause));
        }

        if snapshot.is_empty() {
            self.queries_succeeded.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(query_id = qctx.query_id, "no partitions mapped, empty result");
            return Ok(Vec::new());
        }

        let child = parent.child();
        let query = Arc::new(query);
        let timeout = self.config.partition_timeout();
        let merged: Arc<Mutex<Vec<Record>>> = Arc::new(Mutex::new(Vec::new()));

        // ── Scatter: one gated task + watcher per partition ──
        let mut watchers = Vec::with_capacity(snapshot.len());
        for partition in snapshot.partitions() {
            let permit = match self.gate.admit(&child).await {
                Ok(permit) => permit,
                Err(err) => {
                    // Admission only fails once cancellation has fired;
                    // record the cause in case this racer saw it first.
                    child.cancel(err);
                    break;
                }
            };
            self.partitions_scattered.fetch_add(1, Ordering::Relaxed);

            let mut rx =
                spawn_partition_query(child.clone(), partition, Arc::clone(&query), timeout);

            let signal = child.clone();
            let buffer = Arc::clone(&merged);
            watchers.push(tokio::spawn(async move {
                // The slot spans the partition's whole round trip.
                let _permit = permit;
                tokio::select! {
                    _ = signal.cancelled() => {}
                    outcome = rx.recv() => match outcome {
                        Some(Ok(rows)) => buffer.lock().extend(rows),
                        Some(Err(err)) => {
                            signal.cancel(err);
                        }
                        None => {}
                    }
                }
            }));
        }

        // ── Gather: wait for every watcher, then settle ──
        for watcher in watchers {
            if let Err(join_err) = watcher.await {
                tracing::error!(
                    query_id = qctx.query_id,
                    error = %join_err,
                    "scatter watcher panicked"
                );
                child.cancel(OspreyError::internal(format!(
                    "scatter watcher failed: {}",
                    join_err
                )));
            }
        }

        if let Some(cause) = child.cause() {
            self.queries_failed.fetch_add(1, Ordering::Relaxed);
            return Err(self.wrap_failure(&qctx, cause));
        }

        let rows = std::mem::take(&mut *merged.lock());
        self.queries_succeeded.fetch_add(1, Ordering::Relaxed);
        self.rows_returned
            .fetch_add(rows.len() as u64, Ordering::Relaxed);
        tracing::debug!(
            query_id = qctx.query_id,
            rows = rows.len(),
            elapsed_ms = qctx.elapsed_ms(),
            "scatter-gather query finished"
        );
        Ok(rows)
    }

    fn wrap_failure(&self, qctx: &QueryContext, cause: OspreyError) -> OspreyError {
        tracing::warn!(
            query_id = qctx.query_id,
            elapsed_ms = qctx.elapsed_ms(),
            cause = %cause,
            "scatter-gather query failed"
        );
        cause
            .with_context("query execution failed")
            .with_query_context(qctx)
    }

    /// The partition map a new query would scatter over.
    pub fn partition_snapshot(&self) -> Arc<PartitionMap> {
        Arc::clone(&self.partitions.read())
    }

    /// Swap in a new partition map. Queries already in flight keep the
    /// snapshot they started with.
    pub fn replace_partitions(&self, map: PartitionMap) {
        let map = Arc::new(map);
        tracing::info!(partitions = map.len(), "partition map replaced");
        *self.partitions.write() = map;
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// The shared admission gate (mainly for metrics).
    pub fn gate(&self) -> &Arc<AdmissionGate> {
        &self.gate
    }

    /// Snapshot current metrics.
    pub fn metrics(&self) -> ScatterMetrics {
        ScatterMetrics {
            queries_started: self.queries_started.load(Ordering::Relaxed),
            queries_succeeded: self.queries_succeeded.load(Ordering::Relaxed),
            queries_failed: self.queries_failed.load(Ordering::Relaxed),
            queries_pre_cancelled: self.queries_pre_cancelled.load(Ordering::Relaxed),
            partitions_scattered: self.partitions_scattered.load(Ordering::Relaxed),
            rows_returned: self.rows_returned.load(Ordering::Relaxed),
        }
    }
}
