//! Integration tests for the bounded scatter-gather executor.
//!
//! Validates:
//! - SG-1: Rows from every partition are gathered; order across partitions is free
//! - SG-2: One failing partition voids the whole query; no partial rows escape
//! - SG-3: Store-side concurrency never exceeds the gate capacity
//! - SG-4: With many failing partitions, exactly one failure becomes the cause
//! - SG-5: A pre-cancelled caller reaches no store at all
//! - SG-6: Mid-flight cancellation tears down hung partitions promptly
//! - SG-7: A partition missing its deadline surfaces a timeout named after it
//! - SG-8: A fast operation beats a generous deadline
//! - SG-9: Repeated queries over the same executor behave identically
//! - SG-10: Gate slots fully recycle across queries

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use osprey_common::{
    CancelSignal, ExecutorConfig, OspreyError, OspreyResult, PartitionId, PartitionQuery, Record,
};
use osprey_exec::ScatterGatherExecutor;
use osprey_store::{FaultPolicy, MemoryStore, PartitionMap, PartitionStore};

fn seeded_stores(partitions: u64, rows_per: usize) -> Vec<Arc<MemoryStore>> {
    let names = ["alice", "bob", "carol"];
    (1..=partitions)
        .map(|p| {
            let rows = (0..rows_per)
                .map(|i| Record::new((p * 100) as i64 + i as i64, names[i % names.len()]))
                .collect();
            Arc::new(MemoryStore::new(PartitionId(p)).with_rows(rows))
        })
        .collect()
}

fn map_of(stores: &[Arc<MemoryStore>]) -> PartitionMap {
    PartitionMap::from_stores(
        stores
            .iter()
            .map(|s| Arc::clone(s) as Arc<dyn PartitionStore>),
    )
}

fn executor_with(map: PartitionMap, capacity: usize, timeout_ms: u64) -> Arc<ScatterGatherExecutor> {
    let config = ExecutorConfig {
        max_concurrent_partition_queries: capacity,
        partition_timeout_ms: timeout_ms,
    };
    ScatterGatherExecutor::new(config, map).unwrap()
}

fn all_rows_query() -> PartitionQuery {
    PartitionQuery::new("SELECT id, name FROM person", vec![])
}

// ═══════════════════════════════════════════════════════════════════════════
// SG-1: Gather is the union of all partitions
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_sg1_union_across_partitions() {
    let stores = seeded_stores(5, 4);
    let executor = executor_with(map_of(&stores), 20, 0);

    let mut rows = executor
        .query(&CancelSignal::new(), all_rows_query())
        .await
        .unwrap();

    let mut expected: Vec<Record> = Vec::new();
    for store in &stores {
        let cancel = CancelSignal::new();
        expected.extend(store.execute(&cancel, &all_rows_query()).await.unwrap());
    }
    rows.sort();
    expected.sort();
    assert_eq!(rows, expected, "SG-1: gathered rows must be the exact union");
    assert_eq!(rows.len(), 20);
}

// ═══════════════════════════════════════════════════════════════════════════
// SG-2: Strict failure policy — one bad partition fails the query
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_sg2_single_failure_voids_query() {
    let mut stores = seeded_stores(9, 2);
    stores.push(Arc::new(
        MemoryStore::new(PartitionId(10)).with_policy(FaultPolicy::Fail {
            reason: "replica lost".into(),
        }),
    ));
    let executor = executor_with(map_of(&stores), 20, 0);

    let err = executor
        .query(&CancelSignal::new(), all_rows_query())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("query execution failed"));
    assert!(err.to_string().contains("replica lost"));
    assert_eq!(
        err.partition(),
        Some(PartitionId(10)),
        "SG-2: the failure must name the bad partition"
    );
    assert_eq!(executor.metrics().rows_returned, 0, "SG-2: no partial rows");
}

// ═══════════════════════════════════════════════════════════════════════════
// SG-3: Concurrency cap holds under a 50-partition scatter
// ═══════════════════════════════════════════════════════════════════════════

/// Store that tracks how many executes run at once.
struct ProbeStore {
    partition: PartitionId,
    delay: Duration,
    gauge: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

#[async_trait]
impl PartitionStore for ProbeStore {
    async fn execute(
        &self,
        cancel: &CancelSignal,
        _query: &PartitionQuery,
    ) -> OspreyResult<Vec<Record>> {
        let now = self.gauge.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::select! {
            _ = tokio::time::sleep(self.delay) => {}
            _ = cancel.cancelled() => {}
        }
        self.gauge.fetch_sub(1, Ordering::SeqCst);
        Ok(vec![Record::new(self.partition.0 as i64, "probe")])
    }

    fn partition(&self) -> PartitionId {
        self.partition
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sg3_concurrency_never_exceeds_capacity() {
    let gauge = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let map = PartitionMap::from_stores((1..=50).map(|p| {
        Arc::new(ProbeStore {
            partition: PartitionId(p),
            delay: Duration::from_millis(25),
            gauge: Arc::clone(&gauge),
            peak: Arc::clone(&peak),
        }) as Arc<dyn PartitionStore>
    }));
    let executor = executor_with(map, 20, 0);

    let rows = executor
        .query(&CancelSignal::new(), all_rows_query())
        .await
        .unwrap();

    assert_eq!(rows.len(), 50);
    let observed_peak = peak.load(Ordering::SeqCst);
    assert!(
        observed_peak <= 20,
        "SG-3: store-side concurrency {} exceeded capacity 20",
        observed_peak
    );
    assert!(
        observed_peak >= 10,
        "SG-3: scatter should actually run in parallel, saw peak {}",
        observed_peak
    );
    assert!(executor.gate().metrics().peak_in_flight <= 20);
    assert_eq!(executor.gate().in_flight(), 0);
}

// ═══════════════════════════════════════════════════════════════════════════
// SG-4: Exactly one cause wins when everything fails
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sg4_exactly_one_cause_among_many_failures() {
    for _ in 0..10 {
        let map = PartitionMap::from_stores((1..=20).map(|p| {
            Arc::new(
                MemoryStore::new(PartitionId(p)).with_policy(FaultPolicy::Fail {
                    reason: format!("replica {} down", p),
                }),
            ) as Arc<dyn PartitionStore>
        }));
        let executor = executor_with(map, 20, 0);

        let err = executor
            .query(&CancelSignal::new(), all_rows_query())
            .await
            .unwrap_err();

        // A single store failure is the cause; the rest were cancelled and
        // discarded, never aggregated.
        let winner = err
            .partition()
            .expect("SG-4: the cause must be one store failure");
        assert!((1..=20).contains(&winner.0));
        let msg = err.to_string();
        assert_eq!(
            msg.matches("replica ").count(),
            1,
            "SG-4: exactly one failure may surface, got: {}",
            msg
        );
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// SG-5: Pre-cancelled caller never reaches a store
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_sg5_pre_cancelled_caller_touches_nothing() {
    let stores = seeded_stores(10, 2);
    let executor = executor_with(map_of(&stores), 20, 0);

    let cancel = CancelSignal::new();
    cancel.cancel(OspreyError::cancelled("caller gave up"));

    let err = executor.query(&cancel, all_rows_query()).await.unwrap_err();
    assert!(err.is_user_error());
    assert!(err.to_string().contains("caller gave up"));

    for store in &stores {
        assert_eq!(store.calls(), 0, "SG-5: no store may be queried");
    }
    let m = executor.metrics();
    assert_eq!(m.queries_pre_cancelled, 1);
    assert_eq!(m.partitions_scattered, 0);
}

// ═══════════════════════════════════════════════════════════════════════════
// SG-6: Mid-flight cancellation unwinds hung partitions
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sg6_mid_flight_cancellation_unwinds_promptly() {
    let map = PartitionMap::from_stores((1..=8).map(|p| {
        Arc::new(MemoryStore::new(PartitionId(p)).with_policy(FaultPolicy::Hang))
            as Arc<dyn PartitionStore>
    }));
    let executor = executor_with(map, 4, 0);
    let cancel = CancelSignal::new();

    let query_task = {
        let executor = Arc::clone(&executor);
        let cancel = cancel.clone();
        tokio::spawn(async move { executor.query(&cancel, all_rows_query()).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!query_task.is_finished(), "SG-6: hung partitions keep the query open");
    cancel.cancel(OspreyError::cancelled("operator abort"));

    let started = Instant::now();
    let err = tokio::time::timeout(Duration::from_secs(2), query_task)
        .await
        .expect("SG-6: cancellation must unwind the query")
        .unwrap()
        .unwrap_err();
    assert!(err.to_string().contains("operator abort"));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(executor.gate().in_flight(), 0, "SG-6: all slots returned");
}

// ═══════════════════════════════════════════════════════════════════════════
// SG-7 / SG-8: Per-partition deadline
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_sg7_slow_partition_times_out_with_its_id() {
    let mut stores = seeded_stores(3, 1);
    stores.push(Arc::new(
        MemoryStore::new(PartitionId(9))
            .with_rows(vec![Record::new(900, "late")])
            .with_latency(Duration::from_secs(30)),
    ));
    let executor = executor_with(map_of(&stores), 20, 60);

    let err = executor
        .query(&CancelSignal::new(), all_rows_query())
        .await
        .unwrap_err();
    assert!(err.is_transient());
    let msg = err.to_string();
    assert!(msg.contains("partition 9 query"), "SG-7: got: {}", msg);
    assert!(msg.contains("timed out after 60ms"), "SG-7: got: {}", msg);
}

#[tokio::test]
async fn test_sg8_fast_partitions_beat_generous_deadline() {
    let stores: Vec<Arc<MemoryStore>> = (1..=4)
        .map(|p| {
            Arc::new(
                MemoryStore::new(PartitionId(p))
                    .with_rows(vec![Record::new(p as i64, "quick")])
                    .with_latency(Duration::from_millis(10)),
            )
        })
        .collect();
    let executor = executor_with(map_of(&stores), 20, 3_000);

    let rows = executor
        .query(&CancelSignal::new(), all_rows_query())
        .await
        .unwrap();
    assert_eq!(rows.len(), 4);
}

// ═══════════════════════════════════════════════════════════════════════════
// SG-9: Idempotence across repeated runs
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_sg9_repeated_runs_are_identical() {
    let stores = seeded_stores(5, 3);
    let executor = executor_with(map_of(&stores), 20, 0);
    let cancel = CancelSignal::new();

    let mut first = executor.query(&cancel, all_rows_query()).await.unwrap();
    first.sort();
    for _ in 0..2 {
        let mut again = executor.query(&cancel, all_rows_query()).await.unwrap();
        again.sort();
        assert_eq!(again, first, "SG-9: reruns must return the same multiset");
    }

    let m = executor.metrics();
    assert_eq!(m.queries_started, 3);
    assert_eq!(m.queries_succeeded, 3);
    assert_eq!(m.queries_failed, 0);
}

// ═══════════════════════════════════════════════════════════════════════════
// SG-10: Gate slots recycle across queries
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_sg10_gate_slots_recycle() {
    let stores: Vec<Arc<MemoryStore>> = (1..=6)
        .map(|p| {
            Arc::new(
                MemoryStore::new(PartitionId(p))
                    .with_rows(vec![Record::new(p as i64, "slot")])
                    .with_latency(Duration::from_millis(5)),
            )
        })
        .collect();
    let executor = executor_with(map_of(&stores), 2, 0);
    let cancel = CancelSignal::new();

    for _ in 0..2 {
        let rows = executor.query(&cancel, all_rows_query()).await.unwrap();
        assert_eq!(rows.len(), 6);
    }

    let gate = executor.gate().metrics();
    assert_eq!(gate.admitted_total, 12);
    assert_eq!(gate.in_flight, 0);
    assert!(gate.peak_in_flight <= 2, "SG-10: capacity 2 must hold");
    assert_eq!(gate.cancelled_waits, 0);
}
