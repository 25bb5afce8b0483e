//! Osprey scatter-gather benchmark harness.
//!
//! Seeds an in-memory partition map, fans name-lookup queries out through
//! the bounded executor from concurrent client tasks, and reports latency
//! percentiles alongside the executor and admission-gate counters.
//!
//! Usage:
//!   cargo run -p osprey_bench -- --partitions 50 --capacity 20 --queries 200
//!   cargo run -p osprey_bench -- --sweep --export csv
//!   RUST_LOG=osprey_exec=debug cargo run -p osprey_bench -- --queries 10

use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;

use osprey_common::{CancelSignal, ExecutorConfig, PartitionId, Record};
use osprey_exec::{GateMetrics, Repository, ScatterGatherExecutor, ScatterMetrics};
use osprey_store::{FaultPolicy, MemoryStore, PartitionMap, PartitionStore};

const NAMES: [&str; 3] = ["alice", "bob", "carol"];

/// Osprey fan-out query benchmark.
#[derive(Parser, Debug)]
#[command(name = "osprey-bench", about = "Fan-out query benchmark for the osprey executor")]
struct Args {
    /// Number of data partitions.
    #[arg(long, default_value_t = 50)]
    partitions: u64,

    /// Admission gate capacity (concurrent partition queries).
    #[arg(long, default_value_t = 20)]
    capacity: usize,

    /// Rows pre-loaded per partition.
    #[arg(long, default_value_t = 120)]
    rows: u64,

    /// Total queries to issue, split across clients.
    #[arg(long, default_value_t = 200)]
    queries: u64,

    /// Concurrent client tasks issuing queries.
    #[arg(long, default_value_t = 4)]
    clients: u64,

    /// Synthetic per-partition store latency in milliseconds.
    #[arg(long, default_value_t = 2)]
    store_latency_ms: u64,

    /// Per-partition statement timeout in milliseconds (0 = disabled).
    #[arg(long, default_value_t = 0)]
    timeout_ms: u64,

    /// Partition id that fails every query (0 = none).
    #[arg(long, default_value_t = 0)]
    fail_partition: u64,

    /// If set, sweep gate capacity (1/2/4/8/16/32) over one workload each.
    #[arg(long, default_value_t = false)]
    sweep: bool,

    /// Export format: text | csv | json
    #[arg(long, default_value = "text")]
    export: String,
}

/// Simple deterministic pseudo-random (xorshift64).
struct Rng(u64);

impl Rng {
    fn new(seed: u64) -> Self {
        Self(if seed == 0 { 1 } else { seed })
    }
    fn next_u64(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }
}

struct BenchResult {
    label: String,
    queries: u64,
    ok: u64,
    failed: u64,
    rows_total: u64,
    elapsed_ms: u64,
    qps: f64,
    p50_us: u64,
    p95_us: u64,
    p99_us: u64,
    max_us: u64,
    exec: ScatterMetrics,
    gate: GateMetrics,
}

fn build_map(args: &Args) -> PartitionMap {
    let latency = Duration::from_millis(args.store_latency_ms);
    let stores = (1..=args.partitions).map(|p| {
        let rows: Vec<Record> = (0..args.rows)
            .map(|i| Record::new((p * 1_000_000 + i) as i64, NAMES[(i % 3) as usize]))
            .collect();
        let mut store = MemoryStore::new(PartitionId(p))
            .with_rows(rows)
            .with_latency(latency);
        if args.fail_partition == p {
            store = store.with_policy(FaultPolicy::Fail {
                reason: "injected fault".into(),
            });
        }
        Arc::new(store) as Arc<dyn PartitionStore>
    });
    PartitionMap::from_stores(stores)
}

async fn run_workload(args: &Args, capacity: usize, label: &str) -> BenchResult {
    let config = ExecutorConfig {
        max_concurrent_partition_queries: capacity,
        partition_timeout_ms: args.timeout_ms,
    };
    let executor = ScatterGatherExecutor::new(config, build_map(args)).unwrap();
    let repo = Arc::new(Repository::new(Arc::clone(&executor)));

    let clients = args.clients.max(1);
    let per_client = args.queries / clients;
    let cancel = CancelSignal::new();

    let start = Instant::now();

    let mut handles = Vec::new();
    for c in 0..clients {
        let repo = Arc::clone(&repo);
        let cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
            let mut rng = Rng::new(c + 42);
            let mut latencies = Vec::with_capacity(per_client as usize);
            let mut ok = 0u64;
            let mut failed = 0u64;
            let mut rows_total = 0u64;
            for _ in 0..per_client {
                let name = NAMES[(rng.next_u64() % 3) as usize];
                let op_start = Instant::now();
                match repo.find_by_name(&cancel, name).await {
                    Ok(people) => {
                        ok += 1;
                        rows_total += people.len() as u64;
                    }
                    Err(_) => failed += 1,
                }
                latencies.push(op_start.elapsed().as_micros() as u64);
            }
            (latencies, ok, failed, rows_total)
        }));
    }

    let mut latencies = Vec::new();
    let mut ok = 0u64;
    let mut failed = 0u64;
    let mut rows_total = 0u64;
    for handle in handles {
        let (lat, o, f, r) = handle.await.unwrap();
        latencies.extend(lat);
        ok += o;
        failed += f;
        rows_total += r;
    }

    let elapsed = start.elapsed();
    let elapsed_ms = elapsed.as_millis() as u64;
    let issued = per_client * clients;
    let qps = if elapsed_ms > 0 {
        issued as f64 / (elapsed_ms as f64 / 1000.0)
    } else {
        0.0
    };
    let (p50, p95, p99, max) = percentiles(&mut latencies);

    BenchResult {
        label: label.to_string(),
        queries: issued,
        ok,
        failed,
        rows_total,
        elapsed_ms,
        qps,
        p50_us: p50,
        p95_us: p95,
        p99_us: p99,
        max_us: max,
        exec: executor.metrics(),
        gate: executor.gate().metrics(),
    }
}

fn percentiles(v: &mut [u64]) -> (u64, u64, u64, u64) {
    v.sort();
    let len = v.len();
    if len == 0 {
        return (0, 0, 0, 0);
    }
    let p50 = v[len * 50 / 100];
    let p95 = v[len * 95 / 100];
    let p99 = v[len.saturating_sub(1).min(len * 99 / 100)];
    (p50, p95, p99, v[len - 1])
}

fn print_result_text(r: &BenchResult) {
    println!("═══════════════════════════════════════════════");
    println!("  {} ", r.label);
    println!("═══════════════════════════════════════════════");
    println!("  Queries:           {}", r.queries);
    println!("  Succeeded:         {}", r.ok);
    println!("  Failed:            {}", r.failed);
    println!("  Rows returned:     {}", r.rows_total);
    println!("  Elapsed:           {} ms", r.elapsed_ms);
    println!("  QPS:               {:.1}", r.qps);
    println!("  ─── Latency (per query, µs) ───");
    println!(
        "  p50={:>7}  p95={:>7}  p99={:>7}  max={:>7}",
        r.p50_us, r.p95_us, r.p99_us, r.max_us,
    );
    println!("  ─── Admission gate ───");
    println!("  Peak in flight:    {}", r.gate.peak_in_flight);
    println!("  Admitted total:    {}", r.gate.admitted_total);
    println!("  Cancelled waits:   {}", r.gate.cancelled_waits);
    println!("  ─── Executor ───");
    println!("  Started:           {}", r.exec.queries_started);
    println!("  Succeeded:         {}", r.exec.queries_succeeded);
    println!("  Failed:            {}", r.exec.queries_failed);
    println!("  Partition tasks:   {}", r.exec.partitions_scattered);
    println!();
}

fn print_result_csv(r: &BenchResult) {
    println!("label,queries,ok,failed,rows,elapsed_ms,qps,p50_us,p95_us,p99_us,max_us,peak_in_flight,admitted,cancelled_waits,partition_tasks");
    println!(
        "{},{},{},{},{},{},{:.1},{},{},{},{},{},{},{},{}",
        r.label,
        r.queries,
        r.ok,
        r.failed,
        r.rows_total,
        r.elapsed_ms,
        r.qps,
        r.p50_us,
        r.p95_us,
        r.p99_us,
        r.max_us,
        r.gate.peak_in_flight,
        r.gate.admitted_total,
        r.gate.cancelled_waits,
        r.exec.partitions_scattered,
    );
}

fn print_result_json(r: &BenchResult) {
    let obj = serde_json::json!({
        "label": r.label,
        "queries": r.queries,
        "ok": r.ok,
        "failed": r.failed,
        "rows_total": r.rows_total,
        "elapsed_ms": r.elapsed_ms,
        "qps": r.qps,
        "latency_us": {
            "p50": r.p50_us,
            "p95": r.p95_us,
            "p99": r.p99_us,
            "max": r.max_us,
        },
        "gate": {
            "peak_in_flight": r.gate.peak_in_flight,
            "admitted_total": r.gate.admitted_total,
            "cancelled_waits": r.gate.cancelled_waits,
            "in_flight": r.gate.in_flight,
        },
        "executor": {
            "started": r.exec.queries_started,
            "succeeded": r.exec.queries_succeeded,
            "failed": r.exec.queries_failed,
            "pre_cancelled": r.exec.queries_pre_cancelled,
            "partitions_scattered": r.exec.partitions_scattered,
            "rows_returned": r.exec.rows_returned,
        }
    });
    println!("{}", serde_json::to_string_pretty(&obj).unwrap());
}

fn print_result(r: &BenchResult, format: &str) {
    match format {
        "csv" => print_result_csv(r),
        "json" => print_result_json(r),
        _ => print_result_text(r),
    }
}

async fn run_sweep(args: &Args) {
    let capacities = [1usize, 2, 4, 8, 16, 32];

    println!("Running gate capacity sweep...");
    println!(
        "  partitions: {}  queries/round: {}\n",
        args.partitions, args.queries
    );

    if args.export == "csv" {
        println!("capacity,queries,elapsed_ms,qps,p50_us,p95_us,p99_us,peak_in_flight,admitted");
    }

    let mut results: Vec<serde_json::Value> = Vec::new();

    for &capacity in &capacities {
        let r = run_workload(args, capacity, &format!("capacity {}", capacity)).await;

        match args.export.as_str() {
            "csv" => {
                println!(
                    "{},{},{},{:.1},{},{},{},{},{}",
                    capacity,
                    r.queries,
                    r.elapsed_ms,
                    r.qps,
                    r.p50_us,
                    r.p95_us,
                    r.p99_us,
                    r.gate.peak_in_flight,
                    r.gate.admitted_total,
                );
            }
            "json" => {
                results.push(serde_json::json!({
                    "capacity": capacity,
                    "queries": r.queries,
                    "elapsed_ms": r.elapsed_ms,
                    "qps": r.qps,
                    "p50_us": r.p50_us,
                    "p95_us": r.p95_us,
                    "p99_us": r.p99_us,
                    "peak_in_flight": r.gate.peak_in_flight,
                    "admitted_total": r.gate.admitted_total,
                }));
            }
            _ => {
                println!(
                    "  {:>2} slots │ {:>6} queries │ {:>6} ms │ {:>8.1} QPS │ p50={:>7}µs p99={:>7}µs peak={:>2}",
                    capacity,
                    r.queries,
                    r.elapsed_ms,
                    r.qps,
                    r.p50_us,
                    r.p99_us,
                    r.gate.peak_in_flight,
                );
            }
        }
    }

    if args.export == "json" {
        println!("{}", serde_json::to_string_pretty(&results).unwrap());
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    tracing::info!(
        partitions = args.partitions,
        capacity = args.capacity,
        queries = args.queries,
        clients = args.clients,
        "benchmark starting"
    );

    if args.sweep {
        run_sweep(&args).await;
    } else {
        let result = run_workload(&args, args.capacity, "Scatter-Gather Workload").await;
        print_result(&result, &args.export);
    }
}
