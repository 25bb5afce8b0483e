//! Bounded-concurrency scatter-gather query execution.
//!
//! One logical query fans out to every data partition, runs the per-partition
//! queries under a fixed global concurrency cap, and gathers the rows into a
//! single unordered result. The first failure anywhere cancels everything
//! still in flight and fails the whole query; partial rows are never
//! returned.
//!
//! - [`gate`]: the [`AdmissionGate`] capping concurrent partition queries.
//! - [`timeout`]: deadline wrappers that detach, never block on, the
//!   wrapped operation.
//! - [`partition`]: the per-partition task and its result conduit.
//! - [`executor`]: the [`ScatterGatherExecutor`] tying it all together.
//! - [`repository`]: a caller-facing lookup facade over the executor.
//!
//! # Usage
//!
//! ```ignore
//! let executor = ScatterGatherExecutor::new(ExecutorConfig::default(), map)?;
//! let cancel = CancelSignal::new();
//! let rows = executor.query(&cancel, query).await?;
//! ```

pub mod executor;
pub mod gate;
pub mod partition;
pub mod repository;
pub mod timeout;

pub use executor::{ScatterGatherExecutor, ScatterMetrics};
pub use gate::{AdmissionGate, GateMetrics, GatePermit};
pub use partition::spawn_partition_query;
pub use repository::{Person, Repository};
pub use timeout::{run_blocking_with_timeout, run_with_timeout};
