//! Partition store layer: the async store seam the scatter-gather
//! executor fans out over, plus an in-memory implementation used by
//! tests and the bench harness.
//!
//! - [`store`]: the object-safe [`PartitionStore`] trait, the
//!   [`Partition`] handle, and the ordered [`PartitionMap`].
//! - [`memory`]: [`MemoryStore`] with configurable latency and fault
//!   injection (fail, hang-until-cancelled).

pub mod memory;
pub mod store;

pub use memory::{FaultPolicy, MemoryStore};
pub use store::{Partition, PartitionMap, PartitionStore};
