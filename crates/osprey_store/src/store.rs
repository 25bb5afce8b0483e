//! The partition store seam.
//!
//! A [`PartitionStore`] is one partition's query backend. The executor never
//! talks to a concrete store type; it fans out over `Arc<dyn PartitionStore>`
//! handles held in a [`PartitionMap`]. The map is immutable once built:
//! topology changes build a new map and swap the `Arc`, and a query already
//! in flight keeps using the snapshot it started with.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use osprey_common::{CancelSignal, OspreyResult, PartitionId, PartitionQuery, Record};

/// One partition's query backend.
///
/// Implementations must be cancellation-aware: when `cancel` fires mid-query
/// they should stop work and return the cancellation cause instead of
/// finishing. A store that ignores the signal still produces a correct
/// result, but holds its admission slot for the full query duration.
#[async_trait]
pub trait PartitionStore: Send + Sync {
    /// Run a parameterized query against this partition and return the
    /// matching rows.
    async fn execute(
        &self,
        cancel: &CancelSignal,
        query: &PartitionQuery,
    ) -> OspreyResult<Vec<Record>>;

    /// The partition this store serves.
    fn partition(&self) -> PartitionId;
}

/// A partition paired with its store handle. Cheap to clone; the executor
/// hands one to each per-partition task.
#[derive(Clone)]
pub struct Partition {
    pub id: PartitionId,
    pub store: Arc<dyn PartitionStore>,
}

impl Partition {
    pub fn new(id: PartitionId, store: Arc<dyn PartitionStore>) -> Self {
        Self { id, store }
    }
}

impl fmt::Debug for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Partition").field("id", &self.id).finish()
    }
}

/// Ordered map of partition id → store handle.
///
/// Iteration follows partition id order, so a scatter over the map visits
/// partitions deterministically run to run. Stores key themselves via
/// [`PartitionStore::partition`], which keeps the map and the stores from
/// disagreeing about who serves what.
#[derive(Default, Clone)]
pub struct PartitionMap {
    partitions: BTreeMap<PartitionId, Arc<dyn PartitionStore>>,
}

impl PartitionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a map from a collection of stores.
    pub fn from_stores<I>(stores: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn PartitionStore>>,
    {
        let mut map = Self::new();
        for store in stores {
            map.insert(store);
        }
        map
    }

    /// Register a store under its own partition id. Returns the store it
    /// replaced, if that partition was already mapped.
    pub fn insert(&mut self, store: Arc<dyn PartitionStore>) -> Option<Arc<dyn PartitionStore>> {
        self.partitions.insert(store.partition(), store)
    }

    pub fn get(&self, id: PartitionId) -> Option<&Arc<dyn PartitionStore>> {
        self.partitions.get(&id)
    }

    pub fn contains(&self, id: PartitionId) -> bool {
        self.partitions.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    /// Partition ids in ascending order.
    pub fn ids(&self) -> Vec<PartitionId> {
        self.partitions.keys().copied().collect()
    }

    /// Snapshot of all partitions, in id order. The returned handles stay
    /// valid even if the owning map is swapped out afterwards.
    pub fn partitions(&self) -> Vec<Partition> {
        self.partitions
            .iter()
            .map(|(id, store)| Partition::new(*id, Arc::clone(store)))
            .collect()
    }
}

impl fmt::Debug for PartitionMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartitionMap")
            .field("partitions", &self.ids())
            .finish()
    }
}
