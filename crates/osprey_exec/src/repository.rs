//! Caller-facing person lookup over the scatter-gather executor.
//!
//! The repository owns the statement shape and the row-to-domain mapping;
//! everything about concurrency, admission, and failure handling lives in
//! the executor underneath it.

use std::sync::Arc;

use osprey_common::{
    CancelSignal, ErrorContext, OspreyResult, PartitionQuery, QueryArg, Record,
};

use crate::executor::ScatterGatherExecutor;

/// A person row, as callers see it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Person {
    pub id: i64,
    pub name: String,
}

impl From<Record> for Person {
    fn from(record: Record) -> Self {
        Self {
            id: record.id,
            name: record.name,
        }
    }
}

/// Person lookups, fanned out across every partition.
pub struct Repository {
    executor: Arc<ScatterGatherExecutor>,
}

impl Repository {
    pub fn new(executor: Arc<ScatterGatherExecutor>) -> Self {
        Self { executor }
    }

    /// Every person with the given name, across all partitions. No order
    /// is guaranteed.
    pub async fn find_by_name(
        &self,
        cancel: &CancelSignal,
        name: &str,
    ) -> OspreyResult<Vec<Person>> {
        let query = PartitionQuery::new(
            "SELECT id, name FROM person WHERE name = $1",
            vec![QueryArg::from(name)],
        );
        let rows = self
            .executor
            .query(cancel, query)
            .await
            .ctx("person lookup failed")?;
        tracing::debug!(name, matches = rows.len(), "person lookup finished");
        Ok(rows.into_iter().map(Person::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use osprey_common::{ExecutorConfig, OspreyError, PartitionId};
    use osprey_store::{FaultPolicy, MemoryStore, PartitionMap, PartitionStore};

    fn repository_over(stores: Vec<MemoryStore>) -> Repository {
        let map = PartitionMap::from_stores(
            stores
                .into_iter()
                .map(|s| Arc::new(s) as Arc<dyn PartitionStore>),
        );
        let executor = ScatterGatherExecutor::new(ExecutorConfig::default(), map).unwrap();
        Repository::new(executor)
    }

    #[tokio::test]
    async fn finds_matches_across_partitions() {
        let repo = repository_over(vec![
            MemoryStore::new(PartitionId(1))
                .with_rows(vec![Record::new(1, "bob"), Record::new(2, "alice")]),
            MemoryStore::new(PartitionId(2)).with_rows(vec![Record::new(3, "bob")]),
            MemoryStore::new(PartitionId(3)).with_rows(vec![Record::new(4, "carol")]),
        ]);

        let mut people = repo
            .find_by_name(&CancelSignal::new(), "bob")
            .await
            .unwrap();
        people.sort();
        assert_eq!(
            people,
            vec![
                Person {
                    id: 1,
                    name: "bob".into()
                },
                Person {
                    id: 3,
                    name: "bob".into()
                },
            ]
        );
    }

    #[tokio::test]
    async fn no_match_yields_empty_vec() {
        let repo = repository_over(vec![
            MemoryStore::new(PartitionId(1)).with_rows(vec![Record::new(1, "alice")])
        ]);
        let people = repo
            .find_by_name(&CancelSignal::new(), "nobody")
            .await
            .unwrap();
        assert!(people.is_empty());
    }

    #[tokio::test]
    async fn store_failure_surfaces_with_lookup_context() {
        let repo = repository_over(vec![
            MemoryStore::new(PartitionId(1)).with_rows(vec![Record::new(1, "bob")]),
            MemoryStore::new(PartitionId(2)).with_policy(FaultPolicy::Fail {
                reason: "index corrupt".into(),
            }),
        ]);

        let err = repo
            .find_by_name(&CancelSignal::new(), "bob")
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("person lookup failed"));
        assert!(msg.contains("index corrupt"));
        assert_eq!(err.partition(), Some(PartitionId(2)));
    }

    #[tokio::test]
    async fn cancelled_caller_gets_cancellation_error() {
        let repo = repository_over(vec![
            MemoryStore::new(PartitionId(1)).with_rows(vec![Record::new(1, "bob")])
        ]);
        let cancel = CancelSignal::new();
        cancel.cancel(OspreyError::cancelled("session closed"));

        let err = repo.find_by_name(&cancel, "bob").await.unwrap_err();
        assert!(err.is_user_error());
        assert!(err.to_string().contains("session closed"));
    }
}
