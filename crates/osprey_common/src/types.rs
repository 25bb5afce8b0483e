//! Core identifiers and query/row types shared by every crate.

use serde::{Deserialize, Serialize};

/// Identifier of one data partition ("shard").
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct PartitionId(pub u64);

impl std::fmt::Display for PartitionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One positional argument of a partition query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryArg {
    Int(i64),
    Text(String),
}

impl std::fmt::Display for QueryArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryArg::Int(v) => write!(f, "{}", v),
            QueryArg::Text(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for QueryArg {
    fn from(v: i64) -> Self {
        QueryArg::Int(v)
    }
}

impl From<&str> for QueryArg {
    fn from(v: &str) -> Self {
        QueryArg::Text(v.to_string())
    }
}

impl From<String> for QueryArg {
    fn from(v: String) -> Self {
        QueryArg::Text(v)
    }
}

/// Immutable query descriptor fanned out to every partition.
///
/// Built once per call and shared read-only (`Arc`) by all partition
/// tasks; never mutated after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionQuery {
    /// Statement text with positional placeholders (`$1`, `$2`, ...).
    pub text: String,
    /// Positional argument values.
    pub args: Vec<QueryArg>,
}

impl PartitionQuery {
    pub fn new(text: impl Into<String>, args: Vec<QueryArg>) -> Self {
        Self {
            text: text.into(),
            args,
        }
    }
}

/// One row returned by a partition store.
///
/// Row order within a partition follows that partition's own result
/// order; no ordering is guaranteed across partitions.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Record {
    pub id: i64,
    pub name: String,
}

impl Record {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}
